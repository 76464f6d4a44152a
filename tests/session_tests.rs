//! IMAP session state machine against a scripted in-process server.

mod common;

use std::time::Duration;

use common::{raw_message, FakeConnector, FakeImap, ServerEvent};
use mailblog::error::Error;
use mailblog::imap::{PushOutcome, Session, SessionState};

const TIMEOUT: Duration = Duration::from_secs(5);

fn session(server: &FakeImap) -> Session<FakeConnector> {
    Session::new(server.connector(), TIMEOUT)
}

/// A session that went through connect → authenticate → select → search.
async fn selected(server: &FakeImap) -> Session<FakeConnector> {
    let mut s = session(server);
    s.connect().await.unwrap();
    s.authenticate("blog@example.com", "secret").await.unwrap();
    s.select("INBOX").await.unwrap();
    s.search_all().await.unwrap();
    s
}

// ─── Lifecycle ──────────────────────────────────────────────────

#[tokio::test]
async fn test_lifecycle_states() {
    let server = FakeImap::new();
    let mut s = session(&server);
    assert_eq!(s.state(), SessionState::Disconnected);
    assert!(!s.is_usable());

    s.connect().await.unwrap();
    assert_eq!(s.state(), SessionState::Connecting);

    s.authenticate("blog@example.com", "secret").await.unwrap();
    assert_eq!(s.state(), SessionState::Authenticated);

    s.select("INBOX").await.unwrap();
    assert_eq!(s.state(), SessionState::Selected);
    assert!(s.is_usable());

    assert!(server
        .commands()
        .contains(&"LOGIN \"blog@example.com\" \"secret\"".to_string()));
    assert!(server.commands().contains(&"SELECT \"INBOX\"".to_string()));
}

#[tokio::test]
async fn test_connect_failure_is_transport() {
    let server = FakeImap::new();
    server.refuse_connections(true);
    let mut s = session(&server);
    assert!(matches!(s.connect().await, Err(Error::Transport(_))));
    assert_eq!(s.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_bad_greeting_rejected() {
    let server = FakeImap::new().with_greeting("* BYE too many connections");
    let mut s = session(&server);
    s.connect().await.unwrap();
    let err = s.authenticate("blog@example.com", "secret").await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    assert_eq!(server.count("LOGIN"), 0);
}

#[tokio::test]
async fn test_preauth_greeting_rejected() {
    let server = FakeImap::new().with_greeting("* PREAUTH welcome back");
    let mut s = session(&server);
    s.connect().await.unwrap();
    let err = s.authenticate("blog@example.com", "secret").await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    assert_eq!(s.state(), SessionState::Disconnected);
    assert_eq!(server.count("LOGIN"), 0);
}

#[tokio::test]
async fn test_login_rejected() {
    let server = FakeImap::new();
    let mut s = session(&server);
    s.connect().await.unwrap();
    let err = s.authenticate("blog@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "got {err:?}");
    assert_ne!(s.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_commands_out_of_order_rejected() {
    let server = FakeImap::new();
    let mut s = session(&server);
    s.connect().await.unwrap();
    assert!(matches!(s.select("INBOX").await, Err(Error::Protocol(_))));
    assert!(matches!(s.search_all().await, Err(Error::Protocol(_))));
}

// ─── Search and fetch ───────────────────────────────────────────

#[tokio::test]
async fn test_search_all_ascending() {
    let server = FakeImap::new();
    for uid in [30, 4, 12] {
        server.add_message(uid, raw_message("s", "b"));
    }
    let mut s = selected(&server).await;
    assert_eq!(s.search_all().await.unwrap(), vec![4, 12, 30]);
}

#[tokio::test]
async fn test_search_empty_mailbox() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;
    assert!(s.search_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_reads_literal() {
    let server = FakeImap::new();
    let raw = raw_message("Literal", "line one\r\n) not the end\r\nline three");
    server.add_message(7, raw.clone());
    let mut s = selected(&server).await;

    assert_eq!(s.fetch(7).await.unwrap(), raw);
    assert!(server
        .commands()
        .contains(&"UID FETCH 7 (BODY.PEEK[])".to_string()));
}

#[tokio::test]
async fn test_fetch_failures_keep_session_usable() {
    let server = FakeImap::new();
    server.add_message(1, raw_message("ok", "ok"));
    server.add_message(2, raw_message("broken", "x"));
    server.break_message(2);
    let mut s = selected(&server).await;

    assert!(matches!(s.fetch(2).await, Err(Error::Protocol(_))));
    assert!(matches!(s.fetch(99).await, Err(Error::Protocol(_))));
    assert!(s.is_usable());
    assert!(s.fetch(1).await.is_ok());
}

#[tokio::test]
async fn test_failed_search_reports_change_again() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;
    server.add_message(3, raw_message("late", "body"));

    server.fail_next("UID SEARCH");
    assert!(matches!(s.search_all().await, Err(Error::Protocol(_))));
    assert!(s.is_usable());

    // The failed search did not consume the change
    assert_eq!(
        s.wait_for_push(TIMEOUT).await.unwrap(),
        PushOutcome::NewMessages
    );
    assert_eq!(server.count("IDLE"), 0);
    assert_eq!(s.search_all().await.unwrap(), vec![3]);
}

// ─── Push wait ──────────────────────────────────────────────────

#[tokio::test]
async fn test_push_new_messages() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;

    let pusher = server.clone();
    tokio::spawn(async move {
        pusher.wait_for("IDLE", 1).await;
        pusher.deliver(5, raw_message("new", "body"));
    });

    let outcome = s.wait_for_push(TIMEOUT).await.unwrap();
    assert_eq!(outcome, PushOutcome::NewMessages);
    assert_eq!(s.state(), SessionState::Idling);

    s.cancel_wait().await.unwrap();
    assert_eq!(s.state(), SessionState::Selected);
    assert_eq!(server.count("DONE"), 1);
    assert_eq!(s.search_all().await.unwrap(), vec![5]);
}

#[tokio::test]
async fn test_push_timeout_keeps_idle() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;

    let outcome = s.wait_for_push(Duration::from_millis(50)).await.unwrap();
    assert_eq!(outcome, PushOutcome::Timeout);
    assert_eq!(s.state(), SessionState::Idling);

    // Waiting again does not issue a second IDLE
    let outcome = s.wait_for_push(Duration::from_millis(20)).await.unwrap();
    assert_eq!(outcome, PushOutcome::Timeout);
    assert_eq!(server.count("IDLE"), 1);

    s.cancel_wait().await.unwrap();
    assert_eq!(s.state(), SessionState::Selected);
    // No outstanding wait: no-op
    s.cancel_wait().await.unwrap();
    assert_eq!(server.count("DONE"), 1);
}

#[tokio::test]
async fn test_push_bye_closes() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;

    let pusher = server.clone();
    tokio::spawn(async move {
        pusher.wait_for("IDLE", 1).await;
        pusher.send(ServerEvent::Bye);
    });

    assert_eq!(s.wait_for_push(TIMEOUT).await.unwrap(), PushOutcome::Closed);
    assert_eq!(s.state(), SessionState::Disconnected);
    assert!(!s.is_usable());
}

#[tokio::test]
async fn test_push_hangup_closes() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;

    let pusher = server.clone();
    tokio::spawn(async move {
        pusher.wait_for("IDLE", 1).await;
        pusher.send(ServerEvent::Hangup);
    });

    assert_eq!(s.wait_for_push(TIMEOUT).await.unwrap(), PushOutcome::Closed);
    assert_eq!(s.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_push_wait_can_be_dropped_and_resumed() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;

    // Abandon the wait from outside, as a shutdown race would
    let dropped = tokio::time::timeout(Duration::from_millis(50), s.wait_for_push(TIMEOUT)).await;
    assert!(dropped.is_err());
    assert_eq!(s.state(), SessionState::Idling);

    server.deliver(9, raw_message("late", "body"));
    assert_eq!(
        s.wait_for_push(TIMEOUT).await.unwrap(),
        PushOutcome::NewMessages
    );
    assert_eq!(server.count("IDLE"), 1);
}

#[tokio::test]
async fn test_push_wait_with_unbounded_timeout() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;

    let forever = Duration::from_secs(u64::MAX);
    let dropped = tokio::time::timeout(Duration::from_millis(50), s.wait_for_push(forever)).await;
    assert!(dropped.is_err());
    assert_eq!(s.state(), SessionState::Idling);

    server.deliver(4, raw_message("news", "body"));
    assert_eq!(
        s.wait_for_push(Duration::MAX).await.unwrap(),
        PushOutcome::NewMessages
    );
}

#[tokio::test]
async fn test_change_before_idle_reported_immediately() {
    let server = FakeImap::new();
    server.add_message(1, raw_message("a", "b"));
    let mut s = session(&server);
    s.connect().await.unwrap();
    s.authenticate("blog@example.com", "secret").await.unwrap();
    // SELECT announces "* 1 EXISTS"; nothing has searched since
    s.select("INBOX").await.unwrap();

    assert_eq!(
        s.wait_for_push(TIMEOUT).await.unwrap(),
        PushOutcome::NewMessages
    );
    assert_eq!(server.count("IDLE"), 0);
}

// ─── Disconnect ─────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_while_idling() {
    let server = FakeImap::new();
    let mut s = selected(&server).await;
    let _ = s.wait_for_push(Duration::from_millis(20)).await.unwrap();

    s.disconnect().await;
    assert_eq!(s.state(), SessionState::Disconnected);
    assert_eq!(server.count("DONE"), 1);
    assert_eq!(server.count("LOGOUT"), 1);
}

#[tokio::test]
async fn test_disconnect_when_not_connected() {
    let server = FakeImap::new();
    let mut s = session(&server);
    s.disconnect().await;
    assert_eq!(s.state(), SessionState::Disconnected);
    assert_eq!(server.connections(), 0);
}
