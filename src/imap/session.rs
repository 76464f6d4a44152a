//! IMAP session state machine.

use std::future::Future;
use std::time::Duration;

use async_imap::extensions::idle::{Handle, IdleResponse};
use async_imap::imap_proto::{MailboxDatum, Response, Status};
use async_imap::types::UnsolicitedResponse;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::transport::{Connector, ImapStream};
use crate::error::{Error, Result};

/// Upper bound for the best-effort goodbye in [`Session::disconnect`].
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest single push wait. Longer requests return [`PushOutcome::Timeout`]
/// early and the caller simply waits again.
const MAX_PUSH_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Transport is up, not yet authenticated.
    Connecting,
    Authenticated,
    Selected,
    /// An `IDLE` command is outstanding.
    Idling,
}

/// Result of [`Session::wait_for_push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The server reported a change in the number of messages.
    NewMessages,
    /// Nothing happened before the deadline. The `IDLE` is still running.
    Timeout,
    /// The server closed the connection.
    Closed,
}

/// The live client in whichever shape the protocol state requires.
enum Link<S: ImapStream> {
    Greeting(async_imap::Client<S>),
    Ready(async_imap::Session<S>),
    Idle(Handle<S>),
}

/// A connection to one mailbox, driven through
/// `connect → authenticate → select → (search | fetch | wait_for_push)*`.
///
/// Any transport failure or server `BYE` drops the connection and resets the
/// state to [`SessionState::Disconnected`].
pub struct Session<C: Connector> {
    connector: C,
    command_timeout: Duration,
    link: Option<Link<C::Stream>>,
    state: SessionState,
    /// An `EXISTS` arrived since the last successful search.
    changed: bool,
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, command_timeout: Duration) -> Self {
        Self {
            connector,
            command_timeout,
            link: None,
            state: SessionState::Disconnected,
            changed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session can still run mailbox commands.
    pub fn is_usable(&self) -> bool {
        self.link.is_some() && matches!(self.state, SessionState::Selected | SessionState::Idling)
    }

    /// Open the transport. Any previous connection is dropped.
    pub async fn connect(&mut self) -> Result<()> {
        self.drop_connection();
        self.state = SessionState::Connecting;

        let stream = match bounded(self.command_timeout, self.connector.connect()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };
        self.link = Some(Link::Greeting(async_imap::Client::new(stream)));
        debug!("IMAP transport established");
        Ok(())
    }

    /// Read the greeting and log in.
    pub async fn authenticate(&mut self, user: &str, secret: &str) -> Result<()> {
        self.expect_state(SessionState::Connecting)?;
        let Some(Link::Greeting(mut client)) = self.link.take() else {
            self.drop_connection();
            return Err(Error::Transport("not connected".to_string()));
        };

        let result = bounded(self.command_timeout, async move {
            read_greeting(&mut client).await?;
            client
                .login(user, secret)
                .await
                .map_err(|(e, _)| match Error::from(e) {
                    Error::Protocol(text) => Error::Auth(text),
                    other => other,
                })
        })
        .await;

        match result {
            Ok(session) => {
                self.link = Some(Link::Ready(session));
                self.state = SessionState::Authenticated;
                info!(user = %user, "IMAP authenticated");
                Ok(())
            }
            Err(e) => {
                self.drop_connection();
                Err(e)
            }
        }
    }

    pub async fn select(&mut self, mailbox: &str) -> Result<()> {
        let timeout = self.command_timeout;
        let session = self.ready(SessionState::Authenticated)?;
        let result = bounded(timeout, async {
            Ok::<_, Error>(session.select(mailbox).await?)
        })
        .await;

        let selected = self.settle(result)?;
        // Nothing has been searched in this mailbox yet.
        self.changed = selected.exists > 0;
        self.state = SessionState::Selected;
        info!(mailbox = %mailbox, exists = selected.exists, "Mailbox selected");
        Ok(())
    }

    /// All UIDs in the selected mailbox, ascending.
    pub async fn search_all(&mut self) -> Result<Vec<u32>> {
        let timeout = self.command_timeout;
        self.ready(SessionState::Selected)?;
        // Anything announced before this point is covered by the search.
        self.drain_unsolicited();
        self.changed = false;

        let session = self.ready(SessionState::Selected)?;
        let result = bounded(timeout, async {
            Ok::<_, Error>(session.uid_search("ALL").await?)
        })
        .await;
        match self.settle(result) {
            Ok(uids) => {
                let mut uids: Vec<u32> = uids.into_iter().collect();
                uids.sort_unstable();
                Ok(uids)
            }
            Err(e) => {
                // Unanswered: the next wait reports the change again.
                self.changed = true;
                Err(e)
            }
        }
    }

    /// Raw bytes of the message with `uid`.
    pub async fn fetch(&mut self, uid: u32) -> Result<Vec<u8>> {
        let timeout = self.command_timeout;
        let session = self.ready(SessionState::Selected)?;
        let result = bounded(timeout, async {
            let responses: Vec<_> = session
                .uid_fetch(uid.to_string(), "(BODY.PEEK[])")
                .await?
                .collect()
                .await;

            let mut body = None;
            for response in responses {
                let fetch = response?;
                if body.is_none() {
                    body = fetch.body().map(<[u8]>::to_vec);
                }
            }
            body.ok_or_else(|| Error::Protocol(format!("no body returned for UID {uid}")))
        })
        .await;
        self.settle(result)
    }

    /// Wait for the server to report new messages.
    ///
    /// Issues `IDLE` unless one is already outstanding. The returned future
    /// may be dropped (for example when raced against shutdown) and the wait
    /// resumed by calling again.
    pub async fn wait_for_push(&mut self, timeout: Duration) -> Result<PushOutcome> {
        let deadline = Instant::now() + timeout.min(MAX_PUSH_WAIT);

        if self.state != SessionState::Idling {
            self.ready(SessionState::Selected)?;
            self.drain_unsolicited();
            if self.changed {
                debug!("Mailbox changed since the last search");
                return Ok(PushOutcome::NewMessages);
            }
            self.start_idle().await?;
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(PushOutcome::Timeout);
            }
            let Some(Link::Idle(handle)) = self.link.as_mut() else {
                return Err(Error::Protocol("not idling".to_string()));
            };

            let response = {
                let (wait, _interrupt) = handle.wait_with_timeout(remaining);
                wait.await
            };

            let data = match response {
                Ok(IdleResponse::NewData(data)) => data,
                Ok(IdleResponse::Timeout | IdleResponse::ManualInterrupt) => {
                    return Ok(PushOutcome::Timeout);
                }
                Err(e) => {
                    warn!(error = %e, "Connection failed while idling");
                    self.drop_connection();
                    return Ok(PushOutcome::Closed);
                }
            };

            match data.parsed() {
                Response::MailboxData(MailboxDatum::Exists(count)) => {
                    debug!(exists = count, "New message notification");
                    return Ok(PushOutcome::NewMessages);
                }
                Response::Data {
                    status: Status::Bye,
                    information,
                    ..
                } => {
                    info!(reason = ?information, "Server said goodbye while idling");
                    self.drop_connection();
                    return Ok(PushOutcome::Closed);
                }
                Response::Done { status, .. } => {
                    // The IDLE is over and cannot be resumed on this handle.
                    info!(status = ?status, "Server terminated IDLE");
                    self.drop_connection();
                    return Ok(PushOutcome::Closed);
                }
                // EXPUNGE, RECENT, FETCH flag updates
                other => debug!(response = ?other, "Ignoring response while idling"),
            }
        }
    }

    /// Leave `IDLE`: send `DONE` and consume its completion. No-op when no
    /// wait is outstanding.
    pub async fn cancel_wait(&mut self) -> Result<()> {
        if self.state != SessionState::Idling {
            return Ok(());
        }
        let Some(Link::Idle(handle)) = self.link.take() else {
            self.drop_connection();
            return Err(Error::Transport("not connected".to_string()));
        };

        let result = bounded(self.command_timeout, async {
            Ok::<_, Error>(handle.done().await?)
        })
        .await;
        match result {
            Ok(session) => {
                self.link = Some(Link::Ready(session));
                self.state = SessionState::Selected;
                debug!("IDLE finished");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Could not leave IDLE");
                self.drop_connection();
                Err(e)
            }
        }
    }

    /// Best-effort `DONE`/`LOGOUT`, then drop the transport. Never fails.
    pub async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            let timeout = DISCONNECT_TIMEOUT.min(self.command_timeout);
            let goodbye = bounded(timeout, async move {
                let mut session = match link {
                    Link::Greeting(_) => return Ok(()),
                    Link::Ready(session) => session,
                    Link::Idle(handle) => handle.done().await?,
                };
                Ok::<_, Error>(session.logout().await?)
            })
            .await;
            if let Err(e) = goodbye {
                debug!(error = %e, "Ignoring error during logout");
            }
            info!("IMAP session closed");
        }
        self.drop_connection();
    }

    async fn start_idle(&mut self) -> Result<()> {
        let Some(Link::Ready(session)) = self.link.take() else {
            self.drop_connection();
            return Err(Error::Transport("not connected".to_string()));
        };
        // Without a link the session reads as disconnected until IDLE is up.
        self.state = SessionState::Disconnected;

        let mut handle = session.idle();
        let result = bounded(self.command_timeout, async {
            Ok::<_, Error>(handle.init().await?)
        })
        .await;
        match result {
            Ok(()) => {
                self.link = Some(Link::Idle(handle));
                self.state = SessionState::Idling;
                debug!("IDLE started");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "IDLE rejected");
                self.drop_connection();
                Err(e)
            }
        }
    }

    /// Note any `EXISTS` the server slipped in alongside earlier commands.
    fn drain_unsolicited(&mut self) {
        let Some(Link::Ready(session)) = self.link.as_mut() else {
            return;
        };
        while let Ok(response) = session.unsolicited_responses.try_recv() {
            match response {
                UnsolicitedResponse::Exists(count) => {
                    debug!(exists = count, "Unsolicited EXISTS");
                    self.changed = true;
                }
                other => debug!(response = ?other, "Ignoring unsolicited response"),
            }
        }
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(Error::Protocol(format!(
                "session is {:?}, expected {:?}",
                self.state, expected
            )));
        }
        Ok(())
    }

    fn ready(&mut self, expected: SessionState) -> Result<&mut async_imap::Session<C::Stream>> {
        self.expect_state(expected)?;
        match self.link.as_mut() {
            Some(Link::Ready(session)) => Ok(session),
            _ => Err(Error::Transport("not connected".to_string())),
        }
    }

    /// Drop the connection on transport failures and pass the result through.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_transport() {
                warn!(error = %e, "IMAP connection lost");
                self.drop_connection();
            }
        }
        result
    }

    fn drop_connection(&mut self) {
        self.link = None;
        self.changed = false;
        self.state = SessionState::Disconnected;
    }
}

/// Consume the server greeting; only `* OK` may precede `LOGIN`.
async fn read_greeting<S: ImapStream>(client: &mut async_imap::Client<S>) -> Result<()> {
    let greeting = client
        .read_response()
        .await
        .ok_or_else(|| Error::Transport("connection closed before greeting".to_string()))?
        .map_err(|e| Error::Transport(format!("reading greeting: {e}")))?;

    match greeting.parsed() {
        Response::Data {
            status: Status::Ok,
            ..
        } => Ok(()),
        Response::Data {
            status: Status::PreAuth,
            ..
        } => Err(Error::Protocol(
            "pre-authenticated connections are not supported".to_string(),
        )),
        other => Err(Error::Protocol(format!("unexpected greeting: {other:?}"))),
    }
}

/// Run `fut` with a deadline; running out of time is a transport failure.
async fn bounded<T>(timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Transport(format!(
            "no response within {}s",
            timeout.as_secs()
        ))),
    }
}
