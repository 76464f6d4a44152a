//! Shared fakes for integration tests: an in-process IMAP server reached
//! through `tokio::io::duplex`.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::broadcast;

use mailblog::error::Result;
use mailblog::imap::Connector;

/// Something the server does on its own while a client is idling.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Announce the current message count.
    Exists,
    /// Say `* BYE` and hang up.
    Bye,
    /// Hang up without a word.
    Hangup,
}

#[derive(Debug)]
struct ServerState {
    greeting: String,
    username: String,
    password: String,
    messages: BTreeMap<u32, Vec<u8>>,
    broken: HashSet<u32>,
    /// Command prefixes answered with `NO` once each.
    failures: Vec<String>,
    commands: Vec<String>,
    connections: usize,
    refuse_connections: bool,
}

/// A tiny IMAP server holding one mailbox.
#[derive(Clone)]
pub struct FakeImap {
    state: Arc<Mutex<ServerState>>,
    events: broadcast::Sender<ServerEvent>,
}

impl FakeImap {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(ServerState {
                greeting: "* OK [CAPABILITY IMAP4rev1 IDLE] Fake IMAP ready".to_string(),
                username: "blog@example.com".to_string(),
                password: "secret".to_string(),
                messages: BTreeMap::new(),
                broken: HashSet::new(),
                failures: Vec::new(),
                commands: Vec::new(),
                connections: 0,
                refuse_connections: false,
            })),
            events,
        }
    }

    pub fn with_greeting(self, greeting: &str) -> Self {
        self.state.lock().unwrap().greeting = greeting.to_string();
        self
    }

    /// Add a message without telling connected clients.
    pub fn add_message(&self, uid: u32, raw: impl Into<Vec<u8>>) {
        self.state.lock().unwrap().messages.insert(uid, raw.into());
    }

    /// Add a message and announce it to idling clients.
    pub fn deliver(&self, uid: u32, raw: impl Into<Vec<u8>>) {
        self.add_message(uid, raw);
        self.send(ServerEvent::Exists);
    }

    /// Make FETCH of `uid` fail with `NO`.
    pub fn break_message(&self, uid: u32) {
        self.state.lock().unwrap().broken.insert(uid);
    }

    /// Answer the next command starting with `prefix` with `NO`.
    pub fn fail_next(&self, prefix: &str) {
        self.state.lock().unwrap().failures.push(prefix.to_string());
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_connections = refuse;
    }

    pub fn send(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Number of received commands starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// Wait until at least `n` commands starting with `prefix` arrived.
    pub async fn wait_for(&self, prefix: &str, n: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(prefix) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "timed out waiting for {n} x {prefix:?}; got {:?}",
            self.commands()
        );
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            server: self.clone(),
        }
    }

    async fn serve(self, stream: DuplexStream, mut events: broadcast::Receiver<ServerEvent>) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();

        let greeting = self.state.lock().unwrap().greeting.clone();
        if write.write_all(format!("{greeting}\r\n").as_bytes()).await.is_err() {
            return;
        }

        while let Ok(Some(line)) = lines.next_line().await {
            let Some((tag, command)) = line.split_once(' ') else {
                continue;
            };
            let upper = command.to_ascii_uppercase();
            let failed = {
                let mut state = self.state.lock().unwrap();
                state.commands.push(command.to_string());
                let hit = state.failures.iter().position(|p| upper.starts_with(p.as_str()));
                hit.map(|i| state.failures.remove(i)).is_some()
            };

            let reply = if failed {
                format!("{tag} NO try again later\r\n")
            } else if upper.starts_with("LOGIN ") {
                let state = self.state.lock().unwrap();
                let expected = format!("LOGIN \"{}\" \"{}\"", state.username, state.password);
                if command == expected {
                    format!("{tag} OK LOGIN completed\r\n")
                } else {
                    format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
                }
            } else if upper.starts_with("SELECT ") {
                let count = self.state.lock().unwrap().messages.len();
                format!(
                    "* {count} EXISTS\r\n* 0 RECENT\r\n* OK [UIDVALIDITY 1] UIDs valid\r\n\
                     {tag} OK [READ-WRITE] SELECT completed\r\n"
                )
            } else if upper == "UID SEARCH ALL" {
                let hits: String = self
                    .state
                    .lock()
                    .unwrap()
                    .messages
                    .keys()
                    .map(|u| format!(" {u}"))
                    .collect();
                format!("* SEARCH{hits}\r\n{tag} OK SEARCH completed\r\n")
            } else if let Some(rest) = upper.strip_prefix("UID FETCH ") {
                let uid: u32 = rest
                    .split_whitespace()
                    .next()
                    .and_then(|u| u.parse().ok())
                    .unwrap_or(0);
                let (raw, broken, seq) = {
                    let state = self.state.lock().unwrap();
                    let seq = state.messages.keys().position(|&u| u == uid).unwrap_or(0) + 1;
                    (
                        state.messages.get(&uid).cloned(),
                        state.broken.contains(&uid),
                        seq,
                    )
                };
                match raw {
                    _ if broken => format!("{tag} NO FETCH failed\r\n"),
                    Some(raw) => {
                        let mut out =
                            format!("* {seq} FETCH (UID {uid} BODY[] {{{}}}\r\n", raw.len())
                                .into_bytes();
                        out.extend_from_slice(&raw);
                        out.extend_from_slice(format!(")\r\n{tag} OK FETCH completed\r\n").as_bytes());
                        if write.write_all(&out).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    None => format!("{tag} OK FETCH completed\r\n"),
                }
            } else if upper == "IDLE" {
                if write.write_all(b"+ idling\r\n").await.is_err() {
                    return;
                }
                loop {
                    tokio::select! {
                        next = lines.next_line() => match next {
                            Ok(Some(done)) if done.eq_ignore_ascii_case("DONE") => {
                                self.state.lock().unwrap().commands.push("DONE".to_string());
                                break;
                            }
                            Ok(Some(_)) => continue,
                            _ => return,
                        },
                        event = events.recv() => match event {
                            Ok(ServerEvent::Exists) => {
                                let count = self.state.lock().unwrap().messages.len();
                                let note = format!("* {count} EXISTS\r\n");
                                if write.write_all(note.as_bytes()).await.is_err() {
                                    return;
                                }
                            }
                            Ok(ServerEvent::Bye) => {
                                let _ = write.write_all(b"* BYE server shutting down\r\n").await;
                                return;
                            }
                            Ok(ServerEvent::Hangup) | Err(broadcast::error::RecvError::Closed) => {
                                return;
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {}
                        },
                    }
                }
                format!("{tag} OK IDLE terminated\r\n")
            } else if upper == "LOGOUT" {
                let _ = write
                    .write_all(format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n").as_bytes())
                    .await;
                return;
            } else {
                format!("{tag} BAD unknown command\r\n")
            };

            if write.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

/// Connects sessions to a [`FakeImap`].
#[derive(Clone)]
pub struct FakeConnector {
    server: FakeImap,
}

impl Connector for FakeConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> Result<DuplexStream> {
        {
            let mut state = self.server.state.lock().unwrap();
            if state.refuse_connections {
                return Err(mailblog::error::Error::Transport(
                    "connection refused".to_string(),
                ));
            }
            state.connections += 1;
        }
        let (client, server) = tokio::io::duplex(256 * 1024);
        let events = self.server.events.subscribe();
        tokio::spawn(self.server.clone().serve(server, events));
        Ok(client)
    }
}

/// A minimal RFC 5322 message.
pub fn raw_message(subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: Alice <alice@example.com>\r\n\
         To: blog@example.com\r\n\
         Subject: {subject}\r\n\
         Date: Mon, 15 Jan 2024 09:00:00 +0000\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}\r\n"
    )
    .into_bytes()
}
