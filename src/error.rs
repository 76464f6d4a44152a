//! Centralized error types for mailblog.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailblog library.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket, TLS or I/O failure while talking to the mail server,
    /// including command timeouts.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server sent a malformed or unexpected response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server rejected the account credentials.
    #[error("Authentication rejected by server: {0}")]
    Auth(String),

    /// A message could not be decoded at all.
    #[error("Could not decode message {uid}: {reason}")]
    Decode { uid: String, reason: String },

    /// The requested message is not in the cache.
    #[error("Email not found: {0}")]
    NotFound(String),

    /// Missing or incorrect basic-auth credentials on a protected route.
    #[error("Authentication required")]
    AuthChallenge,

    /// The page template is unusable.
    #[error("Invalid template '{path}': {reason}")]
    Template { path: PathBuf, reason: String },

    /// The configuration is incomplete or inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The feed writer failed.
    #[error("Feed generation error: {0}")]
    Feed(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the session can no longer be used and must be
    /// re-established from scratch.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Classify a client library failure: a dead connection is a transport
/// error, anything the server said is a protocol error.
impl From<async_imap::error::Error> for Error {
    fn from(err: async_imap::error::Error) -> Self {
        use async_imap::error::Error as Imap;
        match err {
            Imap::Io(source) => Self::Transport(source.to_string()),
            Imap::ConnectionLost => Self::Transport("connection lost".to_string()),
            Imap::No(text) => Self::Protocol(format!("NO {text}")),
            Imap::Bad(text) => Self::Protocol(format!("BAD {text}")),
            other => Self::Protocol(other.to_string()),
        }
    }
}
