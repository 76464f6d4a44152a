//! IMAP client: TLS transport and the session state machine used by the
//! synchronizer, on top of `async-imap`.

pub mod session;
pub mod transport;

pub use session::{PushOutcome, Session, SessionState};
pub use transport::{Connector, ImapStream, TlsConnector};
