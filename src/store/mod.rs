//! Shared message cache.

pub mod mailbox;

pub use mailbox::{MailboxStore, DEFAULT_CAPACITY};
