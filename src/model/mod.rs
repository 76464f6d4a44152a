//! Core data model types for cached email messages.

pub mod mail;

pub use mail::{ContentType, Email};
