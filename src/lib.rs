//! `mailblog` — publish a live IMAP mailbox as a blog page and RSS feed.
//!
//! A synchronizer keeps an IMAP IDLE session open and mirrors the newest
//! messages of one mailbox into a bounded in-memory store. HTTP handlers
//! render that store on demand as sanitized HTML and RSS.

pub mod config;
pub mod error;
pub mod imap;
pub mod model;
pub mod parser;
pub mod render;
pub mod store;
pub mod sync;
pub mod web;
