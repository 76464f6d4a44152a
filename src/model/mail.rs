//! Normalized email record shared between the synchronizer, the store and the
//! renderer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// How the body of an [`Email`] should be interpreted when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    /// Plain text. Every character is escaped on output.
    #[default]
    Plain,
    /// HTML markup, passed through an allow-list sanitizer.
    Html,
    /// Markdown, converted to HTML and then sanitized like `Html`.
    Markdown,
}

impl ContentType {
    /// Map a MIME type (`text/html`, `Text/Markdown; charset=utf-8`, …) to a
    /// content type. Anything unrecognized is plain text.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "text/html" => Self::Html,
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            _ => Self::Plain,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Html => "html",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "text/plain" => Ok(Self::Plain),
            "html" | "text/html" => Ok(Self::Html),
            "markdown" | "md" | "text/markdown" => Ok(Self::Markdown),
            other => Err(format!("unknown content type '{other}'")),
        }
    }
}

/// A single cached message, immutable once built.
///
/// Header fields are already decoded (no RFC 2047 encoded-words left) but are
/// never escaped here. Escaping is the renderer's job.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    /// Server UID, unique within the mailbox.
    pub uid: String,

    /// Decoded `Subject:` header.
    pub subject: String,

    /// Decoded `From:` header, as written by the sender.
    pub from: String,

    /// Decoded `Date:` header text.
    pub date_raw: String,

    /// Best-effort parse of `date_raw`.
    pub date_parsed: Option<DateTime<Utc>>,

    /// Body text.
    pub content: String,

    /// How `content` should be rendered.
    pub content_type: ContentType,
}

impl Email {
    /// Build a plain-text email with only the fields the renderer needs.
    /// Mostly useful in tests and fixtures.
    pub fn plain(
        uid: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            subject: subject.into(),
            from: String::new(),
            date_raw: String::new(),
            date_parsed: None,
            content: content.into(),
            content_type: ContentType::Plain,
        }
    }
}
