//! Blog page and RSS feed generation from cached messages.
//!
//! Both outputs are built on demand from a store snapshot. Message bodies go
//! through [`sanitize`] according to their content type and the configured
//! [`RenderMode`]; headers are always escaped.

pub mod feed;
pub mod page;
pub mod sanitize;
pub mod template;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::model::{ContentType, Email};

pub use template::{PageValues, Template};

/// Format of the "last updated" line.
pub const LAST_UPDATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How message bodies are turned into HTML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Follow each message's content type.
    #[default]
    Auto,
    /// Escape every body as plain text.
    Plain,
    /// Treat plain-text bodies as Markdown. HTML bodies stay HTML.
    Markdown,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Plain => "plain",
            Self::Markdown => "markdown",
        }
    }

    /// The content type a body is rendered as under this mode.
    pub fn effective(self, content_type: ContentType) -> ContentType {
        match (self, content_type) {
            (Self::Auto, ct) => ct,
            (Self::Plain, _) => ContentType::Plain,
            (Self::Markdown, ContentType::Plain) => ContentType::Markdown,
            (Self::Markdown, ct) => ct,
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "plain" => Ok(Self::Plain),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!("unknown render mode '{other}'")),
        }
    }
}

/// Renders the blog page, single-message pages and the feed.
#[derive(Debug, Clone)]
pub struct Renderer {
    template: Template,
    title: String,
    public_url: String,
    mode: RenderMode,
}

impl Renderer {
    pub fn new(
        template: Template,
        title: impl Into<String>,
        public_url: impl Into<String>,
        mode: RenderMode,
    ) -> Self {
        Self {
            template,
            title: title.into(),
            public_url: public_url.into(),
            mode,
        }
    }

    /// Build from configuration, loading a custom template if one is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let template = match &config.blog.template {
            Some(path) => Template::load(path)?,
            None => Template::builtin()?,
        };
        Ok(Self::new(
            template,
            &config.blog.title,
            &config.server.public_url,
            config.blog.render_mode,
        ))
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Safe HTML for a message body.
    pub fn body_html(&self, email: &Email) -> String {
        match self.mode.effective(email.content_type) {
            ContentType::Plain => sanitize::plain_to_html(&email.content),
            ContentType::Html => sanitize::sanitize_html(&email.content),
            ContentType::Markdown => sanitize::markdown_to_html(&email.content),
        }
    }

    /// The list page, newest first as given.
    pub fn index_page(&self, emails: &[Arc<Email>], now: DateTime<Utc>) -> String {
        let entries: Vec<(&Email, String)> = emails
            .iter()
            .map(|e| (e.as_ref(), self.body_html(e)))
            .collect();
        self.fill(&page::list(&entries), now)
    }

    /// The page of one message.
    pub fn email_page(&self, email: &Email, now: DateTime<Utc>) -> String {
        self.fill(&page::single(email, &self.body_html(email)), now)
    }

    /// RSS document with one item per message.
    pub fn feed(&self, emails: &[Arc<Email>], now: DateTime<Utc>) -> Result<String> {
        let items: Vec<feed::Item> = emails
            .iter()
            .map(|e| feed::Item {
                title: e.subject.clone(),
                link: feed::item_link(&self.public_url, &e.uid),
                description: self.body_html(e),
                pub_date: feed::pub_date(e.date_parsed),
            })
            .collect();

        let description = format!("Latest emails published on {}", self.title);
        let channel = feed::Channel {
            title: &self.title,
            link: &self.public_url,
            description: &description,
            last_build: now,
        };
        feed::write_rss(&channel, &items)
    }

    fn fill(&self, content: &str, now: DateTime<Utc>) -> String {
        let title = sanitize::escape(&self.title);
        let last_updated = now.format(LAST_UPDATED_FORMAT).to_string();
        self.template.render(&PageValues {
            title: &title,
            last_updated: &last_updated,
            content,
        })
    }
}
