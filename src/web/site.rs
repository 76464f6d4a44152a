//! Request handling independent of the HTTP framework.

use std::sync::Arc;

use chrono::Utc;

use super::auth::BasicAuth;
use crate::error::{Error, Result};
use crate::render::Renderer;
use crate::store::MailboxStore;

/// Everything the HTTP handlers need: the cache, the renderer and the
/// optional access control.
#[derive(Debug)]
pub struct Site {
    store: Arc<MailboxStore>,
    renderer: Renderer,
    auth: Option<BasicAuth>,
}

impl Site {
    pub fn new(store: Arc<MailboxStore>, renderer: Renderer, auth: Option<BasicAuth>) -> Self {
        Self {
            store,
            renderer,
            auth,
        }
    }

    /// Blog page with every cached message.
    pub fn index(&self, authorization: Option<&str>) -> Result<String> {
        self.authorize(authorization)?;
        let emails = self.store.snapshot();
        Ok(self.renderer.index_page(&emails, Utc::now()))
    }

    /// Page of one message.
    pub fn email(&self, authorization: Option<&str>, uid: &str) -> Result<String> {
        self.authorize(authorization)?;
        let email = self
            .store
            .lookup(uid)
            .ok_or_else(|| Error::NotFound(uid.to_string()))?;
        Ok(self.renderer.email_page(&email, Utc::now()))
    }

    /// RSS feed of every cached message.
    pub fn feed(&self, authorization: Option<&str>) -> Result<String> {
        self.authorize(authorization)?;
        let emails = self.store.snapshot();
        self.renderer.feed(&emails, Utc::now())
    }

    fn authorize(&self, authorization: Option<&str>) -> Result<()> {
        match &self.auth {
            Some(auth) => auth.verify(authorization),
            None => Ok(()),
        }
    }
}
