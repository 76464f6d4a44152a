//! Mailbox synchronizer: keeps the [`MailboxStore`] filled with the newest
//! messages of one mailbox, reconnecting for as long as the process runs.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::imap::{Connector, PushOutcome, Session};
use crate::parser::decode_message;
use crate::store::MailboxStore;

/// Account and timing parameters of the sync loop.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub username: String,
    pub password: String,
    pub mailbox: String,
    /// Messages fetched on (re)connect.
    pub bulk_window: usize,
    /// Messages fetched on each push notification.
    pub incremental_window: usize,
    pub idle_timeout: Duration,
    pub reconnect_backoff: Duration,
    pub idle_retry_backoff: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            username: config.imap.username.clone(),
            password: config.imap.password.clone(),
            mailbox: config.imap.mailbox.clone(),
            bulk_window: config.blog.capacity,
            incremental_window: config.imap.incremental_window,
            idle_timeout: config.imap.idle_timeout(),
            reconnect_backoff: config.imap.reconnect_backoff(),
            idle_retry_backoff: config.imap.idle_retry_backoff(),
        }
    }
}

/// How a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Server hung up; reconnect right away.
    Closed,
    Shutdown,
}

/// Drives a [`Session`] and writes decoded messages into the store.
pub struct Synchronizer<C: Connector> {
    session: Session<C>,
    store: Arc<MailboxStore>,
    settings: SyncSettings,
}

impl<C: Connector> Synchronizer<C> {
    pub fn new(session: Session<C>, store: Arc<MailboxStore>, settings: SyncSettings) -> Self {
        Self {
            session,
            store,
            settings,
        }
    }

    /// Run until `shutdown` is cancelled, then log out and return.
    ///
    /// Failures never end the loop: the session is rebuilt after
    /// `reconnect_backoff`.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(mailbox = %self.settings.mailbox, "Mailbox synchronizer started");

        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Ok(SessionEnd::Shutdown),
                r = self.run_session(&shutdown) => r,
            };

            match result {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => {
                    info!("IMAP connection closed by server, reconnecting");
                }
                Err(e) => {
                    match &e {
                        Error::Auth(_) => error!(
                            user = %self.settings.username,
                            error = %e,
                            "IMAP login rejected, check the account credentials"
                        ),
                        _ => warn!(error = %e, "IMAP session failed"),
                    }
                    self.session.disconnect().await;
                    info!(
                        secs = self.settings.reconnect_backoff.as_secs(),
                        "Reconnecting after backoff"
                    );
                    if !pause(&shutdown, self.settings.reconnect_backoff).await {
                        break;
                    }
                }
            }
        }

        self.session.disconnect().await;
        info!("Mailbox synchronizer stopped");
    }

    /// One connection lifetime: connect, log in, bulk sync, then watch.
    async fn run_session(&mut self, shutdown: &CancellationToken) -> Result<SessionEnd> {
        self.session.connect().await?;
        self.session
            .authenticate(&self.settings.username, &self.settings.password)
            .await?;
        self.session.select(&self.settings.mailbox).await?;

        self.bulk_sync().await?;
        self.watch(shutdown).await
    }

    async fn bulk_sync(&mut self) -> Result<()> {
        let uids = self.session.search_all().await?;
        let window = newest(&uids, self.settings.bulk_window);
        let added = self.sync_uids(window).await?;
        info!(
            total = uids.len(),
            fetched = added,
            cached = self.store.len(),
            "Initial sync complete"
        );
        Ok(())
    }

    /// Push-wait loop on a selected mailbox.
    async fn watch(&mut self, shutdown: &CancellationToken) -> Result<SessionEnd> {
        loop {
            let step = match self.session.wait_for_push(self.settings.idle_timeout).await {
                Ok(PushOutcome::NewMessages) => self.pull_new().await,
                Ok(PushOutcome::Timeout) => {
                    debug!("IDLE timeout, refreshing");
                    self.session.cancel_wait().await
                }
                Ok(PushOutcome::Closed) => return Ok(SessionEnd::Closed),
                Err(e) => Err(e),
            };

            if let Err(e) = step {
                if !self.session.is_usable() {
                    return Err(e);
                }
                warn!(
                    error = %e,
                    secs = self.settings.idle_retry_backoff.as_secs(),
                    "Waiting for new mail failed, retrying"
                );
                if !pause(shutdown, self.settings.idle_retry_backoff).await {
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    async fn pull_new(&mut self) -> Result<()> {
        self.session.cancel_wait().await?;
        let uids = self.session.search_all().await?;
        let window = newest(&uids, self.settings.incremental_window);
        let added = self.sync_uids(window).await?;
        if added > 0 {
            info!(added, cached = self.store.len(), "New mail synced");
        }
        Ok(())
    }

    /// Fetch, decode and store each uid not already cached, in order.
    ///
    /// A message that fails is skipped. The batch stops early only if the
    /// session itself is gone.
    async fn sync_uids(&mut self, uids: &[u32]) -> Result<usize> {
        let mut added = 0;
        for &uid in uids {
            let key = uid.to_string();
            if self.store.contains(&key) {
                continue;
            }

            match self.fetch_one(uid, &key).await {
                Ok(true) => {
                    added += 1;
                    debug!(uid = %key, "Stored email");
                }
                Ok(false) => {}
                Err(e) if !self.session.is_usable() => return Err(e),
                Err(e) => warn!(uid = %key, error = %e, "Skipping message"),
            }
        }
        Ok(added)
    }

    async fn fetch_one(&mut self, uid: u32, key: &str) -> Result<bool> {
        let raw = self.session.fetch(uid).await?;
        let email = decode_message(key, &raw)?;
        Ok(self.store.insert(email))
    }
}

/// The last `n` entries of an ascending list.
fn newest(uids: &[u32], n: usize) -> &[u32] {
    &uids[uids.len().saturating_sub(n)..]
}

/// Sleep unless shut down first. Returns `false` on shutdown.
async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
