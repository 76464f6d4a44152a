//! Bounded, deduplicated in-memory cache of recent messages.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::model::Email;

/// Default number of messages kept in memory.
pub const DEFAULT_CAPACITY: usize = 100;

/// The most recent messages of the mailbox, newest first.
///
/// One writer (the synchronizer) and many readers (HTTP handlers). Every
/// operation takes the lock once, so readers always see a state where
/// `seen` matches `recent` and the capacity bound holds.
#[derive(Debug)]
pub struct MailboxStore {
    capacity: usize,
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Newest first.
    recent: VecDeque<Arc<Email>>,
    /// UIDs of everything in `recent`.
    seen: HashSet<String>,
}

impl MailboxStore {
    /// Create an empty store. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: RwLock::new(Inner {
                recent: VecDeque::with_capacity(capacity),
                seen: HashSet::with_capacity(capacity),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a message at the front.
    ///
    /// Returns `false` (and changes nothing) if the UID is already cached.
    /// When the store is full the oldest message is evicted in the same
    /// critical section.
    pub fn insert(&self, email: Email) -> bool {
        let mut inner = self.write();
        if inner.seen.contains(&email.uid) {
            return false;
        }

        while inner.recent.len() >= self.capacity {
            if let Some(evicted) = inner.recent.pop_back() {
                inner.seen.remove(&evicted.uid);
                debug!(uid = %evicted.uid, "Evicted oldest cached email");
            }
        }

        inner.seen.insert(email.uid.clone());
        inner.recent.push_front(Arc::new(email));
        true
    }

    /// Remove and return the oldest message, if any.
    pub fn evict_oldest(&self) -> Option<Arc<Email>> {
        let mut inner = self.write();
        let evicted = inner.recent.pop_back()?;
        inner.seen.remove(&evicted.uid);
        Some(evicted)
    }

    /// Look up a cached message by UID.
    pub fn lookup(&self, uid: &str) -> Option<Arc<Email>> {
        let inner = self.read();
        if !inner.seen.contains(uid) {
            return None;
        }
        inner.recent.iter().find(|e| e.uid == uid).cloned()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.read().seen.contains(uid)
    }

    /// All cached messages, newest first, as of one instant.
    pub fn snapshot(&self) -> Vec<Arc<Email>> {
        self.read().recent.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave `Inner` half-updated (all
    // mutations are done before any call that could panic), so poisoning is
    // ignored.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MailboxStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn email(uid: &str) -> Email {
        Email::plain(uid, format!("Subject {uid}"), "body")
    }

    fn uids(store: &MailboxStore) -> Vec<String> {
        store.snapshot().iter().map(|e| e.uid.clone()).collect()
    }

    #[test]
    fn test_insert_puts_newest_first() {
        let store = MailboxStore::new(10);
        assert!(store.insert(email("1")));
        assert!(store.insert(email("2")));
        assert!(store.insert(email("3")));
        assert_eq!(uids(&store), vec!["3", "2", "1"]);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let store = MailboxStore::new(10);
        store.insert(email("1"));
        store.insert(email("2"));
        let before = uids(&store);

        assert!(!store.insert(email("1")));
        assert_eq!(uids(&store), before);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_over_capacity_evicts_oldest() {
        let store = MailboxStore::new(3);
        for uid in ["1", "2", "3", "4"] {
            store.insert(email(uid));
        }
        assert_eq!(uids(&store), vec!["4", "3", "2"]);
        assert!(!store.contains("1"));
        assert!(store.lookup("1").is_none());

        // The evicted UID may come back as a fresh entry
        assert!(store.insert(email("1")));
        assert_eq!(uids(&store), vec!["1", "4", "3"]);
    }

    #[test]
    fn test_evict_oldest() {
        let store = MailboxStore::new(3);
        store.insert(email("a"));
        store.insert(email("b"));
        let evicted = store.evict_oldest().unwrap();
        assert_eq!(evicted.uid, "a");
        assert!(!store.contains("a"));
        assert_eq!(store.len(), 1);

        store.evict_oldest();
        assert!(store.evict_oldest().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_returns_matching_email() {
        let store = MailboxStore::new(3);
        store.insert(email("42"));
        assert_eq!(store.lookup("42").unwrap().subject, "Subject 42");
        assert!(store.lookup("404").is_none());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let store = MailboxStore::new(0);
        assert_eq!(store.capacity(), 1);
        store.insert(email("1"));
        store.insert(email("2"));
        assert_eq!(uids(&store), vec!["2"]);
    }

    proptest! {
        #[test]
        fn prop_bounded_and_seen_mirrors_recent(
            capacity in 1usize..8,
            inserts in proptest::collection::vec(0u8..20, 0..64),
        ) {
            let store = MailboxStore::new(capacity);
            for uid in inserts {
                let before = uids(&store);
                let was_present = store.contains(&uid.to_string());
                let inserted = store.insert(email(&uid.to_string()));

                prop_assert_eq!(inserted, !was_present);
                if was_present {
                    prop_assert_eq!(uids(&store), before);
                }

                let inner = store.read();
                prop_assert!(inner.recent.len() <= capacity);
                prop_assert_eq!(inner.recent.len(), inner.seen.len());
                for e in &inner.recent {
                    prop_assert!(inner.seen.contains(&e.uid));
                }
            }
        }
    }
}
