//! Recent build logs, kept for `/buildlog`

use lru::LruCache;
use parking_lot::Mutex;
use safelight_builder::BuildLog;
use std::num::NonZeroUsize;
use uuid::Uuid;

#[derive(Debug)]
struct Inner {
    logs: LruCache<Uuid, BuildLog>,
    latest: Option<Uuid>,
}

/// Bounded registry of per-request build logs
#[derive(Debug)]
pub struct BuildLogRegistry {
    inner: Mutex<Inner>,
}

impl BuildLogRegistry {
    /// Registry keeping the `history` most recent logs
    #[must_use]
    pub fn new(history: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                logs: LruCache::new(history),
                latest: None,
            }),
        }
    }

    /// Register a fresh log and make it the latest
    pub fn start(&self) -> BuildLog {
        let log = BuildLog::new();
        let mut inner = self.inner.lock();
        inner.logs.push(log.id(), log.clone());
        inner.latest = Some(log.id());
        log
    }

    /// The log of the most recently started build
    pub fn latest(&self) -> Option<BuildLog> {
        let mut inner = self.inner.lock();
        let id = inner.latest?;
        inner.logs.get(&id).cloned()
    }

    /// The log with the given id, if it is still retained
    pub fn get(&self, id: &Uuid) -> Option<BuildLog> {
        self.inner.lock().logs.get(id).cloned()
    }
}
