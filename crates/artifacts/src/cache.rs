//! In-memory LRU cache of artifact bundles

use crate::{ArtifactBundle, Error, Result, Signature, Target};
use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Composite cache key: one signature may be built for several targets
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CacheKey {
    /// Signature of the build inputs
    pub signature: Signature,
    /// Target the bundle was built for
    pub target: Target,
}

impl CacheKey {
    /// Create a key from its parts
    #[must_use]
    pub const fn new(signature: Signature, target: Target) -> Self {
        Self { signature, target }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.signature, self.target)
    }
}

/// Thread-safe, fixed-capacity LRU cache of artifact bundles
///
/// Every operation, reads included, takes the same lock because a lookup
/// updates recency.
pub struct ArtifactCache {
    entries: Mutex<LruCache<CacheKey, Arc<ArtifactBundle>>>,
}

impl ArtifactCache {
    /// Creates a new artifact cache
    ///
    /// # Errors
    ///
    /// Returns an error if capacity is 0
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::configuration("Cache capacity must be non-zero"))?;

        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Publish a bundle, replacing any entry with the same key
    ///
    /// Returns the shared handle now held by the cache.
    pub fn add(&self, bundle: ArtifactBundle) -> Arc<ArtifactBundle> {
        let key = CacheKey::new(bundle.signature().clone(), bundle.target().clone());
        let bundle = Arc::new(bundle);

        let evicted = self.entries.lock().push(key.clone(), Arc::clone(&bundle));
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            tracing::debug!(evicted = %evicted_key, "Evicted least recently used bundle");
        }

        bundle
    }

    /// Look up a bundle, refreshing its recency on a hit
    #[must_use]
    pub fn get(&self, signature: &Signature, target: &Target) -> Option<Arc<ArtifactBundle>> {
        let key = CacheKey::new(signature.clone(), target.clone());
        self.entries.lock().get(&key).cloned()
    }

    /// True if the key is cached; does not touch recency
    #[must_use]
    pub fn contains(&self, signature: &Signature, target: &Target) -> bool {
        let key = CacheKey::new(signature.clone(), target.clone());
        self.entries.lock().contains(&key)
    }

    /// Clears all entries from the cache
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the number of entries in the cache
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of entries
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("ArtifactCache")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}
