//! Memory-bounded resource cache with water-mark eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::Resource;

/// Default size above which a cleanup runs (32 MB).
pub const DEFAULT_HIGH_WATER_MARK: usize = 32 * 1024 * 1024;

/// Default size a cleanup evicts down to (16 MB).
pub const DEFAULT_LOW_WATER_MARK: usize = 16 * 1024 * 1024;

/// Sizing and retention policy of a [`BoundedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Total size in bytes above which an insert triggers a cleanup.
    pub high_water_mark: usize,
    /// Total size in bytes a cleanup evicts down to.
    pub low_water_mark: usize,
    /// Hold payloads through weak references only.
    pub weak_payloads: bool,
    /// Recycle evicted payloads that no slot is bound to.
    pub recycle_on_evict: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            weak_payloads: false,
            recycle_on_evict: false,
        }
    }
}

enum Payload<R> {
    Strong(Arc<R>),
    Weak(Weak<R>),
}

impl<R> Payload<R> {
    fn new(payload: &Arc<R>, weak: bool) -> Self {
        if weak {
            Self::Weak(Arc::downgrade(payload))
        } else {
            Self::Strong(Arc::clone(payload))
        }
    }

    fn upgrade(&self) -> Option<Arc<R>> {
        match self {
            Self::Strong(payload) => Some(Arc::clone(payload)),
            Self::Weak(payload) => payload.upgrade(),
        }
    }
}

struct CachedResource<R> {
    payload: Payload<R>,
    size_bytes: usize,
    access_count: u64,
    binding_count: u32,
    generation: u64,
}

struct CacheState<R> {
    entries: HashMap<String, CachedResource<R>>,
    total_size: usize,
    next_generation: u64,
}

impl<R> CacheState<R> {
    fn remove(&mut self, url: &str) -> Option<CachedResource<R>> {
        let entry = self.entries.remove(url)?;
        self.total_size = self.total_size.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// Read-only view of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryInfo {
    /// Resource key.
    pub url: String,
    /// Accounted size in bytes.
    pub size_bytes: usize,
    /// Accesses since the last cleanup.
    pub access_count: u64,
    /// Slots currently showing the resource.
    pub binding_count: u32,
    /// Lineage of the entry. A URL stored again after eviction gets a new one.
    pub generation: u64,
    /// False if a weakly held payload was already reclaimed.
    pub alive: bool,
}

/// URL-keyed cache of decoded resources bounded by total size.
///
/// `total_size` always equals the sum of the sizes of live entries; it is
/// maintained incrementally on every insert and removal.
pub struct BoundedCache<R: Resource> {
    state: Mutex<CacheState<R>>,
    policy: CachePolicy,
    cleaning: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    cleanups: AtomicU64,
}

impl<R: Resource> BoundedCache<R> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                total_size: 0,
                next_generation: 0,
            }),
            policy,
            cleaning: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
        }
    }

    /// Returns the cache policy.
    #[must_use]
    pub const fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Looks up a resource and counts the access.
    ///
    /// A weakly held payload that was already reclaimed is dropped from the
    /// cache and reported as a miss.
    pub fn get(&self, url: &str) -> Option<Arc<R>> {
        let mut state = self.state.lock();
        let lookup = state.entries.get_mut(url).map(|entry| {
            let payload = entry.payload.upgrade();
            if payload.is_some() {
                entry.access_count += 1;
            }
            payload
        });
        let payload = match lookup {
            Some(Some(payload)) => Some(payload),
            Some(None) => {
                state.remove(url);
                trace!(url, "Cached payload was reclaimed");
                None
            }
            None => None,
        };
        drop(state);

        if payload.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(url, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(url, "Cache miss");
        }
        payload
    }

    /// Looks up a resource without counting the access.
    pub fn peek(&self, url: &str) -> Option<Arc<R>> {
        let state = self.state.lock();
        state.entries.get(url).and_then(|entry| entry.payload.upgrade())
    }

    /// Counts an access to an entry obtained outside [`BoundedCache::get`].
    pub fn record_access(&self, url: &str) -> bool {
        let mut state = self.state.lock();
        state.entries.get_mut(url).is_some_and(|entry| {
            entry.access_count += 1;
            true
        })
    }

    /// Stores a resource, replacing any previous entry for `url`.
    ///
    /// The previous entry's counters and generation carry over to the new
    /// one, so slots bound to it stay accounted. Runs a cleanup if the total
    /// size ends up above the high-water mark.
    pub fn put(&self, url: impl Into<String>, payload: &Arc<R>) {
        let url = url.into();
        let size_bytes = payload.size_bytes();

        let over = {
            let mut state = self.state.lock();
            let (access_count, binding_count, generation) = match state.remove(&url) {
                Some(prior) => (prior.access_count, prior.binding_count, prior.generation),
                None => {
                    state.next_generation += 1;
                    (0, 0, state.next_generation)
                }
            };

            state.entries.insert(
                url.clone(),
                CachedResource {
                    payload: Payload::new(payload, self.policy.weak_payloads),
                    size_bytes,
                    access_count: access_count + 1,
                    binding_count,
                    generation,
                },
            );
            state.total_size += size_bytes;
            debug!(url = %url, size_bytes, total = state.total_size, "Stored resource in cache");
            state.total_size > self.policy.high_water_mark
        };

        if over {
            self.cleanup();
        }
    }

    /// Marks the entry as bound to one more slot and returns its generation,
    /// or `None` if `url` is not cached.
    pub fn bind(&self, url: &str) -> Option<u64> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(url)?;
        entry.binding_count += 1;
        Some(entry.generation)
    }

    /// Marks the entry as bound to one slot fewer.
    ///
    /// Only counts against the entry if it is still the `generation` the slot
    /// was bound to. A binding to an evicted entry does not protect its
    /// successor.
    pub fn unbind(&self, url: &str, generation: u64) {
        let mut state = self.state.lock();
        match state.entries.get_mut(url) {
            Some(entry) if entry.generation == generation => {
                entry.binding_count = entry.binding_count.saturating_sub(1);
            }
            Some(entry) => {
                trace!(url, generation, current = entry.generation, "Stale unbind ignored");
            }
            None => {}
        }
    }

    /// Evicts entries until the total size is at or below the low-water mark.
    ///
    /// Returns the number of evicted entries, or `None` if another cleanup
    /// was already running.
    pub fn cleanup(&self) -> Option<usize> {
        if self
            .cleaning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Cleanup already running");
            return None;
        }
        let _running = CleaningGuard(&self.cleaning);

        let mut recycled = Vec::new();
        let (evicted, before, after) = {
            let mut state = self.state.lock();
            let before = state.total_size;

            let mut candidates: Vec<(String, u64, bool)> = state
                .entries
                .iter()
                .map(|(url, entry)| {
                    let alive = !matches!(&entry.payload, Payload::Weak(weak) if weak.strong_count() == 0);
                    (url.clone(), entry.access_count, alive)
                })
                .collect();

            let mut evicted = 0;
            if self.policy.weak_payloads {
                candidates.retain(|(url, _, alive)| {
                    if !*alive {
                        state.remove(url);
                        evicted += 1;
                    }
                    *alive
                });
            }

            // Descending access count: the most used entries go first.
            candidates.sort_by(|a, b| b.1.cmp(&a.1));

            for (url, _, _) in candidates {
                if state.total_size <= self.policy.low_water_mark {
                    break;
                }
                if let Some(entry) = state.remove(&url) {
                    evicted += 1;
                    if self.policy.recycle_on_evict
                        && entry.binding_count == 0
                        && let Some(payload) = entry.payload.upgrade()
                    {
                        recycled.push(payload);
                    }
                }
            }

            for entry in state.entries.values_mut() {
                entry.access_count = 0;
            }
            (evicted, before, state.total_size)
        };

        for payload in recycled {
            payload.recycle();
        }

        self.cleanups.fetch_add(1, Ordering::Relaxed);
        debug!(evicted, before, after, "Cache cleanup finished");
        Some(evicted)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_size = 0;
        debug!("Cleared resource cache");
    }

    /// Accounted size of all entries in bytes.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.state.lock().total_size
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of completed cleanups.
    #[must_use]
    pub fn cleanup_count(&self) -> u64 {
        self.cleanups.load(Ordering::Relaxed)
    }

    /// Snapshot of every entry, sorted by URL.
    #[must_use]
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let state = self.state.lock();
        let mut entries: Vec<_> = state
            .entries
            .iter()
            .map(|(url, entry)| CacheEntryInfo {
                url: url.clone(),
                size_bytes: entry.size_bytes,
                access_count: entry.access_count,
                binding_count: entry.binding_count,
                generation: entry.generation,
                alive: entry.payload.upgrade().is_some(),
            })
            .collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        entries
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let (size, bytes) = {
            let state = self.state.lock();
            (state.entries.len(), state.total_size)
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            size,
            bytes,
            cleanups: self.cleanup_count(),
        }
    }
}

struct CleaningGuard<'a>(&'a AtomicBool);

impl Drop for CleaningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached resources.
    pub size: usize,
    /// Current accounted size in bytes.
    pub bytes: usize,
    /// Completed cleanups.
    pub cleanups: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} resources ({} bytes), {:.1}% hit rate ({} hits, {} misses), {} cleanups",
            self.size, self.bytes, self.hit_rate, self.hits, self.misses, self.cleanups
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::mocks::Blob;

    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;

    fn policy(high: usize, low: usize) -> CachePolicy {
        CachePolicy {
            high_water_mark: high,
            low_water_mark: low,
            ..CachePolicy::default()
        }
    }

    fn blob(url: &str, size: usize) -> Arc<Blob> {
        Arc::new(Blob::new(url, size))
    }

    fn seed(cache: &BoundedCache<Blob>, url: &str, size: usize) {
        let mut state = cache.state.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.entries.insert(
            url.to_string(),
            CachedResource {
                payload: Payload::Strong(blob(url, size)),
                size_bytes: size,
                access_count: 0,
                binding_count: 0,
                generation,
            },
        );
        state.total_size += size;
    }

    fn accounted_sum(cache: &BoundedCache<Blob>) -> usize {
        cache.entries().iter().map(|e| e.size_bytes).sum()
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = BoundedCache::new(CachePolicy::default());
        cache.put("http://img/a.png", &blob("a", 100));

        let retrieved = cache.get("http://img/a.png");
        assert_eq!(retrieved.map(|b| b.size_bytes()), Some(100));
        assert_eq!(cache.total_size(), 100);
    }

    #[test]
    fn test_cache_miss() {
        let cache: BoundedCache<Blob> = BoundedCache::new(CachePolicy::default());
        assert!(cache.get("http://img/missing.png").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_put_replaces_and_folds_counters() {
        let cache = BoundedCache::new(CachePolicy::default());
        cache.put("u", &blob("u", 300));
        let _ = cache.get("u");
        let generation = cache.bind("u");

        cache.put("u", &blob("u", 200));

        let entries = cache.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size_bytes, 200);
        assert_eq!(entries[0].access_count, 3);
        assert_eq!(entries[0].binding_count, 1);
        assert_eq!(Some(entries[0].generation), generation);
        assert_eq!(cache.total_size(), 200);
    }

    #[test]
    fn test_total_size_tracks_entries() {
        let cache = BoundedCache::new(policy(10 * KB, 5 * KB));
        for i in 0..40 {
            let url = format!("http://img/{}.png", i % 13);
            cache.put(url.clone(), &blob(&url, (i % 7 + 1) * 300));
            if i % 3 == 0 {
                let _ = cache.get(&url);
            }
            assert_eq!(cache.total_size(), accounted_sum(&cache));
        }
        assert!(cache.cleanup_count() > 0);
    }

    #[test]
    fn test_puts_trigger_cleanup_above_high_water_mark() {
        let cache = BoundedCache::new(policy(4 * MB, 2 * MB));
        for i in 0..4 {
            cache.put(format!("http://img/{i}.png"), &blob("big", MB));
        }
        assert_eq!(cache.cleanup_count(), 0);

        cache.put("http://img/4.png", &blob("big", MB));

        assert_eq!(cache.cleanup_count(), 1);
        assert!(cache.total_size() <= 2 * MB);
        assert_eq!(cache.total_size(), accounted_sum(&cache));
    }

    #[test]
    fn test_insert_into_oversized_cache_converges() {
        let cache = BoundedCache::new(policy(4 * MB, 2 * MB));
        for i in 0..5 {
            seed(&cache, &format!("http://img/{i}.png"), MB);
        }
        assert_eq!(cache.total_size(), 5 * MB);

        cache.put("http://img/small.png", &blob("small", 200 * KB));

        assert_eq!(cache.cleanup_count(), 1);
        assert!(cache.total_size() <= 2 * MB);
        assert_eq!(cache.total_size(), accounted_sum(&cache));
    }

    #[test]
    fn test_cleanup_evicts_most_accessed_first() {
        let cache = BoundedCache::new(policy(usize::MAX, 2 * KB));
        cache.put("hot", &blob("hot", KB));
        cache.put("warm", &blob("warm", KB));
        cache.put("cold", &blob("cold", KB));
        for _ in 0..5 {
            let _ = cache.get("hot");
        }
        let _ = cache.get("warm");

        assert_eq!(cache.cleanup(), Some(1));

        assert!(cache.peek("hot").is_none());
        assert!(cache.peek("warm").is_some());
        assert!(cache.peek("cold").is_some());
    }

    #[test]
    fn test_cleanup_resets_access_counts() {
        let cache = BoundedCache::new(policy(usize::MAX, usize::MAX));
        cache.put("a", &blob("a", 10));
        let _ = cache.get("a");
        assert_eq!(cache.entries()[0].access_count, 2);

        assert_eq!(cache.cleanup(), Some(0));
        assert_eq!(cache.entries()[0].access_count, 0);
    }

    #[test]
    fn test_recycling_skips_bound_entries() {
        let cache = BoundedCache::new(CachePolicy {
            high_water_mark: usize::MAX,
            low_water_mark: 0,
            weak_payloads: false,
            recycle_on_evict: true,
        });
        let bound = blob("bound", 10);
        let free = blob("free", 10);
        cache.put("bound", &bound);
        cache.put("free", &free);
        cache.bind("bound");

        cache.cleanup();

        assert!(cache.is_empty());
        assert!(!bound.is_recycled());
        assert!(free.is_recycled());
    }

    #[test]
    fn test_binding_to_evicted_entry_does_not_unprotect_refetch() {
        let cache = BoundedCache::new(CachePolicy {
            high_water_mark: usize::MAX,
            low_water_mark: 0,
            weak_payloads: false,
            recycle_on_evict: true,
        });
        let first = blob("a", 10);
        cache.put("a", &first);
        let first_generation = cache.bind("a");
        assert_eq!(cache.cleanup(), Some(1));
        assert!(!first.is_recycled());

        let second = blob("a", 10);
        cache.put("a", &second);
        let second_generation = cache.bind("a");
        assert_ne!(first_generation, second_generation);

        // The slot that showed the evicted copy moves on.
        if let Some(generation) = first_generation {
            cache.unbind("a", generation);
        }
        assert_eq!(cache.entries()[0].binding_count, 1);

        cache.cleanup();
        assert!(cache.is_empty());
        assert!(!second.is_recycled());
    }

    #[test]
    fn test_unbind_matching_generation_releases_entry() {
        let cache = BoundedCache::new(CachePolicy::default());
        cache.put("a", &blob("a", 10));
        let generation = cache.bind("a");
        assert_eq!(cache.bind("missing"), None);

        if let Some(generation) = generation {
            cache.unbind("a", generation);
        }
        assert_eq!(cache.entries()[0].binding_count, 0);
    }

    #[test]
    fn test_weak_payload_reclaimed_is_a_miss() {
        let cache = BoundedCache::new(CachePolicy {
            weak_payloads: true,
            ..CachePolicy::default()
        });
        let kept = blob("kept", 10);
        cache.put("kept", &kept);
        cache.put("dropped", &blob("dropped", 20));

        assert_eq!(cache.total_size(), 30);
        assert!(cache.get("dropped").is_none());
        assert!(cache.get("kept").is_some());
        assert_eq!(cache.total_size(), 10);
    }

    #[test]
    fn test_cleanup_drops_reclaimed_weak_entries() {
        let cache = BoundedCache::new(CachePolicy {
            weak_payloads: true,
            ..policy(usize::MAX, usize::MAX)
        });
        let kept = blob("kept", 10);
        cache.put("kept", &kept);
        cache.put("dropped", &blob("dropped", 20));

        assert_eq!(cache.cleanup(), Some(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_size(), 10);
    }

    #[test]
    fn test_clear_resets_size() {
        let cache = BoundedCache::new(CachePolicy::default());
        cache.put("a", &blob("a", 10));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn test_concurrent_puts_keep_accounting() {
        let cache = Arc::new(BoundedCache::new(policy(64 * KB, 32 * KB)));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let url = format!("http://img/{}.png", (t * 7 + i) % 50);
                        cache.put(url, &blob("x", KB + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.total_size(), accounted_sum(&cache));
    }
}
