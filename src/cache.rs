//! The cache core: one mutex over the key index, the expiration index and
//! the LFRU eviction structure.
//!
//! ## Architecture
//!
//! ```text
//!   caller ──► MemCache ──► Mutex<CacheState>
//!                               ├── index:       key → (compressed bytes, key handle)
//!                               ├── expirations: key → deadline
//!                               └── freq:        FreqList (buckets + recency lists)
//!   reaper ──► same mutex ──► sweep_expired (lock-already-held removal path)
//! ```
//!
//! Every public operation holds the mutex for its whole critical section,
//! codec calls included. `get` is a writer: promotion mutates the eviction
//! structure, which is why there is a single `Mutex` and no reader/writer
//! split. Internal helpers on [`CacheState`] assume the lock is held and
//! never re-acquire it; the reaper goes through them for the same reason.
//!
//! The index and the frequency list must agree at every public exit: each
//! key in the index owns exactly one live node in the frequency list, and
//! the entry count matches on both sides. The expiration index is looser:
//! it may carry keys the index no longer holds (evicted or removed); the
//! sweeper discards such orphans without complaint.

use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::builder::MemCacheBuilder;
use crate::codec::{Bincode, Codec, Compression, Lz4};
use crate::ds::freq_list::{FreqList, KeyHandle};
use crate::error::CacheError;
use crate::mem::MemoryProbe;

/// Deadline assigned to entries stored with `ttl = 0`: far enough out that
/// the sweeper never reaches it.
const TTL_INFINITE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Slack added to the probed available memory before rejecting a resize.
const RESIZE_SLACK_BYTES: u64 = 1024;

#[derive(Debug)]
struct MapEntry<K> {
    /// Compressed serialization of the stored value.
    bytes: Vec<u8>,
    /// Non-owning reference into the frequency list.
    node: KeyHandle<K>,
}

/// Everything the mutex guards.
pub(crate) struct CacheState<K> {
    index: FxHashMap<K, MapEntry<K>>,
    expirations: FxHashMap<K, Instant>,
    freq: FreqList<K>,
    max_size: usize,
}

impl<K> CacheState<K>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            expirations: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            freq: FreqList::with_capacity(capacity),
            max_size: capacity,
        }
    }

    /// Removal path that assumes the lock is already held. The public
    /// `remove` and the reaper both delegate here; calling the public
    /// `remove` from the reaper would deadlock on the cache mutex.
    fn remove_entry(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(entry) => {
                self.freq.remove(entry.node);
                true
            }
            None => false,
        }
    }

    /// Evicts the LRU key of the LFU bucket (the sole member when that
    /// bucket is a singleton). Expiration entries for evicted keys are left
    /// behind on purpose; the sweeper cleans them up opportunistically.
    fn evict_one(&mut self) {
        if let Some((key, frequency)) = self.freq.pop_victim() {
            self.index.remove(&key);
            debug!(frequency, "evicted lowest-frequency entry");
        }
    }

    /// Walks the expiration index once and removes every entry whose
    /// deadline has passed. Entries whose key is no longer cached are
    /// dropped from the expiration index alone.
    pub(crate) fn sweep_expired(&mut self, now: Instant) -> usize {
        let due: Vec<K> = self
            .expirations
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in due {
            self.expirations.remove(&key);
            if self.remove_entry(&key) {
                removed += 1;
            }
        }
        removed
    }
}

/// State shared between the cache handle and its reaper thread.
pub(crate) struct CacheShared<K> {
    pub(crate) state: Mutex<CacheState<K>>,
    pub(crate) sweeper_wake: Condvar,
    /// Readable by the reaper without the cache mutex, so shutdown is never
    /// starved behind a long sweep.
    pub(crate) stop: AtomicBool,
}

/// Bounded key/value cache with LFRU eviction and per-entry TTL.
///
/// Values are stored as `compress(serialize(v))` and decoded on every hit.
/// All operations take `&self`; share the cache across threads by wrapping
/// it in an `Arc`. Dropping the cache stops and joins the reaper thread.
///
/// # Example
///
/// ```
/// use lfru::MemCache;
///
/// let cache: MemCache<&str, u32> = MemCache::new(2);
/// cache.put("a", &1, 0).unwrap();
/// cache.put("b", &2, 0).unwrap();
/// assert_eq!(cache.get(&"a").unwrap(), Some(1));
///
/// // "b" is the least-frequently-used entry and gets evicted.
/// cache.put("c", &3, 0).unwrap();
/// assert!(!cache.exists(&"b"));
/// ```
pub struct MemCache<K, V, C = Bincode, Z = Lz4>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    shared: Arc<CacheShared<K>>,
    probe: Box<dyn MemoryProbe>,
    reaper: Option<JoinHandle<()>>,
    _codec: PhantomData<fn() -> (V, C, Z)>,
}

impl<K, V> MemCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates a cache bounded to `capacity` entries, with the default
    /// codec, compressor, memory probe and sweep interval.
    pub fn new(capacity: usize) -> Self {
        Self::builder(capacity).build()
    }
}

impl<K, V, C, Z> MemCache<K, V, C, Z>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Starts configuring a cache. Select a non-default codec or
    /// compressor by naming them in the cache's type parameters.
    pub fn builder(capacity: usize) -> MemCacheBuilder<K, V, C, Z> {
        MemCacheBuilder::new(capacity)
    }

    pub(crate) fn from_parts(
        shared: Arc<CacheShared<K>>,
        probe: Box<dyn MemoryProbe>,
        reaper: JoinHandle<()>,
    ) -> Self {
        Self {
            shared,
            probe,
            reaper: Some(reaper),
            _codec: PhantomData,
        }
    }

    /// Returns `true` if `key` is currently cached. Does not promote.
    pub fn exists(&self, key: &K) -> bool {
        self.shared.state.lock().index.contains_key(key)
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.shared.state.lock().index.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current capacity bound.
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().max_size
    }

    /// Removes `key` if present. The expiration index is deliberately left
    /// alone; the sweeper tolerates and discards orphaned deadlines.
    pub fn remove(&self, key: &K) -> bool {
        self.shared.state.lock().remove_entry(key)
    }

    /// Drops every entry, both indexes and the whole eviction structure,
    /// installing a fresh one. Always returns `true`.
    pub fn clear(&self) -> bool {
        let mut state = self.shared.state.lock();
        state.index.clear();
        state.expirations.clear();
        state.freq.clear();
        true
    }

    /// Changes the capacity bound, evicting down to it when shrinking.
    ///
    /// The request is first checked against the memory probe: a rough
    /// per-entry footprint (key, index overhead, key node, map item and
    /// one-and-a-half frequency nodes) times `new_capacity` must fit in
    /// the available memory plus a small slack, otherwise the resize is
    /// rejected and the cache is left unchanged.
    pub fn resize(&self, new_capacity: usize) -> Result<(), CacheError> {
        let available = self.probe.available_bytes();
        let required = (entry_footprint::<K>() as u64).saturating_mul(new_capacity as u64);
        if required > available.saturating_add(RESIZE_SLACK_BYTES) {
            warn!(
                requested = new_capacity,
                required_bytes = required,
                available_bytes = available,
                "resize rejected: estimated footprint exceeds available memory"
            );
            return Err(CacheError::CapacityRejected {
                requested: new_capacity,
                required_bytes: required,
                available_bytes: available,
            });
        }

        let mut state = self.shared.state.lock();
        state.max_size = new_capacity;
        while state.index.len() > state.max_size {
            state.evict_one();
        }
        Ok(())
    }
}

impl<K, V, C, Z> MemCache<K, V, C, Z>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Serialize + DeserializeOwned,
    C: Codec,
    Z: Compression,
{
    /// Stores `value` under `key` with a time-to-live in seconds
    /// (`ttl_secs = 0` means "do not expire").
    ///
    /// An existing key has its bytes overwritten, its deadline refreshed
    /// and its frequency promoted by one. A new key is inserted at
    /// frequency 1, evicting exactly one entry first when the cache is
    /// full. A zero-capacity cache rejects all inserts.
    pub fn put(&self, key: K, value: &V, ttl_secs: u64) -> Result<(), CacheError> {
        let mut state = self.shared.state.lock();
        if state.max_size == 0 {
            return Ok(());
        }

        let bytes = Z::compress(&C::serialize(value)?);
        state.expirations.insert(key.clone(), deadline_after(ttl_secs));

        if let Some(entry) = state.index.get_mut(&key) {
            entry.bytes = bytes;
            let node = entry.node;
            state.freq.promote(node);
            return Ok(());
        }

        if state.index.len() == state.max_size {
            state.evict_one();
        }
        let node = state.freq.insert(key.clone());
        state.index.insert(key, MapEntry { bytes, node });
        Ok(())
    }

    /// Fetches the value stored under `key`, or `Ok(None)` on a miss.
    ///
    /// A hit promotes the key's frequency by one, so `get` mutates the
    /// eviction state even though the stored bytes are untouched.
    pub fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        let mut state = self.shared.state.lock();
        let Some(entry) = state.index.get(key) else {
            return Ok(None);
        };
        let node = entry.node;
        let value = C::deserialize(&Z::uncompress(&entry.bytes)?)?;
        state.freq.promote(node);
        Ok(Some(value))
    }
}

#[cfg(any(test, debug_assertions))]
impl<K, V, C, Z> MemCache<K, V, C, Z>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Asserts the cross-structure invariants: the index and the frequency
    /// list agree entry for entry, the capacity bound holds, and the
    /// frequency list itself is well formed.
    pub fn debug_validate_invariants(&self) {
        let state = self.shared.state.lock();
        assert!(state.index.len() <= state.max_size);
        assert_eq!(state.index.len(), state.freq.len());
        for entry in state.index.values() {
            assert!(state.freq.contains(entry.node));
        }
        state.freq.debug_validate_invariants();
    }

    /// Returns `true` if the expiration index currently holds `key`.
    pub fn debug_expiration_contains(&self, key: &K) -> bool {
        self.shared.state.lock().expirations.contains_key(key)
    }
}

impl<K, V, C, Z> Drop for MemCache<K, V, C, Z>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn drop(&mut self) {
        // Raise the stop flag under the lock: the reaper is then either
        // about to check the flag, or parked in its condvar wait and about
        // to be woken. Either way it exits promptly and the join below
        // completes before any owned structure is released.
        {
            let _state = self.shared.state.lock();
            self.shared.stop.store(true, Ordering::Release);
            self.shared.sweeper_wake.notify_all();
        }
        if let Some(reaper) = self.reaper.take() {
            let _ = reaper.join();
        }
    }
}

fn deadline_after(ttl_secs: u64) -> Instant {
    let now = Instant::now();
    let ttl = if ttl_secs == 0 {
        TTL_INFINITE
    } else {
        Duration::from_secs(ttl_secs)
    };
    now.checked_add(ttl).unwrap_or(now + TTL_INFINITE)
}

/// Rough minimum bytes one cached entry costs: the key itself, hash-index
/// overhead of about one and a half pointers, the key node, the map item,
/// and one and a half frequency nodes to approximate partial buckets.
fn entry_footprint<K>() -> usize {
    let ptr = size_of::<usize>();
    let key = size_of::<K>();
    let key_node = key + 2 * ptr;
    let map_item = size_of::<Vec<u8>>() + 2 * ptr;
    let freq_node = 2 * size_of::<u64>() + 4 * ptr;
    key + (3 * ptr) / 2 + key_node + map_item + freq_node + freq_node / 2
}
