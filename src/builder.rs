//! Cache builder.
//!
//! `MemCache::new(capacity)` covers the common case; the builder exposes
//! the knobs tests and embedders need: the sweep interval of the
//! expiration reaper and the memory probe consulted by `resize`.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use lfru::MemCache;
//!
//! let cache: MemCache<String, u64> = MemCache::builder(100)
//!     .sweep_interval(Duration::from_millis(250))
//!     .build();
//! cache.put("hits".into(), &1, 0).unwrap();
//! assert_eq!(cache.get(&"hits".into()).unwrap(), Some(1));
//! ```

use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cache::{CacheShared, CacheState, MemCache};
use crate::codec::{Bincode, Lz4};
use crate::mem::{MemoryProbe, SystemMemoryProbe};
use crate::reaper;

/// Configures and constructs a [`MemCache`].
///
/// A non-default codec or compressor is selected through the cache's type
/// parameters, e.g. `MemCache::<K, V, MyCodec, MyCompression>::builder(n)`.
pub struct MemCacheBuilder<K, V, C = Bincode, Z = Lz4> {
    capacity: usize,
    sweep_interval: Duration,
    probe: Box<dyn MemoryProbe>,
    _marker: PhantomData<fn() -> (K, V, C, Z)>,
}

impl<K, V, C, Z> MemCacheBuilder<K, V, C, Z>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sweep_interval: reaper::DEFAULT_SWEEP_INTERVAL,
            probe: Box::new(SystemMemoryProbe),
            _marker: PhantomData,
        }
    }

    /// How long the reaper sleeps between expiration sweeps. Defaults to
    /// one second.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Memory probe consulted by `resize`. Defaults to the sysinfo-backed
    /// [`SystemMemoryProbe`].
    pub fn probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Builds the cache and starts its reaper thread.
    pub fn build(self) -> MemCache<K, V, C, Z> {
        let shared = Arc::new(CacheShared {
            state: Mutex::new(CacheState::with_capacity(self.capacity)),
            sweeper_wake: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let reaper = reaper::spawn(Arc::clone(&shared), self.sweep_interval);
        MemCache::from_parts(shared, self.probe, reaper)
    }
}
