//! Background expiration sweeper.
//!
//! One dedicated thread per cache, started at construction and joined on
//! drop. Each iteration checks the stop flag, sweeps every overdue entry
//! out of the expiration index through the lock-already-held removal path,
//! then parks on the condvar for the sweep interval. The condvar exists so
//! shutdown never has to wait out a full sleep period: `Drop` raises the
//! stop flag and signals the wait.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cache::CacheShared;

pub(crate) const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) fn spawn<K>(shared: Arc<CacheShared<K>>, interval: Duration) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    thread::Builder::new()
        .name("lfru-reaper".into())
        .spawn(move || run(&shared, interval))
        .expect("failed to spawn reaper thread")
}

fn run<K>(shared: &CacheShared<K>, interval: Duration)
where
    K: Eq + Hash + Clone,
{
    info!(interval_ms = interval.as_millis() as u64, "expiration reaper started");
    let mut state = shared.state.lock();
    while !shared.stop.load(Ordering::Acquire) {
        let swept = state.sweep_expired(Instant::now());
        if swept > 0 {
            debug!(swept, "removed expired entries");
        }
        // Releases the mutex while parked; public operations proceed.
        let _ = shared.sweeper_wake.wait_for(&mut state, interval);
    }
    info!("expiration reaper stopped");
}
