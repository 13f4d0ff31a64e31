//! Available-memory probe.
//!
//! Used only by `resize` to sanity-check that a requested capacity could
//! plausibly fit in RAM. The estimate is advisory, not a correctness
//! contract.

use sysinfo::System;

/// Reports the platform's current free-RAM estimate.
pub trait MemoryProbe: Send + Sync {
    /// Returns the number of bytes of memory currently available.
    fn available_bytes(&self) -> u64;
}

/// Probe backed by `sysinfo`.
///
/// Refreshes memory stats on every call; resize is rare enough that the
/// refresh cost does not matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn available_bytes(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.available_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_probe_reports_nonzero_memory() {
        assert!(SystemMemoryProbe.available_bytes() > 0);
    }
}
