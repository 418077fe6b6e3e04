// crates/mcpgate-adapter/src/port.rs
// ============================================================================
// Module: Adapter Port Allocator
// Description: Tracks which loopback ports in a configured range are
//              currently bound to a running adapter.
// Purpose: Guarantee ports are never reused while the previous child using
//          them is still alive.
// Dependencies: std
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Mutex;

/// Allocates ports from `[base, base + count)` for adapter loopback servers.
///
/// # Invariants
/// - A port returned by [`allocate`](Self::allocate) is not returned again
///   until [`release`](Self::release) is called with it.
pub struct PortAllocator {
    /// First port in the managed range.
    base: u16,
    /// Number of ports in the managed range.
    count: u16,
    /// Ports currently handed out.
    in_use: Mutex<BTreeSet<u16>>,
}

impl PortAllocator {
    /// Builds an allocator managing `[base, base + count)`.
    #[must_use]
    pub const fn new(base: u16, count: u16) -> Self {
        Self {
            base,
            count,
            in_use: Mutex::new(BTreeSet::new()),
        }
    }

    /// Reserves and returns the lowest free port in the range, or `None` if
    /// the range is exhausted.
    #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable allocator error")]
    pub fn allocate(&self) -> Option<u16> {
        let mut in_use = self.in_use.lock().unwrap();
        for offset in 0..self.count {
            let port = self.base.saturating_add(offset);
            if in_use.insert(port) {
                return Some(port);
            }
        }
        None
    }

    /// Releases `port` for reuse.
    #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable allocator error")]
    pub fn release(&self, port: u16) {
        self.in_use.lock().unwrap().remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_port_first() {
        let allocator = PortAllocator::new(9000, 3);
        assert_eq!(allocator.allocate(), Some(9000));
        assert_eq!(allocator.allocate(), Some(9001));
        allocator.release(9000);
        assert_eq!(allocator.allocate(), Some(9000));
    }

    #[test]
    fn exhausted_range_returns_none() {
        let allocator = PortAllocator::new(9000, 1);
        assert_eq!(allocator.allocate(), Some(9000));
        assert_eq!(allocator.allocate(), None);
    }
}
