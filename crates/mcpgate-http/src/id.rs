// crates/mcpgate-http/src/id.rs
// ============================================================================
// Module: Identifier Generation
// Description: Generates server-assigned policy/group identifiers.
// Purpose: Back `POST /policies` and `POST /mcp/groups`, which accept a body
//          with no identifier and must mint one.
// Dependencies: sha2, std
// ============================================================================

//! ## Overview
//! No collision-resistant UUID generator is in the dependency stack, so an
//! identifier is derived from a process-local monotonic counter folded into
//! a `Sha256` digest alongside the creation instant. Uniqueness only needs
//! to hold within one running process between successive calls.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use sha2::Digest;

/// Process-local sequence folded into every generated digest.
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a new identifier prefixed with `prefix`, e.g. `pol-3f9a2b1c`.
#[must_use]
pub fn generate(prefix: &str) -> String {
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = sha2::Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(seq.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();
    format!("{prefix}-{}", hex_prefix(&digest, 12))
}

/// Renders the first `chars` hex digits of `bytes`.
fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(chars);
    for byte in bytes {
        if out.len() >= chars {
            break;
        }
        #[allow(clippy::unwrap_used, reason = "writing to a String never fails")]
        write!(out, "{byte:02x}").unwrap();
    }
    out.truncate(chars);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = generate("pol");
        let b = generate("pol");
        assert_ne!(a, b);
        assert!(a.starts_with("pol-"));
        assert!(b.starts_with("pol-"));
    }
}
