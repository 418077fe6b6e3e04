// crates/mcpgate-core/src/core/time.rs
// ============================================================================
// Module: Time Model
// Description: Canonical timestamp representation for records and policies.
// Purpose: Provide a single RFC3339-serializing timestamp type used across
//          the data model, so wire formats never depend on the local clock
//          implementation.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A single newtype around [`time::OffsetDateTime`] serialized as RFC 3339.
//! Reading the wall clock is a host responsibility ([`Timestamp::now`] exists
//! for callers at the process boundary, e.g. the HTTP surface and the audit
//! sink); the policy engine and repository treat timestamps as opaque,
//! ordered values supplied by the caller.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A point in time, serialized on the wire as an RFC 3339 string.
///
/// # Invariants
/// - Always represents a valid UTC instant; no local-time ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Returns the current wall-clock time in UTC.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Wraps an explicit `OffsetDateTime`.
    #[must_use]
    pub const fn from_offset_date_time(value: OffsetDateTime) -> Self {
        Self(value)
    }

    /// Returns the underlying `OffsetDateTime`.
    #[must_use]
    pub const fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }

    /// Returns the RFC 3339 string form, as used in audit records.
    ///
    /// # Errors
    /// Returns an error if formatting fails, which only happens for
    /// out-of-range dates that cannot occur via [`Timestamp::now`].
    pub fn to_rfc3339(self) -> Result<String, time::error::Format> {
        self.0.format(&Rfc3339)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(s) => f.write_str(&s),
            Err(_) => fmt::Debug::fmt(&self.0, f),
        }
    }
}
