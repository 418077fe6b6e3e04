// crates/mcpgate-transport/src/error.rs
// ============================================================================
// Module: Framing Errors
// Description: Errors for the stdio `Content-Length` framing helpers.
// Purpose: Give framing failures a typed shape independent of TransportError,
//          since framing is used outside the McpTransport trait too (by the
//          adapter supervisor's reverse proxy).
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors from [`crate::framing::read_framed`] / [`crate::framing::write_framed`].
#[derive(Debug, Error)]
pub enum FramingError {
    /// The stream closed before a complete message could be read.
    #[error("stdio stream closed")]
    Closed,
    /// No `Content-Length` header was present.
    #[error("missing Content-Length header")]
    MissingHeader,
    /// The declared content length exceeds the configured limit.
    #[error("framed message exceeds {limit} bytes (declared {actual})")]
    TooLarge {
        /// The declared length.
        actual: usize,
        /// The configured limit.
        limit: usize,
    },
    /// Underlying I/O failure.
    #[error("stdio io error: {0}")]
    Io(#[from] std::io::Error),
}
