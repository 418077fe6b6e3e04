// crates/mcpgate-audit/src/lib.rs
// ============================================================================
// Module: Audit
// Description: Concrete `AuditSink` implementations: structured logging,
//              append-only file, `tracing` events, and an in-process channel.
// Purpose: Give the composition root a menu of audit destinations without
//          coupling the request pipeline to any one of them.
// Dependencies: mcpgate-core
// ============================================================================

//! Reference [`mcpgate_core::interfaces::AuditSink`] implementations.
//! [`log::LogAuditSink`] writes newline-delimited JSON to a file or stderr,
//! [`channel::ChannelAuditSink`] forwards records to an in-process consumer,
//! and [`tracing_sink::TracingAuditSink`] folds records into the ambient
//! `tracing` pipeline.

pub mod channel;
pub mod log;
pub mod tracing_sink;

pub use channel::ChannelAuditSink;
pub use log::LogAuditSink;
pub use tracing_sink::TracingAuditSink;
