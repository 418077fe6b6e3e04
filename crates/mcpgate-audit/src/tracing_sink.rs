// crates/mcpgate-audit/src/tracing_sink.rs
// ============================================================================
// Module: Tracing Audit Sink
// Description: Emits each audit record as a structured `tracing` event.
// Purpose: Let audit records flow through the same structured-logging
//          pipeline as everything else, for deployments that ship logs
//          rather than a dedicated audit store.
// Dependencies: mcpgate-core, tracing
// ============================================================================

//! ## Overview
//! [`TracingAuditSink`] never fails: it emits one `tracing::info!` event per
//! record at target `"mcpgate::audit"` and returns `Ok(())` unconditionally,
//! since a tracing subscriber accepting an event cannot itself report
//! delivery failure back to the caller.

use async_trait::async_trait;
use mcpgate_core::interfaces::AuditError;
use mcpgate_core::interfaces::AuditRecord;
use mcpgate_core::interfaces::AuditSink;

/// Emits audit records through `tracing` rather than a dedicated store.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "mcpgate::audit",
            trace_id = %record.trace_id,
            event_type = ?record.event_type,
            principal = record.principal_subject.as_deref().unwrap_or("-"),
            server = record.server.as_deref().unwrap_or("-"),
            tool = record.tool.as_deref().unwrap_or("-"),
            decision = record.decision.as_deref().unwrap_or("-"),
            policy_id = record.policy_id.as_deref().unwrap_or("-"),
            response_status = record.response_status,
            duration_ms = record.duration_ms,
            error = record.error.as_deref().unwrap_or("-"),
            "audit record",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mcpgate_core::interfaces::AuditEventType;

    use super::*;

    #[tokio::test]
    async fn emit_never_fails() {
        let sink = TracingAuditSink;
        let record = AuditRecord {
            timestamp: mcpgate_core::core::time::Timestamp::now(),
            trace_id: "trace-1".to_string(),
            event_type: AuditEventType::McpRequest,
            principal_subject: None,
            principal_email: None,
            server: None,
            tool: None,
            parameters_hash: String::new(),
            decision: None,
            policy_id: None,
            rule_id: None,
            obligations: Vec::new(),
            response_status: 200,
            duration_ms: 1,
            error: None,
        };
        sink.emit(record).await.unwrap();
    }
}
