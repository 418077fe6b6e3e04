// crates/mcpgate-audit/src/channel.rs
// ============================================================================
// Module: Channel Audit Sink
// Description: Forwards audit records onto a bounded `tokio::mpsc` channel.
// Purpose: Let a consumer (a test, or an out-of-process forwarder) observe
//          every audit record without the pipeline depending on it directly.
// Dependencies: mcpgate-core, tokio
// ============================================================================

//! ## Overview
//! [`ChannelAuditSink`] hands each [`AuditRecord`] to a bounded
//! `tokio::sync::mpsc::Sender`. A full channel or a dropped receiver is
//! reported as [`AuditError::WriteFailed`] rather than blocking the
//! request that produced the record.

use async_trait::async_trait;
use mcpgate_core::interfaces::AuditError;
use mcpgate_core::interfaces::AuditRecord;
use mcpgate_core::interfaces::AuditSink;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;

/// Forwards audit records to a bounded channel.
pub struct ChannelAuditSink {
    /// The channel's sending half.
    sender: Sender<AuditRecord>,
}

impl ChannelAuditSink {
    /// Builds a sink that forwards onto `sender`.
    #[must_use]
    pub fn new(sender: Sender<AuditRecord>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl AuditSink for ChannelAuditSink {
    async fn emit(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.sender.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => AuditError::WriteFailed("channel is full".to_string()),
            TrySendError::Closed(_) => AuditError::WriteFailed("receiver dropped".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use mcpgate_core::interfaces::AuditEventType;

    use super::*;

    fn record() -> AuditRecord {
        AuditRecord {
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
        }
    }

    #[tokio::test]
    async fn emit_delivers_the_record() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let sink = ChannelAuditSink::new(tx);
        sink.emit(record()).await.unwrap();
        let received = rx.try_recv().unwrap();
        assert_eq!(received.trace_id, "trace-1");
    }

    #[tokio::test]
    async fn emit_fails_when_channel_is_full() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let sink = ChannelAuditSink::new(tx);
        sink.emit(record()).await.unwrap();
        let err = sink.emit(record()).await.unwrap_err();
        assert!(matches!(err, AuditError::WriteFailed(_)));
    }

    #[tokio::test]
    async fn emit_fails_when_receiver_dropped() {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        drop(rx);
        let sink = ChannelAuditSink::new(tx);
        let err = sink.emit(record()).await.unwrap_err();
        assert!(matches!(err, AuditError::WriteFailed(_)));
    }
}
