// crates/mcpgate-audit/src/log.rs
// ============================================================================
// Module: Log Audit Sink
// Description: Writes one JSON line per audit record to any `Write` target.
// Purpose: Back file-based and stderr-based audit logging.
// Dependencies: mcpgate-core, serde_json, std
// ============================================================================

//! ## Overview
//! [`LogAuditSink`] serializes each [`AuditRecord`] to a single line of JSON
//! and writes it to a locked `Write` target, appending a trailing newline.
//! A write failure is returned as [`AuditError::WriteFailed`]; it is the
//! caller's responsibility (per the [`AuditSink`] contract) not to let that
//! fail the request being audited.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use mcpgate_core::interfaces::AuditError;
use mcpgate_core::interfaces::AuditRecord;
use mcpgate_core::interfaces::AuditSink;

/// Writes audit records as newline-delimited JSON to a `Write` target.
///
/// # Invariants
/// - Every successful `emit` writes exactly one line terminated by `\n`.
pub struct LogAuditSink<W> {
    /// The underlying writer, locked for the duration of one write.
    writer: Mutex<W>,
}

impl<W: Write + Send> LogAuditSink<W> {
    /// Wraps `writer` as an audit sink.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl LogAuditSink<File> {
    /// Opens `path` in append mode (creating it if necessary) as an audit
    /// log destination.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`std::io::Error`] if the file cannot be
    /// opened.
    pub fn to_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl LogAuditSink<std::io::Stderr> {
    /// Writes audit records to the process's standard error stream.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

#[async_trait]
impl<W: Write + Send> AuditSink for LogAuditSink<W> {
    async fn emit(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(&record).map_err(|e| AuditError::WriteFailed(e.to_string()))?;
        line.push('\n');
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable audit error")]
        let mut guard = self.writer.lock().unwrap();
        guard
            .write_all(line.as_bytes())
            .map_err(|e| AuditError::WriteFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mcpgate_core::interfaces::AuditEventType;

    use super::*;

    /// A shared in-memory buffer implementing `Write`, for assertions.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            #[allow(clippy::unwrap_used, reason = "test-only lock")]
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap_or_default()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            #[allow(clippy::unwrap_used, reason = "test-only lock")]
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// A writer that always fails, for error-path coverage.
    struct FailingWriter;
    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn record() -> AuditRecord {
        AuditRecord {
            timestamp: mcpgate_core::core::time::Timestamp::now(),
            trace_id: "trace-1".to_string(),
            event_type: AuditEventType::McpRequest,
            principal_subject: Some("u-1".to_string()),
            principal_email: None,
            server: Some("github".to_string()),
            tool: Some("search".to_string()),
            parameters_hash: String::new(),
            decision: Some("allow".to_string()),
            policy_id: None,
            rule_id: None,
            obligations: Vec::new(),
            response_status: 200,
            duration_ms: 12,
            error: None,
        }
    }

    #[tokio::test]
    async fn emit_writes_one_json_line() {
        let buffer = SharedBuffer::default();
        let sink = LogAuditSink::new(buffer.clone());
        sink.emit(record()).await.unwrap();
        let contents = buffer.contents();
        assert_eq!(contents.lines().count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(contents.trim_end()).unwrap();
        assert_eq!(parsed["trace_id"], "trace-1");
        assert_eq!(parsed["server"], "github");
    }

    #[tokio::test]
    async fn emit_appends_subsequent_records() {
        let buffer = SharedBuffer::default();
        let sink = LogAuditSink::new(buffer.clone());
        sink.emit(record()).await.unwrap();
        sink.emit(record()).await.unwrap();
        assert_eq!(buffer.contents().lines().count(), 2);
    }

    #[tokio::test]
    async fn emit_surfaces_write_failure() {
        let sink = LogAuditSink::new(FailingWriter);
        let err = sink.emit(record()).await.unwrap_err();
        assert!(matches!(err, AuditError::WriteFailed(_)));
    }

    #[tokio::test]
    async fn to_file_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let sink = LogAuditSink::to_file(&path).unwrap();
            sink.emit(record()).await.unwrap();
        }
        {
            let sink = LogAuditSink::to_file(&path).unwrap();
            sink.emit(record()).await.unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
