// crates/mcpgate-adapter/src/supervisor.rs
// ============================================================================
// Module: Stdio Adapter Supervisor
// Description: Spawns stdio MCP servers as child processes, wraps each in a
//              tiny loopback HTTP server, and health-probes it before
//              reporting the conversion complete.
// Purpose: Let `ServerRegistry`/`GroupGateway` treat a converted stdio
//          server exactly like an HTTP one.
// Dependencies: mcpgate-core, axum, tokio, reqwest
// ============================================================================

//! ## Overview
//! [`DefaultStdioAdapterSupervisor`] owns one child process and one loopback
//! axum server per converted stdio server. The axum server's only job is to
//! translate `POST /` HTTP bodies into `Content-Length`-framed stdio
//! requests and back; `GET /healthz` reports readiness once that server is
//! accepting connections. Graceful shutdown is a bounded wait for the
//! child to exit after closing its stdin, followed by a hard kill;
//! `Command::kill_on_drop` is the backstop against a leaked process if an
//! entry is ever dropped without going through [`stop`](StdioAdapterSupervisor::stop).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use mcpgate_core::core::identifiers::ServerName;
use mcpgate_core::core::time::Timestamp;
use mcpgate_core::interfaces::AdapterError;
use mcpgate_core::interfaces::AdapterStatus;
use mcpgate_core::interfaces::AuditEventType;
use mcpgate_core::interfaces::AuditRecord;
use mcpgate_core::interfaces::AuditSink;
use mcpgate_core::interfaces::StdioAdapterSupervisor;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader as TokioBufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::port::PortAllocator;

/// Hard cap on a single stdio-framed request/response body.
const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// One running adapter: the child process and its loopback HTTP server.
struct AdapterEntry {
    /// The spawned child; `kill_on_drop` is set on its `Command`.
    child: Child,
    /// Command used to spawn the child, kept for `status()`.
    command: String,
    /// Arguments used to spawn the child, kept for `status()`.
    args: Vec<String>,
    /// Loopback port the adapter's HTTP server listens on.
    port: u16,
    /// Handle to the loopback server task.
    server_task: JoinHandle<()>,
    /// Signals the loopback server to shut down gracefully.
    shutdown: Option<oneshot::Sender<()>>,
}

/// Shared state for one adapter's loopback HTTP server.
#[derive(Clone)]
struct BridgeState {
    /// Child's stdin, framed per request.
    stdin: Arc<AsyncMutex<ChildStdin>>,
    /// Child's stdout, framed per response.
    stdout: Arc<AsyncMutex<TokioBufReader<tokio::process::ChildStdout>>>,
}

/// The default [`StdioAdapterSupervisor`].
///
/// # Invariants
/// - At most one running adapter per server name.
/// - A port is only reused after its prior adapter has stopped.
pub struct DefaultStdioAdapterSupervisor {
    /// Tracked adapters by server name.
    adapters: AsyncMutex<BTreeMap<ServerName, AdapterEntry>>,
    /// Loopback port pool.
    ports: PortAllocator,
    /// Delay before the first health probe.
    initial_delay: Duration,
    /// Delay between subsequent health probes.
    poll_interval: Duration,
    /// Maximum number of health probes before giving up.
    max_polls: u32,
    /// Grace period before a hard kill on `stop`.
    stop_grace: Duration,
    /// Audit sink for adapter lifecycle events.
    audit: Arc<dyn AuditSink>,
}

impl DefaultStdioAdapterSupervisor {
    /// Builds a supervisor allocating ports from `[port_base, port_base + port_count)`.
    #[must_use]
    pub fn new(port_base: u16, port_count: u16, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            adapters: AsyncMutex::new(BTreeMap::new()),
            ports: PortAllocator::new(port_base, port_count),
            initial_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
            max_polls: 20,
            stop_grace: Duration::from_secs(5),
            audit,
        }
    }

    /// Overrides the health-probe cadence, for tests.
    #[must_use]
    pub const fn with_probe_schedule(
        mut self,
        initial_delay: Duration,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        self.initial_delay = initial_delay;
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    /// Emits one `adapter_event` audit record; a sink failure is logged and
    /// never propagated to the caller, mirroring `RequestPipeline::emit`.
    async fn emit_adapter_event(&self, server_name: &ServerName, error: Option<String>) {
        let record = AuditRecord {
            timestamp: Timestamp::now(),
            trace_id: format!("adapter:{server_name}"),
            event_type: AuditEventType::AdapterEvent,
            principal_subject: None,
            principal_email: None,
            server: Some(server_name.as_str().to_string()),
            tool: None,
            parameters_hash: String::new(),
            decision: None,
            policy_id: None,
            rule_id: None,
            obligations: Vec::new(),
            response_status: if error.is_some() { 0 } else { 200 },
            duration_ms: 0,
            error,
        };
        if let Err(e) = self.audit.emit(record).await {
            tracing::warn!(error = %e, "audit sink write failed");
        }
    }
}

#[async_trait]
impl StdioAdapterSupervisor for DefaultStdioAdapterSupervisor {
    async fn convert(
        &self,
        server_name: &ServerName,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<AdapterStatus, AdapterError> {
        let mut adapters = self.adapters.lock().await;
        if adapters.contains_key(server_name) {
            return Err(AdapterError::AlreadyRunning(server_name.clone()));
        }
        let port = self.ports.allocate().ok_or(AdapterError::PortsExhausted)?;

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.ports.release(port);
                let detail = e.to_string();
                self.emit_adapter_event(server_name, Some(detail.clone())).await;
                return Err(AdapterError::SpawnFailed { server: server_name.clone(), detail });
            }
        };

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                self.ports.release(port);
                let detail = "missing child stdin".to_string();
                self.emit_adapter_event(server_name, Some(detail.clone())).await;
                return Err(AdapterError::SpawnFailed { server: server_name.clone(), detail });
            }
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                self.ports.release(port);
                let detail = "missing child stdout".to_string();
                self.emit_adapter_event(server_name, Some(detail.clone())).await;
                return Err(AdapterError::SpawnFailed { server: server_name.clone(), detail });
            }
        };
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_tagger(server_name.clone(), stderr);
        }

        let state = BridgeState {
            stdin: Arc::new(AsyncMutex::new(stdin)),
            stdout: Arc::new(AsyncMutex::new(TokioBufReader::new(stdout))),
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server_task = match spawn_bridge_server(port, state).await {
            Ok(task) => task,
            Err(e) => {
                self.ports.release(port);
                self.emit_adapter_event(server_name, Some(e.clone())).await;
                return Err(AdapterError::SpawnFailed {
                    server: server_name.clone(),
                    detail: e,
                });
            }
        };

        if !probe_health(port, self.initial_delay, self.poll_interval, self.max_polls).await {
            let _ = child.start_kill();
            server_task.abort();
            self.ports.release(port);
            self.emit_adapter_event(server_name, Some("health probe timed out".to_string())).await;
            return Err(AdapterError::StartTimeout(server_name.clone()));
        }
        drop(shutdown_rx);

        let status = AdapterStatus {
            server_name: server_name.clone(),
            child_pid: child.id().unwrap_or_default(),
            port,
            command: command.to_string(),
            args: args.to_vec(),
        };
        adapters.insert(
            server_name.clone(),
            AdapterEntry {
                child,
                command: command.to_string(),
                args: args.to_vec(),
                port,
                server_task,
                shutdown: Some(shutdown_tx),
            },
        );
        drop(adapters);
        self.emit_adapter_event(server_name, None).await;
        Ok(status)
    }

    async fn stop(&self, server_name: &ServerName) -> Result<(), AdapterError> {
        let mut adapters = self.adapters.lock().await;
        let mut entry = adapters
            .remove(server_name)
            .ok_or_else(|| AdapterError::NotRunning(server_name.clone()))?;
        drop(adapters);
        if let Some(shutdown) = entry.shutdown.take() {
            let _ = shutdown.send(());
        }
        entry.server_task.abort();
        let killed = match tokio::time::timeout(self.stop_grace, entry.child.wait()).await {
            Ok(_) => false,
            Err(_) => {
                let _ = entry.child.start_kill();
                true
            }
        };
        self.ports.release(entry.port);
        self.emit_adapter_event(
            server_name,
            killed.then(|| "stop grace period elapsed, process was killed".to_string()),
        )
        .await;
        Ok(())
    }

    async fn status(&self, server_name: &ServerName) -> Result<AdapterStatus, AdapterError> {
        let adapters = self.adapters.lock().await;
        let entry = adapters
            .get(server_name)
            .ok_or_else(|| AdapterError::NotRunning(server_name.clone()))?;
        Ok(AdapterStatus {
            server_name: server_name.clone(),
            child_pid: entry.child.id().unwrap_or_default(),
            port: entry.port,
            command: entry.command.clone(),
            args: entry.args.clone(),
        })
    }

    async fn list(&self) -> Vec<AdapterStatus> {
        let adapters = self.adapters.lock().await;
        adapters
            .iter()
            .map(|(name, entry)| AdapterStatus {
                server_name: name.clone(),
                child_pid: entry.child.id().unwrap_or_default(),
                port: entry.port,
                command: entry.command.clone(),
                args: entry.args.clone(),
            })
            .collect()
    }
}

/// Tags and forwards a child's stderr lines to the structured logger.
fn spawn_stderr_tagger(server_name: ServerName, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = TokioBufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::warn!(server = %server_name, "{line}");
        }
    });
}

/// Binds and spawns the loopback bridge server for one adapter.
async fn spawn_bridge_server(port: u16, state: BridgeState) -> Result<JoinHandle<()>, String> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| e.to_string())?;
    let app = Router::new()
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/", post(bridge_handler))
        .with_state(state);
    Ok(tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    }))
}

/// Translates one HTTP body into a framed stdio request and back.
async fn bridge_handler(
    State(state): State<BridgeState>,
    body: axum::body::Bytes,
) -> Result<Vec<u8>, StatusCode> {
    {
        let mut stdin = state.stdin.lock().await;
        let mut sync_buf = Vec::new();
        write_framed_async(&mut sync_buf, &body);
        stdin.write_all(&sync_buf).await.map_err(|_| StatusCode::BAD_GATEWAY)?;
        stdin.flush().await.map_err(|_| StatusCode::BAD_GATEWAY)?;
    }
    let response = {
        let mut stdout = state.stdout.lock().await;
        read_framed_async(&mut *stdout).await.map_err(|_| StatusCode::BAD_GATEWAY)?
    };
    Ok(response)
}

/// Writes the `Content-Length` header and payload into `buf`.
fn write_framed_async(buf: &mut Vec<u8>, payload: &[u8]) {
    buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
    buf.extend_from_slice(payload);
}

/// Reads one framed message from an async stdout, via a short-lived blocking
/// adapter over the buffered bytes already read.
async fn read_framed_async(
    stdout: &mut TokioBufReader<tokio::process::ChildStdout>,
) -> Result<Vec<u8>, std::io::Error> {
    use tokio::io::AsyncReadExt;
    let mut header = Vec::new();
    let mut byte = [0_u8; 1];
    loop {
        stdout.read_exact(&mut byte).await?;
        header.push(byte[0]);
        if header.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    let header_text = String::from_utf8_lossy(&header);
    let len = header_text
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| std::io::Error::other("missing Content-Length"))?;
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::other("framed response exceeds limit"));
    }
    let mut body = vec![0_u8; len];
    stdout.read_exact(&mut body).await?;
    Ok(body)
}

/// Polls `http://127.0.0.1:{port}/healthz` until it succeeds or the budget
/// is exhausted.
async fn probe_health(port: u16, initial_delay: Duration, interval: Duration, max_polls: u32) -> bool {
    tokio::time::sleep(initial_delay).await;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/healthz");
    for _ in 0..max_polls {
        if let Ok(response) = client.get(&url).send().await {
            if response.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(interval).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use mcpgate_core::interfaces::AuditError;

    use super::*;

    /// Records every emitted record in order; never fails a request.
    #[derive(Default)]
    struct RecordingAuditSink {
        records: AsyncMutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn emit(&self, record: AuditRecord) -> Result<(), AuditError> {
            self.records.lock().await.push(record);
            Ok(())
        }
    }

    fn test_audit() -> Arc<dyn AuditSink> {
        Arc::new(RecordingAuditSink::default())
    }

    #[tokio::test]
    async fn status_reports_not_running_for_unknown_server() {
        let supervisor = DefaultStdioAdapterSupervisor::new(19000, 4, test_audit());
        let name = ServerName::new("unknown").unwrap();
        let err = supervisor.status(&name).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotRunning(_)));
    }

    #[tokio::test]
    async fn stop_on_unknown_server_is_not_running() {
        let supervisor = DefaultStdioAdapterSupervisor::new(19010, 4, test_audit());
        let name = ServerName::new("unknown").unwrap();
        let err = supervisor.stop(&name).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotRunning(_)));
    }

    #[tokio::test]
    async fn converting_the_same_server_twice_is_rejected() {
        let audit = test_audit();
        let supervisor = DefaultStdioAdapterSupervisor::new(19020, 4, Arc::clone(&audit))
            .with_probe_schedule(Duration::from_millis(10), Duration::from_millis(10), 3);
        let name = ServerName::new("echo").unwrap();
        let first = supervisor
            .convert(&name, "cat", &[], &BTreeMap::new())
            .await;
        if first.is_ok() {
            let err = supervisor
                .convert(&name, "cat", &[], &BTreeMap::new())
                .await
                .unwrap_err();
            assert!(matches!(err, AdapterError::AlreadyRunning(_)));
            supervisor.stop(&name).await.unwrap();
        }
    }

    #[tokio::test]
    async fn converting_a_server_emits_an_adapter_event() {
        let audit = Arc::new(RecordingAuditSink::default());
        let supervisor = DefaultStdioAdapterSupervisor::new(19030, 4, Arc::clone(&audit) as Arc<dyn AuditSink>)
            .with_probe_schedule(Duration::from_millis(10), Duration::from_millis(10), 3);
        let name = ServerName::new("echo").unwrap();
        let result = supervisor.convert(&name, "cat", &[], &BTreeMap::new()).await;
        if result.is_ok() {
            supervisor.stop(&name).await.unwrap();
        }
        let records = audit.records.lock().await;
        assert!(records.iter().any(|r| matches!(r.event_type, AuditEventType::AdapterEvent)));
    }
}
