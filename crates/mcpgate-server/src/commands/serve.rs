// crates/mcpgate-server/src/commands/serve.rs
// ============================================================================
// Module: Serve Command
// Description: Composition root: wires `GatewayConfig` into concrete
//              collaborators and serves the HTTP surface until a shutdown
//              signal is received.
// Purpose: The one place every trait object in the workspace is instantiated
//          and handed to `RequestPipeline`/`AppState`.
// Dependencies: mcpgate-config, mcpgate-core, mcpgate-gateway, mcpgate-http,
//               mcpgate-policy, mcpgate-policy-store, mcpgate-transport,
//               mcpgate-adapter, mcpgate-credentials, mcpgate-audit,
//               axum-server, tower-http
// ============================================================================

use std::process::ExitCode;
use std::sync::Arc;

use mcpgate_adapter::DefaultStdioAdapterSupervisor;
use mcpgate_config::GatewayConfig;
use mcpgate_core::interfaces::AuditSink;
use mcpgate_core::interfaces::McpTransport;
use mcpgate_core::interfaces::PolicyEvaluator;
use mcpgate_core::interfaces::PolicyRepo;
use mcpgate_core::interfaces::ServerRegistry;
use mcpgate_core::interfaces::StdioAdapterSupervisor;
use mcpgate_credentials::EnvCredentialResolver;
use mcpgate_credentials::EnvCredentialResolverConfig;
use mcpgate_gateway::Authenticator;
use mcpgate_gateway::DefaultGroupGateway;
use mcpgate_gateway::InMemoryServerRegistry;
use mcpgate_gateway::JwksAuthenticator;
use mcpgate_gateway::JwksAuthenticatorConfig;
use mcpgate_gateway::RequestPipeline;
use mcpgate_http::AppState;
use mcpgate_policy::ArcSwapEvaluator;
use mcpgate_policy::InMemoryPolicyRepo;
use mcpgate_policy_store::SqlitePolicyStore;
use mcpgate_transport::HttpMcpTransport;
use tower_http::cors::AllowOrigin;
use tower_http::cors::CorsLayer;

use crate::error::ServerError;
use crate::error::ServerResult;

/// Number of loopback ports reserved for stdio-to-HTTP adapters, starting at
/// `GatewayConfig::adapter_base_port`.
const ADAPTER_PORT_COUNT: u16 = 1_000;

/// DSN prefix selecting the SQLite-backed policy store over the in-memory
/// default.
const SQLITE_DSN_PREFIX: &str = "sqlite://";

/// Builds the `PolicyRepo` named by `config.policy_store_dsn`: a SQLite file
/// behind `sqlite://`, or the in-memory repository otherwise.
fn build_policy_repo(
    config: &GatewayConfig,
    evaluator: Arc<ArcSwapEvaluator>,
) -> ServerResult<Arc<dyn PolicyRepo>> {
    if let Some(path) = config.policy_store_dsn.strip_prefix(SQLITE_DSN_PREFIX) {
        let store = SqlitePolicyStore::open(std::path::Path::new(path), evaluator)?;
        Ok(Arc::new(store))
    } else {
        Ok(Arc::new(InMemoryPolicyRepo::new(evaluator)))
    }
}

/// Builds the audit sink writing to `config.audit_sink_path`; `-` selects
/// stderr for deployments that ship logs via the process's own stdio.
fn build_audit_sink(config: &GatewayConfig) -> ServerResult<Arc<dyn AuditSink>> {
    if config.audit_sink_path == "-" {
        return Ok(Arc::new(mcpgate_audit::LogAuditSink::stderr()));
    }
    let sink = mcpgate_audit::LogAuditSink::to_file(&config.audit_sink_path).map_err(|source| ServerError::Input {
        path: config.audit_sink_path.clone(),
        source,
    })?;
    Ok(Arc::new(sink))
}

/// Builds the CORS layer from `config.cors_origins`; an empty list is the
/// most restrictive setting tower-http offers (no cross-origin reads at
/// all), and a literal `"*"` entry allows any origin.
fn build_cors(config: &GatewayConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::new();
    }
    if config.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new().allow_origin(AllowOrigin::any());
    }
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

/// Runs the `serve` command: loads configuration, wires every collaborator,
/// and serves the HTTP surface until a shutdown signal arrives.
///
/// # Errors
///
/// Returns [`ServerError::Config`] for an invalid configuration, and
/// [`ServerError::Store`]/[`ServerError::PolicyRepo`] if the policy store is
/// unreachable at startup.
pub async fn run() -> ServerResult<ExitCode> {
    let config = GatewayConfig::from_env()?;

    let evaluator = Arc::new(ArcSwapEvaluator::new());
    let policy_repo = build_policy_repo(&config, Arc::clone(&evaluator))?;
    policy_repo.readiness().await?;

    let authenticator: Arc<dyn Authenticator> = Arc::new(JwksAuthenticator::new(JwksAuthenticatorConfig::new(
        config.jwks_url.to_string(),
        config.oidc_audience.clone(),
        config.oidc_issuer.clone(),
    )));
    let registry = Arc::new(InMemoryServerRegistry::new());
    let credential_resolver = Arc::new(EnvCredentialResolver::new(EnvCredentialResolverConfig::default()));
    let transport: Arc<dyn McpTransport> = Arc::new(HttpMcpTransport::new(credential_resolver));
    let policy_evaluator: Arc<dyn PolicyEvaluator> = evaluator;
    let group_gateway = Arc::new(DefaultGroupGateway::new(
        registry.clone() as Arc<dyn ServerRegistry>,
        Arc::clone(&transport),
        Arc::clone(&policy_evaluator),
    ));
    let audit = build_audit_sink(&config)?;
    let adapters: Arc<dyn StdioAdapterSupervisor> = Arc::new(DefaultStdioAdapterSupervisor::new(
        config.adapter_base_port,
        ADAPTER_PORT_COUNT,
        Arc::clone(&audit),
    ));

    let pipeline = Arc::new(RequestPipeline::new(
        Arc::clone(&authenticator),
        registry.clone() as Arc<dyn ServerRegistry>,
        group_gateway,
        policy_evaluator,
        transport,
        audit,
    ));

    let state = AppState {
        pipeline,
        policy_repo,
        registry: registry as Arc<dyn ServerRegistry>,
        adapters,
        authenticator,
        admin_api_key: config.admin_api_key.clone(),
    };

    let cors = build_cors(&config);
    let router = mcpgate_http::build_router(state, cors);

    tracing::info!(bind_addr = %config.bind_addr, "starting mcpgate-server");

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    let signaled = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let signaled_writer = Arc::clone(&signaled);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signaled_writer.store(true, std::sync::atomic::Ordering::SeqCst);
        shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(30)));
    });

    axum_server::bind(config.bind_addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;

    if signaled.load(std::sync::atomic::Ordering::SeqCst) {
        Ok(ExitCode::from(3))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Waits for either `SIGINT` (ctrl-c) or, on unix, `SIGTERM`.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        #[allow(clippy::expect_used, reason = "a ctrl-c listener failure is unrecoverable startup state")]
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[allow(clippy::expect_used, reason = "a signal listener failure is unrecoverable startup state")]
        let mut stream = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        stream.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
