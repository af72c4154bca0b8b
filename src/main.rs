use anyhow::Result;
use std::sync::Arc;

use muckrock_gateway::auth::{AuthManager, PendingLogins};
use muckrock_gateway::config::{Config, LogFormat, Transport};
use muckrock_gateway::muckrock::HttpConnector;
use muckrock_gateway::routes::{self, AppState};
use muckrock_gateway::rpc::RpcHandler;
use muckrock_gateway::stdio;
use muckrock_gateway::tools::ToolRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;

    init_logging(&config);
    config.validate()?;

    tracing::info!("🚀 MuckRock gateway starting...");
    tracing::info!("Transport: {:?}", config.transport);

    let connector = Arc::new(HttpConnector::new(config.connector_config())?);
    tracing::info!("✅ HTTP client initialized with connection pooling");

    // Resolve credentials before building the session; may prompt on a terminal
    let source = config.credential_source();
    let credentials = tokio::task::spawn_blocking(move || source.resolve()).await?;

    tracing::info!("Initializing session...");
    let manager = AuthManager::new(connector, config.session_settings()?);
    manager.initialize(credentials).await;

    let session = manager.current().await;
    match session.username() {
        Some(username) => tracing::info!("✅ Authenticated as {}", username),
        None => tracing::info!("Running with anonymous access"),
    }

    let tools = ToolRegistry::new(manager.clone(), PendingLogins::new(config.pending_login_ttl()?));
    let handler = RpcHandler::new(tools);

    let result = match config.transport {
        Transport::Stdio => run_stdio(handler).await,
        Transport::Http => run_http(&config, handler).await,
    };

    manager.logout().await;
    tracing::info!("👋 Shutdown complete");

    result
}

/// Logs always go to stderr; stdout belongs to the stdio transport
fn init_logging(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run_stdio(handler: RpcHandler) -> Result<()> {
    tracing::info!("🚀 Serving MCP over stdio");

    tokio::select! {
        result = stdio::serve(handler) => result,
        _ = shutdown_signal() => Ok(()),
    }
}

async fn run_http(config: &Config, handler: RpcHandler) -> Result<()> {
    let state = AppState::new(handler, config.gateway_api_key.clone());
    let app = routes::app(state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(config);

    // Start server with graceful shutdown
    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                  📂 MuckRock Gateway                      ║
║                                                           ║
║      FOIA requests, agencies and jurisdictions over MCP   ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    eprintln!("{}", banner);
    eprintln!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "  Server:      http://{}:{}/mcp",
        config.server_host, config.server_port
    );
    eprintln!("  MuckRock:    {}", config.api_url);
    eprintln!(
        "  API Key:     {}",
        if config.gateway_api_key.is_some() {
            "required"
        } else {
            "not configured"
        }
    );
    eprintln!("  Log Level:   {}", config.log_level);
    eprintln!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
