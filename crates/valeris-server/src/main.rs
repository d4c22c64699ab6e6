// Valeris functions server entry point.
//
// Startup sequence:
// 1. Initialize tracing (stdout)
// 2. Load config
// 3. Open database
// 4. Build the LLM client
// 5. Build the router
// 6. Bind and serve until Ctrl+C

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use valeris_core::config;
use valeris_core::db::Database;
use valeris_llm::LlmClient;
use valeris_server::{create_router, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Valeris functions starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 3. Open database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    // 4. LLM client
    let llm_client = LlmClient::from_config(&config);
    if !llm_client.is_enabled() {
        info!("LLM client disabled (no API key); ai-coach will answer 502");
    }

    // 5. Router
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid server address {}:{}",
                config.server.bind, config.server.port
            )
        })?;
    let router = create_router(ServerState::new(config, db, llm_client));

    // 6. Serve
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Functions server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Valeris functions shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("valeris=info,tower_http=info,warn")),
        )
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
