// Valeris terminal journal entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open database
// 4. Build the LLM client
// 5. Create mpsc channels
// 6. Create AppState and load the journal
// 7. Spawn the trade-capture listener task
// 8. Spawn app logic task
// 9. Run the TUI until the user quits
// 10. Cleanup on exit

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use valeris_app::{app, capture};
use valeris_core::config;
use valeris_core::db::Database;
use valeris_llm::LlmClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Valeris starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: user={}, range={}, account size {}",
        config.journal.user_id, config.journal.default_range, config.evaluation.account_size
    );

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
    match &llm_client {
        LlmClient::Active(_) => info!("LLM client initialized (API key configured)"),
        LlmClient::Disabled => info!("LLM client disabled (no API key)"),
    }

    // 5. Channels
    let (capture_tx, capture_rx) = mpsc::channel(256);
    let (llm_tx, llm_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    // 6. Application state
    let capture_port = config.capture_port;
    let mut app_state = app::AppState::new(config, db, llm_client, llm_tx);
    app_state
        .reload_trades()
        .context("failed to load journal")?;

    // 7. Trade-capture listener
    let capture_handle = tokio::spawn(async move {
        match capture::TungsteniteListener::bind(capture_port).await {
            Ok(listener) => {
                if let Err(e) = capture::run(listener, capture_tx).await {
                    error!("Capture listener error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind capture listener on port {}: {}", capture_port, e);
            }
        }
    });

    // 8. App logic task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(capture_rx, llm_rx, cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 9. TUI; returns once the user quits
    info!("Application ready. Capture bridge port 127.0.0.1:{}", capture_port);
    if let Err(e) = valeris_tui::run(ui_rx, cmd_tx).await {
        error!("TUI error: {}", e);
    }

    // 10. Give the app loop time to flush usage events
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    // The listener loops forever
    capture_handle.abort();

    info!("Valeris shut down cleanly");
    Ok(())
}

/// Log to a file; the terminal belongs to the TUI.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("valeris.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("valeris=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
