// Application state and orchestration logic.
//
// The central event loop that coordinates fills from the capture bridge,
// LLM streaming events for the coach, and user commands from the TUI. Keeps
// the loaded journal and its derived analytics, and pushes UI updates to the
// TUI render loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use valeris_core::config::Config;
use valeris_core::db::Database;
use valeris_core::models::{BrokerConnection, Side, Trade};
use valeris_core::tracker::EventTracker;
use valeris_journal::coach;
use valeris_journal::evaluation::{evaluate, EvaluationReport, EvaluationRules};
use valeris_journal::export;
use valeris_journal::filter::{DateRange, TradeFilter};
use valeris_journal::stats::{self, TradeStats};
use valeris_llm::{LlmClient, LlmEvent};

use crate::broker::{BrokerClient, BrokerError, SyncReport};
use crate::capture::CaptureEvent;
use crate::news::{Article, NewsClient, NewsError};
use crate::protocol::{
    AppSnapshot, CaptureMessage, ConnectionStatus, FillPayload, LlmStatus, TabId, TradeDraft,
    UiUpdate, UserCommand,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long the capture bridge may stay silent before the connection is
/// treated as stale.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

/// How often the event loop checks for a stale capture connection.
pub const HEARTBEAT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: Config,
    pub db: Arc<Database>,
    /// Every trade in the journal, open and closed.
    pub trades: Vec<Trade>,
    pub filter: TradeFilter,
    /// Stats over the filtered trades.
    pub stats: TradeStats,
    /// Challenge status over the whole journal.
    pub evaluation: EvaluationReport,
    pub active_tab: TabId,
    pub current_llm_task: Option<tokio::task::JoinHandle<()>>,
    /// Incremented for every coach request; events carrying another
    /// generation are stale and dropped.
    pub llm_generation: u64,
    pub coach_text: String,
    pub coach_status: LlmStatus,
    pub capture_status: ConnectionStatus,
    /// Last frame (or connect) from the capture bridge. `None` while no
    /// bridge is connected.
    pub last_capture_message_time: Option<Instant>,
    pub llm_client: Arc<LlmClient>,
    pub llm_tx: mpsc::Sender<LlmEvent>,
    pub broker: Arc<BrokerClient>,
    pub news: Arc<NewsClient>,
    pub tracker: EventTracker,
}

/// Outcome of a broker sync or news fetch spawned off the event loop.
#[derive(Debug)]
enum BackgroundResult {
    BrokerSync {
        connection: BrokerConnection,
        result: Result<SyncReport, BrokerError>,
    },
    News(Result<Vec<Article>, NewsError>),
}

impl AppState {
    pub fn new(
        config: Config,
        db: Arc<Database>,
        llm_client: LlmClient,
        llm_tx: mpsc::Sender<LlmEvent>,
    ) -> Self {
        // Known keys only; checked by the config loader.
        let range = config
            .journal
            .default_range
            .parse()
            .unwrap_or(DateRange::Last30Days);
        let rules = EvaluationRules::from(&config.evaluation);

        let mut tracker = EventTracker::new(true);
        tracker.identify(&config.journal.user_id);

        AppState {
            broker: Arc::new(BrokerClient::from_config(&config)),
            news: Arc::new(NewsClient::from_config(&config)),
            evaluation: evaluate(&rules, &[]),
            config,
            db,
            trades: Vec::new(),
            filter: TradeFilter::for_range(range),
            stats: TradeStats::default(),
            active_tab: TabId::Trades,
            current_llm_task: None,
            llm_generation: 0,
            coach_text: String::new(),
            coach_status: LlmStatus::Idle,
            capture_status: ConnectionStatus::Disconnected,
            last_capture_message_time: None,
            llm_client: Arc::new(llm_client),
            llm_tx,
            tracker,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.config.journal.user_id
    }

    /// Load the user's trades from the database and recompute analytics.
    pub fn reload_trades(&mut self) -> anyhow::Result<()> {
        self.trades = self
            .db
            .list_trades(self.user_id())
            .context("failed to load trades")?;
        self.recompute();
        info!("Loaded {} trades for {}", self.trades.len(), self.user_id());
        Ok(())
    }

    /// Trades passing the current filter.
    pub fn filtered_trades(&self) -> Vec<Trade> {
        self.filter.apply(&self.trades, Utc::now())
    }

    fn recompute(&mut self) {
        let filtered = self.filtered_trades();
        self.stats = TradeStats::compute_with_balance(&filtered, self.config.evaluation.account_size);
        self.evaluation = evaluate(&EvaluationRules::from(&self.config.evaluation), &self.trades);
    }

    pub fn cycle_range(&mut self) {
        self.filter.range = self.filter.range.next();
        self.recompute();
        info!("Date range set to {}", self.filter.range);
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let broker_connections = self
            .db
            .list_broker_connections(self.user_id())
            .unwrap_or_else(|e| {
                warn!("Failed to list broker connections: {:#}", e);
                Vec::new()
            });
        let mut trades = self.filtered_trades();
        trades.sort_by(|a, b| b.entry_time.cmp(&a.entry_time).then_with(|| a.id.cmp(&b.id)));

        AppSnapshot {
            display_name: self.config.journal.display_name.clone(),
            currency: self.config.journal.currency.clone(),
            range_label: self.filter.range.label(),
            stats: self.stats.clone(),
            daily: stats::daily_pnl(&trades),
            heatmap: stats::heatmap(&trades),
            by_symbol: stats::by_symbol(&trades),
            by_setup: stats::by_setup(&trades),
            evaluation: self.evaluation.clone(),
            active_tab: self.active_tab,
            llm_enabled: self.llm_client.is_enabled(),
            broker_connections,
            trades,
        }
    }

    /// Validate and store a manually entered trade.
    pub fn add_trade(&mut self, draft: TradeDraft) -> anyhow::Result<Trade> {
        let now = Utc::now();
        let mut trade = Trade::open(
            self.user_id(),
            &draft.symbol,
            draft.side,
            draft.quantity,
            draft.entry_price,
            now,
        );
        if let Some(exit_price) = draft.exit_price {
            trade = trade.closed_at(exit_price, now);
        }
        trade.fees = draft.fees;
        trade.setup = draft.setup.filter(|s| !s.trim().is_empty());
        trade.notes = draft.notes.filter(|s| !s.trim().is_empty());
        trade.validate().context("invalid trade")?;

        self.db.insert_trade(&trade)?;
        self.tracker.track(
            "trade_added",
            json!({ "symbol": trade.symbol, "closed": trade.is_closed() }),
        );
        self.trades.push(trade.clone());
        self.recompute();
        info!("Added trade {} {}", trade.symbol, trade.id);
        Ok(trade)
    }

    /// Returns `false` when no trade with `trade_id` belongs to the user.
    pub fn delete_trade(&mut self, trade_id: &str) -> anyhow::Result<bool> {
        let deleted = self.db.delete_trade(self.user_id(), trade_id)?;
        if deleted {
            self.trades.retain(|t| t.id != trade_id);
            self.tracker.track("trade_deleted", json!({}));
            self.recompute();
            info!("Deleted trade {}", trade_id);
        }
        Ok(deleted)
    }

    /// Record a fill from the capture bridge. Fills are keyed by their
    /// platform id, so a closing fill updates the trade its opening fill
    /// created.
    pub fn apply_fill(&mut self, fill: &FillPayload) -> anyhow::Result<Trade> {
        let Some(side) = Side::from_order_action(&fill.action) else {
            bail!("unsupported fill action `{}`", fill.action);
        };

        let mut trade = Trade::open(
            self.user_id(),
            &fill.symbol,
            side,
            fill.quantity,
            fill.price,
            fill.time,
        );
        trade.fees = fill.fees;
        trade.broker_ref = Some(fill.broker_ref());
        if let (Some(price), Some(time)) = (fill.exit_price, fill.exit_time) {
            trade = trade.closed_at(price, time);
        }
        trade.validate().context("invalid fill")?;

        trade.id = self.db.upsert_trade_by_broker_ref(&trade)?;
        self.tracker.track("fill_captured", json!({ "symbol": trade.symbol }));
        self.reload_trades()?;
        Ok(trade)
    }

    /// Write the filtered closed trades to `path` as CSV, creating parent
    /// directories. Returns the number of rows written.
    pub fn export_csv(&mut self, path: &Path) -> anyhow::Result<usize> {
        let trades = self.filtered_trades();
        let rows = trades.iter().filter(|t| t.is_closed()).count();
        let body = export::export_csv(&trades)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, body)
            .with_context(|| format!("failed to write {}", path.display()))?;

        self.tracker.track("csv_exported", json!({ "rows": rows }));
        info!("Exported {} trades to {}", rows, path.display());
        Ok(rows)
    }

    /// Cancel the in-flight coach request, if any.
    pub fn cancel_llm_task(&mut self) {
        if let Some(handle) = self.current_llm_task.take() {
            handle.abort();
            info!("Cancelled previous LLM task");
        }
    }

    /// Start a streaming coach answer for `question` over the filtered
    /// trades.
    pub fn trigger_coach(&mut self, question: &str) {
        self.cancel_llm_task();

        let trades = self.filtered_trades();
        let system = coach::system_prompt();
        let user_content =
            coach::build_coach_prompt(&self.stats, &trades, Some(&self.evaluation), question);

        let max_tokens = self.config.llm.coach_max_tokens;
        let client = Arc::clone(&self.llm_client);
        let tx = self.llm_tx.clone();

        self.llm_generation += 1;
        let generation = self.llm_generation;
        self.coach_text.clear();
        self.coach_status = LlmStatus::Streaming;
        self.tracker.track("coach_asked", json!({ "trades": trades.len() }));

        let handle = tokio::spawn(async move {
            if let Err(e) = client
                .stream_message(&system, &user_content, max_tokens, tx, generation)
                .await
            {
                warn!("Coach request failed: {}", e);
            }
        });
        self.current_llm_task = Some(handle);
        info!("Triggered coach request (gen: {})", generation);
    }
}

/// Timestamped file under `exports/` in the working directory.
pub fn default_export_path(now: DateTime<Utc>) -> PathBuf {
    PathBuf::from("exports").join(format!("valeris-trades-{}.csv", now.format("%Y%m%d-%H%M%S")))
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the application event loop until the user quits or a channel the
/// loop depends on closes.
///
/// Selects over capture events, LLM streaming events, user commands, results
/// of background broker/news calls and a heartbeat timer, pushing UI updates
/// through `ui_tx`. Buffered usage events are flushed on every heartbeat.
pub async fn run(
    mut capture_rx: mpsc::Receiver<CaptureEvent>,
    mut llm_rx: mpsc::Receiver<LlmEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    let _ = ui_tx
        .send(UiUpdate::Snapshot(Box::new(state.build_snapshot())))
        .await;

    let mut llm_open = true;
    let mut capture_open = true;
    let (bg_tx, mut bg_rx) = mpsc::channel::<BackgroundResult>(16);

    let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_CHECK_INTERVAL);
    // The first tick completes immediately.
    heartbeat_interval.tick().await;

    loop {
        tokio::select! {
            // --- Capture bridge ---
            event = capture_rx.recv(), if capture_open => {
                match event {
                    Some(CaptureEvent::Connected { addr }) => {
                        info!("Capture bridge connected from {}", addr);
                        state.capture_status = ConnectionStatus::Connected;
                        state.last_capture_message_time = Some(Instant::now());
                        let _ = ui_tx.send(UiUpdate::CaptureStatus(ConnectionStatus::Connected)).await;
                    }
                    Some(CaptureEvent::Disconnected) => {
                        info!("Capture bridge disconnected");
                        state.capture_status = ConnectionStatus::Disconnected;
                        state.last_capture_message_time = None;
                        let _ = ui_tx.send(UiUpdate::CaptureStatus(ConnectionStatus::Disconnected)).await;
                    }
                    Some(CaptureEvent::Message(text)) => {
                        // A frame after a stale timeout means the bridge is back.
                        if state.capture_status == ConnectionStatus::Disconnected
                            && state.last_capture_message_time.is_some()
                        {
                            info!("Capture bridge connection restored");
                            state.capture_status = ConnectionStatus::Connected;
                            let _ = ui_tx.send(UiUpdate::CaptureStatus(ConnectionStatus::Connected)).await;
                        }
                        if state.last_capture_message_time.is_some() {
                            state.last_capture_message_time = Some(Instant::now());
                        }
                        handle_capture_message(&mut state, &text, &ui_tx).await;
                    }
                    None => {
                        // The journal stays usable without a bridge.
                        info!("Capture channel closed");
                        capture_open = false;
                    }
                }
            }

            // --- LLM events ---
            llm_event = llm_rx.recv(), if llm_open => {
                match llm_event {
                    Some(event) => handle_llm_event(&mut state, event, &ui_tx).await,
                    None => {
                        info!("LLM channel closed");
                        llm_open = false;
                    }
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => handle_user_command(&mut state, cmd, &ui_tx, &bg_tx).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Broker and news results ---
            Some(result) = bg_rx.recv() => {
                handle_background_result(&mut state, result, &ui_tx).await;
            }

            // --- Heartbeat: usage flush and stale-bridge check ---
            _ = heartbeat_interval.tick() => {
                if let Err(e) = state.tracker.flush(&state.db) {
                    warn!("Failed to flush usage events: {:#}", e);
                }
                if state.capture_status == ConnectionStatus::Connected {
                    if let Some(last) = state.last_capture_message_time {
                        let elapsed = last.elapsed();
                        if elapsed > HEARTBEAT_TIMEOUT {
                            warn!("No capture frame for {:?}, marking bridge as stale", elapsed);
                            state.capture_status = ConnectionStatus::Disconnected;
                            let _ = ui_tx
                                .send(UiUpdate::CaptureStatus(ConnectionStatus::Disconnected))
                                .await;
                        }
                    }
                }
            }
        }
    }

    state.cancel_llm_task();
    if let Err(e) = state.tracker.flush(&state.db) {
        warn!("Failed to flush usage events: {:#}", e);
    }
    info!("Application event loop exiting");
    Ok(())
}

async fn send_snapshot(state: &AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let _ = ui_tx
        .send(UiUpdate::Snapshot(Box::new(state.build_snapshot())))
        .await;
}

async fn send_status(ui_tx: &mpsc::Sender<UiUpdate>, message: String) {
    let _ = ui_tx.send(UiUpdate::Status(message)).await;
}

/// Handle one JSON frame from the capture bridge.
async fn handle_capture_message(state: &mut AppState, text: &str, ui_tx: &mpsc::Sender<UiUpdate>) {
    let msg: CaptureMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse capture message: {}", e);
            return;
        }
    };

    match msg {
        CaptureMessage::Fill { payload } => match state.apply_fill(&payload) {
            Ok(trade) => {
                send_snapshot(state, ui_tx).await;
                let verb = if trade.is_closed() { "Closed" } else { "Opened" };
                send_status(
                    ui_tx,
                    format!("{verb} {} {} {}", trade.side, trade.quantity, trade.symbol),
                )
                .await;
            }
            Err(e) => {
                warn!("Rejected fill {}: {:#}", payload.id, e);
                send_status(ui_tx, format!("Rejected fill {}: {e}", payload.id)).await;
            }
        },
        CaptureMessage::Heartbeat { .. } => {}
    }
}

/// Apply a coach streaming event. Events from a superseded request, or
/// arriving after the current one finished, are dropped.
async fn handle_llm_event(state: &mut AppState, event: LlmEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    if event.generation() != state.llm_generation {
        debug!(
            "Discarding stale LLM event (event gen: {}, current gen: {})",
            event.generation(),
            state.llm_generation
        );
        return;
    }
    if state.coach_status != LlmStatus::Streaming {
        debug!("Received LLM event with no active request, discarding");
        return;
    }

    match event {
        LlmEvent::Token { text, .. } => {
            state.coach_text.push_str(&text);
            let _ = ui_tx.send(UiUpdate::CoachToken(text)).await;
        }
        LlmEvent::Complete {
            full_text,
            stop_reason,
            ..
        } => {
            let text = if stop_reason.as_deref() == Some("max_tokens") {
                format!("{full_text}\n\n[Response truncated due to token limit]")
            } else {
                full_text
            };
            state.coach_text = text.clone();
            state.coach_status = LlmStatus::Complete;
            state.current_llm_task = None;
            let _ = ui_tx.send(UiUpdate::CoachComplete(text)).await;
        }
        LlmEvent::Error { message, .. } => {
            warn!("Coach error: {}", message);
            state.coach_status = LlmStatus::Error;
            state.current_llm_task = None;
            let _ = ui_tx
                .send(UiUpdate::CoachError(
                    "Sorry, I encountered an error. Please try again.".to_string(),
                ))
                .await;
        }
    }
}

/// Handle a user command from the TUI.
async fn handle_user_command(
    state: &mut AppState,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
    bg_tx: &mpsc::Sender<BackgroundResult>,
) {
    match cmd {
        UserCommand::SwitchTab(tab) => {
            state.active_tab = tab;
            debug!("Switched to tab: {:?}", tab);
        }
        UserCommand::CycleRange => {
            state.cycle_range();
            send_snapshot(state, ui_tx).await;
        }
        UserCommand::AskCoach(question) => {
            state.trigger_coach(&question);
            let _ = ui_tx.send(UiUpdate::CoachStarted).await;
        }
        UserCommand::AddTrade(draft) => match state.add_trade(*draft) {
            Ok(trade) => {
                send_snapshot(state, ui_tx).await;
                send_status(ui_tx, format!("Added {} {}", trade.side, trade.symbol)).await;
            }
            Err(e) => {
                warn!("Failed to add trade: {:#}", e);
                send_status(ui_tx, format!("Failed to add trade: {e:#}")).await;
            }
        },
        UserCommand::DeleteTrade(id) => match state.delete_trade(&id) {
            Ok(true) => {
                send_snapshot(state, ui_tx).await;
                send_status(ui_tx, "Trade deleted".to_string()).await;
            }
            Ok(false) => send_status(ui_tx, "Trade not found".to_string()).await,
            Err(e) => {
                warn!("Failed to delete trade {}: {:#}", id, e);
                send_status(ui_tx, "Failed to delete trade".to_string()).await;
            }
        },
        UserCommand::ExportCsv => {
            let path = default_export_path(Utc::now());
            match state.export_csv(&path) {
                Ok(rows) => {
                    send_status(ui_tx, format!("Exported {rows} trades to {}", path.display())).await
                }
                Err(e) => {
                    warn!("CSV export failed: {:#}", e);
                    send_status(ui_tx, "Failed to export trades".to_string()).await;
                }
            }
        }
        UserCommand::SyncBroker(connection_id) => {
            start_broker_sync(state, &connection_id, ui_tx, bg_tx).await;
        }
        UserCommand::RefreshNews => {
            let news = Arc::clone(&state.news);
            let bg_tx = bg_tx.clone();
            tokio::spawn(async move {
                let result = news.fetch("").await;
                let _ = bg_tx.send(BackgroundResult::News(result)).await;
            });
        }
        UserCommand::Quit => {
            // Handled in the main loop
        }
    }
}

/// Look up the connection and spawn the sync; the outcome comes back as a
/// `BackgroundResult::BrokerSync`.
async fn start_broker_sync(
    state: &AppState,
    connection_id: &str,
    ui_tx: &mpsc::Sender<UiUpdate>,
    bg_tx: &mpsc::Sender<BackgroundResult>,
) {
    let connection = match state.db.get_broker_connection(state.user_id(), connection_id) {
        Ok(Some(c)) => c,
        Ok(None) => {
            send_status(ui_tx, format!("Unknown broker connection {connection_id}")).await;
            return;
        }
        Err(e) => {
            warn!("Failed to load broker connection: {:#}", e);
            send_status(ui_tx, "Failed to sync broker".to_string()).await;
            return;
        }
    };

    let broker = Arc::clone(&state.broker);
    let db = Arc::clone(&state.db);
    let bg_tx = bg_tx.clone();
    tokio::spawn(async move {
        let result = broker.sync_orders(&db, &connection).await;
        let _ = bg_tx
            .send(BackgroundResult::BrokerSync { connection, result })
            .await;
    });
}

async fn handle_background_result(
    state: &mut AppState,
    result: BackgroundResult,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match result {
        BackgroundResult::BrokerSync {
            connection,
            result: Ok(report),
        } => {
            if let Err(e) = state.reload_trades() {
                warn!("Failed to reload trades after sync: {:#}", e);
            }
            state
                .tracker
                .track("broker_synced", json!({ "broker": connection.broker.as_str() }));
            send_snapshot(state, ui_tx).await;
            send_status(
                ui_tx,
                format!("Synced {} orders from {}", report.upserted, connection.broker),
            )
            .await;
        }
        BackgroundResult::BrokerSync { result: Err(e), .. } => {
            warn!("Broker sync failed: {}", e);
            send_status(ui_tx, format!("Failed to sync broker: {e}")).await;
        }
        BackgroundResult::News(Ok(articles)) => {
            let _ = ui_tx.send(UiUpdate::News(articles)).await;
        }
        BackgroundResult::News(Err(e)) => {
            warn!("News fetch failed: {}", e);
            send_status(ui_tx, "Failed to fetch market news".to_string()).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
