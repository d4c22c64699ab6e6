// TUI dashboard: layout, input handling, and widget rendering.
//
// The TUI owns a `ViewState` that mirrors the journal snapshot pushed by the
// app loop. `UiUpdate` messages arrive over an mpsc channel; the TUI applies
// them to `ViewState` and re-renders at ~30 fps.

pub mod input;
pub mod layout;
pub mod widgets;

use std::collections::HashMap;
use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use ratatui::Frame;
use tokio::sync::mpsc;

use valeris_app::news::Article;
use valeris_app::protocol::{AppSnapshot, ConnectionStatus, LlmStatus, TabId, UiUpdate, UserCommand};
use valeris_core::models::{BrokerConnection, Trade};
use valeris_journal::evaluation::EvaluationReport;
use valeris_journal::stats::{DailyPnl, GroupStats, Heatmap, TradeStats};

use layout::build_layout;

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// What the single-line input at the bottom of the screen is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// A question for the AI coach.
    Coach,
    /// A quick trade entry line.
    NewTrade,
}

/// TUI-local state that mirrors the application state for rendering.
pub struct ViewState {
    /// Set once the first snapshot has arrived.
    pub loaded: bool,
    pub display_name: String,
    pub currency: String,
    pub range_label: String,
    /// Filtered trades, newest first.
    pub trades: Vec<Trade>,
    pub stats: TradeStats,
    pub daily: Vec<DailyPnl>,
    pub heatmap: Heatmap,
    pub by_symbol: Vec<GroupStats>,
    pub by_setup: Vec<GroupStats>,
    pub evaluation: Option<EvaluationReport>,
    pub broker_connections: Vec<BrokerConnection>,
    pub llm_enabled: bool,
    /// Accumulated coach reply (streamed tokens).
    pub coach_text: String,
    pub coach_status: LlmStatus,
    /// Capture bridge connection status.
    pub capture_status: ConnectionStatus,
    pub news: Vec<Article>,
    /// Latest one-line message from the app loop or input handler.
    pub status_message: Option<String>,
    pub active_tab: TabId,
    /// Per-widget scroll offsets (keyed by widget name).
    pub scroll_offset: HashMap<String, usize>,
    /// Row index into `trades`.
    pub selected_trade: usize,
    /// Next connection `b` will sync.
    pub broker_cursor: usize,
    pub input_mode: InputMode,
    pub input_text: String,
    pub confirm_quit: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            loaded: false,
            display_name: String::new(),
            currency: "USD".to_string(),
            range_label: String::new(),
            trades: Vec::new(),
            stats: TradeStats::default(),
            daily: Vec::new(),
            heatmap: Heatmap::default(),
            by_symbol: Vec::new(),
            by_setup: Vec::new(),
            evaluation: None,
            broker_connections: Vec::new(),
            llm_enabled: false,
            coach_text: String::new(),
            coach_status: LlmStatus::Idle,
            capture_status: ConnectionStatus::Disconnected,
            news: Vec::new(),
            status_message: None,
            active_tab: TabId::Trades,
            scroll_offset: HashMap::new(),
            selected_trade: 0,
            broker_cursor: 0,
            input_mode: InputMode::Normal,
            input_text: String::new(),
            confirm_quit: false,
        }
    }
}

impl ViewState {
    /// Apply a full journal snapshot from the app loop.
    ///
    /// Coach text, news and scroll offsets are not part of the snapshot and
    /// are left unchanged. The active tab is taken from the first snapshot
    /// only; afterwards the TUI owns it.
    pub fn apply_snapshot(&mut self, snapshot: AppSnapshot) {
        if !self.loaded {
            self.active_tab = snapshot.active_tab;
            self.loaded = true;
        }
        self.display_name = snapshot.display_name;
        self.currency = snapshot.currency;
        self.range_label = snapshot.range_label;
        self.trades = snapshot.trades;
        self.stats = snapshot.stats;
        self.daily = snapshot.daily;
        self.heatmap = snapshot.heatmap;
        self.by_symbol = snapshot.by_symbol;
        self.by_setup = snapshot.by_setup;
        self.evaluation = Some(snapshot.evaluation);
        self.broker_connections = snapshot.broker_connections;
        self.llm_enabled = snapshot.llm_enabled;

        self.selected_trade = self.selected_trade.min(self.trades.len().saturating_sub(1));
        if self.broker_cursor >= self.broker_connections.len() {
            self.broker_cursor = 0;
        }
    }

    pub fn selected_trade(&self) -> Option<&Trade> {
        self.trades.get(self.selected_trade)
    }
}

// ---------------------------------------------------------------------------
// UiUpdate processing
// ---------------------------------------------------------------------------

/// Apply a single UiUpdate to the ViewState.
pub fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::Snapshot(snapshot) => {
            state.apply_snapshot(*snapshot);
        }
        UiUpdate::CoachStarted => {
            state.coach_text.clear();
            state.coach_status = LlmStatus::Streaming;
            state.scroll_offset.remove("coach");
        }
        UiUpdate::CoachToken(token) => {
            state.coach_text.push_str(&token);
            state.coach_status = LlmStatus::Streaming;
        }
        UiUpdate::CoachComplete(text) => {
            state.coach_text = text;
            state.coach_status = LlmStatus::Complete;
        }
        UiUpdate::CoachError(message) => {
            state.coach_text = message;
            state.coach_status = LlmStatus::Error;
        }
        UiUpdate::Status(message) => {
            state.status_message = Some(message);
        }
        UiUpdate::CaptureStatus(status) => {
            state.capture_status = status;
        }
        UiUpdate::News(articles) => {
            state.status_message = Some(format!("Loaded {} news articles", articles.len()));
            state.news = articles;
            state.scroll_offset.remove("news");
        }
    }
}

// ---------------------------------------------------------------------------
// Render frame
// ---------------------------------------------------------------------------

/// Render the complete dashboard frame.
pub fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());

    widgets::status_bar::render(frame, layout.status_bar, state);
    widgets::summary::render(frame, layout.summary, state);

    match state.active_tab {
        TabId::Trades => widgets::trades::render(frame, layout.main_panel, state),
        TabId::Analytics => widgets::analytics::render(frame, layout.main_panel, state),
        TabId::Coach => widgets::coach::render(frame, layout.main_panel, state),
        TabId::Evaluation => widgets::evaluation::render(frame, layout.main_panel, state),
        TabId::News => widgets::news::render(frame, layout.main_panel, state),
    }

    widgets::breakdown::render(frame, layout.breakdown, state);
    widgets::daily::render(frame, layout.daily, state);
    widgets::help_bar::render(frame, layout.help_bar, state);

    if state.confirm_quit {
        widgets::quit_confirm::render(frame, frame.area());
    }
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop.
///
/// 1. Initializes the terminal (raw mode, alternate screen).
/// 2. Installs a panic hook that restores the terminal.
/// 3. Selects over UI updates, keyboard input and render ticks.
/// 4. Restores the terminal on exit.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    // 1. Initialize terminal
    let mut terminal = ratatui::init();

    // 2. Chain a restoring panic hook before the original one
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        ratatui::restore();
        original_hook(panic_info);
    }));

    let mut view_state = ViewState::default();
    let mut event_stream = EventStream::new();

    // 3. Render interval (~30fps)
    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(ui_update) => apply_ui_update(&mut view_state, ui_update),
                    // App loop has shut down
                    None => break,
                }
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        if let Some(cmd) = input::handle_key(key_event, &mut view_state) {
                            let quit = cmd == UserCommand::Quit;
                            if cmd_tx.send(cmd).await.is_err() || quit {
                                break;
                            }
                        }
                    }
                    // Resize and mouse events just wait for the next tick
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }

            _ = render_tick.tick() => {
                terminal.draw(|frame| render_frame(frame, &view_state))?;
            }
        }
    }

    // 4. Restore terminal
    ratatui::restore();

    Ok(())
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_state_default_is_sensible() {
        let state = ViewState::default();
        assert!(!state.loaded);
        assert!(state.trades.is_empty());
        assert!(state.evaluation.is_none());
        assert_eq!(state.active_tab, TabId::Trades);
        assert_eq!(state.capture_status, ConnectionStatus::Disconnected);
        assert_eq!(state.coach_status, LlmStatus::Idle);
        assert_eq!(state.input_mode, InputMode::Normal);
        assert!(state.scroll_offset.is_empty());
        assert!(!state.confirm_quit);
    }

    #[test]
    fn apply_snapshot_updates_fields() {
        let state = fixtures::loaded_state();
        assert!(state.loaded);
        assert_eq!(state.display_name, "Test Trader");
        assert_eq!(state.trades.len(), 3);
        assert_eq!(state.stats.total_trades, 2);
        assert_eq!(state.broker_connections.len(), 1);
        assert!(state.evaluation.is_some());
        assert!(state.llm_enabled);
    }

    #[test]
    fn later_snapshots_keep_local_tab() {
        let mut state = fixtures::loaded_state();
        state.active_tab = TabId::News;
        state.apply_snapshot(fixtures::snapshot());
        assert_eq!(state.active_tab, TabId::News);
    }

    #[test]
    fn apply_snapshot_clamps_selection() {
        let mut state = fixtures::loaded_state();
        state.selected_trade = 2;
        let mut snapshot = fixtures::snapshot();
        snapshot.trades.truncate(1);
        state.apply_snapshot(snapshot);
        assert_eq!(state.selected_trade, 0);

        let mut snapshot = fixtures::snapshot();
        snapshot.trades.clear();
        state.apply_snapshot(snapshot);
        assert_eq!(state.selected_trade, 0);
        assert!(state.selected_trade().is_none());
    }

    #[test]
    fn coach_stream_lifecycle() {
        let mut state = ViewState::default();
        state.coach_text = "old answer".to_string();
        state.scroll_offset.insert("coach".to_string(), 4);

        apply_ui_update(&mut state, UiUpdate::CoachStarted);
        assert!(state.coach_text.is_empty());
        assert_eq!(state.coach_status, LlmStatus::Streaming);
        assert!(!state.scroll_offset.contains_key("coach"));

        apply_ui_update(&mut state, UiUpdate::CoachToken("Cut ".into()));
        apply_ui_update(&mut state, UiUpdate::CoachToken("losers.".into()));
        assert_eq!(state.coach_text, "Cut losers.");

        apply_ui_update(&mut state, UiUpdate::CoachComplete("Cut losers early.".into()));
        assert_eq!(state.coach_text, "Cut losers early.");
        assert_eq!(state.coach_status, LlmStatus::Complete);
    }

    #[test]
    fn coach_error_replaces_text() {
        let mut state = ViewState::default();
        apply_ui_update(&mut state, UiUpdate::CoachStarted);
        apply_ui_update(&mut state, UiUpdate::CoachToken("partial".into()));
        apply_ui_update(&mut state, UiUpdate::CoachError("Sorry".into()));
        assert_eq!(state.coach_text, "Sorry");
        assert_eq!(state.coach_status, LlmStatus::Error);
    }

    #[test]
    fn status_capture_and_news_updates() {
        let mut state = ViewState::default();
        apply_ui_update(&mut state, UiUpdate::Status("Trade deleted".into()));
        assert_eq!(state.status_message.as_deref(), Some("Trade deleted"));

        apply_ui_update(&mut state, UiUpdate::CaptureStatus(ConnectionStatus::Connected));
        assert_eq!(state.capture_status, ConnectionStatus::Connected);

        state.scroll_offset.insert("news".to_string(), 3);
        let article = Article {
            title: "Fed holds".into(),
            source: "Wire".into(),
            url: "https://n/fed".into(),
            published_at: None,
            summary: String::new(),
        };
        apply_ui_update(&mut state, UiUpdate::News(vec![article]));
        assert_eq!(state.news.len(), 1);
        assert!(!state.scroll_offset.contains_key("news"));
        assert_eq!(state.status_message.as_deref(), Some("Loaded 1 news articles"));
    }

    #[test]
    fn render_frame_every_tab() {
        let mut state = fixtures::loaded_state();
        for tab in TabId::ALL {
            state.active_tab = tab;
            let backend = ratatui::backend::TestBackend::new(160, 50);
            let mut terminal = ratatui::Terminal::new(backend).unwrap();
            terminal.draw(|frame| render_frame(frame, &state)).unwrap();
        }
    }

    #[test]
    fn render_frame_before_first_snapshot() {
        let state = ViewState::default();
        let backend = ratatui::backend::TestBackend::new(80, 24);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        terminal.draw(|frame| render_frame(frame, &state)).unwrap();
    }

    #[test]
    fn render_frame_with_quit_dialog() {
        let mut state = fixtures::loaded_state();
        state.confirm_quit = true;
        let text = fixtures::render_text(100, 30, |frame| render_frame(frame, &state));
        assert!(text.contains("Leave Valeris?"));
    }
}
