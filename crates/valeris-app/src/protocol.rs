// Message types shared by the app loop, the TUI and the capture bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use valeris_core::models::{BrokerConnection, Side, Trade};
use valeris_journal::evaluation::EvaluationReport;
use valeris_journal::stats::{DailyPnl, GroupStats, Heatmap, TradeStats};

use crate::news::Article;

// ---------------------------------------------------------------------------
// Tabs and statuses
// ---------------------------------------------------------------------------

/// Main-panel tabs, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabId {
    Trades,
    Analytics,
    Coach,
    Evaluation,
    News,
}

impl TabId {
    pub const ALL: [TabId; 5] = [
        TabId::Trades,
        TabId::Analytics,
        TabId::Coach,
        TabId::Evaluation,
        TabId::News,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TabId::Trades => "Trades",
            TabId::Analytics => "Analytics",
            TabId::Coach => "Coach",
            TabId::Evaluation => "Evaluation",
            TabId::News => "News",
        }
    }

    pub fn index(&self) -> usize {
        TabId::ALL.iter().position(|t| t == self).unwrap_or(0)
    }

    /// 1-based hotkey number.
    pub fn from_digit(digit: char) -> Option<TabId> {
        let n = digit.to_digit(10)? as usize;
        TabId::ALL.get(n.checked_sub(1)?).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmStatus {
    Idle,
    Streaming,
    Complete,
    Error,
}

/// Whether a capture bridge is currently feeding fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

// ---------------------------------------------------------------------------
// TUI -> app
// ---------------------------------------------------------------------------

/// A manually entered trade. Times default to now.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeDraft {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub fees: f64,
    pub setup: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    SwitchTab(TabId),
    /// Move to the next date-range preset.
    CycleRange,
    AskCoach(String),
    AddTrade(Box<TradeDraft>),
    DeleteTrade(String),
    ExportCsv,
    SyncBroker(String),
    RefreshNews,
    Quit,
}

// ---------------------------------------------------------------------------
// app -> TUI
// ---------------------------------------------------------------------------

/// Everything the dashboard shows for the current filter.
#[derive(Debug, Clone)]
pub struct AppSnapshot {
    pub display_name: String,
    pub currency: String,
    pub range_label: String,
    /// Filtered trades, newest entry first.
    pub trades: Vec<Trade>,
    pub stats: TradeStats,
    pub daily: Vec<DailyPnl>,
    pub heatmap: Heatmap,
    pub by_symbol: Vec<GroupStats>,
    pub by_setup: Vec<GroupStats>,
    /// Challenge status over the whole journal, not just the filter.
    pub evaluation: EvaluationReport,
    pub active_tab: TabId,
    pub llm_enabled: bool,
    pub broker_connections: Vec<BrokerConnection>,
}

#[derive(Debug, Clone)]
pub enum UiUpdate {
    Snapshot(Box<AppSnapshot>),
    CoachStarted,
    CoachToken(String),
    CoachComplete(String),
    CoachError(String),
    /// One-line message for the status bar.
    Status(String),
    CaptureStatus(ConnectionStatus),
    News(Vec<Article>),
}

// ---------------------------------------------------------------------------
// Capture bridge -> app
// ---------------------------------------------------------------------------

/// JSON frames sent by a capture bridge.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureMessage {
    Fill { payload: FillPayload },
    Heartbeat {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// One execution reported by the bridge. A later fill with the same
/// `id` and exit fields closes the trade opened by the first.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FillPayload {
    /// Platform execution or position id.
    pub id: String,
    pub symbol: String,
    /// `buy`, `sell_short`, `long`, `short`, ...
    pub action: String,
    pub quantity: f64,
    pub price: f64,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fees: f64,
    /// Platform name, used to namespace `id`.
    #[serde(default)]
    pub platform: Option<String>,
}

impl FillPayload {
    /// Key used to match later fills against the stored trade.
    pub fn broker_ref(&self) -> String {
        format!("{}:{}", self.platform.as_deref().unwrap_or("capture"), self.id)
    }
}
