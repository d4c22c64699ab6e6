// Record types mirrored 1:1 from the journal's tables.
//
// Enum columns are stored as lower_snake_case text. `as_str` / `FromStr`
// convert in both directions; an unknown string is a row-mapping error.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored enum column holds an unexpected value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a text-backed enum with `as_str`, `Display` and `FromStr`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(
    /// Direction of a trade.
    Side, "side" { Long => "long", Short => "short" }
);

text_enum!(Role, "role" { Trader => "trader", Mentor => "mentor", Admin => "admin" });

text_enum!(Plan, "plan" { Free => "free", Pro => "pro", Elite => "elite" });

text_enum!(
    SubscriptionStatus, "subscription status" {
        Active => "active",
        Trialing => "trialing",
        PastDue => "past_due",
        Canceled => "canceled",
    }
);

text_enum!(
    TicketStatus, "ticket status" {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
);

text_enum!(
    TicketPriority, "ticket priority" {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
);

text_enum!(
    SessionStatus, "session status" {
        Booked => "booked",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

text_enum!(Broker, "broker" { Etrade => "etrade", Schwab => "schwab" });

impl Side {
    /// Accepts opening order actions (`buy`, `buy_to_open`, `sell_short`,
    /// `sell_to_open`) as well as `long` / `short`. A bare `sell` is
    /// rejected.
    pub fn from_order_action(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" | "buy_to_open" => Some(Side::Long),
            "short" | "sell_short" | "sell_to_open" => Some(Side::Short),
            _ => None,
        }
    }
}

impl SubscriptionStatus {
    /// Active and trialing subscriptions count toward revenue.
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl TicketStatus {
    /// Whether moving a ticket from `self` to `to` is allowed.
    pub fn can_transition(&self, to: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, to),
            (Open, InProgress)
                | (Open, Resolved)
                | (Open, Closed)
                | (InProgress, Resolved)
                | (InProgress, Closed)
                | (InProgress, Open)
                | (Resolved, Closed)
                | (Resolved, Open)
                | (Closed, Open)
        )
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A user-entered buy/sell record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fees: f64,
    #[serde(default)]
    pub setup: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Order id at the broker for synced trades; used as the upsert key.
    #[serde(default)]
    pub broker_ref: Option<String>,
}

/// Form-level validation failures for a trade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeValidationError {
    #[error("symbol is required")]
    MissingSymbol,
    #[error("quantity must be greater than zero")]
    NonPositiveQuantity,
    #[error("{0} price must be greater than zero")]
    NonPositivePrice(&'static str),
    #[error("fees cannot be negative")]
    NegativeFees,
    #[error("exit price and exit time must be given together")]
    IncompleteExit,
    #[error("exit time is before entry time")]
    ExitBeforeEntry,
}

impl Trade {
    /// A new open trade with a fresh id.
    pub fn open(
        user_id: &str,
        symbol: &str,
        side: Side,
        quantity: f64,
        entry_price: f64,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Trade {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbol: symbol.trim().to_uppercase(),
            side,
            quantity,
            entry_price,
            exit_price: None,
            entry_time,
            exit_time: None,
            fees: 0.0,
            setup: None,
            notes: None,
            broker_ref: None,
        }
    }

    /// Builder-style close.
    pub fn closed_at(mut self, exit_price: f64, exit_time: DateTime<Utc>) -> Self {
        self.exit_price = Some(exit_price);
        self.exit_time = Some(exit_time);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.exit_price.is_some() && self.exit_time.is_some()
    }

    /// Realized profit/loss net of fees, `None` while the trade is open.
    pub fn pnl(&self) -> Option<f64> {
        if !self.is_closed() {
            return None;
        }
        let exit = self.exit_price?;
        let gross = match self.side {
            Side::Long => (exit - self.entry_price) * self.quantity,
            Side::Short => (self.entry_price - exit) * self.quantity,
        };
        Some(gross - self.fees)
    }

    /// Pnl as a percentage of the capital committed at entry.
    pub fn return_pct(&self) -> Option<f64> {
        let pnl = self.pnl()?;
        let basis = self.entry_price * self.quantity;
        if basis == 0.0 {
            return None;
        }
        Some(pnl / basis * 100.0)
    }

    pub fn validate(&self) -> Result<(), TradeValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(TradeValidationError::MissingSymbol);
        }
        if !(self.quantity > 0.0) {
            return Err(TradeValidationError::NonPositiveQuantity);
        }
        if !(self.entry_price > 0.0) {
            return Err(TradeValidationError::NonPositivePrice("entry"));
        }
        if self.fees < 0.0 {
            return Err(TradeValidationError::NegativeFees);
        }
        match (self.exit_price, self.exit_time) {
            (None, None) => Ok(()),
            (Some(price), Some(time)) => {
                if !(price > 0.0) {
                    return Err(TradeValidationError::NonPositivePrice("exit"));
                }
                if time < self.entry_time {
                    return Err(TradeValidationError::ExitBeforeEntry);
                }
                Ok(())
            }
            _ => Err(TradeValidationError::IncompleteExit),
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts and billing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub two_factor_enabled: bool,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub price_cents: i64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Support, education, mentoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub body: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    pub correct: u32,
    pub total: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorSession {
    pub id: String,
    pub user_id: String,
    pub mentor_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: SessionStatus,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Broker connections and usage events
// ---------------------------------------------------------------------------

/// A stored credential used to proxy calls to a brokerage REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConnection {
    pub id: String,
    pub user_id: String,
    pub broker: Broker,
    pub account_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl BrokerConnection {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub name: String,
    pub user_id: Option<String>,
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap()
    }

    #[test]
    fn long_trade_pnl_subtracts_fees() {
        let mut trade = Trade::open("u1", "aapl", Side::Long, 10.0, 100.0, t0())
            .closed_at(105.0, t0() + Duration::minutes(30));
        trade.fees = 2.0;
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.pnl(), Some(48.0));
        assert!((trade.return_pct().unwrap() - 4.8).abs() < 1e-9);
    }

    #[test]
    fn short_trade_pnl_is_mirrored() {
        let trade = Trade::open("u1", "TSLA", Side::Short, 5.0, 200.0, t0())
            .closed_at(190.0, t0() + Duration::hours(1));
        assert_eq!(trade.pnl(), Some(50.0));
    }

    #[test]
    fn open_trade_has_no_pnl() {
        let trade = Trade::open("u1", "MSFT", Side::Long, 1.0, 300.0, t0());
        assert!(!trade.is_closed());
        assert_eq!(trade.pnl(), None);
        assert_eq!(trade.return_pct(), None);
    }

    #[test]
    fn validate_rejects_bad_forms() {
        let base = Trade::open("u1", "SPY", Side::Long, 1.0, 500.0, t0());

        let mut t = base.clone();
        t.symbol = "  ".into();
        assert_eq!(t.validate(), Err(TradeValidationError::MissingSymbol));

        let mut t = base.clone();
        t.quantity = 0.0;
        assert_eq!(t.validate(), Err(TradeValidationError::NonPositiveQuantity));

        let mut t = base.clone();
        t.exit_price = Some(501.0);
        assert_eq!(t.validate(), Err(TradeValidationError::IncompleteExit));

        let t = base.clone().closed_at(501.0, t0() - Duration::minutes(1));
        assert_eq!(t.validate(), Err(TradeValidationError::ExitBeforeEntry));

        let mut t = base.clone();
        t.fees = -1.0;
        assert_eq!(t.validate(), Err(TradeValidationError::NegativeFees));

        assert!(base.validate().is_ok());
    }

    #[test]
    fn text_enums_round_trip_through_strings() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), *status);
        }
        assert_eq!("PAST_DUE".parse::<SubscriptionStatus>(), Ok(SubscriptionStatus::PastDue));
        let err = "weekly".parse::<Plan>().unwrap_err();
        assert_eq!(err.kind, "plan");
    }

    #[test]
    fn side_accepts_order_actions() {
        assert_eq!(Side::from_order_action("BUY"), Some(Side::Long));
        assert_eq!(Side::from_order_action("sell_short"), Some(Side::Short));
        assert_eq!(Side::from_order_action("sell"), None);
    }

    #[test]
    fn side_accepts_every_opening_alias() {
        for action in ["long", "buy", " Buy_To_Open "] {
            assert_eq!(Side::from_order_action(action), Some(Side::Long), "{action}");
        }
        for action in ["short", "SELL_SHORT", "sell_to_open"] {
            assert_eq!(Side::from_order_action(action), Some(Side::Short), "{action}");
        }
        for action in ["sell", "buy_to_close", "sell_to_close", ""] {
            assert_eq!(Side::from_order_action(action), None, "{action}");
        }
    }

    #[test]
    fn ticket_transitions() {
        assert!(TicketStatus::Open.can_transition(TicketStatus::InProgress));
        assert!(TicketStatus::Closed.can_transition(TicketStatus::Open));
        assert!(!TicketStatus::Closed.can_transition(TicketStatus::Resolved));
        assert!(!TicketStatus::Open.can_transition(TicketStatus::Open));
    }

    #[test]
    fn broker_connection_expiry() {
        let conn = BrokerConnection {
            id: "c1".into(),
            user_id: "u1".into(),
            broker: Broker::Schwab,
            account_id: "A1".into(),
            access_token: "tok".into(),
            expires_at: Some(t0()),
            last_synced_at: None,
        };
        assert!(conn.is_expired(t0()));
        assert!(!conn.is_expired(t0() - Duration::seconds(1)));
    }
}
