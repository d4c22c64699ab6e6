// Broker proxy: forwards REST calls to a brokerage API with a stored
// credential and upserts filled orders into the journal.
//
// Credential exchange and request signing happen outside this process; the
// connection row already carries a bearer token.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use valeris_core::config::Config;
use valeris_core::db::Database;
use valeris_core::models::{Broker, BrokerConnection, Side, Trade};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker credentials have expired; reconnect the account")]
    Expired,

    #[error("unknown broker action `{0}` (expected accounts, positions, orders or sync)")]
    UnknownAction(String),

    #[error("broker request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("broker returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid broker base url `{0}`")]
    BaseUrl(String),

    #[error("failed to store synced trades: {0:#}")]
    Storage(anyhow::Error),
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerAction {
    Accounts,
    Positions,
    Orders,
    Sync,
}

impl BrokerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerAction::Accounts => "accounts",
            BrokerAction::Positions => "positions",
            BrokerAction::Orders => "orders",
            BrokerAction::Sync => "sync",
        }
    }
}

impl fmt::Display for BrokerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerAction {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accounts" => Ok(BrokerAction::Accounts),
            "positions" => Ok(BrokerAction::Positions),
            "orders" => Ok(BrokerAction::Orders),
            "sync" => Ok(BrokerAction::Sync),
            _ => Err(BrokerError::UnknownAction(s.to_string())),
        }
    }
}

/// Outcome of `BrokerClient::sync_orders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub fetched: usize,
    pub upserted: usize,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// BrokerClient
// ---------------------------------------------------------------------------

pub struct BrokerClient {
    http: reqwest::Client,
    etrade_base_url: String,
    schwab_base_url: String,
}

impl BrokerClient {
    pub fn new(etrade_base_url: String, schwab_base_url: String) -> Self {
        BrokerClient {
            http: reqwest::Client::new(),
            etrade_base_url,
            schwab_base_url,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        BrokerClient::new(
            config.brokers.etrade_base_url.clone(),
            config.brokers.schwab_base_url.clone(),
        )
    }

    /// `{base}/accounts/{account_id}[/{resource}]`, each part escaped as
    /// one path segment.
    fn account_url(
        &self,
        connection: &BrokerConnection,
        resource: Option<&str>,
    ) -> Result<reqwest::Url, BrokerError> {
        let base = match connection.broker {
            Broker::Etrade => &self.etrade_base_url,
            Broker::Schwab => &self.schwab_base_url,
        };
        let invalid = || BrokerError::BaseUrl(base.clone());
        let mut url = reqwest::Url::parse(base).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("accounts")
            .push(&connection.account_id)
            .extend(resource);
        Ok(url)
    }

    async fn get(
        &self,
        connection: &BrokerConnection,
        resource: Option<&str>,
    ) -> Result<Value, BrokerError> {
        if connection.is_expired(Utc::now()) {
            return Err(BrokerError::Expired);
        }

        let url = self.account_url(connection, resource)?;
        debug!("Broker GET {} ({})", url, connection.broker);
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&connection.access_token)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Broker rejected token for connection {}", connection.id);
            return Err(BrokerError::Expired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Broker returned HTTP {} for {}", status, url);
            return Err(BrokerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn accounts(&self, connection: &BrokerConnection) -> Result<Value, BrokerError> {
        self.get(connection, None).await
    }

    pub async fn positions(&self, connection: &BrokerConnection) -> Result<Value, BrokerError> {
        self.get(connection, Some("positions")).await
    }

    pub async fn orders(&self, connection: &BrokerConnection) -> Result<Value, BrokerError> {
        self.get(connection, Some("orders")).await
    }

    /// Pull orders and upsert the filled ones as trades keyed by
    /// `broker_ref`, then stamp the connection's `last_synced_at`.
    pub async fn sync_orders(
        &self,
        db: &Database,
        connection: &BrokerConnection,
    ) -> Result<SyncReport, BrokerError> {
        let body = self.orders(connection).await?;
        let (trades, skipped) = orders_to_trades(connection, &body);

        let mut report = SyncReport {
            fetched: trades.len() + skipped,
            upserted: 0,
            skipped,
        };
        for trade in &trades {
            db.upsert_trade_by_broker_ref(trade)
                .map_err(BrokerError::Storage)?;
            report.upserted += 1;
        }
        db.touch_broker_sync(&connection.user_id, &connection.id, Utc::now())
            .map_err(BrokerError::Storage)?;

        info!(
            "Synced {} orders from {} connection {} ({} skipped)",
            report.upserted, connection.broker, connection.id, report.skipped
        );
        Ok(report)
    }

    /// Dispatch a proxy action. `sync` returns the serialized report.
    pub async fn execute(
        &self,
        action: BrokerAction,
        db: &Database,
        connection: &BrokerConnection,
    ) -> Result<Value, BrokerError> {
        match action {
            BrokerAction::Accounts => self.accounts(connection).await,
            BrokerAction::Positions => self.positions(connection).await,
            BrokerAction::Orders => self.orders(connection).await,
            BrokerAction::Sync => {
                let report = self.sync_orders(db, connection).await?;
                Ok(serde_json::to_value(report).unwrap_or(Value::Null))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Order mapping
// ---------------------------------------------------------------------------

/// Map a broker `orders` response to trades. Accepts `{ "orders": [...] }`
/// or a bare array. Only filled opening orders become trades; when an order
/// carries `close_price` and `closed_at` the trade is closed as well.
/// Returns the trades and the number of orders skipped.
pub fn orders_to_trades(connection: &BrokerConnection, body: &Value) -> (Vec<Trade>, usize) {
    let orders = body
        .get("orders")
        .and_then(Value::as_array)
        .or_else(|| body.as_array());
    let Some(orders) = orders else {
        return (Vec::new(), 0);
    };

    let mut trades = Vec::new();
    let mut skipped = 0;
    for order in orders {
        match order_to_trade(connection, order) {
            Some(trade) => trades.push(trade),
            None => skipped += 1,
        }
    }
    (trades, skipped)
}

fn order_to_trade(connection: &BrokerConnection, order: &Value) -> Option<Trade> {
    let status = field(order, &["status"]).and_then(Value::as_str).unwrap_or_default();
    if !status.eq_ignore_ascii_case("filled") {
        return None;
    }

    let order_id = match field(order, &["id", "order_id", "orderId"])? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let symbol = field(order, &["symbol"]).and_then(Value::as_str)?;
    let action = field(order, &["action", "side"]).and_then(Value::as_str)?;
    let side = Side::from_order_action(action)?;
    let quantity = number(order, &["filled_quantity", "quantity"])?;
    let price = number(order, &["fill_price", "avg_price", "price"])?;
    let filled_at = time(order, &["filled_at", "time"])?;

    let mut trade = Trade::open(&connection.user_id, symbol, side, quantity, price, filled_at);
    trade.fees = number(order, &["fees", "commission"]).unwrap_or_default();
    trade.broker_ref = Some(format!("{}:{}", connection.broker, order_id));
    if let (Some(exit_price), Some(exit_time)) =
        (number(order, &["close_price"]), time(order, &["closed_at"]))
    {
        trade = trade.closed_at(exit_price, exit_time);
    }

    match trade.validate() {
        Ok(()) => Some(trade),
        Err(e) => {
            warn!("Skipping broker order {}: {}", order_id, e);
            None
        }
    }
}

/// First present key wins; brokers disagree on field names.
fn field<'a>(order: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| order.get(*k))
}

/// Brokers send numbers either as JSON numbers or as decimal strings.
fn number(order: &Value, keys: &[&str]) -> Option<f64> {
    match field(order, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn time(order: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    let text = field(order, keys)?.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
