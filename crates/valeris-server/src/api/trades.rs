// Trade CRUD plus CSV export and import.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use valeris_core::models::{Side, Trade};
use valeris_journal::export::{export_csv, import_csv};

use super::{resolve_range, trades_in_range, RangeQuery};
use crate::auth::UserId;
use crate::error::{ApiError, ApiResult};
use crate::ServerState;

pub const EXPORT_FILENAME: &str = "valeris-trades.csv";

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/api/trades", get(list_trades).post(create_trade))
        .route("/api/trades/{id}", put(update_trade).delete(delete_trade))
        .route("/api/export.csv", get(export_trades))
        .route("/api/import.csv", post(import_trades))
}

/// Body of `POST /api/trades` and `PUT /api/trades/{id}`. `entry_time`
/// defaults to now.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeInput {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fees: f64,
    #[serde(default)]
    pub setup: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl TradeInput {
    pub fn into_trade(self, user_id: &str, now: DateTime<Utc>) -> Trade {
        let mut trade = Trade::open(
            user_id,
            &self.symbol,
            self.side,
            self.quantity,
            self.entry_price,
            self.entry_time.unwrap_or(now),
        );
        trade.exit_price = self.exit_price;
        trade.exit_time = self.exit_time;
        trade.fees = self.fees;
        trade.setup = non_blank(self.setup);
        trade.notes = non_blank(self.notes);
        trade
    }
}

#[derive(Debug, Serialize)]
pub struct TradesReply {
    pub range: String,
    pub trades: Vec<Trade>,
}

async fn list_trades(
    State(state): State<ServerState>,
    user: UserId,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<TradesReply>> {
    let range = resolve_range(query.range.as_deref(), &state.config)?;
    let trades = trades_in_range(&state.db, user.as_str(), range)?;
    Ok(Json(TradesReply {
        range: range.label(),
        trades,
    }))
}

async fn create_trade(
    State(state): State<ServerState>,
    user: UserId,
    Json(input): Json<TradeInput>,
) -> ApiResult<(StatusCode, Json<Trade>)> {
    let trade = input.into_trade(user.as_str(), Utc::now());
    trade.validate()?;
    state.db.insert_trade(&trade)?;

    state.track(
        user.as_str(),
        "trade_logged",
        json!({ "symbol": trade.symbol, "closed": trade.is_closed() }),
    );
    info!(user = %user.as_str(), trade = %trade.id, "Trade logged");
    Ok((StatusCode::CREATED, Json(trade)))
}

async fn update_trade(
    State(state): State<ServerState>,
    user: UserId,
    Path(id): Path<String>,
    Json(input): Json<TradeInput>,
) -> ApiResult<Json<Trade>> {
    let existing = state
        .db
        .get_trade(user.as_str(), &id)?
        .ok_or_else(|| ApiError::NotFound(format!("trade {id}")))?;

    let mut trade = input.into_trade(user.as_str(), existing.entry_time);
    trade.id = existing.id;
    trade.broker_ref = existing.broker_ref;
    trade.validate()?;

    if !state.db.update_trade(&trade)? {
        return Err(ApiError::NotFound(format!("trade {id}")));
    }
    Ok(Json(trade))
}

async fn delete_trade(
    State(state): State<ServerState>,
    user: UserId,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.db.delete_trade(user.as_str(), &id)? {
        return Err(ApiError::NotFound(format!("trade {id}")));
    }
    state.track(user.as_str(), "trade_deleted", json!({}));
    Ok(StatusCode::NO_CONTENT)
}

async fn export_trades(
    State(state): State<ServerState>,
    user: UserId,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Response> {
    let range = resolve_range(query.range.as_deref(), &state.config)?;
    let trades = trades_in_range(&state.db, user.as_str(), range)?;
    let csv = export_csv(&trades)?;

    let rows = trades.iter().filter(|t| t.is_closed()).count();
    state.track(user.as_str(), "csv_exported", json!({ "rows": rows }));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        csv,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct ImportReply {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Body is raw CSV in the export format. Malformed rows are skipped and
/// reported; only a missing required column rejects the upload.
async fn import_trades(
    State(state): State<ServerState>,
    user: UserId,
    body: String,
) -> ApiResult<Json<ImportReply>> {
    let report = import_csv(body.as_bytes(), user.as_str())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    for trade in &report.trades {
        state.db.insert_trade(trade)?;
    }

    state.track(
        user.as_str(),
        "csv_imported",
        json!({ "rows": report.trades.len(), "skipped": report.skipped }),
    );
    Ok(Json(ImportReply {
        imported: report.trades.len(),
        skipped: report.skipped,
        errors: report.errors,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};

    use valeris_core::models::{Side, Trade};

    use crate::testing::{post_text, raw, send, state};

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap()
    }

    fn closed(user: &str, symbol: &str, exit: f64) -> Trade {
        Trade::open(user, symbol, Side::Long, 1.0, 100.0, t0())
            .closed_at(exit, t0() + Duration::minutes(10))
    }

    #[tokio::test]
    async fn create_validates_and_returns_created() {
        let state = state();
        let (status, body) = send(
            &state,
            "POST",
            "/api/trades",
            Some("u1"),
            Some(json!({
                "symbol": " es ",
                "side": "long",
                "quantity": 2.0,
                "entry_price": 5000.0,
                "entry_time": "2026-03-02T14:30:00Z",
                "exit_price": 5010.0,
                "exit_time": "2026-03-02T15:00:00Z",
                "setup": "breakout",
                "notes": "  "
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["symbol"], "ES");
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["notes"], Value::Null);
        assert_eq!(state.db.list_trades("u1").unwrap().len(), 1);
        assert_eq!(state.db.count_events("trade_logged").unwrap(), 1);
    }

    #[tokio::test]
    async fn create_rejects_invalid_trade() {
        let state = state();
        let (status, body) = send(
            &state,
            "POST",
            "/api/trades",
            Some("u1"),
            Some(json!({ "symbol": "ES", "side": "short", "quantity": 0.0, "entry_price": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "quantity must be greater than zero");

        let (status, _) = send(
            &state,
            "POST",
            "/api/trades",
            Some("u1"),
            Some(json!({
                "symbol": "ES",
                "side": "long",
                "quantity": 1.0,
                "entry_price": 10.0,
                "exit_price": 11.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.db.list_trades("u1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_scoped_and_filtered() {
        let state = state();
        state.db.insert_trade(&closed("u1", "ES", 101.0)).unwrap();
        state.db.insert_trade(&closed("u2", "NQ", 99.0)).unwrap();

        let (status, body) = send(&state, "GET", "/api/trades?range=all", Some("u1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["range"], "All time");
        let trades = body["trades"].as_array().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0]["symbol"], "ES");

        let (_, body) = send(
            &state,
            "GET",
            "/api/trades?range=2026-04-01..2026-04-30",
            Some("u1"),
            None,
        )
        .await;
        assert!(body["trades"].as_array().unwrap().is_empty());

        let (status, _) = send(&state, "GET", "/api/trades?range=soon", Some("u1"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_keeps_identity() {
        let state = state();
        let trade = closed("u1", "ES", 101.0);
        state.db.insert_trade(&trade).unwrap();

        let uri = format!("/api/trades/{}", trade.id);
        let (status, body) = send(
            &state,
            "PUT",
            &uri,
            Some("u1"),
            Some(json!({
                "symbol": "ES",
                "side": "long",
                "quantity": 3.0,
                "entry_price": 100.0,
                "notes": "scaled in"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], trade.id.as_str());
        assert_eq!(body["entry_time"], "2026-03-02T14:30:00Z");

        let stored = state.db.get_trade("u1", &trade.id).unwrap().unwrap();
        assert_eq!(stored.quantity, 3.0);
        assert_eq!(stored.notes.as_deref(), Some("scaled in"));
        assert!(!stored.is_closed());

        let (status, _) = send(
            &state,
            "PUT",
            &uri,
            Some("u2"),
            Some(json!({ "symbol": "ES", "side": "long", "quantity": 1.0, "entry_price": 1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_only_own_trades() {
        let state = state();
        let trade = closed("u1", "ES", 101.0);
        state.db.insert_trade(&trade).unwrap();
        let uri = format!("/api/trades/{}", trade.id);

        let (status, _) = send(&state, "DELETE", &uri, Some("u2"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&state, "DELETE", &uri, Some("u1"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
        assert!(state.db.list_trades("u1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_returns_csv_attachment() {
        let state = state();
        state.db.insert_trade(&closed("u1", "ES", 101.0)).unwrap();
        state
            .db
            .insert_trade(&Trade::open("u1", "NQ", Side::Short, 1.0, 50.0, t0()))
            .unwrap();

        let response = raw(&state, "GET", "/api/export.csv?range=all", Some("u1"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["content-type"], "text/csv; charset=utf-8");
        assert!(headers["content-disposition"]
            .to_str()
            .unwrap()
            .contains(super::EXPORT_FILENAME));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // Header plus the one closed trade.
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("date,symbol,side"));
        assert!(lines[1].contains("ES"));
    }

    #[tokio::test]
    async fn import_inserts_valid_rows() {
        let state = state();
        let csv = "symbol,side,quantity,entry_price,exit_price,date\n\
                   ES,long,1,5000,5010,2026-03-02\n\
                   NQ,sideways,1,100,101,2026-03-02\n";
        let response = post_text(&state, "/api/import.csv", "u1", csv).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["imported"], 1);
        assert_eq!(body["skipped"], 1);
        assert!(body["errors"][0].as_str().unwrap().starts_with("line 3"));
        assert_eq!(state.db.list_trades("u1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_without_required_column_is_rejected() {
        let state = state();
        let response = post_text(&state, "/api/import.csv", "u1", "symbol,side\nES,long\n").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
