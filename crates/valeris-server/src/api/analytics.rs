// Analytics and funded-account evaluation.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use valeris_journal::evaluation::{evaluate, EvaluationReport, EvaluationRules};
use valeris_journal::stats::{
    by_setup, by_symbol, daily_pnl, equity_curve, heatmap, monthly_summary, DailyPnl,
    EquityPoint, GroupStats, Heatmap, MonthlySummary, TradeStats,
};

use super::{resolve_range, trades_in_range, RangeQuery};
use crate::auth::UserId;
use crate::error::ApiResult;
use crate::ServerState;

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/api/analytics", get(analytics))
        .route("/api/evaluation", get(evaluation))
}

#[derive(Debug, Serialize)]
pub struct AnalyticsReply {
    pub range: String,
    pub stats: TradeStats,
    pub daily: Vec<DailyPnl>,
    pub heatmap: Heatmap,
    pub by_symbol: Vec<GroupStats>,
    pub by_setup: Vec<GroupStats>,
    pub equity_curve: Vec<EquityPoint>,
    pub monthly: Vec<MonthlySummary>,
}

async fn analytics(
    State(state): State<ServerState>,
    user: UserId,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<AnalyticsReply>> {
    let range = resolve_range(query.range.as_deref(), &state.config)?;
    let trades = trades_in_range(&state.db, user.as_str(), range)?;
    let balance = state.config.evaluation.account_size;

    Ok(Json(AnalyticsReply {
        range: range.label(),
        stats: TradeStats::compute_with_balance(&trades, balance),
        daily: daily_pnl(&trades),
        heatmap: heatmap(&trades),
        by_symbol: by_symbol(&trades),
        by_setup: by_setup(&trades),
        equity_curve: equity_curve(&trades, balance),
        monthly: monthly_summary(&trades),
    }))
}

#[derive(Debug, Serialize)]
pub struct EvaluationReply {
    pub rules: EvaluationRules,
    pub report: EvaluationReport,
}

/// The challenge always covers the whole journal, whatever the range.
async fn evaluation(
    State(state): State<ServerState>,
    user: UserId,
) -> ApiResult<Json<EvaluationReply>> {
    let trades = state.db.list_trades(user.as_str())?;
    let rules = EvaluationRules::from(&state.config.evaluation);
    Ok(Json(EvaluationReply {
        report: evaluate(&rules, &trades),
        rules,
    }))
}
