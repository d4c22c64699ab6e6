// Serverless functions: AI coach, broker API proxy, market news.
//
// Thin handlers over the clients in valeris-app and valeris-llm, mounted
// under `/functions/{name}`.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use valeris_app::broker::BrokerAction;
use valeris_app::news::Article;
use valeris_journal::coach;
use valeris_journal::evaluation::{evaluate, EvaluationRules};
use valeris_journal::filter::TradeFilter;
use valeris_journal::stats::TradeStats;

use crate::api::resolve_range;
use crate::auth::UserId;
use crate::error::{ApiError, ApiResult};
use crate::ServerState;

/// Shown to the user whenever the coach cannot answer.
pub const COACH_FAILURE: &str = "Sorry, I encountered an error. Please try again.";

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/functions/ai-coach", post(ai_coach))
        .route("/functions/broker-api-proxy", post(broker_api_proxy))
        .route("/functions/fetch-market-news", get(fetch_market_news))
}

// ---------------------------------------------------------------------------
// ai-coach
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CoachRequest {
    pub question: String,
    /// Range of trades the coach looks at; the configured default if absent.
    #[serde(default)]
    pub range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CoachReply {
    pub reply: String,
}

async fn ai_coach(
    State(state): State<ServerState>,
    user: UserId,
    Json(request): Json<CoachRequest>,
) -> ApiResult<Json<CoachReply>> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question is required".to_string()));
    }
    let range = resolve_range(request.range.as_deref(), &state.config)?;

    let trades = state.db.list_trades(user.as_str())?;
    let filtered = TradeFilter::for_range(range).apply(&trades, Utc::now());
    let stats = TradeStats::compute_with_balance(&filtered, state.config.evaluation.account_size);
    let report = evaluate(&EvaluationRules::from(&state.config.evaluation), &trades);
    let prompt = coach::build_coach_prompt(&stats, &filtered, Some(&report), question);

    let reply = state
        .llm
        .collect_message(
            &coach::system_prompt(),
            &prompt,
            state.config.llm.coach_max_tokens,
        )
        .await
        .map_err(|e| {
            warn!(user = %user.as_str(), "Coach request failed: {:#}", e);
            ApiError::Upstream(COACH_FAILURE.to_string())
        })?;

    state.track(user.as_str(), "coach_asked", json!({ "trades": filtered.len() }));
    info!(user = %user.as_str(), chars = reply.len(), "Coach answered");
    Ok(Json(CoachReply { reply }))
}

// ---------------------------------------------------------------------------
// broker-api-proxy
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ProxyRequest {
    pub connection_id: String,
    pub action: String,
}

async fn broker_api_proxy(
    State(state): State<ServerState>,
    user: UserId,
    Json(request): Json<ProxyRequest>,
) -> ApiResult<Json<Value>> {
    let action: BrokerAction = request.action.parse()?;
    let connection = state
        .db
        .get_broker_connection(user.as_str(), &request.connection_id)?
        .ok_or_else(|| ApiError::NotFound(format!("broker connection {}", request.connection_id)))?;

    let body = state.broker.execute(action, &state.db, &connection).await?;
    if action == BrokerAction::Sync {
        state.track(
            user.as_str(),
            "broker_synced",
            json!({ "broker": connection.broker.as_str() }),
        );
    }
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// fetch-market-news
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewsReply {
    pub articles: Vec<Article>,
}

async fn fetch_market_news(
    State(state): State<ServerState>,
    _user: UserId,
    Query(query): Query<NewsQuery>,
) -> ApiResult<Json<NewsReply>> {
    let articles = state.news.fetch(query.q.as_deref().unwrap_or_default()).await?;
    Ok(Json(NewsReply { articles }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
