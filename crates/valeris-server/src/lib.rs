// HTTP surface for Valeris: the serverless functions (AI coach, broker
// proxy, market news) and the journal REST API, served by axum.

pub mod api;
pub mod auth;
pub mod error;
pub mod functions;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use valeris_app::broker::BrokerClient;
use valeris_app::news::NewsClient;
use valeris_core::config::Config;
use valeris_core::db::Database;
use valeris_core::tracker::EventTracker;
use valeris_llm::LlmClient;

pub use error::{ApiError, ApiResult};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub llm: Arc<LlmClient>,
    pub broker: Arc<BrokerClient>,
    pub news: Arc<NewsClient>,
}

impl ServerState {
    /// Broker and news clients are built from `config`.
    pub fn new(config: Config, db: Arc<Database>, llm: LlmClient) -> Self {
        ServerState {
            broker: Arc::new(BrokerClient::from_config(&config)),
            news: Arc::new(NewsClient::from_config(&config)),
            config: Arc::new(config),
            db,
            llm: Arc::new(llm),
        }
    }

    /// Record one usage event for `user_id`. Failures are logged and
    /// otherwise ignored; tracking never fails a request.
    pub fn track(&self, user_id: &str, name: &str, properties: Value) {
        let mut tracker = EventTracker::new(true);
        tracker.identify(user_id);
        tracker.track(name, properties);
        if let Err(e) = tracker.flush(&self.db) {
            warn!("Failed to record {} event: {:#}", name, e);
        }
    }
}

/// Create the axum router.
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(functions::routes())
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------
