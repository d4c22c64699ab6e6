// Journal REST API. Every route is scoped to the caller's `x-user-id`.

pub mod account;
pub mod analytics;
pub mod community;
pub mod support;
pub mod trades;

use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use valeris_core::config::Config;
use valeris_core::db::Database;
use valeris_core::models::Trade;
use valeris_journal::filter::{DateRange, TradeFilter};

use crate::error::ApiResult;
use crate::ServerState;

pub fn routes() -> Router<ServerState> {
    Router::new()
        .merge(trades::routes())
        .merge(analytics::routes())
        .merge(account::routes())
        .merge(support::routes())
        .merge(community::routes())
}

/// `?range=` on list, analytics and export routes.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub range: Option<String>,
}

/// Parse a range key, falling back to `journal.default_range`.
pub(crate) fn resolve_range(raw: Option<&str>, config: &Config) -> ApiResult<DateRange> {
    let raw = raw.unwrap_or(&config.journal.default_range);
    Ok(raw.parse::<DateRange>()?)
}

/// The caller's trades inside `range`.
pub(crate) fn trades_in_range(
    db: &Database,
    user_id: &str,
    range: DateRange,
) -> ApiResult<Vec<Trade>> {
    let trades = db.list_trades(user_id)?;
    Ok(TradeFilter::for_range(range).apply(&trades, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::testing::state;

    #[test]
    fn range_defaults_to_config() {
        let state = state();
        assert_eq!(resolve_range(None, &state.config).unwrap(), DateRange::Last30Days);
        assert_eq!(resolve_range(Some("all"), &state.config).unwrap(), DateRange::All);
        assert!(matches!(
            resolve_range(Some("fortnight"), &state.config),
            Err(ApiError::BadRequest(_))
        ));
    }
}
