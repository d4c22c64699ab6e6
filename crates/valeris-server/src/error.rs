// HTTP error type shared by every handler.
//
// Each variant maps to one status code; the body is always
// `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use valeris_app::broker::BrokerError;
use valeris_app::news::NewsError;
use valeris_core::models::TradeValidationError;
use valeris_journal::export::CsvError;
use valeris_journal::filter::UnknownRange;
use valeris_journal::two_factor::TwoFactorError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A third-party API failed or answered with something unusable.
    #[error("{0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Storage details stay in the log.
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Conversions from domain errors
// ---------------------------------------------------------------------------

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Storage(inner) => ApiError::Internal(inner),
            e @ BrokerError::BaseUrl(_) => ApiError::Internal(anyhow::Error::new(e)),
            e @ BrokerError::Expired => ApiError::Unauthorized(e.to_string()),
            e @ BrokerError::UnknownAction(_) => ApiError::BadRequest(e.to_string()),
            e @ (BrokerError::Http(_) | BrokerError::Status { .. }) => {
                warn!(error = %e, "broker upstream failed");
                ApiError::Upstream(e.to_string())
            }
        }
    }
}

impl From<NewsError> for ApiError {
    fn from(err: NewsError) -> Self {
        warn!(error = %err, "news upstream failed");
        ApiError::Upstream(format!("Failed to fetch market news: {err}"))
    }
}

impl From<TwoFactorError> for ApiError {
    fn from(err: TwoFactorError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<TradeValidationError> for ApiError {
    fn from(err: TradeValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<UnknownRange> for ApiError {
    fn from(err: UnknownRange) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CsvError> for ApiError {
    fn from(err: CsvError) -> Self {
        ApiError::Internal(anyhow::Error::new(err).context("failed to render CSV"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
