// Support tickets and the admin dashboard.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use valeris_core::models::{Notification, Profile, SupportTicket, TicketPriority, TicketStatus};
use valeris_journal::admin::{signups_per_day, AdminMetrics, DailyCount};

use crate::auth::{require_admin, UserId};
use crate::error::{ApiError, ApiResult};
use crate::ServerState;

/// Days of signup history on the admin dashboard.
pub const SIGNUP_DAYS: u32 = 30;

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/api/support-tickets", get(my_tickets).post(open_ticket))
        .route("/api/admin/metrics", get(admin_metrics))
        .route("/api/admin/users", get(admin_users))
        .route("/api/admin/tickets", get(admin_tickets))
        .route("/api/admin/tickets/{id}/status", post(set_ticket_status))
}

#[derive(Debug, Deserialize)]
pub struct TicketInput {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
}

async fn open_ticket(
    State(state): State<ServerState>,
    user: UserId,
    Json(input): Json<TicketInput>,
) -> ApiResult<(StatusCode, Json<SupportTicket>)> {
    let subject = input.subject.trim();
    let body = input.body.trim();
    if subject.is_empty() || body.is_empty() {
        return Err(ApiError::BadRequest(
            "subject and body are required".to_string(),
        ));
    }

    let now = Utc::now();
    let ticket = SupportTicket {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.as_str().to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        status: TicketStatus::Open,
        priority: input.priority.unwrap_or(TicketPriority::Normal),
        created_at: now,
        updated_at: now,
        resolved_at: None,
    };
    state.db.insert_ticket(&ticket)?;
    state.track(
        user.as_str(),
        "ticket_opened",
        json!({ "priority": ticket.priority.as_str() }),
    );
    info!(user = %user.as_str(), ticket = %ticket.id, "Support ticket opened");
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn my_tickets(
    State(state): State<ServerState>,
    user: UserId,
) -> ApiResult<Json<Vec<SupportTicket>>> {
    Ok(Json(state.db.list_tickets(Some(user.as_str()))?))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct MetricsReply {
    pub metrics: AdminMetrics,
    pub signups: Vec<DailyCount>,
}

async fn admin_metrics(
    State(state): State<ServerState>,
    user: UserId,
) -> ApiResult<Json<MetricsReply>> {
    require_admin(&state.db, &user)?;
    let now = Utc::now();
    let profiles = state.db.list_profiles()?;
    let subscriptions = state.db.list_subscriptions()?;
    let tickets = state.db.list_tickets(None)?;
    Ok(Json(MetricsReply {
        metrics: AdminMetrics::compute(&profiles, &subscriptions, &tickets, now),
        signups: signups_per_day(&profiles, SIGNUP_DAYS, now),
    }))
}

async fn admin_users(State(state): State<ServerState>, user: UserId) -> ApiResult<Json<Vec<Profile>>> {
    require_admin(&state.db, &user)?;
    Ok(Json(state.db.list_profiles()?))
}

async fn admin_tickets(
    State(state): State<ServerState>,
    user: UserId,
) -> ApiResult<Json<Vec<SupportTicket>>> {
    require_admin(&state.db, &user)?;
    Ok(Json(state.db.list_tickets(None)?))
}

#[derive(Debug, Deserialize)]
pub struct StatusInput {
    pub status: TicketStatus,
}

/// Move a ticket through its workflow and notify the ticket's owner.
async fn set_ticket_status(
    State(state): State<ServerState>,
    user: UserId,
    Path(id): Path<String>,
    Json(input): Json<StatusInput>,
) -> ApiResult<StatusCode> {
    require_admin(&state.db, &user)?;
    let ticket = state
        .db
        .list_tickets(None)?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("ticket {id}")))?;

    let now = Utc::now();
    if !state.db.update_ticket_status(&id, input.status, now)? {
        return Err(ApiError::BadRequest(format!(
            "ticket cannot move from {} to {}",
            ticket.status, input.status
        )));
    }

    state.db.insert_notification(&Notification {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: ticket.user_id.clone(),
        kind: "support".to_string(),
        message: format!("Your ticket \"{}\" is now {}", ticket.subject, input.status),
        read: false,
        created_at: now,
    })?;
    info!(ticket = %id, from = %ticket.status, to = %input.status, "Ticket status changed");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
