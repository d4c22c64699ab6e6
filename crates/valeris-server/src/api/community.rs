// Education and community: leaderboard, quizzes, mentor sessions.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use valeris_core::models::{MentorSession, Profile, QuizAttempt, Role, SessionStatus};
use valeris_journal::leaderboard::{rank, LeaderboardEntry};
use valeris_journal::quiz::{best_scores, course_progress, QuizResult};

use crate::auth::UserId;
use crate::error::{ApiError, ApiResult};
use crate::ServerState;

pub const DEFAULT_MIN_TRADES: usize = 5;

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/quiz-attempts", get(list_attempts).post(record_attempt))
        .route("/api/mentors", get(list_mentors))
        .route("/api/mentor-sessions", get(list_sessions).post(book_session))
        .route("/api/mentor-sessions/{id}/status", post(set_session_status))
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub min_trades: Option<usize>,
}

async fn leaderboard(
    State(state): State<ServerState>,
    _user: UserId,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let mut entries = Vec::new();
    for profile in state.db.list_profiles()? {
        let trades = state.db.list_trades(&profile.id)?;
        entries.push(LeaderboardEntry::summarize(
            &profile.id,
            &profile.display_name,
            &trades,
        ));
    }
    let min_trades = query.min_trades.unwrap_or(DEFAULT_MIN_TRADES);
    Ok(Json(rank(entries, min_trades)))
}

// ---------------------------------------------------------------------------
// Quizzes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AttemptInput {
    pub quiz_id: String,
    pub correct: u32,
    pub total: u32,
}

#[derive(Debug, Serialize)]
pub struct AttemptReply {
    pub attempt: QuizAttempt,
    pub result: QuizResult,
}

async fn record_attempt(
    State(state): State<ServerState>,
    user: UserId,
    Json(input): Json<AttemptInput>,
) -> ApiResult<(StatusCode, Json<AttemptReply>)> {
    let quiz_id = input.quiz_id.trim();
    if quiz_id.is_empty() {
        return Err(ApiError::BadRequest("quiz_id is required".to_string()));
    }
    if input.total == 0 || input.correct > input.total {
        return Err(ApiError::BadRequest(
            "correct must be between 0 and a non-zero total".to_string(),
        ));
    }

    let attempt = QuizAttempt {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.as_str().to_string(),
        quiz_id: quiz_id.to_string(),
        correct: input.correct,
        total: input.total,
        completed_at: Utc::now(),
    };
    state.db.insert_quiz_attempt(&attempt)?;
    let result = QuizResult::from(&attempt);
    state.track(
        user.as_str(),
        "quiz_completed",
        json!({ "quiz_id": attempt.quiz_id, "passed": result.passed }),
    );
    Ok((StatusCode::CREATED, Json(AttemptReply { attempt, result })))
}

#[derive(Debug, Default, Deserialize)]
pub struct AttemptsQuery {
    /// Comma-separated quiz ids making up a course.
    #[serde(default)]
    pub course: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttemptsReply {
    pub attempts: Vec<QuizAttempt>,
    pub best: BTreeMap<String, QuizResult>,
    /// Fraction of the course's quizzes passed; present when `course` was
    /// given.
    pub progress: Option<f64>,
}

async fn list_attempts(
    State(state): State<ServerState>,
    user: UserId,
    Query(query): Query<AttemptsQuery>,
) -> ApiResult<Json<AttemptsReply>> {
    let attempts = state.db.list_quiz_attempts(user.as_str())?;
    let progress = query.course.as_deref().map(|course| {
        let ids: Vec<&str> = course
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        course_progress(&attempts, &ids)
    });
    Ok(Json(AttemptsReply {
        best: best_scores(&attempts),
        attempts,
        progress,
    }))
}

// ---------------------------------------------------------------------------
// Mentor sessions
// ---------------------------------------------------------------------------

async fn list_mentors(State(state): State<ServerState>, _user: UserId) -> ApiResult<Json<Vec<Profile>>> {
    let mentors = state
        .db
        .list_profiles()?
        .into_iter()
        .filter(|p| p.role == Role::Mentor)
        .collect();
    Ok(Json(mentors))
}

#[derive(Debug, Deserialize)]
pub struct BookingInput {
    pub mentor_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub topic: String,
}

async fn book_session(
    State(state): State<ServerState>,
    user: UserId,
    Json(input): Json<BookingInput>,
) -> ApiResult<(StatusCode, Json<MentorSession>)> {
    if input.duration_minutes == 0 {
        return Err(ApiError::BadRequest(
            "duration_minutes must be greater than zero".to_string(),
        ));
    }
    if input.scheduled_at <= Utc::now() {
        return Err(ApiError::BadRequest(
            "sessions must be booked in the future".to_string(),
        ));
    }
    let is_mentor = state
        .db
        .get_profile(&input.mentor_id)?
        .is_some_and(|p| p.role == Role::Mentor);
    if !is_mentor {
        return Err(ApiError::BadRequest(format!(
            "unknown mentor {}",
            input.mentor_id
        )));
    }

    let session = MentorSession {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.as_str().to_string(),
        mentor_id: input.mentor_id,
        scheduled_at: input.scheduled_at,
        duration_minutes: input.duration_minutes,
        status: SessionStatus::Booked,
        topic: input.topic.trim().to_string(),
    };
    state.db.insert_mentor_session(&session)?;
    state.track(
        user.as_str(),
        "session_booked",
        json!({ "mentor_id": session.mentor_id }),
    );
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(state): State<ServerState>,
    user: UserId,
) -> ApiResult<Json<Vec<MentorSession>>> {
    Ok(Json(state.db.list_mentor_sessions(user.as_str())?))
}

#[derive(Debug, Deserialize)]
pub struct SessionStatusInput {
    pub status: SessionStatus,
}

async fn set_session_status(
    State(state): State<ServerState>,
    user: UserId,
    Path(id): Path<String>,
    Json(input): Json<SessionStatusInput>,
) -> ApiResult<StatusCode> {
    if !state
        .db
        .update_session_status(user.as_str(), &id, input.status)?
    {
        return Err(ApiError::NotFound(format!("mentor session {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
