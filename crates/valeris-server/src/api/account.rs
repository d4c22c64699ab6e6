// Account routes: profile, notifications, preferences and two-factor
// enrollment.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use valeris_core::models::{Notification, Profile, Role};
use valeris_journal::two_factor::{self, Enrollment, TwoFactorError};

use crate::auth::UserId;
use crate::error::{ApiError, ApiResult};
use crate::ServerState;

/// Issuer shown in authenticator apps.
pub const TOTP_ISSUER: &str = "Valeris";

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/api/profile", get(get_profile).put(put_profile))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/{id}/read", post(mark_read))
        .route("/api/preferences", get(get_preferences).put(put_preferences))
        .route("/api/2fa/enroll", post(enroll_two_factor))
        .route("/api/2fa/verify", post(verify_two_factor))
}

fn preferences_key(user_id: &str) -> String {
    format!("preferences:{user_id}")
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

async fn get_profile(State(state): State<ServerState>, user: UserId) -> ApiResult<Json<Profile>> {
    state
        .db
        .get_profile(user.as_str())?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("profile".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ProfileInput {
    pub email: String,
    pub display_name: String,
}

/// Create or rename the caller's profile. Role and signup time are kept
/// for an existing profile; new profiles are traders.
async fn put_profile(
    State(state): State<ServerState>,
    user: UserId,
    Json(input): Json<ProfileInput>,
) -> ApiResult<Json<Profile>> {
    let email = input.email.trim();
    let display_name = input.display_name.trim();
    if email.is_empty() || display_name.is_empty() {
        return Err(ApiError::BadRequest(
            "email and display_name are required".to_string(),
        ));
    }

    let now = Utc::now();
    let profile = match state.db.get_profile(user.as_str())? {
        Some(existing) => Profile {
            email: email.to_string(),
            display_name: display_name.to_string(),
            last_seen_at: Some(now),
            ..existing
        },
        None => Profile {
            id: user.as_str().to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role: Role::Trader,
            created_at: now,
            two_factor_enabled: false,
            last_seen_at: Some(now),
        },
    };
    state.db.upsert_profile(&profile)?;
    Ok(Json(profile))
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

async fn list_notifications(
    State(state): State<ServerState>,
    user: UserId,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.db.list_notifications(user.as_str(), query.unread)?))
}

async fn mark_read(
    State(state): State<ServerState>,
    user: UserId,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.db.mark_notification_read(user.as_str(), &id)? {
        return Err(ApiError::NotFound(format!("notification {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Free-form UI preferences; `{}` until first saved.
async fn get_preferences(State(state): State<ServerState>, user: UserId) -> ApiResult<Json<Value>> {
    let stored = state.db.load_setting(&preferences_key(user.as_str()))?;
    Ok(Json(stored.unwrap_or_else(|| json!({}))))
}

async fn put_preferences(
    State(state): State<ServerState>,
    user: UserId,
    Json(preferences): Json<Value>,
) -> ApiResult<Json<Value>> {
    if !preferences.is_object() {
        return Err(ApiError::BadRequest(
            "preferences must be a JSON object".to_string(),
        ));
    }
    state
        .db
        .save_setting(&preferences_key(user.as_str()), &preferences)?;
    Ok(Json(preferences))
}

// ---------------------------------------------------------------------------
// Two-factor
// ---------------------------------------------------------------------------

/// Generate a secret and backup codes. Two-factor stays off until the
/// first code is verified.
async fn enroll_two_factor(
    State(state): State<ServerState>,
    user: UserId,
) -> ApiResult<Json<Enrollment>> {
    let profile = state
        .db
        .get_profile(user.as_str())?
        .ok_or_else(|| ApiError::NotFound("profile".to_string()))?;
    if profile.two_factor_enabled {
        return Err(ApiError::BadRequest(
            "two-factor is already enabled".to_string(),
        ));
    }

    let enrollment = two_factor::enroll(&profile.email, TOTP_ISSUER)
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;
    state.db.set_two_factor(
        user.as_str(),
        false,
        Some(&enrollment.secret),
        &enrollment.backup_codes,
    )?;
    info!(user = %user.as_str(), "Two-factor enrollment started");
    Ok(Json(enrollment))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct VerifyReply {
    pub verified: bool,
    /// `totp` or `backup_code`.
    pub method: &'static str,
}

/// A valid authenticator code verifies (and, on first use, enables)
/// two-factor. Once enabled, an unused backup code is accepted instead and
/// then burned.
async fn verify_two_factor(
    State(state): State<ServerState>,
    user: UserId,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<VerifyReply>> {
    let secret = state
        .db
        .two_factor_secret(user.as_str())?
        .ok_or_else(|| ApiError::BadRequest("two-factor is not enrolled".to_string()))?;
    let now = Utc::now().timestamp().max(0) as u64;

    match two_factor::verify(&secret, &request.code, now) {
        Ok(true) => {
            state.db.enable_two_factor(user.as_str())?;
            state.track(user.as_str(), "two_factor_verified", json!({ "method": "totp" }));
            Ok(Json(VerifyReply {
                verified: true,
                method: "totp",
            }))
        }
        Ok(false) => Err(invalid_code()),
        Err(TwoFactorError::MalformedCode) => {
            let enabled = state
                .db
                .get_profile(user.as_str())?
                .is_some_and(|p| p.two_factor_enabled);
            if !enabled {
                return Err(TwoFactorError::MalformedCode.into());
            }
            if !state.db.consume_backup_code(user.as_str(), &request.code)? {
                return Err(invalid_code());
            }
            state.track(
                user.as_str(),
                "two_factor_verified",
                json!({ "method": "backup_code" }),
            );
            Ok(Json(VerifyReply {
                verified: true,
                method: "backup_code",
            }))
        }
        Err(e) => Err(ApiError::Internal(
            anyhow::Error::new(e).context("stored two-factor secret is unreadable"),
        )),
    }
}

fn invalid_code() -> ApiError {
    ApiError::Unauthorized("invalid two-factor code".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::{json, Value};

    use valeris_core::models::Notification;
    use valeris_journal::two_factor;

    use crate::testing::{send, state};
    use crate::ServerState;

    async fn create_profile(state: &ServerState, user: &str) {
        let (status, _) = send(
            state,
            "PUT",
            "/api/profile",
            Some(user),
            Some(json!({ "email": format!("{user}@example.com"), "display_name": user })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    fn current_code(secret: &str) -> String {
        two_factor::totp(secret, Utc::now().timestamp() as u64).unwrap()
    }

    #[tokio::test]
    async fn profile_put_then_get() {
        let state = state();
        let (status, _) = send(&state, "GET", "/api/profile", Some("u1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        create_profile(&state, "u1").await;
        let (status, body) = send(&state, "GET", "/api/profile", Some("u1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "u1@example.com");
        assert_eq!(body["role"], "trader");

        let (status, _) = send(
            &state,
            "PUT",
            "/api/profile",
            Some("u1"),
            Some(json!({ "email": " ", "display_name": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn notifications_list_and_mark_read() {
        let state = state();
        for (id, user) in [("n1", "u1"), ("n2", "u1"), ("n3", "u2")] {
            state
                .db
                .insert_notification(&Notification {
                    id: id.into(),
                    user_id: user.into(),
                    kind: "system".into(),
                    message: format!("note {id}"),
                    read: false,
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        let (status, body) = send(&state, "GET", "/api/notifications", Some("u1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, _) =
            send(&state, "POST", "/api/notifications/n1/read", Some("u1"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) =
            send(&state, "POST", "/api/notifications/n3/read", Some("u1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) =
            send(&state, "GET", "/api/notifications?unread=true", Some("u1"), None).await;
        let unread = body.as_array().unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0]["id"], "n2");
    }

    #[tokio::test]
    async fn preferences_round_trip_per_user() {
        let state = state();
        let (_, body) = send(&state, "GET", "/api/preferences", Some("u1"), None).await;
        assert_eq!(body, json!({}));

        let prefs = json!({ "default_range": "7d", "theme": "dark" });
        let (status, _) =
            send(&state, "PUT", "/api/preferences", Some("u1"), Some(prefs.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&state, "GET", "/api/preferences", Some("u1"), None).await;
        assert_eq!(body, prefs);
        let (_, body) = send(&state, "GET", "/api/preferences", Some("u2"), None).await;
        assert_eq!(body, json!({}));

        let (status, _) =
            send(&state, "PUT", "/api/preferences", Some("u1"), Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn enroll_requires_profile() {
        let state = state();
        let (status, _) = send(&state, "POST", "/api/2fa/enroll", Some("u1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn enroll_then_verify_enables_two_factor() {
        let state = state();
        create_profile(&state, "u1").await;

        let (status, enrollment) = send(&state, "POST", "/api/2fa/enroll", Some("u1"), None).await;
        assert_eq!(status, StatusCode::OK);
        let secret = enrollment["secret"].as_str().unwrap().to_string();
        assert!(enrollment["uri"].as_str().unwrap().starts_with("otpauth://totp/"));
        assert_eq!(enrollment["backup_codes"].as_array().unwrap().len(), 10);
        assert!(!state.db.get_profile("u1").unwrap().unwrap().two_factor_enabled);

        // Backup codes do not complete enrollment.
        let backup = enrollment["backup_codes"][0].as_str().unwrap().to_string();
        let (status, _) = send(
            &state,
            "POST",
            "/api/2fa/verify",
            Some("u1"),
            Some(json!({ "code": backup })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &state,
            "POST",
            "/api/2fa/verify",
            Some("u1"),
            Some(json!({ "code": current_code(&secret) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "verified": true, "method": "totp" }));
        assert!(state.db.get_profile("u1").unwrap().unwrap().two_factor_enabled);

        // Re-enrolling while enabled is refused.
        let (status, _) = send(&state, "POST", "/api/2fa/enroll", Some("u1"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Now the backup code works once.
        let verify_backup = |code: String| {
            let state = state.clone();
            async move {
                send(&state, "POST", "/api/2fa/verify", Some("u1"), Some(json!({ "code": code })))
                    .await
            }
        };
        let (status, body) = verify_backup(backup.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "backup_code");
        let (status, _) = verify_backup(backup).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_code_is_unauthorized() {
        let state = state();
        create_profile(&state, "u1").await;
        let (_, enrollment) = send(&state, "POST", "/api/2fa/enroll", Some("u1"), None).await;
        let secret = enrollment["secret"].as_str().unwrap();

        let good = current_code(secret);
        let wrong = format!("{:06}", (good.parse::<u32>().unwrap() + 500_000) % 1_000_000);
        let (status, body) = send(
            &state,
            "POST",
            "/api/2fa/verify",
            Some("u1"),
            Some(json!({ "code": wrong })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid two-factor code");
        assert!(!state.db.get_profile("u1").unwrap().unwrap().two_factor_enabled);
    }

    #[tokio::test]
    async fn verify_without_enrollment_is_bad_request() {
        let state = state();
        create_profile(&state, "u1").await;
        let (status, body): (StatusCode, Value) = send(
            &state,
            "POST",
            "/api/2fa/verify",
            Some("u1"),
            Some(json!({ "code": "123456" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "two-factor is not enrolled");
    }
}
