// HTTP API routes (claim, workouts, commentary, leaderboard, account).

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::{self, AuthUser};
use crate::claim::{self, ClaimError};
use crate::db::{Database, LedgerError};
use crate::metrics;
use crate::rate_limit::{RateLimitError, RateLimitType, RateLimiter};
use crate::scoring;
use crate::tyler::TylerClient;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ClaimCityRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct LogWorkoutRequest {
    pub exercise: String,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight: Option<i64>,
    pub duration: Option<i64>,
}

#[derive(Deserialize)]
pub struct TylerRequest {
    pub event: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub tyler: Arc<TylerClient>,
    pub rate_limiter: RateLimiter,
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: sqlx::Error) -> impl IntoResponse {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn rate_limited(e: RateLimitError) -> impl IntoResponse {
    json_error(StatusCode::TOO_MANY_REQUESTS, &e.to_string())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(db: Arc<Database>, tyler: Arc<TylerClient>, rate_limiter: RateLimiter) -> Router {
    let state = AppState {
        db,
        tyler,
        rate_limiter,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        // Auth
        .route("/api/auth/anonymous", post(auth::anonymous))
        .route("/api/auth/me", get(auth::me))
        // City claim
        .route("/api/city/claim", post(claim_city))
        // Workouts
        .route("/api/workouts", post(log_workout))
        // Commentary
        .route("/api/tyler", post(tyler_event))
        // Leaderboard and feed
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/messages", get(list_messages))
        // Account
        .route("/api/account/delete", post(delete_account))
        .layer(axum::middleware::from_fn(track_requests))
        .with_state(state)
}

/// Record request counts and latency per normalized endpoint.
async fn track_requests(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let start = Instant::now();

    let response = next.run(req).await;

    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(start.elapsed().as_secs_f64());
    response
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "fightclub-backend" }))
}

async fn metrics_text() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics::gather_metrics(),
    )
}

// ── City claim ────────────────────────────────────────────────────────

async fn claim_city(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<ClaimCityRequest>,
) -> impl IntoResponse {
    if let Err(e) = state
        .rate_limiter
        .check_limit(claims.sub, RateLimitType::ClaimAttempts)
    {
        return rate_limited(e).into_response();
    }

    match claim::claim_name(&state.db, claims.sub, &req.name).await {
        Ok(city) => (
            StatusCode::OK,
            Json(json!({ "cityName": city.city_name, "displayName": city.display_name })),
        )
            .into_response(),
        Err(e @ ClaimError::InvalidName) => {
            json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response()
        }
        Err(e @ (ClaimError::NameTaken | ClaimError::AlreadyClaimed)) => {
            json_error(StatusCode::CONFLICT, &e.to_string()).into_response()
        }
        Err(ClaimError::IdentityNotFound) => {
            json_error(StatusCode::NOT_FOUND, "Identity not found").into_response()
        }
        Err(ClaimError::Db(e)) => internal_error(e).into_response(),
    }
}

// ── Workouts ──────────────────────────────────────────────────────────

async fn log_workout(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<LogWorkoutRequest>,
) -> impl IntoResponse {
    if req.exercise.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "exercise is required").into_response();
    }
    if let Err(e) = state
        .rate_limiter
        .check_limit(claims.sub, RateLimitType::WorkoutLogs)
    {
        return rate_limited(e).into_response();
    }

    let identity = match state.db.get_identity(claims.sub).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Identity not found").into_response(),
        Err(e) => return internal_error(e).into_response(),
    };

    let exercise = req.exercise.trim();
    if let Err(e) = state
        .db
        .add_workout(claims.sub, exercise, req.sets, req.reps, req.weight, req.duration)
        .await
    {
        return internal_error(e).into_response();
    }

    let delta = scoring::workout_points(req.weight, req.duration);
    match state.db.award_points(claims.sub, delta).await {
        Ok(()) => {
            metrics::AWARDS_TOTAL.inc();
            metrics::POINTS_AWARDED_TOTAL.inc_by(delta as u64);
        }
        Err(LedgerError::IdentityNotFound) => {
            // The identity was read above; reaching this is a logic error.
            tracing::error!(identity_id = claims.sub, "award target vanished");
            return json_error(StatusCode::NOT_FOUND, "Identity not found").into_response();
        }
        Err(LedgerError::InvalidDelta(d)) => {
            tracing::error!(delta = d, "scoring produced an out-of-range delta");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                .into_response();
        }
        Err(LedgerError::Db(e)) => return internal_error(e).into_response(),
    }

    let city = identity.display_name.as_deref().unwrap_or("Unknown");
    let details = json!({
        "exercise": exercise,
        "sets": req.sets,
        "reps": req.reps,
        "weight": req.weight,
        "duration": req.duration,
    });
    let message = state
        .tyler
        .respond(city, "workout_logged", Some(&details))
        .await;

    let saved = match state
        .db
        .add_message(claims.sub, &message, "workout_logged")
        .await
    {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Failed to persist Tyler message: {e}");
            false
        }
    };

    (
        StatusCode::OK,
        Json(json!({ "message": message, "saved": saved, "pointsAwarded": delta })),
    )
        .into_response()
}

// ── Commentary ────────────────────────────────────────────────────────

async fn tyler_event(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<TylerRequest>,
) -> impl IntoResponse {
    if req.event.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "event is required").into_response();
    }
    if let Err(e) = state
        .rate_limiter
        .check_limit(claims.sub, RateLimitType::CommentaryCalls)
    {
        return rate_limited(e).into_response();
    }

    let identity = match state.db.get_identity(claims.sub).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Identity not found").into_response(),
        Err(e) => return internal_error(e).into_response(),
    };

    let event = req.event.trim();
    let city = identity.display_name.as_deref().unwrap_or("Unknown");
    let message = state.tyler.respond(city, event, req.details.as_ref()).await;

    let saved = match state.db.add_message(claims.sub, &message, event).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Failed to persist Tyler message: {e}");
            false
        }
    };

    (
        StatusCode::OK,
        Json(json!({ "message": message, "saved": saved })),
    )
        .into_response()
}

// ── Leaderboard and feed ──────────────────────────────────────────────

async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(50).clamp(1, 50);
    match state.db.leaderboard(limit).await {
        Ok(rows) => (StatusCode::OK, Json(json!(rows))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn list_messages(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(params): Query<LimitParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    match state.db.list_messages(claims.sub, limit).await {
        Ok(messages) => (StatusCode::OK, Json(json!(messages))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

// ── Account ───────────────────────────────────────────────────────────

/// Marks the identity DELETED. The city claim stays behind, burned.
async fn delete_account(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> impl IntoResponse {
    match state.db.mark_deleted(claims.sub).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "status": "DELETED" })),
        )
            .into_response(),
        Ok(false) => json_error(StatusCode::NOT_FOUND, "Identity not found or already deleted")
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
