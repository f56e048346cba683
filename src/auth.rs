// Authentication: anonymous identities, JWT tokens, and the axum extractor.
//
// Identities are anonymous: a session is created without credentials and
// addressed by a bearer JWT from then on. Token verification is
// unconditional on every authenticated route; there is no development-mode
// bypass.

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::db::Identity;
use crate::metrics;

/// JWT secret – in production this should come from an env var.
fn jwt_secret() -> Vec<u8> {
    std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "fightclub-dev-secret-change-in-production".to_string())
        .into_bytes()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: i64,   // identity id
    pub exp: usize, // expiry (unix timestamp)
}

pub fn create_token(identity_id: i64) -> Result<String, String> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: identity_id,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&jwt_secret()),
    )
    .map_err(|e| format!("Failed to create token: {e}"))
}

pub fn verify_token(token: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&jwt_secret()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {e}"))
}

// ── Axum extractor: AuthUser ─────────────────────────────────────────

/// Extracts the authenticated identity from the Authorization header.
/// Usage: `AuthUser(claims)` in handler parameters.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"error": "Missing Authorization header"})),
                )
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Invalid Authorization header format"})),
            )
        })?;

        match verify_token(token) {
            Ok(claims) => Ok(AuthUser(claims)),
            Err(_) => Err((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Invalid token"})),
            )),
        }
    }
}

// ── Auth API handlers ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub identity: IdentityPublic,
}

#[derive(Serialize)]
pub struct IdentityPublic {
    pub id: i64,
    pub city_name: Option<String>,
    pub display_name: Option<String>,
    pub score: i64,
    pub status: String,
    pub created_at: String,
}

impl From<Identity> for IdentityPublic {
    fn from(identity: Identity) -> Self {
        IdentityPublic {
            id: identity.id,
            city_name: identity.city_name,
            display_name: identity.display_name,
            score: identity.score,
            status: identity.status,
            created_at: identity.created_at,
        }
    }
}

/// POST /api/auth/anonymous – create a fresh identity and issue a token.
pub async fn anonymous(State(state): State<AppState>) -> impl IntoResponse {
    let identity = match state.db.create_identity().await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::error!("DB error creating identity: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Internal error"})),
            )
                .into_response();
        }
    };

    let token = match create_token(identity.id) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Token creation error: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Internal error"})),
            )
                .into_response();
        }
    };

    metrics::IDENTITIES_CREATED_TOTAL.inc();
    (
        StatusCode::CREATED,
        Json(serde_json::json!(AuthResponse {
            token,
            identity: identity.into(),
        })),
    )
        .into_response()
}

/// GET /api/auth/me – current identity.
pub async fn me(AuthUser(claims): AuthUser, State(state): State<AppState>) -> impl IntoResponse {
    match state.db.get_identity(claims.sub).await {
        Ok(Some(identity)) => (
            StatusCode::OK,
            Json(serde_json::json!(IdentityPublic::from(identity))),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Identity not found"})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("DB error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Internal error"})),
            )
                .into_response()
        }
    }
}
