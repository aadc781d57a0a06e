/// Authentication Routes
///
/// Handles login, token refresh (rotation), and logout.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{Claims, TokenPair};
use crate::error::{AppError, AuthError, ValidationError};
use crate::startup::AppState;

const MAX_FIELD_LENGTH: usize = 4096;

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub expired_token: String,
    pub refresh_token: String,
}

/// Logout request
#[derive(Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

impl From<TokenPair> for AuthResponse {
    fn from(pair: TokenPair) -> Self {
        let now = Utc::now();
        Self {
            expires_in: (pair.access_expires_at - now).num_seconds().max(0),
            refresh_expires_in: (pair.refresh_expires_at - now).num_seconds().max(0),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
        }
    }
}

fn require_field(name: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(name.to_string()));
    }
    if value.len() > MAX_FIELD_LENGTH {
        return Err(ValidationError::TooLong(name.to_string(), MAX_FIELD_LENGTH));
    }
    Ok(())
}

/// POST /auth/login
///
/// Authenticate with username and password.
/// Returns access token and refresh token on success.
///
/// # Errors
/// - 400: Missing or oversized fields
/// - 401: Invalid credentials (unknown user or wrong password)
/// - 503: Storage unavailable, safe to retry
pub async fn login(
    form: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_field("username", &form.username)?;
    require_field("password", &form.password)?;

    let user_id = state
        .credentials
        .verify(&form.username, &form.password)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let pair = state.tokens.login_and_issue(user_id).await?;

    tracing::info!(user_id = %user_id, "User logged in successfully");

    Ok(HttpResponse::Ok().json(AuthResponse::from(pair)))
}

/// POST /auth/refresh
///
/// Exchange an expired access token plus its refresh token for a new pair.
/// The presented refresh token is retired; presenting it again fails.
///
/// # Errors
/// - 400: Missing or oversized fields
/// - 401: Any rotation failure. The response is the same for all of them;
///   the specific reason is only logged.
/// - 503: Storage unavailable, safe to retry
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_field("expired_token", &form.expired_token)?;
    require_field("refresh_token", &form.refresh_token)?;

    let pair = state
        .tokens
        .rotate(&form.expired_token, &form.refresh_token)
        .await?;

    tracing::info!("Token refreshed successfully");

    Ok(HttpResponse::Ok().json(AuthResponse::from(pair)))
}

/// POST /api/logout
///
/// Retire one session. **Requires valid JWT access token.**
///
/// # Errors
/// - 401: Missing or invalid access token (middleware), or unknown refresh token
pub async fn logout(
    claims: web::ReqData<Claims>,
    form: web::Json<LogoutRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_field("refresh_token", &form.refresh_token)?;

    state.tokens.logout(claims.sub, &form.refresh_token).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/logout-all
///
/// Retire every session of the authenticated user.
pub async fn logout_all(
    claims: web::ReqData<Claims>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let revoked = state.tokens.logout_all(claims.sub).await?;

    tracing::info!(user_id = %claims.sub, revoked = revoked, "All sessions logged out");

    Ok(HttpResponse::NoContent().finish())
}
