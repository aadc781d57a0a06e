/// Error Handling Module
///
/// This module provides a unified error handling system for the service.
/// It covers:
/// 1. Domain-Specific Error Types (validation, storage, auth, configuration)
/// 2. The unified `AppError` used for control flow
/// 3. HTTP response mapping, logged once per failed request

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for request payloads
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooLong(String, usize),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
        }
    }
}

impl StdError for ValidationError {}

/// Storage layer errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    /// Pool exhausted, connection refused, I/O failure. Safe to retry.
    Unavailable(String),
    QueryExecution(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
///
/// All of these are fatal: they are raised while the process starts and
/// never per request.
#[derive(Debug)]
pub enum ConfigError {
    /// The JWT signing key or token lifetimes are unusable
    Signing(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Signing(msg) => write!(f, "Signing configuration error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication errors
///
/// The first five variants are the refresh-rotation failures. They are
/// distinguished internally for logging and tests, but every one of them
/// is reported to the client with the same generic rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MalformedToken,
    TokenNotExpired,
    UnknownRefreshToken,
    TokenAlreadyRotated,
    RefreshTokenExpired,
    InvalidCredentials,
    MissingToken,
    TokenInvalid,
}

impl AuthError {
    /// Stable machine-readable reason, used as a log field
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "malformed_token",
            AuthError::TokenNotExpired => "token_not_expired",
            AuthError::UnknownRefreshToken => "unknown_refresh_token",
            AuthError::TokenAlreadyRotated => "token_already_rotated",
            AuthError::RefreshTokenExpired => "refresh_token_expired",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::MissingToken => "missing_token",
            AuthError::TokenInvalid => "token_invalid",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MalformedToken => write!(f, "Access token could not be decoded"),
            AuthError::TokenNotExpired => write!(f, "Access token has not expired yet"),
            AuthError::UnknownRefreshToken => write!(f, "Refresh token not found for subject"),
            AuthError::TokenAlreadyRotated => write!(f, "Refresh token was already rotated"),
            AuthError::RefreshTokenExpired => write!(f, "Refresh token has expired"),
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Auth(AuthError),
    Internal(String),
}

impl AppError {
    /// Whether the caller may retry the same request after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(DatabaseError::Unavailable(_)))
    }

    /// The authentication failure carried by this error, if any
    pub fn auth_error(&self) -> Option<AuthError> {
        match self {
            AppError::Auth(e) => Some(*e),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS (Control Flow Error Conversion)
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => {
                AppError::Database(DatabaseError::Unavailable(err.to_string()))
            }
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("23505") => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db_err.message().to_string(),
                ))
            }
            sqlx::Error::Database(_) => {
                AppError::Database(DatabaseError::QueryExecution(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking (request ID or trace ID)
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR".to_string(),
                e.to_string(),
            ),

            AppError::Database(e) => match e {
                DatabaseError::Unavailable(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE".to_string(),
                    "Storage temporarily unavailable, retry later".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR".to_string(),
                    "Database error occurred".to_string(),
                ),
            },

            // Rotation failures share one response so clients cannot probe
            // which check rejected them.
            AppError::Auth(e) => match e {
                AuthError::MalformedToken
                | AuthError::TokenNotExpired
                | AuthError::UnknownRefreshToken
                | AuthError::TokenAlreadyRotated
                | AuthError::RefreshTokenExpired => (
                    StatusCode::UNAUTHORIZED,
                    "AUTHENTICATION_FAILED".to_string(),
                    "Authentication failed".to_string(),
                ),
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS".to_string(),
                    "Invalid credentials".to_string(),
                ),
                AuthError::TokenInvalid => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID".to_string(),
                    "Invalid or expired token".to_string(),
                ),
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED".to_string(),
                    "Missing authentication token".to_string(),
                ),
            },

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                "Internal server error".to_string(),
            ),
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code,
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %e,
                    "Validation error"
                );
            }
            AppError::Database(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    transient = self.is_transient(),
                    "Database error"
                );
            }
            AppError::Auth(e) => {
                tracing::warn!(
                    request_id = request_id,
                    reason = e.reason(),
                    error = %e,
                    "Authentication error"
                );
            }
            AppError::Internal(msg) => {
                tracing::error!(
                    request_id = request_id,
                    error = %msg,
                    "Internal error"
                );
            }
        }
    }
}

impl AppError {
    /// Log the failure and build its HTTP response under one `request_id`
    ///
    /// Handlers only propagate errors; this is the single place a failed
    /// request is logged, and the logged id is the `error_id` the client sees.
    fn respond(&self, request_id: &str) -> HttpResponse {
        self.log_error(request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, request_id);

        let mut builder = HttpResponse::build(status);
        if self.is_transient() {
            builder.insert_header(("Retry-After", "1"));
        }
        builder.json(error_response)
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.respond(&uuid::Uuid::new_v4().to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(DatabaseError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
