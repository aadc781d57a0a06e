/// Token Issuer
///
/// Mints signed access tokens and their companion opaque refresh tokens,
/// and decodes access tokens back into typed claims.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{Claims, UserId};
use crate::auth::refresh_token::generate_refresh_token;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};

const MIN_SECRET_LENGTH: usize = 32;
/// Ten years. Anything longer is a misconfiguration, and keeps expiry
/// arithmetic far from the `DateTime` range limits.
const MAX_TOKEN_LIFETIME_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// A freshly issued access/refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Signs and decodes tokens with a key injected at construction
///
/// Immutable after `new`, so a single instance is shared across all
/// request handlers.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    settings: JwtSettings,
}

impl TokenIssuer {
    /// Build an issuer from JWT settings
    ///
    /// # Errors
    /// Returns `ConfigError::Signing` if:
    /// - the secret is shorter than 32 bytes
    /// - the issuer is empty
    /// - the access token lifetime is not positive
    /// - the refresh token lifetime does not exceed the access token lifetime
    /// - either lifetime is longer than ten years
    pub fn new(settings: JwtSettings) -> Result<Self, ConfigError> {
        if settings.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Signing(format!(
                "secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if settings.issuer.trim().is_empty() {
            return Err(ConfigError::Signing("issuer must not be empty".to_string()));
        }
        if settings.access_token_expiry <= 0 {
            return Err(ConfigError::Signing(
                "access_token_expiry must be positive".to_string(),
            ));
        }
        if settings.refresh_token_expiry <= settings.access_token_expiry {
            return Err(ConfigError::Signing(
                "refresh_token_expiry must be longer than access_token_expiry".to_string(),
            ));
        }
        if settings.refresh_token_expiry > MAX_TOKEN_LIFETIME_SECONDS {
            return Err(ConfigError::Signing(format!(
                "token lifetimes must not exceed {} seconds",
                MAX_TOKEN_LIFETIME_SECONDS
            )));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            settings,
        })
    }

    pub fn settings(&self) -> &JwtSettings {
        &self.settings
    }

    /// Issue a new token pair for `user_id` at the current instant
    pub fn issue_tokens(&self, user_id: UserId) -> Result<TokenPair, AppError> {
        self.issue_tokens_at(user_id, Utc::now())
    }

    /// Issue a new token pair for `user_id` as of `now`
    ///
    /// # Errors
    /// Only if the JWT encoder fails, which does not happen with a key
    /// accepted by `new`.
    pub fn issue_tokens_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<TokenPair, AppError> {
        let claims = Claims::new(
            user_id,
            now,
            self.settings.access_token_expiry,
            self.settings.issuer.clone(),
        );
        let access_expires_at = claims.expires_at();
        let refresh_expires_at = now
            .checked_add_signed(Duration::seconds(self.settings.refresh_token_expiry))
            .ok_or_else(|| AppError::Internal("Refresh token expiry out of range".to_string()))?;
        let access_token = self.sign(&claims)?;

        Ok(TokenPair {
            access_token,
            refresh_token: generate_refresh_token(),
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Sign a claim set into a compact HS256 JWT
    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Decode a token without requiring it to be currently valid
    ///
    /// Expiry is not checked, so an expired access token still yields its
    /// claims. Signature and issuer are checked.
    ///
    /// # Errors
    /// Returns `AuthError::MalformedToken` if the token cannot be parsed or
    /// was not signed by this issuer.
    pub fn decode_unverified(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = self.validation();
        validation.validate_exp = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Failed to decode access token: {}", e);
                AuthError::MalformedToken
            })
    }

    /// Validate a token as proof of a live identity
    ///
    /// # Errors
    /// Returns `AuthError::TokenInvalid` if the token is malformed, tampered
    /// with, issued by someone else, or expired.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_access_token_at(token, Utc::now())
    }

    /// Validate a token as proof of a live identity as of `now`
    ///
    /// Uses the same boundary as rotation: once `exp <= now` the token is no
    /// longer live and becomes eligible for refresh.
    pub fn validate_access_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        let mut validation = self.validation();
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                AuthError::TokenInvalid
            })?;

        if claims.is_expired_at(now) {
            tracing::warn!(user_id = %claims.sub, "JWT validation error: token expired");
            return Err(AuthError::TokenInvalid);
        }

        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.settings.issuer]);
        validation
    }
}
