/// Authentication module
///
/// Handles access token issuance/validation, refresh token records,
/// the rotation protocol, and credential checks at login.

mod claims;
mod credentials;
mod jwt;
mod password;
mod refresh_token;
mod rotation;

pub use claims::{Claims, UserId};
pub use credentials::{CredentialVerifier, PgCredentialVerifier, StaticCredentials};
pub use jwt::{TokenIssuer, TokenPair};
pub use password::{hash_password, verify_password, verify_stored_password};
pub use refresh_token::{
    generate_refresh_token, hash_token, NewRefreshRecord, RecordId, RecordStatus,
    RefreshTokenRecord,
};
pub use rotation::TokenService;
