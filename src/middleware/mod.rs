/// Middleware module
///
/// Guards routes that need a live (non-expired, correctly signed) access token.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
