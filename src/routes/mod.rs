mod auth;
mod health_check;

pub use auth::{login, logout, logout_all, refresh, AuthResponse};
pub use health_check::health_check;
