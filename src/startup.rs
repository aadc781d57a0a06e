use actix_web::{middleware::Logger, web, App, HttpServer};
use actix_web::dev::Server;
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{CredentialVerifier, PgCredentialVerifier, TokenIssuer, TokenService};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, logout, logout_all, refresh};
use crate::store::PgRefreshTokenStore;

/// Shared state handed to every request handler
pub struct AppState {
    pub tokens: TokenService,
    pub credentials: Arc<dyn CredentialVerifier>,
}

impl AppState {
    pub fn new(tokens: TokenService, credentials: Arc<dyn CredentialVerifier>) -> Self {
        Self { tokens, credentials }
    }

    /// State backed by Postgres for both refresh records and user lookups
    pub fn postgres(issuer: Arc<TokenIssuer>, pool: PgPool) -> Self {
        let store = Arc::new(PgRefreshTokenStore::new(pool.clone()));
        Self {
            tokens: TokenService::new(issuer, store),
            credentials: Arc::new(PgCredentialVerifier::new(pool)),
        }
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let issuer = Arc::clone(state.tokens.issuer());
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())      // Standard logging
            .wrap(LoggerMiddleware)       // Custom logging

            // Shared state
            .app_data(state.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))

            // Protected routes (require a live JWT)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(issuer.clone()))
                    .route("/logout", web::post().to(logout))
                    .route("/logout-all", web::post().to(logout_all))
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
