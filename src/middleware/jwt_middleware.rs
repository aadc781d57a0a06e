/// JWT Authentication Middleware
///
/// Validates JWT tokens from the Authorization header and injects
/// claims into request extensions for use by route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::TokenIssuer;

/// JWT middleware for protecting routes
///
/// Must be applied to routes that require a live identity.
/// Extracts and validates JWT from Authorization header; expired tokens
/// are rejected here and can only be exchanged through `/auth/refresh`.
pub struct JwtMiddleware {
    issuer: Arc<TokenIssuer>,
}

impl JwtMiddleware {
    /// Create new JWT middleware instance
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            issuer: Arc::clone(&self.issuer),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    issuer: Arc<TokenIssuer>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract Authorization header
        let auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        match auth_header {
            None => {
                tracing::warn!("Missing or invalid Authorization header");
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Missing or invalid authorization header",
                    "code": "UNAUTHORIZED"
                }));
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        "Unauthorized",
                        response,
                    )
                    .into())
                })
            }
            Some(token) => {
                match self.issuer.validate_access_token(&token) {
                    Ok(claims) => {
                        // Inject claims into request extensions
                        tracing::debug!(user_id = %claims.sub, "JWT validated successfully");
                        req.extensions_mut().insert(claims);

                        let service = self.service.clone();
                        Box::pin(async move { service.call(req).await })
                    }
                    Err(e) => {
                        tracing::warn!("JWT validation failed: {}", e);
                        let response = HttpResponse::Unauthorized().json(serde_json::json!({
                            "error": "Invalid or expired token",
                            "code": "TOKEN_INVALID"
                        }));
                        Box::pin(async move {
                            Err(actix_web::error::InternalError::from_response(
                                "Invalid token",
                                response,
                            )
                            .into())
                        })
                    }
                }
            }
        }
    }
}
