use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Logout lives here so a client with an
/// expired or revoked token can still clear its cookie.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/register
        // Account creation; a matching `adminCode` grants the admin role.
        .route("/auth/register", post(handlers::register))
        // POST /auth/login
        // Opens a session and sets the `scp_session` cookie.
        .route("/auth/login", post(handlers::login))
        // POST /auth/logout
        // Revokes the presented session, if any.
        .route("/auth/logout", post(handlers::logout))
}
