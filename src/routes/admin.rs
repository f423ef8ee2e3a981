use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, put},
};

/// Admin Router Module
///
/// Account management. Mounted behind the session layer, and each handler
/// extracts `RequireAdmin`, so a plain user gets 403 rather than 401.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /usuarios
        // Every account, without password hashes.
        .route("/usuarios", get(handlers::list_users))
        // PUT /usuarios/{id}/rol
        // Promote or demote an account. Takes effect at its next login.
        .route("/usuarios/{id}/rol", put(handlers::update_user_role))
        .route("/usuarios/{id}", delete(handlers::delete_user))
}
