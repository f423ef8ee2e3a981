use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Authenticated Router Module
///
/// The record and mission catalogues. Every route here sits behind the
/// session layer added in `create_router`; write handlers additionally take
/// `AuthUser` so the audit log names who made the change.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth/session
        // Name and role of the current session; the client uses it as a login probe.
        .route("/auth/session", get(handlers::session))
        // --- SCP records ---
        .route("/scps", get(handlers::list_scps).post(handlers::create_scp))
        // GET /scps/buscar?numero_scp=
        // Exact lookup by business key. The static segment wins over `{id}`.
        .route("/scps/buscar", get(handlers::search_scp))
        .route(
            "/scps/{id}",
            get(handlers::get_scp)
                .put(handlers::update_scp)
                .delete(handlers::delete_scp),
        )
        // --- Missions ---
        // GET /misiones?nombre=
        // Optional case-insensitive name filter.
        .route(
            "/misiones",
            get(handlers::list_missions).post(handlers::create_mission),
        )
        .route(
            "/misiones/{id}",
            get(handlers::get_mission)
                .put(handlers::update_mission)
                .delete(handlers::delete_mission),
        )
}

