use axum::{
    Json, Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod sanitizer;
pub mod session;

// Routing split by access level (public, authenticated, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use session::{MemorySessionStore, SessionState};

/// ApiDoc
///
/// OpenAPI document for every handler and body schema, served as JSON at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_scps, handlers::create_scp, handlers::search_scp,
        handlers::get_scp, handlers::update_scp, handlers::delete_scp,
        handlers::list_missions, handlers::create_mission, handlers::get_mission,
        handlers::update_mission, handlers::delete_mission,
        handlers::register, handlers::login, handlers::logout, handlers::session,
        handlers::list_users, handlers::update_user_role, handlers::delete_user
    ),
    components(
        schemas(
            models::Scp, models::ScpPayload, models::Mission, models::MissionPayload,
            models::MissionInfo, models::Role, models::UserSummary, models::RegisterRequest,
            models::LoginRequest, models::SessionInfo, models::UpdateRoleRequest,
        )
    ),
    tags(
        (name = "scp-registry", description = "SCP records and field missions")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Shared, cheaply cloneable container for the services every request needs.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in deployments, in-memory for local runs and tests.
    pub repo: RepositoryState,
    /// Server-side sessions referenced by the signed cookie token.
    pub sessions: SessionState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for the authenticated and admin groups. Extracting `AuthUser` is the
/// whole check: a missing, forged, expired or revoked session is rejected with
/// 401 before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// create_router
///
/// Assembles the routing tree, the session gate, the observability layers and
/// the static file fallback for the browser client.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let static_files = ServeDir::new(&state.config.static_dir);

    let base_router = Router::new()
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .merge(admin::admin_routes())
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        // Anything not matched above is looked up under STATIC_DIR.
        .fallback_service(static_files)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, carrying the `x-request-id` so every log line of the
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
