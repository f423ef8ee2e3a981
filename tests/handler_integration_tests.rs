use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use scp_registry::{
    AppState,
    auth::{self, AuthUser},
    config::{AppConfig, LOCAL_ADMIN_CODE},
    error::RepoError,
    extract::JsonOrForm,
    handlers,
    models::{
        LoginRequest, Mission, MissionFilter, MissionInfo, MissionInput, MissionPayload, NewUser,
        RegisterRequest, Role, Scp, ScpInput, ScpLookup, ScpPayload, UpdateRoleRequest, User,
        UserSummary,
    },
    repository::{InMemoryRepository, RepoResult, Repository, RepositoryState},
    session::MemorySessionStore,
};
use std::sync::Arc;
use uuid::Uuid;

// --- Test scaffolding ---

fn state_with(repo: RepositoryState) -> AppState {
    AppState {
        repo,
        sessions: Arc::new(MemorySessionStore::new()),
        config: AppConfig::default(),
    }
}

fn test_state() -> AppState {
    state_with(Arc::new(InMemoryRepository::new()))
}

fn agent(rol: Role) -> AuthUser {
    AuthUser {
        session_id: Uuid::new_v4(),
        nombre: "agente".to_string(),
        rol,
    }
}

fn scp(numero: &str) -> ScpPayload {
    ScpPayload {
        numero_scp: Some(numero.to_string()),
        clasificacion_contencion: Some("Euclid".to_string()),
        nivel_peligro: Some("Alto".to_string()),
        ubicacion_actual: Some("Sitio-19".to_string()),
        estado_investigacion: Some("Activa".to_string()),
        descripcion: Some("Escultura de hormigón".to_string()),
    }
}

fn mission(nombre: &str, fecha: &str) -> MissionPayload {
    MissionPayload {
        nombre: Some(nombre.to_string()),
        fecha: Some(fecha.to_string()),
        estado: Some("Planificada".to_string()),
        ..MissionPayload::default()
    }
}

async fn register(state: &AppState, nombre: &str, contrasena: &str, admin_code: Option<&str>) {
    handlers::register(
        State(state.clone()),
        JsonOrForm(RegisterRequest {
            nombre: Some(nombre.to_string()),
            contrasena: Some(contrasena.to_string()),
            admin_code: admin_code.map(str::to_string),
        }),
    )
    .await
    .unwrap();
}

// --- SCP handlers ---

#[tokio::test]
async fn test_create_then_list_and_get_scp() {
    let state = test_state();
    let msg = handlers::create_scp(
        agent(Role::User),
        State(state.clone()),
        JsonOrForm(scp("SCP-173")),
    )
    .await
    .unwrap();
    assert_eq!(msg, "SCP creado con éxito.");

    let list = handlers::list_scps(State(state.clone())).await.unwrap().0;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].numero_scp, "SCP-173");

    let one = handlers::get_scp(State(state), Path(list[0].id)).await.unwrap().0;
    assert_eq!(one, list[0]);
}

#[tokio::test]
async fn test_create_scp_duplicate_numero_is_conflict() {
    let state = test_state();
    handlers::create_scp(agent(Role::User), State(state.clone()), JsonOrForm(scp("SCP-049")))
        .await
        .unwrap();

    let err = handlers::create_scp(agent(Role::User), State(state), JsonOrForm(scp("SCP-049")))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(err.to_string(), "Ya existe un SCP con ese número.");
}

#[tokio::test]
async fn test_create_scp_with_markup_stores_nothing() {
    let state = test_state();
    let mut payload = scp("SCP-682");
    payload.descripcion = Some("<script>alert(1)</script>".to_string());

    let err = handlers::create_scp(agent(Role::User), State(state.clone()), JsonOrForm(payload))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    let list = handlers::list_scps(State(state)).await.unwrap().0;
    assert!(list.is_empty());
}

#[tokio::test]
async fn test_search_scp_by_numero() {
    let state = test_state();
    handlers::create_scp(agent(Role::User), State(state.clone()), JsonOrForm(scp("SCP-096")))
        .await
        .unwrap();

    let found = handlers::search_scp(
        State(state.clone()),
        Query(ScpLookup {
            numero_scp: Some("SCP-096".to_string()),
        }),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(found.numero_scp, "SCP-096");

    let missing = handlers::search_scp(
        State(state.clone()),
        Query(ScpLookup {
            numero_scp: Some("SCP-999".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.to_string(), "No se encontró el SCP con ese número.");

    let absent = handlers::search_scp(State(state), Query(ScpLookup { numero_scp: None }))
        .await
        .unwrap_err();
    assert_eq!(absent.status(), StatusCode::BAD_REQUEST);
    assert_eq!(absent.to_string(), "Falta el parámetro numero_scp en la URL.");
}

#[tokio::test]
async fn test_update_scp_replaces_every_field() {
    let state = test_state();
    handlers::create_scp(agent(Role::User), State(state.clone()), JsonOrForm(scp("SCP-173")))
        .await
        .unwrap();
    let id = handlers::list_scps(State(state.clone())).await.unwrap().0[0].id;

    let replacement = ScpPayload {
        numero_scp: Some("SCP-173".to_string()),
        descripcion: Some("Reclasificado".to_string()),
        ..ScpPayload::default()
    };
    let msg = handlers::update_scp(
        agent(Role::User),
        State(state.clone()),
        Path(id),
        JsonOrForm(replacement),
    )
    .await
    .unwrap();
    assert_eq!(msg, "SCP actualizado con éxito.");

    let stored = handlers::get_scp(State(state), Path(id)).await.unwrap().0;
    assert_eq!(stored.descripcion, "Reclasificado");
    assert_eq!(stored.clasificacion_contencion, "");
}

#[tokio::test]
async fn test_update_and_delete_unknown_scp_are_not_found() {
    let state = test_state();
    let err = handlers::update_scp(
        agent(Role::User),
        State(state.clone()),
        Path(42),
        JsonOrForm(scp("SCP-001")),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert_eq!(err.to_string(), "No se encontró el SCP a actualizar.");

    let err = handlers::delete_scp(agent(Role::User), State(state.clone()), Path(42))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No se encontró el SCP a eliminar.");

    let err = handlers::get_scp(State(state), Path(42)).await.unwrap_err();
    assert_eq!(err.to_string(), "No se encontró el SCP con ese ID.");
}

#[tokio::test]
async fn test_delete_scp_removes_it() {
    let state = test_state();
    handlers::create_scp(agent(Role::User), State(state.clone()), JsonOrForm(scp("SCP-999")))
        .await
        .unwrap();
    let id = handlers::list_scps(State(state.clone())).await.unwrap().0[0].id;

    let msg = handlers::delete_scp(agent(Role::User), State(state.clone()), Path(id))
        .await
        .unwrap();
    assert_eq!(msg, "SCP eliminado con éxito.");
    assert!(handlers::get_scp(State(state), Path(id)).await.is_err());
}

// --- Mission handlers ---

#[tokio::test]
async fn test_missions_are_listed_by_date_and_filtered_by_name() {
    let state = test_state();
    for (nombre, fecha) in [
        ("Operación Halcón", "2024-06-01"),
        ("Patrulla nocturna", "2024-01-15"),
        ("HALCÓN II", "2024-03-10"),
    ] {
        handlers::create_mission(
            agent(Role::User),
            State(state.clone()),
            JsonOrForm(mission(nombre, fecha)),
        )
        .await
        .unwrap();
    }

    let all = handlers::list_missions(State(state.clone()), Query(MissionFilter::default()))
        .await
        .unwrap()
        .0;
    let names: Vec<&str> = all.iter().map(|m| m.nombre.as_str()).collect();
    assert_eq!(names, ["Patrulla nocturna", "HALCÓN II", "Operación Halcón"]);

    let filtered = handlers::list_missions(
        State(state),
        Query(MissionFilter {
            nombre: Some("halc".to_string()),
        }),
    )
    .await
    .unwrap()
    .0;
    // Case folding covers accented capitals too.
    assert_eq!(filtered.len(), 2);
}

#[tokio::test]
async fn test_mission_update_and_delete() {
    let state = test_state();
    handlers::create_mission(
        agent(Role::User),
        State(state.clone()),
        JsonOrForm(mission("Eco", "2024-02-02")),
    )
    .await
    .unwrap();
    let id = handlers::list_missions(State(state.clone()), Query(MissionFilter::default()))
        .await
        .unwrap()
        .0[0]
        .id;

    let mut changed = mission("Eco", "2024-02-03");
    changed.info.info7 = Some("Extracción confirmada".to_string());
    let msg = handlers::update_mission(
        agent(Role::User),
        State(state.clone()),
        Path(id),
        JsonOrForm(changed),
    )
    .await
    .unwrap();
    assert_eq!(msg, "Misión actualizada con éxito.");

    let stored = handlers::get_mission(State(state.clone()), Path(id)).await.unwrap().0;
    assert_eq!(stored.fecha.to_string(), "2024-02-03");
    assert_eq!(stored.info.info7.as_deref(), Some("Extracción confirmada"));

    handlers::delete_mission(agent(Role::User), State(state.clone()), Path(id))
        .await
        .unwrap();
    let err = handlers::delete_mission(agent(Role::User), State(state), Path(id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mission_filter_is_sanitized() {
    let state = test_state();
    let err = handlers::list_missions(
        State(state),
        Query(MissionFilter {
            nombre: Some("x' OR 1=1 --".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

// --- Auth handlers ---

#[tokio::test]
async fn test_register_hashes_password_and_defaults_to_user() {
    let state = test_state();
    let msg = handlers::register(
        State(state.clone()),
        JsonOrForm(RegisterRequest {
            nombre: Some("agente".to_string()),
            contrasena: Some("secreto".to_string()),
            admin_code: Some(String::new()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(msg, "Usuario registrado con éxito.");

    let user = state.repo.get_user_by_name("agente").await.unwrap().unwrap();
    assert_eq!(user.role(), Role::User);
    assert_ne!(user.contrasena_hash, "secreto");
    assert!(user.contrasena_hash.starts_with("$argon2"));
}

#[tokio::test]
async fn test_register_with_admin_code() {
    let state = test_state();
    register(&state, "director", "clave-larga", Some(LOCAL_ADMIN_CODE)).await;
    let user = state.repo.get_user_by_name("director").await.unwrap().unwrap();
    assert_eq!(user.role(), Role::Admin);
}

#[tokio::test]
async fn test_register_with_wrong_admin_code_is_forbidden() {
    let state = test_state();
    let err = handlers::register(
        State(state.clone()),
        JsonOrForm(RegisterRequest {
            nombre: Some("intruso".to_string()),
            contrasena: Some("secreto".to_string()),
            admin_code: Some("adivina".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert!(state.repo.get_user_by_name("intruso").await.unwrap().is_none());
}

#[tokio::test]
async fn test_register_duplicate_name_is_conflict() {
    let state = test_state();
    register(&state, "agente", "secreto", None).await;

    let err = handlers::register(
        State(state),
        JsonOrForm(RegisterRequest {
            nombre: Some("agente".to_string()),
            contrasena: Some("otro-secreto".to_string()),
            admin_code: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(err.to_string(), "El usuario ya existe.");
}

#[tokio::test]
async fn test_register_short_credentials_are_rejected() {
    let state = test_state();
    let err = handlers::register(
        State(state),
        JsonOrForm(RegisterRequest {
            nombre: Some("ab".to_string()),
            contrasena: Some("secreto".to_string()),
            admin_code: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let state = test_state();
    register(&state, "agente", "secreto", None).await;

    let response = handlers::login(
        State(state.clone()),
        JsonOrForm(LoginRequest {
            nombre: Some("agente".to_string()),
            contrasena: Some("secreto".to_string()),
        }),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("scp_session="));
    assert!(cookie.contains("HttpOnly"));

    let token = cookie
        .trim_start_matches("scp_session=")
        .split(';')
        .next()
        .unwrap();
    let claims = auth::decode_token(&state.config, token).unwrap();
    assert_eq!(claims.sub, "agente");
    assert!(state.sessions.get(claims.sid).await.is_some());
}

#[tokio::test]
async fn test_login_with_bad_credentials_is_unauthorized() {
    let state = test_state();
    register(&state, "agente", "secreto", None).await;

    for (nombre, contrasena) in [("agente", "incorrecta"), ("nadie", "secreto")] {
        let response = handlers::login(
            State(state.clone()),
            JsonOrForm(LoginRequest {
                nombre: Some(nombre.to_string()),
                contrasena: Some(contrasena.to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}

#[tokio::test]
async fn test_logout_revokes_the_session() {
    let state = test_state();
    register(&state, "agente", "secreto", None).await;
    let response = handlers::login(
        State(state.clone()),
        JsonOrForm(LoginRequest {
            nombre: Some("agente".to_string()),
            contrasena: Some("secreto".to_string()),
        }),
    )
    .await
    .into_response();
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    let pair = set_cookie.split(';').next().unwrap().to_string();
    let token = pair.trim_start_matches("scp_session=").to_string();
    let sid = auth::decode_token(&state.config, &token).unwrap().sid;

    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, HeaderValue::from_str(&pair).unwrap());
    let response = handlers::logout(State(state.clone()), headers)
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    assert!(state.sessions.get(sid).await.is_none());
}

#[tokio::test]
async fn test_logout_without_session_still_succeeds() {
    let state = test_state();
    let response = handlers::logout(State(state), HeaderMap::new())
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_reports_name_and_role() {
    let info = handlers::session(agent(Role::Admin)).await.0;
    assert_eq!(info.nombre, "agente");
    assert_eq!(info.rol, Role::Admin);
}

// --- User management handlers ---

#[tokio::test]
async fn test_admin_lists_and_changes_roles() {
    let state = test_state();
    register(&state, "agente", "secreto", None).await;
    let admin = auth::RequireAdmin(agent(Role::Admin));

    let users = handlers::list_users(admin.clone(), State(state.clone()))
        .await
        .unwrap()
        .0;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].rol, "user");

    let msg = handlers::update_user_role(
        admin.clone(),
        State(state.clone()),
        Path(users[0].id),
        JsonOrForm(UpdateRoleRequest {
            rol: Some("admin".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(msg, "Rol actualizado con éxito.");
    let user = state.repo.get_user_by_name("agente").await.unwrap().unwrap();
    assert_eq!(user.role(), Role::Admin);

    let err = handlers::update_user_role(
        admin.clone(),
        State(state.clone()),
        Path(users[0].id),
        JsonOrForm(UpdateRoleRequest {
            rol: Some("superuser".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    handlers::delete_user(admin.clone(), State(state.clone()), Path(users[0].id))
        .await
        .unwrap();
    let err = handlers::delete_user(admin, State(state), Path(users[0].id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_user_closes_their_sessions() {
    let state = test_state();
    register(&state, "agente", "secreto", None).await;
    let response = handlers::login(
        State(state.clone()),
        JsonOrForm(LoginRequest {
            nombre: Some("agente".to_string()),
            contrasena: Some("secreto".to_string()),
        }),
    )
    .await
    .into_response();
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    let token = set_cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("scp_session=")
        .to_string();
    let sid = auth::decode_token(&state.config, &token).unwrap().sid;
    assert!(state.sessions.get(sid).await.is_some());

    let id = state.repo.get_user_by_name("agente").await.unwrap().unwrap().id;
    handlers::delete_user(auth::RequireAdmin(agent(Role::Admin)), State(state.clone()), Path(id))
        .await
        .unwrap();

    assert!(state.sessions.get(sid).await.is_none());
}

// --- Store failures ---

/// Every call fails as if the pool were exhausted.
struct FailingRepo;

fn unavailable<T>() -> RepoResult<T> {
    Err(RepoError::Database(sqlx::Error::PoolTimedOut))
}

#[async_trait]
impl Repository for FailingRepo {
    async fn list_scps(&self) -> RepoResult<Vec<Scp>> {
        unavailable()
    }
    async fn get_scp(&self, _id: i32) -> RepoResult<Option<Scp>> {
        unavailable()
    }
    async fn find_scp_by_numero(&self, _numero_scp: &str) -> RepoResult<Option<Scp>> {
        unavailable()
    }
    async fn create_scp(&self, _input: ScpInput) -> RepoResult<Scp> {
        unavailable()
    }
    async fn update_scp(&self, _id: i32, _input: ScpInput) -> RepoResult<Option<Scp>> {
        unavailable()
    }
    async fn delete_scp(&self, _id: i32) -> RepoResult<bool> {
        unavailable()
    }
    async fn list_missions(&self, _nombre: Option<&str>) -> RepoResult<Vec<Mission>> {
        unavailable()
    }
    async fn get_mission(&self, _id: i32) -> RepoResult<Option<Mission>> {
        unavailable()
    }
    async fn create_mission(&self, _input: MissionInput) -> RepoResult<Mission> {
        unavailable()
    }
    async fn update_mission(&self, _id: i32, _input: MissionInput) -> RepoResult<Option<Mission>> {
        unavailable()
    }
    async fn delete_mission(&self, _id: i32) -> RepoResult<bool> {
        unavailable()
    }
    async fn create_user(&self, _user: NewUser) -> RepoResult<User> {
        unavailable()
    }
    async fn get_user_by_name(&self, _nombre: &str) -> RepoResult<Option<User>> {
        unavailable()
    }
    async fn list_users(&self) -> RepoResult<Vec<UserSummary>> {
        unavailable()
    }
    async fn set_user_role(&self, _id: i32, _rol: Role) -> RepoResult<Option<UserSummary>> {
        unavailable()
    }
    async fn delete_user(&self, _id: i32) -> RepoResult<Option<UserSummary>> {
        unavailable()
    }
}

#[tokio::test]
async fn test_store_failure_is_internal_error_with_generic_message() {
    let state = state_with(Arc::new(FailingRepo));

    let err = handlers::list_scps(State(state.clone())).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.to_string(), "Error al obtener los SCPs.");

    let err = handlers::create_scp(agent(Role::User), State(state.clone()), JsonOrForm(scp("SCP-1")))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = handlers::login(
        State(state),
        JsonOrForm(LoginRequest {
            nombre: Some("agente".to_string()),
            contrasena: Some("secreto".to_string()),
        }),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_mission_without_notes_stores_none() {
    let state = test_state();
    handlers::create_mission(
        agent(Role::User),
        State(state.clone()),
        JsonOrForm(mission("Eco", "2024-02-02")),
    )
    .await
    .unwrap();
    let stored = handlers::list_missions(State(state), Query(MissionFilter::default()))
        .await
        .unwrap()
        .0;
    assert_eq!(stored[0].info, MissionInfo::default());
}
