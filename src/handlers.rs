use crate::{
    AppState,
    auth::{self, AuthUser, RequireAdmin},
    error::{ApiError, ApiResult},
    extract::JsonOrForm,
    models::{
        self, LoginRequest, MIN_CREDENTIAL_LEN, Mission, MissionFilter, MissionPayload, NewUser,
        RegisterRequest, Role, Scp, ScpLookup, ScpPayload, SessionInfo, UpdateRoleRequest,
        UserSummary,
    },
    password,
    sanitizer::sanitize,
    session::SessionData,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};

const SCP_DUPLICATE: &str = "Ya existe un SCP con ese número.";

// --- SCP records ---

/// list_scps
///
/// [Authenticated Route] Every record in the catalogue, ordered by id.
#[utoipa::path(
    get,
    path = "/scps",
    responses((status = 200, description = "All records", body = [Scp]))
)]
pub async fn list_scps(State(state): State<AppState>) -> ApiResult<Json<Vec<Scp>>> {
    let scps = state
        .repo
        .list_scps()
        .await
        .map_err(|e| e.into_internal("Error al obtener los SCPs."))?;
    Ok(Json(scps))
}

/// create_scp
///
/// [Authenticated Route] Adds a record. `numero_scp` and `descripcion` are
/// required; every field is sanitized before the insert.
#[utoipa::path(
    post,
    path = "/scps",
    request_body = ScpPayload,
    responses(
        (status = 200, description = "Created", body = String),
        (status = 400, description = "Missing or rejected field", body = String),
        (status = 409, description = "numero_scp already exists", body = String)
    )
)]
pub async fn create_scp(
    user: AuthUser,
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<ScpPayload>,
) -> ApiResult<&'static str> {
    let input = payload.into_input()?;
    let scp = state
        .repo
        .create_scp(input)
        .await
        .map_err(|e| e.into_api(SCP_DUPLICATE, "Error al crear el SCP."))?;

    tracing::info!(user = %user.nombre, id = scp.id, numero_scp = %scp.numero_scp, "scp created");
    Ok("SCP creado con éxito.")
}

/// search_scp
///
/// [Authenticated Route] Exact lookup by business key (`?numero_scp=`).
#[utoipa::path(
    get,
    path = "/scps/buscar",
    params(ScpLookup),
    responses(
        (status = 200, description = "Found", body = Scp),
        (status = 400, description = "Missing or rejected parameter", body = String),
        (status = 404, description = "No such numero_scp", body = String)
    )
)]
pub async fn search_scp(
    State(state): State<AppState>,
    Query(lookup): Query<ScpLookup>,
) -> ApiResult<Json<Scp>> {
    let numero_scp = lookup
        .numero_scp
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ApiError::Validation("Falta el parámetro numero_scp en la URL.".to_string())
        })?;
    sanitize(&numero_scp).map_err(|e| ApiError::field("numero_scp", e))?;

    state
        .repo
        .find_scp_by_numero(&numero_scp)
        .await
        .map_err(|e| e.into_internal("Error al buscar el SCP."))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No se encontró el SCP con ese número.".to_string()))
}

/// get_scp
///
/// [Authenticated Route] A single record by id, used by the edit form.
#[utoipa::path(
    get,
    path = "/scps/{id}",
    params(("id" = i32, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Found", body = Scp),
        (status = 404, description = "Not Found", body = String)
    )
)]
pub async fn get_scp(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<Json<Scp>> {
    state
        .repo
        .get_scp(id)
        .await
        .map_err(|e| e.into_internal("Error al buscar el SCP por ID."))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No se encontró el SCP con ese ID.".to_string()))
}

/// update_scp
///
/// [Authenticated Route] Full replace of a record. Same validation as creation.
#[utoipa::path(
    put,
    path = "/scps/{id}",
    params(("id" = i32, Path, description = "Record ID")),
    request_body = ScpPayload,
    responses(
        (status = 200, description = "Updated", body = String),
        (status = 404, description = "Not Found", body = String),
        (status = 409, description = "numero_scp already exists", body = String)
    )
)]
pub async fn update_scp(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    JsonOrForm(payload): JsonOrForm<ScpPayload>,
) -> ApiResult<&'static str> {
    let input = payload.into_input()?;
    match state
        .repo
        .update_scp(id, input)
        .await
        .map_err(|e| e.into_api(SCP_DUPLICATE, "Error al actualizar el SCP."))?
    {
        Some(_) => {
            tracing::info!(user = %user.nombre, id, "scp updated");
            Ok("SCP actualizado con éxito.")
        }
        None => Err(ApiError::NotFound(
            "No se encontró el SCP a actualizar.".to_string(),
        )),
    }
}

/// delete_scp
///
/// [Authenticated Route] Hard delete.
#[utoipa::path(
    delete,
    path = "/scps/{id}",
    params(("id" = i32, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Deleted", body = String),
        (status = 404, description = "Not Found", body = String)
    )
)]
pub async fn delete_scp(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<&'static str> {
    let removed = state
        .repo
        .delete_scp(id)
        .await
        .map_err(|e| e.into_internal("Error al eliminar el SCP."))?;

    if !removed {
        return Err(ApiError::NotFound(
            "No se encontró el SCP a eliminar.".to_string(),
        ));
    }
    tracing::info!(user = %user.nombre, id, "scp deleted");
    Ok("SCP eliminado con éxito.")
}

// --- Missions ---

/// list_missions
///
/// [Authenticated Route] Missions ordered by date. `?nombre=` narrows the list
/// to names containing the fragment, case-insensitively.
#[utoipa::path(
    get,
    path = "/misiones",
    params(MissionFilter),
    responses(
        (status = 200, description = "Missions", body = [Mission]),
        (status = 400, description = "Rejected filter", body = String)
    )
)]
pub async fn list_missions(
    State(state): State<AppState>,
    Query(filter): Query<MissionFilter>,
) -> ApiResult<Json<Vec<Mission>>> {
    let nombre = filter.nombre.filter(|n| !n.is_empty());
    if let Some(fragment) = nombre.as_deref() {
        sanitize(fragment).map_err(|e| ApiError::field("nombre", e))?;
    }

    let missions = state
        .repo
        .list_missions(nombre.as_deref())
        .await
        .map_err(|e| e.into_internal("Error al obtener las misiones."))?;
    Ok(Json(missions))
}

#[utoipa::path(
    post,
    path = "/misiones",
    request_body = MissionPayload,
    responses(
        (status = 200, description = "Created", body = String),
        (status = 400, description = "Missing or rejected field", body = String)
    )
)]
pub async fn create_mission(
    user: AuthUser,
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<MissionPayload>,
) -> ApiResult<&'static str> {
    let input = payload.into_input()?;
    let mission = state
        .repo
        .create_mission(input)
        .await
        .map_err(|e| e.into_api("La misión ya existe.", "Error al crear la misión."))?;

    tracing::info!(user = %user.nombre, id = mission.id, "mission created");
    Ok("Misión creada con éxito.")
}

#[utoipa::path(
    get,
    path = "/misiones/{id}",
    params(("id" = i32, Path, description = "Mission ID")),
    responses(
        (status = 200, description = "Found", body = Mission),
        (status = 404, description = "Not Found", body = String)
    )
)]
pub async fn get_mission(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Mission>> {
    state
        .repo
        .get_mission(id)
        .await
        .map_err(|e| e.into_internal("Error al buscar la misión."))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No se encontró la misión con ese ID.".to_string()))
}

#[utoipa::path(
    put,
    path = "/misiones/{id}",
    params(("id" = i32, Path, description = "Mission ID")),
    request_body = MissionPayload,
    responses(
        (status = 200, description = "Updated", body = String),
        (status = 404, description = "Not Found", body = String)
    )
)]
pub async fn update_mission(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    JsonOrForm(payload): JsonOrForm<MissionPayload>,
) -> ApiResult<&'static str> {
    let input = payload.into_input()?;
    let updated = state
        .repo
        .update_mission(id, input)
        .await
        .map_err(|e| e.into_api("La misión ya existe.", "Error al actualizar la misión."))?;

    match updated {
        Some(_) => {
            tracing::info!(user = %user.nombre, id, "mission updated");
            Ok("Misión actualizada con éxito.")
        }
        None => Err(ApiError::NotFound(
            "No se encontró la misión a actualizar.".to_string(),
        )),
    }
}

#[utoipa::path(
    delete,
    path = "/misiones/{id}",
    params(("id" = i32, Path, description = "Mission ID")),
    responses(
        (status = 200, description = "Deleted", body = String),
        (status = 404, description = "Not Found", body = String)
    )
)]
pub async fn delete_mission(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<&'static str> {
    let removed = state
        .repo
        .delete_mission(id)
        .await
        .map_err(|e| e.into_internal("Error al eliminar la misión."))?;

    if !removed {
        return Err(ApiError::NotFound(
            "No se encontró la misión a eliminar.".to_string(),
        ));
    }
    tracing::info!(user = %user.nombre, id, "mission deleted");
    Ok("Misión eliminada con éxito.")
}

// --- Auth ---

/// register
///
/// [Public Route] Creates an account. The password is hashed with Argon2id on
/// a blocking thread. A non-empty `adminCode` must equal the configured code
/// exactly; it then grants the `admin` role, otherwise the request is refused.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered", body = String),
        (status = 400, description = "Missing or rejected field", body = String),
        (status = 403, description = "Wrong admin code", body = String),
        (status = 409, description = "Name already taken", body = String)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<RegisterRequest>,
) -> ApiResult<&'static str> {
    let creds = models::credentials(payload.nombre, payload.contrasena, MIN_CREDENTIAL_LEN)?;

    let rol = match payload.admin_code.as_deref().filter(|code| !code.is_empty()) {
        None => Role::User,
        Some(code) => {
            sanitize(code).map_err(|e| ApiError::field("adminCode", e))?;
            if code != state.config.admin_code {
                tracing::warn!(user = %creds.nombre, "registration with wrong admin code");
                return Err(ApiError::Forbidden(
                    "Código de administrador no válido.".to_string(),
                ));
            }
            Role::Admin
        }
    };

    let plain = creds.contrasena;
    let contrasena_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| ApiError::Internal(format!("Error al registrar el usuario: {e}")))?
        .map_err(|e| ApiError::Internal(format!("Error al registrar el usuario: {e}")))?;

    let user = state
        .repo
        .create_user(NewUser {
            nombre: creds.nombre,
            contrasena_hash,
            rol,
        })
        .await
        .map_err(|e| e.into_api("El usuario ya existe.", "Error al registrar el usuario."))?;

    tracing::info!(user = %user.nombre, rol = %rol, "user registered");
    Ok(match rol {
        Role::Admin => "Administrador registrado con éxito.",
        Role::User => "Usuario registrado con éxito.",
    })
}

/// login
///
/// [Public Route] Verifies the credentials, opens a server-side session and sets
/// the `scp_session` cookie with the signed token naming it.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; Set-Cookie carries the session", body = String),
        (status = 401, description = "Bad credentials", body = String)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let creds = models::credentials(payload.nombre, payload.contrasena, 0)?;
    let rejected = || ApiError::Unauthorized("Usuario o contraseña incorrectos.".to_string());

    let user = state
        .repo
        .get_user_by_name(&creds.nombre)
        .await
        .map_err(|e| e.into_internal("Error al iniciar sesión."))?;

    // Unknown names still pay for one Argon2 verification.
    let stored_hash = user.as_ref().map(|u| u.contrasena_hash.clone());
    let plain = creds.contrasena;
    let verified = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => password::verify_password(&plain, &hash),
        None => Ok(password::verify_unknown_user(&plain)),
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Error al iniciar sesión: {e}")))?
    .map_err(|e| ApiError::Internal(format!("Error al iniciar sesión: {e}")))?;

    let user = match user {
        Some(user) if verified => user,
        Some(user) => {
            tracing::warn!(user = %user.nombre, "login with wrong password");
            return Err(rejected());
        }
        None => {
            tracing::warn!(user = %creds.nombre, "login for unknown user");
            return Err(rejected());
        }
    };

    let session = SessionData::new(user.nombre.clone(), user.role(), state.config.session_ttl());
    let sid = state.sessions.create(session.clone()).await;
    let token = match auth::issue_token(&state.config, sid, &session) {
        Ok(token) => token,
        Err(e) => {
            state.sessions.revoke(sid).await;
            return Err(ApiError::Internal(format!("Error al iniciar sesión: {e}")));
        }
    };

    tracing::info!(user = %user.nombre, rol = %session.rol, %sid, "session opened");
    Ok((
        [(header::SET_COOKIE, auth::session_cookie(&state.config, &token))],
        "Inicio de sesión exitoso.",
    ))
}

/// logout
///
/// [Public Route] Revokes the presented session, if any, and clears the cookie.
/// Always succeeds so stale browsers can log out too.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Logged out", body = String))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let claims = auth::session_token(&headers)
        .and_then(|token| auth::decode_token(&state.config, token).ok());

    if let Some(claims) = claims {
        if state.sessions.revoke(claims.sid).await {
            tracing::info!(user = %claims.sub, sid = %claims.sid, "session revoked");
        }
    }

    (
        [(header::SET_COOKIE, auth::cleared_session_cookie(&state.config))],
        "Sesión cerrada.",
    )
}

/// session
///
/// [Authenticated Route] Who the current session belongs to.
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Live session", body = SessionInfo),
        (status = 401, description = "No live session", body = String)
    )
)]
pub async fn session(user: AuthUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        nombre: user.nombre,
        rol: user.rol,
    })
}

// --- User management ---

/// list_users
///
/// [Admin Route] Every account, without password hashes.
#[utoipa::path(
    get,
    path = "/usuarios",
    responses(
        (status = 200, description = "Users", body = [UserSummary]),
        (status = 403, description = "Not an admin", body = String)
    )
)]
pub async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let users = state
        .repo
        .list_users()
        .await
        .map_err(|e| e.into_internal("Error al obtener los usuarios."))?;
    Ok(Json(users))
}

/// update_user_role
///
/// [Admin Route] Sets `rol` to `user` or `admin`. Open sessions keep their
/// role until the next login.
#[utoipa::path(
    put,
    path = "/usuarios/{id}/rol",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = String),
        (status = 400, description = "Unknown role", body = String),
        (status = 404, description = "Not Found", body = String)
    )
)]
pub async fn update_user_role(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    JsonOrForm(payload): JsonOrForm<UpdateRoleRequest>,
) -> ApiResult<&'static str> {
    let rol = payload.role()?;
    let updated = state
        .repo
        .set_user_role(id, rol)
        .await
        .map_err(|e| e.into_internal("Error al actualizar el rol."))?
        .ok_or_else(|| ApiError::NotFound("No se encontró el usuario.".to_string()))?;

    tracing::info!(admin = %admin.nombre, user = %updated.nombre, rol = %rol, "role changed");
    Ok("Rol actualizado con éxito.")
}

#[utoipa::path(
    delete,
    path = "/usuarios/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = String),
        (status = 404, description = "Not Found", body = String)
    )
)]
pub async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<&'static str> {
    let removed = state
        .repo
        .delete_user(id)
        .await
        .map_err(|e| e.into_internal("Error al eliminar el usuario."))?
        .ok_or_else(|| ApiError::NotFound("No se encontró el usuario.".to_string()))?;

    // Sessions of a deleted account end with it.
    let closed = state.sessions.revoke_user(&removed.nombre).await;
    tracing::info!(admin = %admin.nombre, id, user = %removed.nombre, closed, "user deleted");
    Ok("Usuario eliminado con éxito.")
}
