use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::Role,
    session::{SessionData, SessionState},
};

/// Name of the HttpOnly cookie carrying the session token.
pub const SESSION_COOKIE: &str = "scp_session";

const UNAUTHORIZED: &str = "No autorizado. Inicia sesión para continuar.";

/// Claims
///
/// Payload of the signed session token. The token only points at a server-side
/// session (`sid`); the name and role are repeated so a forged `sid` alone is
/// not enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the username.
    pub sub: String,
    pub rol: Role,
    /// Server-side session identifier.
    pub sid: Uuid,
    pub iat: usize,
    pub exp: usize,
}

/// issue_token
///
/// Signs an HS256 token for the session `sid`. Expiry matches the session's own.
pub fn issue_token(
    config: &AppConfig,
    sid: Uuid,
    session: &SessionData,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp().max(0) as usize;
    let claims = Claims {
        sub: session.nombre.clone(),
        rol: session.rol,
        sid,
        iat: now,
        exp: session.expires_at.timestamp().max(0) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )
}

/// Checks the signature and expiry and returns the claims.
pub fn decode_token(config: &AppConfig, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let key = DecodingKey::from_secret(config.session_secret.as_bytes());
    decode::<Claims>(token, &key, &validation).map(|data| data.claims)
}

/// session_token
///
/// Finds the presented token. An `Authorization: Bearer` header wins over the
/// session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

fn cookie_attributes(config: &AppConfig, max_age: i64) -> String {
    let secure = if config.env == Env::Production { "; Secure" } else { "" };
    format!("HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}{secure}")
}

/// `Set-Cookie` value that stores `token` for the session lifetime.
pub fn session_cookie(config: &AppConfig, token: &str) -> String {
    let max_age = config.session_ttl().num_seconds();
    format!("{SESSION_COOKIE}={token}; {}", cookie_attributes(config, max_age))
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn cleared_session_cookie(config: &AppConfig) -> String {
    format!("{SESSION_COOKIE}=; {}", cookie_attributes(config, 0))
}

/// AuthUser
///
/// Identity of an authenticated request, resolved from a live session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub session_id: Uuid,
    pub nombre: String,
    pub rol: Role,
}

/// AuthUser Extractor Implementation
///
/// 1. Token extraction (Bearer header, then cookie).
/// 2. Signature and expiry check.
/// 3. Session lookup: the session must still be live and belong to the same
///    user, so logout takes effect immediately.
///
/// Rejection: 401 with a plain-text message.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = session_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized(UNAUTHORIZED.to_string()))?;

        let claims = decode_token(&config, token).map_err(|e| {
            tracing::warn!(reason = ?e.kind(), "rejected session token");
            ApiError::Unauthorized(UNAUTHORIZED.to_string())
        })?;

        let session = sessions
            .get(claims.sid)
            .await
            .filter(|s| s.nombre == claims.sub)
            .ok_or_else(|| {
                tracing::warn!(sid = %claims.sid, "token refers to no live session");
                ApiError::Unauthorized(UNAUTHORIZED.to_string())
            })?;

        Ok(AuthUser {
            session_id: claims.sid,
            nombre: session.nombre,
            rol: session.rol,
        })
    }
}

/// RequireAdmin
///
/// `AuthUser` that is additionally required to hold the `admin` role.
/// Rejects with 401 when unauthenticated, 403 when the role is insufficient.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    SessionState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.rol != Role::Admin {
            tracing::warn!(user = %user.nombre, "admin route refused");
            return Err(ApiError::Forbidden(
                "Acceso denegado: se requiere rol de administrador.".to_string(),
            ));
        }
        Ok(RequireAdmin(user))
    }
}
