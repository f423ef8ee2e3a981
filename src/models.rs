use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{ApiError, ApiResult},
    sanitizer::sanitize,
};

// --- Roles ---

/// Role
///
/// Access level attached to every user and session. `Admin` unlocks the
/// user-management routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Rol no válido: '{0}'. Valores permitidos: user, admin.")]
pub struct InvalidRole(pub String);

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(InvalidRole(other.to_string())),
        }
    }
}

// --- Field helpers ---

/// Optional field: missing becomes empty, then sanitized.
fn clean(field: &str, value: Option<String>) -> ApiResult<String> {
    let value = value.unwrap_or_default();
    sanitize(&value).map_err(|e| ApiError::field(field, e))?;
    Ok(value)
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

// --- SCP records ---

/// Scp
///
/// A row of the `scps` catalogue. `numero_scp` is the business key and is unique
/// in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Scp {
    pub id: i32,
    pub numero_scp: String,
    pub clasificacion_contencion: String,
    pub nivel_peligro: String,
    pub ubicacion_actual: String,
    pub estado_investigacion: String,
    pub descripcion: String,
}

/// ScpPayload
///
/// Raw body for POST /scps and PUT /scps/{id}, as JSON or form-encoded.
/// Every field is optional at this stage so presence can be reported with the
/// proper message instead of a deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ScpPayload {
    #[serde(default)]
    pub numero_scp: Option<String>,
    #[serde(default)]
    pub clasificacion_contencion: Option<String>,
    #[serde(default)]
    pub nivel_peligro: Option<String>,
    #[serde(default)]
    pub ubicacion_actual: Option<String>,
    #[serde(default)]
    pub estado_investigacion: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
}

/// Validated, sanitized record fields, ready to be bound into a statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScpInput {
    pub numero_scp: String,
    pub clasificacion_contencion: String,
    pub nivel_peligro: String,
    pub ubicacion_actual: String,
    pub estado_investigacion: String,
    pub descripcion: String,
}

impl ScpPayload {
    pub fn into_input(self) -> ApiResult<ScpInput> {
        if is_blank(&self.numero_scp) || is_blank(&self.descripcion) {
            return Err(ApiError::Validation(
                "Número SCP y descripción son obligatorios.".to_string(),
            ));
        }

        Ok(ScpInput {
            numero_scp: clean("numero_scp", self.numero_scp)?,
            clasificacion_contencion: clean(
                "clasificacion_contencion",
                self.clasificacion_contencion,
            )?,
            nivel_peligro: clean("nivel_peligro", self.nivel_peligro)?,
            ubicacion_actual: clean("ubicacion_actual", self.ubicacion_actual)?,
            estado_investigacion: clean("estado_investigacion", self.estado_investigacion)?,
            descripcion: clean("descripcion", self.descripcion)?,
        })
    }
}

/// Query for GET /scps/buscar.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScpLookup {
    /// Exact business key to look up.
    pub numero_scp: Option<String>,
}

// --- Missions ---

/// Declares `MissionInfo` with one optional text column per listed name.
/// The same names are used for the table columns and the JSON/form keys.
macro_rules! mission_info {
    ($($field:ident),+ $(,)?) => {
        /// MissionInfo
        ///
        /// The optional free-text notes of a mission. On the wire they are flat
        /// keys (`info1` … `info23`) next to the main fields, omitted when null.
        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS, ToSchema, FromRow)]
        #[ts(export)]
        pub struct MissionInfo {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                #[ts(optional)]
                pub $field: Option<String>,
            )+
        }

        impl MissionInfo {
            /// Column names, in declaration order.
            pub const COLUMNS: &'static [&'static str] = &[$(stringify!($field)),+];

            pub fn entries(&self) -> Vec<(&'static str, Option<&str>)> {
                vec![$((stringify!($field), self.$field.as_deref())),+]
            }

            fn entries_mut(&mut self) -> Vec<(&'static str, &mut Option<String>)> {
                vec![$((stringify!($field), &mut self.$field)),+]
            }
        }
    };
}

mission_info!(
    info1, info2, info3, info4, info5, info6, info7, info8, info9, info10, info11, info12, info13,
    info14, info15, info16, info17, info18, info19, info20, info21, info22, info23,
);

impl MissionInfo {
    /// Drops empty notes and sanitizes the rest.
    fn normalized(mut self) -> ApiResult<Self> {
        for (field, slot) in self.entries_mut() {
            if slot.as_deref().is_some_and(str::is_empty) {
                *slot = None;
            }
            if let Some(text) = slot.as_deref() {
                sanitize(text).map_err(|e| ApiError::field(field, e))?;
            }
        }
        Ok(self)
    }
}

/// Mission
///
/// A row of the `misiones` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Mission {
    pub id: i32,
    pub nombre: String,
    pub ubicacion: String,
    pub objetivo: String,
    pub unidad: String,
    pub comandante: String,
    #[ts(type = "string")]
    pub fecha: NaiveDate,
    pub nivel_amenaza: String,
    pub estado: String,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub info: MissionInfo,
}

/// MissionPayload
///
/// Raw body for POST /misiones and PUT /misiones/{id}. Unknown keys (such as an
/// `id` echoed back by the edit form) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MissionPayload {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub ubicacion: Option<String>,
    #[serde(default)]
    pub objetivo: Option<String>,
    #[serde(default)]
    pub unidad: Option<String>,
    #[serde(default)]
    pub comandante: Option<String>,
    /// `YYYY-MM-DD`. A full timestamp is accepted and truncated to its date.
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub nivel_amenaza: Option<String>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(flatten)]
    pub info: MissionInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionInput {
    pub nombre: String,
    pub ubicacion: String,
    pub objetivo: String,
    pub unidad: String,
    pub comandante: String,
    pub fecha: NaiveDate,
    pub nivel_amenaza: String,
    pub estado: String,
    pub info: MissionInfo,
}

fn parse_fecha(raw: &str) -> ApiResult<NaiveDate> {
    let date_part = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
        ApiError::Validation("La fecha debe tener el formato AAAA-MM-DD.".to_string())
    })
}

impl MissionPayload {
    pub fn into_input(self) -> ApiResult<MissionInput> {
        if is_blank(&self.nombre) || is_blank(&self.fecha) {
            return Err(ApiError::Validation(
                "Nombre y fecha de la misión son obligatorios.".to_string(),
            ));
        }

        let fecha_raw = clean("fecha", self.fecha)?;

        Ok(MissionInput {
            nombre: clean("nombre", self.nombre)?,
            ubicacion: clean("ubicacion", self.ubicacion)?,
            objetivo: clean("objetivo", self.objetivo)?,
            unidad: clean("unidad", self.unidad)?,
            comandante: clean("comandante", self.comandante)?,
            fecha: parse_fecha(&fecha_raw)?,
            nivel_amenaza: clean("nivel_amenaza", self.nivel_amenaza)?,
            estado: clean("estado", self.estado)?,
            info: self.info.normalized()?,
        })
    }
}

/// Query for GET /misiones.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MissionFilter {
    /// Case-insensitive substring of the mission name.
    pub nombre: Option<String>,
}

// --- Users & auth ---

/// User
///
/// Internal row of the `usuarios` table. Holds the password hash, so it is
/// never serialized; responses use `UserSummary`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub nombre: String,
    #[sqlx(rename = "contrasena")]
    pub contrasena_hash: String,
    pub rol: String,
}

impl User {
    /// The `CHECK` constraint keeps `rol` valid; anything else degrades to `User`.
    pub fn role(&self) -> Role {
        self.rol.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub nombre: String,
    pub contrasena_hash: String,
    pub rol: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct UserSummary {
    pub id: i32,
    pub nombre: String,
    pub rol: String,
}

/// RegisterRequest
///
/// Body for POST /auth/register. `adminCode` is the shared secret that promotes
/// the new account to `admin`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterRequest {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub contrasena: Option<String>,
    #[serde(default, rename = "adminCode")]
    pub admin_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub contrasena: Option<String>,
}

/// Validated credentials shared by register and login.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub nombre: String,
    pub contrasena: String,
}

pub const MIN_CREDENTIAL_LEN: usize = 3;

/// Presence, minimum length and sanitization of a name/password pair.
/// Pass `min_len = 0` to skip the length rule.
pub fn credentials(
    nombre: Option<String>,
    contrasena: Option<String>,
    min_len: usize,
) -> ApiResult<Credentials> {
    if is_blank(&nombre) || is_blank(&contrasena) {
        return Err(ApiError::Validation(
            "Nombre y contraseña son obligatorios.".to_string(),
        ));
    }

    let nombre = clean("nombre", nombre)?;
    let contrasena = clean("contrasena", contrasena)?;

    if nombre.chars().count() < min_len || contrasena.chars().count() < min_len {
        return Err(ApiError::Validation(format!(
            "Usuario y contraseña deben tener al menos {min_len} caracteres."
        )));
    }

    Ok(Credentials { nombre, contrasena })
}

/// Response of GET /auth/session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionInfo {
    pub nombre: String,
    pub rol: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub rol: Option<String>,
}

impl UpdateRoleRequest {
    pub fn role(&self) -> ApiResult<Role> {
        let raw = self.rol.as_deref().unwrap_or_default();
        raw.parse()
            .map_err(|e: InvalidRole| ApiError::Validation(e.to_string()))
    }
}
