use crate::{
    error::RepoError,
    models::{Mission, MissionInfo, MissionInput, NewUser, Role, Scp, ScpInput, User, UserSummary},
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
};
use tokio::sync::RwLock;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository Trait
///
/// Abstract contract for all persistence operations. Handlers only see this
/// trait, so Postgres and the in-memory store are interchangeable.
///
/// Every statement is parameterized. Lookups return `Option` (None = not found),
/// deletes return whether a row was removed, and a unique-key violation is
/// reported as `RepoError::Conflict`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- SCP records ---
    async fn list_scps(&self) -> RepoResult<Vec<Scp>>;
    async fn get_scp(&self, id: i32) -> RepoResult<Option<Scp>>;
    async fn find_scp_by_numero(&self, numero_scp: &str) -> RepoResult<Option<Scp>>;
    async fn create_scp(&self, input: ScpInput) -> RepoResult<Scp>;
    // Full replace.
    async fn update_scp(&self, id: i32, input: ScpInput) -> RepoResult<Option<Scp>>;
    async fn delete_scp(&self, id: i32) -> RepoResult<bool>;

    // --- Missions ---
    // Optional case-insensitive substring filter on `nombre`.
    async fn list_missions(&self, nombre: Option<&str>) -> RepoResult<Vec<Mission>>;
    async fn get_mission(&self, id: i32) -> RepoResult<Option<Mission>>;
    async fn create_mission(&self, input: MissionInput) -> RepoResult<Mission>;
    async fn update_mission(&self, id: i32, input: MissionInput) -> RepoResult<Option<Mission>>;
    async fn delete_mission(&self, id: i32) -> RepoResult<bool>;

    // --- Users ---
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user_by_name(&self, nombre: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<UserSummary>>;
    async fn set_user_role(&self, id: i32, rol: Role) -> RepoResult<Option<UserSummary>>;
    // Returns the removed account so its sessions can be closed.
    async fn delete_user(&self, id: i32) -> RepoResult<Option<UserSummary>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const SCP_COLUMNS: &str = "id, numero_scp, clasificacion_contencion, nivel_peligro, \
                           ubicacion_actual, estado_investigacion, descripcion";

const MISSION_BASE_COLUMNS: [&str; 8] = [
    "nombre",
    "ubicacion",
    "objetivo",
    "unidad",
    "comandante",
    "fecha",
    "nivel_amenaza",
    "estado",
];

static MISSION_COLUMNS: LazyLock<String> = LazyLock::new(|| {
    std::iter::once("id")
        .chain(MISSION_BASE_COLUMNS)
        .chain(MissionInfo::COLUMNS.iter().copied())
        .collect::<Vec<_>>()
        .join(", ")
});

/// Escapes LIKE wildcards so the filter matches literally.
fn contains_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL through a shared `PgPool`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_scps(&self) -> RepoResult<Vec<Scp>> {
        let scps = sqlx::query_as::<_, Scp>(&format!("SELECT {SCP_COLUMNS} FROM scps ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(scps)
    }

    async fn get_scp(&self, id: i32) -> RepoResult<Option<Scp>> {
        let scp = sqlx::query_as::<_, Scp>(&format!("SELECT {SCP_COLUMNS} FROM scps WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(scp)
    }

    async fn find_scp_by_numero(&self, numero_scp: &str) -> RepoResult<Option<Scp>> {
        let scp = sqlx::query_as::<_, Scp>(&format!(
            "SELECT {SCP_COLUMNS} FROM scps WHERE numero_scp = $1"
        ))
        .bind(numero_scp)
        .fetch_optional(&self.pool)
        .await?;
        Ok(scp)
    }

    /// create_scp
    ///
    /// The UNIQUE constraint on `numero_scp` turns duplicates into
    /// `RepoError::Conflict`.
    async fn create_scp(&self, input: ScpInput) -> RepoResult<Scp> {
        let scp = sqlx::query_as::<_, Scp>(&format!(
            r#"INSERT INTO scps
               (numero_scp, clasificacion_contencion, nivel_peligro, ubicacion_actual, estado_investigacion, descripcion)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {SCP_COLUMNS}"#
        ))
        .bind(input.numero_scp)
        .bind(input.clasificacion_contencion)
        .bind(input.nivel_peligro)
        .bind(input.ubicacion_actual)
        .bind(input.estado_investigacion)
        .bind(input.descripcion)
        .fetch_one(&self.pool)
        .await?;
        Ok(scp)
    }

    async fn update_scp(&self, id: i32, input: ScpInput) -> RepoResult<Option<Scp>> {
        let scp = sqlx::query_as::<_, Scp>(&format!(
            r#"UPDATE scps
               SET numero_scp = $1, clasificacion_contencion = $2, nivel_peligro = $3,
                   ubicacion_actual = $4, estado_investigacion = $5, descripcion = $6
               WHERE id = $7
               RETURNING {SCP_COLUMNS}"#
        ))
        .bind(input.numero_scp)
        .bind(input.clasificacion_contencion)
        .bind(input.nivel_peligro)
        .bind(input.ubicacion_actual)
        .bind(input.estado_investigacion)
        .bind(input.descripcion)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(scp)
    }

    async fn delete_scp(&self, id: i32) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM scps WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// list_missions
    ///
    /// QueryBuilder keeps the optional filter parameterized.
    async fn list_missions(&self, nombre: Option<&str>) -> RepoResult<Vec<Mission>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(MISSION_COLUMNS.as_str()).push(" FROM misiones");

        if let Some(fragment) = nombre {
            builder
                .push(" WHERE nombre ILIKE ")
                .push_bind(contains_pattern(fragment));
        }

        builder.push(" ORDER BY fecha, id");

        let missions = builder
            .build_query_as::<Mission>()
            .fetch_all(&self.pool)
            .await?;
        Ok(missions)
    }

    async fn get_mission(&self, id: i32) -> RepoResult<Option<Mission>> {
        let mission = sqlx::query_as::<_, Mission>(&format!(
            "SELECT {} FROM misiones WHERE id = $1",
            MISSION_COLUMNS.as_str()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(mission)
    }

    /// create_mission
    ///
    /// One bind per column, 31 in total. The info columns come from
    /// `MissionInfo::COLUMNS` so the statement always matches the struct.
    async fn create_mission(&self, input: MissionInput) -> RepoResult<Mission> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO misiones (");
        builder.push(MISSION_BASE_COLUMNS.join(", "));
        for column in MissionInfo::COLUMNS {
            builder.push(", ").push(*column);
        }
        builder.push(") VALUES (");
        {
            let mut values = builder.separated(", ");
            values
                .push_bind(input.nombre)
                .push_bind(input.ubicacion)
                .push_bind(input.objetivo)
                .push_bind(input.unidad)
                .push_bind(input.comandante)
                .push_bind(input.fecha)
                .push_bind(input.nivel_amenaza)
                .push_bind(input.estado);
            for (_, text) in input.info.entries() {
                values.push_bind(text.map(str::to_owned));
            }
        }
        builder.push(") RETURNING ").push(MISSION_COLUMNS.as_str());

        let mission = builder
            .build_query_as::<Mission>()
            .fetch_one(&self.pool)
            .await?;
        Ok(mission)
    }

    async fn update_mission(&self, id: i32, input: MissionInput) -> RepoResult<Option<Mission>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE misiones SET ");
        {
            let mut sets = builder.separated(", ");
            sets.push("nombre = ").push_bind_unseparated(input.nombre);
            sets.push("ubicacion = ").push_bind_unseparated(input.ubicacion);
            sets.push("objetivo = ").push_bind_unseparated(input.objetivo);
            sets.push("unidad = ").push_bind_unseparated(input.unidad);
            sets.push("comandante = ").push_bind_unseparated(input.comandante);
            sets.push("fecha = ").push_bind_unseparated(input.fecha);
            sets.push("nivel_amenaza = ").push_bind_unseparated(input.nivel_amenaza);
            sets.push("estado = ").push_bind_unseparated(input.estado);
            for (column, text) in input.info.entries() {
                sets.push(format!("{column} = "))
                    .push_bind_unseparated(text.map(str::to_owned));
            }
        }
        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(MISSION_COLUMNS.as_str());

        let mission = builder
            .build_query_as::<Mission>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(mission)
    }

    async fn delete_mission(&self, id: i32) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM misiones WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let created = sqlx::query_as::<_, User>(
            "INSERT INTO usuarios (nombre, contrasena, rol) VALUES ($1, $2, $3) \
             RETURNING id, nombre, contrasena, rol",
        )
        .bind(user.nombre)
        .bind(user.contrasena_hash)
        .bind(user.rol.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get_user_by_name(&self, nombre: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, nombre, contrasena, rol FROM usuarios WHERE nombre = $1",
        )
        .bind(nombre)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> RepoResult<Vec<UserSummary>> {
        let users =
            sqlx::query_as::<_, UserSummary>("SELECT id, nombre, rol FROM usuarios ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(users)
    }

    async fn set_user_role(&self, id: i32, rol: Role) -> RepoResult<Option<UserSummary>> {
        let user = sqlx::query_as::<_, UserSummary>(
            "UPDATE usuarios SET rol = $1 WHERE id = $2 RETURNING id, nombre, rol",
        )
        .bind(rol.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_user(&self, id: i32) -> RepoResult<Option<UserSummary>> {
        let user = sqlx::query_as::<_, UserSummary>(
            "DELETE FROM usuarios WHERE id = $1 RETURNING id, nombre, rol",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

// --- In-memory implementation ---

#[derive(Default)]
struct Tables {
    scps: BTreeMap<i32, Scp>,
    scp_seq: i32,
    missions: BTreeMap<i32, Mission>,
    mission_seq: i32,
    users: BTreeMap<i32, User>,
    user_seq: i32,
}

fn next_id(seq: &mut i32) -> i32 {
    *seq += 1;
    *seq
}

fn scp_from(id: i32, input: ScpInput) -> Scp {
    Scp {
        id,
        numero_scp: input.numero_scp,
        clasificacion_contencion: input.clasificacion_contencion,
        nivel_peligro: input.nivel_peligro,
        ubicacion_actual: input.ubicacion_actual,
        estado_investigacion: input.estado_investigacion,
        descripcion: input.descripcion,
    }
}

fn mission_from(id: i32, input: MissionInput) -> Mission {
    Mission {
        id,
        nombre: input.nombre,
        ubicacion: input.ubicacion,
        objetivo: input.objetivo,
        unidad: input.unidad,
        comandante: input.comandante,
        fecha: input.fecha,
        nivel_amenaza: input.nivel_amenaza,
        estado: input.estado,
        info: input.info,
    }
}

fn summary(user: &User) -> UserSummary {
    UserSummary {
        id: user.id,
        nombre: user.nombre.clone(),
        rol: user.rol.clone(),
    }
}

/// InMemoryRepository
///
/// `Repository` over process memory with the same observable behaviour as the
/// Postgres schema: serial ids, unique `numero_scp` and `nombre`, same
/// orderings. Used by the test suite and by local runs without `DATABASE_URL`.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_scps(&self) -> RepoResult<Vec<Scp>> {
        Ok(self.tables.read().await.scps.values().cloned().collect())
    }

    async fn get_scp(&self, id: i32) -> RepoResult<Option<Scp>> {
        Ok(self.tables.read().await.scps.get(&id).cloned())
    }

    async fn find_scp_by_numero(&self, numero_scp: &str) -> RepoResult<Option<Scp>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scps
            .values()
            .find(|s| s.numero_scp == numero_scp)
            .cloned())
    }

    async fn create_scp(&self, input: ScpInput) -> RepoResult<Scp> {
        let mut tables = self.tables.write().await;
        if tables.scps.values().any(|s| s.numero_scp == input.numero_scp) {
            return Err(RepoError::Conflict);
        }
        let id = next_id(&mut tables.scp_seq);
        let scp = scp_from(id, input);
        tables.scps.insert(id, scp.clone());
        Ok(scp)
    }

    async fn update_scp(&self, id: i32, input: ScpInput) -> RepoResult<Option<Scp>> {
        let mut tables = self.tables.write().await;
        if !tables.scps.contains_key(&id) {
            return Ok(None);
        }
        if tables
            .scps
            .values()
            .any(|s| s.id != id && s.numero_scp == input.numero_scp)
        {
            return Err(RepoError::Conflict);
        }
        let scp = scp_from(id, input);
        tables.scps.insert(id, scp.clone());
        Ok(Some(scp))
    }

    async fn delete_scp(&self, id: i32) -> RepoResult<bool> {
        Ok(self.tables.write().await.scps.remove(&id).is_some())
    }

    async fn list_missions(&self, nombre: Option<&str>) -> RepoResult<Vec<Mission>> {
        let needle = nombre.map(str::to_lowercase);
        let tables = self.tables.read().await;
        let mut missions: Vec<Mission> = tables
            .missions
            .values()
            .filter(|m| {
                needle
                    .as_deref()
                    .is_none_or(|n| m.nombre.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        missions.sort_by_key(|m| (m.fecha, m.id));
        Ok(missions)
    }

    async fn get_mission(&self, id: i32) -> RepoResult<Option<Mission>> {
        Ok(self.tables.read().await.missions.get(&id).cloned())
    }

    async fn create_mission(&self, input: MissionInput) -> RepoResult<Mission> {
        let mut tables = self.tables.write().await;
        let id = next_id(&mut tables.mission_seq);
        let mission = mission_from(id, input);
        tables.missions.insert(id, mission.clone());
        Ok(mission)
    }

    async fn update_mission(&self, id: i32, input: MissionInput) -> RepoResult<Option<Mission>> {
        let mut tables = self.tables.write().await;
        match tables.missions.get_mut(&id) {
            Some(slot) => {
                *slot = mission_from(id, input);
                Ok(Some(slot.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_mission(&self, id: i32) -> RepoResult<bool> {
        Ok(self.tables.write().await.missions.remove(&id).is_some())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.nombre == user.nombre) {
            return Err(RepoError::Conflict);
        }
        let id = next_id(&mut tables.user_seq);
        let created = User {
            id,
            nombre: user.nombre,
            contrasena_hash: user.contrasena_hash,
            rol: user.rol.as_str().to_string(),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_user_by_name(&self, nombre: &str) -> RepoResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.nombre == nombre).cloned())
    }

    async fn list_users(&self) -> RepoResult<Vec<UserSummary>> {
        Ok(self.tables.read().await.users.values().map(summary).collect())
    }

    async fn set_user_role(&self, id: i32, rol: Role) -> RepoResult<Option<UserSummary>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.rol = rol.as_str().to_string();
            summary(user)
        }))
    }

    async fn delete_user(&self, id: i32) -> RepoResult<Option<UserSummary>> {
        Ok(self.tables.write().await.users.remove(&id).map(|user| summary(&user)))
    }
}
