use std::env;

/// Fallback secrets, only ever used outside production.
pub const LOCAL_SESSION_SECRET: &str = "local-session-secret-change-me";
pub const LOCAL_ADMIN_CODE: &str = "UNSC-ADMIN-LOCAL";

/// Accepted session lifetimes, in hours (one hour to thirty days).
pub const SESSION_TTL_HOURS_RANGE: std::ops::RangeInclusive<i64> = 1..=720;

/// AppConfig
///
/// Immutable configuration, loaded once at startup and shared with handlers
/// through `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Production makes every secret mandatory.
    pub env: Env,
    // Postgres connection string. `None` selects the in-memory repository (local only).
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    // HMAC secret signing session tokens.
    pub session_secret: String,
    // Shared code that promotes a new registration to admin.
    pub admin_code: String,
    pub session_ttl_hours: i64,
    // Directory served as the router fallback (the browser client).
    pub static_dir: String,
}

/// Env
///
/// Runtime context. Decides whether missing secrets fall back to local
/// defaults or abort startup.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Non-panicking values for test scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            db_max_connections: 5,
            bind_addr: "127.0.0.1:3000".to_string(),
            session_secret: LOCAL_SESSION_SECRET.to_string(),
            admin_code: LOCAL_ADMIN_CODE.to_string(),
            session_ttl_hours: 8,
            static_dir: "public".to_string(),
        }
    }
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {key} has an invalid value: {raw}")),
        Err(_) => default,
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables. It fails fast.
    ///
    /// # Panics
    /// In production, panics if `DATABASE_URL`, `SESSION_SECRET` or
    /// `ADMIN_CODE` is missing. In any environment, panics if a numeric
    /// variable cannot be parsed or `SESSION_TTL_HOURS` is outside 1..=720.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let (db_url, session_secret, admin_code) = match env {
            Env::Production => (
                Some(
                    env::var("DATABASE_URL")
                        .expect("FATAL: DATABASE_URL must be set in production."),
                ),
                env::var("SESSION_SECRET")
                    .expect("FATAL: SESSION_SECRET must be set in production."),
                env::var("ADMIN_CODE").expect("FATAL: ADMIN_CODE must be set in production."),
            ),
            Env::Local => (
                env::var("DATABASE_URL").ok(),
                env::var("SESSION_SECRET").unwrap_or_else(|_| LOCAL_SESSION_SECRET.to_string()),
                env::var("ADMIN_CODE").unwrap_or_else(|_| LOCAL_ADMIN_CODE.to_string()),
            ),
        };

        let session_ttl_hours: i64 = parsed_or("SESSION_TTL_HOURS", 8);
        if !SESSION_TTL_HOURS_RANGE.contains(&session_ttl_hours) {
            panic!("FATAL: SESSION_TTL_HOURS has an invalid value: {session_ttl_hours}");
        }

        Self {
            env,
            db_url,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 5),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            session_secret,
            admin_code,
            session_ttl_hours,
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "public".to_string()),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}
