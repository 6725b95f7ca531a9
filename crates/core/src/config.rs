use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub bus: BusConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `MATCHFLOW_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("MATCHFLOW_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            postgres: PostgresConfig::from_env_profiled(p),
            bus: BusConfig::from_env_profiled(p),
            orchestrator: OrchestratorConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  postgres:     host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!("  bus:          frontend={}, backend={}", self.bus.frontend, self.bus.backend);
        tracing::info!(
            "  orchestrator: worker={}, dedup_cache={}, max_in_flight={}",
            self.orchestrator.worker_name,
            self.orchestrator.dedup_cache_capacity,
            self.orchestrator.max_in_flight
        );
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "matchflow"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Message bus ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker endpoint publishers connect to (`ipc://...` or `tcp://host:port`).
    pub frontend: String,
    /// Broker endpoint subscribers connect to.
    pub backend: String,
}

impl BusConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            frontend: profiled_env_or(p, "BUS_FRONTEND", "tcp://127.0.0.1:5555"),
            backend: profiled_env_or(p, "BUS_BACKEND", "tcp://127.0.0.1:5556"),
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Name used in health heartbeats and logs.
    pub worker_name: String,
    /// Capacity of the in-process dedup LRU.
    pub dedup_cache_capacity: usize,
    /// Maximum number of events handled concurrently.
    pub max_in_flight: usize,
    pub health_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl OrchestratorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            worker_name: profiled_env_or(p, "WORKER_NAME", "phase-orchestrator"),
            dedup_cache_capacity: profiled_env_u32(p, "DEDUP_CACHE_CAPACITY", 10_000).max(1) as usize,
            max_in_flight: profiled_env_u32(p, "MAX_IN_FLIGHT", 64).max(1) as usize,
            health_interval_secs: profiled_env_u64(p, "HEALTH_INTERVAL_SECS", 30).max(1),
            shutdown_timeout_secs: profiled_env_u64(p, "SHUTDOWN_TIMEOUT_SECS", 10),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_name: "phase-orchestrator".into(),
            dedup_cache_capacity: 10_000,
            max_in_flight: 64,
            health_interval_secs: 30,
            shutdown_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_prefixed_key_wins() {
        // Unique key names keep this test independent of the process env.
        env::set_var("MFTEST_PG_HOST", "db.prod.internal");
        let pg = PostgresConfig::from_env_profiled("MFTEST");
        assert_eq!(pg.host, "db.prod.internal");
        env::remove_var("MFTEST_PG_HOST");
    }

    #[test]
    fn connection_string_defaults_user() {
        let pg = PostgresConfig {
            host: "localhost".into(),
            port: 5432,
            database: "matchflow".into(),
            username: None,
            password: None,
            ssl_mode: "disable".into(),
            max_connections: 5,
        };
        assert_eq!(
            pg.connection_string(),
            "postgres://postgres:@localhost:5432/matchflow?sslmode=disable"
        );
        assert!(!pg.is_configured());
    }

    #[test]
    fn orchestrator_defaults_are_positive() {
        let cfg = OrchestratorConfig::default();
        assert!(cfg.dedup_cache_capacity > 0);
        assert!(cfg.max_in_flight > 0);
    }
}
