use serde::Deserialize;
use std::env;

use crate::offline::CachePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub offline: OfflineConfig,
    pub logging: LoggingConfig,
}

/// SQL Server connection settings, injected from the environment
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: Option<String>,
    pub encrypt: bool,
    pub trust_cert: bool,
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("encrypt", &self.encrypt)
            .field("trust_cert", &self.trust_cert)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfflineConfig {
    pub host: String,
    pub port: u16,
    pub upstream_url: String,
    pub cache_path: String,
    pub cache_prefix: String,
    pub cache_version: Option<String>,
    pub policy: CachePolicy,
    pub api_path_pattern: String,
    pub precache: Vec<String>,
    pub skip_waiting: bool,
    pub claim_clients: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file first so its values count as environment
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3002)?
            .set_default("server.static_dir", "./static")?
            .set_default("database.host", "localhost")?
            .set_default("database.port", 1433)?
            .set_default("database.name", "database")?
            .set_default("database.user", "user")?
            .set_default("database.encrypt", true)?
            .set_default("database.trust_cert", false)?
            .set_default("database.connect_timeout_secs", 30)?
            .set_default("offline.host", "127.0.0.1")?
            .set_default("offline.port", 3003)?
            .set_default("offline.upstream_url", "http://127.0.0.1:3002")?
            .set_default("offline.cache_path", "./offline-cache.db")?
            .set_default("offline.cache_prefix", "pagcorp")?
            .set_default("offline.policy", "network-first")?
            .set_default("offline.api_path_pattern", "/api/")?
            .set_default("offline.precache", default_precache())?
            .set_default("offline.skip_waiting", true)?
            .set_default("offline.claim_clients", true)?
            .set_default("logging.level", "info")?;

        // Load from environment variables
        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3002))?;
        }

        if let Ok(static_dir) = env::var("STATIC_DIR") {
            builder = builder.set_override("server.static_dir", static_dir)?;
        }

        if let Ok(server) = env::var("SQL_SERVER") {
            builder = builder.set_override("database.host", server)?;
        }

        if let Ok(port) = env::var("SQL_PORT") {
            builder = builder.set_override("database.port", port.parse::<u16>().unwrap_or(1433))?;
        }

        if let Ok(database) = env::var("SQL_DATABASE") {
            builder = builder.set_override("database.name", database)?;
        }

        if let Ok(user) = env::var("SQL_USERNAME") {
            builder = builder.set_override("database.user", user)?;
        }

        if let Ok(password) = env::var("SQL_PASSWORD") {
            builder = builder.set_override("database.password", password)?;
        }

        if let Ok(encrypt) = env::var("SQL_ENCRYPT") {
            builder = builder.set_override("database.encrypt", parse_flag(&encrypt, true))?;
        }

        if let Ok(trust_cert) = env::var("SQL_TRUST_CERT") {
            builder = builder.set_override("database.trust_cert", parse_flag(&trust_cert, false))?;
        }

        if let Ok(timeout) = env::var("SQL_CONNECT_TIMEOUT") {
            builder = builder.set_override(
                "database.connect_timeout_secs",
                timeout.parse::<u64>().unwrap_or(30),
            )?;
        }

        if let Ok(host) = env::var("OFFLINE_HOST") {
            builder = builder.set_override("offline.host", host)?;
        }

        if let Ok(port) = env::var("OFFLINE_PORT") {
            builder = builder.set_override("offline.port", port.parse::<u16>().unwrap_or(3003))?;
        }

        if let Ok(upstream) = env::var("OFFLINE_UPSTREAM_URL") {
            builder = builder.set_override("offline.upstream_url", upstream)?;
        }

        if let Ok(path) = env::var("OFFLINE_CACHE_PATH") {
            builder = builder.set_override("offline.cache_path", path)?;
        }

        if let Ok(prefix) = env::var("OFFLINE_CACHE_PREFIX") {
            builder = builder.set_override("offline.cache_prefix", prefix)?;
        }

        if let Ok(version) = env::var("OFFLINE_CACHE_VERSION") {
            builder = builder.set_override("offline.cache_version", version)?;
        }

        if let Ok(policy) = env::var("OFFLINE_POLICY") {
            builder = builder.set_override("offline.policy", policy)?;
        }

        if let Ok(pattern) = env::var("OFFLINE_API_PATTERN") {
            builder = builder.set_override("offline.api_path_pattern", pattern)?;
        }

        if let Ok(precache) = env::var("OFFLINE_PRECACHE") {
            let urls: Vec<String> = precache
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();
            builder = builder.set_override("offline.precache", urls)?;
        }

        if let Ok(skip_waiting) = env::var("OFFLINE_SKIP_WAITING") {
            builder = builder.set_override("offline.skip_waiting", parse_flag(&skip_waiting, true))?;
        }

        if let Ok(claim) = env::var("OFFLINE_CLAIM_CLIENTS") {
            builder = builder.set_override("offline.claim_clients", parse_flag(&claim, true))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn offline_address(&self) -> String {
        format!("{}:{}", self.offline.host, self.offline.port)
    }
}

fn default_precache() -> Vec<String> {
    [
        "/dashboard-pedidos-real.html",
        "/manifest.json",
        "/icon-192x192.png",
        "/icon-512x512.png",
    ]
    .iter()
    .map(|url| url.to_string())
    .collect()
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}
