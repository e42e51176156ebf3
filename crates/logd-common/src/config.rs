//! ---
//! logd_section: "01-core-functionality"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Shared primitives and utilities for the logd runtime."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Errors raised while assembling the runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_service_name() -> String {
    "logger-service".to_owned()
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_owned()]
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_file_store_path() -> PathBuf {
    PathBuf::from("target/logd/logs.jsonl")
}

fn default_mongo_host() -> String {
    "localhost".to_owned()
}

fn default_mongo_port() -> u16 {
    27017
}

fn default_auth_source() -> String {
    "admin".to_owned()
}

fn default_mongo_database() -> String {
    "logDB".to_owned()
}

fn default_mongo_collection() -> String {
    "logs".to_owned()
}

fn default_queue_name() -> String {
    "log_queue".to_owned()
}

fn default_amqp_host() -> String {
    "localhost".to_owned()
}

fn default_amqp_port() -> u16 {
    5672
}

fn default_amqp_user() -> String {
    "guest".to_owned()
}

fn default_amqp_password() -> Secret {
    Secret::new("guest")
}

fn default_vhost() -> String {
    "/".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

/// Primary configuration object for the logd runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults were used.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "LOGD_CONFIG";
    pub const DEFAULT_CONFIG_PATH: &'static str = "configs/logd.toml";

    /// Build the effective configuration.
    ///
    /// An explicit path must exist. Otherwise `LOGD_CONFIG` and then
    /// `configs/logd.toml` are consulted, falling back to defaults. Process
    /// environment overrides are applied last and the result is validated.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedAppConfig, ConfigError> {
        let source = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => match std::env::var(Self::ENV_CONFIG_PATH) {
                Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
                _ => {
                    let fallback = PathBuf::from(Self::DEFAULT_CONFIG_PATH);
                    fallback.exists().then_some(fallback)
                }
            },
        };

        let mut config = match &source {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(LoadedAppConfig { config, source })
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply the service's well-known environment variables on top of the
    /// file configuration. `lookup` returns the value of a variable, if set.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        if let Some(name) = get("LOGGER_SERVICE_NAME") {
            self.service.name = name;
        }
        if let Some(port) = get("LOGGER_SERVICE_PORT") {
            self.service.listen.set_port(parse_port("LOGGER_SERVICE_PORT", port)?);
        }

        let mongo = &mut self.store.mongodb;
        if let Some(user) = get("MONGO_INITDB_ROOT_USERNAME") {
            mongo.username = Some(user);
        }
        if let Some(password) = get("MONGO_INITDB_ROOT_PASSWORD") {
            mongo.password = Some(Secret::new(password));
        }
        if let Some(host) = get("MONGO_HOST") {
            mongo.host = host;
        }
        if let Some(port) = get("MONGO_PORT") {
            mongo.port = parse_port("MONGO_PORT", port)?;
        }
        if let Some(db) = get("MONGO_DB_NAME") {
            mongo.uri_database = Some(db);
        }

        let amqp = &mut self.queue.amqp;
        if let Some(user) = get("RABBITMQ_USER") {
            amqp.username = user;
        }
        if let Some(password) = get("RABBITMQ_PASS") {
            amqp.password = Secret::new(password);
        }
        if let Some(host) = get("RABBITMQ_HOST") {
            amqp.host = host;
        }
        if let Some(port) = get("RABBITMQ_PORT") {
            amqp.port = parse_port("RABBITMQ_PORT", port)?;
        }
        if let Some(queue) = get("RABBITMQ_QUEUE") {
            self.queue.name = queue;
        }
        Ok(())
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::Invalid("service.name must not be empty".into()));
        }
        if self.store.operation_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "store.operation_timeout must be greater than zero".into(),
            ));
        }
        if self.store.backend == StoreBackend::Mongodb {
            let mongo = &self.store.mongodb;
            if mongo.database.trim().is_empty() || mongo.collection.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "store.mongodb database and collection must not be empty".into(),
                ));
            }
            if mongo.password.is_some() && mongo.username.is_none() {
                return Err(ConfigError::Invalid(
                    "store.mongodb password given without a username".into(),
                ));
            }
        }
        if self.queue.backend != QueueBackend::Disabled && self.queue.name.trim().is_empty() {
            return Err(ConfigError::Invalid("queue.name must not be empty".into()));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: AppConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

/// String that never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"***\"")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Origins allowed by the CORS layer.
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_allowed_origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    #[default]
    Mongodb,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Upper bound on every individual store call.
    #[serde(default = "default_operation_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub operation_timeout: Duration,
    #[serde(default)]
    pub file: FileStoreConfig,
    #[serde(default)]
    pub mongodb: MongoConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            operation_timeout: default_operation_timeout(),
            file: FileStoreConfig::default(),
            mongodb: MongoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    #[serde(default = "default_file_store_path")]
    pub path: PathBuf,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            path: default_file_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    #[serde(default = "default_mongo_host")]
    pub host: String,
    #[serde(default = "default_mongo_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default = "default_auth_source")]
    pub auth_source: String,
    /// Database named in the connection string (`MONGO_DB_NAME`).
    #[serde(default)]
    pub uri_database: Option<String>,
    /// Database holding the log collection.
    #[serde(default = "default_mongo_database")]
    pub database: String,
    #[serde(default = "default_mongo_collection")]
    pub collection: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: default_mongo_host(),
            port: default_mongo_port(),
            username: None,
            password: None,
            auth_source: default_auth_source(),
            uri_database: None,
            database: default_mongo_database(),
            collection: default_mongo_collection(),
        }
    }
}

impl MongoConfig {
    /// Connection string without credentials; those are attached separately.
    pub fn connection_uri(&self) -> String {
        format!(
            "mongodb://{}:{}/{}",
            self.host,
            self.port,
            self.uri_database.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Amqp,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    /// Durable queue consumed with acknowledgment at receipt.
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default)]
    pub amqp: AmqpConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            name: default_queue_name(),
            amqp: AmqpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmqpConfig {
    #[serde(default = "default_amqp_host")]
    pub host: String,
    #[serde(default = "default_amqp_port")]
    pub port: u16,
    #[serde(default = "default_amqp_user")]
    pub username: String,
    #[serde(default = "default_amqp_password")]
    pub password: Secret,
    #[serde(default = "default_vhost")]
    pub vhost: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: default_amqp_host(),
            port: default_amqp_port(),
            username: default_amqp_user(),
            password: default_amqp_password(),
            vhost: default_vhost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: LogFormat::default(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_legacy_service() {
        let config = AppConfig::default();
        assert_eq!(config.service.name, "logger-service");
        assert_eq!(config.store.backend, StoreBackend::Mongodb);
        assert_eq!(config.store.mongodb.database, "logDB");
        assert_eq!(config.store.mongodb.collection, "logs");
        assert_eq!(config.queue.name, "log_queue");
        assert_eq!(config.store.operation_timeout, Duration::from_secs(5));
        config.validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let config: AppConfig = r#"
            [service]
            listen = "127.0.0.1:9000"

            [store]
            backend = "file"
            operation_timeout = 2

            [store.file]
            path = "/tmp/logd.jsonl"

            [queue]
            backend = "disabled"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.service.listen.port(), 9000);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.store.operation_timeout, Duration::from_secs(2));
        assert_eq!(config.store.file.path, PathBuf::from("/tmp/logd.jsonl"));
        assert_eq!(config.queue.backend, QueueBackend::Disabled);
        assert_eq!(config.service.name, "logger-service");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env(&[
                ("LOGGER_SERVICE_PORT", "8081"),
                ("LOGGER_SERVICE_NAME", "logger"),
                ("MONGO_INITDB_ROOT_USERNAME", "root"),
                ("MONGO_INITDB_ROOT_PASSWORD", "hunter2"),
                ("MONGO_HOST", "mongo"),
                ("MONGO_PORT", "27018"),
                ("MONGO_DB_NAME", "logs"),
                ("RABBITMQ_HOST", "rabbit"),
                ("RABBITMQ_QUEUE", "audit_queue"),
                ("RABBITMQ_PASS", ""),
            ]))
            .unwrap();
        assert_eq!(config.service.listen.port(), 8081);
        assert_eq!(config.service.name, "logger");
        assert_eq!(config.store.mongodb.host, "mongo");
        assert_eq!(config.store.mongodb.port, 27018);
        assert_eq!(config.store.mongodb.username.as_deref(), Some("root"));
        assert_eq!(
            config.store.mongodb.password.as_ref().map(Secret::expose),
            Some("hunter2")
        );
        assert_eq!(config.store.mongodb.connection_uri(), "mongodb://mongo:27018/logs");
        assert_eq!(config.queue.amqp.host, "rabbit");
        assert_eq!(config.queue.name, "audit_queue");
        // empty values are ignored
        assert_eq!(config.queue.amqp.password.expose(), "guest");
    }

    #[test]
    fn invalid_port_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(env(&[("MONGO_PORT", "mongo")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "MONGO_PORT", .. }));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.store.operation_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.queue.name = " ".into();
        assert!(config.validate().is_err());
        config.queue.backend = QueueBackend::Disabled;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn secrets_are_redacted() {
        let mut config = AppConfig::default();
        config.queue.amqp.password = Secret::new("top-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logd.toml");
        std::fs::write(&path, "[store]\nbackend = \"memory\"\n").unwrap();
        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn load_reports_missing_explicit_file() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/logd.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
