use anyhow::{Context, Result};
use serde::Deserialize;
use validator::Validate;

// Default constants
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_SERVER_NAME: &str = "Fathom Server";
pub const DEFAULT_DATA_DIR: &str = "db";
pub const DEFAULT_TABLE_NAME: &str = "citibike_trips";
pub const DEFAULT_DATABASE_FILE: &str = "fathom.duckdb";
pub const DEFAULT_PREFETCH_INTERVAL_MS: u64 = 5;
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";
pub const DEFAULT_ENV_FILE: &str = ".env.default";

/// Variables understood by earlier deployments of the dashboard server.
pub const LEGACY_SOURCE_VAR: &str = "DEMO_DATA_SOURCE";
pub const LEGACY_PORT_VAR: &str = "SERVER_PORT";

#[derive(Debug, Deserialize, Default, Clone, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
    #[serde(default)]
    #[validate(nested)]
    pub dataset: DatasetSettings,
    #[serde(default)]
    #[validate(nested)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    #[validate(custom(function = "validate_socket_addr"))]
    pub listen_addr: String,

    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            name: default_server_name(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct DatasetSettings {
    /// `http(s)://` URL to download from, or a local parquet path.
    #[serde(default)]
    #[validate(length(min = 1), custom(function = "validate_source"))]
    pub source: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_table_name")]
    #[validate(custom(function = "validate_identifier"))]
    pub table_name: String,

    #[serde(default = "default_database_file")]
    pub database_file: String,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            source: String::new(),
            data_dir: default_data_dir(),
            table_name: default_table_name(),
            database_file: default_database_file(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct BrokerConfig {
    /// Delay between two prefetch replays sent to a freshly connected client.
    #[serde(default = "default_prefetch_interval_ms")]
    #[validate(range(min = 1))]
    pub prefetch_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            prefetch_interval_ms: default_prefetch_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,

    /// Write one JSON line per answered query to `queries.jsonl`.
    #[serde(default = "default_query_log_enabled")]
    pub query_log_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            query_log_enabled: default_query_log_enabled(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_database_file() -> String {
    DEFAULT_DATABASE_FILE.to_string()
}

fn default_prefetch_interval_ms() -> u64 {
    DEFAULT_PREFETCH_INTERVAL_MS
}

fn default_log_directory() -> String {
    DEFAULT_LOG_DIRECTORY.to_string()
}

fn default_query_log_enabled() -> bool {
    true
}

fn validate_socket_addr(addr: &str) -> Result<(), validator::ValidationError> {
    addr.parse::<std::net::SocketAddr>()
        .map(|_| ())
        .map_err(|_| validator::ValidationError::new("invalid_socket_addr"))
}

fn validate_source(source: &str) -> Result<(), validator::ValidationError> {
    if !is_uri(source) {
        return Ok(()); // Local path, checked at bootstrap
    }
    match url::Url::parse(source) {
        Ok(_) => Ok(()),
        Err(_) => Err(validator::ValidationError::new("invalid_url")),
    }
}

// The table name is interpolated into the bootstrap DDL.
fn validate_identifier(name: &str) -> Result<(), validator::ValidationError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_identifier"))
    }
}

/// Whether a dataset source should be downloaded rather than read in place.
pub fn is_uri(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Load `.env.default` without overriding variables already set.
pub fn load_env_file() {
    if dotenv::from_filename(DEFAULT_ENV_FILE).is_ok() {
        tracing::debug!("Loaded environment defaults from {}", DEFAULT_ENV_FILE);
    }
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Legacy variables only seed defaults; the file and FATHOM_* win.
        if let Ok(source) = std::env::var(LEGACY_SOURCE_VAR) {
            builder = builder
                .set_default("dataset.source", source)
                .context("Failed to apply DEMO_DATA_SOURCE")?;
        }
        if let Ok(port) = std::env::var(LEGACY_PORT_VAR) {
            builder = builder
                .set_default("server.listen_addr", format!("0.0.0.0:{}", port))
                .context("Failed to apply SERVER_PORT")?;
        }

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        // Map FATHOM_SERVER__LISTEN_ADDR to server.listen_addr, etc.
        let builder = builder.add_source(
            config::Environment::with_prefix("FATHOM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;

        Ok(app_config)
    }

    pub fn prefetch_interval(&self) -> std::time::Duration {
        self.broker.prefetch_interval()
    }
}

impl BrokerConfig {
    pub fn prefetch_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.prefetch_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for var in [
            LEGACY_SOURCE_VAR,
            LEGACY_PORT_VAR,
            "FATHOM_DATASET__SOURCE",
            "FATHOM_BROKER__PREFETCH_INTERVAL_MS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_requires_source() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let config = AppConfig {
            dataset: DatasetSettings {
                source: "data/trips.parquet".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let dataset = DatasetSettings {
            source: "trips.parquet".to_string(),
            table_name: "trips; DROP TABLE x".to_string(),
            ..Default::default()
        };
        assert!(dataset.validate().is_err());
    }

    #[test]
    fn test_prefetch_interval_must_be_positive() {
        let broker = BrokerConfig {
            prefetch_interval_ms: 0,
        };
        assert!(broker.validate().is_err());
    }

    #[test]
    fn test_is_uri() {
        assert!(is_uri("https://example.com/trips.parquet"));
        assert!(is_uri("http://example.com/trips.parquet"));
        assert!(!is_uri("/data/trips.parquet"));
        assert!(!is_uri("ftp://example.com/trips.parquet"));
    }

    #[test]
    #[serial]
    fn test_from_file_reads_yaml() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fathom.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "dataset:\n  source: /srv/trips.parquet\n  table_name: trips\nbroker:\n  prefetch_interval_ms: 20"
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.dataset.source, "/srv/trips.parquet");
        assert_eq!(config.dataset.table_name, "trips");
        assert_eq!(config.dataset.data_dir, DEFAULT_DATA_DIR);
        assert_eq!(config.prefetch_interval().as_millis(), 20);
        assert_eq!(config.server.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    #[serial]
    fn test_legacy_variables_seed_defaults() {
        clear_env();
        std::env::set_var(LEGACY_SOURCE_VAR, "https://example.com/trips.parquet");
        std::env::set_var(LEGACY_PORT_VAR, "4000");

        let config = AppConfig::from_file("does-not-exist.yaml").unwrap();
        assert_eq!(config.dataset.source, "https://example.com/trips.parquet");
        assert_eq!(config.server.listen_addr, "0.0.0.0:4000");

        // Structured variables take precedence
        std::env::set_var("FATHOM_DATASET__SOURCE", "/local/trips.parquet");
        let config = AppConfig::from_file("does-not-exist.yaml").unwrap();
        assert_eq!(config.dataset.source, "/local/trips.parquet");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_source_fails_validation() {
        clear_env();
        assert!(AppConfig::from_file("does-not-exist.yaml").is_err());
    }

    #[test]
    #[serial]
    fn test_shipped_env_defaults_carry_no_placeholder_source() {
        clear_env();
        let env_file = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join(DEFAULT_ENV_FILE);
        dotenv::from_path(&env_file).unwrap();

        // The source is left for the operator to set.
        assert!(std::env::var(LEGACY_SOURCE_VAR).is_err());
        assert_eq!(std::env::var(LEGACY_PORT_VAR).as_deref(), Ok("3001"));

        let err = AppConfig::from_file("does-not-exist.yaml").unwrap_err();
        assert!(err.to_string().contains("validation failed"));

        clear_env();
    }
}
