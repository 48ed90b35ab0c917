use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use tracing::{debug, info};
use crate::domain::{
    error::IngestionError,
    models::{ChunkFailurePolicy, DEFAULT_CHUNK_SIZE},
};

static PLAIN_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub import: ImportConfig,
    pub server: ServerConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub csv_path: PathBuf,
    pub table_name: String,
    pub chunk_size: usize,
    pub on_chunk_failure: ChunkFailurePolicy,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data.csv"),
            table_name: "loan_data".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            on_chunk_failure: ChunkFailurePolicy::Continue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// When false, uploads are transformed and counted but nothing is written.
    pub persist: bool,
    pub table_name: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            persist: false,
            table_name: "uim_assurance_data".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the optional YAML file, then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, IngestionError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => {
                debug!("No config file given, starting from defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, IngestionError> {
        info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)
            .map_err(|e| IngestionError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, IngestionError> {
        serde_yaml::from_str(text).map_err(|e| IngestionError::Config(e.to_string()))
    }

    /// Applies `DB_*`, `CSV_PATH`, `TABLE_NAME`, `CHUNK_SIZE`, `BIND_ADDR` and `PERSIST_UPLOADS`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), IngestionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            self.database.port = parse_var("DB_PORT", &v)?;
        }
        if let Some(v) = lookup("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            self.database.database = v;
        }
        if let Some(v) = lookup("CSV_PATH") {
            self.import.csv_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TABLE_NAME") {
            self.import.table_name = v;
        }
        if let Some(v) = lookup("CHUNK_SIZE") {
            self.import.chunk_size = parse_var("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("PERSIST_UPLOADS") {
            self.upload.persist = parse_var("PERSIST_UPLOADS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), IngestionError> {
        if self.import.chunk_size == 0 {
            return Err(IngestionError::Config("chunk_size must be greater than zero".to_string()));
        }
        for table in [&self.import.table_name, &self.upload.table_name] {
            if !PLAIN_IDENT.is_match(table) {
                return Err(IngestionError::Config(format!("invalid table name '{}'", table)));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, IngestionError> {
    value
        .trim()
        .parse()
        .map_err(|_| IngestionError::Config(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_loader_script() {
        let config = AppConfig::default();
        assert_eq!(config.import.chunk_size, 50_000);
        assert_eq!(config.import.table_name, "loan_data");
        assert_eq!(config.database.port, 5432);
        assert!(!config.upload.persist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_fills_missing_sections_with_defaults() {
        let config = AppConfig::from_yaml_str(
            "import:\n  csv_path: /data/report.csv\n  chunk_size: 1000\n  on_chunk_failure: abort\n",
        )
        .unwrap();
        assert_eq!(config.import.csv_path, PathBuf::from("/data/report.csv"));
        assert_eq!(config.import.chunk_size, 1000);
        assert_eq!(config.import.on_chunk_failure, ChunkFailurePolicy::Abort);
        assert_eq!(config.import.table_name, "loan_data");
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn example_config_parses() {
        let config = AppConfig::from_yaml_str(include_str!("../config.example.yaml")).unwrap();
        assert_eq!(config.upload.table_name, "uim_assurance_data");
        assert_eq!(config.server.max_upload_bytes, 52_428_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("CHUNK_SIZE", "250"),
            ("PERSIST_UPLOADS", "true"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.import.chunk_size, 250);
        assert!(config.upload.persist);
    }

    #[test]
    fn bad_override_is_a_config_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|k| (k == "DB_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, IngestionError::Config(_)));
    }

    #[test]
    fn rejects_zero_chunk_and_unsafe_table() {
        let mut config = AppConfig::default();
        config.import.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.import.table_name = "loans; DROP TABLE x".to_string();
        assert!(config.validate().is_err());
    }
}
