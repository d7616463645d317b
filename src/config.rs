use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/fix-clients.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the primary (read-write) SQLite database.
    #[serde(default = "default_primary_path")]
    pub primary_path: PathBuf,
    /// Path to the limit store, opened read-only.
    #[serde(default = "default_limit_path")]
    pub limit_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Spreadsheet template the client table is written into.
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            primary_path: default_primary_path(),
            limit_path: default_limit_path(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            template_path: default_template_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_primary_path() -> PathBuf {
    PathBuf::from("data/fix_clients.db")
}
fn default_limit_path() -> PathBuf {
    PathBuf::from("data/limit.db")
}
fn default_template_path() -> PathBuf {
    PathBuf::from("templates/FIXClientTable.xlsx")
}
fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl AppConfig {
    /// Read the TOML file at `path`; a missing file means all defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_example_config() {
        let toml_str = r#"
[database]
primary_path = "/srv/fcm/clients.db"
limit_path = "/srv/limit/limit.db"

[export]
template_path = "/srv/fcm/FIXClientTable.xlsx"

[server]
bind_addr = "127.0.0.1:8080"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.database.primary_path, PathBuf::from("/srv/fcm/clients.db"));
        assert_eq!(config.database.limit_path, PathBuf::from("/srv/limit/limit.db"));
        assert_eq!(config.export.template_path, PathBuf::from("/srv/fcm/FIXClientTable.xlsx"));
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str("[server]\nbind_addr = \"127.0.0.1:9000\"\n").unwrap();

        assert_eq!(config.database, DatabaseConfig::default());
        assert_eq!(config.export.template_path, PathBuf::from("templates/FIXClientTable.xlsx"));
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[database\nprimary_path = 1").unwrap();

        assert!(AppConfig::load(&path).is_err());
    }
}
