use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::ConnectionConfig;
use crate::driver::Dialect;

/// Contents of `config.toml`.
///
/// ```toml
/// log_level = "debug"
/// dialect = "postgresql"
/// server_version = "8.4"
///
/// [[connections]]
/// name = "local"
/// host = "localhost"
/// port = 5432
/// database = "postgres"
/// username = "postgres"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// `tracing` level for the CLI; `warn` when unset.
    #[serde(default)]
    pub log_level: Option<String>,
    /// Target used when the command line names none.
    #[serde(default)]
    pub dialect: Option<Dialect>,
    #[serde(default)]
    pub server_version: Option<String>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl Settings {
    pub fn get_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sqldom")
            .join("config.toml")
    }

    /// Settings at `path`, or at the default location. A missing default
    /// file gives empty settings; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::get_config_path(), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        let settings = Settings::parse(
            r#"
            log_level = "debug"
            dialect = "sqlserver"
            server_version = "10.50"

            [[connections]]
            name = "Warehouse"
            host = "db.internal"
            port = 5433
            database = "dw"
            username = "report"
            ssl_mode = "VerifyFull"
            "#,
        )
        .unwrap();
        assert_eq!(settings.dialect, Some(Dialect::SqlServer));
        assert_eq!(settings.server_version.as_deref(), Some("10.50"));
        let conn = settings.connection("warehouse").unwrap();
        assert_eq!(conn.port, 5433);
        assert!(settings.connection("missing").is_none());
    }

    #[test]
    fn test_empty_settings() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        assert!(Settings::parse(r#"dialect = "db2""#).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/sqldom.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_path() {
        let path = Settings::get_config_path();
        assert!(path.ends_with("sqldom/config.toml"));
    }
}
