use crate::error::{PortalError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub portal: PortalSection,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_catalog")]
    pub catalog: String,
    #[serde(default)]
    pub server: ServerConfig,
    /// Author recorded on logs and completions when none is given.
    #[serde(default = "default_author")]
    pub default_author: String,
}

fn default_version() -> u32 {
    1
}

fn default_database() -> String {
    paths::DEFAULT_DATABASE.to_string()
}

fn default_catalog() -> String {
    paths::DEFAULT_CATALOG.to_string()
}

fn default_author() -> String {
    "operator".to_string()
}

impl Config {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            portal: PortalSection {
                name: name.into(),
                description: None,
            },
            database: default_database(),
            catalog: default_catalog(),
            server: ServerConfig::default(),
            default_author: default_author(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PortalError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::config_path(root), data.as_bytes())
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.database)
    }

    pub fn catalog_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.catalog)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.version != 1 {
            warn(
                WarnLevel::Error,
                format!("unsupported config version {}", self.version),
            );
        }
        if self.portal.name.trim().is_empty() {
            warn(WarnLevel::Warning, "portal.name is empty".to_string());
        }
        if self.database.trim().is_empty() {
            warn(WarnLevel::Error, "database path is empty".to_string());
        }
        if self.catalog.trim().is_empty() {
            warn(WarnLevel::Error, "catalog path is empty".to_string());
        }
        if self.server.port == 0 {
            warn(
                WarnLevel::Warning,
                "server.port is 0; the OS will pick a port".to_string(),
            );
        }
        if self.default_author.trim().is_empty() {
            warn(WarnLevel::Warning, "default_author is empty".to_string());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("claims-onboarding");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.portal.name, "claims-onboarding");
        assert_eq!(parsed.server.port, 8000);
        assert_eq!(parsed.database, ".onboard/portal.redb");
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("portal:\n  name: x\n").unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.default_author, "operator");
        assert_eq!(cfg.catalog, ".onboard/catalog.yaml");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_without_init_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(PortalError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("portal");
        cfg.server.port = 9100;
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.server.port, 9100);
        assert_eq!(
            loaded.database_path(dir.path()),
            dir.path().join(".onboard/portal.redb")
        );
    }

    #[test]
    fn validate_flags_problems() {
        let mut cfg = Config::new("");
        cfg.version = 2;
        cfg.server.port = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Error));
        assert_eq!(warnings.len(), 3);
    }
}
