//! Configuration loading.
//!
//! Precedence, highest first:
//! 1. Command-line flags (applied by the caller)
//! 2. Environment variables, including a `.env` file in the working directory
//! 3. User config file (`<config dir>/kioku/config.toml`)
//! 4. Defaults

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding `terms.csv` and `history.json`.
    pub data_dir: PathBuf,
    pub port: u16,
    pub tutor: TutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TutorConfig {
    pub api_key: Option<String>,
    pub model: String,
    /// Base URL of the chat-completions API, without the endpoint path.
    pub base_url: String,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            port: 3000,
            tutor: TutorConfig::default(),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("kioku"))
        .unwrap_or_else(|| PathBuf::from(".kioku"))
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kioku").join("config.toml"))
}

impl Config {
    /// Load with the full precedence chain. An unreadable user config file
    /// is reported; a missing one is not.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match user_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Config::default(),
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;
        toml::from_str(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("KIOKU_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = var("KIOKU_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.port = p,
                Err(_) => log::warn!("ignoring invalid KIOKU_PORT={port}"),
            }
        }
        if let Some(key) = var("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.tutor.api_key = Some(key);
        }
        if let Some(model) = var("OPENAI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.tutor.model = model;
        }
        if let Some(url) = var("OPENAI_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.tutor.base_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            port = 8080

            [tutor]
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.tutor.model, "gpt-4o-mini");
        assert_eq!(config.tutor.base_url, "https://api.openai.com/v1");
        assert_eq!(config.data_dir, default_data_dir());
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("KIOKU_DATA_DIR", "/srv/kioku"),
            ("KIOKU_PORT", "4000"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", ""),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.data_dir, PathBuf::from("/srv/kioku"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.tutor.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.tutor.model, "gpt-3.5-turbo");
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|k| (k == "KIOKU_PORT").then(|| "http".to_string()));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(Error::Config(_))));
    }
}
