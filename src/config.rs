use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crashreport::Error;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) identifier: Option<String>,
    #[serde(default)]
    pub(crate) collector_url: Option<String>,
    #[serde(default)]
    pub(crate) storage_dir: Option<PathBuf>,
    #[serde(default)]
    pub(crate) package_name: Option<String>,
    #[serde(default)]
    pub(crate) ask_before_sending: Option<bool>,
    #[serde(default)]
    pub(crate) keep_age_hours: Option<u64>,
    #[serde(default)]
    pub(crate) user_id: Option<String>,
    #[serde(default)]
    pub(crate) debug: bool,
}

impl Config {
    /// First readable config file wins; no file at all is not an error.
    pub(crate) fn load() -> Result<Self, Error> {
        for path in Self::get_config_paths() {
            if let Ok(content) = fs::read_to_string(&path) {
                let config = Self::parse(&path, &content)?;
                tracing::debug!(path = %path.display(), "loaded config");
                return Ok(config);
            }
        }
        Ok(Self::default())
    }

    pub(crate) fn load_from(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. XDG config: ~/.config/crashreport/config.toml
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("crashreport").join("config.toml"));
        }

        // 2. Platform config dir (e.g. ~/Library/Application Support on macOS)
        if let Some(config_dir) = dirs::config_dir() {
            let platform_path = config_dir.join("crashreport").join("config.toml");
            if !paths.contains(&platform_path) {
                paths.push(platform_path);
            }
        }

        // 3. Home directory: ~/.crashreport.toml
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".crashreport.toml"));
        }

        paths
    }
}
