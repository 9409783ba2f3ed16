//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (platform config dir, e.g. ~/.config/codeforge/config.toml)
//! 3. Project config (.codeforge/config.toml)
//! 4. Environment variables (CODEFORGE_* prefix, `__` between sections)
//!
//! Unset credentials then fall back to the vendor variables
//! (`OPENAI_API_KEY`, ...) and the connection string to `DATABASE_URL`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{ForgeError, Result};

const PROJECT_DIR: &str = ".codeforge";

/// Output format for `config show`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Json,
    Yaml,
}

impl std::str::FromStr for ConfigFormat {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "toml" | "text" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(ForgeError::Config(format!(
                "Invalid format '{}'. Valid values: toml, json, yaml",
                s
            ))),
        }
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the current directory:
    /// defaults → global → project → env vars → vendor fallbacks
    pub fn load() -> Result<Config> {
        Self::load_from(Path::new("."))
    }

    /// Same as `load`, with the project config resolved under `root`
    pub fn load_from(root: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path(root);
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // CODEFORGE_STORAGE__DATABASE_URL -> storage.database_url
        figment = figment.merge(Env::prefixed("CODEFORGE_").split("__"));

        let mut config: Config = figment
            .extract()
            .map_err(|e| ForgeError::Config(format!("Configuration error: {}", e)))?;

        config.apply_fallbacks(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only (no env, no fallbacks)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ForgeError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Platform config directory for codeforge
    pub fn global_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "codeforge")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_config_path(root: &Path) -> PathBuf {
        root.join(PROJECT_DIR).join("config.toml")
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render a configuration with credentials redacted
    pub fn render(config: &Config, format: ConfigFormat) -> Result<String> {
        let shown = config.redacted();
        match format {
            ConfigFormat::Toml => {
                toml::to_string_pretty(&shown).map_err(|e| ForgeError::Config(e.to_string()))
            }
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(&shown)?),
            ConfigFormat::Yaml => {
                serde_yaml::to_string(&shown).map_err(|e| ForgeError::Config(e.to_string()))
            }
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a commented project config under `root`
    ///
    /// An existing file is kept unless `force` is set.
    pub fn init_project(root: &Path, force: bool) -> Result<PathBuf> {
        let project_dir = root.join(PROJECT_DIR);
        fs::create_dir_all(&project_dir)?;

        let config_path = project_dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_project_config())?;
            info!("Created project config: {}", config_path.display());
        } else {
            info!("Project config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    fn default_project_config() -> &'static str {
        r#"# codeforge project configuration
# Credentials may also come from OPENAI_API_KEY, ANTHROPIC_API_KEY,
# GEMINI_API_KEY and GROQ_API_KEY.

version = "1.0"

[chain]
# Platform backends, tried in this order after any user-selected backend
order = ["openai", "anthropic", "gemini", "groq"]
attempt_timeout_secs = 60

# [providers.openai]
# api_key = "sk-..."
# model = "gpt-4o-mini"
# endpoint = "https://api.openai.com/v1"

[storage]
# SQLite database file; leave unset to keep everything in memory.
# Falls back to DATABASE_URL.
# database_url = "codeforge.db"
probe_timeout_secs = 5
operation_timeout_secs = 10
pool_size = 8
# A write waits at most connection_timeout_secs + busy_timeout_ms before
# failing over; keep the sum below operation_timeout_secs.
connection_timeout_secs = 3
busy_timeout_ms = 5000
"#
    }
}
