//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (platform config dir) and project (.codeforge/) level
//! configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::ai::provider::{BackendKind, validate_endpoint};
use crate::constants::{chain as chain_constants, storage as store_constants};
use crate::timeout::TimeoutConfig;
use crate::types::{ForgeError, Result};

const REDACTED: &str = "[REDACTED]";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Platform credentials and overrides per backend
    pub providers: ProvidersConfig,

    /// Platform chain order and per-attempt timeout
    pub chain: ChainSettings,

    /// Durable store connection and timeouts
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            providers: ProvidersConfig::default(),
            chain: ChainSettings::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.chain.attempt_timeout_secs == 0 {
            return Err(ForgeError::Config(
                "chain.attempt_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for kind in &self.chain.order {
            if !seen.insert(kind) {
                return Err(ForgeError::Config(format!(
                    "chain.order lists '{}' more than once",
                    kind
                )));
            }
        }

        for kind in BackendKind::ALL {
            if let Some(endpoint) = &self.providers.get(kind).endpoint {
                if validate_endpoint(endpoint).is_err() {
                    return Err(ForgeError::Config(format!(
                        "providers.{}.endpoint must be an http or https URL, got '{}'",
                        kind, endpoint
                    )));
                }
            }
        }

        if self.storage.probe_timeout_secs == 0 || self.storage.operation_timeout_secs == 0 {
            return Err(ForgeError::Config(
                "storage timeouts must be greater than 0".to_string(),
            ));
        }

        if self.storage.pool_size == 0 {
            return Err(ForgeError::Config(
                "storage.pool_size must be greater than 0".to_string(),
            ));
        }

        if self.storage.connection_timeout_secs == 0 {
            return Err(ForgeError::Config(
                "storage.connection_timeout_secs must be greater than 0".to_string(),
            ));
        }

        // Writes are never abandoned by the router, so SQLite must give up first
        let operation_timeout = Duration::from_secs(self.storage.operation_timeout_secs);
        if self.storage.write_budget() >= operation_timeout {
            return Err(ForgeError::Config(format!(
                "storage.connection_timeout_secs + storage.busy_timeout_ms ({:?}) must stay below storage.operation_timeout_secs ({:?})",
                self.storage.write_budget(),
                operation_timeout
            )));
        }

        Ok(())
    }

    /// Fill unset credentials and the connection string from vendor variables
    ///
    /// `lookup` resolves a variable name; the loader passes the process
    /// environment.
    pub fn apply_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for kind in BackendKind::ALL {
            let settings = self.providers.get_mut(kind);
            if settings.api_key.is_none() {
                settings.api_key = lookup(kind.env_var()).filter(|v| !v.trim().is_empty());
            }
        }

        if self.storage.database_url.is_none() {
            self.storage.database_url =
                lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        }
    }

    /// Copy with every credential replaced, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for kind in BackendKind::ALL {
            let settings = copy.providers.get_mut(kind);
            if settings.api_key.is_some() {
                settings.api_key = Some(REDACTED.to_string());
            }
        }
        copy
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig {
            attempt: Duration::from_secs(self.chain.attempt_timeout_secs),
            probe: Duration::from_secs(self.storage.probe_timeout_secs),
            store_operation: Duration::from_secs(self.storage.operation_timeout_secs),
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub gemini: ProviderSettings,
    pub groq: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, kind: BackendKind) -> &ProviderSettings {
        match kind {
            BackendKind::OpenAi => &self.openai,
            BackendKind::Anthropic => &self.anthropic,
            BackendKind::Gemini => &self.gemini,
            BackendKind::Groq => &self.groq,
        }
    }

    pub fn get_mut(&mut self, kind: BackendKind) -> &mut ProviderSettings {
        match kind {
            BackendKind::OpenAi => &mut self.openai,
            BackendKind::Anthropic => &mut self.anthropic,
            BackendKind::Gemini => &mut self.gemini,
            BackendKind::Groq => &mut self.groq,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// API base URL override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

// =============================================================================
// Chain Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Platform priority list; kinds without a credential are skipped
    pub order: Vec<BackendKind>,

    /// Per-candidate timeout in seconds
    pub attempt_timeout_secs: u64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            order: chain_constants::DEFAULT_ORDER
                .iter()
                .filter_map(|name| name.parse().ok())
                .collect(),
            attempt_timeout_secs: chain_constants::ATTEMPT_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable store location; unset means memory only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    pub probe_timeout_secs: u64,

    /// Bounds durable reads; writes are bounded by the two waits below
    pub operation_timeout_secs: u64,

    pub pool_size: u32,

    pub connection_timeout_secs: u64,

    pub busy_timeout_ms: u64,
}

impl StorageConfig {
    /// Longest a durable write can block before SQLite reports an error
    pub fn write_budget(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
            + Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            probe_timeout_secs: store_constants::PROBE_TIMEOUT_SECS,
            operation_timeout_secs: store_constants::OPERATION_TIMEOUT_SECS,
            pool_size: store_constants::POOL_SIZE,
            connection_timeout_secs: store_constants::CONNECTION_TIMEOUT_SECS,
            busy_timeout_ms: store_constants::BUSY_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.chain.order, BackendKind::ALL.to_vec());
        assert!(config.storage.database_url.is_none());
    }

    #[test]
    fn test_validate_rejects_duplicate_order() {
        let mut config = Config::default();
        config.chain.order = vec![BackendKind::Groq, BackendKind::Groq];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.chain.attempt_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_write_waits_below_operation_timeout() {
        let mut config = Config::default();
        config.storage.operation_timeout_secs = 8;
        config.storage.connection_timeout_secs = 3;
        config.storage.busy_timeout_ms = 5000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.busy_timeout_ms"));

        config.storage.busy_timeout_ms = 4999;
        config.validate().unwrap();

        config.storage.connection_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = Config::default();
        config.providers.openai.endpoint = Some("file:///etc/passwd".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("providers.openai.endpoint"));
    }

    #[test]
    fn test_fallbacks_fill_only_missing_values() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("GROQ_API_KEY", "gsk-env"),
            ("GEMINI_API_KEY", ""),
            ("DATABASE_URL", "/tmp/forge.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.providers.groq.api_key = Some("gsk-file".into());
        config.apply_fallbacks(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.providers.openai.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.providers.groq.api_key.as_deref(), Some("gsk-file"));
        assert!(config.providers.gemini.api_key.is_none());
        assert!(config.providers.anthropic.api_key.is_none());
        assert_eq!(config.storage.database_url.as_deref(), Some("/tmp/forge.db"));
    }

    #[test]
    fn test_redacted_hides_credentials() {
        let mut config = Config::default();
        config.providers.anthropic.api_key = Some("sk-ant-secret".into());

        let shown = toml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-ant-secret"));
        assert!(shown.contains(REDACTED));
        assert!(!format!("{:?}", config).contains("sk-ant-secret"));
    }

    #[test]
    fn test_timeouts_follow_config() {
        let mut config = Config::default();
        config.chain.attempt_timeout_secs = 7;
        config.storage.probe_timeout_secs = 2;
        let timeouts = config.timeouts();
        assert_eq!(timeouts.attempt, Duration::from_secs(7));
        assert_eq!(timeouts.probe, Duration::from_secs(2));
    }
}
