//! CLI Common Utilities
//!
//! Shared context for command handlers: loaded configuration, the provider
//! chain and the resilient store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::{BackendDescriptor, BackendKind, BackendRegistry, PlatformBackends, ProviderChain};
use crate::config::{Config, ConfigLoader};
use crate::constants::network;
use crate::storage::ResilientStore;
use crate::types::{ForgeError, Result};

/// Command execution context
pub struct CommandContext {
    /// Merged configuration for the project root
    pub config: Config,
    /// Directory the command runs in
    pub project_root: PathBuf,
}

impl CommandContext {
    pub fn load() -> Result<Self> {
        let project_root = std::env::current_dir()?;
        let config = ConfigLoader::load_from(&project_root)?;

        Ok(Self {
            config,
            project_root,
        })
    }

    /// Chain over every built-in HTTP backend, with platform credentials from config
    pub fn provider_chain(&self) -> Result<ProviderChain> {
        let registry =
            BackendRegistry::http(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))?;
        let platform = PlatformBackends::from_config(&self.config)?;

        Ok(ProviderChain::new(registry, platform)
            .with_attempt_timeout(self.config.timeouts().attempt))
    }

    pub fn store(&self) -> Result<ResilientStore> {
        Ok(ResilientStore::from_config(&self.config)?)
    }
}

/// Caller-selected backend given on the command line
#[derive(Debug, Clone, Default)]
pub struct UserBackendArgs {
    pub backend: Option<BackendKind>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl UserBackendArgs {
    /// Zero or one user descriptor; a backend without a key is rejected
    pub fn into_descriptors(self) -> Result<Vec<BackendDescriptor>> {
        match (self.backend, self.api_key) {
            (None, None) => Ok(Vec::new()),
            (Some(kind), Some(key)) if !key.trim().is_empty() => {
                let mut descriptor = BackendDescriptor::new(kind, key);
                if let Some(model) = self.model {
                    descriptor = descriptor.with_model(model);
                }
                Ok(vec![descriptor])
            }
            (Some(kind), _) => Err(ForgeError::InvalidRequest(format!(
                "--backend {} requires --api-key",
                kind
            ))),
            (None, Some(_)) => Err(ForgeError::InvalidRequest(
                "--api-key requires --backend".to_string(),
            )),
        }
    }
}

/// Language hint from a file extension
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    let language = match extension.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "swift" => "swift",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        _ => return None,
    };
    Some(language)
}
