//! AI Backend Abstraction
//!
//! Every backend exposes one capability: turn a `PreparedPrompt` into text
//! for a given `BackendDescriptor`. Concrete backends are selected by
//! `BackendKind` through a `BackendRegistry` lookup table.
//!
//! ## Modules
//!
//! - `chain`: Ordered first-success fallback across candidates
//! - `openai`: OpenAI and OpenAI-compatible chat completions (OpenAI, Groq)
//! - `anthropic`: Anthropic Messages API
//! - `gemini`: Google Gemini `generateContent`

mod anthropic;
mod chain;
mod gemini;
mod openai;

pub use anthropic::AnthropicBackend;
pub use chain::{
    AttemptRecord, ChainSuccess, ExplainOutcome, GenerationOutcome,
    GenerationRequest, OrchestrationFailure, PlatformBackends, ProviderChain,
};
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::prompt::PreparedPrompt;
use crate::types::{BackendError, ForgeError, Result};

// =============================================================================
// Backend Kind
// =============================================================================

/// Identifier of an interchangeable AI backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    Groq,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::OpenAi,
        BackendKind::Anthropic,
        BackendKind::Gemini,
        BackendKind::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Gemini => "gemini",
            BackendKind::Groq => "groq",
        }
    }

    /// Vendor environment variable holding the platform credential
    pub fn env_var(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "OPENAI_API_KEY",
            BackendKind::Anthropic => "ANTHROPIC_API_KEY",
            BackendKind::Gemini => "GEMINI_API_KEY",
            BackendKind::Groq => "GROQ_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "gpt-4o-mini",
            BackendKind::Anthropic => "claude-3-5-haiku-latest",
            BackendKind::Gemini => "gemini-1.5-flash",
            BackendKind::Groq => "llama-3.1-8b-instant",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "anthropic" => Ok(BackendKind::Anthropic),
            "gemini" => Ok(BackendKind::Gemini),
            "groq" => Ok(BackendKind::Groq),
            _ => Err(format!(
                "Unknown backend: {}. Supported: openai, anthropic, gemini, groq",
                s
            )),
        }
    }
}

// =============================================================================
// Backend Descriptor
// =============================================================================

/// One backend to try: kind, credential and optional overrides
///
/// The credential is kept in a `SecretString` and redacted from debug output.
pub struct BackendDescriptor {
    kind: BackendKind,
    credential: SecretString,
    model: Option<String>,
    endpoint_override: Option<String>,
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("kind", &self.kind)
            .field("credential", &"[REDACTED]")
            .field("model", &self.model)
            .field("endpoint_override", &self.endpoint_override)
            .finish()
    }
}

impl BackendDescriptor {
    pub fn new(kind: BackendKind, credential: impl Into<String>) -> Self {
        Self {
            kind,
            credential: SecretString::from(credential.into()),
            model: None,
            endpoint_override: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the API base URL (must be http or https)
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.endpoint_override = Some(validate_endpoint(endpoint)?);
        Ok(self)
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn credential(&self) -> &SecretString {
        &self.credential
    }

    /// Configured model, or the kind's default
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }

    /// Configured endpoint, or `default`
    pub fn endpoint_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.endpoint_override.as_deref().unwrap_or(default)
    }
}

/// Validate endpoint URL (http/https only), trailing slash removed
pub fn validate_endpoint(endpoint: &str) -> Result<String> {
    let url = url::Url::parse(endpoint)
        .map_err(|e| ForgeError::Config(format!("Invalid endpoint URL '{}': {}", endpoint, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ForgeError::Config(format!(
            "Endpoint must use http or https scheme, got: {}",
            url.scheme()
        )));
    }

    let mut result = url.to_string();
    if result.ends_with('/') {
        result.pop();
    }
    Ok(result)
}

// =============================================================================
// Backend Capability
// =============================================================================

/// The single capability every AI backend implements
#[async_trait]
pub trait Backend: Send + Sync {
    /// Produce text for the prompt using the descriptor's credential and model
    ///
    /// Provider-specific failures must already be normalized into
    /// `BackendError`.
    async fn invoke(
        &self,
        prompt: &PreparedPrompt,
        descriptor: &BackendDescriptor,
    ) -> std::result::Result<String, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

pub type SharedBackend = Arc<dyn Backend>;

/// Lookup table from backend kind to implementation
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, SharedBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in HTTP backend sharing one client
    pub fn http(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::new()
            .register(
                BackendKind::OpenAi,
                Arc::new(OpenAiBackend::openai(client.clone())),
            )
            .register(
                BackendKind::Groq,
                Arc::new(OpenAiBackend::groq(client.clone())),
            )
            .register(
                BackendKind::Anthropic,
                Arc::new(AnthropicBackend::new(client.clone())),
            )
            .register(BackendKind::Gemini, Arc::new(GeminiBackend::new(client))))
    }

    pub fn register(mut self, kind: BackendKind, backend: SharedBackend) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&SharedBackend> {
        self.backends.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse_and_display() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
        }
        assert_eq!("OpenAI".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert!("cohere".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_serde_names() {
        let json = serde_json::to_string(&BackendKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        let kind: BackendKind = serde_json::from_str("\"groq\"").unwrap();
        assert_eq!(kind, BackendKind::Groq);
    }

    #[test]
    fn test_descriptor_debug_redacts_credential() {
        let descriptor = BackendDescriptor::new(BackendKind::Anthropic, "sk-secret-123");
        let debug = format!("{:?}", descriptor);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret-123"));
    }

    #[test]
    fn test_descriptor_defaults_and_overrides() {
        let plain = BackendDescriptor::new(BackendKind::Gemini, "k");
        assert_eq!(plain.model(), "gemini-1.5-flash");
        assert_eq!(plain.endpoint_or("https://default"), "https://default");

        let custom = BackendDescriptor::new(BackendKind::OpenAi, "k")
            .with_model("gpt-4o")
            .with_endpoint("http://localhost:8080/v1/")
            .unwrap();
        assert_eq!(custom.model(), "gpt-4o");
        assert_eq!(custom.endpoint_or("unused"), "http://localhost:8080/v1");
    }

    #[test]
    fn test_validate_endpoint_rejects_other_schemes() {
        assert!(validate_endpoint("ftp://example.com").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }

    #[test]
    fn test_http_registry_covers_every_kind() {
        let registry = BackendRegistry::http(Duration::from_secs(1)).unwrap();
        for kind in BackendKind::ALL {
            assert!(registry.get(kind).is_some(), "missing {}", kind);
        }
    }
}
