//! Ordered Fallback Provider Chain
//!
//! Tries interchangeable backends one after another until one succeeds.
//!
//! ## Strategy
//!
//! 1. Candidates are the caller's backends in caller order, then the
//!    platform backends that have a credential configured
//! 2. Each candidate is invoked with the same prepared prompt under its own
//!    timeout
//! 3. The raw text is interpreted (plain text, or an explanation list)
//! 4. The first interpreted success wins; every failure becomes an
//!    `AttemptRecord` and the next candidate is tried
//!
//! There is no racing, no retry of the same candidate and no skipping based
//! on past failures: the outcome depends only on the candidate order and on
//! what each backend answers.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::{BackendDescriptor, BackendKind, BackendRegistry};
use crate::ai::explain::{LineExplanation, parse_explanations};
use crate::ai::prompt::{PreparedPrompt, TaskMode};
use crate::ai::validation::require_text;
use crate::config::Config;
use crate::constants::chain as chain_constants;
use crate::timeout::with_attempt_timeout;
use crate::types::{BackendError, ErrorKind, Result};

// =============================================================================
// Request
// =============================================================================

/// One generation request, alive for a single chain invocation
#[derive(Debug)]
pub struct GenerationRequest {
    prompt: String,
    mode: TaskMode,
    language: Option<String>,
    user_backends: Vec<BackendDescriptor>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, mode: TaskMode) -> Self {
        Self {
            prompt: prompt.into(),
            mode,
            language: None,
            user_backends: Vec::new(),
        }
    }

    /// Caller-selected backends, tried before any platform backend
    pub fn with_user_backends(mut self, backends: Vec<BackendDescriptor>) -> Self {
        self.user_backends = backends;
        self
    }

    /// Target language hint passed to the backend
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    fn prepare(&self) -> PreparedPrompt {
        match &self.language {
            Some(language) => PreparedPrompt::new(
                self.mode,
                format!("Language: {}\n\n{}", language, self.prompt),
            ),
            None => PreparedPrompt::new(self.mode, self.prompt.clone()),
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// One failed candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub backend_kind: BackendKind,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl AttemptRecord {
    fn from_error(kind: BackendKind, error: &BackendError) -> Self {
        let error_kind = match error.kind {
            ErrorKind::NotFound | ErrorKind::Unavailable => ErrorKind::Unknown,
            other => other,
        };
        Self {
            backend_kind: kind,
            error_kind,
            message: truncate_message(&error.message, chain_constants::MAX_ATTEMPT_MESSAGE_CHARS),
        }
    }
}

impl std::fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}: {})", self.backend_kind, self.error_kind, self.message)
    }
}

/// Winning value plus the attempts that failed before it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSuccess<T> {
    pub value: T,
    pub backend_used: BackendKind,
    pub attempts: Vec<AttemptRecord>,
}

/// Why a chain invocation produced no result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationFailure {
    #[error(
        "No AI backend is configured. Configure an API key for openai, anthropic, gemini or groq."
    )]
    NoBackendConfigured,

    #[error("{}", summarize_attempts(.attempts))]
    AllFailed { attempts: Vec<AttemptRecord> },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl OrchestrationFailure {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::AllFailed { attempts } => attempts,
            _ => &[],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoBackendConfigured => ErrorKind::Unavailable,
            Self::AllFailed { attempts } => attempts
                .last()
                .map(|a| a.error_kind)
                .unwrap_or(ErrorKind::Unknown),
            Self::InvalidRequest { .. } => ErrorKind::Unknown,
        }
    }
}

fn summarize_attempts(attempts: &[AttemptRecord]) -> String {
    let tried = attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("All {} AI backend attempts failed: {}", attempts.len(), tried)
}

pub type GenerationOutcome = std::result::Result<ChainSuccess<String>, OrchestrationFailure>;
pub type ExplainOutcome =
    std::result::Result<ChainSuccess<Vec<LineExplanation>>, OrchestrationFailure>;

// =============================================================================
// Platform Backends
// =============================================================================

/// Platform-configured candidates, already filtered to configured credentials
#[derive(Debug, Default)]
pub struct PlatformBackends {
    descriptors: Vec<BackendDescriptor>,
}

impl PlatformBackends {
    pub fn new(descriptors: Vec<BackendDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Walk the configured order and keep kinds that have a credential
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut descriptors = Vec::new();

        for kind in &config.chain.order {
            let settings = config.providers.get(*kind);
            let Some(api_key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty())
            else {
                debug!(backend = %kind, "No credential configured, skipping");
                continue;
            };

            let mut descriptor = BackendDescriptor::new(*kind, api_key);
            if let Some(model) = &settings.model {
                descriptor = descriptor.with_model(model.clone());
            }
            if let Some(endpoint) = &settings.endpoint {
                descriptor = descriptor.with_endpoint(endpoint)?;
            }
            descriptors.push(descriptor);
        }

        Ok(Self { descriptors })
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.descriptors.iter().map(|d| d.kind()).collect()
    }

    fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.iter()
    }
}

// =============================================================================
// Provider Chain
// =============================================================================

/// Deterministic first-success chain over backend descriptors
pub struct ProviderChain {
    registry: BackendRegistry,
    platform: PlatformBackends,
    attempt_timeout: Duration,
}

impl ProviderChain {
    pub fn new(registry: BackendRegistry, platform: PlatformBackends) -> Self {
        Self {
            registry,
            platform,
            attempt_timeout: Duration::from_secs(chain_constants::ATTEMPT_TIMEOUT_SECS),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn platform(&self) -> &PlatformBackends {
        &self.platform
    }

    /// Complete a generation request with the first backend that answers
    #[instrument(skip(self, request), fields(mode = %request.mode()))]
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        if request.prompt().trim().is_empty() {
            return Err(OrchestrationFailure::InvalidRequest {
                reason: "prompt must not be empty".to_string(),
            });
        }

        let prompt = request.prepare();
        self.first_success(&prompt, &request.user_backends, require_text)
            .await
    }

    /// Explain code line by line with the first backend whose answer parses
    #[instrument(skip(self, code, user_backends), fields(lines = code.lines().count()))]
    pub async fn explain(
        &self,
        code: &str,
        language: Option<&str>,
        user_backends: &[BackendDescriptor],
    ) -> ExplainOutcome {
        if code.trim().is_empty() {
            return Err(OrchestrationFailure::InvalidRequest {
                reason: "code must not be empty".to_string(),
            });
        }

        let prompt = PreparedPrompt::explain(code, language);
        self.first_success(&prompt, user_backends, |raw| parse_explanations(&raw))
            .await
    }

    async fn first_success<T, F>(
        &self,
        prompt: &PreparedPrompt,
        user_backends: &[BackendDescriptor],
        interpret: F,
    ) -> std::result::Result<ChainSuccess<T>, OrchestrationFailure>
    where
        F: Fn(String) -> std::result::Result<T, BackendError>,
    {
        let candidates: Vec<&BackendDescriptor> =
            user_backends.iter().chain(self.platform.iter()).collect();

        if candidates.is_empty() {
            warn!("No backend configured for request");
            return Err(OrchestrationFailure::NoBackendConfigured);
        }

        debug!(
            candidates = candidates.len(),
            user = user_backends.len(),
            "Starting provider chain"
        );

        let mut attempts = Vec::new();

        for (position, descriptor) in candidates.into_iter().enumerate() {
            let kind = descriptor.kind();

            let Some(backend) = self.registry.get(kind) else {
                warn!(backend = %kind, "No implementation registered for backend");
                attempts.push(AttemptRecord::from_error(
                    kind,
                    &BackendError::new(
                        ErrorKind::Unknown,
                        format!("No implementation registered for {}", kind),
                    ),
                ));
                continue;
            };

            debug!(backend = %kind, position, "Invoking backend");

            let result = with_attempt_timeout(self.attempt_timeout, backend.invoke(prompt, descriptor))
                .await
                .and_then(&interpret);

            match result {
                Ok(value) => {
                    info!(
                        backend = %kind,
                        failed_before = attempts.len(),
                        "Backend succeeded"
                    );
                    return Ok(ChainSuccess {
                        value,
                        backend_used: kind,
                        attempts,
                    });
                }
                Err(error) => {
                    warn!(
                        backend = %kind,
                        error_kind = %error.kind,
                        "Backend attempt failed: {}",
                        error.message
                    );
                    attempts.push(AttemptRecord::from_error(kind, &error));
                }
            }
        }

        Err(OrchestrationFailure::AllFailed { attempts })
    }
}

/// Truncate to `max_chars` characters, marking the cut
fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
