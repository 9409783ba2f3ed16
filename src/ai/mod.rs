//! AI Integration Layer
//!
//! Deterministic fallback across interchangeable AI backends for code
//! generation and line-by-line explanation.

pub mod explain;
pub mod prompt;
pub mod provider;
pub mod validation;

pub use explain::{LineExplanation, RiskLevel, parse_explanations};
pub use prompt::{PreparedPrompt, PromptBuilder, TaskMode};
pub use provider::{
    AttemptRecord, Backend, BackendDescriptor, BackendKind, BackendRegistry, ChainSuccess,
    ExplainOutcome, GenerationOutcome, GenerationRequest, OrchestrationFailure, PlatformBackends,
    ProviderChain, SharedBackend,
};
pub use validation::{JsonRepairer, extract_json_from_response, require_text};
