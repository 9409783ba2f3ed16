//! codeforge - Resilient AI Code Assistant Core
//!
//! Orchestration of interchangeable AI backends with deterministic fallback,
//! plus a persistence layer that keeps serving from memory when the durable
//! store is unreachable.
//!
//! ## Core Features
//!
//! - **Provider Chain**: user-selected backends first, then platform backends
//!   in configured order; first success wins, failures are collected
//! - **Line Explanations**: tolerant parsing of explain-mode answers
//! - **Resilient Store**: one-time health probe, per-call fallback to memory,
//!   outage writes kept visible
//!
//! ## Quick Start
//!
//! ```ignore
//! use codeforge::{ConfigLoader, GenerationRequest, ProviderChain, TaskMode};
//!
//! let config = ConfigLoader::load()?;
//! let chain = ProviderChain::new(
//!     BackendRegistry::http(Duration::from_secs(10))?,
//!     PlatformBackends::from_config(&config)?,
//! );
//! let request = GenerationRequest::new("parse a CSV line", TaskMode::Generate);
//! let success = chain.generate(&request).await?;
//! println!("{} answered: {}", success.backend_used, success.value);
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: backends, provider chain, prompts, explanation parsing
//! - [`storage`]: entity store contract, SQLite and in-memory stores, resilient router
//! - [`config`]: layered configuration
//! - [`cli`]: command handlers for the `codeforge` binary

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod storage;
pub mod timeout;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigFormat, ConfigLoader};

// Error Types
pub use types::error::{
    BackendError, ErrorClassifier, ErrorKind, ForgeError, Result, ResultExt, StoreError,
    StoreResult,
};

// Timeout
pub use timeout::{TimeoutConfig, with_attempt_timeout, with_store_timeout};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    AttemptRecord, Backend, BackendDescriptor, BackendKind, BackendRegistry, ChainSuccess,
    GenerationRequest, LineExplanation, OrchestrationFailure, PlatformBackends, ProviderChain,
    RiskLevel, TaskMode,
};

// =============================================================================
// Storage Re-exports
// =============================================================================

pub use storage::{
    DurableBackend, EntityStore, HealthState, MemoryStore, ResilientStore, SqliteStore,
    StoreHealth,
};
