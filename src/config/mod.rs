//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (platform config dir)
//! 3. Project config (.codeforge/config.toml)
//! 4. Environment variables (CODEFORGE_*)
//! 5. Vendor credential variables and DATABASE_URL for unset values

mod loader;
mod types;

pub use loader::{ConfigFormat, ConfigLoader};
pub use types::*;
