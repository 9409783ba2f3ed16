//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Provider chain constants
pub mod chain {
    /// Per-attempt timeout for a single backend invocation (seconds)
    pub const ATTEMPT_TIMEOUT_SECS: u64 = 60;

    /// Maximum characters of a backend error message kept in an attempt record
    pub const MAX_ATTEMPT_MESSAGE_CHARS: usize = 500;

    /// Default platform priority order
    pub const DEFAULT_ORDER: &[&str] = &["openai", "anthropic", "gemini", "groq"];
}

/// Generation constants
pub mod generation {
    /// Sampling temperature sent to every backend
    pub const TEMPERATURE: f32 = 0.2;

    /// Maximum tokens requested from a backend
    pub const MAX_OUTPUT_TOKENS: u32 = 4096;
}

/// Storage constants
pub mod storage {
    /// Timeout for the one-time liveness probe (seconds)
    pub const PROBE_TIMEOUT_SECS: u64 = 5;

    /// Timeout for a single durable read (seconds); writes must fail on their own within it
    pub const OPERATION_TIMEOUT_SECS: u64 = 10;

    /// Default connection pool size for the durable backend
    pub const POOL_SIZE: u32 = 8;

    /// Timeout for acquiring a pooled connection (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 3;

    /// How long SQLite waits on a locked database before failing (milliseconds)
    pub const BUSY_TIMEOUT_MS: u64 = 5000;
}

/// HTTP/Network constants
pub mod network {
    /// Connection timeout for backend HTTP clients (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
}
