//! Backend Response Validation
//!
//! Turns raw backend text into structured values. Anything that cannot be
//! interpreted is reported as an `InvalidResponse` backend error so the
//! provider chain can move on to the next candidate.

mod json_repair;

pub use json_repair::{JsonRepairer, extract_json_from_response};

use crate::types::BackendError;

/// Reject empty or whitespace-only text
pub fn require_text(raw: String) -> Result<String, BackendError> {
    if raw.trim().is_empty() {
        Err(BackendError::invalid_response("Backend returned empty text"))
    } else {
        Ok(raw)
    }
}
