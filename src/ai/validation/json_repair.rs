//! JSON Extraction for Backend Responses
//!
//! Backends often wrap structured answers in markdown fences or surround
//! them with prose. Extraction handles:
//! - Markdown code fence wrapping (```json ... ```)
//! - Trailing commas before a closing bracket
//! - JSON embedded in explanatory text
//!
//! Truncated output is never completed: a response that only parses after
//! inventing closing brackets counts as malformed.

use serde_json::Value;
use tracing::debug;

use crate::types::BackendError;

/// Extract and parse JSON from a backend response
pub fn extract_json_from_response(content: &str) -> Result<Value, BackendError> {
    JsonRepairer::new()
        .parse_or_repair(content)
        .map(|(value, _)| value)
}

/// JSON cleanup strategies
#[derive(Debug, Default)]
pub struct JsonRepairer;

impl JsonRepairer {
    pub fn new() -> Self {
        Self
    }

    /// Parse JSON, attempting cleanup if the initial parse fails
    ///
    /// Returns (Value, was_repaired)
    pub fn parse_or_repair(&self, raw: &str) -> Result<(Value, bool), BackendError> {
        let cleaned = self.preprocess(raw);
        if cleaned.is_empty() {
            return Err(BackendError::invalid_response("Empty response body"));
        }

        if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
            return Ok((value, false));
        }

        debug!("Initial JSON parse failed, attempting cleanup");

        let without_commas = fix_trailing_commas(&cleaned);
        if let Ok(value) = serde_json::from_str::<Value>(&without_commas) {
            return Ok((value, true));
        }

        if let Some(extracted) = extract_json_from_mixed(&without_commas)
            && let Ok(value) = serde_json::from_str::<Value>(&extracted)
        {
            debug!("JSON extracted from mixed content");
            return Ok((value, true));
        }

        Err(BackendError::invalid_response(format!(
            "Response is not valid JSON. Content preview: {}...",
            cleaned.chars().take(200).collect::<String>()
        )))
    }

    fn preprocess(&self, raw: &str) -> String {
        let s = raw.trim().trim_start_matches('\u{feff}');
        strip_code_fences(s).trim().to_string()
    }
}

/// Strip a surrounding markdown code fence
fn strip_code_fences(s: &str) -> &str {
    let mut result = s;

    if result.starts_with("```")
        && let Some(first_newline) = result.find('\n')
    {
        result = &result[first_newline + 1..];
        if let Some(stripped) = result.trim_end().strip_suffix("```") {
            result = stripped;
        }
    }

    result
}

/// Remove commas directly before `]` or `}` outside of strings
fn fix_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &ch) in chars.iter().enumerate() {
        if escape {
            escape = false;
            result.push(ch);
            continue;
        }

        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            ',' if !in_string => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some(']') | Some('}')) {
                    continue;
                }
            }
            _ => {}
        }

        result.push(ch);
    }

    result
}

/// Extract the first balanced JSON object or array from mixed content
fn extract_json_from_mixed(s: &str) -> Option<String> {
    let start = s.find(['{', '['])?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in s[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(s[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    #[test]
    fn test_parse_valid_json() {
        let (_, repaired) = JsonRepairer::new()
            .parse_or_repair(r#"[{"key": "value"}]"#)
            .unwrap();
        assert!(!repaired);
    }

    #[test]
    fn test_strip_code_fences() {
        let input = "```json\n[{\"key\": \"value\"}]\n```";
        let value = extract_json_from_response(input).unwrap();
        assert_eq!(value[0]["key"], "value");
    }

    #[test]
    fn test_fix_trailing_comma() {
        let input = r#"[{"path": "a.rs"},]"#;
        let (value, repaired) = JsonRepairer::new().parse_or_repair(input).unwrap();
        assert!(repaired);
        assert_eq!(value.as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_comma_inside_string_is_kept() {
        let input = r#"[{"text": "a, ]"},]"#;
        let value = extract_json_from_response(input).unwrap();
        assert_eq!(value[0]["text"], "a, ]");
    }

    #[test]
    fn test_extract_from_mixed() {
        let input = "Here is the breakdown:\n[{\"lineNumber\": 1}]\nHope this helps!";
        let value = extract_json_from_response(input).unwrap();
        assert_eq!(value[0]["lineNumber"], 1);
    }

    #[test]
    fn test_truncated_json_is_rejected() {
        let err = extract_json_from_response(r#"[{"lineNumber": 1, "code": "x""#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_truncated_array_keeps_no_partial_elements() {
        let input = r#"[{"lineNumber": 1, "code": "a", "explanation": "b"}, {"lineNumber": 2,"#;
        let err = extract_json_from_response(input).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);

        let err = extract_json_from_response(r#"[{"lineNumber":1,"code":"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_empty_body_is_rejected() {
        let err = extract_json_from_response("   ").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }
}
