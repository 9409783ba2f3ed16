//! Line-by-line code explanations
//!
//! Parses the explain-mode answer of a backend into `LineExplanation`
//! records. Accepted shapes are a bare JSON array or an object with an
//! `explanations` array, optionally wrapped in a code fence or prose.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::extract_json_from_response;
use crate::types::BackendError;

/// Risk classification attached to a single line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Explanation of one source line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineExplanation {
    /// 1-based line number
    pub line_number: u32,
    pub code: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_issue: Option<String>,
}

#[derive(Deserialize)]
struct Wrapped {
    explanations: Vec<LineExplanation>,
}

/// Parse raw backend text into explanations
///
/// Fails with `InvalidResponse` on unparsable JSON, a wrong shape, an empty
/// list, or any line number below 1.
pub fn parse_explanations(raw: &str) -> Result<Vec<LineExplanation>, BackendError> {
    let value = extract_json_from_response(raw)?;

    let explanations = match value {
        Value::Array(_) => serde_json::from_value::<Vec<LineExplanation>>(value),
        Value::Object(_) => serde_json::from_value::<Wrapped>(value).map(|w| w.explanations),
        other => {
            return Err(BackendError::invalid_response(format!(
                "Expected a JSON array of explanations, got {}",
                json_type(&other)
            )));
        }
    }
    .map_err(|e| BackendError::invalid_response(format!("Malformed explanation list: {}", e)))?;

    if explanations.is_empty() {
        return Err(BackendError::invalid_response(
            "Backend returned an empty explanation list",
        ));
    }

    if let Some(bad) = explanations.iter().find(|e| e.line_number == 0) {
        return Err(BackendError::invalid_response(format!(
            "Line numbers start at 1, got 0 for {:?}",
            bad.code
        )));
    }

    Ok(explanations)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    #[test]
    fn test_parse_bare_array() {
        let raw = r#"[{"lineNumber":1,"code":"console.log(1)","explanation":"Logs 1"}]"#;
        let parsed = parse_explanations(raw).unwrap();
        assert_eq!(
            parsed,
            vec![LineExplanation {
                line_number: 1,
                code: "console.log(1)".to_string(),
                explanation: "Logs 1".to_string(),
                risk_level: None,
                performance_note: None,
                security_issue: None,
            }]
        );
    }

    #[test]
    fn test_parse_wrapped_and_fenced() {
        let raw = "```json\n{\"explanations\": [{\"lineNumber\": 2, \"code\": \"eval(x)\", \"explanation\": \"Evaluates x\", \"riskLevel\": \"high\", \"securityIssue\": \"Arbitrary code execution\"}]}\n```";
        let parsed = parse_explanations(raw).unwrap();
        assert_eq!(parsed[0].line_number, 2);
        assert_eq!(parsed[0].risk_level, Some(RiskLevel::High));
        assert_eq!(
            parsed[0].security_issue.as_deref(),
            Some("Arbitrary code execution")
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let line = LineExplanation {
            line_number: 3,
            code: "x".into(),
            explanation: "y".into(),
            risk_level: Some(RiskLevel::Low),
            performance_note: None,
            security_issue: None,
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["lineNumber"], 3);
        assert_eq!(json["riskLevel"], "low");
        assert!(json.get("performanceNote").is_none());
    }

    #[test]
    fn test_rejects_malformed() {
        let err = parse_explanations("Sure! Here is what it does: it logs").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let err = parse_explanations(r#"[{"line": 1}]"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);

        let err = parse_explanations("42").unwrap_err();
        assert!(err.message.contains("a number"));
    }

    #[test]
    fn test_rejects_zero_line_number_and_empty_list() {
        let zero = r#"[{"lineNumber":0,"code":"x","explanation":"y"}]"#;
        assert!(parse_explanations(zero).is_err());
        assert!(parse_explanations("[]").is_err());
    }

    #[test]
    fn test_rejects_unknown_risk_level() {
        let raw = r#"[{"lineNumber":1,"code":"x","explanation":"y","riskLevel":"critical"}]"#;
        assert!(parse_explanations(raw).is_err());
    }
}
