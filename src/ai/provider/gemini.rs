//! Google Gemini Backend
//!
//! Uses `models/{model}:generateContent` with the system preamble passed as
//! `systemInstruction`.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Backend, BackendDescriptor};
use crate::ai::prompt::PreparedPrompt;
use crate::constants::generation;
use crate::types::{BackendError, ErrorClassifier};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const NAME: &str = "gemini";

#[derive(Debug)]
pub struct GeminiBackend {
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(prompt: &PreparedPrompt) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(prompt.system.clone()),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.user.clone()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: generation::TEMPERATURE,
                max_output_tokens: generation::MAX_OUTPUT_TOKENS,
            },
        }
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn invoke(
        &self,
        prompt: &PreparedPrompt,
        descriptor: &BackendDescriptor,
    ) -> Result<String, BackendError> {
        let url = format!(
            "{}/models/{}:generateContent",
            descriptor.endpoint_or(DEFAULT_API_BASE),
            descriptor.model()
        );

        debug!(backend = NAME, model = descriptor.model(), "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", descriptor.credential().expose_secret())
            .json(&Self::build_request(prompt))
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, NAME))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("API error ({}): {}", status, body),
                NAME,
            ));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, NAME))?;

        extract_text(body).map_err(|e| e.backend(NAME))
    }

    fn name(&self) -> &str {
        NAME
    }
}

fn extract_text(body: GenerateContentResponse) -> Result<String, BackendError> {
    let text: String = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(BackendError::invalid_response(
            "No text candidate in generateContent response",
        ));
    }
    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::prompt::TaskMode;

    #[test]
    fn test_request_uses_camel_case_fields() {
        let prompt = PreparedPrompt::new(TaskMode::Test, "sum(a, b)");
        let json = serde_json::to_value(GeminiBackend::build_request(&prompt)).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], prompt.system);
        assert_eq!(json["contents"][0]["role"], "user");
        assert!(json["generationConfig"]["maxOutputTokens"].is_number());
        assert!(json["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_extract_text_from_first_candidate() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"def f():"},{"text":" pass"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "def f(): pass");
    }

    #[test]
    fn test_blocked_candidate_is_invalid_response() {
        let body: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(extract_text(body).is_err());

        let body: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(extract_text(body).is_err());
    }
}
