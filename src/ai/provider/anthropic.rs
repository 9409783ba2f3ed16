//! Anthropic Messages API Backend

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Backend, BackendDescriptor};
use crate::ai::prompt::PreparedPrompt;
use crate::constants::generation;
use crate::types::{BackendError, ErrorClassifier};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const NAME: &str = "anthropic";

#[derive(Debug)]
pub struct AnthropicBackend {
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(prompt: &PreparedPrompt, model: &str) -> MessagesRequest {
        MessagesRequest {
            model: model.to_string(),
            max_tokens: generation::MAX_OUTPUT_TOKENS,
            temperature: generation::TEMPERATURE,
            system: prompt.system.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.user.clone(),
            }],
        }
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn invoke(
        &self,
        prompt: &PreparedPrompt,
        descriptor: &BackendDescriptor,
    ) -> Result<String, BackendError> {
        let url = format!("{}/messages", descriptor.endpoint_or(DEFAULT_API_BASE));
        let request = Self::build_request(prompt, descriptor.model());

        debug!(backend = NAME, model = descriptor.model(), "Sending messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", descriptor.credential().expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&request)
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

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, NAME))?;

        extract_text(body).map_err(|e| e.backend(NAME))
    }

    fn name(&self) -> &str {
        NAME
    }
}

/// Concatenate all text blocks of the reply
fn extract_text(body: MessagesResponse) -> Result<String, BackendError> {
    let text: String = body
        .content
        .into_iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text)
        .collect();

    if text.trim().is_empty() {
        return Err(BackendError::invalid_response(
            "No text content in messages response",
        ));
    }
    Ok(text)
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::prompt::TaskMode;

    #[test]
    fn test_system_prompt_goes_to_top_level_field() {
        let prompt = PreparedPrompt::new(TaskMode::Boilerplate, "a rust cli");
        let json = serde_json::to_value(AnthropicBackend::build_request(&prompt, "m")).unwrap();
        assert_eq!(json["system"], prompt.system);
        assert_eq!(json["messages"].as_array().map(|m| m.len()), Some(1));
        assert_eq!(json["messages"][0]["content"], "a rust cli");
    }

    #[test]
    fn test_extract_text_joins_text_blocks() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"fn a"},{"type":"tool_use","id":"x"},{"type":"text","text":"() {}"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "fn a() {}");
    }

    #[test]
    fn test_extract_text_rejects_empty() {
        let body: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert!(extract_text(body).is_err());
    }
}
