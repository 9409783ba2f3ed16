//! OpenAI Chat Completions Backend
//!
//! Also serves OpenAI-compatible APIs (Groq) with a different default base.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Backend, BackendDescriptor, BackendKind};
use crate::ai::prompt::PreparedPrompt;
use crate::constants::generation;
use crate::types::{BackendError, ErrorClassifier};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Chat completions client for one OpenAI-compatible vendor
pub struct OpenAiBackend {
    kind: BackendKind,
    default_base: &'static str,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("kind", &self.kind)
            .field("default_base", &self.default_base)
            .finish()
    }
}

impl OpenAiBackend {
    pub fn openai(client: reqwest::Client) -> Self {
        Self {
            kind: BackendKind::OpenAi,
            default_base: OPENAI_API_BASE,
            client,
        }
    }

    pub fn groq(client: reqwest::Client) -> Self {
        Self {
            kind: BackendKind::Groq,
            default_base: GROQ_API_BASE,
            client,
        }
    }

    fn build_request(&self, prompt: &PreparedPrompt, model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            temperature: generation::TEMPERATURE,
            max_tokens: generation::MAX_OUTPUT_TOKENS,
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn invoke(
        &self,
        prompt: &PreparedPrompt,
        descriptor: &BackendDescriptor,
    ) -> Result<String, BackendError> {
        let name = self.kind.as_str();
        let url = format!("{}/chat/completions", descriptor.endpoint_or(self.default_base));
        let request = self.build_request(prompt, descriptor.model());

        debug!(backend = name, model = descriptor.model(), "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(descriptor.credential().expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, name))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("API error ({}): {}", status, body),
                name,
            ));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, name))?;

        extract_content(body).map_err(|e| e.backend(name))
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}

fn extract_content(body: ChatCompletionResponse) -> Result<String, BackendError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| BackendError::invalid_response("No content in chat completion response"))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
