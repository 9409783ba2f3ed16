//! Generate Command
//!
//! Run one generation request through the provider chain.
//!
//! Usage:
//!   codeforge generate "<prompt>" [--mode test] [--language rust]
//!   codeforge generate "<prompt>" --backend groq --api-key gsk-...

use crate::ai::{GenerationRequest, TaskMode};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, UserBackendArgs};
use crate::types::Result;

pub struct GenerateOptions {
    pub prompt: String,
    pub mode: TaskMode,
    pub language: Option<String>,
    pub user_backend: UserBackendArgs,
    pub json: bool,
}

pub async fn run(options: GenerateOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let chain = ctx.provider_chain()?;

    let mut request = GenerationRequest::new(options.prompt, options.mode)
        .with_user_backends(options.user_backend.into_descriptors()?);
    if let Some(language) = options.language {
        request = request.with_language(language);
    }

    let success = chain.generate(&request).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&success)?);
        return Ok(());
    }

    let output = Output::new();
    output.attempts(&success.attempts);
    println!("{}", success.value);
    output.success(&format!("Generated with {}", success.backend_used));
    Ok(())
}
