//! Explain Command
//!
//! Line-by-line explanation of a source file.
//!
//! Usage:
//!   codeforge explain <file> [--language python] [--json]

use std::path::PathBuf;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, UserBackendArgs, detect_language};
use crate::types::Result;

pub struct ExplainOptions {
    pub file: PathBuf,
    pub language: Option<String>,
    pub user_backend: UserBackendArgs,
    pub json: bool,
}

pub async fn run(options: ExplainOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let chain = ctx.provider_chain()?;

    let code = std::fs::read_to_string(&options.file)?;
    let language = options
        .language
        .as_deref()
        .or_else(|| detect_language(&options.file));
    let user_backends = options.user_backend.into_descriptors()?;

    let success = chain.explain(&code, language, &user_backends).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&success)?);
        return Ok(());
    }

    let output = Output::new();
    output.attempts(&success.attempts);
    output.header(&options.file.display().to_string());

    for line in &success.value {
        output.explanation(line);
    }

    output.success(&format!(
        "Explained {} lines with {}",
        success.value.len(),
        success.backend_used
    ));
    Ok(())
}
