//! Store Command
//!
//! Inspect the durable store the way the server sees it.
//!
//! Usage:
//!   codeforge store probe [--json]

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::Result;

/// Probe the configured durable store once and report the cached health
pub async fn probe(json: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let store = ctx.store()?;
    let health = store.check_health().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    Output::new().health(ctx.config.storage.database_url.as_deref(), &health);
    Ok(())
}
