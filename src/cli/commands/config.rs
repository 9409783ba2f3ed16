//! Config Command
//!
//! Manage codeforge configuration.
//!
//! Usage:
//!   codeforge config show [-f json]
//!   codeforge config path
//!   codeforge config init [--force]

use crate::cli::ui::Output;
use crate::config::{ConfigFormat, ConfigLoader};
use crate::types::Result;

/// Show the merged effective configuration, credentials redacted
pub fn show(format: &str) -> Result<()> {
    let format: ConfigFormat = format.parse()?;
    let root = std::env::current_dir()?;
    let config = ConfigLoader::load_from(&root)?;
    print!("{}", ConfigLoader::render(&config, format)?);
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    let root = std::env::current_dir()?;
    let project = ConfigLoader::project_config_path(&root);

    match ConfigLoader::global_config_path() {
        Some(global) => println!("Global:  {}{}", global.display(), exists_marker(&global)),
        None => println!("Global:  (no config directory on this platform)"),
    }
    println!("Project: {}{}", project.display(), exists_marker(&project));
    Ok(())
}

fn exists_marker(path: &std::path::Path) -> &'static str {
    if path.exists() { "" } else { " (not found)" }
}

/// Initialize project configuration
pub fn init(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;
    let path = ConfigLoader::init_project(&root, force)?;
    Output::new().success("Initialized project configuration");
    println!("  Config: {}", path.display());
    Ok(())
}
