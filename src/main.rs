use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codeforge::ai::{BackendKind, TaskMode};
use codeforge::cli::{Output, UserBackendArgs};
use codeforge::cli::commands::{explain::ExplainOptions, generate::GenerateOptions};

#[derive(Parser)]
#[command(name = "codeforge")]
#[command(
    version,
    about = "AI code assistant with backend fallback and a degradable store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[arg(long, short, global = true, conflicts_with = "verbose", help = "Only log errors")]
    quiet: bool,
}

#[derive(clap::Args)]
struct BackendArgs {
    #[arg(long, help = "Try this backend before the platform chain")]
    backend: Option<BackendKind>,
    #[arg(long, env = "CODEFORGE_USER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, help = "Model override for --backend")]
    model: Option<String>,
}

impl From<BackendArgs> for UserBackendArgs {
    fn from(args: BackendArgs) -> Self {
        Self {
            backend: args.backend,
            api_key: args.api_key,
            model: args.model,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code, tests, docs, refactors or boilerplate from a prompt
    Generate {
        prompt: String,
        #[arg(
            long,
            short,
            default_value = "generate",
            help = "Task mode: generate, test, document, refactor, boilerplate"
        )]
        mode: TaskMode,
        #[arg(long, short)]
        language: Option<String>,
        #[command(flatten)]
        backend: BackendArgs,
        #[arg(long, help = "Print the full result as JSON")]
        json: bool,
    },

    /// Explain a source file line by line
    Explain {
        file: PathBuf,
        #[arg(long, short, help = "Language hint (detected from the extension by default)")]
        language: Option<String>,
        #[command(flatten)]
        backend: BackendArgs,
        #[arg(long)]
        json: bool,
    },

    /// Inspect the durable store
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Probe the durable store once and report its health
    Probe {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json, yaml"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize project configuration
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n{}", console::style("━━━ PANIC ━━━").red().bold());
        eprintln!("{}", console::style("codeforge encountered an unexpected error:").red());
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "{}",
                console::style(format!(
                    "Location: {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                ))
                .dim()
            );
        }
        eprintln!();

        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Output::new().error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Generate {
            prompt,
            mode,
            language,
            backend,
            json,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(codeforge::cli::commands::generate::run(GenerateOptions {
                prompt,
                mode,
                language,
                user_backend: backend.into(),
                json,
            }))?;
        }
        Commands::Explain {
            file,
            language,
            backend,
            json,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(codeforge::cli::commands::explain::run(ExplainOptions {
                file,
                language,
                user_backend: backend.into(),
                json,
            }))?;
        }
        Commands::Store { action } => match action {
            StoreAction::Probe { json } => {
                let rt = Runtime::new()?;
                rt.block_on(codeforge::cli::commands::store::probe(json))?;
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                codeforge::cli::commands::config::show(&format)?;
            }
            ConfigAction::Path => {
                codeforge::cli::commands::config::path()?;
            }
            ConfigAction::Init { force } => {
                codeforge::cli::commands::config::init(force)?;
            }
        },
    }

    Ok(())
}
