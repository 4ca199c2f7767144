//! Recall CLI
//!
//! Main entry point for the recall command-line tool.
//! Provides one-shot similarity queries and an interactive knowledge base shell.

mod commands;

use clap::{Parser, Subcommand};
use commands::{QueryCommand, ShellCommand};
use recall_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Recall - similarity search over in-memory knowledge bases
#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(about = "Similarity search over in-memory knowledge bases", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "RECALL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Maximum number of indexes memorized per knowledge base
    #[arg(long, global = true)]
    max_to_memorize: Option<usize>,

    /// Embedding provider (trigram, ollama)
    #[arg(long, global = true)]
    embedding_provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank inline texts and files by similarity to a query
    Query(QueryCommand),

    /// Line-oriented knowledge base session
    Shell(ShellCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from file and environment
    let config = AppConfig::load_with_file(cli.config)?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.max_to_memorize,
        cli.embedding_provider,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Recall CLI starting");
    tracing::debug!("Config file: {:?}", config.config_file);
    tracing::debug!(
        "Embedding: {} ({}), cache bound {}",
        config.embedding.provider,
        config.embedding.model,
        config.max_to_memorize
    );

    let command_name = match &cli.command {
        Commands::Query(_) => "query",
        Commands::Shell(_) => "shell",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Query(cmd) => cmd.execute(&config).await,
        Commands::Shell(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
