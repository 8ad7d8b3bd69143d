//! txguard - notes REPL over coloured transactions
//!
//! This is the main entry point for the txguard command-line interface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use txguard::config::AppConfig;
use txguard::logging::init_logging;
use txguard::notes::NoteService;
use txguard::repl::{Repl, Reply};
use txguard::transaction::{install_guard, LoggingGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GuardMode {
    /// Abort on nesting violations
    Strict,
    /// Log nesting violations and carry on
    Log,
}

#[derive(Parser)]
#[command(name = "txguard")]
#[command(version)]
#[command(about = "Notes REPL built on capability-coloured transactions")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overrides configuration)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: text or json (overrides configuration)
    #[arg(long)]
    log_format: Option<String>,

    /// How nesting violations are handled
    #[arg(long, value_enum, default_value = "strict")]
    guard: GuardMode,

    /// Execute a command and exit (repeatable)
    #[arg(short, long)]
    execute: Vec<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    config.validate().context("invalid configuration")?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(Some(&config.logging)).context("failed to initialize logging")?;

    if cli.guard == GuardMode::Log {
        install_guard(LoggingGuard).context("failed to install guard")?;
    }

    info!(
        retry_count = ?config.transaction.retry_count,
        test_retries = config.transaction.test_retries,
        "txguard starting"
    );

    let service = NoteService::in_memory(config.transaction.clone());
    let mut repl = Repl::new(service);

    if cli.execute.is_empty() {
        repl.run().await?;
        return Ok(());
    }

    for line in &cli.execute {
        match repl.execute_line(line).await {
            Ok(Reply::Output(text)) => println!("{}", text),
            Ok(Reply::Exit) => break,
            Err(e) => {
                error!(command = %line, "command failed: {}", e);
                anyhow::bail!("{}: {}", line, e);
            }
        }
    }

    Ok(())
}
