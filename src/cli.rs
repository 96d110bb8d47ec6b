//! CLI domain: clap definitions and the route table dispatching to scenarios.

use crate::config::{ConfigLoader, LifelineConfig};
use crate::error::ApiError;
use crate::scenario::{self, ScenarioReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// Lifeline CLI - propagating cancellation for background tasks
#[derive(Parser)]
#[command(name = "lifeline")]
#[command(about = "Replay signal tree and publisher lifecycle scenarios")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the publisher emission interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the two canonical roots
    Roots,
    /// Build a value tree and show inherited and isolated lookups
    Values,
    /// Reproduce the leak of an ungoverned publisher
    Leak,
    /// Release a governed publisher after the consumer stops reading
    Cancel,
    /// Let a governed publisher expire after a timeout
    Timeout,
    /// Let a governed publisher expire at an absolute deadline
    Deadline,
    /// Print the effective configuration as TOML
    Config,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Roots => "roots",
            Commands::Values => "values",
            Commands::Leak => "leak",
            Commands::Cancel => "cancel",
            Commands::Timeout => "timeout",
            Commands::Deadline => "deadline",
            Commands::Config => "config",
        }
    }
}

/// Loaded configuration used to execute commands.
pub struct RunContext {
    config: LifelineConfig,
}

impl RunContext {
    pub fn new(config: LifelineConfig) -> Self {
        Self { config }
    }

    /// Load configuration for `cli` and apply its overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self, ApiError> {
        let mut config = ConfigLoader::load(cli.config.as_deref())?;
        if let Some(interval_ms) = cli.interval_ms {
            config.publisher.interval_ms = interval_ms;
            config.publisher.validate().map_err(ApiError::ConfigError)?;
        }
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &LifelineConfig {
        &self.config
    }

    /// Execute a command and return its rendered output.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        info!(command = command.name(), "Executing command");
        match command {
            Commands::Roots => Ok(scenario::roots().render()),
            Commands::Values => Ok(scenario::values().render()),
            Commands::Config => self.config.to_toml(),
            Commands::Leak | Commands::Cancel | Commands::Timeout | Commands::Deadline => {
                let report = self.run_async(command)?;
                Ok(summarize(&report))
            }
        }
    }

    fn run_async(&self, command: &Commands) -> Result<ScenarioReport, ApiError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::Runtime(format!("Failed to start runtime: {}", e)))?;
        let publisher = &self.config.publisher;

        let report = runtime.block_on(async {
            match command {
                Commands::Leak => scenario::leak(publisher).await,
                Commands::Cancel => scenario::cancel(publisher).await,
                Commands::Timeout => scenario::timeout(publisher).await,
                _ => scenario::deadline(publisher).await,
            }
        });
        Ok(report)
    }
}

fn summarize(report: &ScenarioReport) -> String {
    let verdict = if report.leaked() {
        format!(
            "LEAK: {} publisher(s) still alive",
            report.live_after - report.live_before
        )
    } else {
        "no leaked publishers".to_string()
    };
    format!("{}\n{}", report.render(), verdict)
}

/// Map an error to the message shown on stderr.
pub fn map_error(err: &ApiError) -> String {
    match err {
        ApiError::ConfigError(msg) => format!("Configuration error: {}", msg),
        ApiError::Logging(msg) => format!("Logging error: {}", msg),
        ApiError::Runtime(msg) => format!("Runtime error: {}", msg),
    }
}
