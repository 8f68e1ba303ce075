use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "deploytrig",
    author,
    version,
    about = "Multi-tenant continuous-delivery trigger engine",
    long_about = None
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/deploytrig/config.yaml", env = "DEPLOYTRIG_CONFIG")]
    pub config: PathBuf,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, env = "DEPLOYTRIG_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "DEPLOYTRIG_LOG_FORMAT")]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the tick loop and HTTP server (default if no command specified)
    Run,

    /// Validate configuration file and exit
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Force-trigger a job against the in-process repository bootstrapped
    /// from config, bypassing readiness checks
    ForceTrigger {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        app: String,
        #[arg(long)]
        job_type: String,
    },

    /// Print the `jobsToRun` snapshot for an application as JSON
    Jobs {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        app: String,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

impl Cli {
    pub fn effective_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn effective_log_format(&self) -> &str {
        self.log_format.as_deref().unwrap_or("json")
    }
}
