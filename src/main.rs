mod build_service;
mod cli;
mod config;
mod context;
mod domain;
mod engine;
mod error;
mod logging;
mod repository;
mod server;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use build_service::HttpBuildService;
use cli::Commands;
use domain::{Application, ApplicationId, JobType};
use engine::Trigger;
use repository::ApplicationRepository;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();

    logging::init(&cli)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting deploytrig");

    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Validate { config: path } => {
            let path = path.unwrap_or_else(|| cli.config.clone());
            config::load(&path)?;
            info!(path = %path.display(), "Configuration is valid");
            Ok(())
        }
        Commands::Run => run(&cli).await,
        Commands::ForceTrigger { tenant, app, job_type } => {
            let trigger = bootstrap(&cli).await?;
            let id = ApplicationId::new(tenant, app);
            let job_type = JobType::from_str(&job_type).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            let dispatched = trigger.force_trigger(&id, job_type, "cli", chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&dispatched.iter().map(|j| j.canonical_name()).collect::<Vec<_>>())?);
            Ok(())
        }
        Commands::Jobs { tenant, app } => {
            let trigger = bootstrap(&cli).await?;
            let id = ApplicationId::new(tenant, app);
            let jobs = trigger.jobs_to_run(&id, chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            Ok(())
        }
    }
}

async fn run(cli: &cli::Cli) -> Result<()> {
    let config = config::load(&cli.config)?;
    info!(applications = config.applications.len(), "Configuration loaded");

    let trigger = build_trigger(&config).await?;
    server::run(config, trigger).await
}

/// Loads config and wires a `Trigger` without starting the server — used by
/// the offline `force-trigger` and `jobs` subcommands.
async fn bootstrap(cli: &cli::Cli) -> Result<Trigger> {
    let config = config::load(&cli.config)?;
    build_trigger(&config).await
}

async fn build_trigger(config: &config::Config) -> Result<Trigger> {
    let repository = Arc::new(ApplicationRepository::new());
    for app_config in &config.applications {
        let id = ApplicationId::from(&app_config.id);
        repository
            .insert(Application::new(id, app_config.deployment_spec.clone(), app_config.project_id.clone()))
            .await;
    }

    let build_service = Arc::new(HttpBuildService::new(
        config.build_service.base_url.clone(),
        None,
        config.build_service.timeout()?,
    ));

    Ok(Trigger::new(
        repository,
        build_service,
        crate::domain::PlatformVersion::new(config.trigger.system_platform_version.clone()),
        chrono::Duration::from_std(config.trigger.job_timeout()?)?,
        config.trigger.max_concurrent_applications,
    ))
}
