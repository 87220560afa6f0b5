//! `sitepush` command-line entry point.
//!
//! ```bash
//! SITEPUSH_BUCKET=www-example SITEPUSH_DISTRIBUTION_ID=E123 sitepush deploy
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sitepush_aws::{CloudFrontClient, S3StorageClient};
use sitepush_cdn::{CdnClient, MemoryCdnClient};
use sitepush_common::CancellationFlag;
use sitepush_deploy::{
    BuildStep, CommandBuild, DeployConfig, DeployError, DeployOptions, DeploymentOrchestrator,
    DeploymentReport, ExistingOutput, ReqwestProbe, Stage,
};
use sitepush_storage::{MemoryStorageClient, StorageClient};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitepush")]
#[command(about = "Build, publish and purge a static site", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Configuration comes from `SITEPUSH_*` environment variables.
#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Run the build step and scan its output
    Build,
    /// Upload the existing build output
    Upload,
    /// Invalidate every cached path of the distribution
    Invalidate,
    /// Check the configured verification targets
    Verify,
    /// Build, upload, invalidate and verify
    Deploy,
}

impl From<Commands> for Stage {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Build => Stage::Build,
            Commands::Upload => Stage::Upload,
            Commands::Invalidate => Stage::Invalidate,
            Commands::Verify => Stage::Verify,
            Commands::Deploy => Stage::Deploy,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli: Cli = Cli::parse();

    let config: DeployConfig = match DeployConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            tracing::error!(error = %e, "Could not load configuration");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_json);

    match run(cli.command.into(), &config).await {
        Ok(report) => {
            print!("{}", report);
            if let Err(e) = write_report(&config, &report) {
                tracing::error!(error = %e, "Could not write report");
            }
            if report.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Deployment not started");
            eprintln!("sitepush: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter: EnvFilter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(stage: Stage, config: &DeployConfig) -> Result<DeploymentReport, DeployError> {
    config.validate(stage)?;
    let options: DeployOptions = DeployOptions::from_config(config)?;
    let probe: ReqwestProbe = ReqwestProbe::new()?;
    let build: Box<dyn BuildStep> = match &config.build_command {
        Some(command) if !command.trim().is_empty() => {
            Box::new(CommandBuild::new(command.as_str(), config.build_dir.clone()))
        }
        _ => Box::new(ExistingOutput::new(config.build_dir.clone())),
    };

    let cancel: CancellationFlag = CancellationFlag::new();
    let signal: CancellationFlag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight work");
            signal.cancel();
        }
    });

    if config.dry_run {
        tracing::info!("Dry run: using in-memory object store and CDN");
        let storage: MemoryStorageClient = MemoryStorageClient::new();
        let cdn: MemoryCdnClient = MemoryCdnClient::new();
        return Ok(execute(stage, &storage, &cdn, build.as_ref(), &probe, options, cancel).await);
    }

    let storage: S3StorageClient = S3StorageClient::new(config.storage_settings()).await?;
    let cdn: CloudFrontClient = CloudFrontClient::new(&config.storage_settings()).await;
    Ok(execute(stage, &storage, &cdn, build.as_ref(), &probe, options, cancel).await)
}

async fn execute<S: StorageClient, C: CdnClient>(
    stage: Stage,
    storage: &S,
    cdn: &C,
    build: &dyn BuildStep,
    probe: &ReqwestProbe,
    options: DeployOptions,
    cancel: CancellationFlag,
) -> DeploymentReport {
    DeploymentOrchestrator::new(storage, cdn, build, probe, options)
        .with_cancellation(cancel)
        .run_stage(stage)
        .await
}

fn write_report(config: &DeployConfig, report: &DeploymentReport) -> Result<(), DeployError> {
    let Some(path) = &config.report_path else {
        return Ok(());
    };
    let json: String = report.to_json().map_err(|e| DeployError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| DeployError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tracing::info!(path = %path.display(), "Report written");
    Ok(())
}
