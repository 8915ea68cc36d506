mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cnb_core::LifecycleMode;
use colored::Colorize;
use engine::DockerEngine;
use events::{Event, EventBus};
use orchestrator::{cancel_pair, BuildRequest, BuildRunner, OrchestratorError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vcs::{GitSource, SourceProvider};

use crate::config::{BuildConfig, CONFIG_DIR, CONFIG_FILE};

/// Exit status for usage and configuration errors.
const CONFIG_EXIT: u8 = 1;

#[derive(Parser)]
#[command(name = "cnb-build")]
#[command(about = "Build a container image from a git repository with Cloud Native Buildpacks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, run the lifecycle, export and load the image (default)
    Build(BuildArgs),
    /// Load an existing image archive into the local runtime
    Import {
        archive: PathBuf,
    },
    /// Write the default configuration file
    Init,
}

#[derive(Args, Default)]
struct BuildArgs {
    /// Git repository URL
    #[arg(long)]
    repo: Option<String>,

    /// Branch or tag to build
    #[arg(long)]
    branch: Option<String>,

    /// Where to write the image archive
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Lifecycle mode: phased or creator
    #[arg(long)]
    mode: Option<LifecycleMode>,

    /// Configuration file (defaults to .cnb-build/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Some(Commands::Build(args)) => build(args).await,
        Some(Commands::Import { archive }) => import(&archive).await,
        Some(Commands::Init) => init_project().await,
        None => build(BuildArgs::default()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let (message, stage, code) = match e.downcast_ref::<OrchestratorError>() {
                Some(err) => (err.to_string(), err.kind().as_str(), err.kind().exit_code()),
                None => (format!("{:#}", e), "config", CONFIG_EXIT),
            };
            eprintln!("{} {} [{}]", "✗".red().bold(), message, stage);
            ExitCode::from(code)
        }
    }
}

async fn build(args: BuildArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut config = BuildConfig::load(args.config.as_deref(), &cwd)?;

    if let Some(repo) = args.repo {
        config.source.repository = repo;
    }
    if let Some(branch) = args.branch {
        config.source.branch = branch;
    }
    if let Some(output) = args.output {
        config.output.archive = output;
    }
    if let Some(mode) = args.mode {
        config.lifecycle.mode = mode;
    }

    let checkout_base = config.checkout_base(&cwd);
    tokio::fs::create_dir_all(&checkout_base)
        .await
        .with_context(|| format!("Failed to create {}", checkout_base.display()))?;

    let source: Arc<dyn SourceProvider> = Arc::new(GitSource::new(checkout_base));
    if !source.is_available().await {
        anyhow::bail!("git is not installed or not on PATH");
    }
    let docker = DockerEngine::locate().context("docker client not found on PATH")?;

    let mut request = BuildRequest::new(
        &config.source.repository,
        &config.source.branch,
        &config.output.archive,
    )
    .with_mode(config.lifecycle.mode);
    if let Some(ref image) = config.output.image {
        request = request.with_image(image);
    }

    let bus = EventBus::new();
    let printer = spawn_progress(&bus);
    let runner = BuildRunner::with_docker(source, docker, config.settings(), bus)
        .with_keep_sources(config.source.keep);

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling build");
            handle.cancel();
        }
    });

    println!(
        "Building {} ({}) with {}",
        request.repository.bold(),
        request.reference,
        runner.settings().builder_image
    );

    let result = runner.build(&request, signal).await;
    drop(runner);
    if let Err(e) = printer.await {
        tracing::debug!("Progress printer stopped: {}", e);
    }

    let report = result?;
    println!();
    println!(
        "{} Image {} loaded from {} ({} bytes, {:.1}s)",
        "✓".green().bold(),
        report.artifact.image.bold(),
        report.artifact.path.display(),
        report.artifact.size_bytes,
        report.duration.as_secs_f64()
    );
    if !report.import_status.is_empty() {
        println!("  {}", report.import_status);
    }
    Ok(())
}

async fn import(archive: &Path) -> Result<()> {
    let docker = DockerEngine::locate().context("docker client not found on PATH")?;
    let status = orchestrator::import_artifact(&docker, archive).await?;

    println!("{} {}", "✓".green().bold(), status);
    Ok(())
}

async fn init_project() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_dir = cwd.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    if config_path.exists() {
        println!("Configuration already exists at {}", config_path.display());
        return Ok(());
    }

    tokio::fs::create_dir_all(&config_dir).await?;
    tokio::fs::write(&config_path, BuildConfig::default().to_toml()?).await?;

    println!("Created {}/{}", CONFIG_DIR, CONFIG_FILE);
    println!();
    println!("Next steps:");
    println!("  1. Point [source] at your repository");
    println!("  2. Run 'cnb-build' to build and load the image");
    Ok(())
}

/// Print one line per stage until the bus closes.
fn spawn_progress(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => print_event(&envelope.event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Progress output skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &Event) {
    match event {
        Event::SourceFetched {
            commit, reference, ..
        } => println!(
            "{} Fetched {} at {}",
            "→".cyan(),
            reference,
            commit.as_deref().unwrap_or("unknown revision")
        ),
        Event::PhaseStarted {
            index,
            total,
            phase,
            ..
        } => println!("{} [{}/{}] {}", "→".cyan(), index + 1, total, phase.bold()),
        Event::PhaseSucceeded {
            phase, duration_ms, ..
        } => println!(
            "{} {} ({:.1}s)",
            "✓".green(),
            phase,
            *duration_ms as f64 / 1000.0
        ),
        Event::PhaseFailed { phase, error, .. } => {
            println!("{} {}: {}", "✗".red(), phase, error)
        }
        Event::ArtifactExported {
            path, size_bytes, ..
        } => println!("{} Exported {} ({} bytes)", "✓".green(), path, size_bytes),
        Event::ArtifactImported { .. }
        | Event::PipelineStarted { .. }
        | Event::PipelineSucceeded { .. }
        | Event::PipelineAborted { .. } => {}
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cnb_build=info,orchestrator=info,engine=info,vcs=info".into()
            }),
        )
        .init();
}
