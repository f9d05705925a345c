//! gtdflow: AI reviews for the project notes of a GTD markdown vault.

mod commands;
mod handler;
mod project;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use gtdflow_inference::{BedrockConfig, InferenceClient, RetryPolicy};
use gtdflow_jobs::{CancellationToken, SchedulerConfig};

use crate::commands::ReviewArgs;

#[derive(Parser)]
#[command(name = "gtdflow")]
#[command(author, version, about = "AI reviews for GTD project notes")]
#[command(propagate_version = true)]
struct Cli {
    /// Vault root directory
    #[arg(long, env = "GTDFLOW_VAULT", default_value = ".", global = true)]
    vault: PathBuf,

    /// Cache file (default: <vault>/.gtdflow-cache.json)
    #[arg(long, env = "GTDFLOW_CACHE_FILE", global = true)]
    cache: Option<PathBuf>,

    /// Project notes directory, relative to the vault
    #[arg(long, env = "GTDFLOW_PROJECTS_DIR", default_value = "projects", global = true)]
    projects_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review project notes and write the result into each note
    Review {
        /// Ignore the cache and review every project
        #[arg(short, long)]
        force: bool,

        /// Max reviews in flight (default: GTDFLOW_CONCURRENCY or 3)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Projects to review (default: every note in the projects directory)
        projects: Vec<String>,
    },

    /// Forget cached reviews so the next run recomputes them
    Invalidate {
        #[arg(required = true, num_args = 1..)]
        projects: Vec<String>,
    },

    /// Check that the AI service answers
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = init_tracing();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "gtdflow failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "gtdflow=info")
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "gtdflow=info,gtdflow_core=info,gtdflow_inference=info,gtdflow_jobs=info,gtdflow_store=info"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let guard = if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("gtdflow.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console output goes to stderr; stdout carries the report.
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

fn build_client() -> anyhow::Result<InferenceClient> {
    let bedrock = BedrockConfig::from_env()?;
    let policy = RetryPolicy::from_env()?;
    Ok(InferenceClient::from_config(&bedrock, policy)?)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cache_file = commands::cache_path(&cli.vault, cli.cache);

    match cli.command {
        Commands::Review {
            force,
            concurrency,
            projects,
        } => {
            let client = build_client()?;
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            let signal_task = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling batch");
                    on_signal.cancel();
                }
            });

            let args = ReviewArgs {
                projects_dir: cli.projects_dir,
                force,
                concurrency,
                projects,
            };
            let report = commands::review(
                &cli.vault,
                &cache_file,
                client,
                SchedulerConfig::from_env(),
                args,
                cancel,
            )
            .await;
            signal_task.abort();

            match report? {
                Some(report) => {
                    print!("{}", commands::format_report(&report));
                    Ok(if report.is_clean() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                None => {
                    println!("No project notes found.");
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
        Commands::Invalidate { projects } => {
            let keys = commands::invalidate(&cache_file, &cli.projects_dir, &projects).await?;
            for key in keys {
                println!("invalidated {}", key);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Health => {
            let client = build_client()?;
            let health = commands::health(&client).await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(if health.healthy {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
