//! texpilot command line.
//!
//! `run` drives a task against a project directory; `parse` runs the
//! operation codec on stdin. Logs go to stderr, results to stdout.

use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use texpilot::models::{AgentConfig, AgentEvent};
use texpilot::services::agent::{AgentService, AutoConfirm, Confirmation};
use texpilot_tools::{parse_operation, FsWorkspace, LocalFileSystem};

const DEFAULT_CONFIG: &str = "texpilot.toml";

#[derive(Parser)]
#[command(name = "texpilot")]
#[command(about = "Edit a LaTeX project one planner operation at a time")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task against a project directory
    Run {
        /// What the agent should do
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,

        /// Project root
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Configuration file (defaults to ./texpilot.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// File the agent should treat as currently open
        #[arg(long)]
        current_file: Option<String>,

        /// Extend the iteration cap without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Parse planner output from stdin and print the operation
    Parse,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("texpilot=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            request,
            project,
            config,
            current_file,
            yes,
        } => {
            run(
                request.join(" "),
                project,
                config,
                current_file.as_deref(),
                yes,
            )
            .await
        }
        Commands::Parse => parse_stdin(),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AgentConfig> {
    match path {
        Some(path) => AgentConfig::load(&path)
            .with_context(|| format!("failed to load {}", path.display())),
        None if PathBuf::from(DEFAULT_CONFIG).is_file() => {
            AgentConfig::load(&PathBuf::from(DEFAULT_CONFIG))
                .with_context(|| format!("failed to load {}", DEFAULT_CONFIG))
        }
        None => {
            let mut config = AgentConfig::default();
            config.apply_env(std::env::var(texpilot::models::API_KEY_ENV).ok());
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("invalid default configuration: {}", e))?;
            Ok(config)
        }
    }
}

async fn run(
    request: String,
    project: PathBuf,
    config: Option<PathBuf>,
    current_file: Option<&str>,
    yes: bool,
) -> Result<ExitCode> {
    let config = load_config(config)?;
    let fs = Arc::new(
        LocalFileSystem::new(&project)
            .with_context(|| format!("cannot open project {}", project.display()))?,
    );
    let name = project
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_string());
    let workspace = Arc::new(FsWorkspace::new(fs.clone(), name));
    workspace.set_current_file(current_file)?;

    let confirmation: Arc<dyn Confirmation> = if yes {
        Arc::new(AutoConfirm(true))
    } else if std::io::stdin().is_terminal() {
        Arc::new(StdinConfirmation::spawn())
    } else {
        Arc::new(AutoConfirm(false))
    };

    let (event_tx, event_rx) = mpsc::channel(256);
    let printer = tokio::spawn(print_events(event_rx));

    let service = Arc::new(AgentService::from_config(
        &config,
        fs,
        workspace,
        confirmation,
        Some(event_tx),
    )?);

    let pauser = service.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, pausing after the current operation");
            pauser.pause();
        }
    });

    let run = service.run_task(&request).await?;
    let _ = printer.await;

    println!("{}", serde_json::to_string_pretty(&run.summary)?);
    Ok(if run.summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn print_events(mut rx: mpsc::Receiver<AgentEvent>) {
    let mut stderr = std::io::stderr();
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::PlannerDelta { text } => {
                let _ = write!(stderr, "{}", text);
                let _ = stderr.flush();
            }
            AgentEvent::PlannerReset => {
                let _ = writeln!(stderr, "\n[planner output discarded]");
            }
            AgentEvent::TurnStarted {
                turn,
                iteration_cap,
            } => {
                let _ = writeln!(stderr, "\n== turn {}/{} ==", turn, iteration_cap);
            }
            AgentEvent::OperationCompleted {
                sequence_number,
                result,
            } => {
                let status = if result.success {
                    "ok".to_string()
                } else {
                    format!("failed: {}", result.error.unwrap_or_default())
                };
                let _ = writeln!(
                    stderr,
                    "#{} {} {} ({} ms)",
                    sequence_number,
                    result.action.as_deref().unwrap_or("complete"),
                    status,
                    result.duration_ms
                );
            }
            AgentEvent::CapExtended { iteration_cap } => {
                let _ = writeln!(stderr, "iteration cap extended to {}", iteration_cap);
            }
            AgentEvent::TaskFinished { .. } => break,
            _ => {}
        }
    }
}

/// Asks on stderr and takes the answer from a line channel.
///
/// Waiting on the channel can be abandoned at any point, so a pause while
/// the prompt is open never leaves a blocking read behind.
struct StdinConfirmation {
    answers: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl StdinConfirmation {
    fn new(answers: mpsc::Receiver<String>) -> Self {
        Self {
            answers: tokio::sync::Mutex::new(answers),
        }
    }

    /// Read stdin on a plain thread. Runtime shutdown does not wait on it,
    /// unlike the blocking pool.
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(1);
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Self::new(rx)
    }
}

#[async_trait]
impl Confirmation for StdinConfirmation {
    async fn confirm(&self, message: &str) -> bool {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\n{} [y/N] ", message);
        let _ = stderr.flush();
        match self.answers.lock().await.recv().await {
            Some(line) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }
}

fn parse_stdin() -> Result<ExitCode> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read stdin")?;

    match parse_operation(&raw) {
        Ok(op) => {
            println!("{}", serde_json::to_string_pretty(&op)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("could not parse operation: {}", failure.reason);
            Ok(ExitCode::FAILURE)
        }
    }
}
