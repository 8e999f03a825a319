pub mod analysis;
pub mod archive;
pub mod config;
pub mod errors;
pub mod fsm;
pub mod log_retention;
pub mod logging;
pub mod playback;
pub mod priority;
pub mod runtime;
pub mod service;
pub mod session;
pub mod step_identity;
pub mod types;

use analysis::Workflow;
use archive::{RecordingArchive, SqliteArchive};
use clap::{error::ErrorKind, Parser, Subcommand};
use config::{load_config, resolve_against, AppConfig, CliOverrides};
use errors::StepwiseError;
use logging::{append_run_log, init_run_logger, structured_fallback_line, JsonlLogger};
use playback::{DryRunExecutor, ReplayOptions};
use runtime::ProductionRuntime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use service::AutomationService;
use session::{summarize, Recording};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Parser)]
#[command(name = "stepwise", version)]
#[command(about = "Record, replay and optimize step-by-step action sessions")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub archive: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Summarize a recording file.
    Preview {
        #[arg(long)]
        recording: PathBuf,
    },
    /// Dry-run a recording file step by step.
    Replay {
        #[arg(long)]
        recording: PathBuf,
        #[arg(long)]
        speed: Option<f64>,
        #[arg(long, default_value_t = false)]
        skip_errors: bool,
        #[arg(long, default_value_t = false)]
        pause_on_error: bool,
    },
    /// Detect repeated patterns and derive suggestions.
    Analyze {
        #[arg(long)]
        recording: PathBuf,
    },
    /// Remove duplicate steps and group parallelizable ones.
    Optimize {
        #[arg(long)]
        workflow: PathBuf,
    },
    /// Predict the next action after a comma-separated label sequence.
    Predict {
        #[arg(long)]
        recording: PathBuf,
        #[arg(long, value_delimiter = ',')]
        sequence: Vec<String>,
    },
    /// Store a completed recording in the archive.
    Import {
        #[arg(long)]
        recording: PathBuf,
    },
    /// List archived recordings.
    List,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Preview { .. } => "preview",
            Self::Replay { .. } => "replay",
            Self::Analyze { .. } => "analyze",
            Self::Optimize { .. } => "optimize",
            Self::Predict { .. } => "predict",
            Self::Import { .. } => "import",
            Self::List => "list",
        }
    }
}

pub fn run() -> Result<i32, StepwiseError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| StepwiseError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, StepwiseError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(StepwiseError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.as_deref().map(|path| resolve_against(cwd, path)),
        archive_path: cli.archive.clone(),
    };
    let cfg = load_config(&overrides, runtime.file_system.as_ref())?;

    init_run_logger(JsonlLogger {
        path: resolve_against(cwd, &cfg.logging.path),
        max_payload_bytes: cfg.logging.max_payload_bytes,
        budget_bytes: cfg.logging.budget_bytes,
    });
    append_run_log(
        "info",
        "cli.command",
        json!({ "command": cli.command.name(), "cwd": cwd.display().to_string() }),
    );

    let service = AutomationService::new(
        &cfg,
        Arc::clone(&runtime.clock),
        Arc::new(DryRunExecutor::new(Arc::clone(&runtime.terminal))),
        None,
    );

    match &cli.command {
        Command::Preview { recording } => {
            let id = import_file(&service, runtime, cwd, recording)?;
            let summary = service.session_summary(&id)?;
            write_json(runtime, &summary)?;
        }
        Command::Replay {
            recording,
            speed,
            skip_errors,
            pause_on_error,
        } => {
            let id = import_file(&service, runtime, cwd, recording)?;
            let options = ReplayOptions {
                speed: *speed,
                skip_errors: skip_errors.then_some(true),
                pause_on_error: pause_on_error.then_some(true),
            };
            let playback = service.replay(&id, &options)?;
            let message = format!(
                "playback {} of {}: {} of {} steps executed",
                playback.playback_id,
                playback.source_session_id,
                playback.executed_steps.len(),
                service
                    .get_session(&id)?
                    .map_or(0, |recording| recording.steps.len())
            );
            if runtime.terminal.stdin_is_tty() {
                runtime.terminal.write_line(&message)?;
            } else {
                runtime.terminal.write_line(&structured_fallback_line(
                    "playback",
                    playback.status.as_str(),
                    &message,
                ))?;
            }
        }
        Command::Analyze { recording } => {
            let id = import_file(&service, runtime, cwd, recording)?;
            let suggestions = service.suggest_for_session(&id)?;
            let patterns = service.patterns();
            write_json(
                runtime,
                &json!({
                    "session_id": id,
                    "patterns": patterns,
                    "suggestions": suggestions,
                }),
            )?;
        }
        Command::Optimize { workflow } => {
            let workflow: Workflow = read_json(runtime, cwd, workflow)?;
            write_json(runtime, &service.optimize(&workflow))?;
        }
        Command::Predict {
            recording,
            sequence,
        } => {
            let id = import_file(&service, runtime, cwd, recording)?;
            service.analyze_session(&id)?;
            let sequence = sequence
                .iter()
                .map(|label| label.trim())
                .filter(|label| !label.is_empty())
                .collect::<Vec<_>>();
            write_json(runtime, &service.predict(&sequence))?;
        }
        Command::Import { recording } => {
            let archive = open_archive(&cfg, cwd)?;
            let id = import_file(&service, runtime, cwd, recording)?;
            let stored = service.get_session(&id)?.ok_or_else(|| {
                StepwiseError::SessionNotFound(id.clone())
            })?;
            archive.save(&id, &stored)?;
            runtime.terminal.write_line(&format!(
                "imported {id} ({} steps)",
                stored.steps.len()
            ))?;
        }
        Command::List => {
            let archive = open_archive(&cfg, cwd)?;
            let ids = archive.list_ids()?;
            if ids.is_empty() {
                runtime.terminal.write_line("no archived recordings")?;
            }
            for id in ids {
                let summary = summarize(&archive.load(&id)?, 0);
                runtime.terminal.write_line(&format!(
                    "{}\t{}\t{} steps\t{}",
                    summary.session_id,
                    summary.status.as_str(),
                    summary.step_count,
                    summary.duration_label
                ))?;
            }
        }
    }

    Ok(0)
}

fn import_file(
    service: &AutomationService,
    runtime: &ProductionRuntime,
    cwd: &Path,
    path: &Path,
) -> Result<String, StepwiseError> {
    let recording: Recording = read_json(runtime, cwd, path)?;
    service.import_session(recording)
}

fn open_archive(cfg: &AppConfig, cwd: &Path) -> Result<Arc<dyn RecordingArchive>, StepwiseError> {
    let archive = SqliteArchive::open(resolve_against(cwd, &cfg.archive.path))?;
    Ok(Arc::new(archive))
}

fn read_json<T: DeserializeOwned>(
    runtime: &ProductionRuntime,
    cwd: &Path,
    path: &Path,
) -> Result<T, StepwiseError> {
    let path = resolve_against(cwd, path);
    let raw = runtime.file_system.read_to_string(&path)?;
    serde_json::from_str(&raw)
        .map_err(|e| StepwiseError::InvalidInput(format!("{}: {e}", path.display())))
}

fn write_json<T: Serialize>(runtime: &ProductionRuntime, value: &T) -> Result<(), StepwiseError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| StepwiseError::InvalidInput(e.to_string()))?;
    runtime.terminal.write_line(&rendered)
}
