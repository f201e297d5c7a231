mod cli;
pub mod classify;
pub mod document_models;
pub mod drive;
pub mod engine;
pub mod errors;
pub mod models;
pub mod navigation;
pub mod placement;
pub mod settings;
pub mod store;

pub use crate::engine::{CommandOutcome, FolderPlacementEngine};
pub use crate::errors::{FilingError, FilingResult};
pub use crate::models::{Document, DocumentHeader, DriveSnapshot, FileNode, FolderNode, Node};
pub use crate::placement::{plan_pass, EngineState, PassPlan, PlacementCommand};
pub use crate::settings::FilingSettings;
pub use crate::store::{DriveStore, MemoryDriveStore, StoreFuture};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub fn run() -> anyhow::Result<()> {
    cli::run()
}

/// JSON logs filtered by `RUST_LOG` (default `info`), written to a daily
/// rolling file when `log_dir` is set and to stderr otherwise.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<(), String> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let Some(log_dir) = log_dir else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| error.to_string());
    };

    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "drive-filer.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
