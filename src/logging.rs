use directories::ProjectDirs;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, Registry};

pub fn log_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "mindmate", "mindmate").map(|dirs| dirs.data_dir().join("logs"))
}

/// Sends tracing output to a log file; the terminal belongs to the UI.
pub fn init_logging() -> anyhow::Result<Option<PathBuf>> {
    let Some(dir) = log_dir() else {
        return Ok(None);
    };

    std::fs::create_dir_all(&dir)?;
    let log_file = dir.join("mindmate.log");
    let file = File::create(&log_file)?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    Registry::default().with(file_layer).try_init()?;

    Ok(Some(log_file))
}
