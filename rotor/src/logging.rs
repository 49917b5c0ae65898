//! Structured logging to stdout and to a log file simultaneously, per spec
//! (both sinks are required, unlike the teacher's file-only `logging::init`).

use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init(log_file: &Path, filter: &str) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    let stdout_layer = fmt::layer().with_writer(BoxMakeWriter::new(std::io::stdout));
    let file_layer = fmt::layer().with_writer(BoxMakeWriter::new(file)).with_ansi(false);
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
