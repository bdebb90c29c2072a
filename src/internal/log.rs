//! Logging facade. Every event in autopkg - backend queries, graph
//! construction, planning decisions, chroot lifecycle, repository mutations -
//! flows through one of the functions here, so the append-only file log at
//! `<home>/log` is a complete run history even for events that are not worth
//! printing to the terminal.
//!
//! Mirrors the source system's single `log()` entry point: a line is always
//! written to the file, and is additionally printed to the terminal unless the
//! level is `debug`.

use arch_msgs::*;
use tracing_appender::non_blocking::WorkerGuard;

/// Initializes the file-backed tracing subscriber. Must be called once, early
/// in `main`, before any log::* call. The returned guard must be kept alive for
/// the lifetime of the process (dropping it stops the background flush
/// thread).
pub fn init() -> anyhow::Result<WorkerGuard> {
    let home = crate::internal::common::home_dir()?;
    let file_appender = tracing_appender::rolling::never(home, "log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace")),
        )
        .init();

    Ok(guard)
}

pub fn error(text: &str) {
    tracing::error!("{}", text);
    error!("{}", text);
}

pub fn warn(text: &str) {
    tracing::warn!("{}", text);
    warning!("{}", text);
}

pub fn info(text: &str) {
    tracing::info!("{}", text);
    msg!("{}", text);
}

pub fn good(text: &str) {
    tracing::info!("{}", text);
    msg!("{}", text);
}

/// Fine-grained tracing (e.g. the exact external command line being run).
/// Printed to the terminal like `info`, logged to the file as a `trace` event.
pub fn fine(text: &str) {
    tracing::trace!("{}", text);
    msg!("{}", text);
}

/// Debug-level event: reaches the file log only, never the terminal.
pub fn debug(text: &str) {
    tracing::debug!("{}", text);
}
