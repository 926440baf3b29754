//! Logging initialization using tracing.
//!
//! Server mode writes to stderr because stdout carries the JSON-RPC
//! protocol. With a configured log directory, a daily-rotated JSON file is
//! added alongside.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::services::config::{LogFormat, LoggingConfig};

/// Initialize the global subscriber. The returned guard must be held for
/// the lifetime of the process to keep the file writer flushing.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let default_directive = config
        .level
        .parse::<tracing_subscriber::filter::Directive>()?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_directive)
        .from_env_lossy();

    let stderr_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(stderr_layer);

    if let Some(log_dir) = &config.log_dir {
        let file_appender = tracing_appender::rolling::daily(log_dir, "aiswarm.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);
        registry.with(file_layer).init();
        Ok(Some(guard))
    } else {
        registry.init();
        Ok(None)
    }
}
