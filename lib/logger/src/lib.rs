//! Tracing-subscriber setup, mirroring the teacher's `logger` lib: a single
//! `init` entry point driven off a small [`LogConfig`], called once at
//! process startup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
}

impl Default for LogLevel {
  fn default() -> Self {
    LogLevel::Info
  }
}

impl LogLevel {
  fn as_str(self) -> &'static str {
    match self {
      LogLevel::Trace => "trace",
      LogLevel::Debug => "debug",
      LogLevel::Info => "info",
      LogLevel::Warn => "warn",
      LogLevel::Error => "error",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
  pub level: LogLevel,
  /// Emit structured JSON lines instead of human-readable output.
  pub json: bool,
  /// Include file:line in each event.
  pub location: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: LogLevel::Info,
      json: false,
      location: false,
    }
  }
}

/// Should be called exactly once, in startup, before any `info!`/`error!`.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let filter = EnvFilter::try_new(format!(
    "{},hyper=info,tower_http=info",
    config.level.as_str()
  ))?;

  let registry = tracing_subscriber::registry().with(filter);

  if config.json {
    registry
      .with(
        fmt::layer()
          .json()
          .with_file(config.location)
          .with_line_number(config.location),
      )
      .try_init()?;
  } else {
    registry
      .with(
        fmt::layer()
          .with_file(config.location)
          .with_line_number(config.location)
          .with_target(false),
      )
      .try_init()?;
  }

  Ok(())
}
