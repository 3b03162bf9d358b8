//! Process configuration (spec.md §6 "Environment variables (recognized)"),
//! grounded on the teacher's `bin/periphery/src/config.rs` precedence
//! chain and `OnceLock` global accessor pattern, minus the file layer —
//! spec.md only ever documents environment variables for this process, so
//! this is CLI args (`clap`, teacher dependency) over `.env`-loaded
//! environment (`dotenvy` + `envy`, both teacher dependencies) over typed
//! defaults.

use std::{
  net::{Ipv4Addr, Ipv6Addr},
  path::PathBuf,
  sync::OnceLock,
};

use clap::Parser;
use glinr_logger::{LogConfig, LogLevel};
use serde::Deserialize;

/// CLI overrides. Every field is optional so an unset flag falls through
/// to the environment, then to a default.
#[derive(Debug, Parser)]
#[command(
  name = "glinrd",
  about = "glinr self-hosted container platform control plane"
)]
pub struct CliArgs {
  #[arg(long)]
  pub data_dir: Option<PathBuf>,
  #[arg(long)]
  pub http_addr: Option<String>,
  #[arg(long)]
  pub log_level: Option<LogLevelArg>,
  #[arg(long)]
  pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevelArg {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
}

impl From<LogLevelArg> for LogLevel {
  fn from(value: LogLevelArg) -> Self {
    match value {
      LogLevelArg::Trace => LogLevel::Trace,
      LogLevelArg::Debug => LogLevel::Debug,
      LogLevelArg::Info => LogLevel::Info,
      LogLevelArg::Warn => LogLevel::Warn,
      LogLevelArg::Error => LogLevel::Error,
    }
  }
}

/// Environment-variable shape, parsed by `envy` (spec.md §6 names are
/// upper-snake-case; `envy` lower-cases field names to match).
#[derive(Debug, Default, Deserialize)]
struct Env {
  data_dir: Option<PathBuf>,
  http_addr: Option<String>,
  admin_token: Option<String>,
  master_encryption_key: Option<String>,
  public_edge_host: Option<String>,
  public_edge_ipv4: Option<String>,
  public_edge_ipv6: Option<String>,
  dns_verify_enabled: Option<bool>,
  acme_email: Option<String>,
  acme_directory_url: Option<String>,
  acme_http01_enabled: Option<bool>,
  acme_dns01_enabled: Option<bool>,
  auth_rl_per_min: Option<u32>,
}

/// Where the reverse proxy terminates (spec.md glossary "Public edge";
/// §4.8 domain verification, §4.9 HTTP-01).
#[derive(Debug, Clone, Default)]
pub struct PublicEdgeConfig {
  pub host: Option<String>,
  pub ipv4: Option<Ipv4Addr>,
  pub ipv6: Option<Ipv6Addr>,
}

impl PublicEdgeConfig {
  pub fn is_configured(&self) -> bool {
    self.host.is_some() || self.ipv4.is_some() || self.ipv6.is_some()
  }
}

#[derive(Debug, Clone)]
pub struct AcmeConfig {
  pub email: Option<String>,
  pub directory_url: String,
  pub http01_enabled: bool,
  pub dns01_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
  pub data_dir: PathBuf,
  pub http_addr: String,
  /// Bootstrap admin token: creates the `admin` token if none exist
  /// (spec.md §6).
  pub admin_token: Option<String>,
  pub master_encryption_key: Option<String>,
  pub public_edge: PublicEdgeConfig,
  pub dns_verify_enabled: bool,
  pub acme: AcmeConfig,
  pub auth_rl_per_min: u32,
  pub log: LogConfig,
}

impl Config {
  pub fn certs_dir(&self) -> PathBuf {
    self.data_dir.join("certs")
  }

  pub fn challenges_dir(&self) -> PathBuf {
    self.data_dir.join("challenges")
  }

  pub fn db_path(&self) -> PathBuf {
    self.data_dir.join("glinrd.db")
  }

  pub fn nginx_config_path(&self) -> PathBuf {
    self.data_dir.join("nginx.conf")
  }

  /// CLI args > environment > default, mirroring the teacher's
  /// `args.x.unwrap_or(env.x)` chaining throughout
  /// `bin/periphery/src/config.rs`.
  pub fn load(args: CliArgs) -> anyhow::Result<Self> {
    // `.env`, if present, is merged into the process environment before
    // `envy` reads it (teacher dependency `dotenvy`).
    let _ = dotenvy::dotenv();
    let env: Env = envy::from_env().unwrap_or_default();

    let data_dir = args
      .data_dir
      .or(env.data_dir)
      .unwrap_or_else(|| PathBuf::from("/var/lib/glinrd"));
    let http_addr = args
      .http_addr
      .or(env.http_addr)
      .unwrap_or_else(|| "0.0.0.0:8120".to_string());

    let public_edge = PublicEdgeConfig {
      host: env.public_edge_host,
      ipv4: env
        .public_edge_ipv4
        .as_deref()
        .and_then(|s| s.parse().ok()),
      ipv6: env
        .public_edge_ipv6
        .as_deref()
        .and_then(|s| s.parse().ok()),
    };

    let acme = AcmeConfig {
      email: env.acme_email,
      directory_url: env
        .acme_directory_url
        .unwrap_or_else(|| "https://acme-v02.api.letsencrypt.org/directory".to_string()),
      http01_enabled: env.acme_http01_enabled.unwrap_or(false),
      dns01_enabled: env.acme_dns01_enabled.unwrap_or(false),
    };

    let log = LogConfig {
      level: args
        .log_level
        .map(LogLevel::from)
        .unwrap_or(LogLevel::Info),
      json: args.log_json,
      location: false,
    };

    Ok(Self {
      data_dir,
      http_addr,
      admin_token: env.admin_token,
      master_encryption_key: env.master_encryption_key,
      public_edge,
      dns_verify_enabled: env.dns_verify_enabled.unwrap_or(false),
      acme,
      auth_rl_per_min: env.auth_rl_per_min.unwrap_or(60),
      log,
    })
  }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Must be called exactly once at startup, before [`config`] is read.
pub fn init(args: CliArgs) -> anyhow::Result<&'static Config> {
  let config = Config::load(args)?;
  Ok(CONFIG.get_or_init(|| config))
}

pub fn config() -> &'static Config {
  CONFIG.get().expect("glinr_config::init not called yet")
}
