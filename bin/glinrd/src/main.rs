use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use glinr_acme::{CertificatePipeline, ChallengeDir, InstantAcmeClient};
use glinr_config::CliArgs;
use glinr_crypto::MasterKey;
use glinr_dns::DnsResolver;
use glinr_engine::{BollardEngine, Engine};
use glinr_proxy::Reloader;
use glinr_store::{Store, entities::Role};

#[macro_use]
extern crate tracing;

mod api;
mod auth;
mod build;
mod cert_renewal;
mod domain;
mod error;
mod health;
mod jobqueue;
mod lifecycle;
mod metrics;
mod proxy_reload;
mod reconciler;
mod state;

/// Number of job-queue worker tasks (spec.md §4.6 "bounded worker pool").
/// Fixed rather than configurable: this control plane's job volume (builds,
/// cert issuance/renewal) is low enough that a knob would be unused.
const JOB_QUEUE_WORKERS: usize = 4;

async fn bootstrap_admin_token(store: &Store) -> anyhow::Result<()> {
  if store.token_count().await? > 0 {
    return Ok(());
  }
  let Some(admin_token) = glinr_config::config().admin_token.clone() else {
    warn!("no tokens exist and ADMIN_TOKEN is unset: the API is unreachable until a token is created out of band");
    return Ok(());
  };
  let salt = glinr_crypto::random_hex_token();
  let hash = glinr_crypto::hash_token(&admin_token, &salt);
  store.create_token("admin", &hash, &salt, Role::Admin).await?;
  info!("bootstrapped the admin token from ADMIN_TOKEN");
  Ok(())
}

async fn app() -> anyhow::Result<()> {
  let args = CliArgs::parse();
  let config = glinr_config::init(args)?;
  glinr_logger::init(&config.log)?;

  info!("glinrd version v{}", env!("CARGO_PKG_VERSION"));

  tokio::fs::create_dir_all(&config.data_dir)
    .await
    .context("failed to create data_dir")?;
  tokio::fs::create_dir_all(config.certs_dir())
    .await
    .context("failed to create certs_dir")?;
  tokio::fs::create_dir_all(config.challenges_dir())
    .await
    .context("failed to create challenges_dir")?;

  let master_key = match &config.master_encryption_key {
    Some(encoded) => MasterKey::from_base64(encoded)?,
    None => {
      warn!("MASTER_ENCRYPTION_KEY is unset: generating an ephemeral key, encrypted fields will not survive a restart");
      MasterKey::generate()
    }
  };

  let store = Store::open(&config.db_path(), master_key).await.context("failed to open store")?;
  bootstrap_admin_token(&store).await?;
  state::init_store(store);

  let engine: Arc<dyn Engine> = Arc::new(BollardEngine::connect().context("failed to connect to container engine")?);
  state::init_engine(engine);

  let reloader = Arc::new(Reloader::new(
    config.nginx_config_path(),
    "nginx -t",
    "nginx -s reload",
  ));
  state::init_reloader(reloader.clone());

  let challenge_dir = Arc::new(ChallengeDir::new(config.challenges_dir()));
  state::init_challenge_dir(challenge_dir.clone());

  state::init_dns_resolver(Arc::new(DnsResolver::new().context("failed to initialize dns resolver")?));

  if config.acme.http01_enabled || config.acme.dns01_enabled {
    let acme_client: Arc<dyn glinr_acme::AcmeClient> = Arc::new(InstantAcmeClient::new(
      config.acme.directory_url.clone(),
      config.acme.email.clone(),
    ));
    state::init_acme_client(Some(acme_client.clone()));

    let pipeline = Arc::new(CertificatePipeline::new(
      state::store().clone(),
      acme_client,
      challenge_dir,
      reloader,
      "/.well-known/acme-challenge",
      config.certs_dir(),
    ));
    state::init_cert_pipeline(Some(pipeline));
  } else {
    info!("no ACME challenge method enabled, acme-typed certificates will return not-implemented");
    state::init_acme_client(None);
    state::init_cert_pipeline(None);
  }

  state::init_job_queue(jobqueue::JobQueue::spawn(JOB_QUEUE_WORKERS));

  tokio::spawn(health::run());
  tokio::spawn(metrics::run());
  tokio::spawn(reconciler::run());
  tokio::spawn(cert_renewal::run());

  let addr: SocketAddr = config.http_addr.parse().context("invalid HTTP_ADDR")?;
  let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind HTTP_ADDR")?;
  info!("glinrd listening on http://{addr}");

  axum::serve(listener, api::router().into_make_service_with_connect_info::<SocketAddr>())
    .await
    .context("http server exited")?;

  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mut term_signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
  let app = tokio::spawn(app());

  tokio::select! {
    res = app => return res?,
    _ = term_signal.recv() => {
      info!("received SIGTERM, shutting down");
    },
  }

  Ok(())
}
