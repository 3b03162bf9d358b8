//! Health prober loop (spec.md §4.5): polls every service that is
//! currently desired-running and not crash-looping, classifying each by
//! its configured check type, and persists the result.

use std::sync::OnceLock;
use std::time::Duration;

use glinr_store::entities::{HealthCheckType, HealthStatus, Service};
use tokio::net::TcpStream;
use tracing::warn;

use crate::error::store_err;
use crate::state;

/// Floor on the probe cadence (spec.md §4.5 "at least 30s between
/// rounds").
const PROBE_INTERVAL: Duration = Duration::from_secs(30);
/// Pacing between services within a round, so a round of many services
/// doesn't burst-dial everything at once (spec.md §4.5 "~100ms pacing").
const SERVICE_PACING: Duration = Duration::from_millis(100);
/// HTTP probe timeout (spec.md §4.5 "5s timeout, no keep-alive").
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// TCP dial timeout (spec.md §4.5 "dial ... with a 3s timeout") — shorter
/// than the HTTP timeout since a bare connect should fail fast.
const TCP_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Identifies the prober in request logs on the probed service
/// (spec.md §4.5 "User-Agent identifies the prober").
fn http_client() -> &'static reqwest::Client {
  static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
  CLIENT.get_or_init(|| {
    reqwest::Client::builder()
      .user_agent(concat!("glinrd-health-prober/", env!("CARGO_PKG_VERSION")))
      .build()
      .expect("health prober http client")
  })
}

/// Runs forever, probing once per [`PROBE_INTERVAL`]. Spawned as a
/// background task from `main`.
pub async fn run() {
  let mut ticker = tokio::time::interval(PROBE_INTERVAL);
  loop {
    ticker.tick().await;
    if let Err(e) = probe_round().await {
      warn!(error = %e, "health probe round failed to list services");
    }
  }
}

async fn probe_round() -> glinr_response::ApiResult<()> {
  let store = state::store();
  let services = store
    .list_probeable_services()
    .await
    .map_err(crate::error::store_err)?;
  for service in services {
    let status = probe_one(&service).await;
    if let Err(e) = store.set_health_status(service.id, status).await {
      warn!(service_id = service.id, error = %e, "failed to persist health status");
    }
    tokio::time::sleep(SERVICE_PACING).await;
  }
  Ok(())
}

/// Crash-looping and not-running services are `unknown` without dialing
/// anything (spec.md §4.5 "unknown for crash-looping/not-running
/// services").
async fn probe_one(service: &Service) -> HealthStatus {
  if service.crash_looping {
    return HealthStatus::Unknown;
  }

  match service.health_check_type {
    HealthCheckType::None => HealthStatus::Unknown,
    HealthCheckType::Http => probe_http(service).await,
    HealthCheckType::Tcp | HealthCheckType::Postgres | HealthCheckType::Mysql | HealthCheckType::Redis => {
      probe_tcp(service).await
    }
  }
}

/// Derives the probe URL: (a) the service's own port + configured
/// `health_path`, or (b) failing that, the first TLS-off route's domain
/// and path (spec.md §4.5 "falls back to the first non-TLS route").
async fn probe_url(service: &Service) -> Option<String> {
  if let Some(port) = service.ports.first() {
    let path = service.health_path.as_deref().unwrap_or("/");
    return Some(format!("http://127.0.0.1:{}{}", port.host, path));
  }

  let routes = state::store().list_routes(service.id).await.map_err(store_err).ok()?;
  let route = routes.iter().find(|r| !r.tls)?;
  Some(format!("http://{}{}", route.domain, route.path_or_root()))
}

async fn probe_http(service: &Service) -> HealthStatus {
  let Some(url) = probe_url(service).await else {
    return HealthStatus::Unknown;
  };

  let result = tokio::time::timeout(PROBE_TIMEOUT, http_client().get(&url).send()).await;
  match result {
    // 2xx/3xx/4xx all count as reachable; only 5xx and transport errors fail
    // the check (spec.md §4.5 "Status classes").
    Ok(Ok(response)) if !response.status().is_server_error() => HealthStatus::Ok,
    _ => HealthStatus::Fail,
  }
}

/// Used for plain TCP as well as the `postgres`/`mysql`/`redis` check
/// types, which reduce to "can we open a socket" (spec.md §9 Open
/// Questions: database-aware health checks are out of scope, a
/// connection probe stands in).
async fn probe_tcp(service: &Service) -> HealthStatus {
  let Some(port) = service.ports.first() else {
    return HealthStatus::Unknown;
  };
  let addr = format!("127.0.0.1:{}", port.host);
  match tokio::time::timeout(TCP_PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
    Ok(Ok(_)) => HealthStatus::Ok,
    _ => HealthStatus::Fail,
  }
}
