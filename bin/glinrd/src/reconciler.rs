//! Crash-loop/event reconciler (spec.md §5, §4.4): periodically compares
//! each service's container state against what was last recorded,
//! feeding newly observed restarts into
//! [`crate::lifecycle::governor::observe_restart`]. The governor itself
//! only folds a restart into its sliding window when told one happened —
//! something has to notice. This loop is that something.

use std::sync::OnceLock;
use std::time::Duration;

use glinr_cache::CloneCache;
use tracing::warn;

use crate::lifecycle::governor;
use crate::state;

/// Cadence between reconciliation passes. Independent of, and faster
/// than, the health prober's 30 s cadence (spec.md §4.5) since a
/// crash-looping container can restart several times before a health
/// check would even notice it was gone.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Last engine-reported `restart_count` seen per service (spec.md §4.2's
/// `ContainerStatus.restart_count`). A service exiting with the *same*
/// code every time (the common crash-loop shape — scenario 2 exits `1`
/// on every iteration) is otherwise indistinguishable from "no new
/// restart happened" if dedup keys off `last_exit_code` alone; the
/// engine's own monotonic restart counter is the only reliable signal
/// that another restart actually occurred between reconciliation passes.
fn last_seen_restarts() -> &'static CloneCache<i64, i64> {
  static CACHE: OnceLock<CloneCache<i64, i64>> = OnceLock::new();
  CACHE.get_or_init(CloneCache::default)
}

/// Runs forever, reconciling once per [`RECONCILE_INTERVAL`]. Spawned as
/// a background task from `main`.
pub async fn run() {
  let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
  loop {
    ticker.tick().await;
    if let Err(e) = reconcile_once().await {
      warn!(error = %e, "reconciliation pass failed to list services");
    }
  }
}

async fn reconcile_once() -> glinr_response::ApiResult<()> {
  let store = state::store();
  let services = store
    .list_all_services()
    .await
    .map_err(crate::error::store_err)?;

  for service in services {
    let Some(container_id) = &service.container_id else {
      continue;
    };
    // A service that isn't meant to be running was stopped/removed by
    // us; nothing to reconcile against.
    if service.desired_state != glinr_store::entities::DesiredState::Running {
      continue;
    }

    let status = match state::engine().inspect_container(container_id).await {
      Ok(status) => status,
      Err(_) => continue,
    };

    let Some(exit_code) = status.exit_code else {
      continue;
    };
    // Only a fresh exit the governor hasn't already folded in counts as
    // a new restart event.
    if status.state != "exited" && status.state != "dead" {
      continue;
    }

    let engine_restarts = status.restart_count.unwrap_or(0);
    let previous = last_seen_restarts().get(&service.id).await.unwrap_or(0);
    if engine_restarts <= previous {
      continue;
    }
    last_seen_restarts().insert(service.id, engine_restarts).await;

    // One or more restarts happened since the last pass; fold each in
    // with the current exit code, the only one the engine still reports.
    for _ in previous..engine_restarts {
      if let Err(e) = governor::observe_restart(service.id, exit_code, glinr_store::entities::now_ms()).await {
        warn!(service_id = service.id, error = %e, "failed to record observed restart");
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn restart_count_increase_is_detected_even_with_repeated_exit_code() {
    let cache: CloneCache<i64, i64> = CloneCache::default();
    // Simulates five reconcile passes against a container that always
    // exits 1, where only the engine's restart_count ever changes.
    let mut detected = 0;
    for observed_restarts in 1..=5i64 {
      let previous = cache.get(&1).await.unwrap_or(0);
      if observed_restarts > previous {
        cache.insert(1, observed_restarts).await;
        detected += observed_restarts - previous;
      }
    }
    assert_eq!(detected, 5);
  }
}
