//! Historical metrics loop (SPEC_FULL.md §11): periodically samples host
//! resource usage via `sysinfo` — the same crate `api::system` already
//! uses for the live `GET /v1/system` snapshot — and persists it for
//! trend queries, with a bounded retention window.

use std::time::Duration;

use glinr_store::entities::HistoricalMetric;
use sysinfo::{Disks, Networks, System};
use tracing::warn;

/// Cadence between samples.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(60);
/// How long a sample is kept before being trimmed.
const RETENTION: i64 = 7 * 24 * 60 * 60 * 1000;
/// Trim runs far less often than sampling; no need to scan the table on
/// every tick.
const TRIM_EVERY: u32 = 60;

/// Runs forever, sampling once per [`SAMPLE_INTERVAL`]. Spawned as a
/// background task from `main`.
pub async fn run() {
  let mut sys = System::new_all();
  let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
  let mut ticks: u32 = 0;

  loop {
    ticker.tick().await;
    ticks += 1;

    sys.refresh_cpu_usage();
    sys.refresh_memory();
    let disks = Disks::new_with_refreshed_list();
    let networks = Networks::new_with_refreshed_list();

    let cpu_percent = if sys.cpus().is_empty() {
      0.0
    } else {
      sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() as f64 / sys.cpus().len() as f64
    };
    let disk_total: u64 = disks.iter().map(|d| d.total_space()).sum();
    let disk_available: u64 = disks.iter().map(|d| d.available_space()).sum();
    let (net_rx, net_tx) = networks.iter().fold((0u64, 0u64), |(rx, tx), (_, data)| {
      (rx + data.total_received(), tx + data.total_transmitted())
    });

    let metric = HistoricalMetric {
      timestamp: glinr_store::entities::now_ms(),
      cpu_percent,
      memory_used: sys.used_memory() as i64,
      memory_total: sys.total_memory() as i64,
      disk_used: disk_total.saturating_sub(disk_available) as i64,
      disk_total: disk_total as i64,
      net_rx: net_rx as i64,
      net_tx: net_tx as i64,
    };

    if let Err(e) = crate::state::store().record_metric(metric).await {
      warn!(error = %e, "failed to record historical metric sample");
    }

    if ticks % TRIM_EVERY == 0 {
      let retain_since = glinr_store::entities::now_ms() - RETENTION;
      if let Err(e) = crate::state::store().trim_metrics(retain_since).await {
        warn!(error = %e, "failed to trim historical metrics");
      }
    }
  }
}
