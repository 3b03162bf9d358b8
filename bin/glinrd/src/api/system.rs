//! `GET /v1/health` and `GET /v1/system` (spec.md §6): unauthenticated
//! liveness/version probe plus a best-effort host resource snapshot.

use std::time::Instant;

use axum::Json;
use serde::Serialize;
use sysinfo::{Disks, System};

use crate::state;

#[derive(Serialize)]
pub struct HealthBody {
  ok: bool,
  version: &'static str,
  uptime_secs: u64,
}

pub async fn health() -> Json<HealthBody> {
  Json(HealthBody {
    ok: true,
    version: env!("CARGO_PKG_VERSION"),
    uptime_secs: uptime(state::started_at()).as_secs(),
  })
}

fn uptime(started_at: Instant) -> std::time::Duration {
  started_at.elapsed()
}

#[derive(Serialize)]
pub struct SystemBody {
  hostname: Option<String>,
  os: Option<String>,
  kernel_version: Option<String>,
  cpu_count: usize,
  cpu_percent: f32,
  memory_used: u64,
  memory_total: u64,
  disk_used: u64,
  disk_total: u64,
}

pub async fn system() -> Json<SystemBody> {
  let mut sys = System::new_all();
  sys.refresh_all();
  let cpu_percent = if sys.cpus().is_empty() {
    0.0
  } else {
    sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / sys.cpus().len() as f32
  };

  let disks = Disks::new_with_refreshed_list();
  let disk_total: u64 = disks.iter().map(|d| d.total_space()).sum();
  let disk_available: u64 = disks.iter().map(|d| d.available_space()).sum();

  Json(SystemBody {
    hostname: System::host_name(),
    os: System::long_os_version(),
    kernel_version: System::kernel_version(),
    cpu_count: sys.cpus().len(),
    cpu_percent,
    memory_used: sys.used_memory(),
    memory_total: sys.total_memory(),
    disk_used: disk_total.saturating_sub(disk_available),
    disk_total,
  })
}
