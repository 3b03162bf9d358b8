use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Everything [`crate::Engine::create`] needs to materialize a container
/// (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct ContainerSpec {
  pub image: String,
  pub env: IndexMap<String, String>,
  pub ports: Vec<PortSpec>,
  pub volumes: Vec<VolumeSpec>,
}

#[derive(Debug, Clone, Copy)]
pub struct PortSpec {
  pub host: u16,
  pub container: u16,
}

#[derive(Debug, Clone)]
pub struct VolumeSpec {
  pub host: String,
  pub container: String,
  pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
  pub id: String,
  pub name: String,
  pub state: String,
  pub started_at: Option<String>,
  pub env: IndexMap<String, String>,
  /// Exit code of the most recent stop, when the engine has one on hand.
  /// Feeds the crash-loop governor's restart accounting (spec.md §4.4);
  /// not one of spec.md §4.2's literal four fields, but the governor has
  /// no other source for it.
  pub exit_code: Option<i32>,
  /// The engine's own restart counter for this container, when available.
  /// Informational only — the governor keeps its own sliding-window count.
  pub restart_count: Option<i64>,
}

/// One stats sample, emitted on a 15 s cadence with the first sample sent
/// immediately (spec.md §4.2, §9 "Stats generation").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContainerStats {
  pub cpu_percent: f64,
  pub memory_usage: u64,
  pub memory_limit: u64,
  pub net_rx: u64,
  pub net_tx: u64,
  pub block_read: u64,
  pub block_write: u64,
}

impl ContainerStats {
  pub fn memory_percent(&self) -> f64 {
    if self.memory_limit == 0 {
      0.0
    } else {
      self.memory_usage as f64 / self.memory_limit as f64 * 100.0
    }
  }
}
