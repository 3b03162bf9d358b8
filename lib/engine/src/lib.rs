//! Container Engine Adapter (spec.md §4.2): a thin capability interface
//! over the container runtime. [`Engine`] is implemented by
//! [`BollardEngine`] for production and can be faked in tests, the way the
//! teacher keeps `DockerClient` behind a swappable accessor
//! (`bin/periphery/src/state.rs::docker_client`) rather than hand-rolling a
//! protocol client per call site.

mod bollard_engine;
mod error;
mod network;
mod types;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub use bollard_engine::BollardEngine;
pub use error::{EngineError, EngineResult};
pub use network::{NETWORK_OWNER_LABEL, NETWORK_PROJECT_LABEL, NetworkFabric};
pub use types::{ContainerSpec, ContainerStats, ContainerStatus, PortSpec, VolumeSpec};

/// Base64-encoded registry credentials, resolved by the caller from a
/// registry id before a pull (spec.md §4.2: "Unknown registry id =>
/// anonymous pull").
#[derive(Debug, Clone)]
pub struct RegistryAuth {
  pub username: String,
  pub password: String,
}

#[derive(Debug, Clone)]
pub struct NetworkInfo {
  pub id: String,
  pub owner_label: Option<String>,
}

#[async_trait]
pub trait Engine: Send + Sync {
  async fn pull_image(
    &self,
    image: &str,
    auth: Option<RegistryAuth>,
  ) -> EngineResult<()>;

  async fn create_container(
    &self,
    name: &str,
    spec: &ContainerSpec,
    labels: HashMap<String, String>,
  ) -> EngineResult<String>;

  async fn start_container(&self, id: &str) -> EngineResult<()>;
  async fn stop_container(&self, id: &str) -> EngineResult<()>;
  async fn restart_container(&self, id: &str) -> EngineResult<()>;
  async fn remove_container(&self, id: &str) -> EngineResult<()>;
  async fn inspect_container(&self, id: &str) -> EngineResult<ContainerStatus>;

  async fn container_logs(
    &self,
    id: &str,
    follow: bool,
  ) -> EngineResult<BoxStream<'static, EngineResult<Bytes>>>;

  /// 15 s cadence, first sample sent immediately (spec.md §4.2).
  async fn container_stats(
    &self,
    id: &str,
  ) -> EngineResult<BoxStream<'static, EngineResult<ContainerStats>>>;

  async fn inspect_network(&self, name: &str) -> EngineResult<Option<NetworkInfo>>;
  async fn create_network(
    &self,
    name: &str,
    labels: HashMap<String, String>,
  ) -> EngineResult<()>;
  async fn connect_network(
    &self,
    network: &str,
    container: &str,
    aliases: &[String],
  ) -> EngineResult<()>;
  async fn disconnect_network(&self, network: &str, container: &str) -> EngineResult<()>;
  async fn remove_network(&self, name: &str) -> EngineResult<()>;
}
