use std::{collections::HashMap, sync::Arc};

use crate::{Engine, EngineError, EngineResult};

/// Label naming the platform as the owner of a network it created (spec.md
/// §4.3). Presence with a foreign value, or absence on an existing network
/// of the expected name, is a fatal refusal to touch it.
pub const NETWORK_OWNER_LABEL: &str = "owner";
pub const NETWORK_PROJECT_LABEL: &str = "project_id";
const OWNER_VALUE: &str = "glinrd";

/// Per-project bridge network with deterministic service aliases (spec.md
/// §4.3). Holds no state of its own — every call re-derives from the
/// engine, mirroring the Store-as-linearization-point design (spec.md §9).
pub struct NetworkFabric {
  engine: Arc<dyn Engine>,
}

impl NetworkFabric {
  pub fn new(engine: Arc<dyn Engine>) -> Self {
    Self { engine }
  }

  pub fn network_name(project_id: i64) -> String {
    format!("glinr_proj_{project_id}")
  }

  /// Creates the project's network if absent. Refuses (never silently
  /// takes over) if a network of that name exists without our `owner`
  /// label.
  pub async fn ensure_network(&self, project_id: i64) -> EngineResult<()> {
    let name = Self::network_name(project_id);
    match self.engine.inspect_network(&name).await? {
      None => {
        let mut labels = HashMap::new();
        labels.insert(NETWORK_OWNER_LABEL.to_string(), OWNER_VALUE.to_string());
        labels.insert(NETWORK_PROJECT_LABEL.to_string(), project_id.to_string());
        self.engine.create_network(&name, labels).await
      }
      Some(info) => self.assert_owned(&name, &info),
    }
  }

  /// Connects a service container with its short and fully-qualified
  /// aliases (spec.md §4.3). Regenerated on every connect, so renames
  /// propagate by reconnecting.
  pub async fn connect_service(
    &self,
    project_id: i64,
    project_slug: &str,
    container_id: &str,
    service_name: &str,
  ) -> EngineResult<()> {
    let name = Self::network_name(project_id);
    let aliases = vec![
      service_name.to_string(),
      format!("{service_name}.{project_slug}.local"),
    ];
    self
      .engine
      .connect_network(&name, container_id, &aliases)
      .await
  }

  pub async fn disconnect_service(
    &self,
    project_id: i64,
    container_id: &str,
  ) -> EngineResult<()> {
    let name = Self::network_name(project_id);
    self.engine.disconnect_network(&name, container_id).await
  }

  /// Explicit removal, gated on the `owner` label (spec.md §4.3, §8
  /// "Network labels").
  pub async fn remove_network(&self, project_id: i64) -> EngineResult<()> {
    let name = Self::network_name(project_id);
    match self.engine.inspect_network(&name).await? {
      None => Ok(()),
      Some(info) => {
        self.assert_owned(&name, &info)?;
        self.engine.remove_network(&name).await
      }
    }
  }

  fn assert_owned(&self, name: &str, info: &crate::NetworkInfo) -> EngineResult<()> {
    match info.owner_label.as_deref() {
      Some(OWNER_VALUE) => Ok(()),
      _ => Err(EngineError::Conflict(format!(
        "network {name} exists with a foreign or missing owner label, refusing to touch it"
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;
  use bytes::Bytes;
  use futures_util::stream::{self, BoxStream};

  use super::*;
  use crate::{ContainerSpec, ContainerStats, ContainerStatus, NetworkInfo, RegistryAuth};

  #[derive(Default)]
  struct FakeEngine {
    networks: Mutex<HashMap<String, NetworkInfo>>,
  }

  #[async_trait]
  impl Engine for FakeEngine {
    async fn pull_image(&self, _: &str, _: Option<RegistryAuth>) -> EngineResult<()> {
      Ok(())
    }
    async fn create_container(
      &self,
      _: &str,
      _: &ContainerSpec,
      _: HashMap<String, String>,
    ) -> EngineResult<String> {
      Ok("container".to_string())
    }
    async fn start_container(&self, _: &str) -> EngineResult<()> {
      Ok(())
    }
    async fn stop_container(&self, _: &str) -> EngineResult<()> {
      Ok(())
    }
    async fn restart_container(&self, _: &str) -> EngineResult<()> {
      Ok(())
    }
    async fn remove_container(&self, _: &str) -> EngineResult<()> {
      Ok(())
    }
    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerStatus> {
      Ok(ContainerStatus {
        id: id.to_string(),
        name: id.to_string(),
        state: "running".to_string(),
        started_at: None,
        env: Default::default(),
        exit_code: None,
        restart_count: None,
      })
    }
    async fn container_logs(
      &self,
      _: &str,
      _: bool,
    ) -> EngineResult<BoxStream<'static, EngineResult<Bytes>>> {
      Ok(Box::pin(stream::empty()))
    }
    async fn container_stats(
      &self,
      _: &str,
    ) -> EngineResult<BoxStream<'static, EngineResult<ContainerStats>>> {
      Ok(Box::pin(stream::empty()))
    }
    async fn inspect_network(&self, name: &str) -> EngineResult<Option<NetworkInfo>> {
      Ok(self.networks.lock().unwrap().get(name).map(|n| NetworkInfo {
        id: n.id.clone(),
        owner_label: n.owner_label.clone(),
      }))
    }
    async fn create_network(
      &self,
      name: &str,
      labels: HashMap<String, String>,
    ) -> EngineResult<()> {
      self.networks.lock().unwrap().insert(
        name.to_string(),
        NetworkInfo {
          id: name.to_string(),
          owner_label: labels.get(NETWORK_OWNER_LABEL).cloned(),
        },
      );
      Ok(())
    }
    async fn connect_network(&self, _: &str, _: &str, _: &[String]) -> EngineResult<()> {
      Ok(())
    }
    async fn disconnect_network(&self, _: &str, _: &str) -> EngineResult<()> {
      Ok(())
    }
    async fn remove_network(&self, name: &str) -> EngineResult<()> {
      self.networks.lock().unwrap().remove(name);
      Ok(())
    }
  }

  #[tokio::test]
  async fn ensure_network_creates_once() {
    let fabric = NetworkFabric::new(Arc::new(FakeEngine::default()));
    fabric.ensure_network(1).await.unwrap();
    fabric.ensure_network(1).await.unwrap();
  }

  #[tokio::test]
  async fn ensure_network_refuses_foreign_owner() {
    let engine = Arc::new(FakeEngine::default());
    engine.networks.lock().unwrap().insert(
      NetworkFabric::network_name(2),
      NetworkInfo {
        id: "net-2".to_string(),
        owner_label: Some("someone-else".to_string()),
      },
    );
    let fabric = NetworkFabric::new(engine);
    let err = fabric.ensure_network(2).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
  }

  #[tokio::test]
  async fn remove_network_refuses_foreign_owner() {
    let engine = Arc::new(FakeEngine::default());
    engine.networks.lock().unwrap().insert(
      NetworkFabric::network_name(3),
      NetworkInfo {
        id: "net-3".to_string(),
        owner_label: None,
      },
    );
    let fabric = NetworkFabric::new(engine);
    let err = fabric.remove_network(3).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
  }
}
