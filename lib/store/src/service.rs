use indexmap::IndexMap;
use rusqlite::{OptionalExtension, Row, params};

use crate::{
  Store, StoreError, StoreResult,
  entities::{
    DesiredState, HealthCheckType, HealthStatus, PortMapping, Service,
    ServiceStatus, VolumeMapping, now_ms,
  },
};

pub struct NewService {
  pub project_id: i64,
  pub name: String,
  pub image: String,
  pub env: IndexMap<String, String>,
  pub ports: Vec<PortMapping>,
  pub volumes: Vec<VolumeMapping>,
  pub health_check_type: HealthCheckType,
  pub health_path: Option<String>,
}

impl Store {
  pub async fn create_service(&self, new: NewService) -> StoreResult<Service> {
    self
      .with_conn(move |conn| {
        let now = now_ms();
        let env = serde_json::to_string(&new.env.into_iter().collect::<Vec<_>>())
          .map_err(|e| StoreError::Other(e.into()))?;
        let ports = serde_json::to_string(&new.ports)
          .map_err(|e| StoreError::Other(e.into()))?;
        let volumes = serde_json::to_string(&new.volumes)
          .map_err(|e| StoreError::Other(e.into()))?;
        conn.execute(
          "INSERT INTO services (
            project_id, name, image, env, ports, volumes,
            desired_state, status, container_id,
            health_check_type, health_path, health_status,
            restart_count, restart_window_at, last_exit_code, crash_looping,
            created_at, updated_at
          ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,NULL,?9,?10,?11,0,NULL,NULL,0,?12,?12)",
          params![
            new.project_id,
            new.name,
            new.image,
            env,
            ports,
            volumes,
            DesiredState::Stopped.to_string(),
            ServiceStatus::Created.to_string(),
            new.health_check_type.to_string(),
            new.health_path,
            HealthStatus::Unknown.to_string(),
            now,
          ],
        )?;
        let id = conn.last_insert_rowid();
        get_service_tx(conn, id)
      })
      .await
  }

  pub async fn get_service(&self, id: i64) -> StoreResult<Service> {
    self.with_conn(move |conn| get_service_tx(conn, id)).await
  }

  pub async fn list_services(&self, project_id: i64) -> StoreResult<Vec<Service>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{SELECT_SERVICE} WHERE project_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(params![project_id], row_to_service)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  pub async fn list_all_services(&self) -> StoreResult<Vec<Service>> {
    self
      .with_conn(move |conn| {
        let mut stmt =
          conn.prepare(&format!("{SELECT_SERVICE} ORDER BY id"))?;
        let rows = stmt
          .query_map([], row_to_service)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  /// Services that should currently be probed: running desired state, not
  /// crash-looping (spec.md §4.5).
  pub async fn list_probeable_services(&self) -> StoreResult<Vec<Service>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{SELECT_SERVICE} WHERE desired_state = ?1 AND crash_looping = 0 ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(params![DesiredState::Running.to_string()], row_to_service)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  pub async fn set_health_status(
    &self,
    id: i64,
    status: HealthStatus,
  ) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE services SET health_status = ?1, updated_at = ?2 WHERE id = ?3",
          params![status.to_string(), now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("service {id}")));
        }
        Ok(())
      })
      .await
  }

  pub async fn set_container_state(
    &self,
    id: i64,
    container_id: Option<&str>,
    status: ServiceStatus,
  ) -> StoreResult<()> {
    let container_id = container_id.map(str::to_string);
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE services SET container_id = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
          params![container_id, status.to_string(), now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("service {id}")));
        }
        Ok(())
      })
      .await
  }

  pub async fn set_desired_state(
    &self,
    id: i64,
    desired_state: DesiredState,
  ) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE services SET desired_state = ?1, updated_at = ?2 WHERE id = ?3",
          params![desired_state.to_string(), now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("service {id}")));
        }
        Ok(())
      })
      .await
  }

  /// Atomic pair used by the crash-loop governor (spec.md §4.1):
  /// records an observed restart's exit code / restart-window accounting.
  pub async fn update_service_restart(
    &self,
    id: i64,
    exit_code: i32,
    restart_count: i64,
    window_start: i64,
  ) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE services SET last_exit_code = ?1, restart_count = ?2,
           restart_window_at = ?3, updated_at = ?4 WHERE id = ?5",
          params![exit_code, restart_count, window_start, now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("service {id}")));
        }
        Ok(())
      })
      .await
  }

  /// Atomic pair used by the crash-loop governor (spec.md §4.1): flips
  /// `desired_state`/`crash_looping` together so no reader observes one
  /// without the other.
  pub async fn update_service_state(
    &self,
    id: i64,
    desired_state: DesiredState,
    crash_looping: bool,
  ) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE services SET desired_state = ?1, crash_looping = ?2, updated_at = ?3 WHERE id = ?4",
          params![desired_state.to_string(), crash_looping, now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("service {id}")));
        }
        Ok(())
      })
      .await
  }

  /// Clears the crash-loop latch and resets restart accounting (spec.md
  /// §4.4 "Explicit unlock").
  pub async fn unlock_crash_loop(&self, id: i64) -> StoreResult<Service> {
    self
      .with_conn(move |conn| {
        let service = get_service_tx(conn, id)?;
        if !service.crash_looping {
          return Err(StoreError::Invariant(format!(
            "service {id} is not crash-looping"
          )));
        }
        conn.execute(
          "UPDATE services SET crash_looping = 0, restart_count = 0,
           restart_window_at = NULL, updated_at = ?1 WHERE id = ?2",
          params![now_ms(), id],
        )?;
        get_service_tx(conn, id)
      })
      .await
  }

  pub async fn delete_service(&self, id: i64) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected =
          conn.execute("DELETE FROM services WHERE id = ?1", params![id])?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("service {id}")));
        }
        Ok(())
      })
      .await
  }
}

const SELECT_SERVICE: &str = "SELECT id, project_id, name, image, env, ports, volumes,
  desired_state, status, container_id, health_check_type, health_path,
  health_status, restart_count, restart_window_at, last_exit_code,
  crash_looping, created_at, updated_at FROM services";

fn get_service_tx(
  conn: &rusqlite::Connection,
  id: i64,
) -> StoreResult<Service> {
  conn
    .query_row(
      &format!("{SELECT_SERVICE} WHERE id = ?1"),
      params![id],
      row_to_service,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("service {id}")))
}

fn row_to_service(row: &Row) -> rusqlite::Result<Service> {
  let env_json: String = row.get(4)?;
  let ports_json: String = row.get(5)?;
  let volumes_json: String = row.get(6)?;
  let env_pairs: Vec<(String, String)> =
    serde_json::from_str(&env_json).unwrap_or_default();
  let env: IndexMap<String, String> = env_pairs.into_iter().collect();
  let ports: Vec<PortMapping> =
    serde_json::from_str(&ports_json).unwrap_or_default();
  let volumes: Vec<VolumeMapping> =
    serde_json::from_str(&volumes_json).unwrap_or_default();
  let desired_state: String = row.get(7)?;
  let status: String = row.get(8)?;
  let health_check_type: String = row.get(10)?;
  let health_status: String = row.get(12)?;

  Ok(Service {
    id: row.get(0)?,
    project_id: row.get(1)?,
    name: row.get(2)?,
    image: row.get(3)?,
    env,
    ports,
    volumes,
    desired_state: desired_state.parse().unwrap_or(DesiredState::Stopped),
    status: status.parse().unwrap_or(ServiceStatus::Error),
    container_id: row.get(9)?,
    health_check_type: health_check_type
      .parse()
      .unwrap_or(HealthCheckType::None),
    health_path: row.get(11)?,
    health_status: health_status.parse().unwrap_or(HealthStatus::Unknown),
    restart_count: row.get(13)?,
    restart_window_at: row.get(14)?,
    last_exit_code: row.get(15)?,
    crash_looping: row.get(16)?,
    created_at: row.get(17)?,
    updated_at: row.get(18)?,
  })
}

#[cfg(test)]
mod tests {
  use indexmap::IndexMap;

  use super::NewService;
  use crate::{entities::HealthCheckType, tests::test_store};

  fn new_service(project_id: i64) -> NewService {
    NewService {
      project_id,
      name: "api".to_string(),
      image: "nginx:1.25".to_string(),
      env: IndexMap::new(),
      ports: vec![],
      volumes: vec![],
      health_check_type: HealthCheckType::Http,
      health_path: Some("/healthz".to_string()),
    }
  }

  #[tokio::test]
  async fn create_and_fetch() {
    let store = test_store();
    let project = store.create_project("proj-a", "proj-a").await.unwrap();
    let service = store.create_service(new_service(project.id)).await.unwrap();
    let fetched = store.get_service(service.id).await.unwrap();
    assert_eq!(fetched.name, "api");
    assert_eq!(fetched.health_path.as_deref(), Some("/healthz"));
  }

  #[tokio::test]
  async fn unlock_requires_crash_looping() {
    let store = test_store();
    let project = store.create_project("proj-a", "proj-a").await.unwrap();
    let service = store.create_service(new_service(project.id)).await.unwrap();
    let err = store.unlock_crash_loop(service.id).await.unwrap_err();
    assert!(matches!(err, crate::StoreError::Invariant(_)));
  }

  #[tokio::test]
  async fn unlock_resets_counters() {
    let store = test_store();
    let project = store.create_project("proj-a", "proj-a").await.unwrap();
    let service = store.create_service(new_service(project.id)).await.unwrap();
    store
      .update_service_restart(service.id, 1, 5, 1000)
      .await
      .unwrap();
    store
      .update_service_state(
        service.id,
        crate::entities::DesiredState::Stopped,
        true,
      )
      .await
      .unwrap();
    let unlocked = store.unlock_crash_loop(service.id).await.unwrap();
    assert!(!unlocked.crash_looping);
    assert_eq!(unlocked.restart_count, 0);
    assert!(unlocked.restart_window_at.is_none());
  }
}
