//! Desired-state transitions for a single service (spec.md §4.4): deploy,
//! start, stop, restart, and the crash-loop observation/unlock pair. Every
//! public function here takes the service's per-id mutex first
//! (spec.md §5: "All writes for a single service ... are serialized by a
//! per-service mutex"), mirroring the teacher's resource-level locking in
//! `bin/core/src/resource/server.rs` update paths.

use std::collections::HashMap;

use glinr_engine::{ContainerSpec, PortSpec, VolumeSpec};
use glinr_response::{ApiError, ApiResult};
use glinr_store::entities::{
  AuditAction, DesiredState, HealthStatus, Service, ServiceStatus, VolumeMode,
};

use crate::error::store_err;
use crate::lifecycle::crashloop;
use crate::state;

/// Label value identifying this platform as a container's manager
/// (spec.md §4.4 "Create with labels `{project_id, service_id,
/// managed_by=<platform>}`").
pub const MANAGED_BY: &str = "glinrd";

fn labels(project_id: i64, service_id: i64) -> HashMap<String, String> {
  let mut labels = HashMap::new();
  labels.insert("project_id".to_string(), project_id.to_string());
  labels.insert("service_id".to_string(), service_id.to_string());
  labels.insert("managed_by".to_string(), MANAGED_BY.to_string());
  labels
}

fn to_container_spec(service: &Service) -> ContainerSpec {
  ContainerSpec {
    image: service.image.clone(),
    env: service.env.clone(),
    ports: service
      .ports
      .iter()
      .map(|p| PortSpec {
        host: p.host,
        container: p.container,
      })
      .collect(),
    volumes: service
      .volumes
      .iter()
      .map(|v| VolumeSpec {
        host: v.host.clone(),
        container: v.container.clone(),
        read_only: v.mode == VolumeMode::Ro,
      })
      .collect(),
  }
}

fn container_name(project_id: i64, service_id: i64) -> String {
  format!("glinr_svc_{project_id}_{service_id}")
}

/// Full deploy algorithm (spec.md §4.4 "Deploy algorithm"), steps 1-6.
/// Failure at any step leaves the service in `error`; step 4
/// (network attachment) is idempotent so nothing partial is retained.
pub async fn deploy(service_id: i64) -> ApiResult<Service> {
  let _guard = state::service_locks().lock_for(&service_id).lock().await;
  deploy_locked(service_id).await
}

async fn deploy_locked(service_id: i64) -> ApiResult<Service> {
  let store = state::store();
  let service = store.get_service(service_id).await.map_err(store_err)?;
  if service.crash_looping {
    return Err(ApiError::validation(format!(
      "service {service_id} is crash-looping, unlock it before deploying"
    )));
  }
  let project = store.get_project(service.project_id).await.map_err(store_err)?;

  let engine = state::engine();
  let result: ApiResult<Service> = async {
    engine.pull_image(&service.image, None).await?;

    if let Some(existing) = service.container_id.clone() {
      let _ = engine.stop_container(&existing).await;
      let _ = engine.remove_container(&existing).await;
    }

    let name = container_name(service.project_id, service.id);
    let spec = to_container_spec(&service);
    let container_id = engine
      .create_container(&name, &spec, labels(service.project_id, service.id))
      .await?;

    state::network_fabric().ensure_network(service.project_id).await?;
    state::network_fabric()
      .connect_service(service.project_id, &project.slug, &container_id, &service.name)
      .await?;

    engine.start_container(&container_id).await?;
    let status = engine.inspect_container(&container_id).await?;

    store
      .set_container_state(service.id, Some(&container_id), parse_status(&status.state))
      .await
      .map_err(store_err)?;
    store
      .set_desired_state(service.id, DesiredState::Running)
      .await
      .map_err(store_err)?;

    Ok(store.get_service(service.id).await.map_err(store_err)?)
  }
  .await;

  match result {
    Ok(service) => {
      store
        .record_audit(
          "system",
          AuditAction::ServiceDeploy,
          "service",
          &service.id.to_string(),
          serde_json::json!({ "image": service.image }),
        )
        .await
        .map_err(store_err)?;
      Ok(service)
    }
    Err(err) => {
      let _ = store
        .set_container_state(service_id, service.container_id.as_deref(), ServiceStatus::Error)
        .await;
      let _ = store
        .record_audit(
          "system",
          AuditAction::ServiceDeploy,
          "service",
          &service_id.to_string(),
          serde_json::json!({ "error": err.to_string() }),
        )
        .await;
      Err(err)
    }
  }
}

fn parse_status(engine_state: &str) -> ServiceStatus {
  match engine_state {
    "running" => ServiceStatus::Running,
    "exited" => ServiceStatus::Exited,
    "dead" => ServiceStatus::Dead,
    "created" => ServiceStatus::Created,
    "restarting" => ServiceStatus::Starting,
    "paused" | "removing" => ServiceStatus::Stopping,
    _ => ServiceStatus::Error,
  }
}

/// Starts a service: a fresh [`deploy`] when no container exists yet,
/// otherwise a plain engine start against the existing container
/// (spec.md §4.4 state machine: `stopped -> starting -> running`).
pub async fn start(service_id: i64) -> ApiResult<Service> {
  let _guard = state::service_locks().lock_for(&service_id).lock().await;
  let store = state::store();
  let service = store.get_service(service_id).await.map_err(store_err)?;
  if service.crash_looping {
    return Err(ApiError::validation(format!(
      "service {service_id} is crash-looping, unlock it before starting"
    )));
  }

  match &service.container_id {
    None => deploy_locked(service_id).await,
    Some(container_id) => {
      let engine = state::engine();
      engine.start_container(container_id).await?;
      let status = engine.inspect_container(container_id).await?;
      store
        .set_container_state(service_id, Some(container_id), parse_status(&status.state))
        .await
        .map_err(store_err)?;
      store
        .set_desired_state(service_id, DesiredState::Running)
        .await
        .map_err(store_err)?;
      store
        .record_audit(
          "system",
          AuditAction::ServiceStart,
          "service",
          &service_id.to_string(),
          serde_json::json!({}),
        )
        .await
        .map_err(store_err)?;
      Ok(store.get_service(service_id).await.map_err(store_err)?)
    }
  }
}

/// Stops a service's container, if any (spec.md §4.4 state machine:
/// `running -> stopping -> stopped`).
pub async fn stop(service_id: i64) -> ApiResult<Service> {
  let _guard = state::service_locks().lock_for(&service_id).lock().await;
  let store = state::store();
  let service = store.get_service(service_id).await.map_err(store_err)?;

  if let Some(container_id) = &service.container_id {
    state::engine().stop_container(container_id).await?;
  }
  store
    .set_container_state(
      service_id,
      service.container_id.as_deref(),
      ServiceStatus::Stopped,
    )
    .await
    .map_err(store_err)?;
  store
    .set_desired_state(service_id, DesiredState::Stopped)
    .await
    .map_err(store_err)?;
  store
    .record_audit(
      "system",
      AuditAction::ServiceStop,
      "service",
      &service_id.to_string(),
      serde_json::json!({}),
    )
    .await
    .map_err(store_err)?;
  Ok(store.get_service(service_id).await.map_err(store_err)?)
}

/// Restart is modeled as stop then start (spec.md §4.4 "Restart is
/// modeled as stop -> start").
pub async fn restart(service_id: i64) -> ApiResult<Service> {
  stop(service_id).await?;
  let result = start(service_id).await;
  if result.is_ok() {
    state::store()
      .record_audit(
        "system",
        AuditAction::ServiceRestart,
        "service",
        &service_id.to_string(),
        serde_json::json!({}),
      )
      .await
      .map_err(store_err)?;
  }
  result
}

/// Feeds one observed restart (with its exit code) into the crash-loop
/// governor (spec.md §4.4 "Crash-loop governor"). Called by the
/// reconciler loop when it notices a service's container restarted.
pub async fn observe_restart(service_id: i64, exit_code: i32, now_ms: i64) -> ApiResult<()> {
  let _guard = state::service_locks().lock_for(&service_id).lock().await;
  let store = state::store();
  let service = store.get_service(service_id).await.map_err(store_err)?;

  let outcome = crashloop::apply_restart(
    service.restart_count,
    service.restart_window_at,
    exit_code,
    now_ms,
  );

  store
    .update_service_restart(service_id, exit_code, outcome.restart_count, outcome.window_start)
    .await
    .map_err(store_err)?;

  if outcome.should_crash_loop {
    store
      .update_service_state(service_id, DesiredState::Stopped, true)
      .await
      .map_err(store_err)?;
    if let Some(container_id) = &service.container_id {
      let _ = state::engine().stop_container(container_id).await;
    }
    store
      .record_audit(
        "system",
        AuditAction::ServiceCrashloopStop,
        "service",
        &service_id.to_string(),
        serde_json::json!({ "restart_count": outcome.restart_count }),
      )
      .await
      .map_err(store_err)?;
  }

  Ok(())
}

/// Explicit unlock (spec.md §4.4 "Explicit unlock"): clears the latch and
/// resets restart accounting. An admin/deployer action, not automatic.
pub async fn unlock(service_id: i64, actor: &str) -> ApiResult<Service> {
  let _guard = state::service_locks().lock_for(&service_id).lock().await;
  let store = state::store();
  let service = store.unlock_crash_loop(service_id).await.map_err(|e| match e {
    glinr_store::StoreError::Invariant(msg) => ApiError::validation(msg),
    other => store_err(other),
  })?;
  store
    .set_health_status(service_id, HealthStatus::Unknown)
    .await
    .map_err(store_err)?;
  store
    .record_audit(
      actor,
      AuditAction::ServiceCrashloopUnlock,
      "service",
      &service_id.to_string(),
      serde_json::json!({}),
    )
    .await
    .map_err(store_err)?;
  Ok(service)
}

#[cfg(test)]
mod tests {
  use super::*;
  use glinr_store::service::NewService;

  /// A service with no container yet (`container_id = None`), so
  /// `observe_restart`'s crash-loop branch never reaches the engine —
  /// exactly the shape the reconciler drives this with in production,
  /// since the container itself is what's being observed, not deployed
  /// here.
  async fn new_unstarted_service(name: &str) -> i64 {
    let store = state::test_store();
    let project = store.create_project(name, name).await.unwrap();
    let service = store
      .create_service(NewService {
        project_id: project.id,
        name: name.to_string(),
        image: "nginx:1.25".to_string(),
        env: Default::default(),
        ports: vec![],
        volumes: vec![],
        health_check_type: glinr_store::entities::HealthCheckType::None,
        health_path: None,
      })
      .await
      .unwrap();
    service.id
  }

  #[tokio::test]
  async fn fifth_identical_nonzero_exit_latches_crash_loop() {
    let service_id = new_unstarted_service("crashloop-latch").await;

    for tick in 0..5i64 {
      observe_restart(service_id, 1, tick * 1000).await.unwrap();
    }

    let service = state::test_store().get_service(service_id).await.unwrap();
    assert!(service.crash_looping);
    assert_eq!(service.desired_state, DesiredState::Stopped);
    assert_eq!(service.restart_count, 5);
  }

  #[tokio::test]
  async fn fewer_than_five_identical_exits_do_not_latch() {
    let service_id = new_unstarted_service("crashloop-no-latch").await;

    for tick in 0..4i64 {
      observe_restart(service_id, 1, tick * 1000).await.unwrap();
    }

    let service = state::test_store().get_service(service_id).await.unwrap();
    assert!(!service.crash_looping);
    assert_eq!(service.desired_state, DesiredState::Stopped);
  }

  #[tokio::test]
  async fn unlock_clears_latch_and_resets_counters() {
    let service_id = new_unstarted_service("crashloop-unlock").await;
    for tick in 0..5i64 {
      observe_restart(service_id, 1, tick * 1000).await.unwrap();
    }
    let locked = state::test_store().get_service(service_id).await.unwrap();
    assert!(locked.crash_looping);

    let unlocked = unlock(service_id, "admin").await.unwrap();
    assert!(!unlocked.crash_looping);
    assert_eq!(unlocked.restart_count, 0);
    assert_eq!(unlocked.restart_window_at, None);
    assert_eq!(unlocked.desired_state, DesiredState::Stopped);
  }

  #[tokio::test]
  async fn unlocking_a_non_crash_looping_service_is_an_error() {
    let service_id = new_unstarted_service("crashloop-unlock-noop").await;
    let err = unlock(service_id, "admin").await.unwrap_err();
    assert_eq!(err.kind, glinr_response::Kind::Validation);
  }
}
