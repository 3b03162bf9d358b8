//! `/v1/services` and the project-scoped `/v1/projects/:id/services`
//! (spec.md §6): declaration CRUD plus the lifecycle actions, which all
//! delegate to [`crate::lifecycle::governor`] rather than touching the
//! engine or Store directly.

use axum::{
  Json,
  extract::{
    Path, Query,
    ws::{Message, WebSocket, WebSocketUpgrade},
  },
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::StreamExt;
use glinr_store::entities::{HealthCheckType, PortMapping, Service, VolumeMapping};
use glinr_store::service::NewService;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::error::store_err;
use crate::lifecycle::governor;
use crate::state;

pub async fn list_for_project(
  _auth: AuthContext,
  Path(project_id): Path<i64>,
) -> glinr_response::ApiResult<Json<Vec<Service>>> {
  Ok(Json(
    state::store().list_services(project_id).await.map_err(store_err)?,
  ))
}

#[derive(Deserialize)]
pub struct CreateServiceBody {
  pub name: String,
  pub image: String,
  #[serde(default)]
  pub env: IndexMap<String, String>,
  #[serde(default)]
  pub ports: Vec<PortMapping>,
  #[serde(default)]
  pub volumes: Vec<VolumeMapping>,
  #[serde(default = "default_health_check_type")]
  pub health_check_type: HealthCheckType,
  #[serde(default)]
  pub health_path: Option<String>,
}

fn default_health_check_type() -> HealthCheckType {
  HealthCheckType::None
}

pub async fn create(
  auth: AuthContext,
  Path(project_id): Path<i64>,
  Json(body): Json<CreateServiceBody>,
) -> glinr_response::ApiResult<Json<Service>> {
  auth.require_write()?;
  let service = state::store()
    .create_service(NewService {
      project_id,
      name: body.name,
      image: body.image,
      env: body.env,
      ports: body.ports,
      volumes: body.volumes,
      health_check_type: body.health_check_type,
      health_path: body.health_path,
    })
    .await
    .map_err(store_err)?;
  Ok(Json(service))
}

pub async fn get(
  _auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<Service>> {
  Ok(Json(state::store().get_service(id).await.map_err(store_err)?))
}

pub async fn start(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<Service>> {
  auth.require_write()?;
  Ok(Json(governor::start(id).await?))
}

pub async fn stop(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<Service>> {
  auth.require_write()?;
  Ok(Json(governor::stop(id).await?))
}

pub async fn restart(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<Service>> {
  auth.require_write()?;
  Ok(Json(governor::restart(id).await?))
}

pub async fn deploy(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<Service>> {
  auth.require_write()?;
  Ok(Json(governor::deploy(id).await?))
}

pub async fn unlock_crashloop(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<Service>> {
  auth.require_write()?;
  Ok(Json(governor::unlock(id, &auth.token_name).await?))
}

#[derive(Deserialize)]
pub struct TailQuery {
  #[serde(default = "default_tail")]
  tail: usize,
}

fn default_tail() -> usize {
  200
}

#[derive(Serialize)]
pub struct LogsBody {
  lines: Vec<String>,
}

/// `GET /v1/services/:id/logs/tail?tail=N` (spec.md §6): drains the
/// engine's log stream and keeps only the last `tail` lines, since the
/// engine adapter exposes a stream rather than a bounded read.
pub async fn logs_tail(
  _auth: AuthContext,
  Path(id): Path<i64>,
  Query(query): Query<TailQuery>,
) -> glinr_response::ApiResult<Json<LogsBody>> {
  let service = state::store().get_service(id).await.map_err(store_err)?;
  let Some(container_id) = service.container_id else {
    return Ok(Json(LogsBody { lines: Vec::new() }));
  };

  let mut stream = state::engine().container_logs(&container_id, false).await?;
  let mut ring: std::collections::VecDeque<String> = std::collections::VecDeque::with_capacity(query.tail);
  while let Some(chunk) = stream.next().await {
    let chunk: Bytes = chunk?;
    for line in String::from_utf8_lossy(&chunk).lines() {
      if ring.len() == query.tail {
        ring.pop_front();
      }
      ring.push_back(line.to_string());
    }
  }
  Ok(Json(LogsBody {
    lines: ring.into_iter().collect(),
  }))
}

/// `WS /v1/services/:id/stats` (spec.md §6, §9 "Stats generation"): one
/// JSON frame every 15 s, first frame sent immediately, sourced from the
/// engine's own stats stream so the 15 s cadence / instant-first-frame
/// contract lives in one place ([`glinr_engine::Engine::container_stats`]).
pub async fn stats(
  _auth: AuthContext,
  Path(id): Path<i64>,
  ws: WebSocketUpgrade,
) -> glinr_response::ApiResult<Response> {
  let service = state::store().get_service(id).await.map_err(store_err)?;
  let Some(container_id) = service.container_id else {
    return Err(glinr_response::ApiError::validation(
      "service has no running container to stream stats for",
    ));
  };
  Ok(ws.on_upgrade(move |socket| stream_stats(socket, container_id)))
}

#[derive(Serialize)]
struct StatsFrame {
  cpu_percent: f64,
  memory_usage: u64,
  memory_limit: u64,
  memory_percent: f64,
  network_rx: u64,
  network_tx: u64,
  block_read: u64,
  block_write: u64,
}

async fn stream_stats(mut socket: WebSocket, container_id: String) {
  let mut upstream = match state::engine().container_stats(&container_id).await {
    Ok(stream) => stream,
    Err(_) => {
      let _ = socket.send(Message::Close(None)).await;
      return;
    }
  };

  while let Some(sample) = upstream.next().await {
    let Ok(sample) = sample else { break };
    let frame = StatsFrame {
      cpu_percent: sample.cpu_percent,
      memory_usage: sample.memory_usage,
      memory_limit: sample.memory_limit,
      memory_percent: sample.memory_percent(),
      network_rx: sample.net_rx,
      network_tx: sample.net_tx,
      block_read: sample.block_read,
      block_write: sample.block_write,
    };
    let Ok(text) = serde_json::to_string(&frame) else { break };
    if socket.send(Message::Text(text.into())).await.is_err() {
      break;
    }
  }
}

#[derive(Serialize)]
pub struct LinksBody {
  aliases: Vec<String>,
}

/// `GET /v1/services/:id/links` (spec.md §6, §4.3): the deterministic DNS
/// aliases a running service answers to on its project network.
pub async fn get_links(
  _auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<LinksBody>> {
  let store = state::store();
  let service = store.get_service(id).await.map_err(store_err)?;
  let project = store.get_project(service.project_id).await.map_err(store_err)?;
  Ok(Json(LinksBody {
    aliases: vec![
      service.name.clone(),
      format!("{}.{}.local", service.name, project.slug),
    ],
  }))
}

/// `POST /v1/services/:id/links` (spec.md §6, §4.3 "renames propagate by
/// reconnecting"): re-issues the alias connection against the current
/// service name, for use after a service rename or a suspected drift.
pub async fn reconnect_links(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<LinksBody>> {
  auth.require_write()?;
  let store = state::store();
  let service = store.get_service(id).await.map_err(store_err)?;
  let project = store.get_project(service.project_id).await.map_err(store_err)?;
  let Some(container_id) = &service.container_id else {
    return Err(glinr_response::ApiError::validation(
      "service has no container to connect",
    ));
  };

  state::network_fabric()
    .connect_service(service.project_id, &project.slug, container_id, &service.name)
    .await?;
  Ok(Json(LinksBody {
    aliases: vec![
      service.name.clone(),
      format!("{}.{}.local", service.name, project.slug),
    ],
  }))
}

#[derive(Serialize)]
pub struct NetworkBody {
  network_name: String,
}

/// `GET /v1/services/:id/network` (spec.md §6, §4.3): the project bridge
/// network this service's container is attached to.
pub async fn network(
  _auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<NetworkBody>> {
  let service = state::store().get_service(id).await.map_err(store_err)?;
  Ok(Json(NetworkBody {
    network_name: glinr_engine::NetworkFabric::network_name(service.project_id),
  }))
}

pub async fn delete(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<()> {
  auth.require_write()?;
  let store = state::store();
  let service = store.get_service(id).await.map_err(store_err)?;
  if let Some(container_id) = &service.container_id {
    let _ = state::engine().stop_container(container_id).await;
    let _ = state::engine().remove_container(container_id).await;
    let _ = state::network_fabric()
      .disconnect_service(service.project_id, container_id)
      .await;
  }
  store.delete_service(id).await.map_err(store_err)?;
  Ok(())
}
