use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
  Docker,
  container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StatsOptions,
  },
  image::CreateImageOptions,
  models::{EndpointSettings, HostConfig, Mount, MountTypeEnum, PortBinding},
  network::{ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions},
};
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use tokio::time::{Duration, interval};
use tokio_stream::wrappers::IntervalStream;

use crate::{
  ContainerSpec, ContainerStats, ContainerStatus, Engine, EngineError, EngineResult,
  NetworkInfo, RegistryAuth,
};

/// One 15 s stats sample, first sample sent immediately (spec.md §9).
const STATS_INTERVAL: Duration = Duration::from_secs(15);

pub struct BollardEngine {
  docker: Docker,
}

impl BollardEngine {
  pub fn connect() -> EngineResult<Self> {
    let docker = Docker::connect_with_local_defaults()
      .map_err(|e| EngineError::Unavailable(e.to_string()))?;
    Ok(Self { docker })
  }
}

#[async_trait]
impl Engine for BollardEngine {
  async fn pull_image(
    &self,
    image: &str,
    auth: Option<RegistryAuth>,
  ) -> EngineResult<()> {
    let credentials = auth.map(|a| bollard::auth::DockerCredentials {
      username: Some(a.username),
      password: Some(a.password),
      ..Default::default()
    });
    let options = Some(CreateImageOptions {
      from_image: image,
      ..Default::default()
    });
    let mut stream = self.docker.create_image(options, None, credentials);
    while let Some(progress) = stream.next().await {
      progress.map_err(EngineError::from)?;
    }
    Ok(())
  }

  async fn create_container(
    &self,
    name: &str,
    spec: &ContainerSpec,
    labels: HashMap<String, String>,
  ) -> EngineResult<String> {
    let env: Vec<String> = spec
      .env
      .iter()
      .map(|(k, v)| format!("{k}={v}"))
      .collect();

    let mut port_bindings = HashMap::new();
    let mut exposed_ports = HashMap::new();
    for port in &spec.ports {
      let container_port = format!("{}/tcp", port.container);
      exposed_ports.insert(container_port.clone(), HashMap::new());
      port_bindings.insert(
        container_port,
        Some(vec![PortBinding {
          host_ip: None,
          host_port: Some(port.host.to_string()),
        }]),
      );
    }

    let mounts: Vec<Mount> = spec
      .volumes
      .iter()
      .map(|v| Mount {
        target: Some(v.container.clone()),
        source: Some(v.host.clone()),
        typ: Some(MountTypeEnum::BIND),
        read_only: Some(v.read_only),
        ..Default::default()
      })
      .collect();

    let config = Config {
      image: Some(spec.image.clone()),
      env: Some(env),
      exposed_ports: Some(exposed_ports),
      labels: Some(labels),
      host_config: Some(HostConfig {
        port_bindings: Some(port_bindings),
        mounts: Some(mounts),
        ..Default::default()
      }),
      ..Default::default()
    };

    let options = Some(CreateContainerOptions {
      name,
      platform: None,
    });
    let response = self
      .docker
      .create_container(options, config)
      .await
      .map_err(EngineError::from)?;
    Ok(response.id)
  }

  async fn start_container(&self, id: &str) -> EngineResult<()> {
    self
      .docker
      .start_container::<String>(id, None)
      .await
      .map_err(EngineError::from)
  }

  async fn stop_container(&self, id: &str) -> EngineResult<()> {
    self
      .docker
      .stop_container(id, None)
      .await
      .map_err(EngineError::from)
  }

  async fn restart_container(&self, id: &str) -> EngineResult<()> {
    self
      .docker
      .restart_container(id, None)
      .await
      .map_err(EngineError::from)
  }

  async fn remove_container(&self, id: &str) -> EngineResult<()> {
    let options = Some(RemoveContainerOptions {
      force: true,
      ..Default::default()
    });
    self
      .docker
      .remove_container(id, options)
      .await
      .map_err(EngineError::from)
  }

  async fn inspect_container(&self, id: &str) -> EngineResult<ContainerStatus> {
    let inspect = self
      .docker
      .inspect_container(id, None)
      .await
      .map_err(EngineError::from)?;
    let env = inspect
      .config
      .as_ref()
      .and_then(|c| c.env.as_ref())
      .map(|entries| {
        entries
          .iter()
          .filter_map(|entry| entry.split_once('='))
          .map(|(k, v)| (k.to_string(), v.to_string()))
          .collect()
      })
      .unwrap_or_default();
    let exit_code = inspect.state.as_ref().and_then(|s| s.exit_code).map(|c| c as i32);
    let restart_count = inspect.restart_count.map(|c| c as i64);
    Ok(ContainerStatus {
      id: inspect.id.unwrap_or_default(),
      name: inspect.name.unwrap_or_default(),
      state: inspect
        .state
        .and_then(|s| s.status)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string()),
      started_at: inspect.created,
      env,
      exit_code,
      restart_count,
    })
  }

  async fn container_logs(
    &self,
    id: &str,
    follow: bool,
  ) -> EngineResult<BoxStream<'static, EngineResult<Bytes>>> {
    let options = Some(LogsOptions::<String> {
      follow,
      stdout: true,
      stderr: true,
      tail: "200".to_string(),
      ..Default::default()
    });
    let stream = self.docker.logs(id, options).map(|item| {
      item.map(log_output_bytes).map_err(EngineError::from)
    });
    Ok(Box::pin(stream))
  }

  async fn container_stats(
    &self,
    id: &str,
  ) -> EngineResult<BoxStream<'static, EngineResult<ContainerStats>>> {
    let docker = self.docker.clone();
    let id = id.to_string();
    let ticks = IntervalStream::new(interval(STATS_INTERVAL));
    let stream = ticks.then(move |_| {
      let docker = docker.clone();
      let id = id.clone();
      async move {
        let options = Some(StatsOptions {
          stream: false,
          one_shot: true,
        });
        let mut stats_stream = docker.stats(&id, options);
        match stats_stream.next().await {
          Some(Ok(stats)) => Ok(bollard_stats_to_container_stats(&stats)),
          Some(Err(e)) => Err(EngineError::from(e)),
          None => Err(EngineError::Unavailable(
            "engine closed stats stream".to_string(),
          )),
        }
      }
    });
    Ok(Box::pin(stream))
  }

  async fn inspect_network(&self, name: &str) -> EngineResult<Option<NetworkInfo>> {
    match self.docker.inspect_network::<String>(name, None).await {
      Ok(network) => Ok(Some(NetworkInfo {
        id: network.id.unwrap_or_default(),
        owner_label: network
          .labels
          .unwrap_or_default()
          .get("owner")
          .cloned(),
      })),
      Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
        Ok(None)
      }
      Err(e) => Err(EngineError::from(e)),
    }
  }

  async fn create_network(
    &self,
    name: &str,
    labels: HashMap<String, String>,
  ) -> EngineResult<()> {
    let options = CreateNetworkOptions {
      name,
      driver: "bridge",
      labels,
      enable_ipv6: false,
      ..Default::default()
    };
    self
      .docker
      .create_network(options)
      .await
      .map_err(EngineError::from)?;
    Ok(())
  }

  async fn connect_network(
    &self,
    network: &str,
    container: &str,
    aliases: &[String],
  ) -> EngineResult<()> {
    let options = ConnectNetworkOptions {
      container,
      endpoint_config: EndpointSettings {
        aliases: Some(aliases.to_vec()),
        ..Default::default()
      },
    };
    self
      .docker
      .connect_network(network, options)
      .await
      .map_err(EngineError::from)
  }

  async fn disconnect_network(&self, network: &str, container: &str) -> EngineResult<()> {
    let options = DisconnectNetworkOptions {
      container,
      force: false,
    };
    self
      .docker
      .disconnect_network(network, options)
      .await
      .map_err(EngineError::from)
  }

  async fn remove_network(&self, name: &str) -> EngineResult<()> {
    self
      .docker
      .remove_network(name)
      .await
      .map_err(EngineError::from)
  }
}

fn log_output_bytes(output: LogOutput) -> Bytes {
  match output {
    LogOutput::StdOut { message }
    | LogOutput::StdErr { message }
    | LogOutput::StdIn { message }
    | LogOutput::Console { message } => message,
  }
}

fn bollard_stats_to_container_stats(
  stats: &bollard::container::Stats,
) -> ContainerStats {
  let cpu_delta = stats
    .cpu_stats
    .cpu_usage
    .total_usage
    .saturating_sub(stats.precpu_stats.cpu_usage.total_usage) as f64;
  let system_delta = stats
    .cpu_stats
    .system_cpu_usage
    .unwrap_or_default()
    .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or_default())
    as f64;
  let online_cpus = stats.cpu_stats.online_cpus.unwrap_or(1).max(1) as f64;
  let cpu_percent = if system_delta > 0.0 && cpu_delta > 0.0 {
    (cpu_delta / system_delta) * online_cpus * 100.0
  } else {
    0.0
  };

  let memory_usage = stats.memory_stats.usage.unwrap_or_default();
  let memory_limit = stats.memory_stats.limit.unwrap_or_default();

  let (net_rx, net_tx) = stats
    .networks
    .as_ref()
    .map(|nets| {
      nets.values().fold((0u64, 0u64), |(rx, tx), n| {
        (rx + n.rx_bytes, tx + n.tx_bytes)
      })
    })
    .unwrap_or_default();

  let (block_read, block_write) = stats
    .blkio_stats
    .io_service_bytes_recursive
    .as_ref()
    .map(|entries| {
      entries.iter().fold((0u64, 0u64), |(read, write), e| {
        match e.op.to_lowercase().as_str() {
          "read" => (read + e.value, write),
          "write" => (read, write + e.value),
          _ => (read, write),
        }
      })
    })
    .unwrap_or_default();

  ContainerStats {
    cpu_percent,
    memory_usage,
    memory_limit,
    net_rx,
    net_tx,
    block_read,
    block_write,
  }
}
