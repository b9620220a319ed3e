/// Docker engine probe
///
/// Lists containers and samples one-shot stats through the Docker API. This
/// is the data behind the `/api/docker/*` sources.

use anyhow::{Context, Result};
use bollard::container::{ListContainersOptions, Stats, StatsOptions};
use bollard::models::ContainerSummary;
use bollard::Docker;
use futures::future::join_all;
use futures::StreamExt;
use serde::Serialize;
use tracing::warn;

use crate::telemetry::snapshot::{ContainerCounts, NetworkUsage, Usage};
use crate::utils::{health_from_status, ContainerState};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
}

impl ContainerStats {
    /// CPU% from the cpu/precpu deltas scaled by online CPUs, memory
    /// usage/limit, and eth0 traffic
    pub fn from_sample(stats: &Stats) -> Self {
        let cpu_delta = stats
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
        let system_delta = stats
            .cpu_stats
            .system_cpu_usage
            .unwrap_or(0)
            .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0));
        let num_cpus = stats.cpu_stats.online_cpus.unwrap_or(1).max(1);

        let cpu_percent = if system_delta > 0 {
            (cpu_delta as f64 / system_delta as f64) * num_cpus as f64 * 100.0
        } else {
            0.0
        };

        let memory_usage = stats.memory_stats.usage.unwrap_or(0);
        let memory_limit = stats.memory_stats.limit.unwrap_or(0);

        let (network_rx, network_tx) = stats
            .networks
            .as_ref()
            .and_then(|networks| networks.get("eth0"))
            .map(|net| (net.rx_bytes, net.tx_bytes))
            .unwrap_or((0, 0));

        Self {
            cpu_percent,
            memory_usage,
            memory_limit,
            memory_percent: Usage::new(memory_usage, memory_limit).percentage,
            network_rx,
            network_tx,
        }
    }
}

/// One container as served by `/api/docker/containers`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    pub created: i64,
    pub ports: Vec<String>,
    #[serde(skip)]
    pub size_root_fs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ContainerStats>,
}

impl From<ContainerSummary> for ContainerInfo {
    fn from(summary: ContainerSummary) -> Self {
        let name = summary
            .names
            .as_ref()
            .and_then(|names| names.first())
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let status = summary.status.clone().unwrap_or_else(|| "unknown".to_string());
        let state = summary
            .state
            .as_deref()
            .map(ContainerState::from)
            .unwrap_or_else(|| ContainerState::from(status.as_str()));

        let ports = summary
            .ports
            .as_ref()
            .map(|ports| {
                ports
                    .iter()
                    .filter_map(|p| {
                        p.public_port.map(|pub_port| {
                            format!(
                                "{}:{}->{}",
                                p.ip.as_deref().unwrap_or("0.0.0.0"),
                                pub_port,
                                p.private_port
                            )
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: summary.id.unwrap_or_default(),
            name,
            image: summary.image.unwrap_or_else(|| "unknown".to_string()),
            state,
            health: health_from_status(&status),
            status,
            created: summary.created.unwrap_or(0),
            ports,
            size_root_fs: summary.size_root_fs.unwrap_or(0).max(0) as u64,
            stats: None,
        }
    }
}

/// Engine-wide aggregate served by `/api/docker/stats`
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub cpu: CpuFraction,
    pub memory: Usage,
    pub storage: Usage,
    pub network: NetworkUsage,
    pub containers: ContainerCounts,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CpuFraction {
    /// 0.0 - 1.0 of all engine CPUs
    pub usage: f64,
}

impl EngineStats {
    /// Sum the per-container samples. `cpus` and `memory_total` describe the
    /// engine host; `storage_total` is the disk the engine writes to.
    pub fn aggregate(containers: &[ContainerInfo], cpus: u64, memory_total: u64, storage_total: u64) -> Self {
        let samples = || containers.iter().filter_map(|c| c.stats.as_ref());

        let cpu_percent: f64 = samples().map(|s| s.cpu_percent).sum();
        let usage = (cpu_percent / (cpus.max(1) as f64 * 100.0)).clamp(0.0, 1.0);

        let memory_used: u64 = samples().map(|s| s.memory_usage).sum();
        let storage_used: u64 = containers.iter().map(|c| c.size_root_fs).sum();
        let rx: u64 = samples().map(|s| s.network_rx).sum();
        let tx: u64 = samples().map(|s| s.network_tx).sum();

        Self {
            cpu: CpuFraction { usage },
            memory: Usage::new(memory_used, memory_total),
            storage: Usage::new(storage_used, storage_total),
            network: NetworkUsage { rx, tx, max: rx.max(tx) },
            containers: ContainerCounts::from_states(containers.iter().map(|c| c.state)),
        }
    }
}

#[derive(Clone)]
pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;
        Ok(Self { docker })
    }

    /// Check if Docker daemon is accessible
    pub async fn check_docker(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// All containers, optionally with a one-shot stats sample for each
    /// running one
    pub async fn list_containers(&self, with_stats: bool) -> Result<Vec<ContainerInfo>> {
        let options = Some(ListContainersOptions::<String> {
            all: true,
            size: true,
            ..Default::default()
        });

        let summaries = self
            .docker
            .list_containers(options)
            .await
            .context("Failed to list containers")?;

        let mut containers: Vec<ContainerInfo> = summaries.into_iter().map(ContainerInfo::from).collect();

        if with_stats {
            // Sample in parallel; one slow container must not serialize the rest
            let samples = join_all(containers.iter().map(|c| async move {
                if c.state.is_running() {
                    self.container_stats(&c.id).await
                } else {
                    None
                }
            }))
            .await;

            for (container, sample) in containers.iter_mut().zip(samples) {
                container.stats = Some(sample.unwrap_or_default());
            }
        }

        Ok(containers)
    }

    /// One-shot stats sample; `None` when the engine has nothing to report
    pub async fn container_stats(&self, id: &str) -> Option<ContainerStats> {
        let mut stream = self.docker.stats(
            id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );

        match stream.next().await {
            Some(Ok(stats)) => Some(ContainerStats::from_sample(&stats)),
            Some(Err(e)) => {
                warn!(container = id, error = %e, "stats sample failed");
                None
            }
            None => None,
        }
    }

    /// (online CPUs, total memory) of the engine host
    pub async fn engine_capacity(&self) -> Result<(u64, u64)> {
        let info = self.docker.info().await.context("Failed to query Docker info")?;
        let cpus = info.ncpu.unwrap_or(1).max(1) as u64;
        let memory = info.mem_total.unwrap_or(0).max(0) as u64;
        Ok((cpus, memory))
    }

    pub async fn container_counts(&self) -> Result<ContainerCounts> {
        let containers = self.list_containers(false).await?;
        Ok(ContainerCounts::from_states(containers.iter().map(|c| c.state)))
    }

    /// Engine-wide aggregate over every container
    pub async fn engine_stats(&self, storage_total: u64) -> Result<EngineStats> {
        let containers = self.list_containers(true).await?;
        let (cpus, memory_total) = self.engine_capacity().await?;
        Ok(EngineStats::aggregate(&containers, cpus, memory_total, storage_total))
    }
}
