/// Host resource probe backed by sysinfo
///
/// CPU usage is a delta between two refreshes, so the probe keeps its
/// `System` between calls. The very first reading reports 0%.

use serde::Serialize;
use std::sync::Mutex;
use sysinfo::{Disks, Networks, System};

use crate::telemetry::snapshot::{NetworkUsage, Usage};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CpuReading {
    /// Percent of all cores
    pub usage: f64,
    pub cores: u64,
}

/// `system` object of `/api/system/metrics`
#[derive(Debug, Clone, Serialize)]
pub struct HostMetrics {
    pub cpu: CpuReading,
    pub memory: Usage,
    pub disk: Usage,
    pub network: NetworkUsage,
    /// Seconds since boot
    pub uptime: u64,
}

pub struct HostProbe {
    system: Mutex<System>,
}

impl HostProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    pub fn sample(&self) -> HostMetrics {
        let (cpu, memory) = {
            let mut system = self.system.lock().unwrap_or_else(|p| p.into_inner());
            system.refresh_cpu();
            system.refresh_memory();

            let cpu = CpuReading {
                usage: f64::from(system.global_cpu_info().cpu_usage()),
                cores: system.cpus().len() as u64,
            };
            let memory = Usage::new(system.used_memory(), system.total_memory());
            (cpu, memory)
        };

        HostMetrics {
            cpu,
            memory,
            disk: disk_usage(),
            network: network_usage(),
            uptime: System::uptime(),
        }
    }

    /// Total capacity of all mounted disks
    pub fn disk_total(&self) -> u64 {
        disk_usage().total
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn disk_usage() -> Usage {
    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks
        .iter()
        .fold((0u64, 0u64), |(total, available), disk| {
            (total + disk.total_space(), available + disk.available_space())
        });
    Usage::new(total.saturating_sub(available), total)
}

fn network_usage() -> NetworkUsage {
    let networks = Networks::new_with_refreshed_list();
    let (rx, tx) = networks
        .iter()
        .fold((0u64, 0u64), |(rx, tx), (_name, data)| {
            (rx + data.total_received(), tx + data.total_transmitted())
        });
    NetworkUsage { rx, tx, max: rx.max(tx) }
}
