/// HTTP API Server module
/// Serves the metric sources and hosts the telemetry collector against them

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::AppState;
pub use routes::create_router;

use anyhow::{Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{DockerManager, HostProbe};
use crate::telemetry::{CollectorSlot, EnvironmentEvent, TelemetryCollector, TelemetryStore};
use crate::utils::AppConfig;

/// Base URL the collector uses to reach this server's own sources
fn self_base_url(addr: &SocketAddr) -> String {
    let host = if addr.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else if addr.is_ipv6() {
        format!("[{}]", addr.ip())
    } else {
        addr.ip().to_string()
    };
    format!("http://{}:{}", host, addr.port())
}

pub async fn run(
    config: &AppConfig,
    slot: &'static CollectorSlot,
    host: String,
    port: u16,
    enable_cors: bool,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let docker = match DockerManager::new() {
        Ok(docker) if docker.check_docker().await => Some(docker),
        Ok(_) | Err(_) => {
            warn!("Docker daemon unreachable, docker sources will answer 503");
            None
        }
    };

    let store = Arc::new(TelemetryStore::new());
    let mut collector_config = config.clone();
    collector_config.base_url = self_base_url(&addr);
    let collector = TelemetryCollector::from_config(&collector_config, store.clone())?;
    slot.get_or_init(move || collector);

    let state = AppState {
        slot,
        store,
        docker,
        host: Arc::new(HostProbe::new()),
    };
    let app = create_router(state, enable_cors);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("{}", "Stack Telemetry Server".bold());
    println!("   API:       http://{}/api", addr);
    println!("   Telemetry: ws://{}/ws/telemetry", addr);
    println!();
    println!("API Endpoints:");
    println!("   GET  /api/docker/stats             - Engine-wide resource usage");
    println!("   GET  /api/docker/containers        - Container list (?stats=true)");
    println!("   GET  /api/system/metrics           - Host CPU, memory, disk, network");
    println!("   GET  /api/services/:name/health    - postgres | hasura | redis");
    println!("   GET  /api/telemetry                - Collected telemetry state");
    println!("   POST /api/telemetry/start|stop     - Collector lifecycle");
    println!("   GET  /api/health                   - Health check");
    println!("   GET  /ws/telemetry                 - Telemetry stream");
    println!();

    // Sources are reachable from here on
    slot.handle(EnvironmentEvent::Ready);
    info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    slot.handle(EnvironmentEvent::Teardown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_base_url() {
        assert_eq!(self_base_url(&"0.0.0.0:3000".parse().unwrap()), "http://127.0.0.1:3000");
        assert_eq!(self_base_url(&"10.0.0.5:8080".parse().unwrap()), "http://10.0.0.5:8080");
        assert_eq!(self_base_url(&"[::1]:3000".parse().unwrap()), "http://[::1]:3000");
    }
}
