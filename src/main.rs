mod cli;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;

use cli::{Cli, Commands, ConfigCommands};
use stack_telemetry::telemetry::snapshot::ServiceStatus;
use stack_telemetry::telemetry::{
    CollectorSlot, EnvironmentEvent, TelemetryCollector, TelemetryState, TelemetryStore,
};
use stack_telemetry::utils::{format_age, format_bytes, format_duration, init_tracing, truncate_string, AppConfig};

/// The application's single collector
static COLLECTOR: CollectorSlot = CollectorSlot::new();

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;

    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_tracing(&log_level);

    match cli.command {
        Commands::Watch { base_url, interval } => {
            if let Some(base_url) = base_url {
                config.base_url = base_url;
            }
            handle_watch(&config, interval).await?;
        }
        Commands::Snapshot { base_url, wait } => {
            if let Some(base_url) = base_url {
                config.base_url = base_url;
            }
            handle_snapshot(&config, wait).await?;
        }
        #[cfg(feature = "server")]
        Commands::Serve { port, host, cors } => {
            stack_telemetry::server::run(&config, &COLLECTOR, host, port, cors).await?;
        }
        Commands::Config { command } => {
            handle_config(&config, command)?;
        }
    }

    Ok(())
}

/// Build the collector through the slot and hand back the store it feeds
fn init_collector(config: &AppConfig) -> Result<Arc<TelemetryStore>> {
    let store = Arc::new(TelemetryStore::new());
    let collector = TelemetryCollector::from_config(config, store.clone())
        .context("Failed to build telemetry collector")?;
    COLLECTOR.get_or_init(move || collector);
    Ok(store)
}

async fn handle_watch(config: &AppConfig, interval: u64) -> Result<()> {
    let store = init_collector(config)?;
    COLLECTOR.handle(EnvironmentEvent::Ready);

    println!("Watching {} (Ctrl+C to stop)\n", config.base_url.cyan());

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    // First tick is immediate; skip it so the initial fetch can land
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => print_summary(&store.state()),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    COLLECTOR.handle(EnvironmentEvent::Teardown);
    println!("\nTelemetry collection stopped");
    Ok(())
}

async fn handle_snapshot(config: &AppConfig, wait: u64) -> Result<()> {
    let store = init_collector(config)?;
    COLLECTOR.handle(EnvironmentEvent::Ready);

    tokio::time::sleep(Duration::from_millis(wait)).await;
    COLLECTOR.handle(EnvironmentEvent::Teardown);

    println!("{}", serde_json::to_string_pretty(&store.state())?);
    Ok(())
}

fn handle_config(config: &AppConfig, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Path => {
            println!("{}", AppConfig::config_path()?.display());
        }
    }
    Ok(())
}

fn status_label(status: ServiceStatus) -> colored::ColoredString {
    match status {
        ServiceStatus::Healthy => "healthy".green(),
        ServiceStatus::Degraded => "degraded".yellow(),
        ServiceStatus::Down => "down".red(),
        ServiceStatus::Unknown => "unknown".white(),
    }
}

fn print_summary(state: &TelemetryState) {
    let now = Utc::now();

    println!("{}", "─".repeat(72));
    let link = if state.connected { "connected".green() } else { "disconnected".red() };
    println!("{} {}", "Stack Telemetry".bold(), link);

    if let Some(docker) = &state.docker {
        println!(
            "Docker   cpu {:>5.1}%  mem {:>5.1}% ({} / {})  containers {}/{} running  [{}]",
            docker.cpu_fraction * 100.0,
            docker.memory.percentage,
            format_bytes(docker.memory.used),
            format_bytes(docker.memory.total),
            docker.containers.running,
            docker.containers.total,
            format_age(docker.captured_at, now),
        );
    }

    if let Some(system) = &state.system {
        println!(
            "Host     cpu {:>5.1}%  mem {:>5.1}%  disk {:>5.1}%  up {}  [{}]",
            system.cpu_percent,
            system.memory.percentage,
            system.disk.percentage,
            format_duration(system.uptime_secs),
            format_age(system.captured_at, now),
        );
    }

    if let Some(health) = &state.container_health {
        println!(
            "Health   {} healthy  {} unhealthy  {} starting",
            health.healthy.to_string().green(),
            health.unhealthy.to_string().red(),
            health.starting.to_string().yellow(),
        );
    }

    if !state.containers.is_empty() {
        println!();
        println!("{:<28} {:<12} {:<16} {:>7} {:<12}", "Container", "State", "Uptime", "CPU", "Category");
        for container in &state.containers {
            println!(
                "{:<28} {:<12} {:<16} {:>6.1}% {:<12}",
                truncate_string(&container.name, 28),
                container.state.as_str().color(container.state.color()),
                truncate_string(&container.uptime, 16),
                container.cpu_percent,
                format!("{:?}", container.category),
            );
        }
    }

    let services = [
        ("PostgreSQL", state.postgres.as_ref().map(|s| (s.status, s.captured_at))),
        ("Hasura", state.hasura.as_ref().map(|s| (s.status, s.captured_at))),
        ("Redis", state.redis.as_ref().map(|s| (s.status, s.captured_at))),
    ];
    println!();
    for (name, reading) in services {
        match reading {
            Some((status, captured_at)) => {
                println!("{:<12} {:<10} [{}]", name, status_label(status), format_age(captured_at, now))
            }
            None => println!("{:<12} {}", name, "n/a".dimmed()),
        }
    }

    if !state.degraded.is_empty() {
        let degraded: Vec<&str> = state.degraded.iter().map(String::as_str).collect();
        println!("\n{} {}", "Degraded:".yellow().bold(), degraded.join(", "));
    }

    println!(
        "{}",
        format!(
            "cache {} hit / {} miss, {} api calls",
            state.counters.cache_hits, state.counters.cache_misses, state.counters.api_calls
        )
        .dimmed()
    );
}
