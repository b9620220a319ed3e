/// Helper utilities for stack telemetry

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Format bytes to human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Format duration to human-readable string
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Age of a snapshot timestamp, e.g. "3s ago"
pub fn format_age(captured_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(captured_at).num_seconds().max(0) as u64;
    format!("{} ago", format_duration(seconds))
}

/// Truncate string with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Health keyword embedded in a Docker status string such as
/// "Up 5 minutes (healthy)"
pub fn health_from_status(status: &str) -> Option<String> {
    // Check unhealthy BEFORE healthy (unhealthy contains "healthy" as substring)
    if status.contains("unhealthy") {
        Some("unhealthy".to_string())
    } else if status.contains("starting") {
        Some("starting".to_string())
    } else if status.contains("healthy") {
        Some("healthy".to_string())
    } else {
        None
    }
}

/// Parse Docker container status to simplified state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Stopped,
    Paused,
    Restarting,
    Dead,
    Unknown,
}

impl From<&str> for ContainerState {
    fn from(status: &str) -> Self {
        let status_lower = status.to_lowercase();
        if status_lower.contains("paused") {
            ContainerState::Paused
        } else if status_lower.contains("restarting") {
            ContainerState::Restarting
        } else if status_lower.starts_with("up") || status_lower.contains("running") {
            ContainerState::Running
        } else if status_lower.contains("dead") || status_lower.contains("removing") {
            ContainerState::Dead
        } else if status_lower.contains("exited")
            || status_lower.contains("stopped")
            || status_lower.contains("created")
        {
            ContainerState::Stopped
        } else {
            ContainerState::Unknown
        }
    }
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "Running",
            ContainerState::Stopped => "Stopped",
            ContainerState::Paused => "Paused",
            ContainerState::Restarting => "Restarting",
            ContainerState::Dead => "Dead",
            ContainerState::Unknown => "Unknown",
        }
    }

    /// Get color for terminal display
    pub fn color(&self) -> &'static str {
        match self {
            ContainerState::Running => "green",
            ContainerState::Stopped => "white",
            ContainerState::Paused => "yellow",
            ContainerState::Restarting => "cyan",
            ContainerState::Dead => "red",
            ContainerState::Unknown => "white",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3661), "1h 1m");
        assert_eq!(format_duration(86400), "1d 0h");
    }

    #[test]
    fn test_format_age_never_negative() {
        let now = Utc::now();
        assert_eq!(format_age(now - chrono::Duration::seconds(75), now), "1m 15s ago");
        assert_eq!(format_age(now + chrono::Duration::seconds(5), now), "0s ago");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("postgres", 20), "postgres");
        assert_eq!(truncate_string("hasura/graphql-engine:v2.36.0", 12), "hasura/gr...");
    }

    #[test]
    fn test_health_from_status() {
        assert_eq!(health_from_status("Up 2 hours (unhealthy)").as_deref(), Some("unhealthy"));
        assert_eq!(health_from_status("Up 2 hours (healthy)").as_deref(), Some("healthy"));
        assert_eq!(health_from_status("Up 3 seconds (health: starting)").as_deref(), Some("starting"));
        assert_eq!(health_from_status("Exited (0) 2 days ago"), None);
    }

    #[test]
    fn test_container_state() {
        assert_eq!(ContainerState::from("Up 2 hours"), ContainerState::Running);
        assert_eq!(ContainerState::from("running"), ContainerState::Running);
        assert_eq!(ContainerState::from("Exited (0)"), ContainerState::Stopped);
        assert_eq!(ContainerState::from("exited"), ContainerState::Stopped);
        assert_eq!(ContainerState::from("Up 5 minutes (Paused)"), ContainerState::Paused);
        assert_eq!(ContainerState::from("created"), ContainerState::Stopped);
        assert!(ContainerState::Running.is_running());
        assert!(!ContainerState::Stopped.is_running());
    }
}
