/// CLI argument parsing

use clap::{Parser, Subcommand};

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "stack-telemetry")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Override the configured log level (RUST_LOG still wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect continuously and print a summary on every refresh
    Watch {
        /// Root URL of the metric sources
        #[arg(long)]
        base_url: Option<String>,

        /// Seconds between summaries
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },

    /// Collect once and print the result as JSON
    Snapshot {
        /// Root URL of the metric sources
        #[arg(long)]
        base_url: Option<String>,

        /// Milliseconds to wait for the initial fetch
        #[arg(short, long, default_value = "1500")]
        wait: u64,
    },

    /// Run HTTP API server mode
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Enable CORS for cross-origin requests
        #[arg(long)]
        cors: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the configuration file location
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_defaults() {
        let cli = Cli::try_parse_from(["stack-telemetry", "watch"]).unwrap();
        match cli.command {
            Commands::Watch { base_url, interval } => {
                assert!(base_url.is_none());
                assert_eq!(interval, 2);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_snapshot_flags() {
        let cli = Cli::try_parse_from([
            "stack-telemetry",
            "--log-level",
            "debug",
            "snapshot",
            "--base-url",
            "http://10.0.0.2:3000",
            "--wait",
            "250",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Snapshot { base_url, wait } => {
                assert_eq!(base_url.as_deref(), Some("http://10.0.0.2:3000"));
                assert_eq!(wait, 250);
            }
            _ => panic!("expected snapshot"),
        }
    }

    #[test]
    fn test_config_requires_subcommand() {
        assert!(Cli::try_parse_from(["stack-telemetry", "config"]).is_err());
        assert!(Cli::try_parse_from(["stack-telemetry", "config", "path"]).is_ok());
    }
}
