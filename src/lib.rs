pub mod core;
pub mod telemetry;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;
