pub mod docker;
pub mod services;
pub mod system;

pub use docker::{ContainerInfo, DockerManager, EngineStats};
pub use system::{HostMetrics, HostProbe};
