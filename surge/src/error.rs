use surge_core::ConfigError;
use thiserror::Error;

/// A request that never produced a response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Conditions that stop a run before any load is generated.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Health check could not reach the service: {0}")]
    HealthUnreachable(#[source] TransportError),

    #[error("Service is not healthy (health check returned {status}), aborting test")]
    Unhealthy { status: u16 },
}
