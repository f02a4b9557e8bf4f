use crate::{Domain, Operation};
use std::time::Duration;
use thiserror::Error;

/// Problems with a run configuration. All of these are detected before any load is generated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("At least one stage is required")]
    NoStages,

    #[error("Base URL must not be empty")]
    EmptyBaseUrl,

    #[error("{name} must be a probability in [0, 1], found {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("Think time minimum {min:?} exceeds maximum {max:?}")]
    InvalidThinkTime { min: Duration, max: Duration },

    #[error("{name} must be a non-zero duration")]
    ZeroInterval { name: &'static str },

    #[error("Scenario `{name}` has weight {weight}; weights must be positive and finite")]
    InvalidWeight { name: String, weight: f64 },

    #[error("The {0} catalog is empty but the domain split can select it")]
    EmptyCatalog(Domain),

    #[error("No executor registered for {operation} on {domain}")]
    MissingExecutor { domain: Domain, operation: Operation },

    #[error("Invalid threshold `{expr}`: {reason}")]
    InvalidThreshold { expr: String, reason: String },
}
