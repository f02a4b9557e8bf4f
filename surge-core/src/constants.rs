use std::time::Duration;

/// Probability that a virtual user picks the orders catalog over the users catalog.
pub const DEFAULT_DOMAIN_SPLIT: f64 = 0.3;

/// Probability that `read-one` targets a known seed record rather than a synthesized id.
pub const DEFAULT_ID_HIT_PROBABILITY: f64 = 0.7;

pub const DEFAULT_THINK_TIME_MIN: Duration = Duration::from_millis(100);
pub const DEFAULT_THINK_TIME_MAX: Duration = Duration::from_millis(1000);

/// How often the scheduler re-evaluates the target concurrency.
pub const DEFAULT_SCHEDULER_TICK: Duration = Duration::from_millis(100);

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

pub const HEALTH_PATH: &str = "/health";
