use crate::config::Operation;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Pass/fail counts for checks, requests or iterations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: u64,
    pub failed: u64,
}

impl Tally {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    /// Fraction that failed, `0.` when nothing was recorded.
    pub fn failure_ratio(&self) -> f64 {
        ratio(self.failed, self.total())
    }

    /// Fraction that passed, `0.` when nothing was recorded.
    pub fn pass_ratio(&self) -> f64 {
        ratio(self.passed, self.total())
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.
    } else {
        part as f64 / total as f64
    }
}

/// Latency distribution of one operation (or of all of them).
///
/// Holds every sample in order, so quantiles are exact nearest-rank values.
#[derive(Debug, Clone, Default)]
pub struct LatencyDistribution {
    sorted: Vec<Duration>,
    mean: Duration,
}

impl LatencyDistribution {
    pub fn from_samples(samples: &[Duration]) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let mean = if sorted.is_empty() {
            Duration::ZERO
        } else {
            let secs: Vec<f64> = sorted.iter().map(Duration::as_secs_f64).collect();
            Duration::from_secs_f64(statistical::mean(&secs))
        };

        Self { sorted, mean }
    }

    pub fn count(&self) -> u64 {
        self.sorted.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn min(&self) -> Duration {
        self.sorted.first().copied().unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.sorted.last().copied().unwrap_or_default()
    }

    pub fn mean(&self) -> Duration {
        self.mean
    }

    pub fn median(&self) -> Duration {
        self.quantile(0.5)
    }

    /// Smallest sample with at least `quantile` of the samples at or below it; zero for an
    /// empty distribution. `quantile` is clamped to `[0, 1]`.
    pub fn quantile(&self, quantile: f64) -> Duration {
        let n = self.sorted.len();
        if n == 0 {
            return Duration::ZERO;
        }

        let quantile = if quantile.is_nan() { 0. } else { quantile.clamp(0., 1.) };
        let rank = (quantile * n as f64).ceil() as usize;
        self.sorted[rank.clamp(1, n) - 1]
    }
}

impl fmt::Display for LatencyDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={}, avg={:?}, min={:?}, med={:?}, p90={:?}, p95={:?}, max={:?}",
            self.count(),
            self.mean,
            self.min(),
            self.median(),
            self.quantile(0.90),
            self.quantile(0.95),
            self.max(),
        )
    }
}

/// Frozen image of the run's metrics. Read-only; thresholds are evaluated against it.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub elapsed: Duration,
    pub iterations: u64,
    pub max_vus: usize,
    pub checks: Tally,
    pub per_check: BTreeMap<String, Tally>,
    pub requests: Tally,
    /// Iterations that recorded at least one non-advisory check, split by whether any of them failed.
    pub scenarios: Tally,
    pub latency: BTreeMap<Operation, LatencyDistribution>,
    pub overall_latency: LatencyDistribution,
}

impl MetricsSnapshot {
    /// Latency distribution for `operation`, or for all requests when `None`.
    pub fn latency(&self, operation: Option<Operation>) -> Option<&LatencyDistribution> {
        match operation {
            Some(op) => self.latency.get(&op),
            None => Some(&self.overall_latency),
        }
    }

    pub fn check(&self, name: &str) -> Tally {
        self.per_check.get(name).copied().unwrap_or_default()
    }

    pub fn iteration_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0. {
            self.iterations as f64 / secs
        } else {
            0.
        }
    }
}
