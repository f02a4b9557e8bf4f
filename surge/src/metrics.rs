use crate::check::CheckResult;
use metrics_util::AtomicBucket;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use surge_core::{LatencyDistribution, MetricsSnapshot, Operation, Tally};
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Default)]
struct TallyCell {
    passed: AtomicU64,
    failed: AtomicU64,
}

impl TallyCell {
    fn record(&self, passed: bool) {
        if passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn load(&self) -> Tally {
        Tally {
            passed: self.passed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Run-wide aggregator shared by every virtual user. All recording is lock-free except the
/// first sighting of a new check name.
pub struct RunMetrics {
    started: Instant,
    iterations: AtomicU64,
    max_vus: AtomicUsize,
    checks: TallyCell,
    requests: TallyCell,
    scenarios: TallyCell,
    per_check: RwLock<HashMap<String, Arc<TallyCell>>>,
    latency: [AtomicBucket<Duration>; Operation::ALL.len()],
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            iterations: AtomicU64::new(0),
            max_vus: AtomicUsize::new(0),
            checks: TallyCell::default(),
            requests: TallyCell::default(),
            scenarios: TallyCell::default(),
            per_check: RwLock::new(HashMap::new()),
            latency: std::array::from_fn(|_| AtomicBucket::new()),
        }
    }

    pub fn record(&self, check: &CheckResult) {
        self.checks.record(check.passed);
        self.check_cell(&check.name).record(check.passed);

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "surge_checks",
            "check" => check.name.clone(),
            "passed" => if check.passed { "true" } else { "false" }
        )
        .increment(1);
    }

    pub fn record_latency(&self, operation: Operation, latency: Duration) {
        self.latency[operation.index()].push(latency);

        #[cfg(feature = "metrics")]
        metrics::histogram!("surge_http_req_duration", "operation" => operation.as_str())
            .record(latency.as_secs_f64());
    }

    pub fn record_request(&self, operation: Operation, failed: bool) {
        self.requests.record(!failed);

        #[cfg(feature = "metrics")]
        if failed {
            metrics::counter!("surge_http_req_failed", "operation" => operation.as_str())
                .increment(1);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = operation;
    }

    pub fn record_scenario(&self, any_failed: bool) {
        self.scenarios.record(!any_failed);
    }

    /// Fold in one finished iteration. Iterations with no checks (skipped) count toward
    /// `iterations` only; advisory checks never mark an iteration as errored.
    pub fn record_iteration(&self, results: &[CheckResult]) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        for check in results {
            self.record(check);
        }

        let mut scored = results.iter().filter(|c| !c.advisory).peekable();
        if scored.peek().is_some() {
            self.record_scenario(scored.any(|c| !c.passed));
        }
    }

    pub fn observe_vus(&self, vus: usize) {
        self.max_vus.fetch_max(vus, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Share of scored iterations with a failed check, so far.
    pub fn error_rate(&self) -> f64 {
        self.scenarios.load().failure_ratio()
    }

    pub fn request_failure_rate(&self) -> f64 {
        self.requests.load().failure_ratio()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_check = self
            .per_check
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, cell)| (name.clone(), cell.load()))
            .collect();

        let mut all = vec![];
        let mut latency = BTreeMap::new();
        for op in Operation::ALL {
            let samples = self.latency[op.index()].data();
            latency.insert(op, LatencyDistribution::from_samples(&samples));
            all.extend(samples);
        }

        MetricsSnapshot {
            elapsed: self.elapsed(),
            iterations: self.iterations.load(Ordering::Relaxed),
            max_vus: self.max_vus.load(Ordering::Relaxed),
            checks: self.checks.load(),
            per_check,
            requests: self.requests.load(),
            scenarios: self.scenarios.load(),
            latency,
            overall_latency: LatencyDistribution::from_samples(&all),
        }
    }

    fn check_cell(&self, name: &str) -> Arc<TallyCell> {
        if let Some(cell) = self
            .per_check
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return cell.clone();
        }

        self.per_check
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterations_and_scenarios() {
        let metrics = RunMetrics::new();
        metrics.record_iteration(&[
            CheckResult::new("status is 200", true),
            CheckResult::new("has valid JSON", true),
        ]);
        metrics.record_iteration(&[
            CheckResult::new("status is 200", false),
            CheckResult::new("has valid JSON", true),
        ]);
        metrics.record_iteration(&[]);
        metrics.record_iteration(&[
            CheckResult::new("status is 200", true),
            CheckResult::advisory("has valid JSON", false),
        ]);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.iterations, 4);
        assert_eq!(snapshot.scenarios, Tally { passed: 2, failed: 1 });
        assert_eq!(snapshot.checks, Tally { passed: 4, failed: 2 });
        assert_eq!(snapshot.check("has valid JSON"), Tally { passed: 2, failed: 1 });
        assert_eq!(snapshot.check("status is 200"), Tally { passed: 2, failed: 1 });
        assert_eq!(snapshot.check("missing"), Tally::default());
    }

    #[test]
    fn latency_is_split_by_operation() {
        let metrics = RunMetrics::new();
        metrics.record_latency(Operation::Create, Duration::from_millis(10));
        metrics.record_latency(Operation::Create, Duration::from_millis(30));
        metrics.record_latency(Operation::Delete, Duration::from_millis(20));
        metrics.observe_vus(4);
        metrics.observe_vus(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.max_vus, 4);
        assert_eq!(snapshot.latency(Some(Operation::Create)).map(|d| d.count()), Some(2));
        assert_eq!(snapshot.latency(Some(Operation::Delete)).map(|d| d.count()), Some(1));
        assert_eq!(snapshot.latency(Some(Operation::ReadAll)).map(|d| d.count()), Some(0));

        let overall = snapshot.latency(None).unwrap();
        assert_eq!(overall.count(), 3);
        assert_eq!(overall.min(), Duration::from_millis(10));
        assert_eq!(overall.max(), Duration::from_millis(30));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_recording_loses_nothing() {
        let metrics = Arc::new(RunMetrics::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    for j in 0..1_000 {
                        let check = CheckResult::new(format!("check-{}", j % 3), (i + j) % 4 != 0);
                        metrics.record_iteration(&[check]);
                        metrics.record_request(Operation::ReadOne, j % 10 == 0);
                        metrics.record_latency(Operation::ReadOne, Duration::from_micros(j));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.iterations, 8_000);
        assert_eq!(snapshot.checks.total(), 8_000);
        assert_eq!(snapshot.checks.failed, 2_000);
        assert_eq!(snapshot.requests.failed, 800);
        assert_eq!(
            snapshot.per_check.values().map(Tally::total).sum::<u64>(),
            8_000
        );
        assert_eq!(snapshot.overall_latency.count(), 8_000);
    }
}
