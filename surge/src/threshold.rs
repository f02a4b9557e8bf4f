//! Threshold evaluation against a frozen [`MetricsSnapshot`].
use std::fmt;
use std::time::Duration;
use surge_core::{Aggregation, LatencyDistribution, MetricKey, MetricsSnapshot, Tally, ThresholdSpec};

#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdResult {
    pub spec: ThresholdSpec,
    pub actual: f64,
    pub passed: bool,
}

impl fmt::Display for ThresholdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { '✓' } else { '✗' };
        write!(f, "{mark} {} (actual={:.4})", self.spec, self.actual)
    }
}

/// Outcome of every threshold; the run passes only if all of them do.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub results: Vec<ThresholdResult>,
    pub passed: bool,
}

impl Verdict {
    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "{result}")?;
        }
        if self.passed {
            write!(f, "PASSED: all {} thresholds met", self.results.len())
        } else {
            write!(
                f,
                "FAILED: {} of {} thresholds crossed",
                self.failures().count(),
                self.results.len()
            )
        }
    }
}

/// Evaluate every spec. Pure: the same snapshot always yields the same verdict.
pub fn evaluate(snapshot: &MetricsSnapshot, specs: &[ThresholdSpec]) -> Verdict {
    let results: Vec<_> = specs
        .iter()
        .map(|spec| {
            let actual = measure(snapshot, spec);
            ThresholdResult {
                spec: spec.clone(),
                actual,
                passed: spec.comparator.compare(actual, spec.limit),
            }
        })
        .collect();

    let passed = results.iter().all(|r| r.passed);
    Verdict { results, passed }
}

/// The aggregated value a spec compares against. Durations are in milliseconds; an empty
/// metric measures zero.
fn measure(snapshot: &MetricsSnapshot, spec: &ThresholdSpec) -> f64 {
    match &spec.metric {
        MetricKey::RequestDuration(op) => {
            let empty = LatencyDistribution::default();
            let dist = snapshot.latency(*op).unwrap_or(&empty);
            let ms = |d: Duration| d.as_nanos() as f64 / 1e6;
            match spec.aggregation {
                Aggregation::Percentile(p) => ms(dist.quantile(p / 100.)),
                Aggregation::Avg => ms(dist.mean()),
                Aggregation::Min => ms(dist.min()),
                Aggregation::Max => ms(dist.max()),
                Aggregation::Med => ms(dist.median()),
                Aggregation::Count | Aggregation::Rate => dist.count() as f64,
            }
        }
        MetricKey::RequestFailed => failures(snapshot.requests, spec.aggregation),
        MetricKey::Errors => failures(snapshot.scenarios, spec.aggregation),
        MetricKey::Checks(name) => {
            let tally = match name {
                Some(name) => snapshot.check(name),
                None => snapshot.checks,
            };
            match spec.aggregation {
                Aggregation::Count => tally.passed as f64,
                _ => tally.pass_ratio(),
            }
        }
        MetricKey::Iterations => match spec.aggregation {
            Aggregation::Count => snapshot.iterations as f64,
            _ => snapshot.iteration_rate(),
        },
    }
}

fn failures(tally: Tally, aggregation: Aggregation) -> f64 {
    match aggregation {
        Aggregation::Count => tally.failed as f64,
        _ => tally.failure_ratio(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_core::{Comparator, Operation, RunConfig};

    fn snapshot() -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            elapsed: Duration::from_secs(10),
            iterations: 200,
            checks: Tally {
                passed: 570,
                failed: 30,
            },
            requests: Tally {
                passed: 190,
                failed: 10,
            },
            scenarios: Tally {
                passed: 180,
                failed: 20,
            },
            ..Default::default()
        };
        let latencies: Vec<_> = (1..=200).map(Duration::from_millis).collect();
        snapshot.overall_latency = LatencyDistribution::from_samples(&latencies);
        snapshot.latency.insert(
            Operation::Create,
            LatencyDistribution::from_samples(&[Duration::from_millis(700); 10]),
        );
        snapshot
            .per_check
            .insert("POST /api/users status is 201".to_string(), Tally { passed: 9, failed: 1 });
        snapshot
    }

    fn spec(metric: &str, condition: &str) -> ThresholdSpec {
        ThresholdSpec::parse(metric, condition).unwrap()
    }

    #[test]
    fn measures_each_metric() {
        let snapshot = snapshot();
        let verdict = evaluate(
            &snapshot,
            &[
                spec("http_req_failed", "rate<0.05"),
                spec("http_req_failed", "count==10"),
                spec("errors", "rate<0.1"),
                spec("checks", "rate>0.9"),
                spec("checks{check:POST /api/users status is 201}", "rate>=0.9"),
                spec("iterations", "rate==20"),
                spec("iterations", "count>100"),
                spec("http_req_duration{operation:create}", "avg<800"),
                spec("http_req_duration", "max<=200"),
            ],
        );

        let actual: Vec<_> = verdict.results.iter().map(|r| r.actual).collect();
        assert!((actual[0] - 0.05).abs() < 1e-9);
        assert_eq!(actual[1], 10.);
        assert!((actual[2] - 0.1).abs() < 1e-9);
        assert!((actual[3] - 0.95).abs() < 1e-9);
        assert!((actual[4] - 0.9).abs() < 1e-9);
        assert_eq!(actual[5], 20.);
        assert_eq!(actual[6], 200.);
        assert!((actual[7] - 700.).abs() < 1e-6);
        assert!((actual[8] - 200.).abs() < 1e-6);

        let passed: Vec<_> = verdict.results.iter().map(|r| r.passed).collect();
        // Exactly 5% failed and exactly 10% errored; `<` is strict.
        assert_eq!(passed, vec![false, true, false, true, true, true, true, true, true]);
        assert!(!verdict.passed);
        assert_eq!(verdict.failures().count(), 2);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let snapshot = snapshot();
        let specs = RunConfig::default().thresholds;
        assert_eq!(evaluate(&snapshot, &specs), evaluate(&snapshot, &specs));
    }

    #[test]
    fn empty_metrics_measure_zero() {
        let verdict = evaluate(
            &MetricsSnapshot::default(),
            &[
                spec("http_req_duration", "p(95)<500"),
                spec("http_req_duration{operation:delete}", "p(99)<1"),
                spec("http_req_failed", "rate<0.05"),
                spec("checks", "rate>0.5"),
            ],
        );
        assert!(verdict.results.iter().all(|r| r.actual == 0.));
        assert_eq!(
            verdict.results.iter().map(|r| r.passed).collect::<Vec<_>>(),
            vec![true, true, true, false]
        );
    }

    #[test]
    fn twenty_percent_failures_fail_the_gate() {
        let snapshot = MetricsSnapshot {
            requests: Tally {
                passed: 800,
                failed: 200,
            },
            ..Default::default()
        };
        let gate = ThresholdSpec::new(MetricKey::RequestFailed, Aggregation::Rate, Comparator::Lt, 0.05)
            .unwrap();
        let verdict = evaluate(&snapshot, &[gate]);
        assert!(!verdict.passed);
        assert!((verdict.results[0].actual - 0.2).abs() < 1e-9);
    }

    #[test]
    fn displays_marks() {
        let verdict = evaluate(&snapshot(), &[spec("http_req_failed", "rate<0.5")]);
        let text = verdict.to_string();
        assert!(text.starts_with("✓ http_req_failed rate<0.5 (actual=0.0500)"));
        assert!(text.ends_with("PASSED: all 1 thresholds met"));
    }
}
