//! The load test future: health gate, staged load, verdict.
use crate::error::RunError;
use crate::metrics::RunMetrics;
use crate::request::RequestExecutor;
use crate::scenario::{ScenarioRegistry, VuContext};
use crate::scheduler::{Scheduler, StageSchedule, VuPool};
use crate::selector::ScenarioSelector;
use crate::threshold::{evaluate, Verdict};
use crate::transport::{HttpRequest, ReqwestTransport, Transport};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use surge_core::{MetricsSnapshot, RunConfig, ThinkTime, HEALTH_PATH};
use tokio::sync::watch;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// A configured load test. Await it to run.
///
/// ```ignore
/// let report = LoadTest::new(RunConfig::default()).seed(7).await?;
/// assert!(report.passed());
/// ```
pub struct LoadTest {
    config: RunConfig,
    transport: Option<Arc<dyn Transport>>,
    registry: Option<ScenarioRegistry>,
    seed: Option<u64>,
    runner_fut: Option<Pin<Box<dyn Future<Output = Result<RunReport, RunError>> + Send>>>,
}

impl LoadTest {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            transport: None,
            registry: None,
            seed: None,
            runner_fut: None,
        }
    }

    /// Send requests through `transport` instead of a `reqwest` client for `base_url`.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the built-in executors.
    pub fn registry(mut self, registry: ScenarioRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Seed every virtual user's RNG for reproducible scenario mixes.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}

impl Future for LoadTest {
    type Output = Result<RunReport, RunError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.runner_fut.is_none() {
            let config = self.config.clone();
            let transport = self
                .transport
                .take()
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new(&config.base_url)));
            let registry = self
                .registry
                .take()
                .unwrap_or_else(|| ScenarioRegistry::builtin(&config));
            let seed = self.seed;
            self.runner_fut = Some(Box::pin(run_load_test(config, transport, registry, seed)));
        }

        if let Some(runner) = &mut self.runner_fut {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

/// Final metrics and threshold verdict of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub snapshot: MetricsSnapshot,
    pub verdict: Verdict,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.snapshot;
        writeln!(
            f,
            "Ran {} iterations in {} ({:.2}/s), peak {} VUs",
            s.iterations,
            humantime::format_duration(Duration::from_millis(s.elapsed.as_millis() as u64)),
            s.iteration_rate(),
            s.max_vus,
        )?;
        writeln!(
            f,
            "checks: {:.2}% passed ({} ✓, {} ✗)",
            s.checks.pass_ratio() * 100.,
            s.checks.passed,
            s.checks.failed
        )?;
        for (name, tally) in &s.per_check {
            if tally.failed > 0 {
                writeln!(f, "  ✗ {name}: {} of {} failed", tally.failed, tally.total())?;
            }
        }
        writeln!(
            f,
            "http_reqs: {}, failed {:.2}%",
            s.requests.total(),
            s.requests.failure_ratio() * 100.
        )?;
        writeln!(f, "errors: {:.2}%", s.scenarios.failure_ratio() * 100.)?;
        writeln!(f, "http_req_duration: {}", s.overall_latency)?;
        for (op, dist) in &s.latency {
            if !dist.is_empty() {
                writeln!(f, "  {op}: {dist}")?;
            }
        }
        write!(f, "{}", self.verdict)
    }
}

struct VuShared {
    selector: ScenarioSelector,
    registry: ScenarioRegistry,
    metrics: Arc<RunMetrics>,
    think_time: ThinkTime,
}

#[instrument(name = "load_test", skip_all, fields(base_url = %config.base_url))]
async fn run_load_test(
    config: RunConfig,
    transport: Arc<dyn Transport>,
    registry: ScenarioRegistry,
    seed: Option<u64>,
) -> Result<RunReport, RunError> {
    config.validate()?;
    let selector = ScenarioSelector::from_config(&config)?;
    registry.ensure_covers(selector.descriptors())?;

    health_check(transport.as_ref()).await?;

    info!(
        "Starting load test: {} stages over {}",
        config.stages.len(),
        humantime::format_duration(config.total_duration())
    );

    let metrics = Arc::new(RunMetrics::new());
    let requests = RequestExecutor::new(transport, metrics.clone(), config.rate_limit);
    let shared = Arc::new(VuShared {
        selector,
        registry,
        metrics: metrics.clone(),
        think_time: config.think_time,
    });

    let base_seed = seed.unwrap_or_else(rand::random);
    debug!("VU seed base {base_seed}");

    let mut pool = VuPool::new(move |id, stop| {
        let rng = SmallRng::seed_from_u64(base_seed.wrapping_add(id as u64));
        let cx = VuContext::new(id, requests.clone(), rng);
        vu_loop(shared.clone(), cx, stop)
    });

    let scheduler = Scheduler::new(
        StageSchedule::new(config.stages.clone()),
        config.tick,
        config.progress_interval,
    );
    scheduler.run(&mut pool, &metrics).await;
    pool.shutdown().await;

    let snapshot = metrics.snapshot();
    let verdict = evaluate(&snapshot, &config.thresholds);
    for failed in verdict.failures() {
        warn!("Threshold crossed: {failed}");
    }
    info!(
        "Load test completed: {} iterations, verdict {}",
        snapshot.iterations,
        if verdict.passed { "passed" } else { "failed" }
    );

    Ok(RunReport { snapshot, verdict })
}

async fn health_check(transport: &dyn Transport) -> Result<(), RunError> {
    let res = transport
        .send(HttpRequest::get(HEALTH_PATH))
        .await
        .map_err(|err| {
            error!("Health check failed: {err}");
            RunError::HealthUnreachable(err)
        })?;

    info!("Health check status: {}", res.status);
    if res.status != 200 {
        error!("Service is not healthy, aborting test");
        return Err(RunError::Unhealthy { status: res.status });
    }
    Ok(())
}

#[instrument(name = "vu", skip_all, fields(vu = cx.vu()))]
async fn vu_loop(shared: Arc<VuShared>, mut cx: VuContext, mut stop: watch::Receiver<bool>) {
    trace!("VU started");
    loop {
        let stopped = *stop.borrow();
        if stopped {
            break;
        }

        let descriptor = shared.selector.select(cx.rng());
        trace!("Running {}", descriptor.name);
        let results = shared.registry.execute(descriptor, &mut cx).await;
        shared.metrics.record_iteration(&results);

        let pause = think_time(cx.rng(), shared.think_time);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    trace!("VU stopped");
}

fn think_time<R: Rng + ?Sized>(rng: &mut R, bounds: ThinkTime) -> Duration {
    if bounds.max > bounds.min {
        Duration::from_secs_f64(rng.gen_range(bounds.min.as_secs_f64()..bounds.max.as_secs_f64()))
    } else {
        bounds.min
    }
}
