//! Stage-driven concurrency control.
use crate::metrics::RunMetrics;
use std::future::Future;
use std::time::Duration;
use surge_core::Stage;
use tokio::sync::watch;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

mod pool;
mod timer;

pub use pool::VuPool;
use timer::Timer;

/// Target concurrency as a function of elapsed run time.
#[derive(Clone, Debug)]
pub struct StageSchedule {
    stages: Vec<Stage>,
    /// Cumulative end offset of each stage.
    ends: Vec<Duration>,
}

impl StageSchedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        let ends = stages
            .iter()
            .scan(Duration::ZERO, |end, stage| {
                *end += stage.duration;
                Some(*end)
            })
            .collect();
        Self { stages, ends }
    }

    pub fn total_duration(&self) -> Duration {
        self.ends.last().copied().unwrap_or_default()
    }

    /// The stage running at `elapsed`. Zero-length stages are never running.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let idx = self.ends.partition_point(|&end| end <= elapsed);
        (idx < self.stages.len()).then_some(idx)
    }

    /// Interpolated target at `elapsed`, `None` once the last stage is over.
    pub fn target_at(&self, elapsed: Duration) -> Option<f64> {
        let idx = self.stage_index_at(elapsed)?;
        let stage = &self.stages[idx];

        let (from, start) = match idx.checked_sub(1) {
            Some(prev) => (self.stages[prev].target as f64, self.ends[prev]),
            None => (0., Duration::ZERO),
        };
        let to = stage.target as f64;
        let progress = (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();

        Some(from + (to - from) * progress)
    }

    /// Target rounded to a whole number of virtual users; zero after the last stage.
    pub fn concurrency_at(&self, elapsed: Duration) -> usize {
        self.target_at(elapsed)
            .map(|target| target.round() as usize)
            .unwrap_or(0)
    }
}

/// Drives a [`VuPool`] along a [`StageSchedule`], re-evaluating the target every tick.
pub struct Scheduler {
    schedule: StageSchedule,
    tick: Duration,
    progress_interval: Duration,
}

impl Scheduler {
    pub fn new(schedule: StageSchedule, tick: Duration, progress_interval: Duration) -> Self {
        Self {
            schedule,
            tick,
            progress_interval,
        }
    }

    pub fn schedule(&self) -> &StageSchedule {
        &self.schedule
    }

    /// Runs until the last stage ends. Loops are left signalled or running; the caller shuts the
    /// pool down.
    pub async fn run<T, F>(&self, pool: &mut VuPool<T>, metrics: &RunMetrics)
    where
        T: Fn(usize, watch::Receiver<bool>) -> F + Send,
        F: Future<Output = ()> + Send + 'static,
    {
        let start = Instant::now();
        let mut timer = Timer::new(self.tick).await;
        let mut stage = None;
        let mut next_progress = self.progress_interval;

        debug!(
            "Scheduling {} stages over {} (tick {timer})",
            self.schedule.stages.len(),
            humantime::format_duration(self.schedule.total_duration()),
        );

        loop {
            let elapsed = start.elapsed();
            let Some(idx) = self.schedule.stage_index_at(elapsed) else {
                break;
            };

            if stage != Some(idx) {
                let current = &self.schedule.stages[idx];
                info!(
                    "Stage {}/{}: ramping to {} VUs over {}",
                    idx + 1,
                    self.schedule.stages.len(),
                    current.target,
                    humantime::format_duration(current.duration),
                );
                stage = Some(idx);
            }

            let target = self.schedule.concurrency_at(elapsed);
            if target != pool.concurrency() {
                debug!("Target concurrency {} -> {target}", pool.concurrency());
                pool.set_concurrency(target);
                metrics.observe_vus(target);
            }
            pool.reap();

            if elapsed >= next_progress {
                info!(
                    "Progress {}: {} active VUs, {} retiring, {} iterations, error rate {:.2}%, failed requests {:.2}%",
                    humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
                    pool.concurrency(),
                    pool.retiring(),
                    metrics.iterations(),
                    metrics.error_rate() * 100.,
                    metrics.request_failure_rate() * 100.,
                );
                next_progress += self.progress_interval;
            }

            timer.tick().await;
        }

        debug!("All stages complete; draining {} VUs", pool.concurrency());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::Arc;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn interpolates_between_stages() {
        let schedule = StageSchedule::new(vec![Stage::new(secs(30), 10), Stage::new(secs(60), 50)]);

        assert_eq!(schedule.concurrency_at(secs(0)), 0);
        assert_eq!(schedule.concurrency_at(secs(15)), 5);
        assert_eq!(schedule.concurrency_at(secs(30)), 10);
        assert_eq!(schedule.concurrency_at(secs(45)), 20);
        assert_eq!(schedule.concurrency_at(secs(60)), 30);
        assert_eq!(schedule.concurrency_at(secs(89)), 49);
        assert_eq!(schedule.target_at(secs(90)), None);
        assert_eq!(schedule.concurrency_at(secs(90)), 0);
        assert_eq!(schedule.total_duration(), secs(90));
    }

    #[test]
    fn rounds_to_nearest() {
        let schedule = StageSchedule::new(vec![Stage::new(secs(4), 1)]);
        assert_eq!(schedule.concurrency_at(Duration::from_millis(1_900)), 0);
        assert_eq!(schedule.concurrency_at(Duration::from_millis(2_100)), 1);
    }

    #[test]
    fn zero_length_stage_jumps() {
        let schedule = StageSchedule::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(Duration::ZERO, 100),
            Stage::new(secs(10), 100),
        ]);

        assert_eq!(schedule.stage_index_at(secs(10)), Some(2));
        assert_eq!(schedule.concurrency_at(secs(10)), 100);
        assert_eq!(schedule.concurrency_at(secs(15)), 100);
        assert_eq!(schedule.stage_index_at(secs(20)), None);
    }

    #[test]
    fn empty_schedule_is_over() {
        let schedule = StageSchedule::new(vec![]);
        assert_eq!(schedule.total_duration(), Duration::ZERO);
        assert_eq!(schedule.target_at(Duration::ZERO), None);
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn follows_the_ramp() {
        let metrics = Arc::new(RunMetrics::new());
        let mut pool = VuPool::new(|_id, mut stop: watch::Receiver<bool>| {
            async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            }
            .boxed()
        });

        let scheduler = Scheduler::new(
            StageSchedule::new(vec![Stage::new(secs(10), 20), Stage::new(secs(10), 0)]),
            Duration::from_millis(100),
            secs(5),
        );

        let start = Instant::now();
        scheduler.run(&mut pool, &metrics).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= secs(20) && elapsed < Duration::from_millis(20_200));
        assert_eq!(metrics.snapshot().max_vus, 20);
        assert!(pool.concurrency() <= 1);
        pool.shutdown().await;

        assert!(logs_contain("Stage 2/2: ramping to 0 VUs"));
        assert!(logs_contain("Progress 15s"));
    }
}
