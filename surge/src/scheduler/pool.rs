use futures_util::FutureExt;
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

struct Vu {
    id: usize,
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// The set of running virtual-user loops.
///
/// Each loop receives a stop flag and is expected to return once it observes `true` between
/// iterations. Loops are never aborted.
pub struct VuPool<T> {
    spawn_vu: T,
    active: Vec<Vu>,
    retiring: Vec<JoinHandle<()>>,
    next_id: usize,
}

impl<T, F> VuPool<T>
where
    T: Fn(usize, watch::Receiver<bool>) -> F + Send,
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(spawn_vu: T) -> Self {
        Self {
            spawn_vu,
            active: vec![],
            retiring: vec![],
            next_id: 0,
        }
    }

    /// Spawn loops until `concurrency` are active, or signal the newest ones to stop.
    pub fn set_concurrency(&mut self, concurrency: usize) {
        while self.active.len() < concurrency {
            let id = self.next_id;
            self.next_id += 1;

            let (stop, rx) = watch::channel(false);
            let handle = tokio::spawn((self.spawn_vu)(id, rx).in_current_span());
            self.active.push(Vu { id, handle, stop });
        }

        if self.active.len() > concurrency {
            for vu in self.active.drain(concurrency..) {
                trace!("Retiring VU {}", vu.id);
                // A closed receiver means the loop already exited.
                let _ = vu.stop.send(true);
                self.retiring.push(vu.handle);
            }
        }
    }

    pub fn concurrency(&self) -> usize {
        self.active.len()
    }

    /// Loops told to stop that are still finishing their iteration.
    pub fn retiring(&self) -> usize {
        self.retiring.len()
    }

    /// Drop finished loops. Active loops that ended on their own no longer count toward
    /// [`concurrency`](Self::concurrency), so the next `set_concurrency` replaces them.
    pub fn reap(&mut self) {
        self.retiring.retain_mut(|handle| !finished(handle));

        let before = self.active.len();
        self.active.retain_mut(|vu| !finished(&mut vu.handle));
        let lost = before - self.active.len();
        if lost > 0 {
            warn!("{lost} VUs exited before being retired");
        }
    }

    /// Signal every loop and wait for all of them, active and retiring, to finish.
    pub async fn shutdown(mut self) {
        self.set_concurrency(0);
        for handle in self.retiring.drain(..) {
            if let Err(err) = handle.await {
                error!("Virtual user task failed: {err}");
            }
        }
    }
}

fn finished(handle: &mut JoinHandle<()>) -> bool {
    if !handle.is_finished() {
        return false;
    }
    if let Some(Err(err)) = handle.now_or_never() {
        error!("Virtual user task failed: {err}");
    }
    true
}
