//! Drives the virtual-user population toward the ramp profile's target.
mod timer;

use crate::transport::Transport;
use crate::vu::{DriverShared, VirtualUser};
use prload_core::{RampProfile, SCHEDULER_TICK};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use timer::Timer;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
struct Slot {
    handle: Option<JoinHandle<()>>,
    iterations: Arc<AtomicU64>,
}

impl Slot {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// One task per virtual user, indexed by slot. Slot `i` runs the VU with id `i + 1`.
pub(crate) struct VirtualUserPool<T> {
    shared: Arc<DriverShared<T>>,
    slots: Vec<Slot>,
}

impl<T> VirtualUserPool<T>
where
    T: Transport + Send + Sync + 'static,
{
    pub fn new(shared: Arc<DriverShared<T>>) -> Self {
        Self {
            shared,
            slots: vec![],
        }
    }

    /// Publish `target` and start drivers for every empty or finished slot below it. Drivers
    /// above it notice on their own once their current iteration ends.
    pub fn set_concurrency(&mut self, target: usize) {
        self.shared.target.store(target, Ordering::Release);

        if self.slots.len() < target {
            self.slots.resize_with(target, Slot::default);
        }

        for (idx, slot) in self.slots.iter_mut().enumerate().take(target) {
            if slot.is_running() {
                continue;
            }

            let vu_id = idx as u32 + 1;
            trace!("Spawning VU {vu_id}");
            let vu = VirtualUser::new(vu_id, self.shared.clone(), slot.iterations.clone());
            slot.handle = Some(tokio::spawn(vu.run()));
        }
    }

    /// Drivers still running, including ones finishing a retiring iteration.
    pub fn active(&self) -> usize {
        self.slots.iter().filter(|s| s.is_running()).count()
    }

    /// Retire everyone and wait for in-flight iterations to finish.
    pub async fn shutdown(mut self) {
        self.shared.target.store(0, Ordering::Release);

        for slot in self.slots.iter_mut() {
            if let Some(handle) = slot.handle.take() {
                if let Err(err) = handle.await {
                    error!("Virtual user task failed: {err}");
                }
            }
        }
    }

    #[cfg(test)]
    fn iterations(&self, slot: usize) -> u64 {
        self.slots[slot].iterations.load(Ordering::Relaxed)
    }
}

/// Follow `profile` from `start` until its last stage ends, then drain the pool. Returns the
/// peak number of concurrently active drivers.
pub(crate) async fn run_ramp<T>(
    profile: &RampProfile,
    start: Instant,
    mut pool: VirtualUserPool<T>,
) -> usize
where
    T: Transport + Send + Sync + 'static,
{
    let total = profile.total_duration();
    let mut timer = Timer::new(SCHEDULER_TICK).await;
    debug!(
        "Ramping over {} with a {timer} tick",
        humantime::format_duration(total)
    );

    let mut current = None;
    let mut vus_max = 0;
    loop {
        let elapsed = start.elapsed();
        if elapsed >= total {
            break;
        }

        let target = profile.target_at(elapsed) as usize;
        if current != Some(target) {
            debug!("Target concurrency {target} at {elapsed:?}");
            current = Some(target);
        }
        pool.set_concurrency(target);
        let active = pool.active();
        vus_max = vus_max.max(active);

        #[cfg(feature = "metrics")]
        metrics::gauge!("vus").set(active as f64);

        timer.tick().await;
    }

    info!("Ramp complete; waiting on in-flight iterations");
    pool.shutdown().await;

    #[cfg(feature = "metrics")]
    metrics::gauge!("vus").set(0.);

    vus_max
}
