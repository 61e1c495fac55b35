//! Fixed-interval driver: one cycle per tick, never two at once, bounded
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::{CycleOutcome, Engine};

pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop ticking and wait for the in-flight cycle, at most `grace`.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!("scheduler task ended abnormally: {e}");
        }
    }
}

pub fn spawn_scheduler(engine: Arc<Engine>, period: Duration, grace: Duration) -> SchedulerHandle {
    let (stop, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<CycleOutcome>> = None;
        info!(?period, "scheduler started");

        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {
                    if current.as_ref().is_some_and(|h| !h.is_finished()) {
                        engine.note_skipped();
                        continue;
                    }
                    let e = Arc::clone(&engine);
                    current = Some(tokio::spawn(async move { e.run_cycle().await }));
                }
            }
        }

        if let Some(mut h) = current {
            if !h.is_finished() {
                debug!("waiting up to {grace:?} for in-flight cycle");
                if timeout(grace, &mut h).await.is_err() {
                    warn!("in-flight cycle exceeded shutdown grace; aborting");
                    h.abort();
                    let _ = h.await;
                }
            }
        }
        info!("scheduler stopped");
    });
    SchedulerHandle { stop, task }
}
