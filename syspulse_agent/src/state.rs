//! Shared engine state: counter store, history, latest snapshot, subscribers
//! and the single-cycle-in-flight guard.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::AgentConfig;
use crate::counters::CounterStore;
use crate::history::MetricHistory;
use crate::probes::SessionRule;
use crate::sampler::{build_snapshot, CycleContext, Sampler};
use crate::source::MetricsSource;
use crate::types::Snapshot;

/// Receives every published snapshot. Called on the cycle's task, so keep it
/// quick; hand heavy work off to a channel.
pub trait SnapshotSubscriber: Send + Sync {
    fn on_snapshot(&self, snapshot: &Arc<Snapshot>);
}

impl<F> SnapshotSubscriber for F
where
    F: Fn(&Arc<Snapshot>) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &Arc<Snapshot>) {
        self(snapshot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CyclePhase {
    Idle = 0,
    Sampling = 1,
    Reconciling = 2,
    Published = 3,
}

impl CyclePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CyclePhase::Sampling,
            2 => CyclePhase::Reconciling,
            3 => CyclePhase::Published,
            _ => CyclePhase::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Published(Arc<Snapshot>),
    /// Another cycle was still running.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub published: u64,
    pub skipped: u64,
    pub discarded: u64,
}

pub struct Engine {
    sampler: Sampler,
    counters: CounterStore,
    history: Mutex<MetricHistory>,
    latest: watch::Sender<Option<Arc<Snapshot>>>,
    subscribers: Mutex<Vec<Arc<dyn SnapshotSubscriber>>>,
    session_rule: SessionRule,
    top_n: usize,

    in_flight: AtomicBool,
    phase: AtomicU8,
    seq: AtomicU64,
    published: AtomicU64,
    skipped: AtomicU64,
    discarded: AtomicU64,
}

// Releases the in-flight flag however the cycle ends; a cycle dropped before
// publishing (aborted on shutdown) is counted as discarded.
struct CycleGuard<'a> {
    engine: &'a Engine,
    published: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.engine.discarded.fetch_add(1, Ordering::Relaxed);
            warn!("sampling cycle discarded before publish");
        }
        self.engine.set_phase(CyclePhase::Idle);
        self.engine.in_flight.store(false, Ordering::Release);
    }
}

impl Engine {
    pub fn new(source: Arc<dyn MetricsSource>, cfg: &AgentConfig) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            sampler: Sampler::new(source, cfg),
            counters: CounterStore::new(),
            history: Mutex::new(MetricHistory::new(cfg.history_capacity)),
            latest,
            subscribers: Mutex::new(Vec::new()),
            session_rule: cfg.session_rule.clone(),
            top_n: cfg.top_n,
            in_flight: AtomicBool::new(false),
            phase: AtomicU8::new(CyclePhase::Idle as u8),
            seq: AtomicU64::new(0),
            published: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn add_subscriber(&self, sub: Arc<dyn SnapshotSubscriber>) {
        match self.subscribers.lock() {
            Ok(mut g) => g.push(sub),
            Err(poisoned) => poisoned.into_inner().push(sub),
        }
    }

    /// Latest-value channel; `None` until the first cycle publishes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.latest.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.borrow().clone()
    }

    pub fn history(&self) -> MetricHistory {
        match self.history.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        CyclePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            published: self.published.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn set_phase(&self, p: CyclePhase) {
        trace!(phase = ?p, "cycle phase");
        self.phase.store(p as u8, Ordering::Release);
    }

    pub(crate) fn note_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        debug!("previous cycle still in flight; skipping tick");
    }

    fn try_begin(&self) -> Option<CycleGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                engine: self,
                published: false,
            })
    }

    /// Run one full cycle, or skip if one is already running.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(mut guard) = self.try_begin() else {
            self.note_skipped();
            return CycleOutcome::Skipped;
        };

        self.set_phase(CyclePhase::Sampling);
        let readings = self.sampler.sample().await;

        self.set_phase(CyclePhase::Reconciling);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let ctx = CycleContext::now(seq, self.top_n);
        let baseline = self.counters.read();
        let (snapshot, next) = build_snapshot(readings, &baseline, &ctx, &self.session_rule);
        self.counters.commit(next);
        let snapshot = Arc::new(snapshot);

        self.set_phase(CyclePhase::Published);
        self.publish(&snapshot);
        guard.published = true;
        CycleOutcome::Published(snapshot)
    }

    fn publish(&self, snapshot: &Arc<Snapshot>) {
        self.latest.send_replace(Some(Arc::clone(snapshot)));

        match self.history.lock() {
            Ok(mut h) => h.record(snapshot),
            Err(poisoned) => poisoned.into_inner().record(snapshot),
        }

        let subs: Vec<Arc<dyn SnapshotSubscriber>> = match self.subscribers.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for sub in subs {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                sub.on_snapshot(snapshot)
            })) {
                warn!("snapshot subscriber panicked: {e:?}");
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(seq = snapshot.seq, "snapshot published");
    }
}
