//! Counter store: the previous cycle's cumulative readings.

use std::sync::Mutex;
use std::time::Instant;

/// Cumulative CPU ticks since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
    pub nice: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounters {
    pub network_bytes_in: u64,
    pub network_bytes_out: u64,
    pub cpu: CpuTicks,
}

/// What the store hands back: the raw counters plus enough bookkeeping to tell
/// a first sample apart from a real zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Baseline {
    pub counters: RawCounters,
    // set once a cpu reading has been committed
    pub cpu_primed: bool,
    // when the committed network totals were read
    pub network_at: Option<Instant>,
}

impl Baseline {
    pub fn cpu(&self) -> Option<&CpuTicks> {
        self.cpu_primed.then_some(&self.counters.cpu)
    }

    pub fn network(&self) -> Option<(u64, u64, Instant)> {
        self.network_at.map(|at| {
            (
                self.counters.network_bytes_in,
                self.counters.network_bytes_out,
                at,
            )
        })
    }
}

/// Holds the last committed baseline. No validation here; delta math and
/// clamping live in the snapshot builder.
#[derive(Debug, Default)]
pub struct CounterStore {
    inner: Mutex<Baseline>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> Baseline {
        match self.inner.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn commit(&self, next: Baseline) {
        match self.inner.lock() {
            Ok(mut g) => *g = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
