//! Snapshot builder: runs every probe for one cycle on the blocking pool and
//! reconciles the readings with the counter store's baseline.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::counters::{Baseline, CpuTicks};
use crate::error::ProbeError;
use crate::probes::{self, SessionRule};
use crate::rates;
use crate::source::{MemoryReading, MetricsSource, ProbeKind, ProcessRow};
use crate::types::{
    AssistantTelemetry, BatteryStatus, LoadAverage, McpServer, Snapshot, UsageStats,
};

/// Summed physical-interface totals and when they were read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkSample {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub at: Instant,
}

/// Raw probe output for one cycle. `None` means the probe failed and its
/// fallback applies.
#[derive(Debug, Clone, Default)]
pub struct Readings {
    pub cpu: Option<CpuTicks>,
    pub memory: Option<MemoryReading>,
    pub network: Option<NetworkSample>,
    pub gpu: Option<f64>,
    pub battery: Option<BatteryStatus>,
    pub load: Option<LoadAverage>,
    pub boot_time: Option<u64>,
    pub processes: Option<Vec<ProcessRow>>,
    pub usage: Option<UsageStats>,
    pub mcp_servers: Vec<McpServer>,
    pub data_dir_present: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CycleContext {
    pub seq: u64,
    pub timestamp_ms: i64,
    pub now_unix: u64,
    pub top_n: usize,
}

impl CycleContext {
    pub fn now(seq: u64, top_n: usize) -> Self {
        let now = chrono::Utc::now();
        Self {
            seq,
            timestamp_ms: now.timestamp_millis(),
            now_unix: u64::try_from(now.timestamp()).unwrap_or(0),
            top_n,
        }
    }
}

type Pending<T> = Result<JoinHandle<Result<T, ProbeError>>, ProbeError>;

type Busy = Arc<Mutex<HashSet<ProbeKind>>>;

// Marks a probe family as having a call on the blocking pool. Dropped by the
// blocking closure itself, so a call that outlives its timeout keeps the
// family claimed until it really returns.
struct FamilyClaim {
    busy: Busy,
    kind: ProbeKind,
}

impl FamilyClaim {
    fn acquire(busy: &Busy, kind: ProbeKind) -> Option<Self> {
        let fresh = busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
        fresh.then(|| FamilyClaim {
            busy: Arc::clone(busy),
            kind,
        })
    }
}

impl Drop for FamilyClaim {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
    }
}

pub struct Sampler {
    source: Arc<dyn MetricsSource>,
    busy: Busy,
    probe_timeout: Duration,
    assistant_dir: Option<PathBuf>,
    usage_log: Option<PathBuf>,
    mcp_files: Vec<PathBuf>,
}

impl Sampler {
    pub fn new(source: Arc<dyn MetricsSource>, cfg: &AgentConfig) -> Self {
        Self {
            source,
            busy: Arc::default(),
            probe_timeout: cfg.probe_timeout,
            assistant_dir: cfg.assistant_dir.clone(),
            usage_log: cfg.usage_log_path(),
            mcp_files: cfg.mcp_config_files(),
        }
    }

    /// Start one probe call, unless the family's previous call is still
    /// running; then the family falls back this cycle instead of piling up
    /// another blocked thread.
    fn spawn<T, F>(&self, kind: ProbeKind, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MetricsSource) -> Result<T, ProbeError> + Send + 'static,
    {
        let claim = FamilyClaim::acquire(&self.busy, kind).ok_or(ProbeError::Stalled)?;
        let source = Arc::clone(&self.source);
        Ok(tokio::task::spawn_blocking(move || {
            let _claim = claim;
            f(source.as_ref())
        }))
    }

    /// Run all probes concurrently. Never fails: each probe either answers in
    /// time or yields `None`.
    pub async fn sample(&self) -> Readings {
        let cpu = self.spawn(ProbeKind::Cpu, |s| s.cpu_ticks());
        let memory = self.spawn(ProbeKind::Memory, |s| s.memory());
        let network = self.spawn(ProbeKind::Network, |s| {
            let ifaces = s.network_interfaces()?;
            let at = Instant::now();
            let (rx_bytes, tx_bytes) = probes::physical_totals(&ifaces);
            Ok(NetworkSample {
                rx_bytes,
                tx_bytes,
                at,
            })
        });
        let gpu = self.spawn(ProbeKind::Gpu, |s| s.gpu_usage().map(rates::clamp_percent));
        let battery = self.spawn(ProbeKind::Battery, |s| s.battery().map(probes::battery_status));
        let load = self.spawn(ProbeKind::Load, |s| s.load_average());
        let boot = self.spawn(ProbeKind::Uptime, |s| s.boot_time());
        let procs = self.spawn(ProbeKind::Processes, |s| s.processes());

        let usage_log = self.usage_log.clone();
        let today = chrono::Local::now().date_naive();
        let usage = self.spawn(ProbeKind::Usage, move |_| {
            Ok(usage_log.and_then(|p| crate::usage::read_usage(&p, today)))
        });
        let mcp_files = self.mcp_files.clone();
        let mcp = self.spawn(ProbeKind::Mcp, move |_| Ok(crate::mcp::discover(&mcp_files)));
        let assistant_dir = self.assistant_dir.clone();
        let data_dir = self.spawn(ProbeKind::DataDir, move |_| {
            Ok(assistant_dir.is_some_and(|d| d.is_dir()))
        });

        let t = self.probe_timeout;
        let (cpu, memory, network, gpu, battery, load, boot_time, processes, usage, mcp, data_dir) = tokio::join!(
            settle(ProbeKind::Cpu, cpu, t),
            settle(ProbeKind::Memory, memory, t),
            settle(ProbeKind::Network, network, t),
            settle(ProbeKind::Gpu, gpu, t),
            settle(ProbeKind::Battery, battery, t),
            settle(ProbeKind::Load, load, t),
            settle(ProbeKind::Uptime, boot, t),
            settle(ProbeKind::Processes, procs, t),
            settle(ProbeKind::Usage, usage, t),
            settle(ProbeKind::Mcp, mcp, t),
            settle(ProbeKind::DataDir, data_dir, t),
        );

        Readings {
            cpu,
            memory,
            network,
            gpu,
            battery: battery.flatten(),
            load,
            boot_time,
            processes,
            usage: usage.flatten(),
            mcp_servers: mcp.unwrap_or_default(),
            data_dir_present: data_dir.unwrap_or(false),
        }
    }
}

/// Await one probe, bounded by `limit`. Errors, panics and timeouts all
/// become `None`.
async fn settle<T>(kind: ProbeKind, pending: Pending<T>, limit: Duration) -> Option<T> {
    let res = match pending {
        Err(e) => Err(e),
        Ok(handle) => match tokio::time::timeout(limit, handle).await {
            Ok(Ok(r)) => r,
            Ok(Err(join_err)) => Err(ProbeError::Panicked(join_err.to_string())),
            Err(_) => Err(ProbeError::TimedOut(limit)),
        },
    };
    match res {
        Ok(v) => Some(v),
        Err(ProbeError::Unsupported(what)) => {
            debug!(probe = %kind, "{what}; using fallback");
            None
        }
        Err(e) => {
            warn!(probe = %kind, "probe failed, using fallback: {e}");
            None
        }
    }
}

/// Combine one cycle's readings with the previous baseline.
///
/// Returns the snapshot and the baseline to commit. A family whose probe
/// failed keeps its previous counters (and read time) so the next good reading
/// is diffed against real data rather than zeros.
pub fn build_snapshot(
    r: Readings,
    baseline: &Baseline,
    ctx: &CycleContext,
    rule: &SessionRule,
) -> (Snapshot, Baseline) {
    let mut next = *baseline;

    let cpu_usage_percent = match r.cpu {
        Some(ticks) => {
            let usage = rates::cpu_usage_percent(baseline.cpu(), &ticks);
            next.counters.cpu = ticks;
            next.cpu_primed = true;
            usage
        }
        None => 0.0,
    };

    let (network_in_bytes_per_sec, network_out_bytes_per_sec) = match r.network {
        Some(n) => {
            let prev = baseline.network();
            let elapsed = prev
                .map(|(_, _, at)| n.at.saturating_duration_since(at))
                .unwrap_or_default();
            let rx = rates::byte_rate(prev.map(|p| p.0), n.rx_bytes, elapsed);
            let tx = rates::byte_rate(prev.map(|p| p.1), n.tx_bytes, elapsed);
            next.counters.network_bytes_in = n.rx_bytes;
            next.counters.network_bytes_out = n.tx_bytes;
            next.network_at = Some(n.at);
            (rx, tx)
        }
        None => (0.0, 0.0),
    };

    let (memory_used_bytes, memory_total_bytes) = r
        .memory
        .map(|m| (m.used_bytes.min(m.total_bytes), m.total_bytes))
        .unwrap_or((0, 0));

    let rows = r.processes.unwrap_or_default();
    let sessions = probes::find_sessions(&rows, rule);
    let total_memory_mb = sessions.iter().map(|s| s.memory_mb).sum();

    let snapshot = Snapshot {
        seq: ctx.seq,
        timestamp_ms: ctx.timestamp_ms,
        cpu_usage_percent,
        gpu_usage_percent: r.gpu.map(rates::clamp_percent).unwrap_or(0.0),
        memory_used_bytes,
        memory_total_bytes,
        memory_usage_percent: rates::percent_of(memory_used_bytes, memory_total_bytes),
        network_in_bytes_per_sec,
        network_out_bytes_per_sec,
        load_average: r.load.unwrap_or_default(),
        battery: r.battery,
        uptime_secs: rates::uptime_secs(ctx.now_unix, r.boot_time.unwrap_or(0)),
        top_processes: probes::top_processes(&rows, ctx.top_n),
        assistant: AssistantTelemetry {
            sessions,
            total_memory_mb,
            usage: r.usage,
            mcp_servers: r.mcp_servers,
            data_dir_present: r.data_dir_present,
        },
    };
    (snapshot, next)
}
