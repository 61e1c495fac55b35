//! Capability interface over the host: one method per probe family.
//!
//! The engine only talks to a `MetricsSource`, so probes can be driven by
//! `fake::FakeSource` in tests and the OS-specific work stays in `system`.

pub mod fake;
pub mod system;

use std::fmt;

use crate::counters::CpuTicks;
use crate::error::ProbeError;
use crate::types::LoadAverage;

pub use system::SysinfoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Cumulative byte counters of one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    // raw as reported; may be out of range on odd firmware
    pub percent: f64,
    pub charging: bool,
}

/// One row of the process table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub pid: u32,
    pub name: String,
    /// Full command line, space-joined.
    pub command: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub rss_bytes: u64,
}

pub trait MetricsSource: Send + Sync {
    fn cpu_ticks(&self) -> Result<CpuTicks, ProbeError>;
    fn memory(&self) -> Result<MemoryReading, ProbeError>;
    fn network_interfaces(&self) -> Result<Vec<InterfaceCounters>, ProbeError>;
    /// Device utilization in percent.
    fn gpu_usage(&self) -> Result<f64, ProbeError>;
    /// `Ok(None)` when the host has no battery.
    fn battery(&self) -> Result<Option<BatteryReading>, ProbeError>;
    fn load_average(&self) -> Result<LoadAverage, ProbeError>;
    /// Unix seconds.
    fn boot_time(&self) -> Result<u64, ProbeError>;
    fn processes(&self) -> Result<Vec<ProcessRow>, ProbeError>;
}

/// Probe families, used for logging and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Cpu,
    Memory,
    Network,
    Gpu,
    Battery,
    Load,
    Uptime,
    Processes,
    Usage,
    Mcp,
    DataDir,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Cpu => "cpu",
            ProbeKind::Memory => "memory",
            ProbeKind::Network => "network",
            ProbeKind::Gpu => "gpu",
            ProbeKind::Battery => "battery",
            ProbeKind::Load => "load",
            ProbeKind::Uptime => "uptime",
            ProbeKind::Processes => "processes",
            ProbeKind::Usage => "usage",
            ProbeKind::Mcp => "mcp",
            ProbeKind::DataDir => "data_dir",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
