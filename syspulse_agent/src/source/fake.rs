//! Scriptable in-memory source for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::{
    BatteryReading, InterfaceCounters, MemoryReading, MetricsSource, ProbeKind, ProcessRow,
};
use crate::counters::CpuTicks;
use crate::error::ProbeError;
use crate::types::LoadAverage;

#[derive(Debug, Clone, Default)]
struct FakeReadings {
    cpu: CpuTicks,
    memory: Option<MemoryReading>,
    interfaces: Vec<InterfaceCounters>,
    gpu: f64,
    battery: Option<BatteryReading>,
    load: LoadAverage,
    boot_time: u64,
    processes: Vec<ProcessRow>,
}

#[derive(Default)]
struct FakeState {
    readings: FakeReadings,
    failing: HashSet<ProbeKind>,
    panicking: HashSet<ProbeKind>,
    delays: HashMap<ProbeKind, Duration>,
    calls: HashMap<ProbeKind, usize>,
}

/// Scriptable `MetricsSource` for tests: set readings, inject faults, panics
/// and delays per probe family.
#[derive(Default)]
pub struct FakeSource {
    state: Mutex<FakeState>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut g = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut g)
    }

    pub fn set_cpu_ticks(&self, user: u64, system: u64, idle: u64, nice: u64) {
        self.with_state(|s| {
            s.readings.cpu = CpuTicks {
                user,
                system,
                idle,
                nice,
            }
        });
    }

    pub fn set_memory(&self, used_bytes: u64, total_bytes: u64) {
        self.with_state(|s| {
            s.readings.memory = Some(MemoryReading {
                used_bytes,
                total_bytes,
            })
        });
    }

    pub fn set_interface(&self, name: &str, rx_bytes: u64, tx_bytes: u64) {
        self.with_state(|s| {
            let ifaces = &mut s.readings.interfaces;
            match ifaces.iter_mut().find(|i| i.name == name) {
                Some(i) => {
                    i.rx_bytes = rx_bytes;
                    i.tx_bytes = tx_bytes;
                }
                None => ifaces.push(InterfaceCounters {
                    name: name.to_string(),
                    rx_bytes,
                    tx_bytes,
                }),
            }
        });
    }

    pub fn set_gpu(&self, percent: f64) {
        self.with_state(|s| s.readings.gpu = percent);
    }

    pub fn set_battery(&self, battery: Option<BatteryReading>) {
        self.with_state(|s| s.readings.battery = battery);
    }

    pub fn set_load(&self, one: f64, five: f64, fifteen: f64) {
        self.with_state(|s| s.readings.load = LoadAverage { one, five, fifteen });
    }

    pub fn set_boot_time(&self, unix_secs: u64) {
        self.with_state(|s| s.readings.boot_time = unix_secs);
    }

    pub fn set_processes(&self, rows: Vec<ProcessRow>) {
        self.with_state(|s| s.readings.processes = rows);
    }

    pub fn fail(&self, kind: ProbeKind) {
        self.with_state(|s| {
            s.failing.insert(kind);
        });
    }

    pub fn heal(&self, kind: ProbeKind) {
        self.with_state(|s| {
            s.failing.remove(&kind);
            s.panicking.remove(&kind);
            s.delays.remove(&kind);
        });
    }

    pub fn panic_on(&self, kind: ProbeKind) {
        self.with_state(|s| {
            s.panicking.insert(kind);
        });
    }

    /// Block the calling thread this long before answering.
    pub fn delay(&self, kind: ProbeKind, d: Duration) {
        self.with_state(|s| {
            s.delays.insert(kind, d);
        });
    }

    pub fn calls(&self, kind: ProbeKind) -> usize {
        self.with_state(|s| s.calls.get(&kind).copied().unwrap_or(0))
    }

    fn answer<T>(
        &self,
        kind: ProbeKind,
        read: impl FnOnce(&FakeReadings) -> T,
    ) -> Result<T, ProbeError> {
        let (delay, fails, panics, value) = self.with_state(|s| {
            *s.calls.entry(kind).or_insert(0) += 1;
            (
                s.delays.get(&kind).copied(),
                s.failing.contains(&kind),
                s.panicking.contains(&kind),
                read(&s.readings),
            )
        });
        if let Some(d) = delay {
            std::thread::sleep(d);
        }
        if panics {
            panic!("injected panic in {kind} probe");
        }
        if fails {
            return Err(ProbeError::unavailable(format!("injected {kind} fault")));
        }
        Ok(value)
    }
}

impl MetricsSource for FakeSource {
    fn cpu_ticks(&self) -> Result<CpuTicks, ProbeError> {
        self.answer(ProbeKind::Cpu, |r| r.cpu)
    }

    fn memory(&self) -> Result<MemoryReading, ProbeError> {
        self.answer(ProbeKind::Memory, |r| r.memory)?
            .ok_or_else(|| ProbeError::unavailable("no memory reading scripted"))
    }

    fn network_interfaces(&self) -> Result<Vec<InterfaceCounters>, ProbeError> {
        self.answer(ProbeKind::Network, |r| r.interfaces.clone())
    }

    fn gpu_usage(&self) -> Result<f64, ProbeError> {
        self.answer(ProbeKind::Gpu, |r| r.gpu)
    }

    fn battery(&self) -> Result<Option<BatteryReading>, ProbeError> {
        self.answer(ProbeKind::Battery, |r| r.battery)
    }

    fn load_average(&self) -> Result<LoadAverage, ProbeError> {
        self.answer(ProbeKind::Load, |r| r.load)
    }

    fn boot_time(&self) -> Result<u64, ProbeError> {
        self.answer(ProbeKind::Uptime, |r| r.boot_time)
    }

    fn processes(&self) -> Result<Vec<ProcessRow>, ProbeError> {
        self.answer(ProbeKind::Processes, |r| r.processes.clone())
    }
}

/// Convenience row builder for tests.
pub fn row(pid: u32, command: &str, cpu_percent: f64, rss_bytes: u64) -> ProcessRow {
    let name = command
        .split_whitespace()
        .next()
        .unwrap_or(command)
        .rsplit('/')
        .next()
        .unwrap_or(command)
        .to_string();
    ProcessRow {
        pid,
        name,
        command: command.to_string(),
        cpu_percent,
        memory_percent: 0.0,
        rss_bytes,
    }
}
