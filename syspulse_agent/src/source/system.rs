//! Host-backed `MetricsSource` using sysinfo, plus Linux procfs/sysfs readers
//! for CPU ticks and the battery, and gfxinfo for GPU load.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[cfg(target_os = "linux")]
use std::fs;

use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, Networks, ProcessRefreshKind, ProcessesToUpdate,
    RefreshKind, System, UpdateKind,
};

use super::{BatteryReading, InterfaceCounters, MemoryReading, MetricsSource, ProcessRow};
use crate::counters::CpuTicks;
use crate::error::ProbeError;
use crate::types::LoadAverage;

/// Remembers whether the first GPU detection found a device, so a host
/// without one is not re-probed every cycle.
#[derive(Debug, Default)]
pub struct GpuPresence {
    checked: AtomicBool,
    present: AtomicBool,
}

impl GpuPresence {
    pub fn sample(
        &self,
        detect: impl FnOnce() -> Result<f64, ProbeError>,
    ) -> Result<f64, ProbeError> {
        if self.checked.load(Ordering::Acquire) && !self.present.load(Ordering::Relaxed) {
            return Err(ProbeError::Unsupported("no gpu detected"));
        }
        let res = detect();
        // first probe records presence; later calls rely on the flags
        if !self.checked.swap(true, Ordering::AcqRel) {
            self.present.store(res.is_ok(), Ordering::Release);
        }
        res
    }
}

pub struct SysinfoSource {
    // Separate handles so a slow process-table refresh never holds the lock
    // the memory probe needs.
    memory_sys: Mutex<System>,
    process_sys: Mutex<System>,
    networks: Mutex<Networks>,
    #[cfg(not(target_os = "linux"))]
    cpu_sys: Mutex<System>,
    #[cfg(not(target_os = "linux"))]
    synthetic_ticks: Mutex<CpuTicks>,
    #[cfg(target_os = "linux")]
    proc_stat: PathBuf,
    #[cfg(target_os = "linux")]
    power_supply: PathBuf,
    gpu_enabled: bool,
    gpu: GpuPresence,
}

impl SysinfoSource {
    pub fn new(gpu_enabled: bool) -> Self {
        let memory_sys = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
        );
        // cpu list is needed to rescale per-process usage
        let process_sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        let networks = Networks::new_with_refreshed_list();

        Self {
            memory_sys: Mutex::new(memory_sys),
            process_sys: Mutex::new(process_sys),
            networks: Mutex::new(networks),
            #[cfg(not(target_os = "linux"))]
            cpu_sys: Mutex::new(System::new_with_specifics(
                RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
            )),
            #[cfg(not(target_os = "linux"))]
            synthetic_ticks: Mutex::new(CpuTicks::default()),
            #[cfg(target_os = "linux")]
            proc_stat: PathBuf::from("/proc/stat"),
            #[cfg(target_os = "linux")]
            power_supply: PathBuf::from("/sys/class/power_supply"),
            gpu_enabled,
            gpu: GpuPresence::default(),
        }
    }
}

impl MetricsSource for SysinfoSource {
    #[cfg(target_os = "linux")]
    fn cpu_ticks(&self) -> Result<CpuTicks, ProbeError> {
        read_cpu_ticks(&self.proc_stat)
    }

    // No tick counters exposed here; accumulate sysinfo's global usage into
    // synthetic ticks (1000 per refresh) so the same delta math applies.
    #[cfg(not(target_os = "linux"))]
    fn cpu_ticks(&self) -> Result<CpuTicks, ProbeError> {
        let usage = {
            let mut sys = self.cpu_sys.lock()?;
            sys.refresh_cpu_usage();
            sys.global_cpu_usage() as f64
        };
        let busy = (crate::rates::clamp_percent(usage) * 10.0).round() as u64;
        let mut acc = self.synthetic_ticks.lock()?;
        acc.user = acc.user.saturating_add(busy);
        acc.idle = acc.idle.saturating_add(1000 - busy);
        Ok(*acc)
    }

    fn memory(&self) -> Result<MemoryReading, ProbeError> {
        let mut sys = self.memory_sys.lock()?;
        sys.refresh_memory();
        let total_bytes = sys.total_memory();
        Ok(MemoryReading {
            used_bytes: total_bytes.saturating_sub(sys.available_memory()),
            total_bytes,
        })
    }

    fn network_interfaces(&self) -> Result<Vec<InterfaceCounters>, ProbeError> {
        let mut nets = self.networks.lock()?;
        nets.refresh(true);
        Ok(nets
            .iter()
            .map(|(name, data)| InterfaceCounters {
                name: name.to_string(),
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
            })
            .collect())
    }

    fn gpu_usage(&self) -> Result<f64, ProbeError> {
        if !self.gpu_enabled {
            return Err(ProbeError::Unsupported("gpu sampling disabled"));
        }
        self.gpu.sample(|| {
            let gpu = gfxinfo::active_gpu().map_err(|e| ProbeError::unavailable(e.to_string()))?;
            Ok(gpu.info().load_pct() as f64)
        })
    }

    #[cfg(target_os = "linux")]
    fn battery(&self) -> Result<Option<BatteryReading>, ProbeError> {
        read_battery(&self.power_supply)
    }

    #[cfg(not(target_os = "linux"))]
    fn battery(&self) -> Result<Option<BatteryReading>, ProbeError> {
        let manager = battery::Manager::new().map_err(|e| ProbeError::unavailable(e.to_string()))?;
        let mut batteries = manager
            .batteries()
            .map_err(|e| ProbeError::unavailable(e.to_string()))?;
        let Some(first) = batteries.next() else {
            return Ok(None);
        };
        let bat = first.map_err(|e| ProbeError::unavailable(e.to_string()))?;
        Ok(Some(BatteryReading {
            percent: f64::from(bat.state_of_charge().get::<battery::units::ratio::percent>()),
            charging: matches!(bat.state(), battery::State::Charging),
        }))
    }

    fn load_average(&self) -> Result<LoadAverage, ProbeError> {
        let l = System::load_average();
        Ok(LoadAverage {
            one: l.one,
            five: l.five,
            fifteen: l.fifteen,
        })
    }

    fn boot_time(&self) -> Result<u64, ProbeError> {
        match System::boot_time() {
            0 => Err(ProbeError::unavailable("boot time not reported")),
            t => Ok(t),
        }
    }

    fn processes(&self) -> Result<Vec<ProcessRow>, ProbeError> {
        let mut sys = self.process_sys.lock()?;
        sys.refresh_memory();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_exe(UpdateKind::OnlyIfNotSet),
        );

        let total_mem = sys.total_memory();
        // per-process cpu_usage is per core; rescale to a 0..100 machine-wide figure
        let n_cpus = sys.cpus().len().max(1) as f64;

        Ok(sys
            .processes()
            .values()
            .map(|p| {
                let name = p.name().to_string_lossy().into_owned();
                let command = if p.cmd().is_empty() {
                    p.exe()
                        .map(|e| e.to_string_lossy().into_owned())
                        .unwrap_or_else(|| name.clone())
                } else {
                    p.cmd()
                        .iter()
                        .map(|a| a.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                ProcessRow {
                    pid: p.pid().as_u32(),
                    name,
                    command,
                    cpu_percent: (p.cpu_usage() as f64 / n_cpus).clamp(0.0, 100.0),
                    memory_percent: crate::rates::percent_of(p.memory(), total_mem),
                    rss_bytes: p.memory(),
                }
            })
            .collect())
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`:
/// "cpu  user nice system idle iowait irq softirq steal ...".
/// iowait counts as idle.
pub fn parse_proc_stat(s: &str) -> Result<CpuTicks, ProbeError> {
    let line = s
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| ProbeError::parse("no aggregate cpu line"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|tok| tok.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|e| ProbeError::parse(format!("cpu line: {e}")))?;
    if fields.len() < 4 {
        return Err(ProbeError::parse("cpu line has fewer than 4 fields"));
    }
    let iowait = fields.get(4).copied().unwrap_or(0);
    Ok(CpuTicks {
        user: fields[0],
        nice: fields[1],
        system: fields[2],
        idle: fields[3].saturating_add(iowait),
    })
}

#[cfg(target_os = "linux")]
fn read_cpu_ticks(path: &Path) -> Result<CpuTicks, ProbeError> {
    let s = fs::read_to_string(path)?;
    parse_proc_stat(&s)
}

/// Read the first `BAT*` entry under a power_supply directory.
/// A missing directory or no battery entry is "no battery", not an error.
pub fn read_battery(root: &Path) -> Result<Option<BatteryReading>, ProbeError> {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut batteries: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("BAT"))
        })
        .collect();
    batteries.sort();
    let Some(bat) = batteries.first() else {
        return Ok(None);
    };

    let capacity = std::fs::read_to_string(bat.join("capacity"))?;
    let percent = capacity
        .trim()
        .parse::<f64>()
        .map_err(|e| ProbeError::parse(format!("battery capacity: {e}")))?;
    // status is optional on some firmware
    let charging = std::fs::read_to_string(bat.join("status"))
        .map(|s| s.trim().eq_ignore_ascii_case("charging"))
        .unwrap_or(false);

    Ok(Some(BatteryReading { percent, charging }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn gpu_absence_is_remembered() {
        let gpu = GpuPresence::default();
        let mut detections = 0;
        assert!(matches!(
            gpu.sample(|| {
                detections += 1;
                Err(ProbeError::unavailable("no device"))
            }),
            Err(ProbeError::Unavailable(_))
        ));
        for _ in 0..3 {
            let r = gpu.sample(|| {
                detections += 1;
                Ok(50.0)
            });
            assert!(matches!(r, Err(ProbeError::Unsupported(_))));
        }
        assert_eq!(detections, 1);
    }

    #[test]
    fn present_gpu_is_sampled_every_time() {
        let gpu = GpuPresence::default();
        assert_eq!(gpu.sample(|| Ok(10.0)).unwrap(), 10.0);
        assert!(gpu.sample(|| Err(ProbeError::unavailable("busy"))).is_err());
        assert_eq!(gpu.sample(|| Ok(30.0)).unwrap(), 30.0);
    }

    #[test]
    fn memory_read_does_not_wait_on_process_table() {
        let src = SysinfoSource::new(false);
        // hold the process-table handle as a slow refresh would
        let _refreshing = src.process_sys.lock().unwrap();
        let mem = src.memory().unwrap();
        assert!(mem.total_bytes > 0);
        assert!(mem.used_bytes <= mem.total_bytes);
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn battery_manager_reading_is_in_range() {
        let src = SysinfoSource::new(false);
        if let Ok(Some(b)) = src.battery() {
            assert!((0.0..=100.0).contains(&b.percent));
        }
    }

    #[test]
    fn parses_aggregate_cpu_line() {
        let stat = "cpu  100 7 50 900 20 0 3 0 0 0\ncpu0 50 3 25 450 10 0 1 0 0 0\nintr 1 2 3\n";
        let t = parse_proc_stat(stat).unwrap();
        assert_eq!(
            t,
            CpuTicks {
                user: 100,
                nice: 7,
                system: 50,
                idle: 920,
            }
        );
    }

    #[test]
    fn rejects_garbage_stat() {
        assert!(parse_proc_stat("intr 1 2 3\n").is_err());
        assert!(parse_proc_stat("cpu  1 2\n").is_err());
        assert!(parse_proc_stat("cpu  a b c d\n").is_err());
    }

    #[test]
    fn battery_absent_when_no_bat_entry() {
        let td = tempfile::tempdir().unwrap();
        fs::create_dir_all(td.path().join("AC")).unwrap();
        assert_eq!(read_battery(td.path()).unwrap(), None);
        assert_eq!(read_battery(&td.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn battery_reads_capacity_and_status() {
        let td = tempfile::tempdir().unwrap();
        let bat = td.path().join("BAT0");
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("capacity"), "42\n").unwrap();
        fs::write(bat.join("status"), "Charging\n").unwrap();
        let r = read_battery(td.path()).unwrap().unwrap();
        assert_eq!(r.percent, 42.0);
        assert!(r.charging);

        fs::write(bat.join("status"), "Discharging\n").unwrap();
        assert!(!read_battery(td.path()).unwrap().unwrap().charging);
    }

    #[test]
    fn battery_with_bad_capacity_is_an_error() {
        let td = tempfile::tempdir().unwrap();
        let bat = td.path().join("BAT1");
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("capacity"), "n/a").unwrap();
        assert!(read_battery(td.path()).is_err());
    }
}
