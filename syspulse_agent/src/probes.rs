//! Per-family derivations over raw source readings: interface filtering,
//! top-N process selection, session discovery and battery normalization.

use std::collections::HashSet;

use crate::source::{BatteryReading, InterfaceCounters, ProcessRow};
use crate::types::{BatteryStatus, ProcessInfo, SessionInfo};

// Loopback, container, VM, VPN and Apple peer-to-peer adapters.
const VIRTUAL_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vboxnet", "utun", "awdl", "llw", "bridge",
    "tun", "tap", "gif", "stf", "anpi", "ap", "p2p", "zt", "tailscale", "wg", "cni", "flannel",
];

pub fn is_physical_interface(name: &str) -> bool {
    !name.is_empty() && !VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Sum cumulative (rx, tx) across physical interfaces.
pub fn physical_totals(ifaces: &[InterfaceCounters]) -> (u64, u64) {
    ifaces
        .iter()
        .filter(|i| is_physical_interface(&i.name))
        .fold((0u64, 0u64), |(rx, tx), i| {
            (rx.saturating_add(i.rx_bytes), tx.saturating_add(i.tx_bytes))
        })
}

fn short_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

/// Highest-cpu processes first, at most `n`.
pub fn top_processes(rows: &[ProcessRow], n: usize) -> Vec<ProcessInfo> {
    let mut sorted: Vec<&ProcessRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    sorted
        .into_iter()
        .take(n)
        .map(|r| ProcessInfo {
            pid: r.pid,
            name: short_name(&r.name),
            cpu_percent: r.cpu_percent,
            memory_percent: r.memory_percent,
        })
        .collect()
}

/// Which command lines count as an interactive assistant session.
///
/// Every test is a plain substring match on the full command line, so
/// `--project-dir` counts as project mode and any command mentioning a
/// wrapper (including `node_modules` paths) is excluded from the package match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRule {
    /// Bare executable name, e.g. `claude`.
    pub binary: String,
    /// Install path fragment of the packaged CLI.
    pub package_path: String,
    /// Fragments that mark project mode, e.g. `" -p "`.
    pub project_markers: Vec<String>,
    /// Fragments that disqualify a package-path match.
    pub wrappers: Vec<String>,
}

impl Default for SessionRule {
    fn default() -> Self {
        Self {
            binary: "claude".into(),
            package_path: "/@anthropic/claude".into(),
            project_markers: vec![" -p ".into(), " --project".into()],
            wrappers: vec!["node".into()],
        }
    }
}

impl SessionRule {
    pub fn matches(&self, command: &str) -> bool {
        let path_ref = format!("/{}", self.binary);
        let bare_start = format!("{} ", self.binary);

        let names_tool = command.contains(&path_ref) || command.starts_with(&bare_start);
        let project_mode = self.project_markers.iter().any(|m| command.contains(m.as_str()));
        if names_tool && project_mode {
            return true;
        }

        let packaged = command.contains(&self.package_path)
            && !self.wrappers.iter().any(|w| command.contains(w.as_str()));
        command.ends_with(&path_ref) || packaged
    }
}

/// Sessions matching `rule`, one per pid, in table order.
pub fn find_sessions(rows: &[ProcessRow], rule: &SessionRule) -> Vec<SessionInfo> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|r| rule.matches(&r.command))
        .filter(|r| seen.insert(r.pid))
        .map(|r| SessionInfo {
            pid: r.pid,
            cpu_percent: r.cpu_percent,
            memory_mb: r.rss_bytes as f64 / (1024.0 * 1024.0),
        })
        .collect()
}

pub fn battery_status(reading: Option<BatteryReading>) -> Option<BatteryStatus> {
    reading.map(|b| BatteryStatus {
        percent: if b.percent.is_nan() {
            0
        } else {
            b.percent.round().clamp(0.0, 100.0) as u8
        },
        charging: b.charging,
    })
}
