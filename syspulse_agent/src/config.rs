//! Agent configuration: defaults, then `SYSPULSE_*` environment overrides,
//! then command-line flags (see `cli`).

use std::path::PathBuf;
use std::time::Duration;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::probes::SessionRule;
use crate::usage::USAGE_LOG_FILE;

pub const DEFAULT_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_TOP_N: usize = 8;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1_500;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub interval: Duration,
    pub top_n: usize,
    pub history_capacity: usize,
    /// Upper bound on a single probe; a slower probe falls back.
    pub probe_timeout: Duration,
    /// How long shutdown waits for an in-flight cycle.
    pub shutdown_grace: Duration,
    pub gpu: bool,
    /// Assistant data directory holding the usage log (`~/.claude`).
    pub assistant_dir: Option<PathBuf>,
    /// Where global MCP config files live (the home directory).
    pub home_dir: Option<PathBuf>,
    pub session_rule: SessionRule,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let home_dir = dirs_next::home_dir();
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            top_n: DEFAULT_TOP_N,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
            gpu: true,
            assistant_dir: home_dir.as_ref().map(|h| h.join(".claude")),
            home_dir,
            session_rule: SessionRule::default(),
        }
    }
}

fn parse_ms(v: Option<String>) -> Option<Duration> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Apply overrides from `lookup` (an environment stand-in) onto defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(d) = parse_ms(lookup("SYSPULSE_INTERVAL_MS")) {
            cfg.interval = d;
        }
        if let Some(n) = lookup("SYSPULSE_TOP_N").and_then(|v| v.trim().parse().ok()) {
            cfg.top_n = n;
        }
        if let Some(n) = lookup("SYSPULSE_HISTORY").and_then(|v| v.trim().parse::<usize>().ok()) {
            cfg.history_capacity = n.max(1);
        }
        if let Some(d) = parse_ms(lookup("SYSPULSE_PROBE_TIMEOUT_MS")) {
            cfg.probe_timeout = d;
        }
        if let Some(d) = parse_ms(lookup("SYSPULSE_SHUTDOWN_GRACE_MS")) {
            cfg.shutdown_grace = d;
        }
        if let Some(v) = lookup("SYSPULSE_AGENT_GPU") {
            cfg.gpu = v != "0";
        }
        if let Some(dir) = lookup("SYSPULSE_ASSISTANT_DIR").filter(|v| !v.is_empty()) {
            cfg.assistant_dir = Some(PathBuf::from(dir));
        }
        cfg
    }

    pub fn usage_log_path(&self) -> Option<PathBuf> {
        self.assistant_dir.as_ref().map(|d| d.join(USAGE_LOG_FILE))
    }

    pub fn mcp_config_files(&self) -> Vec<PathBuf> {
        self.home_dir
            .as_deref()
            .map(crate::mcp::global_config_files)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = AgentConfig::from_lookup(|_| None);
        assert_eq!(cfg.interval, Duration::from_secs(2));
        assert_eq!(cfg.top_n, 8);
        assert_eq!(cfg.history_capacity, 30);
        assert!(cfg.gpu);
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = AgentConfig::from_lookup(lookup_from(&[
            ("SYSPULSE_INTERVAL_MS", "500"),
            ("SYSPULSE_TOP_N", "3"),
            ("SYSPULSE_HISTORY", "0"),
            ("SYSPULSE_AGENT_GPU", "0"),
            ("SYSPULSE_ASSISTANT_DIR", "/tmp/assistant"),
        ]));
        assert_eq!(cfg.interval, Duration::from_millis(500));
        assert_eq!(cfg.top_n, 3);
        assert_eq!(cfg.history_capacity, 1);
        assert!(!cfg.gpu);
        assert_eq!(
            cfg.usage_log_path(),
            Some(PathBuf::from("/tmp/assistant/stats-cache.json"))
        );
    }

    #[test]
    fn bad_values_are_ignored() {
        let cfg = AgentConfig::from_lookup(lookup_from(&[
            ("SYSPULSE_INTERVAL_MS", "soon"),
            ("SYSPULSE_PROBE_TIMEOUT_MS", "0"),
            ("SYSPULSE_TOP_N", "-1"),
        ]));
        assert_eq!(cfg.interval, Duration::from_millis(DEFAULT_INTERVAL_MS));
        assert_eq!(cfg.probe_timeout, Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS));
        assert_eq!(cfg.top_n, DEFAULT_TOP_N);
    }
}
