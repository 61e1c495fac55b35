//! Snapshot types handed to consumers.
//! Keep this module minimal and stable; it defines the JSON the agent prints.

use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    pub percent: u8,
    pub charging: bool,
}

/// A running assistant CLI session found in the process table.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SessionInfo {
    pub pid: u32,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct DailyUsage {
    pub message_count: u64,
    pub session_count: u64,
    pub tool_call_count: u64,
    pub token_count: u64,
    /// Rough estimate from a flat per-model price table and an assumed
    /// 30% input / 70% output token split. Not a billing figure.
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DayTrend {
    /// `yyyy-mm-dd`
    pub date: String,
    pub message_count: u64,
    pub token_count: u64,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct UsageStats {
    // None: the log has no entry for today
    pub today: Option<DailyUsage>,
    // ascending by date, missing days omitted
    pub weekly: Vec<DayTrend>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct McpServer {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct AssistantTelemetry {
    pub sessions: Vec<SessionInfo>,
    pub total_memory_mb: f64,
    // None: usage log missing or unreadable
    pub usage: Option<UsageStats>,
    pub mcp_servers: Vec<McpServer>,
    pub data_dir_present: bool,
}

/// One fully built cycle. Shared as `Arc<Snapshot>` and never mutated.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Snapshot {
    pub seq: u64,
    pub timestamp_ms: i64,
    pub cpu_usage_percent: f64,
    pub gpu_usage_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub memory_usage_percent: f64,
    pub network_in_bytes_per_sec: f64,
    pub network_out_bytes_per_sec: f64,
    pub load_average: LoadAverage,
    // None: no battery present
    pub battery: Option<BatteryStatus>,
    pub uptime_secs: u64,
    pub top_processes: Vec<ProcessInfo>,
    pub assistant: AssistantTelemetry,
}
