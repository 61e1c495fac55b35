//! Engine cycles against a scripted source.
use std::sync::Arc;
use std::time::Duration;

use syspulse_agent::source::fake::{row, FakeSource};
use syspulse_agent::source::{BatteryReading, ProbeKind};
use syspulse_agent::{AgentConfig, CycleOutcome, Engine, Snapshot};

fn cfg() -> AgentConfig {
    AgentConfig {
        probe_timeout: Duration::from_millis(200),
        assistant_dir: None,
        home_dir: None,
        ..AgentConfig::default()
    }
}

fn healthy() -> Arc<FakeSource> {
    let src = Arc::new(FakeSource::new());
    src.set_cpu_ticks(100, 50, 850, 0);
    src.set_memory(4 << 30, 16 << 30);
    src.set_interface("eth0", 10_000, 5_000);
    src.set_load(0.5, 0.4, 0.3);
    src.set_boot_time(1);
    src.set_processes(vec![
        row(10, "/usr/bin/cargo build", 55.0, 1 << 20),
        row(11, "/usr/local/bin/claude --project web", 7.5, 200 << 20),
        row(12, "node /opt/tools/lib/node_modules/@anthropic/claude/cli.js", 3.0, 100 << 20),
    ]);
    src
}

async fn cycle(engine: &Engine) -> Arc<Snapshot> {
    match engine.run_cycle().await {
        CycleOutcome::Published(s) => s,
        CycleOutcome::Skipped => panic!("cycle unexpectedly skipped"),
    }
}

#[tokio::test]
async fn second_cycle_reports_rates() {
    let src = healthy();
    let engine = Engine::new(src.clone(), &cfg());

    let first = cycle(&engine).await;
    assert_eq!(first.seq, 1);
    assert_eq!(first.cpu_usage_percent, 0.0);
    assert_eq!(first.network_in_bytes_per_sec, 0.0);
    assert_eq!(first.memory_usage_percent, 25.0);

    src.set_cpu_ticks(175, 75, 900, 0);
    src.set_interface("eth0", 20_000, 5_000);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = cycle(&engine).await;

    assert_eq!(second.seq, 2);
    assert!((second.cpu_usage_percent - 200.0 / 3.0).abs() < 1e-9);
    assert!(second.network_in_bytes_per_sec > 0.0);
    assert_eq!(second.network_out_bytes_per_sec, 0.0);
    assert!(second.uptime_secs > 0);
    assert_eq!(second.load_average.one, 0.5);
    assert_eq!(second.top_processes[0].name, "cargo");
    // the node-wrapped package process is not a session of its own
    assert_eq!(second.assistant.sessions.len(), 1);
    assert_eq!(second.assistant.sessions[0].pid, 11);
    assert_eq!(second.assistant.total_memory_mb, 200.0);
    assert_eq!(engine.history().cpu.len(), 2);
}

#[tokio::test]
async fn virtual_interfaces_do_not_count() {
    let src = healthy();
    src.set_interface("lo", 0, 0);
    src.set_interface("docker0", 0, 0);
    let engine = Engine::new(src.clone(), &cfg());
    cycle(&engine).await;

    src.set_interface("lo", 50_000_000, 50_000_000);
    src.set_interface("docker0", 9_000_000, 0);
    let s = cycle(&engine).await;
    assert_eq!(s.network_in_bytes_per_sec, 0.0);
    assert_eq!(s.network_out_bytes_per_sec, 0.0);
}

#[tokio::test]
async fn failing_probe_only_affects_its_own_fields() {
    let src = healthy();
    src.fail(ProbeKind::Memory);
    src.fail(ProbeKind::Uptime);
    let engine = Engine::new(src.clone(), &cfg());

    let s = cycle(&engine).await;
    assert_eq!(s.memory_used_bytes, 0);
    assert_eq!(s.memory_usage_percent, 0.0);
    assert_eq!(s.uptime_secs, 0);
    assert_eq!(s.load_average.five, 0.4);
    assert_eq!(s.top_processes.len(), 3);

    src.heal(ProbeKind::Memory);
    let s = cycle(&engine).await;
    assert_eq!(s.memory_usage_percent, 25.0);
}

#[tokio::test]
async fn panicking_and_slow_probes_fall_back() {
    let src = healthy();
    src.set_gpu(40.0);
    src.panic_on(ProbeKind::Gpu);
    src.delay(ProbeKind::Processes, Duration::from_millis(600));
    let engine = Engine::new(src.clone(), &cfg());

    let started = std::time::Instant::now();
    let s = cycle(&engine).await;
    assert!(started.elapsed() < Duration::from_millis(550));
    assert_eq!(s.gpu_usage_percent, 0.0);
    assert!(s.top_processes.is_empty());
    assert!(s.assistant.sessions.is_empty());
    assert_eq!(s.memory_usage_percent, 25.0);

    src.heal(ProbeKind::Gpu);
    src.heal(ProbeKind::Processes);
    // let the timed-out process read finish before the family is retried
    tokio::time::sleep(Duration::from_millis(600)).await;
    let s = cycle(&engine).await;
    assert_eq!(s.gpu_usage_percent, 40.0);
    assert_eq!(s.top_processes.len(), 3);
}

#[tokio::test]
async fn slow_process_table_does_not_hold_up_memory() {
    let src = healthy();
    src.delay(ProbeKind::Processes, Duration::from_millis(1_500));
    let engine = Engine::new(src.clone(), &cfg());

    for _ in 0..3 {
        let started = std::time::Instant::now();
        let s = cycle(&engine).await;
        assert!(started.elapsed() < Duration::from_millis(800));
        assert_eq!(s.memory_usage_percent, 25.0);
        assert_eq!(s.load_average.one, 0.5);
        assert!(s.top_processes.is_empty());
    }
    // the stuck read is not re-issued while it is still running
    assert_eq!(src.calls(ProbeKind::Processes), 1);
    assert_eq!(src.calls(ProbeKind::Memory), 3);
}

#[tokio::test]
async fn network_recovery_does_not_spike() {
    let src = healthy();
    let engine = Engine::new(src.clone(), &cfg());
    cycle(&engine).await;

    src.fail(ProbeKind::Network);
    src.set_interface("eth0", 10_000_000, 5_000);
    let s = cycle(&engine).await;
    assert_eq!(s.network_in_bytes_per_sec, 0.0);

    src.heal(ProbeKind::Network);
    src.set_interface("eth0", 5_000, 5_000);
    let s = cycle(&engine).await;
    // counter went backwards relative to the carried baseline
    assert_eq!(s.network_in_bytes_per_sec, 0.0);
}

#[tokio::test]
async fn battery_is_optional_and_clamped() {
    let src = healthy();
    let engine = Engine::new(src.clone(), &cfg());
    assert_eq!(cycle(&engine).await.battery, None);

    src.set_battery(Some(BatteryReading {
        percent: 104.6,
        charging: true,
    }));
    let b = cycle(&engine).await.battery.expect("battery present");
    assert_eq!(b.percent, 100);
    assert!(b.charging);

    src.fail(ProbeKind::Battery);
    assert_eq!(cycle(&engine).await.battery, None);
}

#[tokio::test]
async fn snapshot_serializes_to_json() {
    let engine = Engine::new(healthy(), &cfg());
    let s = cycle(&engine).await;
    let v: serde_json::Value = serde_json::to_value(&*s).unwrap();
    assert_eq!(v["seq"], 1);
    assert!(v["cpu_usage_percent"].is_number());
    assert!(v["assistant"]["sessions"].is_array());
}
