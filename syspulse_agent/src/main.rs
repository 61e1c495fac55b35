//! syspulse agent: samples the host on a fixed interval and writes one JSON
//! snapshot per line to stdout. Logs go to stderr.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use syspulse_agent::cli::{parse_args, CliArgs, Command, USAGE};
use syspulse_agent::source::SysinfoSource;
use syspulse_agent::{spawn_scheduler, AgentConfig, CycleOutcome, Engine, Snapshot};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn emit(snapshot: &Snapshot) {
    match serde_json::to_string(snapshot) {
        Ok(line) => {
            let mut out = std::io::stdout().lock();
            if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
                warn!("stdout write failed: {e}");
            }
        }
        Err(e) => warn!("snapshot serialization failed: {e}"),
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args(std::env::args()).map_err(|e| anyhow!(e))? {
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Command::Run(a) => a,
    };
    init_logging();

    let mut cfg = AgentConfig::from_env();
    args.apply(&mut cfg);
    info!(
        interval_ms = cfg.interval.as_millis() as u64,
        top_n = cfg.top_n,
        gpu = cfg.gpu,
        "starting agent"
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let result = rt.block_on(serve(&cfg, &args));
    // A probe call stuck past its timeout still owns a blocking thread; do not
    // let it hold up exit.
    rt.shutdown_timeout(cfg.shutdown_grace);
    result
}

async fn serve(cfg: &AgentConfig, args: &CliArgs) -> anyhow::Result<()> {
    let source = Arc::new(SysinfoSource::new(cfg.gpu));
    let engine = Arc::new(Engine::new(source, cfg));

    if args.once {
        return run_once(&engine, cfg).await;
    }
    run(engine, cfg, args).await
}

/// Prime the counters, wait one interval, print the second snapshot.
async fn run_once(engine: &Engine, cfg: &AgentConfig) -> anyhow::Result<()> {
    engine.run_cycle().await;
    tokio::time::sleep(cfg.interval).await;
    match engine.run_cycle().await {
        CycleOutcome::Published(s) => {
            emit(&s);
            Ok(())
        }
        CycleOutcome::Skipped => Err(anyhow!("sampling cycle did not run")),
    }
}

async fn run(engine: Arc<Engine>, cfg: &AgentConfig, args: &CliArgs) -> anyhow::Result<()> {
    let limit = args.count;
    let emitted = Arc::new(AtomicU64::new(0));
    let done = Arc::new(Notify::new());
    {
        let emitted = Arc::clone(&emitted);
        let done = Arc::clone(&done);
        engine.add_subscriber(Arc::new(move |s: &Arc<Snapshot>| {
            let n = emitted.fetch_add(1, Ordering::Relaxed) + 1;
            match limit {
                Some(max) if n > max => {}
                Some(max) => {
                    emit(s);
                    if n == max {
                        done.notify_one();
                    }
                }
                None => emit(s),
            }
        }));
    }
    let handle = spawn_scheduler(Arc::clone(&engine), cfg.interval, cfg.shutdown_grace);

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r.context("installing ctrl-c handler")?;
            info!("interrupt received");
        }
        _ = done.notified(), if limit.is_some() => info!("snapshot count reached"),
    }

    handle.shutdown().await;
    let stats = engine.stats();
    info!(
        published = stats.published,
        skipped = stats.skipped,
        discarded = stats.discarded,
        "agent stopped"
    );
    Ok(())
}
