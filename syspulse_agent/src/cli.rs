//! Command-line flags for the agent binary.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::AgentConfig;

pub const USAGE: &str = "Usage: syspulse_agent [--interval MS|-i MS] [--top N|-n N] [--history N] \
[--assistant-dir PATH] [--no-gpu] [--once] [--count N|-c N]";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub interval_ms: Option<u64>,
    pub top: Option<usize>,
    pub history: Option<usize>,
    pub assistant_dir: Option<PathBuf>,
    pub no_gpu: bool,
    pub once: bool,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(CliArgs),
    Help,
}

fn number<T: std::str::FromStr>(flag: &str, v: Option<String>) -> Result<T, String> {
    let v = v.ok_or_else(|| format!("{flag} needs a value\n{USAGE}"))?;
    v.parse::<T>()
        .map_err(|_| format!("invalid value for {flag}: {v}\n{USAGE}"))
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Command, String> {
    let mut it = args.into_iter();
    let _prog = it.next();
    let mut out = CliArgs::default();

    while let Some(arg) = it.next() {
        // accept --flag=value as well as --flag value
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = || inline.clone().or_else(|| it.next());
        match flag.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--interval" | "-i" => {
                let ms: u64 = number(&flag, value())?;
                if ms == 0 {
                    return Err(format!("--interval must be greater than 0\n{USAGE}"));
                }
                out.interval_ms = Some(ms);
            }
            "--top" | "-n" => out.top = Some(number(&flag, value())?),
            "--history" => out.history = Some(number(&flag, value())?),
            "--count" | "-c" => {
                let n: u64 = number(&flag, value())?;
                if n == 0 {
                    return Err(format!("--count must be greater than 0\n{USAGE}"));
                }
                out.count = Some(n);
            }
            "--assistant-dir" => {
                let dir = value().ok_or_else(|| format!("--assistant-dir needs a value\n{USAGE}"))?;
                out.assistant_dir = Some(PathBuf::from(dir));
            }
            "--no-gpu" => out.no_gpu = true,
            "--once" => out.once = true,
            _ => return Err(format!("Unexpected argument: {arg}\n{USAGE}")),
        }
    }
    Ok(Command::Run(out))
}

impl CliArgs {
    /// Flags win over environment and defaults.
    pub fn apply(&self, cfg: &mut AgentConfig) {
        if let Some(ms) = self.interval_ms {
            cfg.interval = Duration::from_millis(ms);
        }
        if let Some(n) = self.top {
            cfg.top_n = n;
        }
        if let Some(n) = self.history {
            cfg.history_capacity = n.max(1);
        }
        if let Some(dir) = &self.assistant_dir {
            cfg.assistant_dir = Some(dir.clone());
        }
        if self.no_gpu {
            cfg.gpu = false;
        }
    }
}
