//! Library surface of the agent: the sampling engine, its probes and the
//! snapshot types it publishes. The binary in `main.rs` is a thin driver.

pub mod cli;
pub mod config;
pub mod counters;
pub mod error;
pub mod history;
pub mod mcp;
pub mod probes;
pub mod rates;
pub mod sampler;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod types;
pub mod usage;

pub use config::AgentConfig;
pub use scheduler::{spawn_scheduler, SchedulerHandle};
pub use state::{CycleOutcome, Engine, SnapshotSubscriber};
pub use types::Snapshot;
