//! memwatch core: self-restart rules for long-running workers.
//!
//! A worker that processes work in cycles registers a [`rule::RestartRule`]
//! with its host loop. After every cycle the rule checks cycle count, elapsed
//! time and memory growth, and once a threshold is reached it runs its
//! pre-exit callbacks and exits the process so a supervisor can restart it.

pub mod config;
pub mod env;
pub mod error;
pub mod hooks;
pub mod rule;

pub use config::Config;
pub use error::WatchdogError;
pub use hooks::{CycleHooks, CycleRunner, implant_watcher};
pub use rule::{RestartBehavior, RestartRule, Thresholds, Trigger};
