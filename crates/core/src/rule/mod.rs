//! Restart rules for long-running workers
//!
//! A [`RestartRule`] watches a worker between cycles and terminates the
//! process once any configured threshold is reached, so that an external
//! supervisor can start a fresh one:
//! - proceed_tasks: number of completed cycles
//! - elapsed_time: wall time since the first cycle started
//! - extra_consumed_megabytes: resident memory growth over the baseline
//! - extra_consumed_memory_percent: relative growth (100 = twice the baseline)
//!
//! Thresholds are evaluated in that order after every cycle. The first one
//! that fires runs the pre-exit callbacks and ends the process.

mod behavior;
mod memory;
mod trigger;

pub use behavior::{ProcessExit, RestartBehavior, Terminate};
pub use memory::{MemoryProbe, ProcessMemory};
pub use trigger::Trigger;

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::RestartConfig;
use crate::error::{Result, WatchdogError};

/// Callback run right before the process exits. Receives the trigger.
pub type ExitCallback = Box<dyn Fn(&Trigger) + Send + Sync>;

/// Threshold values of a rule. Unset thresholds are never evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub proceed_tasks: Option<u64>,
    pub elapsed_time: Option<Duration>,
    pub extra_consumed_memory_percent: Option<u64>,
    pub extra_consumed_megabytes: Option<u64>,
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        self.proceed_tasks.is_none()
            && self.elapsed_time.is_none()
            && self.extra_consumed_memory_percent.is_none()
            && self.extra_consumed_megabytes.is_none()
    }

    /// Whether any memory threshold is set
    pub fn watches_memory(&self) -> bool {
        self.extra_consumed_memory_percent.is_some() || self.extra_consumed_megabytes.is_some()
    }
}

/// Measurements captured when the first cycle starts
#[derive(Debug, Clone, Copy)]
struct Baseline {
    started: Instant,
    /// None when the probe failed; memory thresholds stay inert then
    memory_mb: Option<u64>,
}

pub struct RestartRule {
    thresholds: Thresholds,
    call_before_exit: Vec<ExitCallback>,
    restart_behavior: RestartBehavior,
    probe: Box<dyn MemoryProbe>,
    terminator: Box<dyn Terminate>,
    tasks_counter: AtomicU64,
    baseline: OnceLock<Baseline>,
}

impl RestartRule {
    /// Create a rule. At least one threshold must be set.
    pub fn new(thresholds: Thresholds, restart_behavior: RestartBehavior) -> Result<Self> {
        if thresholds.is_empty() {
            return Err(WatchdogError::Configuration(
                "at least one of proceed_tasks, elapsed_time, extra_consumed_memory_percent \
                 or extra_consumed_megabytes must be set"
                    .to_string(),
            ));
        }

        Ok(Self {
            thresholds,
            call_before_exit: Vec::new(),
            restart_behavior,
            probe: Box::new(ProcessMemory),
            terminator: Box::new(ProcessExit),
            tasks_counter: AtomicU64::new(0),
            baseline: OnceLock::new(),
        })
    }

    /// Create a rule from the `[restart]` config section
    pub fn from_config(config: &RestartConfig) -> Result<Self> {
        Self::new(config.thresholds()?, config.restart_behavior)
    }

    /// Append a callback to run before exit. Callbacks run in the order added.
    pub fn call_before_exit<F>(self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.call_before_exit_with(move |_| callback())
    }

    /// Like [`call_before_exit`](Self::call_before_exit), but the callback
    /// sees which threshold fired.
    pub fn call_before_exit_with<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Trigger) + Send + Sync + 'static,
    {
        self.call_before_exit.push(Box::new(callback));
        self
    }

    pub fn with_memory_probe<P: MemoryProbe + 'static>(mut self, probe: P) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_terminator<T: Terminate + 'static>(mut self, terminator: T) -> Self {
        self.terminator = Box::new(terminator);
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn restart_behavior(&self) -> RestartBehavior {
        self.restart_behavior
    }

    pub fn callback_count(&self) -> usize {
        self.call_before_exit.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.baseline.get().is_some()
    }

    /// Number of after-cycle calls seen so far
    pub fn cycles_completed(&self) -> u64 {
        self.tasks_counter.load(Ordering::Relaxed)
    }

    /// Memory reading captured by the first before-cycle call
    pub fn baseline_memory_mb(&self) -> Option<u64> {
        self.baseline.get().and_then(|b| b.memory_mb)
    }

    /// Time since the first before-cycle call
    pub fn elapsed(&self) -> Option<Duration> {
        self.baseline.get().map(|b| b.started.elapsed())
    }

    /// Before-cycle hook. Captures the baseline on the first call only.
    pub fn before_cycle(&self) {
        self.baseline();
    }

    /// After-cycle hook. Counts the cycle, then fires if a threshold is reached.
    pub fn after_cycle(&self) {
        // Hosts that skip the pre-hook still get a baseline
        self.baseline();

        let processed = self.tasks_counter.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Restart rule: {} cycle(s) completed", processed);

        if let Some(trigger) = self.evaluate() {
            self.fire(trigger);
        }
    }

    /// Check thresholds against the current state without counting a cycle
    /// or firing. Returns `None` until the baseline has been captured.
    ///
    /// Order is fixed: proceed_tasks, elapsed_time, extra_consumed_megabytes,
    /// extra_consumed_memory_percent. Memory is read at most once.
    pub fn evaluate(&self) -> Option<Trigger> {
        let baseline = *self.baseline.get()?;
        let processed = self.cycles_completed();

        if let Some(limit) = self.thresholds.proceed_tasks
            && processed >= limit
        {
            return Some(Trigger::ProceedTasks { processed, limit });
        }

        if let Some(limit) = self.thresholds.elapsed_time {
            let elapsed = baseline.started.elapsed();
            if elapsed >= limit {
                return Some(Trigger::ElapsedTime {
                    elapsed_secs: elapsed.as_secs_f64(),
                    limit_secs: limit.as_secs_f64(),
                });
            }
        }

        if !self.thresholds.watches_memory() {
            return None;
        }

        let Some(baseline_mb) = baseline.memory_mb else {
            debug!("Restart rule: no baseline memory, skipping memory thresholds");
            return None;
        };

        let current_mb = match self.probe.resident_megabytes() {
            Ok(mb) => mb,
            Err(e) => {
                warn!("Restart rule: failed to read process memory: {}", e);
                return None;
            }
        };

        if let Some(limit_mb) = self.thresholds.extra_consumed_megabytes
            && i128::from(current_mb) - i128::from(baseline_mb) >= i128::from(limit_mb)
        {
            return Some(Trigger::ExtraConsumedMegabytes {
                current_mb,
                baseline_mb,
                limit_mb,
            });
        }

        if let Some(limit_percent) = self.thresholds.extra_consumed_memory_percent {
            if baseline_mb == 0 {
                debug!("Restart rule: baseline memory is 0 MB, skipping percent threshold");
            } else if current_mb as f64 / baseline_mb as f64 - 1.0 >= limit_percent as f64 / 100.0
            {
                return Some(Trigger::ExtraConsumedMemoryPercent {
                    current_mb,
                    baseline_mb,
                    limit_percent,
                });
            }
        }

        None
    }

    /// Run every pre-exit callback in order, then terminate the process.
    ///
    /// A panicking callback unwinds out of here and the process is not
    /// terminated.
    pub fn fire(&self, trigger: Trigger) -> ! {
        warn!("Restart policy triggered, reason: {}", trigger);

        for callback in &self.call_before_exit {
            callback(&trigger);
        }

        let code = self.restart_behavior.exit_code();
        info!(
            "Restart rule: exiting with status {} ({})",
            code, self.restart_behavior
        );
        self.terminator.terminate(code)
    }

    fn baseline(&self) -> &Baseline {
        self.baseline.get_or_init(|| {
            let memory_mb = match self.probe.resident_megabytes() {
                Ok(mb) => Some(mb),
                Err(e) => {
                    if self.thresholds.watches_memory() {
                        warn!(
                            "Restart rule: failed to read baseline memory, memory thresholds disabled: {}",
                            e
                        );
                    } else {
                        debug!("Restart rule: failed to read baseline memory: {}", e);
                    }
                    None
                }
            };

            info!(
                "Restart rule: baseline captured (memory: {:?} MB, behavior: {})",
                memory_mb, self.restart_behavior
            );

            Baseline {
                started: Instant::now(),
                memory_mb,
            }
        })
    }
}

impl fmt::Debug for RestartRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestartRule")
            .field("thresholds", &self.thresholds)
            .field("restart_behavior", &self.restart_behavior)
            .field("callbacks", &self.call_before_exit.len())
            .field("cycles_completed", &self.cycles_completed())
            .field("baseline_memory_mb", &self.baseline_memory_mb())
            .finish()
    }
}
