//! Demo worker loop driven by a restart rule

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use memwatch_core::config::parse_duration;
use memwatch_core::{Config, CycleRunner, RestartBehavior, RestartRule, Trigger, implant_watcher};

const BYTES_PER_MEGABYTE: usize = 1024 * 1024;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Restart after this many cycles
    #[arg(long, value_name = "N")]
    pub proceed_tasks: Option<u64>,

    /// Restart after this much wall time, e.g. 30s, 15m, 6h
    #[arg(long, value_name = "DURATION")]
    pub elapsed_time: Option<String>,

    /// Restart once memory grew by this many megabytes
    #[arg(long, value_name = "MB")]
    pub extra_megabytes: Option<u64>,

    /// Restart once memory grew by this percentage (100 = doubled)
    #[arg(long, value_name = "PERCENT")]
    pub extra_percent: Option<u64>,

    /// Exit status when restarting: exit_0 or exit_1
    #[arg(long, value_name = "BEHAVIOR")]
    pub restart_behavior: Option<RestartBehavior>,

    /// Megabytes each cycle keeps allocated, to simulate a leak
    #[arg(long, value_name = "MB")]
    pub leak_megabytes: Option<u64>,

    /// Pause between cycles
    #[arg(long, value_name = "DURATION")]
    pub cycle_delay: Option<String>,

    /// Write the restart trigger as JSON to this file before exiting
    #[arg(long, value_name = "PATH")]
    pub restart_record: Option<PathBuf>,

    /// Make every Nth cycle fail
    #[arg(long, value_name = "N")]
    pub fail_every: Option<u64>,

    /// Stop normally after this many cycles if no restart happened
    #[arg(long, value_name = "N")]
    pub max_cycles: Option<u64>,
}

impl RunArgs {
    /// Flags take precedence over the config file
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(n) = self.proceed_tasks {
            config.restart.proceed_tasks = Some(n);
        }
        if let Some(ref t) = self.elapsed_time {
            parse_duration(t).context("Invalid --elapsed-time")?;
            config.restart.elapsed_time = Some(t.clone());
        }
        if let Some(mb) = self.extra_megabytes {
            config.restart.extra_consumed_megabytes = Some(mb);
        }
        if let Some(pct) = self.extra_percent {
            config.restart.extra_consumed_memory_percent = Some(pct);
        }
        if let Some(behavior) = self.restart_behavior {
            config.restart.restart_behavior = behavior;
        }
        if let Some(mb) = self.leak_megabytes {
            config.worker.leak_megabytes_per_cycle = mb;
        }
        if let Some(ref d) = self.cycle_delay {
            parse_duration(d).context("Invalid --cycle-delay")?;
            config.worker.cycle_delay = d.clone();
        }
        if let Some(ref path) = self.restart_record {
            config.worker.restart_record = Some(path.display().to_string());
        }
        Ok(())
    }
}

/// What the worker leaves behind when a restart rule fires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartRecord {
    /// Timestamp in milliseconds
    pub ts: u64,
    pub pid: u32,
    pub restart_behavior: RestartBehavior,
    pub exit_code: i32,
    pub reason: String,
    pub trigger: Trigger,
}

/// Build the restart rule with the worker's pre-exit callbacks attached
pub fn build_rule(config: &Config) -> Result<RestartRule> {
    let mut rule = RestartRule::from_config(&config.restart)?;

    if let Some(path) = config.worker.restart_record_path() {
        let behavior = config.restart.restart_behavior;
        rule = rule.call_before_exit_with(move |trigger| {
            if let Err(e) = write_restart_record(&path, behavior, trigger) {
                warn!("Failed to write restart record: {:#}", e);
            }
        });
    }

    // process::exit skips destructors, so buffered output would be lost
    Ok(rule.call_before_exit(|| {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }))
}

fn write_restart_record(path: &Path, behavior: RestartBehavior, trigger: &Trigger) -> Result<()> {
    let record = RestartRecord {
        ts: now_ms(),
        pid: std::process::id(),
        restart_behavior: behavior,
        exit_code: behavior.exit_code(),
        reason: trigger.to_string(),
        trigger: trigger.clone(),
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    serde_json::to_writer_pretty(fs::File::create(path)?, &record)?;
    debug!("Wrote restart record to {}", path.display());
    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Synthetic work: optionally retains memory and fails on a schedule
struct SyntheticWorker {
    leak_bytes: usize,
    fail_every: Option<u64>,
    retained: Vec<Vec<u8>>,
}

impl SyntheticWorker {
    fn process(&mut self, cycle: u64) -> Result<()> {
        if self.leak_bytes > 0 {
            // Non-zero fill so every page is actually resident
            self.retained.push(vec![0xA5; self.leak_bytes]);
        }

        if let Some(n) = self.fail_every
            && n > 0
            && cycle % n == 0
        {
            anyhow::bail!("synthetic failure in cycle {}", cycle);
        }

        Ok(())
    }

    fn retained_megabytes(&self) -> usize {
        self.retained.iter().map(Vec::len).sum::<usize>() / BYTES_PER_MEGABYTE
    }
}

pub fn run(args: RunArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config)?;

    let delay = config.worker.cycle_delay()?;
    let rule = Arc::new(build_rule(&config)?);
    info!(
        "Worker starting (thresholds: {:?}, behavior: {})",
        rule.thresholds(),
        rule.restart_behavior()
    );

    let mut runner = CycleRunner::new();
    implant_watcher(&mut runner, rule.clone());

    let mut worker = SyntheticWorker {
        leak_bytes: usize::try_from(config.worker.leak_megabytes_per_cycle)?
            .checked_mul(BYTES_PER_MEGABYTE)
            .context("leak_megabytes_per_cycle is too large")?,
        fail_every: args.fail_every,
        retained: Vec::new(),
    };

    loop {
        let cycle = runner.cycles() + 1;
        if let Some(max) = args.max_cycles
            && cycle > max
        {
            break;
        }

        // Failures are logged by the runner; the worker keeps going
        let _ = runner.run_cycle(|| worker.process(cycle));
        debug!(
            "Cycle {} done (retained: {} MB)",
            cycle,
            worker.retained_megabytes()
        );

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    println!(
        "Completed {} cycles without restart",
        rule.cycles_completed()
    );
    Ok(())
}
