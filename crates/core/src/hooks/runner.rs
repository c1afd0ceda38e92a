//! Minimal cycle host

use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::Result;
use tracing::{debug, warn};

use super::{CycleHooks, PostHook, PreHook};

/// Runs cycles of work between registered pre- and post-hooks.
///
/// A hook that panics is logged and skipped; it never stops the other hooks
/// or the worker. Hooks that need to end the process must exit it directly.
#[derive(Default)]
pub struct CycleRunner {
    pre_hooks: Vec<(String, PreHook)>,
    post_hooks: Vec<(String, PostHook)>,
    cycles: u64,
}

impl CycleRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of registered hooks
    pub fn hook_count(&self) -> usize {
        self.pre_hooks.len() + self.post_hooks.len()
    }

    pub fn pre_hook_names(&self) -> Vec<&str> {
        self.pre_hooks.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn post_hook_names(&self) -> Vec<&str> {
        self.post_hooks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one cycle: pre-hooks, `work`, then post-hooks.
    ///
    /// Post-hooks run even when `work` fails; its error is passed to them
    /// and then returned.
    pub fn run_cycle<F>(&mut self, work: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        self.cycles += 1;
        debug!("Cycle {} starting", self.cycles);

        for (name, hook) in &self.pre_hooks {
            if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
                warn!("Pre-hook ({}) failed", name);
            }
        }

        let result = work();
        if let Err(ref e) = result {
            warn!("Cycle {} failed: {:#}", self.cycles, e);
        }

        for (name, hook) in &self.post_hooks {
            if catch_unwind(AssertUnwindSafe(|| hook(result.as_ref().err()))).is_err() {
                warn!("Post-hook ({}) failed", name);
            }
        }

        result
    }
}

impl CycleHooks for CycleRunner {
    fn add_pre_hook(&mut self, hook: PreHook, name: &str) {
        debug!("Registered pre-hook '{}'", name);
        self.pre_hooks.push((name.to_string(), hook));
    }

    fn add_post_hook(&mut self, hook: PostHook, name: &str) {
        debug!("Registered post-hook '{}'", name);
        self.post_hooks.push((name.to_string(), hook));
    }
}
