//! Cycle hook integration
//!
//! Hosts that run work in cycles expose two registration points:
//! - pre-hook: called before each cycle's work
//! - post-hook: called after each cycle, whether the work failed or not
//!
//! [`implant_watcher`] wires a [`RestartRule`] into any host implementing
//! [`CycleHooks`]. [`CycleRunner`] is a minimal host for workers that have no
//! loop of their own.
//!
//! ```no_run
//! use std::sync::Arc;
//! use memwatch_core::hooks::{CycleRunner, implant_watcher};
//! use memwatch_core::rule::{RestartBehavior, RestartRule, Thresholds};
//!
//! let rule = RestartRule::new(
//!     Thresholds { proceed_tasks: Some(1000), ..Default::default() },
//!     RestartBehavior::Exit0,
//! )?;
//! let mut runner = CycleRunner::new();
//! implant_watcher(&mut runner, Arc::new(rule));
//! loop {
//!     runner.run_cycle(|| Ok(()))?;
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

mod runner;

pub use runner::CycleRunner;

use std::sync::Arc;

use crate::rule::RestartRule;

/// Hook called before a cycle's work
pub type PreHook = Box<dyn Fn() + Send + Sync>;

/// Hook called after a cycle with the work's error, if any
pub type PostHook = Box<dyn Fn(Option<&anyhow::Error>) + Send + Sync>;

/// Name the rule's pre-hook is registered under
pub const PRE_HOOK_NAME: &str = "Memory watcher pre-hook";

/// Name the rule's post-hook is registered under
pub const POST_HOOK_NAME: &str = "Memory watcher post-hook";

/// Registration points a cycle-driven host exposes
pub trait CycleHooks {
    fn add_pre_hook(&mut self, hook: PreHook, name: &str);
    fn add_post_hook(&mut self, hook: PostHook, name: &str);
}

/// Register `rule` as a pre-hook and a post-hook of `host`.
///
/// Returns the same host so calls can be chained.
pub fn implant_watcher<H: CycleHooks + ?Sized>(host: &mut H, rule: Arc<RestartRule>) -> &mut H {
    let pre = rule.clone();
    host.add_pre_hook(Box::new(move || pre.before_cycle()), PRE_HOOK_NAME);
    host.add_post_hook(Box::new(move |_| rule.after_cycle()), POST_HOOK_NAME);
    host
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RestartBehavior, Thresholds};
    use std::io;

    /// Host that only records what was registered
    #[derive(Default)]
    struct RecordingHost {
        pre: Vec<(String, PreHook)>,
        post: Vec<(String, PostHook)>,
    }

    impl CycleHooks for RecordingHost {
        fn add_pre_hook(&mut self, hook: PreHook, name: &str) {
            self.pre.push((name.to_string(), hook));
        }

        fn add_post_hook(&mut self, hook: PostHook, name: &str) {
            self.post.push((name.to_string(), hook));
        }
    }

    fn rule() -> Arc<RestartRule> {
        Arc::new(
            RestartRule::new(
                Thresholds {
                    proceed_tasks: Some(100),
                    ..Default::default()
                },
                RestartBehavior::Exit0,
            )
            .unwrap()
            .with_memory_probe(|| -> io::Result<u64> { Ok(32) }),
        )
    }

    #[test]
    fn test_registers_both_hooks_with_names() {
        let mut host = RecordingHost::default();
        implant_watcher(&mut host, rule());

        assert_eq!(host.pre.len(), 1);
        assert_eq!(host.post.len(), 1);
        assert_eq!(host.pre[0].0, PRE_HOOK_NAME);
        assert_eq!(host.post[0].0, POST_HOOK_NAME);
    }

    #[test]
    fn test_returns_same_host() {
        let mut host = RecordingHost::default();
        let host_ptr: *const RecordingHost = &host;

        let returned = implant_watcher(&mut host, rule());
        assert!(std::ptr::eq(returned, host_ptr));
    }

    #[test]
    fn test_hooks_drive_the_rule() {
        let rule = rule();
        let mut host = RecordingHost::default();
        implant_watcher(&mut host, rule.clone());

        for _ in 0..3 {
            (host.pre[0].1)();
            (host.post[0].1)(None);
        }
        let err = anyhow::anyhow!("cycle failed");
        (host.pre[0].1)();
        (host.post[0].1)(Some(&err));

        assert_eq!(rule.cycles_completed(), 4);
        assert_eq!(rule.baseline_memory_mb(), Some(32));
    }
}
