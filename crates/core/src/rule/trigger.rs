//! Restart trigger records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which threshold fired, together with the values it was measured at.
///
/// Variants are listed in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "data", rename_all = "snake_case")]
pub enum Trigger {
    /// Cycle count reached `proceed_tasks`
    ProceedTasks { processed: u64, limit: u64 },
    /// Wall time since the first cycle reached `elapsed_time`
    ElapsedTime { elapsed_secs: f64, limit_secs: f64 },
    /// Memory grew by at least `extra_consumed_megabytes`
    ExtraConsumedMegabytes {
        current_mb: u64,
        baseline_mb: u64,
        limit_mb: u64,
    },
    /// Memory grew by at least `extra_consumed_memory_percent`
    ExtraConsumedMemoryPercent {
        current_mb: u64,
        baseline_mb: u64,
        limit_percent: u64,
    },
}

impl Trigger {
    /// Threshold name as used in configuration
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::ProceedTasks { .. } => "proceed_tasks",
            Trigger::ElapsedTime { .. } => "elapsed_time",
            Trigger::ExtraConsumedMegabytes { .. } => "extra_consumed_megabytes",
            Trigger::ExtraConsumedMemoryPercent { .. } => "extra_consumed_memory_percent",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::ProceedTasks { processed, limit } => {
                write!(f, "{}: {} >= {}", self.name(), processed, limit)
            }
            Trigger::ElapsedTime {
                elapsed_secs,
                limit_secs,
            } => write!(f, "{}: {:.3}s >= {}s", self.name(), elapsed_secs, limit_secs),
            Trigger::ExtraConsumedMegabytes {
                current_mb,
                baseline_mb,
                limit_mb,
            } => write!(
                f,
                "{}: {} - {} >= {}",
                self.name(),
                current_mb,
                baseline_mb,
                limit_mb
            ),
            Trigger::ExtraConsumedMemoryPercent {
                current_mb,
                baseline_mb,
                limit_percent,
            } => write!(
                f,
                "{}: {} / {} - 1 >= {} / 100",
                self.name(),
                current_mb,
                baseline_mb,
                limit_percent
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_reasons() {
        let t = Trigger::ProceedTasks {
            processed: 5,
            limit: 5,
        };
        assert_eq!(t.to_string(), "proceed_tasks: 5 >= 5");

        let t = Trigger::ExtraConsumedMegabytes {
            current_mb: 80,
            baseline_mb: 60,
            limit_mb: 15,
        };
        assert_eq!(t.to_string(), "extra_consumed_megabytes: 80 - 60 >= 15");

        let t = Trigger::ExtraConsumedMemoryPercent {
            current_mb: 120,
            baseline_mb: 60,
            limit_percent: 100,
        };
        assert_eq!(
            t.to_string(),
            "extra_consumed_memory_percent: 120 / 60 - 1 >= 100 / 100"
        );
    }

    #[test]
    fn test_serialization_is_tagged() {
        let t = Trigger::ElapsedTime {
            elapsed_secs: 6.5,
            limit_secs: 5.0,
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["rule"], "elapsed_time");
        assert_eq!(json["data"]["limit_secs"], 5.0);

        let back: Trigger = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }
}
