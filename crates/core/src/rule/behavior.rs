//! Termination behavior and the process-exit primitive

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WatchdogError;

/// Exit status class used when a restart rule fires.
///
/// Raising an error or panicking is deliberately not an option here: hosts
/// wrap hooks in their own failure handling and would swallow it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestartBehavior {
    /// Exit with status 0 ("success restart signal")
    #[default]
    #[serde(rename = "exit_0")]
    Exit0,
    /// Exit with status 1 ("failure restart signal")
    #[serde(rename = "exit_1")]
    Exit1,
}

impl RestartBehavior {
    /// Process status code for this behavior
    pub fn exit_code(self) -> i32 {
        match self {
            RestartBehavior::Exit0 => 0,
            RestartBehavior::Exit1 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RestartBehavior::Exit0 => "exit_0",
            RestartBehavior::Exit1 => "exit_1",
        }
    }
}

impl fmt::Display for RestartBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestartBehavior {
    type Err = WatchdogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit_0" | "exit0" | "0" => Ok(RestartBehavior::Exit0),
            "exit_1" | "exit1" | "1" => Ok(RestartBehavior::Exit1),
            other => Err(WatchdogError::InvalidBehavior(format!(
                "'{}' (expected exit_0 or exit_1)",
                other
            ))),
        }
    }
}

/// Ends the process once a rule fires. Implementations never return.
pub trait Terminate: Send + Sync {
    fn terminate(&self, code: i32) -> !;
}

/// Real process termination via [`std::process::exit`].
///
/// Does not unwind, so neither `catch_unwind` nor an error handler in the
/// host loop can intercept it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl Terminate for ProcessExit {
    fn terminate(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RestartBehavior::Exit0.exit_code(), 0);
        assert_eq!(RestartBehavior::Exit1.exit_code(), 1);
    }

    #[test]
    fn test_default_is_exit_0() {
        assert_eq!(RestartBehavior::default(), RestartBehavior::Exit0);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("exit_0".parse::<RestartBehavior>().unwrap(), RestartBehavior::Exit0);
        assert_eq!("EXIT_1".parse::<RestartBehavior>().unwrap(), RestartBehavior::Exit1);
        assert_eq!("1".parse::<RestartBehavior>().unwrap(), RestartBehavior::Exit1);

        let err = "raise".parse::<RestartBehavior>().unwrap_err();
        assert!(matches!(err, WatchdogError::InvalidBehavior(_)));
    }

    #[test]
    fn test_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            behavior: RestartBehavior,
        }

        let w: Wrapper = toml::from_str(r#"behavior = "exit_1""#).unwrap();
        assert_eq!(w.behavior, RestartBehavior::Exit1);

        let json = serde_json::to_string(&RestartBehavior::Exit0).unwrap();
        assert_eq!(json, "\"exit_0\"");
    }
}
