use thiserror::Error;

/// Errors raised while building a restart rule or parsing its settings.
///
/// A threshold breach is not an error: it terminates the process directly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    /// No threshold is set, so the rule could never fire.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid restart behavior: {0}")]
    InvalidBehavior(String),
}

pub type Result<T> = std::result::Result<T, WatchdogError>;
