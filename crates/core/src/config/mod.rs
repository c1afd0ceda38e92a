mod duration;

pub use duration::parse_duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::env::{MEMWATCH_CONFIG, MEMWATCH_LOG};
use crate::rule::{RestartBehavior, Thresholds};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File this config was loaded from (not serialized)
    #[serde(skip)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub restart: RestartConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[restart]`: thresholds and termination behavior of the restart rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Cycles to complete before restarting
    #[serde(default)]
    pub proceed_tasks: Option<u64>,

    /// Wall time before restarting, e.g. "6h". Integers are seconds.
    #[serde(default, deserialize_with = "deserialize_seconds_or_duration")]
    pub elapsed_time: Option<String>,

    /// Extra memory over the baseline in percent (100 = twice the baseline)
    #[serde(default)]
    pub extra_consumed_memory_percent: Option<u64>,

    /// Extra memory over the baseline in megabytes
    #[serde(default)]
    pub extra_consumed_megabytes: Option<u64>,

    #[serde(default)]
    pub restart_behavior: RestartBehavior,
}

impl RestartConfig {
    pub fn thresholds(&self) -> crate::error::Result<Thresholds> {
        let elapsed_time = self
            .elapsed_time
            .as_deref()
            .map(parse_duration)
            .transpose()?;

        Ok(Thresholds {
            proceed_tasks: self.proceed_tasks,
            elapsed_time,
            extra_consumed_memory_percent: self.extra_consumed_memory_percent,
            extra_consumed_megabytes: self.extra_consumed_megabytes,
        })
    }
}

/// `[worker]`: settings of the demo worker loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Pause between cycles
    #[serde(default = "default_cycle_delay")]
    pub cycle_delay: String,

    /// Memory each synthetic cycle keeps alive, to simulate a leak
    #[serde(default)]
    pub leak_megabytes_per_cycle: u64,

    /// Where to write the trigger as JSON right before exiting
    #[serde(default)]
    pub restart_record: Option<String>,
}

impl WorkerConfig {
    pub fn cycle_delay(&self) -> crate::error::Result<Duration> {
        parse_duration(&self.cycle_delay)
    }

    /// Restart record path with `~` and `$VAR` expanded
    pub fn restart_record_path(&self) -> Option<PathBuf> {
        self.restart_record.as_deref().map(expand_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_cycle_delay() -> String {
    "1s".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Accept `elapsed_time = 3600` as well as `elapsed_time = "1h"`
fn deserialize_seconds_or_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SecondsOrDuration {
        Seconds(u64),
        Duration(String),
    }

    Ok(
        Option::<SecondsOrDuration>::deserialize(deserializer)?.map(|value| match value {
            SecondsOrDuration::Seconds(secs) => secs.to_string(),
            SecondsOrDuration::Duration(text) => text,
        }),
    )
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cycle_delay: default_cycle_delay(),
            leak_megabytes_per_cycle: 0,
            restart_record: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from `path`, falling back to `MEMWATCH_CONFIG`.
    ///
    /// With neither set, defaults are used. A named file that does not
    /// exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(MEMWATCH_CONFIG).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                let mut config = Self::from_toml_str(&content)
                    .with_context(|| format!("Invalid config {}", path.display()))?;
                debug!("Loaded config from {}", path.display());
                config.path = Some(path);
                config
            }
            None => {
                debug!("No config file given, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(MEMWATCH_LOG)
            && !level.trim().is_empty()
        {
            self.logging.level = level;
        }
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["restart", "proceed_tasks"] => Ok(display_opt(&self.restart.proceed_tasks)),
            ["restart", "elapsed_time"] => Ok(display_opt(&self.restart.elapsed_time)),
            ["restart", "extra_consumed_memory_percent"] => {
                Ok(display_opt(&self.restart.extra_consumed_memory_percent))
            }
            ["restart", "extra_consumed_megabytes"] => {
                Ok(display_opt(&self.restart.extra_consumed_megabytes))
            }
            ["restart", "restart_behavior"] => Ok(self.restart.restart_behavior.to_string()),
            ["worker", "cycle_delay"] => Ok(self.worker.cycle_delay.clone()),
            ["worker", "leak_megabytes_per_cycle"] => {
                Ok(self.worker.leak_megabytes_per_cycle.to_string())
            }
            ["worker", "restart_record"] => Ok(display_opt(&self.worker.restart_record)),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    /// Set a value by dotted key. An empty value unsets optional keys.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["restart", "proceed_tasks"] => self.restart.proceed_tasks = parse_opt(value)?,
            ["restart", "elapsed_time"] => {
                if !value.is_empty() {
                    parse_duration(value)?;
                }
                self.restart.elapsed_time = opt_string(value);
            }
            ["restart", "extra_consumed_memory_percent"] => {
                self.restart.extra_consumed_memory_percent = parse_opt(value)?
            }
            ["restart", "extra_consumed_megabytes"] => {
                self.restart.extra_consumed_megabytes = parse_opt(value)?
            }
            ["restart", "restart_behavior"] => self.restart.restart_behavior = value.parse()?,
            ["worker", "cycle_delay"] => {
                parse_duration(value)?;
                self.worker.cycle_delay = value.to_string();
            }
            ["worker", "leak_megabytes_per_cycle"] => {
                self.worker.leak_megabytes_per_cycle = value.parse()?
            }
            ["worker", "restart_record"] => self.worker.restart_record = opt_string(value),
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

fn display_opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn parse_opt(value: &str) -> Result<Option<u64>> {
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value.parse()?))
    }
}

fn opt_string(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.restart.thresholds().unwrap().is_empty());
        assert_eq!(config.restart.restart_behavior, RestartBehavior::Exit0);
        assert_eq!(config.worker.cycle_delay().unwrap(), Duration::from_secs(1));
        assert_eq!(config.worker.leak_megabytes_per_cycle, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(
            r#"
            [restart]
            proceed_tasks = 1000
            elapsed_time = "6h"
            extra_consumed_memory_percent = 100
            extra_consumed_megabytes = 500
            restart_behavior = "exit_1"

            [worker]
            cycle_delay = "250ms"
            leak_megabytes_per_cycle = 2
            restart_record = "/tmp/memwatch-restart.json"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let thresholds = config.restart.thresholds().unwrap();
        assert_eq!(thresholds.proceed_tasks, Some(1000));
        assert_eq!(thresholds.elapsed_time, Some(Duration::from_secs(6 * 3600)));
        assert_eq!(thresholds.extra_consumed_memory_percent, Some(100));
        assert_eq!(thresholds.extra_consumed_megabytes, Some(500));
        assert_eq!(config.restart.restart_behavior, RestartBehavior::Exit1);
        assert_eq!(
            config.worker.cycle_delay().unwrap(),
            Duration::from_millis(250)
        );
        assert_eq!(
            config.worker.restart_record_path(),
            Some(PathBuf::from("/tmp/memwatch-restart.json"))
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_integer_elapsed_time_is_seconds() {
        let config = Config::from_toml_str("[restart]\nelapsed_time = 90\n").unwrap();
        assert_eq!(config.restart.elapsed_time.as_deref(), Some("90"));
        assert_eq!(
            config.restart.thresholds().unwrap().elapsed_time,
            Some(Duration::from_secs(90))
        );

        let back = Config::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(back.restart, config.restart);
    }

    #[test]
    fn test_invalid_elapsed_time() {
        let config = Config::from_toml_str(
            r#"
            [restart]
            elapsed_time = "soon"
            "#,
        )
        .unwrap();
        assert!(config.restart.thresholds().is_err());
    }

    #[test]
    fn test_unknown_behavior_rejected() {
        let result = Config::from_toml_str(
            r#"
            [restart]
            proceed_tasks = 1
            restart_behavior = "raise"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memwatch.toml");
        fs::write(&path, "[restart]\nproceed_tasks = 5\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.restart.proceed_tasks, Some(5));
        assert_eq!(config.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.toml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_get_set_value() {
        let mut config = Config::default();

        config.set_value("restart.proceed_tasks", "42").unwrap();
        config.set_value("restart.elapsed_time", "30m").unwrap();
        config.set_value("restart.restart_behavior", "exit_1").unwrap();
        assert_eq!(config.get_value("restart.proceed_tasks").unwrap(), "42");
        assert_eq!(config.get_value("restart.elapsed_time").unwrap(), "30m");
        assert_eq!(
            config.get_value("restart.restart_behavior").unwrap(),
            "exit_1"
        );

        config.set_value("restart.proceed_tasks", "").unwrap();
        assert_eq!(config.restart.proceed_tasks, None);
        assert_eq!(config.get_value("restart.proceed_tasks").unwrap(), "");

        assert!(config.set_value("restart.elapsed_time", "later").is_err());
        assert!(config.set_value("worker.cycle_delay", "").is_err());
        assert!(config.set_value("restart.nope", "1").is_err());
        assert!(config.get_value("nope").is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_thresholds() {
        let mut config = Config::default();
        config.restart.extra_consumed_megabytes = Some(64);
        let text = config.to_toml_string().unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.restart, config.restart);
        assert_eq!(back.worker, config.worker);
    }
}
