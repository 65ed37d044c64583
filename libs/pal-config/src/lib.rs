// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Configuration files for hosted runs of the test suites.
//!
//! ```toml
//! name = "cc-test"
//! log-level = "debug"
//!
//! [memory]
//! dma-size = 1048576
//!
//! [network]
//! recv-timeout-ms = 500
//! ```
//!
//! Every key is optional. Unknown keys are rejected so typos do not go
//! unnoticed.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::{fmt, fs};

use anyhow::{Context, ensure};
use serde::Deserialize;

fn default_name() -> String {
    "pal".to_owned()
}
fn default_dma_size() -> usize {
    1024 * 1024
}
fn default_stack_size() -> usize {
    64 * 1024
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// The name of the configuration, used in log output only
    pub name: String,
    /// The verbosity of logging output
    pub log_level: LogLevel,
    pub memory: MemoryConfig,
    pub threads: ThreadConfig,
    pub network: NetworkConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MemoryConfig {
    /// Size of the DMA region in bytes
    pub dma_size: usize,
    /// Size of the secure DMA region in bytes, `0` disables it
    pub secure_dma_size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ThreadConfig {
    /// Stack size of threads that do not request one
    pub default_stack_size: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetworkConfig {
    /// Receive timeout applied to every socket, `0` blocks forever
    pub recv_timeout_ms: u64,
}

/// The available verbosity levels of logging output
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    /// Log nothing at all.
    Off,
    /// Log only very serious errors.
    Error,
    /// Log only on hazardous situations.
    Warn,
    /// Log general information. This is the default.
    #[default]
    Info,
    /// Log lower priority, debug information.
    Debug,
    /// Log everything, often extremely verbose, very low priority information.
    Trace,
}

// === impl Config ===

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        let config = text
            .parse::<Self>()
            .with_context(|| format!("invalid configuration {}", path.display()))?;
        log::debug!("loaded configuration {:?} from {}", config.name, path.display());

        Ok(config)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.into()
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.name.is_empty(), "name must not be empty");
        ensure!(self.memory.dma_size > 0, "memory.dma-size must not be zero");
        ensure!(
            self.threads.default_stack_size > 0,
            "threads.default-stack-size must not be zero"
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: LogLevel::default(),
            memory: MemoryConfig::default(),
            threads: ThreadConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s).context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dma_size: default_dma_size(),
            secure_dma_size: 0,
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            default_stack_size: default_stack_size(),
        }
    }
}

impl NetworkConfig {
    /// The socket receive timeout, `None` meaning "block forever".
    pub fn recv_timeout(&self) -> Option<Duration> {
        (self.recv_timeout_ms > 0).then(|| Duration::from_millis(self.recv_timeout_ms))
    }
}

// === impl LogLevel ===

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.name, "pal");
        assert_eq!(config.memory.dma_size, 1024 * 1024);
        assert_eq!(config.threads.default_stack_size, 64 * 1024);
        assert_eq!(config.network.recv_timeout(), None);
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn full_file() {
        let config: Config = r#"
            name = "cc-test"
            log-level = "trace"

            [memory]
            dma-size = 4096
            secure-dma-size = 2048

            [threads]
            default-stack-size = 131072

            [network]
            recv-timeout-ms = 250
        "#
        .parse()
        .unwrap();

        assert_eq!(config.name, "cc-test");
        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(config.memory.dma_size, 4096);
        assert_eq!(config.memory.secure_dma_size, 2048);
        assert_eq!(config.threads.default_stack_size, 128 * 1024);
        assert_eq!(
            config.network.recv_timeout(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn logging_can_be_turned_off() {
        let config: Config = "log-level = \"off\"".parse().unwrap();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Off);
        assert_eq!(config.log_level.to_string(), "off");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!("stack-size = 1".parse::<Config>().is_err());
        assert!("[memory]\ndma-bytes = 1".parse::<Config>().is_err());
        assert!("log-level = \"loud\"".parse::<Config>().is_err());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let err = "[threads]\ndefault-stack-size = 0"
            .parse::<Config>()
            .unwrap_err();
        assert!(err.to_string().contains("default-stack-size"));

        assert!("[memory]\ndma-size = 0".parse::<Config>().is_err());
    }

    #[test]
    fn load_reports_the_path() {
        let dir = std::env::temp_dir().join(format!("pal-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.toml");
        fs::write(&good, "name = \"from-disk\"\n").unwrap();
        assert_eq!(Config::load(&good).unwrap().name, "from-disk");

        let missing = dir.join("missing.toml");
        let err = Config::load(&missing).unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));

        fs::remove_dir_all(&dir).unwrap();
    }
}
