//! Harness-wide configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BINARY: &str = "nomad";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to read workload descriptor at {path}: {source}")]
    Descriptor {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("workload {workload} has no descriptor")]
    MissingDescriptor { workload: String },
}

/// Settings shared by every scenario run by one harness invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Orchestrator executable, resolved through `PATH` when relative.
    pub binary: PathBuf,
    /// Delay before every poll attempt.
    pub poll_interval_ms: u64,
    /// Working directory for every orchestrator invocation.
    pub work_dir: Option<PathBuf>,
    /// When set, agent stdout/stderr land in `<dir>/<config-stem>.log`.
    pub agent_log_dir: Option<PathBuf>,
    pub warmup: WarmupConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            work_dir: None,
            agent_log_dir: None,
            warmup: WarmupConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupMode {
    /// Poll `probe_args` until the server answers or `ceiling_secs` elapses.
    Probe,
    /// Sleep `fixed_secs` unconditionally.
    Fixed,
}

/// How the bootstrap flow waits for a freshly started server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub mode: WarmupMode,
    pub fixed_secs: u64,
    pub probe_args: Vec<String>,
    pub probe_interval_ms: u64,
    pub ceiling_secs: u64,
    /// Text in the probe's output meaning nothing is listening yet.
    pub unreachable_marker: String,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            mode: WarmupMode::Probe,
            fixed_secs: 10,
            probe_args: vec!["agent-info".to_string()],
            probe_interval_ms: 1_000,
            ceiling_secs: 30,
            unreachable_marker: "connection refused".to_string(),
        }
    }
}

impl WarmupConfig {
    pub fn fixed_delay(&self) -> Duration {
        Duration::from_secs(self.fixed_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_secs(self.ceiling_secs)
    }
}

pub fn parse_harness_config(contents: &str) -> Result<HarnessConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_harness_config(path: impl AsRef<Path>) -> Result<HarnessConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_harness_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}
