//! Scenario descriptions loaded from TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;

pub const DEFAULT_NODE_RETRIES: u32 = 10;
pub const DEFAULT_JOB_RETRIES: u32 = 20;

/// One end-to-end run against a fresh cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    #[serde(default)]
    pub cluster: Option<ClusterSpec>,
    /// Submitted in order; later workloads may depend on earlier side effects.
    #[serde(default)]
    pub workloads: Vec<WorkloadSpec>,
    #[serde(default)]
    pub acl: Option<AclSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Coordinator first, then workers. One agent process per entry.
    pub configs: Vec<PathBuf>,
    #[serde(default = "default_node_retries")]
    pub node_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    /// Job name passed to `job status`.
    pub job: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub descriptor: Option<String>,
    #[serde(default)]
    pub descriptor_file: Option<PathBuf>,
    #[serde(default = "default_job_retries")]
    pub retries: u32,
    #[serde(default)]
    pub must_contain: Vec<String>,
    #[serde(default)]
    pub must_not_contain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclSpec {
    pub server_config: PathBuf,
}

fn default_node_retries() -> u32 {
    DEFAULT_NODE_RETRIES
}

fn default_job_retries() -> u32 {
    DEFAULT_JOB_RETRIES
}

impl WorkloadSpec {
    /// Descriptor text, read from `descriptor_file` when no inline text is set.
    pub fn descriptor_text(&self) -> Result<String, ConfigError> {
        if let Some(text) = &self.descriptor {
            return Ok(text.clone());
        }
        match &self.descriptor_file {
            Some(path) => fs::read_to_string(path).map_err(|source| ConfigError::Descriptor {
                path: path.clone(),
                source,
            }),
            None => Err(ConfigError::MissingDescriptor {
                workload: self.name.clone(),
            }),
        }
    }
}

impl ScenarioSpec {
    /// Anchor every relative path at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(cluster) = &mut self.cluster {
            for config in &mut cluster.configs {
                *config = anchor(base, config);
            }
        }
        for workload in &mut self.workloads {
            if let Some(file) = &workload.descriptor_file {
                workload.descriptor_file = Some(anchor(base, file));
            }
        }
        if let Some(acl) = &mut self.acl {
            acl.server_config = anchor(base, &acl.server_config);
        }
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn parse_scenario(contents: &str) -> Result<ScenarioSpec, toml::de::Error> {
    toml::from_str(contents)
}

/// Load a scenario file; relative paths inside it resolve against its directory.
pub fn load_scenario(path: impl AsRef<Path>) -> Result<ScenarioSpec, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    let mut spec = parse_scenario(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })?;
    let base = path_ref
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    spec.resolve_paths(&base);
    Ok(spec)
}
