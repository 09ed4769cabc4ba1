//! Pre-flight validation for harness and scenario configuration.

use serde::Serialize;

use crate::config::{HarnessConfig, WarmupMode};
use crate::scenario::{ScenarioSpec, WorkloadSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.level == ValidationLevel::Error)
}

fn error(code: &'static str, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        level: ValidationLevel::Error,
        code,
        message: message.into(),
    }
}

fn warning(code: &'static str, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        level: ValidationLevel::Warning,
        code,
        message: message.into(),
    }
}

impl Validate for HarnessConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.binary.as_os_str().is_empty() {
            issues.push(error(
                "harness.binary.empty",
                "binary must name the orchestrator executable",
            ));
        }

        if self.poll_interval_ms == 0 {
            issues.push(warning(
                "harness.poll_interval.zero",
                "poll_interval_ms is 0; polls will hammer the orchestrator",
            ));
        }

        if self.warmup.mode == WarmupMode::Probe {
            if self.warmup.probe_args.is_empty() {
                issues.push(error(
                    "warmup.probe_args.empty",
                    "warmup.probe_args must not be empty in probe mode",
                ));
            }
            if self.warmup.ceiling_secs == 0 {
                issues.push(error(
                    "warmup.ceiling.zero",
                    "warmup.ceiling_secs must be greater than zero in probe mode",
                ));
            }
        }

        issues
    }
}

impl Validate for ScenarioSpec {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(error("scenario.name.empty", "scenario name must not be empty"));
        }

        if self.cluster.is_none() && self.acl.is_none() {
            issues.push(error(
                "scenario.empty",
                "scenario needs a [cluster] or an [acl] section",
            ));
        }

        match &self.cluster {
            Some(cluster) => {
                if cluster.configs.is_empty() {
                    issues.push(error(
                        "cluster.configs.empty",
                        "cluster.configs must list at least one agent config",
                    ));
                }
                if cluster.node_retries == 0 {
                    issues.push(error(
                        "cluster.node_retries.zero",
                        "cluster.node_retries must be at least 1",
                    ));
                }
                for config in &cluster.configs {
                    if !config.exists() {
                        issues.push(warning(
                            "cluster.config.missing",
                            format!("agent config {} does not exist", config.display()),
                        ));
                    }
                }
            }
            None if !self.workloads.is_empty() => {
                issues.push(error(
                    "workloads.no_cluster",
                    "workloads need a [cluster] to run on",
                ));
            }
            None => {}
        }

        for workload in &self.workloads {
            issues.extend(workload.validate());
        }

        if let Some(acl) = &self.acl {
            if acl.server_config.as_os_str().is_empty() {
                issues.push(error(
                    "acl.server_config.empty",
                    "acl.server_config must name an agent config",
                ));
            } else if !acl.server_config.exists() {
                issues.push(warning(
                    "acl.server_config.missing",
                    format!(
                        "acl server config {} does not exist",
                        acl.server_config.display()
                    ),
                ));
            }
        }

        issues
    }
}

impl Validate for WorkloadSpec {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(error("workload.name.empty", "workload name must not be empty"));
        }

        if self.job.trim().is_empty() {
            issues.push(error(
                "workload.job.empty",
                format!("workload {} must name the job to poll", self.name),
            ));
        }

        match (&self.descriptor, &self.descriptor_file) {
            (None, None) => issues.push(error(
                "workload.descriptor.missing",
                format!("workload {} needs descriptor or descriptor_file", self.name),
            )),
            (Some(_), Some(_)) => issues.push(warning(
                "workload.descriptor.ambiguous",
                format!(
                    "workload {} sets both descriptor and descriptor_file; inline text wins",
                    self.name
                ),
            )),
            (None, Some(file)) if !file.exists() => issues.push(warning(
                "workload.descriptor_file.missing",
                format!(
                    "workload {} descriptor_file {} does not exist",
                    self.name,
                    file.display()
                ),
            )),
            _ => {}
        }

        if self.retries == 0 {
            issues.push(error(
                "workload.retries.zero",
                format!("workload {} retries must be at least 1", self.name),
            ));
        }

        issues
    }
}
