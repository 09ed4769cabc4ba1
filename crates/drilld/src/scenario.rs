//! End-to-end scenario driver.
//!
//! A scenario runs in phases. The cluster phase launches every agent,
//! waits for nodes, then stages, submits and polls each workload in order.
//! The ACL phase bootstraps a separate server. Each phase owns a
//! `Teardown` that is released when the phase ends, whichever step failed.
//! The first failing step ends the scenario; remaining steps are reported
//! as skipped.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use drill_core::{AclSpec, ClusterSpec, HarnessConfig, ScenarioSpec, WorkloadSpec};
use drill_exec::{CommandRunner, Launcher, OrchestratorCli, Teardown};
use drill_poll::{PollOutcome, PollResult, ReadinessProbes, DEFAULT_POLL_INTERVAL};
use tracing::{info, info_span, warn};

use crate::bootstrap::{BootstrapFlow, Warmup};
use crate::report::{truncate_output, ScenarioReport, StepReport, StepStatus, MAX_OUTPUT_BYTES};
use crate::staging::stage_workload;

pub const LAUNCH_CLUSTER_STEP: &str = "launch-cluster";
pub const NODES_READY_STEP: &str = "nodes-ready";
pub const ACL_BOOTSTRAP_STEP: &str = "acl-bootstrap";

pub fn workload_step_name(workload: &WorkloadSpec) -> String {
    format!("workload:{}", workload.name)
}

/// What a single step produced.
struct StepOutcome {
    passed: bool,
    attempts: Option<u32>,
    detail: Option<String>,
    output: String,
}

impl StepOutcome {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            attempts: None,
            detail: Some(detail.into()),
            output: String::new(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            attempts: None,
            detail: Some(detail.into()),
            output: String::new(),
        }
    }

    fn from_poll(result: PollResult, ready_detail: &str) -> Self {
        let detail = match &result.outcome {
            PollOutcome::Ready => ready_detail.to_string(),
            PollOutcome::Exhausted => "retries exhausted before ready".to_string(),
            PollOutcome::CommandFailed { message } => format!("status command failed: {message}"),
        };
        Self {
            passed: result.is_ready(),
            attempts: Some(result.attempts),
            detail: Some(detail),
            output: result.output,
        }
    }
}

/// Collects step reports and stops running steps after the first failure.
struct StepLog {
    steps: Vec<StepReport>,
    halted: bool,
}

impl StepLog {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            halted: false,
        }
    }

    fn run(&mut self, name: &str, step: impl FnOnce() -> StepOutcome) -> bool {
        let started_at = Utc::now();
        if self.halted {
            self.steps.push(StepReport {
                name: name.to_string(),
                status: StepStatus::Skipped,
                attempts: None,
                detail: Some("skipped after earlier failure".to_string()),
                output: String::new(),
                started_at,
                finished_at: started_at,
            });
            return false;
        }

        let outcome = step();
        let status = if outcome.passed {
            info!(step = name, "step passed");
            StepStatus::Passed
        } else {
            warn!(step = name, detail = outcome.detail.as_deref().unwrap_or(""), "step failed");
            self.halted = true;
            StepStatus::Failed
        };
        self.steps.push(StepReport {
            name: name.to_string(),
            status,
            attempts: outcome.attempts,
            detail: outcome.detail,
            output: truncate_output(&outcome.output, MAX_OUTPUT_BYTES),
            started_at,
            finished_at: Utc::now(),
        });
        outcome.passed
    }
}

pub struct ScenarioDriver<R> {
    runner: R,
    launcher: Launcher,
    poll_interval: Duration,
    warmup: Warmup,
}

impl ScenarioDriver<OrchestratorCli> {
    pub fn from_config(config: &HarnessConfig) -> Self {
        let mut cli = OrchestratorCli::new(&config.binary);
        if let Some(dir) = &config.work_dir {
            cli = cli.with_work_dir(dir);
        }
        let mut launcher = Launcher::new(cli.clone());
        if let Some(dir) = &config.agent_log_dir {
            launcher = launcher.with_log_dir(dir);
        }
        Self::new(cli, launcher)
            .with_poll_interval(config.poll_interval())
            .with_warmup(Warmup::from_config(&config.warmup))
    }
}

impl<R: CommandRunner> ScenarioDriver<R> {
    pub fn new(runner: R, launcher: Launcher) -> Self {
        Self {
            runner,
            launcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            warmup: Warmup::default(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_warmup(mut self, warmup: Warmup) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn run(&self, spec: &ScenarioSpec) -> ScenarioReport {
        let span = info_span!("scenario", name = %spec.name);
        let _entered = span.enter();
        info!("scenario started");

        let started_at = Utc::now();
        let start_instant = Instant::now();
        let mut log = StepLog::new();

        if let Some(cluster) = &spec.cluster {
            self.run_cluster_phase(cluster, &spec.workloads, &mut log);
        }
        if let Some(acl) = &spec.acl {
            self.run_acl_phase(acl, &mut log);
        }

        let passed = !log.steps.is_empty()
            && log
                .steps
                .iter()
                .all(|step| step.status == StepStatus::Passed);
        info!(passed, "scenario finished");

        ScenarioReport {
            scenario: spec.name.clone(),
            passed,
            steps: log.steps,
            started_at,
            finished_at: Utc::now(),
            duration_secs: start_instant.elapsed().as_secs_f64(),
        }
    }

    fn run_cluster_phase(&self, cluster: &ClusterSpec, workloads: &[WorkloadSpec], log: &mut StepLog) {
        let mut teardown = Teardown::new();
        let probes = ReadinessProbes::new(&self.runner).with_interval(self.poll_interval);

        log.run(LAUNCH_CLUSTER_STEP, || {
            match self.launcher.launch_into(&mut teardown, &cluster.configs) {
                Ok(()) => StepOutcome::pass(format!("{} agents started", cluster.configs.len())),
                Err(err) => StepOutcome::fail(err.to_string()),
            }
        });

        log.run(NODES_READY_STEP, || {
            StepOutcome::from_poll(probes.all_nodes_ready(cluster.node_retries), "all nodes ready")
        });

        for workload in workloads {
            log.run(&workload_step_name(workload), || {
                self.run_workload(workload, &probes, &mut teardown)
            });
        }

        teardown.release_all();
    }

    fn run_workload(
        &self,
        workload: &WorkloadSpec,
        probes: &ReadinessProbes<&R>,
        teardown: &mut Teardown,
    ) -> StepOutcome {
        let descriptor = match workload.descriptor_text() {
            Ok(text) => text,
            Err(err) => return StepOutcome::fail(err.to_string()),
        };

        let staged = match stage_workload(&workload.name, &descriptor) {
            Ok(staged) => staged,
            Err(err) => return StepOutcome::fail(format!("staging descriptor failed: {err}")),
        };
        let path = staged.path().to_path_buf();
        teardown.register(staged);

        if let Err(detail) = self.submit(&path) {
            return StepOutcome::fail(detail);
        }

        let result = probes.job_ready(&workload.job, &workload.flags, workload.retries);
        let mut outcome = StepOutcome::from_poll(result, "job ready");
        if outcome.passed {
            if let Some(problem) = check_markers(&outcome.output, workload) {
                outcome.passed = false;
                outcome.detail = Some(problem);
            }
        }
        outcome
    }

    fn submit(&self, descriptor: &Path) -> Result<(), String> {
        let args = vec!["run".to_string(), descriptor.to_string_lossy().into_owned()];
        match self.runner.run(&args) {
            Ok(_) => {
                info!(descriptor = %descriptor.display(), "workload submitted");
                Ok(())
            }
            Err(err) => {
                let stderr = err.stderr().map(str::trim).unwrap_or_default();
                if stderr.is_empty() {
                    Err(format!("submit failed: {err}"))
                } else {
                    Err(format!("submit failed: {err}: {stderr}"))
                }
            }
        }
    }

    fn run_acl_phase(&self, acl: &AclSpec, log: &mut StepLog) {
        let mut teardown = Teardown::new();
        let flow = BootstrapFlow::new(&self.launcher, &self.runner, self.warmup.clone());

        log.run(ACL_BOOTSTRAP_STEP, || {
            match flow.run(&mut teardown, &acl.server_config) {
                Ok(credential) if credential.is_empty() => {
                    StepOutcome::fail("acl bootstrap returned an empty credential")
                }
                Ok(credential) => StepOutcome::pass(format!(
                    "credential captured ({} bytes)",
                    credential.expose().len()
                )),
                Err(err) => StepOutcome::fail(err.to_string()),
            }
        });

        teardown.release_all();
    }
}

/// First expectation the job output violates, if any.
pub fn check_markers(output: &str, workload: &WorkloadSpec) -> Option<String> {
    if let Some(marker) = workload
        .must_not_contain
        .iter()
        .find(|marker| output.contains(marker.as_str()))
    {
        return Some(format!("job output contains `{marker}`"));
    }
    workload
        .must_contain
        .iter()
        .find(|marker| !output.contains(marker.as_str()))
        .map(|marker| format!("job output lacks `{marker}`"))
}

/// Steps `run` will report for `spec`, in order.
pub fn planned_steps(spec: &ScenarioSpec) -> Vec<String> {
    let mut steps = Vec::new();
    if spec.cluster.is_some() {
        steps.push(LAUNCH_CLUSTER_STEP.to_string());
        steps.push(NODES_READY_STEP.to_string());
        steps.extend(spec.workloads.iter().map(workload_step_name));
    }
    if spec.acl.is_some() {
        steps.push(ACL_BOOTSTRAP_STEP.to_string());
    }
    steps
}

/// Render argv for the agent the launcher would start for `config`.
pub fn agent_command_line(binary: &Path, config: &Path) -> String {
    drill_exec::render_command(
        binary,
        &[
            OsString::from("agent"),
            OsString::from("-config"),
            config.as_os_str().to_os_string(),
        ],
    )
}

/// Agent configs a scenario refers to, for pre-flight display.
pub fn referenced_configs(spec: &ScenarioSpec) -> Vec<PathBuf> {
    let mut configs: Vec<PathBuf> = spec
        .cluster
        .as_ref()
        .map(|cluster| cluster.configs.clone())
        .unwrap_or_default();
    if let Some(acl) = &spec.acl {
        configs.push(acl.server_config.clone());
    }
    configs
}
