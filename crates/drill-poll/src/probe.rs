//! Node and job readiness probes.

use std::time::Duration;

use drill_exec::CommandRunner;

use crate::poller::Poller;
use crate::types::{PollResult, PollSpec, DEFAULT_POLL_INTERVAL};

/// Present in `node-status` output while any node is still registering.
pub const NODE_NOT_READY: &str = "initializing";
/// Present in `job status` output while allocations are unplaced.
pub const JOB_NOT_READY: &str = "pending";

pub fn node_readiness_spec(retries: u32) -> PollSpec {
    PollSpec::new(["node-status"], retries, NODE_NOT_READY)
}

/// `job status [<flags>...] <job>`; blank flags are dropped.
pub fn job_readiness_spec(job: &str, flags: &[String], retries: u32) -> PollSpec {
    let mut args = vec!["job".to_string(), "status".to_string()];
    args.extend(
        flags
            .iter()
            .filter(|flag| !flag.trim().is_empty())
            .cloned(),
    );
    args.push(job.to_string());
    PollSpec::new(args, retries, JOB_NOT_READY)
}

pub struct ReadinessProbes<R> {
    poller: Poller<R>,
    interval: Duration,
}

impl<R: CommandRunner> ReadinessProbes<R> {
    pub fn new(runner: R) -> Self {
        Self {
            poller: Poller::new(runner),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Every registered node has left the `initializing` state.
    pub fn all_nodes_ready(&self, retries: u32) -> PollResult {
        self.poller
            .poll(&node_readiness_spec(retries).with_interval(self.interval))
    }

    /// The job has no `pending` allocations. Terminal markers such as
    /// `failed` or `complete` are left to the caller.
    pub fn job_ready(&self, job: &str, flags: &[String], retries: u32) -> PollResult {
        self.poller
            .poll(&job_readiness_spec(job, flags, retries).with_interval(self.interval))
    }
}
