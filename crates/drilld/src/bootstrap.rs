//! ACL bootstrap: start one server, wait for it to answer, run
//! `acl bootstrap` once and keep its output as the credential.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use drill_core::{Credential, WarmupConfig, WarmupMode};
use drill_exec::{CommandRunner, ExecError, Launcher, Teardown};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to start ACL server: {0}")]
    Launch(#[source] ExecError),
    #[error("warm-up probe could not run: {0}")]
    Probe(#[source] ExecError),
    #[error("server did not answer `{probe}` within {ceiling:?}")]
    WarmupTimedOut { probe: String, ceiling: Duration },
    #[error("acl bootstrap failed: {0}")]
    Command(#[source] ExecError),
}

/// How long to wait for a fresh server before bootstrapping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warmup {
    /// Sleep unconditionally.
    Fixed(Duration),
    Probe(WarmupProbe),
}

/// Poll a cheap status command until the server answers at all.
///
/// Before bootstrap an ACL-enabled server rejects most requests; a rejection
/// still proves it is listening. Only output carrying `unreachable_marker`
/// means it is not up yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupProbe {
    pub args: Vec<String>,
    pub interval: Duration,
    pub ceiling: Duration,
    pub unreachable_marker: String,
}

impl Warmup {
    pub fn from_config(config: &WarmupConfig) -> Self {
        match config.mode {
            WarmupMode::Fixed => Self::Fixed(config.fixed_delay()),
            WarmupMode::Probe => Self::Probe(WarmupProbe {
                args: config.probe_args.clone(),
                interval: config.probe_interval(),
                ceiling: config.ceiling(),
                unreachable_marker: config.unreachable_marker.clone(),
            }),
        }
    }
}

impl Default for Warmup {
    fn default() -> Self {
        Self::from_config(&WarmupConfig::default())
    }
}

enum ProbeAnswer {
    Answered,
    Unreachable,
}

pub struct BootstrapFlow<'a, R> {
    launcher: &'a Launcher,
    runner: R,
    warmup: Warmup,
}

impl<'a, R: CommandRunner> BootstrapFlow<'a, R> {
    pub fn new(launcher: &'a Launcher, runner: R, warmup: Warmup) -> Self {
        Self {
            launcher,
            runner,
            warmup,
        }
    }

    /// The server is registered in `teardown` before anything else can fail,
    /// so the caller can always clean it up.
    pub fn run(
        &self,
        teardown: &mut Teardown,
        server_config: &Path,
    ) -> Result<Credential, BootstrapError> {
        self.launcher
            .launch_server(teardown, server_config)
            .map_err(BootstrapError::Launch)?;

        self.wait_for_server()?;

        let args = ["acl".to_string(), "bootstrap".to_string()];
        match self.runner.run(&args) {
            Ok(output) => {
                info!(bytes = output.stdout.len(), "acl bootstrap succeeded");
                Ok(Credential::new(output.stdout))
            }
            Err(err) => {
                warn!(
                    stderr = err.stderr().unwrap_or_default(),
                    error = %err,
                    "acl bootstrap failed"
                );
                Err(BootstrapError::Command(err))
            }
        }
    }

    fn wait_for_server(&self) -> Result<(), BootstrapError> {
        match &self.warmup {
            Warmup::Fixed(delay) => {
                info!(?delay, "waiting for server warm-up");
                thread::sleep(*delay);
                Ok(())
            }
            Warmup::Probe(probe) => self.probe_until_answered(probe),
        }
    }

    fn probe_until_answered(&self, probe: &WarmupProbe) -> Result<(), BootstrapError> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.probe_once(probe)? {
                ProbeAnswer::Answered => {
                    info!(attempts, elapsed = ?started.elapsed(), "server answering");
                    return Ok(());
                }
                ProbeAnswer::Unreachable => {
                    debug!(attempts, "server not reachable yet");
                }
            }
            if started.elapsed() >= probe.ceiling {
                return Err(BootstrapError::WarmupTimedOut {
                    probe: probe.args.join(" "),
                    ceiling: probe.ceiling,
                });
            }
            thread::sleep(probe.interval);
        }
    }

    fn probe_once(&self, probe: &WarmupProbe) -> Result<ProbeAnswer, BootstrapError> {
        match self.runner.run(&probe.args) {
            Ok(output) if output.stdout.contains(&probe.unreachable_marker) => {
                Ok(ProbeAnswer::Unreachable)
            }
            Ok(_) => Ok(ProbeAnswer::Answered),
            Err(ExecError::CommandFailed { stdout, stderr, .. }) => {
                if stdout.contains(&probe.unreachable_marker)
                    || stderr.contains(&probe.unreachable_marker)
                {
                    Ok(ProbeAnswer::Unreachable)
                } else {
                    Ok(ProbeAnswer::Answered)
                }
            }
            Err(ExecError::NonUtf8Output { .. }) => Ok(ProbeAnswer::Answered),
            Err(err) => Err(BootstrapError::Probe(err)),
        }
    }
}
