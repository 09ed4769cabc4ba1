//! Long-lived agent processes and the teardown that owns them.

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

use tracing::{debug, info, warn};

use crate::command::OrchestratorCli;
use crate::error::ExecError;

/// A resource whose release is idempotent and never fails outward.
pub trait Release {
    fn release(&mut self);
    fn label(&self) -> String;
}

/// An agent process owned by the harness.
///
/// Release kills the direct child only; its descendants are not tracked.
/// Dropping the handle releases it.
#[derive(Debug)]
pub struct ProcessHandle {
    config: PathBuf,
    pid: u32,
    child: Option<Child>,
}

impl ProcessHandle {
    pub fn new(config: impl Into<PathBuf>, child: Child) -> Self {
        Self {
            config: config.into(),
            pid: child.id(),
            child: Some(child),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Release for ProcessHandle {
    fn release(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        // An already-exited child reports InvalidInput here; either way we reap.
        if let Err(err) = child.kill() {
            debug!(pid = self.pid, error = %err, "kill on release failed");
        }
        match child.wait() {
            Ok(status) => debug!(pid = self.pid, %status, "agent released"),
            Err(err) => debug!(pid = self.pid, error = %err, "wait on release failed"),
        }
    }

    fn label(&self) -> String {
        format!("agent pid={} config={}", self.pid, self.config.display())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Everything a scenario must release before it returns.
///
/// Resources are released in registration order, at most once each.
#[derive(Default)]
pub struct Teardown {
    resources: Vec<Box<dyn Release + Send>>,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: impl Release + Send + 'static) {
        debug!(resource = %resource.label(), "registered for teardown");
        self.resources.push(Box::new(resource));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.resources.iter().map(|resource| resource.label()).collect()
    }

    pub fn release_all(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        info!(count = self.resources.len(), "tearing down");
        for mut resource in self.resources.drain(..) {
            resource.release();
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("resources", &self.labels())
            .finish()
    }
}

/// Starts `<binary> agent -config <path>` processes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Launcher {
    pub cli: OrchestratorCli,
    pub log_dir: Option<PathBuf>,
}

impl Launcher {
    pub fn new(cli: OrchestratorCli) -> Self {
        Self { cli, log_dir: None }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Start one agent for `config`.
    ///
    /// A relative `config` is resolved against the harness's current
    /// directory, not the CLI's work dir, and passed to the agent absolute.
    pub fn spawn_agent(&self, config: &Path) -> Result<ProcessHandle, ExecError> {
        let resolved = match std::path::absolute(config) {
            Ok(path) if path.exists() => path,
            _ => {
                return Err(ExecError::MissingConfig {
                    path: config.to_path_buf(),
                })
            }
        };
        let config = resolved.as_path();

        let args: Vec<OsString> = vec![
            OsString::from("agent"),
            OsString::from("-config"),
            config.as_os_str().to_os_string(),
        ];
        let rendered = self.cli.render(&args);
        let (stdout, stderr) = self.agent_stdio(config)?;

        let child = self
            .cli
            .command(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| ExecError::Io {
                command: rendered.clone(),
                source,
            })?;

        let handle = ProcessHandle::new(config, child);
        info!(pid = handle.pid(), command = %rendered, "agent started");
        Ok(handle)
    }

    /// Start one agent per config, in order, registering each in `teardown`
    /// as soon as it is running. Stops at the first failure; agents already
    /// started stay registered.
    pub fn launch_into(&self, teardown: &mut Teardown, configs: &[PathBuf]) -> Result<(), ExecError> {
        for config in configs {
            match self.spawn_agent(config) {
                Ok(handle) => teardown.register(handle),
                Err(err) => {
                    warn!(
                        config = %config.display(),
                        started = teardown.len(),
                        error = %err,
                        "agent launch failed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Start a whole cluster; on failure, agents that did start are
    /// released before the error is returned.
    pub fn launch_cluster(&self, configs: &[PathBuf]) -> Result<Teardown, ExecError> {
        let mut teardown = Teardown::new();
        if let Err(err) = self.launch_into(&mut teardown, configs) {
            teardown.release_all();
            return Err(err);
        }
        Ok(teardown)
    }

    /// Start the single authoritative server used by the bootstrap flow.
    pub fn launch_server(&self, teardown: &mut Teardown, config: &Path) -> Result<(), ExecError> {
        let handle = self.spawn_agent(config)?;
        teardown.register(handle);
        Ok(())
    }

    fn agent_stdio(&self, config: &Path) -> Result<(Stdio, Stdio), ExecError> {
        let Some(dir) = &self.log_dir else {
            return Ok((Stdio::null(), Stdio::null()));
        };

        let stem = config
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "agent".to_string());
        let path = dir.join(format!("{stem}.log"));
        let open = || -> std::io::Result<(File, File)> {
            fs::create_dir_all(dir)?;
            let file = File::create(&path)?;
            let clone = file.try_clone()?;
            Ok((file, clone))
        };
        let (out, err) = open().map_err(|source| ExecError::AgentLog {
            path: path.clone(),
            source,
        })?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::process::Command;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{Launcher, ProcessHandle, Release, Teardown};
    use crate::command::OrchestratorCli;
    use crate::error::ExecError;

    // `sh agent -config <path>` runs the `agent` script in the work dir.
    fn fake_cluster(agent_script: &str, names: &[&str]) -> (tempfile::TempDir, Launcher, Vec<PathBuf>) {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("agent"), agent_script).expect("write agent script");
        let configs = names
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                fs::write(&path, "# agent config\n").expect("write config");
                path
            })
            .collect();
        let launcher = Launcher::new(OrchestratorCli::new("sh").with_work_dir(dir.path()));
        (dir, launcher, configs)
    }

    fn pid_alive(pid: u32) -> bool {
        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    struct CountingResource {
        releases: Arc<AtomicUsize>,
    }

    impl Release for CountingResource {
        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn label(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn release_kills_running_agent_and_is_idempotent() {
        let child = Command::new("sleep").arg("60").spawn().expect("spawn sleep");
        let mut handle = ProcessHandle::new("server.hcl", child);
        let pid = handle.pid();
        assert!(handle.is_running());

        handle.release();
        assert!(!handle.is_running());
        assert!(!pid_alive(pid));

        handle.release();
        assert!(!handle.is_running());
    }

    #[test]
    fn release_tolerates_already_exited_process() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        child.wait().expect("wait true");
        let mut handle = ProcessHandle::new("client1.hcl", child);

        handle.release();
        handle.release();
        assert!(!handle.is_running());
    }

    #[test]
    fn teardown_releases_each_resource_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut teardown = Teardown::new();
        for _ in 0..3 {
            teardown.register(CountingResource {
                releases: Arc::clone(&releases),
            });
        }
        assert_eq!(teardown.len(), 3);

        teardown.release_all();
        teardown.release_all();
        drop(teardown);

        assert_eq!(releases.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dropping_teardown_releases_resources() {
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let mut teardown = Teardown::new();
            teardown.register(CountingResource {
                releases: Arc::clone(&releases),
            });
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn launch_cluster_starts_one_agent_per_config() {
        let (_dir, launcher, configs) = fake_cluster(
            "exec sleep 60\n",
            &["server.hcl", "client1.hcl", "client2.hcl"],
        );

        let mut teardown = launcher.launch_cluster(&configs).expect("launch cluster");
        assert_eq!(teardown.len(), 3);
        let labels = teardown.labels();
        assert!(labels[0].contains("server.hcl"));
        assert!(labels[2].contains("client2.hcl"));

        teardown.release_all();
        teardown.release_all();
        assert!(teardown.is_empty());
    }

    #[test]
    fn partial_launch_failure_keeps_started_agents_registered() {
        let (dir, launcher, mut configs) =
            fake_cluster("exec sleep 60\n", &["server.hcl", "client1.hcl"]);
        configs.push(dir.path().join("client2-missing.hcl"));

        let mut teardown = Teardown::new();
        let err = launcher
            .launch_into(&mut teardown, &configs)
            .expect_err("third config is missing");
        assert!(matches!(err, ExecError::MissingConfig { .. }));
        assert_eq!(teardown.len(), 2);

        teardown.release_all();
        teardown.release_all();
    }

    #[test]
    fn launch_cluster_reports_spawn_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("server.hcl");
        fs::write(&config, "").expect("write config");
        let launcher = Launcher::new(OrchestratorCli::new("/definitely/missing/orchestrator"));

        let err = launcher
            .launch_cluster(&[config])
            .expect_err("missing binary");
        match err {
            ExecError::Io { command, source } => {
                assert!(command.contains("agent -config"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn launch_server_registers_single_agent() {
        let (_dir, launcher, configs) = fake_cluster("exec sleep 60\n", &["server_acl.hcl"]);

        let mut teardown = Teardown::new();
        launcher
            .launch_server(&mut teardown, &configs[0])
            .expect("launch server");
        assert_eq!(teardown.len(), 1);
    }

    fn wait_for_file(path: &std::path::Path) -> String {
        for _ in 0..500 {
            if let Ok(body) = fs::read_to_string(path) {
                if !body.is_empty() {
                    return body.trim().to_string();
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("{} never written", path.display());
    }

    #[test]
    fn relative_config_reaches_agent_running_in_work_dir() {
        let (dir, launcher, _) = fake_cluster(
            "if [ -f \"$2\" ]; then echo found > seen; else echo missing > seen; fi\n\
             echo \"$2\" > seen-path\n\
             exec sleep 60\n",
            &[],
        );
        // Relative to the test's cwd, which is not the launcher's work dir.
        let config = tempfile::Builder::new()
            .prefix("drill-relative-")
            .suffix(".hcl")
            .tempfile_in(".")
            .expect("config in cwd");
        let relative = PathBuf::from(config.path().file_name().expect("file name"));
        assert!(relative.is_relative());

        let mut handle = launcher.spawn_agent(&relative).expect("spawn agent");

        assert_eq!(wait_for_file(&dir.path().join("seen")), "found");
        let seen_path = PathBuf::from(wait_for_file(&dir.path().join("seen-path")));
        assert!(seen_path.is_absolute());
        assert!(seen_path.ends_with(&relative));
        handle.release();
    }

    #[test]
    fn release_stops_agent_that_execs_in_place() {
        let (dir, launcher, configs) =
            fake_cluster("echo $$ > agent.pid\nexec sleep 60\n", &["server.hcl"]);

        let mut handle = launcher.spawn_agent(&configs[0]).expect("spawn agent");
        let agent_pid: u32 = wait_for_file(&dir.path().join("agent.pid"))
            .parse()
            .expect("pid");
        assert_eq!(agent_pid, handle.pid());
        assert!(pid_alive(agent_pid));

        handle.release();
        assert!(!pid_alive(agent_pid));
    }

    #[test]
    fn agent_output_is_redirected_to_log_dir() {
        let (dir, launcher, configs) = fake_cluster("echo \"booting $2\"\n", &["client1.hcl"]);
        let log_dir = dir.path().join("logs");
        let launcher = launcher.with_log_dir(&log_dir);

        let mut handle = launcher.spawn_agent(&configs[0]).expect("spawn agent");
        // The script exits on its own; wait for it before reading the log.
        while handle.is_running() {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        handle.release();

        let log = fs::read_to_string(log_dir.join("client1.log")).expect("read agent log");
        assert!(log.contains("booting"));
        assert!(log.contains("client1.hcl"));
    }
}
