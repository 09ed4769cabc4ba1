//! Shell-script stand-in for the orchestrator CLI.
//!
//! The fake is driven as `sh <subcommand> <args...>` from its root
//! directory, so each subcommand is a plain script file there and no
//! executable bits are involved. Every script bumps `.calls-<name>`.

use std::fs;
use std::path::{Path, PathBuf};

use drill_exec::{Launcher, OrchestratorCli};

/// Writes a marker file the follow-up workload checks for.
pub(crate) const SEED_WORKLOAD: &str = r#"job "sleep" {
  type = "batch"
  group "group1" {
    ephemeral_disk {
      migrate = true
      sticky  = true
    }
    task "sleep" {
      template {
        data        = "hello world"
        destination = "/local/hello-world"
      }
      driver = "exec"
      config {
        command = "/bin/sleep"
        args    = ["infinity"]
      }
    }
  }
}
"#;

/// Completes only if the seed workload's marker file survived.
pub(crate) const CHECK_WORKLOAD: &str = r#"job "sleep" {
  type = "batch"
  group "group1" {
    ephemeral_disk {
      migrate = true
      sticky  = true
    }
    task "sleep" {
      driver = "exec"
      config {
        command = "test"
        args    = ["-f", "/local/hello-world"]
      }
    }
  }
}
"#;

pub(crate) struct FakeOrchestrator {
    dir: tempfile::TempDir,
    initializing_polls: u32,
    pending_polls: u32,
    unreachable_probes: u32,
    failing_bootstrap: bool,
    failing_node_status: bool,
    failing_submit: bool,
    drop_side_effect: bool,
}

impl FakeOrchestrator {
    pub(crate) fn new() -> Self {
        let fake = Self {
            dir: tempfile::tempdir().expect("fake orchestrator dir"),
            initializing_polls: 1,
            pending_polls: 1,
            unreachable_probes: 0,
            failing_bootstrap: false,
            failing_node_status: false,
            failing_submit: false,
            drop_side_effect: false,
        };
        fake.write_scripts();
        fake
    }

    pub(crate) fn initializing_polls(mut self, polls: u32) -> Self {
        self.initializing_polls = polls;
        self.write_scripts();
        self
    }

    pub(crate) fn pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self.write_scripts();
        self
    }

    pub(crate) fn unreachable_probes(mut self, probes: u32) -> Self {
        self.unreachable_probes = probes;
        self.write_scripts();
        self
    }

    pub(crate) fn failing_bootstrap(mut self) -> Self {
        self.failing_bootstrap = true;
        self.write_scripts();
        self
    }

    pub(crate) fn failing_node_status(mut self) -> Self {
        self.failing_node_status = true;
        self.write_scripts();
        self
    }

    pub(crate) fn failing_submit(mut self) -> Self {
        self.failing_submit = true;
        self.write_scripts();
        self
    }

    /// Submissions no longer leave the marker file behind.
    pub(crate) fn drop_side_effect(mut self) -> Self {
        self.drop_side_effect = true;
        self.write_scripts();
        self
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn cli(&self) -> OrchestratorCli {
        OrchestratorCli::new("sh").with_work_dir(self.root())
    }

    pub(crate) fn launcher(&self) -> Launcher {
        Launcher::new(self.cli())
    }

    /// An (empty) agent config file under the fake's root.
    pub(crate) fn config(&self, name: &str) -> PathBuf {
        let path = self.root().join(name);
        fs::write(&path, "# agent config\n").expect("write agent config");
        path
    }

    pub(crate) fn count(&self, script: &str) -> u32 {
        fs::read_to_string(self.root().join(format!(".calls-{script}")))
            .ok()
            .and_then(|body| body.trim().parse().ok())
            .unwrap_or(0)
    }

    fn write_scripts(&self) {
        self.write("agent", "exec sleep 60\n".to_string());

        let node_status = if self.failing_node_status {
            "echo 'Error querying node status: connection refused' >&2\nexit 1\n".to_string()
        } else {
            format!(
                "if [ \"$n\" -le {} ]; then\n  printf 'ID  Status\\n1   ready\\n2   initializing\\n'\nelse\n  printf 'ID  Status\\n1   ready\\n2   ready\\n3   ready\\n'\nfi\n",
                self.initializing_polls
            )
        };
        self.write("node-status", node_status);

        let mut run = String::new();
        if self.failing_submit {
            run.push_str("echo 'Error parsing job file' >&2\nexit 1\n");
        }
        if !self.drop_side_effect {
            run.push_str("if grep -q 'hello world' \"$1\"; then echo 'hello world' > hello-world; fi\n");
        }
        run.push_str("cp \"$1\" last-job\necho 0 > .job-polls\necho '==> Evaluation status changed'\n");
        self.write("run", run);

        self.write(
            "job",
            format!(
                "for a in \"$@\"; do last=\"$a\"; done\n\
                 p=$(cat .job-polls 2>/dev/null || echo 0); p=$((p+1)); echo \"$p\" > .job-polls\n\
                 echo \"ID = $last\"\n\
                 if [ \"$p\" -le {} ]; then echo 'Allocations'; echo '1  pending'; exit 0; fi\n\
                 if grep -q infinity last-job; then echo 'Status = running'; echo '1  running'\n\
                 elif [ -f hello-world ]; then echo 'Status = dead'; echo '1  complete'\n\
                 else echo 'Status = dead'; echo '1  failed'; fi\n",
                self.pending_polls
            ),
        );

        self.write(
            "agent-info",
            format!(
                "if [ \"$n\" -le {} ]; then\n  echo 'Error querying agent info: dial tcp 127.0.0.1:4646: connect: connection refused' >&2\n  exit 1\nfi\necho 'Error querying agent info: Permission denied' >&2\nexit 1\n",
                self.unreachable_probes
            ),
        );

        let acl = if self.failing_bootstrap {
            "echo 'Error bootstrapping: ACL system already bootstrapped' >&2\nexit 1\n"
        } else {
            "echo 'Accessor ID  = 5b7fd453-d3f7-6814-81dc-fcfe6daedea5'\necho 'Secret ID    = 9184ec35-65d4-9258-61e3-0c066d0a45c5'\n"
        };
        self.write("acl", acl.to_string());
    }

    fn write(&self, name: &str, body: String) {
        let script = format!(
            "n=$(cat .calls-{name} 2>/dev/null || echo 0); n=$((n+1)); echo \"$n\" > .calls-{name}\n{body}"
        );
        fs::write(self.root().join(name), script).expect("write fake script");
    }
}
