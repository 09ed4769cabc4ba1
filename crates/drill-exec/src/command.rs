use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::ExecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs one-shot orchestrator subcommands to completion.
///
/// A non-zero exit is an error, not an output: pollers and one-shot callers
/// both treat it as an execution failure.
pub trait CommandRunner {
    fn run(&self, args: &[String]) -> Result<CommandOutput, ExecError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, args: &[String]) -> Result<CommandOutput, ExecError> {
        (**self).run(args)
    }
}

/// The orchestrator's command-line interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorCli {
    /// Agents are stopped by killing this process only. A wrapper script
    /// here must `exec` the real binary or its agent outlives teardown.
    pub binary: PathBuf,
    pub work_dir: Option<PathBuf>,
}

impl Default for OrchestratorCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("nomad"),
            work_dir: None,
        }
    }
}

impl OrchestratorCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: None,
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    /// A `Command` for `<binary> <args...>` rooted at the configured work dir.
    pub fn command(&self, args: &[OsString]) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(args);
        if let Some(dir) = &self.work_dir {
            command.current_dir(dir);
        }
        command
    }

    pub fn render(&self, args: &[OsString]) -> String {
        render_command(&self.binary, args)
    }
}

impl CommandRunner for OrchestratorCli {
    fn run(&self, args: &[String]) -> Result<CommandOutput, ExecError> {
        let owned_args: Vec<OsString> = args.iter().map(OsString::from).collect();
        let rendered = self.render(&owned_args);
        debug!(command = %rendered, "running orchestrator command");

        let output = self
            .command(&owned_args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecError::Io {
                command: rendered.clone(),
                source,
            })?;

        let stdout =
            String::from_utf8(output.stdout).map_err(|source| ExecError::NonUtf8Output {
                command: rendered.clone(),
                stream: "stdout",
                source,
            })?;
        let stderr =
            String::from_utf8(output.stderr).map_err(|source| ExecError::NonUtf8Output {
                command: rendered.clone(),
                stream: "stderr",
                source,
            })?;

        if !output.status.success() {
            return Err(ExecError::CommandFailed {
                command: rendered,
                status: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

pub fn render_command(binary: &Path, args: &[OsString]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
