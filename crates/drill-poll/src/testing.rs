use std::sync::Mutex;

use drill_exec::{CommandOutput, CommandRunner, ExecError};

/// Replays scripted stdout (`Ok`) or exit codes (`Err`), repeating the last
/// entry once the script runs out, and records every invocation.
pub(crate) struct ScriptedRunner {
    script: Vec<Result<&'static str, i32>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub(crate) fn always(stdout: &'static str) -> Self {
        Self::sequence(vec![Ok(stdout)])
    }

    pub(crate) fn sequence(script: Vec<Result<&'static str, i32>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one entry");
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub(crate) fn last_args(&self) -> Option<Vec<String>> {
        self.calls.lock().expect("calls lock").last().cloned()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, args: &[String]) -> Result<CommandOutput, ExecError> {
        let mut calls = self.calls.lock().expect("calls lock");
        let index = calls.len().min(self.script.len() - 1);
        calls.push(args.to_vec());

        match self.script[index] {
            Ok(stdout) => Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
            Err(code) => Err(ExecError::CommandFailed {
                command: args.join(" "),
                status: Some(code),
                stdout: String::new(),
                stderr: "scripted failure".to_string(),
            }),
        }
    }
}
