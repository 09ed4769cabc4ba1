//! Bounded readiness polling over one-shot status commands.

use std::thread;

use drill_exec::{CommandRunner, ExecError};
use tracing::{debug, info, warn};

use crate::classify::OutputClassifier;
use crate::types::{PollOutcome, PollResult, PollSpec};

pub struct Poller<R> {
    runner: R,
}

impl<R: CommandRunner> Poller<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Poll with the spec's own negative keyword.
    pub fn poll(&self, spec: &PollSpec) -> PollResult {
        self.poll_with(spec, &spec.classifier())
    }

    /// Sleep `spec.interval`, run the command, classify its stdout; repeat
    /// up to `spec.retries` times.
    ///
    /// Output counts as ready only when it is non-empty and the classifier
    /// accepts it. A command that fails to run or exits non-zero ends the
    /// poll at once: that is a broken setup, not a resource still settling.
    pub fn poll_with(&self, spec: &PollSpec, classifier: &dyn OutputClassifier) -> PollResult {
        let mut captured = String::new();

        for attempt in 1..=spec.retries {
            thread::sleep(spec.interval);

            let stdout = match self.runner.run(&spec.args) {
                Ok(output) => output.stdout,
                Err(err) => {
                    warn!(
                        command = %spec.args.join(" "),
                        attempt,
                        error = %err,
                        "poll command failed; giving up"
                    );
                    return PollResult {
                        outcome: PollOutcome::CommandFailed {
                            message: describe_failure(&err),
                        },
                        output: String::new(),
                        attempts: attempt,
                    };
                }
            };

            if !stdout.is_empty() && classifier.is_ready(&stdout) {
                info!(command = %spec.args.join(" "), attempt, "ready");
                return PollResult {
                    outcome: PollOutcome::Ready,
                    output: stdout,
                    attempts: attempt,
                };
            }

            debug!(
                command = %spec.args.join(" "),
                attempt,
                retries = spec.retries,
                "not ready yet"
            );
            captured = stdout;
        }

        warn!(
            command = %spec.args.join(" "),
            retries = spec.retries,
            "retries exhausted"
        );
        PollResult {
            outcome: PollOutcome::Exhausted,
            output: captured,
            attempts: spec.retries,
        }
    }
}

fn describe_failure(err: &ExecError) -> String {
    match err.stderr().map(str::trim) {
        Some(stderr) if !stderr.is_empty() => format!("{err}: {stderr}"),
        _ => err.to_string(),
    }
}
