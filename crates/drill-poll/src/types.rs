use serde::Serialize;
use std::time::Duration;

use crate::classify::NegativeKeyword;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One bounded readiness poll. Built fresh per probe, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    pub args: Vec<String>,
    pub retries: u32,
    pub interval: Duration,
    pub negative_keyword: String,
}

impl PollSpec {
    pub fn new<I, S>(args: I, retries: u32, negative_keyword: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            retries,
            interval: DEFAULT_POLL_INTERVAL,
            negative_keyword: negative_keyword.into(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn classifier(&self) -> NegativeKeyword {
        NegativeKeyword::new(self.negative_keyword.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollOutcome {
    Ready,
    /// Every attempt ran but none was classified ready.
    Exhausted,
    /// An attempt could not run or exited non-zero; the poll stopped there.
    CommandFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollResult {
    pub outcome: PollOutcome,
    /// Stdout of the ready attempt, or of the last attempt on exhaustion.
    /// Empty after a command failure.
    pub output: String,
    pub attempts: u32,
}

impl PollResult {
    pub fn is_ready(&self) -> bool {
        self.outcome == PollOutcome::Ready
    }
}
