//! Scenario results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

/// Captured output kept per step.
pub const MAX_OUTPUT_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "PASS",
            Self::Failed => "FAIL",
            Self::Skipped => "SKIP",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
    /// Poll attempts, for steps that poll.
    pub attempts: Option<u32>,
    pub detail: Option<String>,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub passed: bool,
    pub steps: Vec<StepReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSummary {
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
}

impl ScenarioReport {
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn failed_step_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Failed)
            .map(|step| step.name.as_str())
            .collect()
    }

    pub fn summary(&self) -> ScenarioSummary {
        let count = |status| self.steps.iter().filter(|s| s.status == status).count();
        ScenarioSummary {
            total_steps: self.steps.len(),
            passed_steps: count(StepStatus::Passed),
            failed_steps: count(StepStatus::Failed),
            skipped_steps: count(StepStatus::Skipped),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "scenario {} {} ({:.1}s)",
            self.scenario,
            if self.passed { "PASSED" } else { "FAILED" },
            self.duration_secs
        );
        for step in &self.steps {
            let _ = write!(out, "  [{}] {}", step.status.as_str(), step.name);
            if let Some(attempts) = step.attempts {
                let _ = write!(out, " attempts={attempts}");
            }
            if let Some(detail) = &step.detail {
                let _ = write!(out, ": {detail}");
            }
            out.push('\n');
        }
        let summary = self.summary();
        let _ = writeln!(
            out,
            "{} steps: {} passed, {} failed, {} skipped",
            summary.total_steps, summary.passed_steps, summary.failed_steps, summary.skipped_steps
        );
        out
    }
}

pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &output[..end])
}
