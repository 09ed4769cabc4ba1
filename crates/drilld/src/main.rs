use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use drill_core::{
    has_errors, load_harness_config, load_scenario, ConfigError, HarnessConfig, ScenarioSpec,
    Validate, ValidationIssue, ValidationLevel,
};
use drilld::{agent_command_line, planned_steps, referenced_configs, ScenarioDriver};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit status for a scenario that ran and failed.
const SCENARIO_FAILED_EXIT: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "drill", version, about = "End-to-end scenario runner for orchestrator clusters")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,

    /// Harness config (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Orchestrator binary; overrides the harness config.
    #[arg(long, global = true)]
    binary: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Run a scenario against a live cluster.
    Run {
        scenario: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate a scenario and print what would run.
    Check { scenario: PathBuf },
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("failed to load harness config at {path}: {source}")]
    LoadConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("failed to load scenario at {path}: {source}")]
    LoadScenario {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("{count} validation error(s) in {path}")]
    Invalid { path: PathBuf, count: usize },
    #[error("failed to serialize report as json: {source}")]
    SerializeReport {
        #[source]
        source: serde_json::Error,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("drill failed: {err}");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<i32, MainError> {
    let config = harness_config(cli.config.as_deref(), cli.binary)?;

    match cli.command {
        CliCommand::Run { scenario, json } => {
            let spec = checked_scenario(&config, &scenario)?;
            let report = ScenarioDriver::from_config(&config).run(&spec);
            if json {
                let body = serde_json::to_string_pretty(&report)
                    .map_err(|source| MainError::SerializeReport { source })?;
                println!("{body}");
            } else {
                print!("{}", report.render_text());
            }
            Ok(if report.passed { 0 } else { SCENARIO_FAILED_EXIT })
        }
        CliCommand::Check { scenario } => {
            let spec = checked_scenario(&config, &scenario)?;
            print!("{}", render_plan(&config, &spec));
            Ok(0)
        }
    }
}

fn harness_config(path: Option<&Path>, binary: Option<PathBuf>) -> Result<HarnessConfig, MainError> {
    let mut config = match path {
        Some(path) => load_harness_config(path).map_err(|source| MainError::LoadConfig {
            path: path.to_path_buf(),
            source,
        })?,
        None => HarnessConfig::default(),
    };
    if let Some(binary) = binary {
        config.binary = binary;
    }
    Ok(config)
}

fn checked_scenario(config: &HarnessConfig, path: &Path) -> Result<ScenarioSpec, MainError> {
    let spec = load_scenario(path).map_err(|source| MainError::LoadScenario {
        path: path.to_path_buf(),
        source,
    })?;

    let mut issues = config.validate();
    issues.extend(spec.validate());
    report_issues(&issues);
    if has_errors(&issues) {
        return Err(MainError::Invalid {
            path: path.to_path_buf(),
            count: issues
                .iter()
                .filter(|issue| issue.level == ValidationLevel::Error)
                .count(),
        });
    }

    info!(scenario = %spec.name, steps = planned_steps(&spec).len(), "scenario loaded");
    Ok(spec)
}

fn report_issues(issues: &[ValidationIssue]) {
    for issue in issues {
        match issue.level {
            ValidationLevel::Error => eprintln!("error[{}]: {}", issue.code, issue.message),
            ValidationLevel::Warning => warn!(code = issue.code, "{}", issue.message),
        }
    }
}

fn render_plan(config: &HarnessConfig, spec: &ScenarioSpec) -> String {
    let mut out = format!("scenario {}\n", spec.name);
    for config_path in referenced_configs(spec) {
        out.push_str(&format!(
            "  agent: {}\n",
            agent_command_line(&config.binary, &config_path)
        ));
    }
    for step in planned_steps(spec) {
        out.push_str(&format!("  step: {step}\n"));
    }
    out
}
