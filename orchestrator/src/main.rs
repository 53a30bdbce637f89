//! Multi-agent task orchestrator CLI.
//!
//! Admits task plans (validation, wave scheduling, conflict detection, risk
//! scoring) and reports on running sessions. Session state lives under
//! `.orchestrator/`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use orchestrator::adapter::GenericAdapter;
use orchestrator::admit::admit_plan;
use orchestrator::core::plan::Plan;
use orchestrator::core::risk::score_plan;
use orchestrator::core::schedule::compute_waves;
use orchestrator::core::state::PlanPhase;
use orchestrator::io::config::load_config;
use orchestrator::io::plan_file::load_plan;
use orchestrator::io::status::load_status;
use orchestrator::{exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Task plan admission and promotion orchestrator"
)]
struct Cli {
    /// Path to the orchestrator config file.
    #[arg(long, default_value = ".orchestrator/config.toml", global = true)]
    config: PathBuf,

    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run full admission: invariants, waves, conflicts, and risk.
    Validate {
        /// Plan file (TOML).
        plan: PathBuf,
    },
    /// Print parallel execution waves for a plan.
    Waves {
        plan: PathBuf,
    },
    /// Print the risk score and contributing factors for a plan.
    Score {
        plan: PathBuf,
    },
    /// Report the persisted session status.
    Status {
        /// Status file written by the session.
        #[arg(long, default_value = ".orchestrator/state/status.json")]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Command::Validate { plan } => cmd_validate(cli, plan),
        Command::Waves { plan } => cmd_waves(cli, plan),
        Command::Score { plan } => cmd_score(cli, plan),
        Command::Status { path } => cmd_status(cli, path),
    }
}

fn cmd_validate(cli: &Cli, plan_path: &Path) -> Result<i32> {
    let config = load_config(&cli.config)?;
    // Invariant errors must land in the report, so bypass load_plan's bail.
    let contents = std::fs::read_to_string(plan_path)
        .with_context(|| format!("read {}", plan_path.display()))?;
    let plan: Plan = toml::from_str(&contents)
        .with_context(|| format!("parse {}", plan_path.display()))?;

    let report = admit_plan(&plan, &config.risk, Some(&GenericAdapter));
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for error in &report.errors {
            println!("error: {error}");
        }
        if let Some(cycle) = &report.cycle {
            println!("cycle: {}", cycle.join(" -> "));
        }
        for conflict in &report.conflicts {
            println!(
                "conflict: {:?} {} written by [{}]",
                conflict.kind,
                conflict.target,
                conflict.tasks.join(", ")
            );
        }
        println!("risk: {} ({:?})", report.risk.value, report.risk.decision);
        println!(
            "{}",
            if report.accepted { "admitted" } else { "rejected" }
        );
    }
    Ok(if report.accepted {
        exit_codes::OK
    } else {
        exit_codes::REJECTED
    })
}

fn cmd_waves(cli: &Cli, plan_path: &Path) -> Result<i32> {
    let plan = load_plan(plan_path)?;
    match compute_waves(&plan) {
        Ok(waves) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&waves)?);
            } else {
                for (index, wave) in waves.iter().enumerate() {
                    println!("wave {index}: {}", wave.join(", "));
                }
            }
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(exit_codes::REJECTED)
        }
    }
}

fn cmd_score(cli: &Cli, plan_path: &Path) -> Result<i32> {
    let config = load_config(&cli.config)?;
    let plan = load_plan(plan_path)?;
    let score = score_plan(&plan, &config.risk);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&score)?);
    } else {
        println!("risk: {} ({:?})", score.value, score.decision);
        for factor in &score.factors {
            println!("  {factor}");
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_status(cli: &Cli, path: &Path) -> Result<i32> {
    let status = load_status(path)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("phase: {:?}", status.phase);
        println!("baseline: {}", status.baseline);
        for record in &status.records {
            match &record.reason {
                Some(reason) => {
                    println!("  {} {:?} ({reason})", record.task_id, record.state);
                }
                None => println!("  {} {:?}", record.task_id, record.state),
            }
        }
    }
    Ok(match status.phase {
        PlanPhase::Escalated => exit_codes::ESCALATED,
        PlanPhase::IntegrationFailed | PlanPhase::Aborted => exit_codes::FAILED,
        PlanPhase::Executing | PlanPhase::Integrating | PlanPhase::Accepted => exit_codes::OK,
    })
}
