#![warn(missing_docs)]

//! rulegate — evaluate an approval rule against a change-set snapshot.
//!
//! ```text
//! rulegate <rule.js> <changeset.json> [--log-mode drop|console|capture]
//! ```
//!
//! The snapshot is a serialized `PullRequestPatches` JSON document, as
//! produced by the source adapters. Exit code 0 means approve, 1 means
//! reject, 2 means the rule could not be evaluated.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use rulegate_engine::{EngineConfig, LogMode, RuleExecutor};
use rulegate_patch::PullRequestPatches;
use tracing_subscriber::EnvFilter;

struct Args {
    rule_path: PathBuf,
    snapshot_path: PathBuf,
    log_mode: LogMode,
}

fn usage() -> ! {
    eprintln!("usage: rulegate <rule.js> <changeset.json> [--log-mode drop|console|capture]");
    std::process::exit(2);
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut log_mode = LogMode::Capture;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("rulegate {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => usage(),
            "--log-mode" => {
                let value = args.next().unwrap_or_else(|| usage());
                log_mode = match value.as_str() {
                    "drop" => LogMode::Drop,
                    "console" => LogMode::Console,
                    "capture" => LogMode::Capture,
                    other => anyhow::bail!("unknown log mode '{other}'"),
                };
            }
            other if other.starts_with('-') => anyhow::bail!("unknown flag '{other}'"),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    if positional.len() != 2 {
        usage();
    }
    let snapshot_path = positional.pop().expect("length checked");
    let rule_path = positional.pop().expect("length checked");

    Ok(Args {
        rule_path,
        snapshot_path,
        log_mode,
    })
}

async fn run() -> Result<bool> {
    let args = parse_args()?;

    let rule = std::fs::read_to_string(&args.rule_path)
        .with_context(|| format!("failed to read rule from {}", args.rule_path.display()))?;
    let snapshot = std::fs::read_to_string(&args.snapshot_path).with_context(|| {
        format!(
            "failed to read change-set snapshot from {}",
            args.snapshot_path.display()
        )
    })?;
    let patches: PullRequestPatches = serde_json::from_str(&snapshot).with_context(|| {
        format!(
            "{} is not a valid change-set snapshot",
            args.snapshot_path.display()
        )
    })?;

    let executor = RuleExecutor::new(EngineConfig {
        log_mode: args.log_mode,
        ..EngineConfig::default()
    });

    let evaluation = executor
        .run_rule(&rule, &patches.patch_list, &patches.metadata)
        .await
        .context("rule evaluation failed")?;

    for entry in &evaluation.logs {
        eprintln!("[{:?}] {}", entry.level, entry.msg);
    }
    println!("{}", if evaluation.approve { "approve" } else { "reject" });

    Ok(evaluation.approve)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "evaluation aborted");
            for cause in e.chain().skip(1) {
                tracing::error!("  caused by: {cause}");
            }
            ExitCode::from(2)
        }
    }
}
