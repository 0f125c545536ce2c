use anyhow::Context;
use atn_backend::InMemoryBackend;
use atn_core::constants::{BACKEND_TIMEOUT_ENV, THRESHOLDS_FILE_ENV};
use atn_core::{CoreConfig, WorkflowController};
use atn_engine::{
    classify_patient, map_to_diagnosis, BiomarkerPanel, CognitiveContext, DiagnosisResult,
    ThresholdTable,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod episode;

use episode::Episode;

#[derive(Parser)]
#[command(name = "atn")]
#[command(about = "Staged ATN biomarker classification CLI")]
struct Cli {
    /// YAML threshold table to use instead of the built-in rows
    #[arg(long, global = true)]
    thresholds_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the threshold table
    Thresholds {
        /// Print as YAML, in the format accepted by --thresholds-file
        #[arg(long)]
        yaml: bool,
    },
    /// Classify a biomarker panel read from a JSON file
    Classify {
        /// File holding `{ "panel": {...}, "cognitive": {...} }`
        input: PathBuf,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay a workflow episode against the in-memory backend
    Run {
        /// Episode JSON file
        episode: PathBuf,
    },
}

/// Input of the `classify` command.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassifyInput {
    panel: BiomarkerPanel,
    #[serde(default)]
    cognitive: CognitiveContext,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("atn=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let thresholds_file = cli
        .thresholds_file
        .map(|p| p.display().to_string())
        .or_else(|| std::env::var(THRESHOLDS_FILE_ENV).ok());
    let cfg = CoreConfig::from_env_values(std::env::var(BACKEND_TIMEOUT_ENV).ok(), thresholds_file)
        .context("Invalid configuration")?;

    match cli.command {
        Some(Commands::Thresholds { yaml }) => {
            if yaml {
                print!("{}", cfg.thresholds().to_yaml()?);
            } else {
                for line in threshold_lines(cfg.thresholds()) {
                    println!("{line}");
                }
            }
        }
        Some(Commands::Classify { input, json }) => {
            let result = classify_file(&input, cfg.thresholds())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for line in summary_lines(&result) {
                    println!("{line}");
                }
            }
        }
        Some(Commands::Run { episode }) => {
            let episode = Episode::load(&episode)?;
            let backend = Arc::new(InMemoryBackend::new(cfg.thresholds_arc()));
            let mut ctl = WorkflowController::new(backend, cfg);
            let view = episode.replay(&mut ctl).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        None => {
            println!("Use 'atn --help' for commands");
        }
    }

    Ok(())
}

fn threshold_lines(table: &ThresholdTable) -> Vec<String> {
    table
        .rows()
        .map(|row| {
            format!(
                "{:<18} {:<14} {} {} {} ({})",
                row.axis.to_string(),
                row.method.as_str(),
                row.marker,
                row.positive_when,
                row.cutoff,
                row.marker.unit()
            )
        })
        .collect()
}

fn classify_file(path: &Path, table: &ThresholdTable) -> anyhow::Result<DiagnosisResult> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let input: ClassifyInput =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let profile = classify_patient(&input.panel, table);
    Ok(map_to_diagnosis(&profile, &input.cognitive))
}

fn summary_lines(result: &DiagnosisResult) -> Vec<String> {
    let mut lines = vec![
        format!("ATN profile: {}", result.atn),
        format!("Diagnosis:   {}", result.label),
    ];
    if let Some(severity) = result.severity {
        lines.push(format!("Severity:    {severity}"));
    }
    if result.cognitive_impairment {
        lines.push("Screening:   cognitive impairment (MMSE/MoCA at or below cutoff)".to_owned());
    }
    for factor in &result.risk {
        lines.push(format!("Risk:        {factor}"));
    }
    for conflict in &result.conflicts {
        lines.push(format!("Conflict:    {} methods disagree", conflict.axis));
    }
    lines.extend(result.recommendations.iter().map(|r| format!("  - {r}")));
    lines
}
