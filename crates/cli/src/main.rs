//! stepline CLI - replay and inspect recorded tracking sessions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::Level;

use stepline_core::{Observation, Preset, QuotaConfig, SessionId, SessionLog, Timeline};
use stepline_session::{PresetRegistry, QuotaRegistry, SessionManager};

#[derive(Parser)]
#[command(name = "stepline")]
#[command(about = "Step-progress tracking over recorded vision observations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session and print its timelines and alarms
    Replay {
        /// Session file (JSON)
        file: PathBuf,
    },
    /// Segment a recorded session offline and print the timeline
    Segment {
        /// Session file (JSON)
        file: PathBuf,
    },
    /// Aggregate per-step statistics across session files
    Stats {
        /// Session files (JSON) sharing one preset
        files: Vec<PathBuf>,
    },
}

/// On-disk form of a recorded session: the preset, its quota
/// configuration, and every observation batch keyed by ms since start.
#[derive(Deserialize)]
struct SessionFile {
    preset: Preset,
    quota: QuotaConfig,
    #[serde(default)]
    user: Option<String>,
    observations: BTreeMap<i64, Vec<Observation>>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { file } => replay(&file),
        Commands::Segment { file } => segment(&file),
        Commands::Stats { files } => stats(&files),
    }
}

fn replay(path: &Path) -> Result<()> {
    let file = load(path)?;
    let user = file.user.clone().unwrap_or_else(|| "local".to_string());

    let mut presets = PresetRegistry::new();
    presets.register(file.preset.clone());
    let mut quotas = QuotaRegistry::new();
    quotas.insert(file.preset.name.clone(), file.quota.clone());

    let mut manager = SessionManager::new(presets, quotas);
    manager.start(&user, &file.preset.name)?;
    for (ts, batch) in &file.observations {
        manager.ingest(&user, *ts, batch)?;
    }

    println!("Most probable step: {}", manager.most_probable(&user)?.name);

    println!("Progress:");
    for bar in manager.progress_bars(&user)? {
        println!(
            "  {:>3} | {:<20} | {:>6.1}% | quota {:.1}s",
            bar.index,
            bar.name,
            bar.progress * 100.0,
            bar.quota,
        );
    }

    let alarms = manager.alarms(&user)?;
    println!("Alarms ({})", alarms.len());
    for alarm in alarms {
        println!(
            "  [{:?}] {} - {} ({}%)",
            alarm.severity, alarm.message, alarm.description, alarm.percentage,
        );
    }

    let log = manager.stop(&user)?;
    let raw = stepline_review::raw_timeline(&log, &file.preset, &file.quota);
    print_timeline("Timeline", &raw);
    let cleaned = stepline_review::clean(&raw);
    print_timeline("Transitions", &cleaned);
    let dwell = stepline_review::filter_by_dwell(&raw, log.duration_ms());
    print_timeline("Significant dwell (keyed by dwell ms)", &dwell);
    Ok(())
}

fn segment(path: &Path) -> Result<()> {
    let file = load(path)?;
    let log = to_log(&file);
    let timeline = stepline_review::offline_timeline(&log, &file.preset);
    if timeline.is_empty() {
        println!("No partition available for {}", path.display());
        return Ok(());
    }
    print_timeline("Segments", &timeline);
    Ok(())
}

fn stats(paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        bail!("no session files given");
    }
    let mut logs = Vec::new();
    let mut reference: Option<(Preset, QuotaConfig)> = None;
    for path in paths {
        let file = load(path)?;
        if let Some((preset, _)) = &reference {
            if preset.name != file.preset.name {
                bail!(
                    "session file {} uses preset '{}', expected '{}'",
                    path.display(),
                    file.preset.name,
                    preset.name,
                );
            }
        } else {
            reference = Some((file.preset.clone(), file.quota.clone()));
        }
        logs.push(to_log(&file));
    }
    let (preset, quota) = reference.context("no session files parsed")?;

    println!("Step statistics over {} session(s):", logs.len());
    for stat in stepline_review::step_stats(&logs, &preset, &quota) {
        println!(
            "  {:<20} | mean {:>8.1}ms | stddev {:>8.1}ms",
            stat.step_name, stat.average_ms, stat.std_dev_ms,
        );
    }
    Ok(())
}

fn load(path: &Path) -> Result<SessionFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading session file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing session file {}", path.display()))
}

fn to_log(file: &SessionFile) -> SessionLog {
    let start = chrono::Utc::now();
    let duration = file.observations.keys().next_back().copied().unwrap_or(0);
    SessionLog {
        id: SessionId::new(),
        user: file.user.clone().unwrap_or_else(|| "local".to_string()),
        preset_name: file.preset.name.clone(),
        start_time: start,
        end_time: start + chrono::Duration::milliseconds(duration),
        observations: file.observations.clone(),
    }
}

fn print_timeline(title: &str, timeline: &Timeline) {
    println!("{} ({})", title, timeline.len());
    for (ts, step) in timeline {
        println!("  {:>8}ms | {} {}", ts, step.number, step.name);
    }
}
