//! Inspect persisted rollout aggregates

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use runtime::{AggregateDocument, AggregateRepository, FileAggregateRepository, LevelAggregate};

use super::OutputFormat;
use crate::dirs;

/// Show persisted daily rollout aggregates
#[derive(Parser)]
pub struct Report {
    /// Custom data directory (defaults to platform-specific location)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Only show this level
    #[arg(short, long, value_name = "LEVEL")]
    level: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

impl Report {
    pub fn execute(self) -> Result<()> {
        let dir = self.data_dir.unwrap_or_else(dirs::data_dir);
        let repository = FileAggregateRepository::in_dir(&dir)?;
        let document = repository
            .load()
            .with_context(|| format!("Failed to read {}", repository.path().display()))?;

        match self.format {
            OutputFormat::Summary => print_summary(&document, self.level, &repository),
            OutputFormat::Json => {
                let filtered = filter(&document, self.level);
                println!("{}", serde_json::to_string_pretty(&filtered)?);
            }
        }
        Ok(())
    }
}

fn filter(document: &AggregateDocument, level: Option<u32>) -> serde_json::Value {
    let days: serde_json::Map<_, _> = document
        .days()
        .filter_map(|(day, levels)| {
            let levels: serde_json::Map<_, _> = levels
                .iter()
                .filter(|(key, _)| level.is_none_or(|level| **key == runtime::level_key(level)))
                .filter_map(|(key, aggregate)| {
                    serde_json::to_value(aggregate).ok().map(|value| (key.clone(), value))
                })
                .collect();
            (!levels.is_empty()).then(|| (day.to_string(), serde_json::Value::Object(levels)))
        })
        .collect();
    serde_json::Value::Object(days)
}

fn print_summary(
    document: &AggregateDocument,
    level: Option<u32>,
    repository: &FileAggregateRepository,
) {
    println!("{}", style("=== Rollout Aggregates ===").bold().cyan());
    println!("File: {}", repository.path().display());

    if document.is_empty() {
        println!();
        println!("{}", style("No sessions recorded yet").yellow());
        return;
    }

    for (day, levels) in document.days() {
        let rows: Vec<_> = levels
            .iter()
            .filter(|(key, _)| level.is_none_or(|level| **key == runtime::level_key(level)))
            .collect();
        if rows.is_empty() {
            continue;
        }

        println!();
        println!("{}", style(day).bold());
        for (key, aggregate) in rows {
            print_level(key, aggregate);
        }
    }
}

fn print_level(key: &str, aggregate: &LevelAggregate) {
    let stuck = if aggregate.avg_stuck_rate > 0.10 {
        style(format!("{:.3}", aggregate.avg_stuck_rate)).red()
    } else {
        style(format!("{:.3}", aggregate.avg_stuck_rate)).green()
    };
    println!(
        "  {key:<10} sessions {:>3}  samples {:>7}  stuck rate {}  avg speed {:.1}",
        aggregate.sessions, aggregate.samples, stuck, aggregate.avg_velocity
    );
    println!(
        "             stuck events {}  fallbacks {}  anomalies {}  transitions {}",
        aggregate.stuck_events,
        aggregate.fallback_triggers,
        aggregate.anomalies,
        aggregate.state_transitions
    );
}
