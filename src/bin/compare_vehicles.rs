//! compare_vehicles - offline similarity check between two vehicle lists
//!
//! Scores every stored vehicle against every detected one and prints the
//! pairs at or above the match threshold, highest score first.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};

use vehicle_dedup::{Observation, Record, Scorer, ScoringConfig, VehicleList};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stored vehicles as {"vehicles": [...]}.
    #[arg(long)]
    stored: PathBuf,
    /// Detected vehicles as {"vehicles": [...]}.
    #[arg(long)]
    detected: PathBuf,
    /// Match threshold on the 0-100 scale.
    #[arg(long, default_value_t = vehicle_dedup::similarity::DEFAULT_MATCH_THRESHOLD)]
    threshold: f64,
    /// Print every scored pair, not only matches.
    #[arg(long)]
    all: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PairScore {
    stored_id: String,
    stored_index: usize,
    detected_index: usize,
    score: f64,
    matched: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if !(0.0..=100.0).contains(&args.threshold) {
        return Err(anyhow!("threshold must be within [0, 100]"));
    }

    let stored: VehicleList<Record> = read_list(&args.stored)?;
    let detected: VehicleList<Observation> = read_list(&args.detected)?;
    let scorer = Scorer::new(ScoringConfig {
        match_threshold: args.threshold,
        ..ScoringConfig::default()
    });

    let mut pairs = Vec::new();
    for (i, record) in stored.vehicles.iter().enumerate() {
        for (j, observation) in detected.vehicles.iter().enumerate() {
            let score = match scorer.score(record, observation) {
                Ok(score) => score,
                Err(e) => {
                    log::warn!("skipping stored {} / detected {}: {}", i, j, e);
                    continue;
                }
            };
            let matched = scorer.is_match(score);
            if matched || args.all {
                pairs.push(PairScore {
                    stored_id: record.id.clone(),
                    stored_index: i,
                    detected_index: j,
                    score,
                    matched,
                });
            }
        }
    }
    pairs.sort_by(|a, b| b.score.total_cmp(&a.score));

    log::info!(
        "{} stored x {} detected: {} matching pairs",
        stored.vehicles.len(),
        detected.vehicles.len(),
        pairs.iter().filter(|p| p.matched).count()
    );
    println!("{}", serde_json::to_string_pretty(&pairs)?);
    Ok(())
}

fn read_list<T: serde::de::DeserializeOwned>(path: &Path) -> Result<VehicleList<T>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid vehicle list {}", path.display()))
}
