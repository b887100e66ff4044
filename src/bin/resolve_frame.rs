//! resolve_frame - run one dedup cycle for a single image
//!
//! Reads an image and its detections, resolves them against the configured
//! registry and prints the cycle report as JSON. Exits with an error when
//! any observation failed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use vehicle_dedup::{
    config::EngineConfig,
    detect::{FrameProcessor, StaticDetector},
    Engine, Frame, Observation, VehicleList,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image the detections were taken from.
    #[arg(long)]
    image: PathBuf,
    /// Detections as {"vehicles": [...]} (defaults to the image's .json sidecar).
    #[arg(long)]
    detections: Option<PathBuf>,
    /// Camera id (overrides configuration).
    #[arg(long, env = "VEHICLE_CAMERA_ID")]
    camera: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = EngineConfig::load()?;
    let camera_id = args.camera.unwrap_or_else(|| config.camera_id.clone());

    let detections_path = args
        .detections
        .unwrap_or_else(|| args.image.with_extension("json"));
    let raw = std::fs::read_to_string(&detections_path)
        .with_context(|| format!("read detections {}", detections_path.display()))?;
    let detections: VehicleList<Observation> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid detections {}", detections_path.display()))?;

    let frame = Frame::open(camera_id, &args.image)?;
    let mut processor = FrameProcessor::new(Box::new(StaticDetector::new(detections.vehicles)));
    let observations = processor.process(&frame)?;

    let mut engine = Engine::new(
        config.scorer(),
        config.build_registry()?,
        config.build_onboarder()?,
    )
    .with_alert_after(config.alert_after_secs);
    let report = engine.run_cycle(&frame, observations)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    report.into_result()?;
    Ok(())
}
