//! vehicled - streaming vehicle deduplication daemon
//!
//! This daemon:
//! 1. Loads configuration (VEHICLE_CONFIG + VEHICLE_* overrides)
//! 2. Polls the configured frame directory every interval
//! 3. Reads detections from each frame's JSON sidecar
//! 4. Resolves them against the registry, updating or onboarding vehicles
//! 5. Stops cleanly on Ctrl-C after the cycle in progress

use anyhow::{anyhow, Result};
use std::sync::mpsc;

use vehicle_dedup::{
    config::EngineConfig,
    detect::{FrameProcessor, SidecarDetector},
    DirectorySource, Engine, FramePipeline, StreamController,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::load()?;
    let source_dir = config
        .stream
        .source_dir
        .clone()
        .ok_or_else(|| anyhow!("stream.source_dir (or VEHICLE_SOURCE_DIR) must be set"))?;

    let registry = config.build_registry()?;
    log::info!(
        "camera {}: registry backend {}, match threshold {}",
        config.camera_id,
        registry.name(),
        config.scoring.match_threshold
    );
    let engine = Engine::new(config.scorer(), registry, config.build_onboarder()?)
        .with_alert_after(config.alert_after_secs);
    let mut processor = FrameProcessor::new(Box::new(SidecarDetector::new()));
    processor.warm_up()?;
    let source = DirectorySource::new(&source_dir, config.camera_id.clone())?;
    let mut pipeline = FramePipeline::new(source, processor, engine);

    let mut controller = StreamController::new(config.stream.interval);
    let signal = controller.stop_signal();
    controller.start(move || pipeline.drain(&signal).map(|_| ()))?;
    log::info!(
        "vehicled watching {} every {:?}",
        source_dir.display(),
        config.stream.interval
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("vehicled waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, finishing current cycle...");
    controller.stop();
    let stats = controller.join()?;
    log::info!(
        "vehicled stopped after {} cycles ({} failed)",
        stats.cycles,
        stats.failed_cycles
    );

    Ok(())
}
