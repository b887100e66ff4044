//! Vehicle identity resolution and deduplication.
//!
//! Each frame's detected vehicles are resolved against the Records a registry
//! already holds for that camera. A detection that scores at or above the
//! match threshold against a stored Record updates that Record; anything else
//! is onboarded as a new Record with a blurred crop in blob storage.
//!
//! # Module Structure
//!
//! - `vehicle`: Observation / Record wire types
//! - `similarity`: box overlap, damage agreement, confidence weights, scorer
//! - `matching`: greedy resolution and the dedup cycle
//! - `onboard`: crop, blur, upload, create
//! - `registry`, `blob`, `blur`, `detect`: collaborator traits and backends
//! - `frame`: decoded frames and the directory frame source
//! - `lifecycle`: start/stop control for the streaming loop
//! - `config`: file and environment configuration

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod blob;
pub mod blur;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod matching;
pub mod onboard;
pub mod registry;
pub mod similarity;
pub mod vehicle;

pub use error::{Collaborator, EngineError};
pub use frame::{DirectorySource, Frame};
pub use lifecycle::{FramePipeline, StopSignal, StreamController, StreamStats};
pub use matching::{resolve, CycleReport, Decision, Engine};
pub use onboard::Onboarder;
pub use registry::{RegistryAck, VehicleRegistry};
pub use similarity::{ScoreBreakdown, Scorer, ScoringConfig};
pub use vehicle::{BoundingBox, DamageReport, Observation, Record, VehicleAttributes, VehicleList};

/// Current time in seconds since the Unix epoch.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64)
}
