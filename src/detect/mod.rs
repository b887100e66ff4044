//! Vehicle detection collaborators.

mod backend;
pub mod backends;
mod processor;

pub use backend::{DamageClassifier, VehicleDetector};
pub use backends::{NoDamage, SidecarDetector, StaticDetector};
pub use processor::FrameProcessor;
