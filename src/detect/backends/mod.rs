pub mod fixed;
pub mod sidecar;

pub use fixed::{NoDamage, StaticDetector};
pub use sidecar::SidecarDetector;
