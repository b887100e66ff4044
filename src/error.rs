use std::fmt;

use thiserror::Error;

/// External collaborators the engine depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collaborator {
    Registry,
    BlobStore,
    Blur,
    Detector,
    DamageClassifier,
    Scratch,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collaborator::Registry => "registry",
            Collaborator::BlobStore => "blob store",
            Collaborator::Blur => "blur",
            Collaborator::Detector => "detector",
            Collaborator::DamageClassifier => "damage classifier",
            Collaborator::Scratch => "scratch storage",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// An observation is missing one of its identity fields.
    #[error("invalid observation: missing required field '{field}'")]
    InvalidObservation { field: &'static str },

    /// A collaborator call failed; nothing was fabricated in its place.
    #[error("{collaborator} unavailable: {source}")]
    CollaboratorUnavailable {
        collaborator: Collaborator,
        #[source]
        source: anyhow::Error,
    },

    /// Aggregated failure of a dedup cycle.
    #[error("dedup cycle failed for {failed} of {total} observations (first: {first})")]
    CycleFailed {
        failed: usize,
        total: usize,
        first: String,
    },
}

impl EngineError {
    pub fn unavailable(collaborator: Collaborator, source: anyhow::Error) -> Self {
        EngineError::CollaboratorUnavailable {
            collaborator,
            source,
        }
    }

    /// Collaborator named by a `CollaboratorUnavailable` error.
    pub fn collaborator(&self) -> Option<Collaborator> {
        match self {
            EngineError::CollaboratorUnavailable { collaborator, .. } => Some(*collaborator),
            _ => None,
        }
    }
}
