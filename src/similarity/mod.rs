//! Confidence-weighted vehicle similarity.
//!
//! `Scorer::score` combines three attribute gates (type, manufacturer,
//! colour), box overlap and damage agreement into a 0-100 score. Weights
//! come from [`weights::allocate`].
//!
//! Symmetry is not part of the contract. Callers always pass the stored
//! record first and the fresh detection second, and a tuned attribute floor
//! or a future per-side weighting may legitimately make `score(a, b)` differ
//! from `score(b, a)` when the two sides carry different confidences. With
//! the default configuration every term averages both sides, so swapped
//! arguments happen to agree.

mod damage;
mod geometry;
pub mod weights;

pub use damage::damage_score;
pub use geometry::{boosted_iou, iou, IOU_EPSILON};
pub use weights::{allocate, clamp_confidence, damage_weight, FeatureWeights};

use crate::error::EngineError;
use crate::vehicle::VehicleAttributes;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 70.0;
pub const DEFAULT_BASE_TOTAL_WEIGHT: f64 = 0.95;
pub const DEFAULT_DAMAGE_BASE_WEIGHT: f64 = 0.05;
pub const DEFAULT_IOU_BOOST_THRESHOLD: f64 = 0.5;
pub const DEFAULT_IOU_BOOST_FLOOR: f64 = 0.95;

/// Tunables for scoring and match decisions.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoringConfig {
    /// Minimum score (0-100) for a candidate to count as the same vehicle.
    pub match_threshold: f64,
    /// Minimum credit for an agreeing attribute.
    pub attribute_floor: f64,
    /// Total weight spread evenly when no attribute confidence exists.
    pub base_total_weight: f64,
    pub damage_base_weight: f64,
    pub iou_boost_threshold: f64,
    pub iou_boost_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            attribute_floor: 0.0,
            base_total_weight: DEFAULT_BASE_TOTAL_WEIGHT,
            damage_base_weight: DEFAULT_DAMAGE_BASE_WEIGHT,
            iou_boost_threshold: DEFAULT_IOU_BOOST_THRESHOLD,
            iou_boost_floor: DEFAULT_IOU_BOOST_FLOOR,
        }
    }
}

/// Per-feature match scores, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FeatureScores {
    pub kind: f64,
    pub manufacturer: f64,
    pub color: f64,
    pub bbox: f64,
    pub damage: f64,
}

/// A score together with the parts it was computed from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub weights: FeatureWeights,
    pub features: FeatureScores,
}

#[derive(Clone, Debug, Default)]
pub struct Scorer {
    cfg: ScoringConfig,
}

impl Scorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    /// Similarity of two vehicles on a 0-100 scale, rounded to 2 decimals.
    pub fn score<A, B>(&self, a: &A, b: &B) -> Result<f64, EngineError>
    where
        A: AsRef<VehicleAttributes>,
        B: AsRef<VehicleAttributes>,
    {
        Ok(self.breakdown(a, b)?.total)
    }

    pub fn is_match(&self, score: f64) -> bool {
        score >= self.cfg.match_threshold
    }

    pub fn breakdown<A, B>(&self, a: &A, b: &B) -> Result<ScoreBreakdown, EngineError>
    where
        A: AsRef<VehicleAttributes>,
        B: AsRef<VehicleAttributes>,
    {
        let a = a.as_ref();
        let b = b.as_ref();
        a.validate()?;
        b.validate()?;

        let weights = allocate(a, b, &self.cfg);
        let features = FeatureScores {
            kind: self.attribute_score(&a.kind, &b.kind, a.kind_confidence, b.kind_confidence),
            manufacturer: self.attribute_score(
                &a.manufacturer,
                &b.manufacturer,
                a.manufacturer_confidence,
                b.manufacturer_confidence,
            ),
            color: self.attribute_score(&a.color, &b.color, a.color_confidence, b.color_confidence),
            bbox: boosted_iou(
                &a.bbox,
                &b.bbox,
                self.cfg.iou_boost_threshold,
                self.cfg.iou_boost_floor,
            ),
            damage: damage_score(&a.details, &b.details),
        };

        let weighted = weights.kind * features.kind
            + weights.manufacturer * features.manufacturer
            + weights.color * features.color
            + weights.bbox * features.bbox
            + weights.damage * features.damage;

        // the additive damage weight can push a perfect pair past 100
        let total = round2(weighted * 100.0).clamp(0.0, 100.0);

        Ok(ScoreBreakdown {
            total,
            weights,
            features,
        })
    }

    /// Confidence credit for an attribute, gated on case-insensitive equality.
    fn attribute_score(&self, a: &str, b: &str, conf_a: f64, conf_b: f64) -> f64 {
        if a.to_lowercase() != b.to_lowercase() {
            return 0.0;
        }
        let avg = (clamp_confidence(conf_a) + clamp_confidence(conf_b)) / 2.0;
        avg.max(self.cfg.attribute_floor)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
