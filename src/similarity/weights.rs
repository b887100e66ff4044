//! Confidence-driven feature weights.
//!
//! The attribute weights follow the detector's confidence: the more certain
//! both sides were about an attribute, the more that attribute decides the
//! score. Box overlap takes whatever confidence the attributes lack. Damage
//! gets a small additive weight outside the normalisation.

use crate::vehicle::{DamageReport, VehicleAttributes};

use super::ScoringConfig;

/// Share of damage weight kept when only one side reports damage.
pub const ONE_SIDED_DAMAGE_FACTOR: f64 = 0.2;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FeatureWeights {
    pub kind: f64,
    pub manufacturer: f64,
    pub color: f64,
    pub bbox: f64,
    pub damage: f64,
}

impl FeatureWeights {
    /// Sum of the four normalised weights (damage excluded).
    pub fn normalized_sum(&self) -> f64 {
        self.kind + self.manufacturer + self.color + self.bbox
    }
}

/// Clamps a detector confidence into `[0, 1]`; NaN counts as no confidence.
#[inline]
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[inline]
fn average(a: f64, b: f64) -> f64 {
    (clamp_confidence(a) + clamp_confidence(b)) / 2.0
}

/// Derives the per-feature weights for comparing `a` against `b`.
pub fn allocate(a: &VehicleAttributes, b: &VehicleAttributes, cfg: &ScoringConfig) -> FeatureWeights {
    let kind = average(a.kind_confidence, b.kind_confidence);
    let manufacturer = average(a.manufacturer_confidence, b.manufacturer_confidence);
    let color = average(a.color_confidence, b.color_confidence);
    let damage = damage_weight(&a.details, &b.details, cfg.damage_base_weight);

    let total = kind + manufacturer + color;
    if total <= 0.0 {
        // no attribute signal at all
        let equal = cfg.base_total_weight / 4.0;
        return FeatureWeights {
            kind: equal,
            manufacturer: equal,
            color: equal,
            bbox: equal,
            damage,
        };
    }

    let bbox = (1.0 - total / 3.0).clamp(0.0, 1.0);
    let raw_sum = kind + manufacturer + color + bbox;

    FeatureWeights {
        kind: kind / raw_sum,
        manufacturer: manufacturer / raw_sum,
        color: color / raw_sum,
        bbox: bbox / raw_sum,
        damage,
    }
}

/// Additive damage weight.
///
/// Agreement on "no damage" keeps the base weight. Damage on only one side
/// keeps a fifth of it. Damage on both sides scales it by the average of the
/// two mean class confidences, capped at 1.
pub fn damage_weight(a: &DamageReport, b: &DamageReport, base: f64) -> f64 {
    match (a.has_damage(), b.has_damage()) {
        (false, false) => base,
        (true, false) | (false, true) => base * ONE_SIDED_DAMAGE_FACTOR,
        (true, true) => {
            let avg = (a.mean_confidence() + b.mean_confidence()) / 2.0;
            base * clamp_confidence(avg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(kind: f64, manufacturer: f64, color: f64) -> VehicleAttributes {
        VehicleAttributes {
            kind: "car".into(),
            kind_confidence: kind,
            manufacturer: "Toyota".into(),
            manufacturer_confidence: manufacturer,
            color: "red".into(),
            color_confidence: color,
            ..VehicleAttributes::default()
        }
    }

    fn damage(classes: &[&str], confidences: &[f64]) -> DamageReport {
        DamageReport {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            confidences: confidences.to_vec(),
        }
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let cfg = ScoringConfig::default();
        let confidences = [0.01, 0.1, 0.33, 0.5, 0.77, 0.9, 1.0];
        for &k in &confidences {
            for &m in &confidences {
                for &c in &confidences {
                    let w = allocate(&attrs(k, m, c), &attrs(c, k, m), &cfg);
                    assert!(
                        (w.normalized_sum() - 1.0).abs() < 1e-9,
                        "{} {} {} -> {:?}",
                        k,
                        m,
                        c,
                        w
                    );
                }
            }
        }
    }

    #[test]
    fn confident_attributes_push_bbox_weight_down() {
        let cfg = ScoringConfig::default();
        let confident = allocate(&attrs(0.95, 0.95, 0.95), &attrs(0.95, 0.95, 0.95), &cfg);
        let unsure = allocate(&attrs(0.2, 0.2, 0.2), &attrs(0.2, 0.2, 0.2), &cfg);
        assert!(confident.bbox < unsure.bbox);
        assert!(confident.kind > unsure.kind);

        let certain = allocate(&attrs(1.0, 1.0, 1.0), &attrs(1.0, 1.0, 1.0), &cfg);
        assert_eq!(certain.bbox, 0.0);
    }

    #[test]
    fn zero_confidence_falls_back_to_equal_weights() {
        let cfg = ScoringConfig::default();
        let w = allocate(&attrs(0.0, 0.0, 0.0), &attrs(0.0, 0.0, 0.0), &cfg);
        let equal = cfg.base_total_weight / 4.0;
        assert_eq!(w.kind, equal);
        assert_eq!(w.manufacturer, equal);
        assert_eq!(w.color, equal);
        assert_eq!(w.bbox, equal);
        assert_eq!(w.damage, cfg.damage_base_weight);
    }

    #[test]
    fn out_of_range_confidences_are_clamped() {
        let cfg = ScoringConfig::default();
        let wild = allocate(&attrs(7.0, -3.0, f64::NAN), &attrs(1.5, -1.0, 0.5), &cfg);
        let tame = allocate(&attrs(1.0, 0.0, 0.0), &attrs(1.0, 0.0, 0.5), &cfg);
        assert_eq!(wild, tame);
        assert!((wild.normalized_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn damage_weight_policy() {
        let base = 0.05;
        let none = damage(&[], &[]);
        let dent = damage(&["dent"], &[0.8]);
        let scratch = damage(&["scratch", "dent"], &[0.4, 0.6]);

        assert_eq!(damage_weight(&none, &none, base), base);
        assert!((damage_weight(&dent, &none, base) - base * 0.2).abs() < 1e-12);
        assert!((damage_weight(&none, &dent, base) - base * 0.2).abs() < 1e-12);
        // (0.8 + 0.5) / 2
        assert!((damage_weight(&dent, &scratch, base) - base * 0.65).abs() < 1e-12);
    }

    #[test]
    fn damage_weight_is_capped() {
        let loud = damage(&["dent"], &[3.0]);
        assert_eq!(damage_weight(&loud, &loud, 0.05), 0.05);
        let silent = damage(&["dent"], &[]);
        assert_eq!(damage_weight(&silent, &silent, 0.05), 0.0);
    }
}
