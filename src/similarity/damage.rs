//! Damage class agreement.

use std::collections::HashSet;

use crate::vehicle::DamageReport;

/// Share of damage classes both sides agree on, relative to the larger set.
///
/// Duplicate labels count once. Two reports without damage agree fully.
pub fn damage_score(a: &DamageReport, b: &DamageReport) -> f64 {
    let left: HashSet<&str> = a.classes.iter().map(String::as_str).collect();
    let right: HashSet<&str> = b.classes.iter().map(String::as_str).collect();

    let largest = left.len().max(right.len());
    if largest == 0 {
        return 1.0;
    }
    left.intersection(&right).count() as f64 / largest as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(classes: &[&str]) -> DamageReport {
        DamageReport {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            confidences: vec![0.5; classes.len()],
        }
    }

    #[test]
    fn both_empty_is_full_agreement() {
        assert_eq!(damage_score(&report(&[]), &report(&[])), 1.0);
    }

    #[test]
    fn one_sided_damage_scores_zero() {
        assert_eq!(damage_score(&report(&["dent"]), &report(&[])), 0.0);
        assert_eq!(damage_score(&report(&[]), &report(&["dent"])), 0.0);
    }

    #[test]
    fn partial_overlap_uses_larger_set() {
        let a = report(&["dent", "scratch", "broken_lamp"]);
        let b = report(&["scratch", "dent"]);
        assert!((damage_score(&a, &b) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(damage_score(&a, &b), damage_score(&b, &a));
    }

    #[test]
    fn duplicates_and_order_are_ignored() {
        let a = report(&["dent", "dent", "scratch"]);
        let b = report(&["scratch", "dent"]);
        assert_eq!(damage_score(&a, &b), 1.0);
    }

    #[test]
    fn score_stays_in_unit_range() {
        let sets = [
            report(&[]),
            report(&["a"]),
            report(&["a", "b"]),
            report(&["b", "c", "c"]),
        ];
        for a in &sets {
            for b in &sets {
                let s = damage_score(a, b);
                assert!((0.0..=1.0).contains(&s));
            }
        }
    }
}
