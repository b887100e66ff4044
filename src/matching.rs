//! Greedy identity resolution and the dedup cycle.
//!
//! Observations are resolved in detection order against the candidates
//! fetched at cycle start. Each observation takes the first candidate, in
//! registry order, that scores at or above the match threshold; that
//! candidate is then consumed for the rest of the cycle. There is no
//! backtracking, so an earlier observation can take a candidate that a later
//! one would have matched better.

use serde::{Serialize, Serializer};

use crate::error::{Collaborator, EngineError};
use crate::frame::Frame;
use crate::onboard::Onboarder;
use crate::registry::{RegistryAck, VehicleRegistry};
use crate::similarity::Scorer;
use crate::vehicle::{datetime_from_epoch, Observation, Record};

pub const DEFAULT_ALERT_AFTER_SECS: u64 = 600;

/// Resolution of a single observation.
#[derive(Debug)]
pub enum Decision {
    /// Matched the candidate at this index of the fetched list.
    Matched { candidate: usize, score: f64 },
    /// No remaining candidate reached the threshold.
    Unmatched { best_score: Option<f64> },
    Rejected(EngineError),
}

/// Resolves every observation against `candidates`.
///
/// Candidates are consumed by index, so two field-for-field identical
/// Records are still two distinct candidates. Candidates missing an identity
/// field are never matched.
pub fn resolve(
    observations: &[Observation],
    candidates: &[Record],
    scorer: &Scorer,
) -> Vec<Decision> {
    let mut available: Vec<usize> = Vec::with_capacity(candidates.len());
    for (idx, record) in candidates.iter().enumerate() {
        match record.attributes.validate() {
            Ok(()) => available.push(idx),
            Err(e) => log::warn!("ignoring candidate {}: {}", record.id, e),
        }
    }

    observations
        .iter()
        .map(|observation| {
            if let Err(e) = observation.attributes.validate() {
                return Decision::Rejected(e);
            }
            let mut best: Option<f64> = None;
            let mut hit = None;
            for (pos, &idx) in available.iter().enumerate() {
                let score = match scorer.score(&candidates[idx], observation) {
                    Ok(score) => score,
                    Err(e) => return Decision::Rejected(e),
                };
                if scorer.is_match(score) {
                    hit = Some((pos, idx, score));
                    break;
                }
                best = Some(best.map_or(score, |b: f64| b.max(score)));
            }
            match hit {
                Some((pos, candidate, score)) => {
                    available.remove(pos);
                    Decision::Matched { candidate, score }
                }
                None => Decision::Unmatched { best_score: best },
            }
        })
        .collect()
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Update {
    pub index: usize,
    pub record_id: String,
    pub score: f64,
    pub alert: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Creation {
    pub index: usize,
    /// Assigned id; `None` when the create request was queued.
    pub record_id: Option<String>,
    pub best_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ObservationFailure {
    pub index: usize,
    #[serde(serialize_with = "display")]
    pub error: EngineError,
}

/// What a dedup cycle did, observation by observation.
#[derive(Debug, Default, Serialize)]
pub struct CycleReport {
    pub camera_id: String,
    pub observations: usize,
    pub updated: Vec<Update>,
    pub created: Vec<Creation>,
    pub failures: Vec<ObservationFailure>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapses the report into the single aggregated cycle error when any
    /// observation failed.
    pub fn into_result(self) -> Result<CycleReport, EngineError> {
        match self.failures.first() {
            None => Ok(self),
            Some(first) => Err(EngineError::CycleFailed {
                failed: self.failures.len(),
                total: self.observations,
                first: first.error.to_string(),
            }),
        }
    }
}

fn display<S: Serializer>(error: &EngineError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Runs dedup cycles for one camera against a registry.
pub struct Engine<R: VehicleRegistry = Box<dyn VehicleRegistry>> {
    scorer: Scorer,
    registry: R,
    onboarder: Onboarder,
    alert_after_secs: u64,
}

impl<R: VehicleRegistry> Engine<R> {
    pub fn new(scorer: Scorer, registry: R, onboarder: Onboarder) -> Self {
        Self {
            scorer,
            registry,
            onboarder,
            alert_after_secs: DEFAULT_ALERT_AFTER_SECS,
        }
    }

    pub fn with_alert_after(mut self, secs: u64) -> Self {
        self.alert_after_secs = secs;
        self
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    /// Runs one dedup cycle over a frame's observations.
    ///
    /// A failed candidate fetch aborts the cycle before any request is made.
    /// Any other failure is confined to its observation and recorded in the
    /// report; the remaining observations are still processed.
    pub fn run_cycle(
        &mut self,
        frame: &Frame,
        observations: Vec<Observation>,
    ) -> Result<CycleReport, EngineError> {
        let candidates = self
            .registry
            .candidates(&frame.camera_id)
            .map_err(|e| EngineError::unavailable(Collaborator::Registry, e))?;

        let decisions = resolve(&observations, &candidates, &self.scorer);
        let mut report = CycleReport {
            camera_id: frame.camera_id.clone(),
            observations: observations.len(),
            ..CycleReport::default()
        };

        let resolved = observations.into_iter().zip(decisions).enumerate();
        for (index, (observation, decision)) in resolved {
            match decision {
                Decision::Matched { candidate, score } => {
                    let record = &candidates[candidate];
                    log::debug!(
                        "observation {} matched {} with score {:.2}",
                        index,
                        record.id,
                        score
                    );
                    let seen_at = datetime_from_epoch(frame.captured_at);
                    let touched = record.touched(seen_at, self.alert_after_secs);
                    match self.registry.update(&touched) {
                        Ok(()) => report.updated.push(Update {
                            index,
                            record_id: touched.id.clone(),
                            score,
                            alert: touched.alert,
                        }),
                        Err(e) => {
                            log::warn!("update of {} failed: {:#}", touched.id, e);
                            report.failures.push(ObservationFailure {
                                index,
                                error: EngineError::unavailable(Collaborator::Registry, e),
                            });
                        }
                    }
                }
                Decision::Unmatched { best_score } => {
                    log::debug!(
                        "observation {} unmatched (best score {:?}), onboarding",
                        index,
                        best_score
                    );
                    match self.onboarder.onboard(frame, observation, &mut self.registry) {
                        Ok(ack) => report.created.push(Creation {
                            index,
                            record_id: match ack {
                                RegistryAck::Created(record) => Some(record.id),
                                RegistryAck::Queued => None,
                            },
                            best_score,
                        }),
                        Err(error) => {
                            log::warn!("onboarding observation {} failed: {}", index, error);
                            report.failures.push(ObservationFailure { index, error });
                        }
                    }
                }
                Decision::Rejected(error) => {
                    log::warn!("rejected observation {}: {}", index, error);
                    report.failures.push(ObservationFailure { index, error });
                }
            }
        }

        log::info!(
            "cycle on camera {}: {} observations, {} updated, {} created, {} failed",
            report.camera_id,
            report.observations,
            report.updated.len(),
            report.created.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::{BoundingBox, VehicleAttributes};

    fn attrs(manufacturer: &str, left: u32) -> VehicleAttributes {
        VehicleAttributes {
            kind: "car".into(),
            kind_confidence: 0.9,
            manufacturer: manufacturer.into(),
            manufacturer_confidence: 0.9,
            color: "red".into(),
            color_confidence: 0.9,
            bbox: BoundingBox::new(left, 10, 50, 50),
            ..VehicleAttributes::default()
        }
    }

    fn record(id: &str, manufacturer: &str, left: u32) -> Record {
        Record {
            id: id.into(),
            attributes: attrs(manufacturer, left),
            ..Record::default()
        }
    }

    fn obs(manufacturer: &str, left: u32) -> Observation {
        Observation::new(attrs(manufacturer, left))
    }

    #[test]
    fn first_qualifying_candidate_wins() {
        let scorer = Scorer::default();
        let candidates = vec![
            record("honda", "Honda", 10),
            record("toyota-a", "Toyota", 12),
            record("toyota-b", "Toyota", 10),
        ];
        let decisions = resolve(&[obs("Toyota", 10)], &candidates, &scorer);
        // toyota-b is a better fit but toyota-a comes first and qualifies
        assert!(matches!(decisions[0], Decision::Matched { candidate: 1, .. }));
    }

    #[test]
    fn matched_candidate_is_consumed() {
        let scorer = Scorer::default();
        let candidates = vec![record("v-1", "Toyota", 10)];
        let decisions = resolve(&[obs("Toyota", 12), obs("Toyota", 11)], &candidates, &scorer);
        assert!(matches!(decisions[0], Decision::Matched { candidate: 0, .. }));
        match &decisions[1] {
            Decision::Unmatched { best_score } => assert!(best_score.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn identical_records_are_distinct_candidates() {
        let scorer = Scorer::default();
        let twin = record("twin", "Toyota", 10);
        let candidates = vec![twin.clone(), twin];
        let decisions = resolve(&[obs("Toyota", 10), obs("Toyota", 10)], &candidates, &scorer);
        assert!(matches!(decisions[0], Decision::Matched { candidate: 0, .. }));
        assert!(matches!(decisions[1], Decision::Matched { candidate: 1, .. }));
    }

    #[test]
    fn unmatched_reports_best_score() {
        let scorer = Scorer::default();
        let candidates = vec![record("v-1", "Honda", 10)];
        match &resolve(&[obs("Toyota", 12)], &candidates, &scorer)[0] {
            Decision::Unmatched { best_score: Some(best) } => assert!(*best < 70.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_observation_is_rejected_without_consuming() {
        let scorer = Scorer::default();
        let candidates = vec![record("v-1", "Toyota", 10)];
        let decisions = resolve(&[obs("", 10), obs("Toyota", 10)], &candidates, &scorer);
        assert!(matches!(
            decisions[0],
            Decision::Rejected(EngineError::InvalidObservation { field: "manufacturer" })
        ));
        assert!(matches!(decisions[1], Decision::Matched { candidate: 0, .. }));
    }

    #[test]
    fn invalid_candidates_are_skipped() {
        let scorer = Scorer::default();
        let mut broken = record("broken", "Toyota", 10);
        broken.attributes.color.clear();
        let candidates = vec![broken, record("ok", "Toyota", 10)];
        let decisions = resolve(&[obs("Toyota", 10)], &candidates, &scorer);
        assert!(matches!(decisions[0], Decision::Matched { candidate: 1, .. }));
    }

    #[test]
    fn report_aggregates_failures() {
        let report = CycleReport {
            camera_id: "cam".into(),
            observations: 3,
            failures: vec![ObservationFailure {
                index: 1,
                error: EngineError::InvalidObservation { field: "type" },
            }],
            ..CycleReport::default()
        };
        match report.into_result() {
            Err(EngineError::CycleFailed { failed, total, first }) => {
                assert_eq!((failed, total), (1, 3));
                assert!(first.contains("type"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
