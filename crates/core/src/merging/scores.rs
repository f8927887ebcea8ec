//! The consumption-score lattice: how happily one timeline item would
//! absorb another.

use std::sync::Arc;

use locus_domain::{ItemKind, Result, TimelineItem};
use serde::{Deserialize, Serialize};

use crate::merging::mergeability::{is_within_mergeable_distance, time_interval_secs};
use crate::ports::ActivityProbabilities;

/// Score for a (consumer, consumee) pair. Higher is better; `Impossible`
/// merges are never executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeScore {
    Impossible = 0,
    VeryLow = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    Perfect = 5,
}

/// Scoring service. Holds the optional classifier-probability plug used
/// by the trip-consumes-trip path; without it, trips with differing
/// activity types never merge.
#[derive(Clone, Default)]
pub struct MergeScores {
    probabilities: Option<Arc<dyn ActivityProbabilities>>,
}

impl MergeScores {
    pub fn new() -> Self {
        Self { probabilities: None }
    }

    pub fn with_probabilities(probabilities: Arc<dyn ActivityProbabilities>) -> Self {
        Self { probabilities: Some(probabilities) }
    }

    /// Evaluate the decision cascade for `consumer` absorbing `consumee`.
    /// First match wins.
    pub fn consumption_score(
        &self,
        consumer: &TimelineItem,
        consumee: &TimelineItem,
    ) -> Result<MergeScore> {
        // an empty consumee costs nothing to absorb
        if consumee.samples()?.is_empty() {
            return Ok(MergeScore::Perfect);
        }
        if consumer.samples()?.is_empty()
            || consumer.base.deleted
            || consumer.base.disabled
            || consumee.base.disabled
            || consumer.base.source != consumee.base.source
        {
            return Ok(MergeScore::Impossible);
        }

        // data gaps only ever merge with each other
        if consumer.is_data_gap()? {
            return Ok(if consumee.is_data_gap()? {
                MergeScore::Perfect
            } else {
                MergeScore::Impossible
            });
        }
        if consumee.is_data_gap()? {
            return Ok(if consumee.is_valid()? {
                MergeScore::Impossible
            } else {
                MergeScore::Medium
            });
        }

        // nolo items likewise prefer their own kind
        if consumer.is_nolo()? {
            return Ok(if consumee.is_nolo()? {
                MergeScore::Perfect
            } else {
                MergeScore::Impossible
            });
        }
        if consumee.is_nolo()? && !consumee.is_valid()? {
            return Ok(MergeScore::Medium);
        }

        if !is_within_mergeable_distance(consumer, consumee)? {
            return Ok(MergeScore::Impossible);
        }

        match &consumer.kind {
            ItemKind::Trip(_) => self.trip_consumer_score(consumer, consumee),
            ItemKind::Visit(_) => self.visit_consumer_score(consumer, consumee),
        }
    }

    fn trip_consumer_score(
        &self,
        consumer: &TimelineItem,
        consumee: &TimelineItem,
    ) -> Result<MergeScore> {
        if !consumer.is_valid()? {
            return Ok(if consumee.is_valid()? {
                MergeScore::Impossible
            } else {
                MergeScore::VeryLow
            });
        }

        match &consumee.kind {
            ItemKind::Visit(_) => {
                // keeper visits are anchors; trips never absorb them
                if consumee.is_worth_keeping()? {
                    return Ok(MergeScore::Impossible);
                }
                if consumer.is_worth_keeping()? {
                    return Ok(if consumee.is_valid()? {
                        MergeScore::Low
                    } else {
                        MergeScore::Medium
                    });
                }
                Ok(if consumee.is_valid()? { MergeScore::VeryLow } else { MergeScore::Low })
            }
            ItemKind::Trip(their_trip) => {
                let mine = consumer.trip().and_then(|t| t.activity_type());
                let theirs = their_trip.activity_type();

                match (mine, theirs) {
                    (None, None) => Ok(MergeScore::Medium),
                    (Some(a), Some(b)) if a == b => Ok(MergeScore::Perfect),
                    _ => {
                        if consumee.is_worth_keeping()? {
                            return Ok(MergeScore::Impossible);
                        }
                        let Some(my_type) = mine else {
                            return Ok(MergeScore::Impossible);
                        };
                        if let Some(probabilities) = &self.probabilities {
                            if let Some(probability) =
                                probabilities.probability(consumee, my_type)
                            {
                                return Ok(probability_score(probability));
                            }
                        }
                        Ok(MergeScore::Impossible)
                    }
                }
            }
        }
    }

    fn visit_consumer_score(
        &self,
        consumer: &TimelineItem,
        consumee: &TimelineItem,
    ) -> Result<MergeScore> {
        match &consumee.kind {
            ItemKind::Visit(_) => {
                // only temporally overlapping visits merge; the longer
                // one wins, with ties going to the consumer
                if time_interval_secs(consumer, consumee) < 0.0 {
                    Ok(if consumer.duration_secs() >= consumee.duration_secs() {
                        MergeScore::Perfect
                    } else {
                        MergeScore::High
                    })
                } else {
                    Ok(MergeScore::Impossible)
                }
            }
            ItemKind::Trip(_) => {
                if consumer.is_valid()? && !consumee.is_valid()? {
                    let inside = percent_inside(consumer, consumee)?;
                    Ok(if (inside * 10.0).floor() as i32 == 10 {
                        MergeScore::Low
                    } else {
                        MergeScore::VeryLow
                    })
                } else {
                    Ok(MergeScore::Impossible)
                }
            }
        }
    }
}

/// Fraction of the consumee's located samples that fall inside the
/// consumer's geofence.
fn percent_inside(consumer: &TimelineItem, consumee: &TimelineItem) -> Result<f64> {
    let Some(visit) = consumer.visit() else {
        return Ok(0.0);
    };
    let mut located = 0usize;
    let mut inside = 0usize;
    for sample in consumee.samples()? {
        if let Some(coordinate) = sample.usable_coordinate() {
            located += 1;
            if visit.contains(&coordinate) {
                inside += 1;
            }
        }
    }
    if located == 0 {
        return Ok(0.0);
    }
    Ok(inside as f64 / located as f64)
}

/// Mapping from classifier probability to score, used when the
/// probability plug is present.
fn probability_score(probability: f64) -> MergeScore {
    if probability >= 0.75 {
        MergeScore::Perfect
    } else if probability >= 0.50 {
        MergeScore::High
    } else if probability >= 0.25 {
        MergeScore::Medium
    } else if probability >= 0.10 {
        MergeScore::Low
    } else {
        MergeScore::VeryLow
    }
}
