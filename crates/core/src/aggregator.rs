//! Progress aggregation: weighted stage progress and the lesson ratio.
//!
//! The two numbers answer different questions and are never blended. The
//! weighted figure is what `overall_progress` tracks; the lesson ratio feeds
//! the per-lesson view.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::{Stage, StageSet};

/// Highest value any percentage in the engine may take.
pub const MAX_PERCENT: u8 = 100;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepWeightsError {
    #[error("unknown stage in step weights: {0:?}")]
    UnknownStage(String),

    #[error("weight for {stage} must be between 0 and 100, got {weight}")]
    OutOfRange { stage: Stage, weight: u32 },

    #[error("step weights must sum to 100, got {0}")]
    BadTotal(u32),
}

//
// ─── STEP WEIGHTS ──────────────────────────────────────────────────────────────
//

/// Percentage points each completed stage contributes, indexed by catalog
/// position.
///
/// Weights always sum to exactly 100. Courses without a postwork or final
/// project keep whatever weight the administrator configured for it; nothing
/// is redistributed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepWeights([u8; 6]);

impl Default for StepWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl StepWeights {
    /// intro 5, pretest 10, lessons 50, posttest 15, postwork 10, finalproject 10.
    pub const DEFAULT: StepWeights = StepWeights([5, 10, 50, 15, 10, 10]);

    /// Build weights from `(stage, weight)` pairs. Stages not named weigh 0.
    ///
    /// # Errors
    ///
    /// Returns `StepWeightsError::OutOfRange` for a weight above 100 and
    /// `StepWeightsError::BadTotal` when the weights do not add up to 100.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Stage, u32)>,
    ) -> Result<Self, StepWeightsError> {
        let mut weights = [0_u8; 6];
        for (stage, weight) in pairs {
            let narrowed = u8::try_from(weight)
                .ok()
                .filter(|w| *w <= MAX_PERCENT)
                .ok_or(StepWeightsError::OutOfRange { stage, weight })?;
            weights[stage.position()] = narrowed;
        }
        let total: u32 = weights.iter().map(|w| u32::from(*w)).sum();
        if total != u32::from(MAX_PERCENT) {
            return Err(StepWeightsError::BadTotal(total));
        }
        Ok(Self(weights))
    }

    /// Build weights from stage names, as stored in course configuration.
    ///
    /// # Errors
    ///
    /// Returns `StepWeightsError::UnknownStage` for names outside the catalog,
    /// plus the errors of [`StepWeights::from_pairs`].
    pub fn from_named<'a>(
        named: impl IntoIterator<Item = (&'a str, u32)>,
    ) -> Result<Self, StepWeightsError> {
        let mut pairs = Vec::with_capacity(Stage::CATALOG.len());
        for (name, weight) in named {
            let stage = name
                .parse::<Stage>()
                .map_err(|_| StepWeightsError::UnknownStage(name.to_owned()))?;
            pairs.push((stage, weight));
        }
        Self::from_pairs(pairs)
    }

    #[must_use]
    pub fn weight(&self, stage: Stage) -> u8 {
        self.0[stage.position()]
    }

    /// Weights keyed by stage name, for persistence and display.
    #[must_use]
    pub fn to_named(&self) -> BTreeMap<&'static str, u8> {
        Stage::CATALOG
            .iter()
            .map(|stage| (stage.as_str(), self.weight(*stage)))
            .collect()
    }

    /// Sum of the weights of the completed stages, capped at 100.
    #[must_use]
    pub fn weighted_progress(&self, completed: &StageSet) -> u8 {
        let total: u32 = completed
            .iter()
            .map(|stage| u32::from(self.weight(stage)))
            .sum();
        u8::try_from(total.min(u32::from(MAX_PERCENT))).unwrap_or(MAX_PERCENT)
    }
}

//
// ─── LESSON RATIO ──────────────────────────────────────────────────────────────
//

/// `completed / total * 100`, rounded down. A course without lessons is at 0.
#[must_use]
pub fn lesson_completion_ratio(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = u64::from(completed.min(total)) * u64::from(MAX_PERCENT) / u64::from(total);
    u8::try_from(ratio).unwrap_or(MAX_PERCENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(stages: &[Stage]) -> StageSet {
        stages.iter().copied().collect()
    }

    #[test]
    fn default_weights_sum_to_one_hundred() {
        let total: u32 = StepWeights::DEFAULT
            .to_named()
            .values()
            .map(|w| u32::from(*w))
            .sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn first_three_stages_weigh_sixty_five() {
        let weights = StepWeights::default();
        let done = set(&[Stage::Intro, Stage::Pretest, Stage::Lessons]);
        assert_eq!(weights.weighted_progress(&done), 65);
    }

    #[test]
    fn all_stages_weigh_exactly_one_hundred() {
        let weights = StepWeights::default();
        assert_eq!(weights.weighted_progress(&set(&Stage::CATALOG)), 100);
    }

    #[test]
    fn custom_weights_without_postwork() {
        let weights = StepWeights::from_named([
            ("intro", 10),
            ("pretest", 15),
            ("lessons", 40),
            ("posttest", 35),
        ])
        .unwrap();
        assert_eq!(weights.weight(Stage::Postwork), 0);
        let done = set(&[Stage::Intro, Stage::Pretest, Stage::Lessons, Stage::Posttest]);
        assert_eq!(weights.weighted_progress(&done), 100);
    }

    #[test]
    fn rejects_weights_not_summing_to_one_hundred() {
        let err = StepWeights::from_named([("intro", 10), ("lessons", 50)]).unwrap_err();
        assert_eq!(err, StepWeightsError::BadTotal(60));
    }

    #[test]
    fn rejects_unknown_stage_names() {
        let err = StepWeights::from_named([("quiz", 100)]).unwrap_err();
        assert_eq!(err, StepWeightsError::UnknownStage("quiz".into()));
    }

    #[test]
    fn rejects_oversized_weight() {
        let err = StepWeights::from_pairs([(Stage::Lessons, 300)]).unwrap_err();
        assert!(matches!(err, StepWeightsError::OutOfRange { weight: 300, .. }));
    }

    #[test]
    fn lesson_ratio_handles_empty_course() {
        assert_eq!(lesson_completion_ratio(0, 0), 0);
        assert_eq!(lesson_completion_ratio(3, 0), 0);
    }

    #[test]
    fn lesson_ratio_rounds_down_and_clamps() {
        assert_eq!(lesson_completion_ratio(1, 3), 33);
        assert_eq!(lesson_completion_ratio(4, 4), 100);
        assert_eq!(lesson_completion_ratio(9, 4), 100);
    }

    fn any_stage_set() -> impl Strategy<Value = StageSet> {
        proptest::collection::vec(0..6_usize, 0..12)
            .prop_map(|idx| idx.into_iter().map(|i| Stage::CATALOG[i]).collect())
    }

    proptest! {
        #[test]
        fn weighted_progress_never_exceeds_one_hundred(done in any_stage_set()) {
            prop_assert!(StepWeights::default().weighted_progress(&done) <= 100);
        }

        #[test]
        fn growing_the_set_never_lowers_progress(a in any_stage_set(), b in any_stage_set()) {
            let weights = StepWeights::default();
            let merged = a.union(&b);
            prop_assert!(weights.weighted_progress(&merged) >= weights.weighted_progress(&a));
            prop_assert!(weights.weighted_progress(&merged) >= weights.weighted_progress(&b));
        }
    }
}
