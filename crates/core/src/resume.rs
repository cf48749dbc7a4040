//! Resume pointer resolution.

use crate::model::{Stage, StageSet};

/// Returns the stage a learner should land on next.
///
/// Walks the catalog in order and picks the first stage missing from
/// `completed`; a learner who finished everything stays on the last stage.
/// Stored `current_step` values are never consulted: this is the authority.
#[must_use]
pub fn resolve_resume(completed: &StageSet) -> Stage {
    Stage::CATALOG
        .iter()
        .copied()
        .find(|stage| !completed.contains(*stage))
        .unwrap_or(Stage::LAST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(stages: &[Stage]) -> StageSet {
        stages.iter().copied().collect()
    }

    #[test]
    fn empty_set_resumes_at_intro() {
        assert_eq!(resolve_resume(&StageSet::new()), Stage::Intro);
    }

    #[test]
    fn order_of_completion_does_not_matter() {
        assert_eq!(
            resolve_resume(&set(&[Stage::Pretest, Stage::Intro])),
            Stage::Lessons
        );
    }

    #[test]
    fn gaps_are_resumed_first() {
        assert_eq!(
            resolve_resume(&set(&[Stage::Intro, Stage::Lessons, Stage::Posttest])),
            Stage::Pretest
        );
    }

    #[test]
    fn finished_learner_stays_on_final_project() {
        assert_eq!(resolve_resume(&set(&Stage::CATALOG)), Stage::FinalProject);
    }
}
