use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::aggregator::{MAX_PERCENT, lesson_completion_ratio};
use crate::model::ids::{CourseId, LessonId, UserId};
use crate::model::stage::{Stage, StageSet};
use crate::resume::resolve_resume;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("lesson progress must be between 0 and 100, got {0}")]
    ProgressOutOfRange(u32),
    #[error("time spent must be at most {max} seconds, got {0}", max = MAX_TIME_SPENT_SECS)]
    TimeSpentOutOfRange(u64),
}

/// Upper bound for any reported or stored time total (about a century).
pub const MAX_TIME_SPENT_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Checks a client-reported time total against `MAX_TIME_SPENT_SECS`.
///
/// # Errors
///
/// Returns `ProgressError::TimeSpentOutOfRange` above the bound.
pub fn checked_time_spent(secs: u64) -> Result<u64, ProgressError> {
    if secs > MAX_TIME_SPENT_SECS {
        return Err(ProgressError::TimeSpentOutOfRange(secs));
    }
    Ok(secs)
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// A client-reported change to one lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonDelta {
    progress: u8,
    completed: bool,
    time_spent_secs: u64,
}

impl LessonDelta {
    /// # Errors
    ///
    /// Returns `ProgressError::ProgressOutOfRange` when `progress > 100` and
    /// `ProgressError::TimeSpentOutOfRange` above `MAX_TIME_SPENT_SECS`.
    pub fn new(progress: u32, completed: bool, time_spent_secs: u64) -> Result<Self, ProgressError> {
        let progress = u8::try_from(progress)
            .ok()
            .filter(|p| *p <= MAX_PERCENT)
            .ok_or(ProgressError::ProgressOutOfRange(progress))?;
        Ok(Self {
            progress,
            completed,
            time_spent_secs: checked_time_spent(time_spent_secs)?,
        })
    }

    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Seconds spent since the previous report; added to the stored total.
    #[must_use]
    pub fn time_spent_secs(&self) -> u64 {
        self.time_spent_secs
    }
}

/// Stored progress for one (user, course, lesson).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonProgress {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub completed: bool,
    pub progress: u8,
    pub time_spent_secs: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    /// A lesson nobody has touched yet.
    #[must_use]
    pub fn untouched(
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            course_id,
            lesson_id,
            completed: false,
            progress: 0,
            time_spent_secs: 0,
            started_at: at,
            updated_at: at,
            completed_at: None,
        }
    }

    /// Fold a delta in.
    ///
    /// Progress keeps its maximum, completion never reverts, the completion
    /// timestamp is written once, and time accumulates up to
    /// `MAX_TIME_SPENT_SECS`.
    pub fn apply(&mut self, delta: LessonDelta, at: DateTime<Utc>) {
        self.progress = self.progress.max(delta.progress);
        if delta.completed && !self.completed {
            self.completed = true;
            self.completed_at = Some(at);
        }
        self.time_spent_secs = self
            .time_spent_secs
            .saturating_add(delta.time_spent_secs)
            .min(MAX_TIME_SPENT_SECS);
        self.updated_at = at;
    }
}

//
// ─── COURSE PROGRESS ───────────────────────────────────────────────────────────
//

/// Values one sync wants merged into the stored course progress.
///
/// `completed_at` must be `Some` exactly when `overall_progress` is 100; the
/// merge only keeps it if nothing was recorded before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseProgressUpdate {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub current_step: Stage,
    pub overall_progress: u8,
    pub time_spent_secs: u64,
    pub lessons_completed: u32,
    pub total_lessons: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

/// Stored progress for one (user, course).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseProgress {
    pub user_id: UserId,
    pub course_id: CourseId,
    /// Last pointer written by a sync. Readers use [`CourseProgress::resume_stage`].
    pub current_step: Stage,
    pub completed_stages: StageSet,
    pub time_spent_secs: u64,
    pub overall_progress: u8,
    pub lessons_completed: u32,
    pub total_lessons: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CourseProgress {
    /// What a learner who never synced looks like.
    #[must_use]
    pub fn not_started(user_id: UserId, course_id: CourseId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            course_id,
            current_step: Stage::Intro,
            completed_stages: StageSet::new(),
            time_spent_secs: 0,
            overall_progress: 0,
            lessons_completed: 0,
            total_lessons: 0,
            started_at: at,
            updated_at: at,
            completed_at: None,
        }
    }

    /// First row for a (user, course) created from a sync.
    #[must_use]
    pub fn from_update(update: &CourseProgressUpdate, completed_stages: StageSet) -> Self {
        Self {
            user_id: update.user_id,
            course_id: update.course_id,
            current_step: update.current_step,
            completed_stages,
            time_spent_secs: update.time_spent_secs,
            overall_progress: update.overall_progress.min(MAX_PERCENT),
            lessons_completed: update.lessons_completed,
            total_lessons: update.total_lessons,
            started_at: update.at,
            updated_at: update.at,
            completed_at: update.completed_at,
        }
    }

    /// Merge a sync into this row.
    ///
    /// Overall progress, time spent and the completed lesson count take the
    /// maximum of stored and incoming, so interleaved syncs converge. `started_at` and
    /// `completed_at` are write-once.
    pub fn merge(&mut self, update: &CourseProgressUpdate) {
        self.current_step = update.current_step;
        self.overall_progress = self
            .overall_progress
            .max(update.overall_progress)
            .min(MAX_PERCENT);
        self.time_spent_secs = self.time_spent_secs.max(update.time_spent_secs);
        self.lessons_completed = self.lessons_completed.max(update.lessons_completed);
        self.total_lessons = update.total_lessons;
        if self.completed_at.is_none() {
            self.completed_at = update.completed_at;
        }
        self.updated_at = update.at;
    }

    /// Where the learner should resume, derived from the completed stages.
    #[must_use]
    pub fn resume_stage(&self) -> Stage {
        resolve_resume(&self.completed_stages)
    }

    #[must_use]
    pub fn lesson_completion(&self) -> u8 {
        lesson_completion_ratio(self.lessons_completed, self.total_lessons)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.overall_progress >= MAX_PERCENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;
    use proptest::prelude::*;

    fn update(overall: u8, time: u64) -> CourseProgressUpdate {
        CourseProgressUpdate {
            user_id: UserId::new(1),
            course_id: CourseId::new(1),
            current_step: Stage::Pretest,
            overall_progress: overall,
            time_spent_secs: time,
            lessons_completed: 0,
            total_lessons: 0,
            completed_at: (overall == 100).then(fixed_now),
            at: fixed_now(),
        }
    }

    #[test]
    fn delta_rejects_progress_over_one_hundred() {
        assert_eq!(
            LessonDelta::new(101, false, 0).unwrap_err(),
            ProgressError::ProgressOutOfRange(101)
        );
        assert!(LessonDelta::new(100, true, 0).is_ok());
    }

    #[test]
    fn delta_rejects_time_over_the_cap() {
        assert_eq!(
            LessonDelta::new(10, false, MAX_TIME_SPENT_SECS + 1).unwrap_err(),
            ProgressError::TimeSpentOutOfRange(MAX_TIME_SPENT_SECS + 1)
        );
        assert!(checked_time_spent(u64::MAX).is_err());
        assert_eq!(checked_time_spent(900), Ok(900));
    }

    #[test]
    fn lesson_time_saturates_at_the_cap() {
        let now = fixed_now();
        let mut lesson =
            LessonProgress::untouched(UserId::new(1), CourseId::new(1), LessonId::new(1), now);
        let big = LessonDelta::new(10, false, MAX_TIME_SPENT_SECS).unwrap();
        lesson.apply(big, now);
        lesson.apply(big, now);
        assert_eq!(lesson.time_spent_secs, MAX_TIME_SPENT_SECS);
    }

    #[test]
    fn lesson_completion_is_sticky() {
        let now = fixed_now();
        let mut lesson =
            LessonProgress::untouched(UserId::new(1), CourseId::new(1), LessonId::new(1), now);

        lesson.apply(LessonDelta::new(100, true, 30).unwrap(), now);
        let first_completion = lesson.completed_at;
        assert!(lesson.completed);

        let later = now + Duration::minutes(5);
        lesson.apply(LessonDelta::new(40, false, 15).unwrap(), later);
        assert!(lesson.completed);
        assert_eq!(lesson.progress, 100);
        assert_eq!(lesson.completed_at, first_completion);
        assert_eq!(lesson.time_spent_secs, 45);
    }

    #[test]
    fn merge_keeps_higher_progress_and_time() {
        let mut stored = CourseProgress::from_update(&update(65, 600), StageSet::new());
        stored.merge(&update(5, 120));
        assert_eq!(stored.overall_progress, 65);
        assert_eq!(stored.time_spent_secs, 600);
    }

    #[test]
    fn completed_at_is_written_once() {
        let mut stored = CourseProgress::from_update(&update(100, 10), StageSet::new());
        let first = stored.completed_at;
        assert!(first.is_some());

        let mut again = update(100, 20);
        again.completed_at = Some(fixed_now() + Duration::days(1));
        stored.merge(&again);
        assert_eq!(stored.completed_at, first);
    }

    #[test]
    fn started_at_survives_merges() {
        let mut stored = CourseProgress::from_update(&update(5, 10), StageSet::new());
        let mut later = update(15, 20);
        later.at = fixed_now() + Duration::hours(2);
        stored.merge(&later);
        assert_eq!(stored.started_at, fixed_now());
        assert_eq!(stored.updated_at, later.at);
    }

    proptest! {
        #[test]
        fn merges_are_monotonic(steps in proptest::collection::vec((0_u8..=100, 0_u64..10_000), 1..20)) {
            let mut stored = CourseProgress::not_started(UserId::new(1), CourseId::new(1), fixed_now());
            let mut last = (0_u8, 0_u64);
            for (overall, time) in steps {
                stored.merge(&update(overall, time));
                prop_assert!(stored.overall_progress >= last.0);
                prop_assert!(stored.time_spent_secs >= last.1);
                last = (stored.overall_progress, stored.time_spent_secs);
            }
        }

        #[test]
        fn merge_order_does_not_matter(a in (0_u8..=100, 0_u64..10_000), b in (0_u8..=100, 0_u64..10_000)) {
            let base = CourseProgress::not_started(UserId::new(1), CourseId::new(1), fixed_now());
            let mut ab = base.clone();
            ab.merge(&update(a.0, a.1));
            ab.merge(&update(b.0, b.1));
            let mut ba = base;
            ba.merge(&update(b.0, b.1));
            ba.merge(&update(a.0, a.1));
            prop_assert_eq!(ab.overall_progress, ba.overall_progress);
            prop_assert_eq!(ab.time_spent_secs, ba.time_spent_secs);
        }
    }
}
