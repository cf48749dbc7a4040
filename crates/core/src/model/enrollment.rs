use chrono::{DateTime, Utc};

use crate::model::ids::{CourseId, UserId};

/// A learner's membership in a course.
///
/// `progress` and `completed_at` mirror the course progress row so listings
/// do not need a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
    pub progress: u8,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    #[must_use]
    pub fn new(user_id: UserId, course_id: CourseId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            course_id,
            enrolled_at,
            progress: 0,
            completed_at: None,
        }
    }

    /// Copy the latest merged progress; the completion stamp is kept once set.
    pub fn mirror(&mut self, progress: u8, completed_at: Option<DateTime<Utc>>) {
        self.progress = self.progress.max(progress);
        if self.completed_at.is_none() {
            self.completed_at = completed_at;
        }
    }
}
