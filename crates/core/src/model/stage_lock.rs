use chrono::{DateTime, Utc};

use crate::model::ids::{CourseId, UserId};
use crate::model::role::{Caller, Role};
use crate::model::stage::Stage;

/// Admin-managed barrier on one stage of one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLock {
    pub course_id: CourseId,
    pub stage: Stage,
    pub is_locked: bool,
    pub lock_message: String,
    pub locked_by: Option<UserId>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl StageLock {
    /// The row a missing lock stands for.
    #[must_use]
    pub fn unlocked(course_id: CourseId, stage: Stage) -> Self {
        Self {
            course_id,
            stage,
            is_locked: false,
            lock_message: String::new(),
            locked_by: None,
            locked_at: None,
        }
    }

    /// Row an admin write produces. Engaging a lock stamps who and when;
    /// releasing one clears both.
    #[must_use]
    pub fn set_by(
        course_id: CourseId,
        stage: Stage,
        is_locked: bool,
        lock_message: impl Into<String>,
        admin: &Caller,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            course_id,
            stage,
            is_locked,
            lock_message: lock_message.into().trim().to_owned(),
            locked_by: is_locked.then_some(admin.user_id),
            locked_at: is_locked.then_some(at),
        }
    }

    /// Same observable state, ignoring the audit stamp.
    #[must_use]
    pub fn same_state(&self, other: &StageLock) -> bool {
        self.is_locked == other.is_locked && self.lock_message == other.lock_message
    }
}

/// Gate decision for one (course, stage, role).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageAccess {
    pub is_locked: bool,
    pub lock_message: String,
    pub can_access: bool,
}

impl StageAccess {
    /// Privileged roles always pass with an empty message. Everyone else is
    /// denied only by a stored row that is locked, and sees its message as is.
    #[must_use]
    pub fn evaluate(lock: Option<&StageLock>, role: Role) -> Self {
        if role.is_privileged() {
            return Self::open();
        }
        match lock {
            Some(lock) if lock.is_locked => Self {
                is_locked: true,
                lock_message: lock.lock_message.clone(),
                can_access: false,
            },
            _ => Self::open(),
        }
    }

    fn open() -> Self {
        Self {
            is_locked: false,
            lock_message: String::new(),
            can_access: true,
        }
    }
}
