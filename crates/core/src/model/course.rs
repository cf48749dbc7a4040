use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::aggregator::StepWeights;
use crate::model::ids::{CourseId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("display name cannot be empty")]
    EmptyDisplayName,
}

/// Learner data the engine snapshots onto certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    id: UserId,
    display_name: String,
}

impl UserProfile {
    /// # Errors
    ///
    /// Returns `CourseError::EmptyDisplayName` for a blank name.
    pub fn new(id: UserId, display_name: impl Into<String>) -> Result<Self, CourseError> {
        let display_name = display_name.into().trim().to_owned();
        if display_name.is_empty() {
            return Err(CourseError::EmptyDisplayName);
        }
        Ok(Self { id, display_name })
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Per-course settings that shape progress aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseConfig {
    pub has_post_work: bool,
    pub has_final_project: bool,
    pub step_weights: StepWeights,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            has_post_work: true,
            has_final_project: true,
            step_weights: StepWeights::DEFAULT,
        }
    }
}

/// Course data the engine reads: titles for certificates, lesson count for the
/// lesson ratio, and the progress configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseProfile {
    id: CourseId,
    title: String,
    instructor: String,
    lesson_count: u32,
    config: CourseConfig,
    created_at: DateTime<Utc>,
}

impl CourseProfile {
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` for a blank title.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        instructor: impl Into<String>,
        lesson_count: u32,
        config: CourseConfig,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(CourseError::EmptyTitle);
        }
        Ok(Self {
            id,
            title,
            instructor: instructor.into().trim().to_owned(),
            lesson_count,
            config,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn instructor(&self) -> &str {
        &self.instructor
    }

    #[must_use]
    pub fn lesson_count(&self) -> u32 {
        self.lesson_count
    }

    #[must_use]
    pub fn config(&self) -> &CourseConfig {
        &self.config
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn with_config(mut self, config: CourseConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn trims_and_rejects_blank_titles() {
        let err = CourseProfile::new(
            CourseId::new(1),
            "   ",
            "Ada",
            3,
            CourseConfig::default(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, CourseError::EmptyTitle);

        let course = CourseProfile::new(
            CourseId::new(1),
            " Rust 101 ",
            "Ada",
            3,
            CourseConfig::default(),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(course.title(), "Rust 101");
    }

    #[test]
    fn blank_display_name_is_rejected() {
        assert!(UserProfile::new(UserId::new(1), "").is_err());
    }
}
