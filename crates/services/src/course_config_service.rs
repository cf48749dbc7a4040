use std::sync::Arc;

use lms_core::aggregator::StepWeights;
use lms_core::model::{Caller, CourseConfig, CourseId};
use storage::repository::DirectoryRepository;
use tracing::info;

use crate::error::CourseConfigError;
use crate::views::{CourseConfigUpdate, CourseConfigView};

/// Reads and edits per-course progress configuration.
#[derive(Clone)]
pub struct CourseConfigService {
    directory: Arc<dyn DirectoryRepository>,
}

impl CourseConfigService {
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryRepository>) -> Self {
        Self { directory }
    }

    /// # Errors
    ///
    /// Returns `CourseConfigError::Forbidden` unless the caller is an admin.
    /// Returns `CourseConfigError::CourseNotFound` if the course is missing.
    /// Returns `CourseConfigError::Storage` if repository access fails.
    pub async fn get(
        &self,
        caller: &Caller,
        course_id: CourseId,
    ) -> Result<CourseConfigView, CourseConfigError> {
        if !caller.is_privileged() {
            return Err(CourseConfigError::Forbidden);
        }
        let course = self
            .directory
            .get_course(course_id)
            .await?
            .ok_or(CourseConfigError::CourseNotFound(course_id))?;
        Ok(CourseConfigView::new(course_id, course.config()))
    }

    /// Replace a course's configuration.
    ///
    /// # Errors
    ///
    /// Returns `CourseConfigError::Forbidden` unless the caller is an admin.
    /// Returns `CourseConfigError::Invalid` if the weights name unknown stages,
    /// exceed 100 individually, or do not sum to 100.
    /// Returns `CourseConfigError::CourseNotFound` if the course is missing.
    /// Returns `CourseConfigError::Storage` if repository access fails.
    #[tracing::instrument(skip(self, caller, update), fields(admin = %caller.user_id))]
    pub async fn update(
        &self,
        caller: &Caller,
        course_id: CourseId,
        update: CourseConfigUpdate,
    ) -> Result<CourseConfigView, CourseConfigError> {
        if !caller.is_privileged() {
            return Err(CourseConfigError::Forbidden);
        }
        let step_weights = match &update.step_weights {
            Some(named) => StepWeights::from_named(named.iter().map(|(k, v)| (k.as_str(), *v)))
                .map_err(lms_core::Error::from)?,
            None => StepWeights::DEFAULT,
        };

        let course = self
            .directory
            .get_course(course_id)
            .await?
            .ok_or(CourseConfigError::CourseNotFound(course_id))?;
        let current = course.config();
        let config = CourseConfig {
            has_post_work: update.has_post_work.unwrap_or(current.has_post_work),
            has_final_project: update.has_final_project.unwrap_or(current.has_final_project),
            step_weights,
        };

        self.directory.update_course_config(course_id, &config).await?;
        info!(weights = ?config.step_weights.to_named(), "course configuration updated");
        Ok(CourseConfigView::new(course_id, &config))
    }
}
