use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::certificate_service::CertificateService;
use crate::course_config_service::CourseConfigService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::seed::{DemoSeed, seed_demo};
use crate::stage_gate_service::StageGateService;

/// Assembles the engine services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    storage: Storage,
    progress: Arc<ProgressService>,
    stage_gate: Arc<StageGateService>,
    certificates: Arc<CertificateService>,
    course_config: Arc<CourseConfigService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, running migrations first.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Sqlite` if connecting or migrating fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        let certificates = Arc::new(CertificateService::new(
            clock,
            Arc::clone(&storage.directory),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.certificates),
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.directory),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
            Arc::clone(&certificates),
        ));
        let stage_gate = Arc::new(StageGateService::new(
            clock,
            Arc::clone(&storage.directory),
            Arc::clone(&storage.stage_locks),
        ));
        let course_config = Arc::new(CourseConfigService::new(Arc::clone(&storage.directory)));

        Self {
            clock,
            storage,
            progress,
            stage_gate,
            certificates,
            course_config,
        }
    }

    /// Write the demo admin, learner and course.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if any write fails.
    pub async fn seed_demo(&self, seed: &DemoSeed) -> Result<(), AppServicesError> {
        seed_demo(&self.storage, self.clock, seed).await
    }

    /// The underlying storage bundle, for collaborator data such as users
    /// and courses.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn stage_gate(&self) -> Arc<StageGateService> {
        Arc::clone(&self.stage_gate)
    }

    #[must_use]
    pub fn certificates(&self) -> Arc<CertificateService> {
        Arc::clone(&self.certificates)
    }

    #[must_use]
    pub fn course_config(&self) -> Arc<CourseConfigService> {
        Arc::clone(&self.course_config)
    }
}
