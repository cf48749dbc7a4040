use std::sync::Arc;

use lms_core::model::{
    Caller, Certificate, CertificateDecision, CertificateId, CertificateStatus, CourseId,
    NewCertificate, UserId,
};
use storage::repository::{
    CertificateRepository, DirectoryRepository, EnrollmentRepository, ProgressRepository,
    StorageError,
};
use tracing::{info, warn};

use crate::Clock;
use crate::error::CertificateServiceError;
use crate::views::{CertificateVerification, CertificateView};

/// Insert attempts before giving up on finding a free certificate number.
const MAX_NUMBER_ATTEMPTS: usize = 3;

type SuffixSource = Arc<dyn Fn() -> u16 + Send + Sync>;

/// Result of the absent to pending transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// This call created the pending row.
    Issued(Certificate),
    /// A certificate already existed and is returned unchanged.
    Existing(Certificate),
}

impl IssueOutcome {
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        match self {
            IssueOutcome::Issued(cert) | IssueOutcome::Existing(cert) => cert,
        }
    }

    #[must_use]
    pub fn into_certificate(self) -> Certificate {
        match self {
            IssueOutcome::Issued(cert) | IssueOutcome::Existing(cert) => cert,
        }
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, IssueOutcome::Issued(_))
    }
}

/// Issues certificates and runs the admin review.
#[derive(Clone)]
pub struct CertificateService {
    clock: Clock,
    directory: Arc<dyn DirectoryRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressRepository>,
    certificates: Arc<dyn CertificateRepository>,
    suffixes: SuffixSource,
}

impl CertificateService {
    #[must_use]
    pub fn new(
        clock: Clock,
        directory: Arc<dyn DirectoryRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn ProgressRepository>,
        certificates: Arc<dyn CertificateRepository>,
    ) -> Self {
        Self {
            clock,
            directory,
            enrollments,
            progress,
            certificates,
            suffixes: Arc::new(rand::random::<u16>),
        }
    }

    /// Replace the random suffix source used in certificate numbers.
    #[must_use]
    pub fn with_suffix_source(mut self, source: impl Fn() -> u16 + Send + Sync + 'static) -> Self {
        self.suffixes = Arc::new(source);
        self
    }

    /// Move the (user, course) pair from absent to pending.
    ///
    /// Safe to call any number of times, concurrently included: an existing
    /// certificate is returned as is, and losing an insert race to another
    /// request returns the row that request stored.
    ///
    /// # Errors
    ///
    /// Returns `CertificateServiceError::NotEnrolled` if the user is not enrolled.
    /// Returns `CertificateServiceError::NotEligible` while overall progress is below 100.
    /// Returns `CertificateServiceError::UserNotFound`/`CourseNotFound` if the snapshot sources are missing.
    /// Returns `CertificateServiceError::NumberExhausted` if no free number was found.
    /// Returns `CertificateServiceError::Storage` if repository access fails.
    #[tracing::instrument(skip(self))]
    pub async fn issue(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<IssueOutcome, CertificateServiceError> {
        if !self.enrollments.is_enrolled(user_id, course_id).await? {
            return Err(CertificateServiceError::NotEnrolled { user_id, course_id });
        }
        if let Some(existing) = self.certificates.find_for_course(user_id, course_id).await? {
            return Ok(IssueOutcome::Existing(existing));
        }

        let progress = self.progress.get_course_progress(user_id, course_id).await?;
        let progress = match progress {
            Some(p) if p.is_complete() => p,
            other => {
                return Err(CertificateServiceError::NotEligible {
                    current: other.map_or(0, |p| p.overall_progress),
                });
            }
        };

        let user = self
            .directory
            .get_user(user_id)
            .await?
            .ok_or(CertificateServiceError::UserNotFound(user_id))?;
        let course = self
            .directory
            .get_course(course_id)
            .await?
            .ok_or(CertificateServiceError::CourseNotFound(course_id))?;

        let issued_at = self.clock.now();
        let completion_date = progress.completed_at.unwrap_or(issued_at);

        for _ in 0..MAX_NUMBER_ATTEMPTS {
            let draft = NewCertificate::snapshot(
                &user,
                &course,
                completion_date,
                issued_at,
                (self.suffixes)(),
            );
            match self.certificates.insert_pending(&draft).await {
                Ok(cert) => {
                    info!(
                        certificate_id = %cert.id,
                        cert_number = %cert.cert_number,
                        "certificate issued"
                    );
                    return Ok(IssueOutcome::Issued(cert));
                }
                Err(StorageError::Conflict) => {
                    if let Some(existing) =
                        self.certificates.find_for_course(user_id, course_id).await?
                    {
                        warn!(
                            cert_number = %existing.cert_number,
                            "concurrent issuance already stored a certificate"
                        );
                        return Ok(IssueOutcome::Existing(existing));
                    }
                    warn!(cert_number = %draft.cert_number, "certificate number taken, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(CertificateServiceError::NumberExhausted)
    }

    /// Explicit learner request; same semantics as [`CertificateService::issue`].
    ///
    /// # Errors
    ///
    /// See [`CertificateService::issue`].
    pub async fn request(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CertificateView, CertificateServiceError> {
        let outcome = self.issue(user_id, course_id).await?;
        Ok(outcome.into_certificate().into())
    }

    /// # Errors
    ///
    /// Returns `CertificateServiceError::Forbidden` unless the caller is an admin.
    /// Returns `CertificateServiceError::NotFound` for an unknown id.
    /// Returns `CertificateServiceError::NotPending` once the certificate was reviewed.
    /// Returns `CertificateServiceError::Storage` if repository access fails.
    pub async fn approve(
        &self,
        caller: &Caller,
        id: CertificateId,
    ) -> Result<CertificateView, CertificateServiceError> {
        self.decide(caller, id, CertificateDecision::Approve).await
    }

    /// # Errors
    ///
    /// Returns `CertificateServiceError::Invalid` for a blank reason, otherwise
    /// the same errors as [`CertificateService::approve`].
    pub async fn reject(
        &self,
        caller: &Caller,
        id: CertificateId,
        reason: &str,
    ) -> Result<CertificateView, CertificateServiceError> {
        let decision = CertificateDecision::reject(reason).map_err(lms_core::Error::from)?;
        self.decide(caller, id, decision).await
    }

    #[tracing::instrument(skip(self, caller), fields(admin = %caller.user_id))]
    async fn decide(
        &self,
        caller: &Caller,
        id: CertificateId,
        decision: CertificateDecision,
    ) -> Result<CertificateView, CertificateServiceError> {
        if !caller.is_privileged() {
            return Err(CertificateServiceError::Forbidden);
        }
        let at = self.clock.now();
        let applied = self
            .certificates
            .record_decision(id, &decision, caller.user_id, at)
            .await?;

        let stored = self
            .certificates
            .get_certificate(id)
            .await?
            .ok_or(CertificateServiceError::NotFound(id))?;
        if !applied {
            return Err(CertificateServiceError::NotPending {
                status: stored.status,
            });
        }
        info!(certificate_id = %id, status = %stored.status, "certificate reviewed");
        Ok(stored.into())
    }

    /// The learner's certificate for a course, if one was issued.
    ///
    /// # Errors
    ///
    /// Returns `CertificateServiceError::NotEnrolled` if the user is not enrolled.
    /// Returns `CertificateServiceError::Storage` if repository access fails.
    pub async fn get_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CertificateView>, CertificateServiceError> {
        if !self.enrollments.is_enrolled(user_id, course_id).await? {
            return Err(CertificateServiceError::NotEnrolled { user_id, course_id });
        }
        let cert = self.certificates.find_for_course(user_id, course_id).await?;
        Ok(cert.map(CertificateView::from))
    }

    /// Status of the pair's certificate without the enrollment check.
    ///
    /// # Errors
    ///
    /// Returns `CertificateServiceError::Storage` if repository access fails.
    pub async fn status_for(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CertificateStatus>, CertificateServiceError> {
        let cert = self.certificates.find_for_course(user_id, course_id).await?;
        Ok(cert.map(|c| c.status))
    }

    /// # Errors
    ///
    /// Returns `CertificateServiceError::Storage` if repository access fails.
    pub async fn list_mine(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CertificateView>, CertificateServiceError> {
        let certs = self.certificates.list_for_user(user_id).await?;
        Ok(certs.into_iter().map(CertificateView::from).collect())
    }

    /// Review queue and history for admins.
    ///
    /// # Errors
    ///
    /// Returns `CertificateServiceError::Forbidden` unless the caller is an admin.
    /// Returns `CertificateServiceError::Storage` if repository access fails.
    pub async fn list(
        &self,
        caller: &Caller,
        status: Option<CertificateStatus>,
    ) -> Result<Vec<CertificateView>, CertificateServiceError> {
        if !caller.is_privileged() {
            return Err(CertificateServiceError::Forbidden);
        }
        let certs = self.certificates.list_certificates(status).await?;
        Ok(certs.into_iter().map(CertificateView::from).collect())
    }

    /// Public lookup by certificate number.
    ///
    /// # Errors
    ///
    /// Returns `CertificateServiceError::Storage` if repository access fails.
    pub async fn verify(
        &self,
        cert_number: &str,
    ) -> Result<CertificateVerification, CertificateServiceError> {
        let number = cert_number.trim();
        let found = self.certificates.find_by_number(number).await?;
        Ok(CertificateVerification::of(number, found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{
        CourseConfig, CourseProfile, CourseProgressUpdate, Role, Stage, UserProfile,
    };
    use lms_core::time::{fixed_clock, fixed_now};
    use storage::repository::Storage;

    const LEARNER: UserId = UserId::new(2);
    const COURSE: CourseId = CourseId::new(7);

    async fn setup(overall: u8) -> (Storage, CertificateService) {
        let storage = Storage::in_memory();
        storage
            .directory
            .upsert_user(&UserProfile::new(LEARNER, "Ada").unwrap())
            .await
            .unwrap();
        storage
            .directory
            .upsert_course(
                &CourseProfile::new(COURSE, "Rust", "Ferris", 3, CourseConfig::default(), fixed_now())
                    .unwrap(),
            )
            .await
            .unwrap();
        storage
            .enrollments
            .enroll(LEARNER, COURSE, fixed_now())
            .await
            .unwrap();
        storage
            .progress
            .merge_course_progress(&CourseProgressUpdate {
                user_id: LEARNER,
                course_id: COURSE,
                current_step: Stage::FinalProject,
                overall_progress: overall,
                time_spent_secs: 0,
                lessons_completed: 0,
                total_lessons: 3,
                completed_at: (overall == 100).then(fixed_now),
                at: fixed_now(),
            })
            .await
            .unwrap();
        let service = CertificateService::new(
            fixed_clock(),
            Arc::clone(&storage.directory),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.certificates),
        )
        .with_suffix_source(|| 0xBEEF);
        (storage, service)
    }

    fn admin() -> Caller {
        Caller::new(UserId::new(1), Role::Admin)
    }

    #[tokio::test]
    async fn issue_snapshots_names_and_is_idempotent() {
        let (_, service) = setup(100).await;
        let first = service.issue(LEARNER, COURSE).await.unwrap();
        assert!(first.is_new());
        let cert = first.certificate();
        assert_eq!(cert.cert_number, "CERT-20231114-7-2-BEEF");
        assert_eq!(cert.user_name, "Ada");
        assert_eq!(cert.instructor, "Ferris");
        assert_eq!(cert.status, CertificateStatus::Pending);

        let second = service.issue(LEARNER, COURSE).await.unwrap();
        assert!(!second.is_new());
        assert_eq!(second.certificate(), cert);
    }

    #[tokio::test]
    async fn incomplete_course_is_not_eligible() {
        let (_, service) = setup(65).await;
        let err = service.issue(LEARNER, COURSE).await.unwrap_err();
        assert!(matches!(
            err,
            CertificateServiceError::NotEligible { current: 65 }
        ));
    }

    #[tokio::test]
    async fn unenrolled_learner_is_refused() {
        let (_, service) = setup(100).await;
        let err = service.issue(UserId::new(99), COURSE).await.unwrap_err();
        assert!(matches!(err, CertificateServiceError::NotEnrolled { .. }));
    }

    #[tokio::test]
    async fn review_is_admin_only_and_happens_once() {
        let (_, service) = setup(100).await;
        let cert = service.issue(LEARNER, COURSE).await.unwrap().into_certificate();

        let student = Caller::new(LEARNER, Role::Student);
        let err = service.approve(&student, cert.id).await.unwrap_err();
        assert!(matches!(err, CertificateServiceError::Forbidden));

        let approved = service.approve(&admin(), cert.id).await.unwrap();
        assert_eq!(approved.status, CertificateStatus::Approved);
        assert_eq!(approved.approved_by, Some(UserId::new(1)));

        let err = service.reject(&admin(), cert.id, "late").await.unwrap_err();
        assert!(matches!(
            err,
            CertificateServiceError::NotPending {
                status: CertificateStatus::Approved
            }
        ));

        let err = service
            .approve(&admin(), CertificateId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn reject_requires_a_reason() {
        let (_, service) = setup(100).await;
        let cert = service.issue(LEARNER, COURSE).await.unwrap().into_certificate();
        let err = service.reject(&admin(), cert.id, "   ").await.unwrap_err();
        assert!(matches!(err, CertificateServiceError::Invalid(_)));

        let rejected = service
            .reject(&admin(), cert.id, "name misspelled")
            .await
            .unwrap();
        assert_eq!(rejected.status, CertificateStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("name misspelled"));
    }

    #[tokio::test]
    async fn verification_reflects_approval() {
        let (_, service) = setup(100).await;
        let cert = service.issue(LEARNER, COURSE).await.unwrap().into_certificate();

        let pending = service.verify(&cert.cert_number).await.unwrap();
        assert!(!pending.is_valid);
        assert_eq!(pending.status, Some(CertificateStatus::Pending));

        service.approve(&admin(), cert.id).await.unwrap();
        let approved = service.verify(&cert.cert_number).await.unwrap();
        assert!(approved.is_valid);

        let unknown = service.verify("CERT-NOPE").await.unwrap();
        assert!(!unknown.is_valid);
        assert_eq!(unknown.user_name, None);
    }
}
