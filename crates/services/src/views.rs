//! Request and response shapes exchanged with callers.
//!
//! Field names are camelCase on the wire. Responses always carry stored
//! values, never an echo of the request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lms_core::model::{
    Certificate, CertificateId, CertificateStatus, CourseConfig, CourseId, CourseProgress,
    LessonId, LessonProgress, Stage, StageAccess, StageLock, UserId,
};

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// One lesson's client-side state inside a sync, or a standalone update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LessonUpdate {
    pub progress: u32,
    pub completed: bool,
    /// Seconds spent since the previous report.
    pub time_spent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub course_id: CourseId,
    /// Advisory only; the resume pointer is always recomputed.
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub lesson_progress: BTreeMap<LessonId, LessonUpdate>,
    /// Cumulative seconds in the course as the client counts them.
    #[serde(default)]
    pub total_time_spent: u64,
    #[serde(default)]
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub course_id: CourseId,
    pub current_step: Stage,
    pub completed_steps: Vec<Stage>,
    pub overall_progress: u8,
    pub total_time_spent: u64,
    pub lessons_completed: u32,
    pub total_lessons: u32,
    pub lesson_completion: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub certificate_status: Option<CertificateStatus>,
}

impl ProgressSnapshot {
    /// Snapshot of a stored row. The resume pointer is re-resolved from the
    /// completed stages rather than read from the row.
    #[must_use]
    pub fn stored(progress: &CourseProgress, certificate_status: Option<CertificateStatus>) -> Self {
        Self {
            course_id: progress.course_id,
            current_step: progress.resume_stage(),
            completed_steps: progress.completed_stages.as_slice().to_vec(),
            overall_progress: progress.overall_progress,
            total_time_spent: progress.time_spent_secs,
            lessons_completed: progress.lessons_completed,
            total_lessons: progress.total_lessons,
            lesson_completion: progress.lesson_completion(),
            started_at: Some(progress.started_at),
            updated_at: Some(progress.updated_at),
            completed_at: progress.completed_at,
            certificate_status,
        }
    }

    /// What a learner who never synced sees.
    #[must_use]
    pub fn not_started(course_id: CourseId, total_lessons: u32) -> Self {
        Self {
            course_id,
            current_step: Stage::Intro,
            completed_steps: Vec::new(),
            overall_progress: 0,
            total_time_spent: 0,
            lessons_completed: 0,
            total_lessons,
            lesson_completion: 0,
            started_at: None,
            updated_at: None,
            completed_at: None,
            certificate_status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressView {
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub completed: bool,
    pub progress: u8,
    pub time_spent: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonProgressView {
    #[must_use]
    pub fn stored(lesson: &LessonProgress) -> Self {
        Self {
            course_id: lesson.course_id,
            lesson_id: lesson.lesson_id,
            completed: lesson.completed,
            progress: lesson.progress,
            time_spent: lesson.time_spent_secs,
            started_at: Some(lesson.started_at),
            updated_at: Some(lesson.updated_at),
            completed_at: lesson.completed_at,
        }
    }

    #[must_use]
    pub fn untouched(course_id: CourseId, lesson_id: LessonId) -> Self {
        Self {
            course_id,
            lesson_id,
            completed: false,
            progress: 0,
            time_spent: 0,
            started_at: None,
            updated_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
    pub progress: u8,
    pub completed_at: Option<DateTime<Utc>>,
}

//
// ─── STAGE GATE ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageAccessView {
    pub course_id: CourseId,
    pub stage: Stage,
    pub is_locked: bool,
    pub lock_message: String,
    pub can_access: bool,
}

impl StageAccessView {
    #[must_use]
    pub fn new(course_id: CourseId, stage: Stage, access: StageAccess) -> Self {
        Self {
            course_id,
            stage,
            is_locked: access.is_locked,
            lock_message: access.lock_message,
            can_access: access.can_access,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageLockUpdate {
    pub stage_name: String,
    pub is_locked: bool,
    #[serde(default)]
    pub lock_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageLockView {
    pub course_id: CourseId,
    pub stage: Stage,
    pub is_locked: bool,
    pub lock_message: String,
    pub locked_by: Option<UserId>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl From<StageLock> for StageLockView {
    fn from(lock: StageLock) -> Self {
        Self {
            course_id: lock.course_id,
            stage: lock.stage,
            is_locked: lock.is_locked,
            lock_message: lock.lock_message,
            locked_by: lock.locked_by,
            locked_at: lock.locked_at,
        }
    }
}

//
// ─── COURSE CONFIG ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseConfigView {
    pub course_id: CourseId,
    pub has_post_work: bool,
    pub has_final_project: bool,
    pub step_weights: BTreeMap<&'static str, u8>,
}

impl CourseConfigView {
    #[must_use]
    pub fn new(course_id: CourseId, config: &CourseConfig) -> Self {
        Self {
            course_id,
            has_post_work: config.has_post_work,
            has_final_project: config.has_final_project,
            step_weights: config.step_weights.to_named(),
        }
    }
}

/// Admin edit of a course's progress configuration. Omitted flags keep their
/// stored value; omitted weights reset to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseConfigUpdate {
    pub has_post_work: Option<bool>,
    pub has_final_project: Option<bool>,
    pub step_weights: Option<BTreeMap<String, u32>>,
}

//
// ─── CERTIFICATES ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateView {
    pub id: CertificateId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub cert_number: String,
    pub user_name: String,
    pub course_name: String,
    pub instructor: String,
    pub completion_date: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub status: CertificateStatus,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl From<Certificate> for CertificateView {
    fn from(cert: Certificate) -> Self {
        Self {
            id: cert.id,
            user_id: cert.user_id,
            course_id: cert.course_id,
            cert_number: cert.cert_number,
            user_name: cert.user_name,
            course_name: cert.course_name,
            instructor: cert.instructor,
            completion_date: cert.completion_date,
            issued_at: cert.issued_at,
            status: cert.status,
            approved_by: cert.approved_by,
            approved_at: cert.approved_at,
            rejection_reason: cert.rejection_reason,
        }
    }
}

/// Public verification result. Unknown numbers carry only the number and
/// `isValid = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateVerification {
    pub cert_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CertificateStatus>,
    pub is_valid: bool,
}

impl CertificateVerification {
    #[must_use]
    pub fn of(cert_number: &str, found: Option<Certificate>) -> Self {
        match found {
            Some(cert) => Self {
                cert_number: cert.cert_number.clone(),
                is_valid: cert.is_valid(),
                user_name: Some(cert.user_name),
                course_name: Some(cert.course_name),
                instructor: Some(cert.instructor),
                completion_date: Some(cert.completion_date),
                issued_at: Some(cert.issued_at),
                status: Some(cert.status),
            },
            None => Self {
                cert_number: cert_number.to_owned(),
                user_name: None,
                course_name: None,
                instructor: None,
                completion_date: None,
                issued_at: None,
                status: None,
                is_valid: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_request_reads_camel_case_and_lesson_keys() {
        let raw = r#"{
            "courseId": 7,
            "currentStep": "posttest",
            "completedSteps": ["intro", "pretest"],
            "lessonProgress": {"3": {"progress": 100, "completed": true, "timeSpent": 60}},
            "totalTimeSpent": 120
        }"#;
        let req: SyncRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.course_id, CourseId::new(7));
        assert_eq!(req.completed_steps, vec!["intro", "pretest"]);
        let lesson = req.lesson_progress[&LessonId::new(3)];
        assert!(lesson.completed);
        assert_eq!(lesson.time_spent, 60);
        assert_eq!(req.completed_at, None);
    }

    #[test]
    fn unknown_certificate_verifies_as_invalid() {
        let json = serde_json::to_value(CertificateVerification::of("CERT-X", None)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"certNumber": "CERT-X", "isValid": false})
        );
    }
}
