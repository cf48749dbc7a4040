use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::course::{CourseProfile, UserProfile};
use crate::model::ids::{CertificateId, CourseId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CertificateError {
    #[error("a rejection needs a reason")]
    EmptyReason,

    #[error("certificate is {status}, not pending")]
    NotPending { status: CertificateStatus },

    #[error("unknown certificate status: {0:?}")]
    UnknownStatus(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Stored lifecycle state. "Absent" is not a status: it is the lack of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Pending,
    Approved,
    Rejected,
}

impl CertificateStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Approved => "approved",
            CertificateStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateStatus {
    type Err = CertificateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CertificateStatus::Pending),
            "approved" => Ok(CertificateStatus::Approved),
            "rejected" => Ok(CertificateStatus::Rejected),
            other => Err(CertificateError::UnknownStatus(other.to_owned())),
        }
    }
}

//
// ─── NUMBER ────────────────────────────────────────────────────────────────────
//

/// `CERT-<yyyymmdd>-<courseId>-<userId>-<4 hex>`.
///
/// The suffix only makes collisions unlikely; the store's unique index on the
/// number is what guarantees uniqueness.
#[must_use]
pub fn certificate_number(
    course_id: CourseId,
    user_id: UserId,
    issued_at: DateTime<Utc>,
    suffix: u16,
) -> String {
    format!(
        "CERT-{}-{}-{}-{:04X}",
        issued_at.format("%Y%m%d"),
        course_id,
        user_id,
        suffix
    )
}

//
// ─── CERTIFICATE ───────────────────────────────────────────────────────────────
//

/// Everything written when a certificate is first issued.
///
/// Names are copied at issuance so later edits to the user or course do not
/// change an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCertificate {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub cert_number: String,
    pub user_name: String,
    pub course_name: String,
    pub instructor: String,
    pub completion_date: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

impl NewCertificate {
    #[must_use]
    pub fn snapshot(
        user: &UserProfile,
        course: &CourseProfile,
        completion_date: DateTime<Utc>,
        issued_at: DateTime<Utc>,
        suffix: u16,
    ) -> Self {
        Self {
            user_id: user.id(),
            course_id: course.id(),
            cert_number: certificate_number(course.id(), user.id(), issued_at, suffix),
            user_name: user.display_name().to_owned(),
            course_name: course.title().to_owned(),
            instructor: course.instructor().to_owned(),
            completion_date,
            issued_at,
        }
    }

    /// Pending row as it looks once stored under `id`.
    #[must_use]
    pub fn into_pending(self, id: CertificateId) -> Certificate {
        Certificate {
            id,
            user_id: self.user_id,
            course_id: self.course_id,
            cert_number: self.cert_number,
            user_name: self.user_name,
            course_name: self.course_name,
            instructor: self.instructor,
            completion_date: self.completion_date,
            issued_at: self.issued_at,
            status: CertificateStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
        }
    }
}

/// Admin verdict on a pending certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateDecision {
    Approve,
    Reject { reason: String },
}

impl CertificateDecision {
    /// # Errors
    ///
    /// Returns `CertificateError::EmptyReason` for a blank reason.
    pub fn reject(reason: impl Into<String>) -> Result<Self, CertificateError> {
        let reason = reason.into().trim().to_owned();
        if reason.is_empty() {
            return Err(CertificateError::EmptyReason);
        }
        Ok(CertificateDecision::Reject { reason })
    }

    #[must_use]
    pub fn target_status(&self) -> CertificateStatus {
        match self {
            CertificateDecision::Approve => CertificateStatus::Approved,
            CertificateDecision::Reject { .. } => CertificateStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
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
    /// Admin who approved or rejected.
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl Certificate {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == CertificateStatus::Approved
    }

    /// Apply an admin verdict.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::NotPending` when the certificate was already
    /// decided; the row is left untouched.
    pub fn decide(
        &mut self,
        decision: &CertificateDecision,
        admin: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), CertificateError> {
        if self.status != CertificateStatus::Pending {
            return Err(CertificateError::NotPending {
                status: self.status,
            });
        }
        self.status = decision.target_status();
        self.approved_by = Some(admin);
        self.approved_at = Some(at);
        if let CertificateDecision::Reject { reason } = decision {
            self.rejection_reason = Some(reason.clone());
        }
        Ok(())
    }
}
