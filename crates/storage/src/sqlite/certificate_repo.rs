use chrono::{DateTime, Utc};
use lms_core::model::{
    Certificate, CertificateDecision, CertificateId, CertificateStatus, CourseId, NewCertificate,
    UserId,
};

use super::SqliteRepository;
use super::mapping::{db_err, id_to_i64, map_certificate_row};
use crate::repository::{CertificateRepository, StorageError};

const COLUMNS: &str = "id, user_id, course_id, cert_number, user_name, course_name, instructor, completion_date, issued_at, status, approved_by, approved_at, rejection_reason";

impl SqliteRepository {
    async fn fetch_certificates(
        &self,
        filter: &str,
        status: Option<CertificateStatus>,
    ) -> Result<Vec<Certificate>, StorageError> {
        let sql = format!("SELECT {COLUMNS} FROM certificates {filter}");
        let mut query = sqlx::query(&sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(map_certificate_row).collect()
    }
}

#[async_trait::async_trait]
impl CertificateRepository for SqliteRepository {
    async fn insert_pending(&self, cert: &NewCertificate) -> Result<Certificate, StorageError> {
        let sql = format!(
            r"
            INSERT INTO certificates (user_id, course_id, cert_number, user_name, course_name, instructor, completion_date, issued_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending')
            RETURNING {COLUMNS}
            "
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("user_id", cert.user_id.value())?)
            .bind(id_to_i64("course_id", cert.course_id.value())?)
            .bind(cert.cert_number.as_str())
            .bind(cert.user_name.as_str())
            .bind(cert.course_name.as_str())
            .bind(cert.instructor.as_str())
            .bind(cert.completion_date)
            .bind(cert.issued_at)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        map_certificate_row(&row)
    }

    async fn find_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Certificate>, StorageError> {
        let sql = format!("SELECT {COLUMNS} FROM certificates WHERE user_id = ?1 AND course_id = ?2");
        let row = sqlx::query(&sql)
            .bind(id_to_i64("user_id", user_id.value())?)
            .bind(id_to_i64("course_id", course_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(map_certificate_row).transpose()
    }

    async fn get_certificate(
        &self,
        id: CertificateId,
    ) -> Result<Option<Certificate>, StorageError> {
        let sql = format!("SELECT {COLUMNS} FROM certificates WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_to_i64("certificate_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(map_certificate_row).transpose()
    }

    async fn find_by_number(&self, cert_number: &str) -> Result<Option<Certificate>, StorageError> {
        let sql = format!("SELECT {COLUMNS} FROM certificates WHERE cert_number = ?1");
        let row = sqlx::query(&sql)
            .bind(cert_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(map_certificate_row).transpose()
    }

    async fn record_decision(
        &self,
        id: CertificateId,
        decision: &CertificateDecision,
        admin: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let reason = match decision {
            CertificateDecision::Approve => None,
            CertificateDecision::Reject { reason } => Some(reason.as_str()),
        };
        let res = sqlx::query(
            r"
            UPDATE certificates
            SET status = ?2, approved_by = ?3, approved_at = ?4, rejection_reason = ?5
            WHERE id = ?1 AND status = 'pending'
            ",
        )
        .bind(id_to_i64("certificate_id", id.value())?)
        .bind(decision.target_status().as_str())
        .bind(id_to_i64("approved_by", admin.value())?)
        .bind(at)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Certificate>, StorageError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM certificates WHERE user_id = ?1 ORDER BY issued_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_to_i64("user_id", user_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(map_certificate_row).collect()
    }

    async fn list_certificates(
        &self,
        status: Option<CertificateStatus>,
    ) -> Result<Vec<Certificate>, StorageError> {
        match status {
            Some(CertificateStatus::Pending) => {
                self.fetch_certificates(
                    "WHERE status = ?1 ORDER BY issued_at ASC, id ASC",
                    Some(CertificateStatus::Pending),
                )
                .await
            }
            Some(other) => {
                self.fetch_certificates(
                    "WHERE status = ?1 ORDER BY issued_at DESC, id DESC",
                    Some(other),
                )
                .await
            }
            None => {
                self.fetch_certificates("ORDER BY issued_at DESC, id DESC", None)
                    .await
            }
        }
    }
}
