use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lms_core::aggregator::StepWeights;
use lms_core::model::{
    Certificate, CertificateId, CertificateStatus, CourseConfig, CourseId, CourseProfile,
    CourseProgress, Enrollment, LessonId, LessonProgress, Stage, StageLock, StageSet, UserId,
    UserProfile,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps driver errors onto the storage taxonomy. Unique violations become
/// `Conflict`, foreign key violations `NotFound`.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
        _ => StorageError::Connection(e.to_string()),
    }
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn certificate_id_from_i64(v: i64) -> Result<CertificateId, StorageError> {
    Ok(CertificateId::new(i64_to_u64("certificate_id", v)?))
}

fn percent(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn count(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn secs_to_i64(v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization("time_spent overflow".into()))
}

pub(crate) fn parse_stage(s: &str) -> Result<Stage, StorageError> {
    s.parse::<Stage>().map_err(ser)
}

pub(crate) fn weights_to_json(weights: &StepWeights) -> Result<String, StorageError> {
    serde_json::to_string(&weights.to_named()).map_err(ser)
}

fn weights_from_json(raw: &str) -> Result<StepWeights, StorageError> {
    let named: BTreeMap<String, u32> = serde_json::from_str(raw).map_err(ser)?;
    StepWeights::from_named(named.iter().map(|(k, v)| (k.as_str(), *v))).map_err(ser)
}

pub(crate) fn map_user_row(row: &SqliteRow) -> Result<UserProfile, StorageError> {
    UserProfile::new(
        user_id_from_i64(row.try_get("id").map_err(ser)?)?,
        row.try_get::<String, _>("display_name").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<CourseProfile, StorageError> {
    let config = CourseConfig {
        has_post_work: row.try_get::<i64, _>("has_post_work").map_err(ser)? != 0,
        has_final_project: row.try_get::<i64, _>("has_final_project").map_err(ser)? != 0,
        step_weights: weights_from_json(&row.try_get::<String, _>("step_weights").map_err(ser)?)?,
    };
    CourseProfile::new(
        course_id_from_i64(row.try_get("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<String, _>("instructor").map_err(ser)?,
        count("lesson_count", row.try_get("lesson_count").map_err(ser)?)?,
        config,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment {
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        course_id: course_id_from_i64(row.try_get("course_id").map_err(ser)?)?,
        enrolled_at: row.try_get("enrolled_at").map_err(ser)?,
        progress: percent("progress", row.try_get("progress").map_err(ser)?)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<LessonProgress, StorageError> {
    Ok(LessonProgress {
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        course_id: course_id_from_i64(row.try_get("course_id").map_err(ser)?)?,
        lesson_id: lesson_id_from_i64(row.try_get("lesson_id").map_err(ser)?)?,
        completed: row.try_get::<i64, _>("completed").map_err(ser)? != 0,
        progress: percent("progress", row.try_get("progress").map_err(ser)?)?,
        time_spent_secs: i64_to_u64("time_spent", row.try_get("time_spent").map_err(ser)?)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

/// Course progress row without its stages; callers attach the stored set.
pub(crate) fn map_course_progress_row(
    row: &SqliteRow,
    completed_stages: StageSet,
) -> Result<CourseProgress, StorageError> {
    let current_step: String = row.try_get("current_step").map_err(ser)?;
    Ok(CourseProgress {
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        course_id: course_id_from_i64(row.try_get("course_id").map_err(ser)?)?,
        current_step: parse_stage(&current_step)?,
        completed_stages,
        time_spent_secs: i64_to_u64("time_spent", row.try_get("time_spent").map_err(ser)?)?,
        overall_progress: percent(
            "overall_progress",
            row.try_get("overall_progress").map_err(ser)?,
        )?,
        lessons_completed: count(
            "lessons_completed",
            row.try_get("lessons_completed").map_err(ser)?,
        )?,
        total_lessons: count("total_lessons", row.try_get("total_lessons").map_err(ser)?)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_stage_lock_row(row: &SqliteRow) -> Result<StageLock, StorageError> {
    let stage: String = row.try_get("stage").map_err(ser)?;
    Ok(StageLock {
        course_id: course_id_from_i64(row.try_get("course_id").map_err(ser)?)?,
        stage: parse_stage(&stage)?,
        is_locked: row.try_get::<i64, _>("is_locked").map_err(ser)? != 0,
        lock_message: row.try_get("lock_message").map_err(ser)?,
        locked_by: row
            .try_get::<Option<i64>, _>("locked_by")
            .map_err(ser)?
            .map(user_id_from_i64)
            .transpose()?,
        locked_at: row.try_get("locked_at").map_err(ser)?,
    })
}

pub(crate) fn map_certificate_row(row: &SqliteRow) -> Result<Certificate, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let completion_date: DateTime<Utc> = row.try_get("completion_date").map_err(ser)?;
    Ok(Certificate {
        id: certificate_id_from_i64(row.try_get("id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        course_id: course_id_from_i64(row.try_get("course_id").map_err(ser)?)?,
        cert_number: row.try_get("cert_number").map_err(ser)?,
        user_name: row.try_get("user_name").map_err(ser)?,
        course_name: row.try_get("course_name").map_err(ser)?,
        instructor: row.try_get("instructor").map_err(ser)?,
        completion_date,
        issued_at: row.try_get("issued_at").map_err(ser)?,
        status: status.parse::<CertificateStatus>().map_err(ser)?,
        approved_by: row
            .try_get::<Option<i64>, _>("approved_by")
            .map_err(ser)?
            .map(user_id_from_i64)
            .transpose()?,
        approved_at: row.try_get("approved_at").map_err(ser)?,
        rejection_reason: row.try_get("rejection_reason").map_err(ser)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_survive_json() {
        let weights = StepWeights::from_named([("intro", 20), ("lessons", 80)]).unwrap();
        let json = weights_to_json(&weights).unwrap();
        assert_eq!(weights_from_json(&json).unwrap(), weights);
    }

    #[test]
    fn corrupt_weights_are_serialization_errors() {
        let err = weights_from_json(r#"{"intro": 5}"#).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
