use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use lms_core::model::{CertificateId, CertificateStatus, CourseId, LessonId};
use services::AppServices;
use services::views::{
    CertificateVerification, CertificateView, CourseConfigUpdate, CourseConfigView,
    EnrollmentView, LessonProgressView, LessonUpdate, ProgressSnapshot, StageAccessView,
    StageLockUpdate, StageLockView, SyncRequest,
};

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::extract::{JsonBody, Path, Query};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "lmsd",
    })
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

pub(crate) async fn sync_progress(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    JsonBody(request): JsonBody<SyncRequest>,
) -> ApiResult<ProgressSnapshot> {
    Ok(Json(app.progress().sync(caller.user_id, request).await?))
}

pub(crate) async fn list_progress(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
) -> ApiResult<Vec<ProgressSnapshot>> {
    Ok(Json(app.progress().list_progress(caller.user_id).await?))
}

pub(crate) async fn course_progress(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(course_id): Path<CourseId>,
) -> ApiResult<ProgressSnapshot> {
    Ok(Json(
        app.progress()
            .course_progress(caller.user_id, course_id)
            .await?,
    ))
}

pub(crate) async fn lesson_progress(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path((course_id, lesson_id)): Path<(CourseId, LessonId)>,
) -> ApiResult<LessonProgressView> {
    Ok(Json(
        app.progress()
            .lesson_progress(caller.user_id, course_id, lesson_id)
            .await?,
    ))
}

pub(crate) async fn update_lesson(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path((course_id, lesson_id)): Path<(CourseId, LessonId)>,
    JsonBody(update): JsonBody<LessonUpdate>,
) -> ApiResult<LessonProgressView> {
    Ok(Json(
        app.progress()
            .update_lesson(caller.user_id, course_id, lesson_id, update)
            .await?,
    ))
}

pub(crate) async fn enroll(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(course_id): Path<CourseId>,
) -> ApiResult<EnrollmentView> {
    Ok(Json(app.progress().enroll(caller.user_id, course_id).await?))
}

//
// ─── STAGE GATE ────────────────────────────────────────────────────────────────
//

pub(crate) async fn stage_access(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path((course_id, stage)): Path<(CourseId, String)>,
) -> ApiResult<StageAccessView> {
    Ok(Json(
        app.stage_gate()
            .check_access(&caller, course_id, &stage)
            .await?,
    ))
}

pub(crate) async fn list_stage_locks(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(course_id): Path<CourseId>,
) -> ApiResult<Vec<StageLockView>> {
    Ok(Json(app.stage_gate().list_locks(&caller, course_id).await?))
}

pub(crate) async fn set_stage_lock(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(course_id): Path<CourseId>,
    JsonBody(update): JsonBody<StageLockUpdate>,
) -> ApiResult<StageLockView> {
    Ok(Json(
        app.stage_gate()
            .set_lock(&caller, course_id, update)
            .await?,
    ))
}

//
// ─── COURSE CONFIG ─────────────────────────────────────────────────────────────
//

pub(crate) async fn course_config(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(course_id): Path<CourseId>,
) -> ApiResult<CourseConfigView> {
    Ok(Json(app.course_config().get(&caller, course_id).await?))
}

pub(crate) async fn update_course_config(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(course_id): Path<CourseId>,
    JsonBody(update): JsonBody<CourseConfigUpdate>,
) -> ApiResult<CourseConfigView> {
    Ok(Json(
        app.course_config()
            .update(&caller, course_id, update)
            .await?,
    ))
}

//
// ─── CERTIFICATES ──────────────────────────────────────────────────────────────
//

/// 201 when this request created the certificate, 200 when it already existed.
pub(crate) async fn request_certificate(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(course_id): Path<CourseId>,
) -> Result<(StatusCode, Json<CertificateView>), ApiError> {
    let outcome = app
        .certificates()
        .issue(caller.user_id, course_id)
        .await?;
    let status = if outcome.is_new() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.into_certificate().into())))
}

pub(crate) async fn course_certificate(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(course_id): Path<CourseId>,
) -> ApiResult<CertificateView> {
    app.certificates()
        .get_for_course(caller.user_id, course_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no certificate for course {course_id}")))
}

pub(crate) async fn my_certificates(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
) -> ApiResult<Vec<CertificateView>> {
    Ok(Json(app.certificates().list_mine(caller.user_id).await?))
}

pub(crate) async fn verify_certificate(
    State(app): State<AppServices>,
    Path(cert_number): Path<String>,
) -> ApiResult<CertificateVerification> {
    Ok(Json(app.certificates().verify(&cert_number).await?))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CertificateFilter {
    status: Option<String>,
}

pub(crate) async fn list_certificates(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Query(filter): Query<CertificateFilter>,
) -> ApiResult<Vec<CertificateView>> {
    let status = filter
        .status
        .as_deref()
        .map(str::parse::<CertificateStatus>)
        .transpose()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(app.certificates().list(&caller, status).await?))
}

pub(crate) async fn approve_certificate(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(id): Path<CertificateId>,
) -> ApiResult<CertificateView> {
    Ok(Json(app.certificates().approve(&caller, id).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RejectRequest {
    reason: String,
}

pub(crate) async fn reject_certificate(
    State(app): State<AppServices>,
    Authenticated(caller): Authenticated,
    Path(id): Path<CertificateId>,
    JsonBody(body): JsonBody<RejectRequest>,
) -> ApiResult<CertificateView> {
    Ok(Json(
        app.certificates()
            .reject(&caller, id, &body.reason)
            .await?,
    ))
}
