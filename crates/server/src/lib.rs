#![forbid(unsafe_code)]

pub mod auth;
pub mod error;
mod extract;
mod routes;

use axum::Router;
use axum::routing::{get, post};
use services::AppServices;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "server=info,services=info,storage=warn";

/// Turn a `--db` value into a `SQLite` URL. Bare paths are opened read-write
/// and created when missing.
#[must_use]
pub fn normalize_db_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("sqlite:") {
        raw.to_owned()
    } else {
        format!("sqlite://{raw}?mode=rwc")
    }
}

pub fn build_router(app: AppServices) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health))
        .route("/progress", get(routes::list_progress))
        .route("/progress/sync", post(routes::sync_progress))
        .route("/progress/courses/:course_id", get(routes::course_progress))
        .route(
            "/progress/courses/:course_id/lessons/:lesson_id",
            get(routes::lesson_progress).put(routes::update_lesson),
        )
        .route("/courses/:course_id/enroll", post(routes::enroll))
        .route(
            "/courses/:course_id/stages/:stage/access",
            get(routes::stage_access),
        )
        .route(
            "/courses/:course_id/certificate",
            get(routes::course_certificate).post(routes::request_certificate),
        )
        .route("/certificates", get(routes::my_certificates))
        .route(
            "/certificates/verify/:cert_number",
            get(routes::verify_certificate),
        )
        .route(
            "/admin/courses/:course_id/stage-locks",
            get(routes::list_stage_locks).put(routes::set_stage_lock),
        )
        .route(
            "/admin/courses/:course_id/config",
            get(routes::course_config).put(routes::update_course_config),
        )
        .route("/admin/certificates", get(routes::list_certificates))
        .route(
            "/admin/certificates/:id/approve",
            post(routes::approve_certificate),
        )
        .route(
            "/admin/certificates/:id/reject",
            post(routes::reject_certificate),
        );

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use lms_core::time::fixed_clock;
    use serde_json::{Value, json};
    use services::DemoSeed;
    use tower::ServiceExt;

    use crate::auth::{USER_ID_HEADER, USER_ROLE_HEADER};

    async fn seeded_router() -> Router {
        let app = AppServices::in_memory(fixed_clock());
        app.seed_demo(&DemoSeed::default()).await.unwrap();
        build_router(app)
    }

    fn request(method: &str, uri: &str, who: Option<(u64, &str)>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = who {
            builder = builder
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_ROLE_HEADER, role);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    const LEARNER: Option<(u64, &str)> = Some((2, "student"));
    const ADMIN: Option<(u64, &str)> = Some((1, "admin"));

    #[test]
    fn bare_paths_become_sqlite_urls() {
        assert_eq!(normalize_db_url("lms.db"), "sqlite://lms.db?mode=rwc");
        assert_eq!(normalize_db_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn health_needs_no_identity() {
        let router = seeded_router().await;
        let (status, body) = call(&router, request("GET", "/api/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let router = seeded_router().await;
        let (status, body) = call(&router, request("GET", "/api/progress", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthenticated");
    }

    #[tokio::test]
    async fn sync_then_certificate_review_over_http() {
        let router = seeded_router().await;

        let (status, body) = call(
            &router,
            request(
                "POST",
                "/api/progress/sync",
                LEARNER,
                Some(json!({"courseId": 1, "currentStep": "posttest", "completedSteps": ["intro"]})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overallProgress"], 5);
        assert_eq!(body["currentStep"], "pretest");

        let (status, body) = call(
            &router,
            request("POST", "/api/courses/1/certificate", LEARNER, None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "not_eligible");

        let all = ["intro", "pretest", "lessons", "posttest", "postwork", "finalproject"];
        let (_, body) = call(
            &router,
            request(
                "POST",
                "/api/progress/sync",
                LEARNER,
                Some(json!({"courseId": 1, "completedSteps": all, "totalTimeSpent": 900})),
            ),
        )
        .await;
        assert_eq!(body["overallProgress"], 100);
        assert_eq!(body["currentStep"], "finalproject");
        assert_eq!(body["certificateStatus"], "pending");

        let (status, cert) = call(
            &router,
            request("POST", "/api/courses/1/certificate", LEARNER, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = cert["id"].as_u64().unwrap();

        let approve = format!("/api/admin/certificates/{id}/approve");
        let (status, _) = call(&router, request("POST", &approve, LEARNER, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&router, request("POST", &approve, ADMIN, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");

        let (status, body) = call(&router, request("POST", &approve, ADMIN, None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "not_pending");

        let verify = format!(
            "/api/certificates/verify/{}",
            cert["certNumber"].as_str().unwrap()
        );
        let (status, body) = call(&router, request("GET", &verify, None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isValid"], true);
    }

    #[tokio::test]
    async fn locked_stage_is_reported_to_learners() {
        let router = seeded_router().await;
        let (status, _) = call(
            &router,
            request(
                "PUT",
                "/api/admin/courses/1/stage-locks",
                ADMIN,
                Some(json!({"stageName": "posttest", "isLocked": true, "lockMessage": "Opens Friday"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(
            &router,
            request("GET", "/api/courses/1/stages/posttest/access", LEARNER, None),
        )
        .await;
        assert_eq!(body["canAccess"], false);
        assert_eq!(body["lockMessage"], "Opens Friday");

        let (_, body) = call(
            &router,
            request("GET", "/api/courses/1/stages/posttest/access", ADMIN, None),
        )
        .await;
        assert_eq!(body["canAccess"], true);

        let (status, body) = call(
            &router,
            request("GET", "/api/courses/1/stages/capstone/access", LEARNER, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn malformed_requests_get_json_errors() {
        let router = seeded_router().await;
        let malformed = Request::builder()
            .method("POST")
            .uri("/api/progress/sync")
            .header(USER_ID_HEADER, "2")
            .header(USER_ROLE_HEADER, "student")
            .header("content-type", "application/json")
            .body(Body::from("{\"courseId\": "))
            .unwrap();
        let (status, body) = call(&router, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, body) = call(
            &router,
            request("GET", "/api/progress/courses/not-a-number", LEARNER, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, body) = call(
            &router,
            request("GET", "/api/admin/certificates?status=lost", ADMIN, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn course_config_is_admin_only() {
        let router = seeded_router().await;
        let (status, body) = call(
            &router,
            request("GET", "/api/admin/courses/1/config", LEARNER, None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, body) = call(
            &router,
            request("GET", "/api/admin/courses/1/config", ADMIN, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stepWeights"]["lessons"], 50);
    }

    #[tokio::test]
    async fn unenrolled_sync_is_forbidden() {
        let router = seeded_router().await;
        let (status, body) = call(
            &router,
            request(
                "POST",
                "/api/progress/sync",
                Some((1, "admin")),
                Some(json!({"courseId": 1, "completedSteps": ["intro"]})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "not_enrolled");
    }
}
