#![forbid(unsafe_code)]

pub mod app_services;
pub mod certificate_service;
pub mod course_config_service;
pub mod error;
pub mod progress_service;
pub mod seed;
pub mod stage_gate_service;
pub mod views;

pub use lms_core::Clock;

pub use app_services::AppServices;
pub use certificate_service::{CertificateService, IssueOutcome};
pub use course_config_service::CourseConfigService;
pub use error::{
    AppServicesError, CertificateServiceError, CourseConfigError, ProgressServiceError,
    StageGateError,
};
pub use progress_service::ProgressService;
pub use seed::DemoSeed;
pub use stage_gate_service::StageGateService;
