mod certificate;
mod course;
mod enrollment;
mod ids;
mod progress;
mod role;
mod stage;
mod stage_lock;

pub use ids::{CertificateId, CourseId, LessonId, ParseIdError, UserId};
pub use stage::{LenientStages, Stage, StageSet, UnknownStageError, catalog};

pub use certificate::{
    Certificate, CertificateDecision, CertificateError, CertificateStatus, NewCertificate,
    certificate_number,
};
pub use course::{CourseConfig, CourseError, CourseProfile, UserProfile};
pub use enrollment::Enrollment;
pub use progress::{
    CourseProgress, CourseProgressUpdate, LessonDelta, LessonProgress, MAX_TIME_SPENT_SECS,
    ProgressError, checked_time_spent,
};
pub use role::{Caller, Role, UnknownRoleError};
pub use stage_lock::{StageAccess, StageLock};
