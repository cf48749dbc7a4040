use thiserror::Error;

use crate::aggregator::StepWeightsError;
use crate::model::{
    CertificateError, CourseError, ParseIdError, ProgressError, UnknownRoleError,
    UnknownStageError,
};

/// Any validation failure raised by the domain types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Stage(#[from] UnknownStageError),
    #[error(transparent)]
    StepWeights(#[from] StepWeightsError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Role(#[from] UnknownRoleError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
