//! # Status Taxonomy
//!
//! Every call ends with exactly one `tonic::Status`. Handlers work with [`ServiceError`],
//! which only has variants for the closed set of failure codes exposed to callers, and convert
//! it into a `Status` at the handler boundary. Callers fold whatever code they receive back
//! into a [`StatusCode`] so they can branch on the failure category without looking at the
//! message text.
use crate::store::StoreError;
use tonic::{Code, Status};
use tracing::{error, warn};

/// The closed set of outcomes a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    /// Malformed identifier or payload. Not retryable without fixing the input.
    InvalidArgument,
    /// Well-formed request referencing an absent resource.
    NotFound,
    /// The attached deadline elapsed before completion.
    DeadlineExceeded,
    /// Explicit cancellation or transport disconnect.
    Cancelled,
    /// Store or transport failure.
    Internal,
}

impl StatusCode {
    /// Folds a wire code into the closed set. Codes outside of it become [`StatusCode::Internal`].
    pub fn from_code(code: Code) -> Self {
        match code {
            Code::Ok => StatusCode::Ok,
            Code::InvalidArgument => StatusCode::InvalidArgument,
            Code::NotFound => StatusCode::NotFound,
            Code::DeadlineExceeded => StatusCode::DeadlineExceeded,
            Code::Cancelled => StatusCode::Cancelled,
            _ => StatusCode::Internal,
        }
    }

    /// The wire code used to carry this outcome.
    pub fn code(self) -> Code {
        match self {
            StatusCode::Ok => Code::Ok,
            StatusCode::InvalidArgument => Code::InvalidArgument,
            StatusCode::NotFound => Code::NotFound,
            StatusCode::DeadlineExceeded => Code::DeadlineExceeded,
            StatusCode::Cancelled => Code::Cancelled,
            StatusCode::Internal => Code::Internal,
        }
    }
}

impl From<&Status> for StatusCode {
    fn from(status: &Status) -> Self {
        StatusCode::from_code(status.code())
    }
}

/// A domain failure, already translated into one of the codes of [`StatusCode`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidArgument(_) => StatusCode::InvalidArgument,
            ServiceError::NotFound(_) => StatusCode::NotFound,
            ServiceError::DeadlineExceeded(_) => StatusCode::DeadlineExceeded,
            ServiceError::Cancelled(_) => StatusCode::Cancelled,
            ServiceError::Internal(_) => StatusCode::Internal,
        }
    }

    /// Converts into the wire status without logging. Used on the caller side.
    pub fn to_status(&self) -> Status {
        Status::new(self.code().code(), self.detail())
    }

    fn detail(&self) -> &str {
        match self {
            ServiceError::InvalidArgument(detail)
            | ServiceError::NotFound(detail)
            | ServiceError::DeadlineExceeded(detail)
            | ServiceError::Cancelled(detail)
            | ServiceError::Internal(detail) => detail,
        }
    }
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        match err.code() {
            StatusCode::Internal => error!(detail = err.detail(), "call failed"),
            code => warn!(?code, detail = err.detail(), "call failed"),
        }
        err.to_status()
    }
}

/// Inbound statuses seen by a handler (e.g. the caller hanging up mid-stream).
impl From<Status> for ServiceError {
    fn from(status: Status) -> Self {
        let detail = status.message().to_string();
        match StatusCode::from(&status) {
            StatusCode::InvalidArgument => ServiceError::InvalidArgument(detail),
            StatusCode::NotFound => ServiceError::NotFound(detail),
            StatusCode::DeadlineExceeded => ServiceError::DeadlineExceeded(detail),
            StatusCode::Cancelled => ServiceError::Cancelled(detail),
            StatusCode::Ok | StatusCode::Internal => ServiceError::Internal(format!(
                "inbound stream failed with {}: {}",
                status.code(),
                detail
            )),
        }
    }
}

/// Store failures never carry caller-interpretable meaning, so they are always internal.
impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}
