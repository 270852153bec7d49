//! The canonical error kind shared by every component.
//!
//! Every component boundary (registry, config store, discovery, agent)
//! converges on this enum so that callers get one consistent set of
//! kinds to match on. `tonic::Status` conversions live here so
//! transport code never has to hand-roll status codes.

use std::fmt;

/// A canonical error produced by any `aio` component.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing required field, bad TTL, unknown env, unsafe path, unknown systemctl action.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown service/instance/config key/revision; heartbeat for missing instance.
    #[error("not found: {0}")]
    NotFound(String),

    /// `CreateConfig` on an extant key.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Missing/invalid/expired token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Skip-list mismatch / policy denies action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any per-call deadline, including agent subprocesses.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Transport errors; no healthy instances in the discovery resolver.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A validator rejected a proposed change and rollback succeeded.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// A validator rejected a change AND rollback also failed, or a backing-store failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_argument(msg: impl fmt::Display) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    pub fn not_found(msg: impl fmt::Display) -> Self {
        Error::NotFound(msg.to_string())
    }

    pub fn already_exists(msg: impl fmt::Display) -> Self {
        Error::AlreadyExists(msg.to_string())
    }

    pub fn unauthenticated(msg: impl fmt::Display) -> Self {
        Error::Unauthenticated(msg.to_string())
    }

    pub fn permission_denied(msg: impl fmt::Display) -> Self {
        Error::PermissionDenied(msg.to_string())
    }

    pub fn deadline_exceeded(msg: impl fmt::Display) -> Self {
        Error::DeadlineExceeded(msg.to_string())
    }

    pub fn unavailable(msg: impl fmt::Display) -> Self {
        Error::Unavailable(msg.to_string())
    }

    pub fn failed_precondition(msg: impl fmt::Display) -> Self {
        Error::FailedPrecondition(msg.to_string())
    }

    pub fn internal(msg: impl fmt::Display) -> Self {
        Error::Internal(msg.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Error::Unauthenticated(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        let msg = err.to_string();
        match err {
            Error::InvalidArgument(_) => tonic::Status::invalid_argument(msg),
            Error::NotFound(_) => tonic::Status::not_found(msg),
            Error::AlreadyExists(_) => tonic::Status::already_exists(msg),
            Error::Unauthenticated(_) => tonic::Status::unauthenticated(msg),
            Error::PermissionDenied(_) => tonic::Status::permission_denied(msg),
            Error::DeadlineExceeded(_) => tonic::Status::deadline_exceeded(msg),
            Error::Unavailable(_) => tonic::Status::unavailable(msg),
            Error::FailedPrecondition(_) => tonic::Status::failed_precondition(msg),
            Error::Internal(_) => tonic::Status::internal(msg),
        }
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        let msg = status.message().to_string();
        match status.code() {
            tonic::Code::InvalidArgument => Error::InvalidArgument(msg),
            tonic::Code::NotFound => Error::NotFound(msg),
            tonic::Code::AlreadyExists => Error::AlreadyExists(msg),
            tonic::Code::Unauthenticated => Error::Unauthenticated(msg),
            tonic::Code::PermissionDenied => Error::PermissionDenied(msg),
            tonic::Code::DeadlineExceeded => Error::DeadlineExceeded(msg),
            tonic::Code::Unavailable => Error::Unavailable(msg),
            tonic::Code::FailedPrecondition => Error::FailedPrecondition(msg),
            _ => Error::Internal(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
