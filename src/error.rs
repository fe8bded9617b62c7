use crate::types::{RoleId, SubjectId};
use std::time::Duration;
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Role directory error type.
pub type DirectoryError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid duration or timestamp input.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// The subject already holds an active grant.
    #[error("subject {subject} already has an active grant")]
    AlreadyActive { subject: SubjectId },
    /// The subject holds no grant.
    #[error("subject {subject} has no active grant")]
    NoActiveGrant { subject: SubjectId },
    /// Role directory call failed.
    #[error("directory error: {0}")]
    Directory(#[source] DirectoryError),
    /// Role directory call did not resolve in time.
    #[error("directory call timed out after {timeout:?}")]
    DirectoryTimeout { timeout: Duration },
    /// The actor may not manage the target role.
    #[error("not allowed to manage role {role}")]
    AuthorizationDenied { role: RoleId },
    /// Persisted state could not be decoded.
    #[error("corrupt state in {path}: {reason}")]
    CorruptState { path: String, reason: String },
    /// Store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),
    /// Release lookup failed.
    #[error("update check failed: {0}")]
    UpdateCheck(#[source] StoreError),
}

impl Error {
    /// Returns whether the error originated in the role directory.
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_) | Self::DirectoryTimeout { .. })
    }
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Store(Box::new(error))
    }
}
