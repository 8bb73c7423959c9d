//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{CourseError, CourseId};
use storage::repository::StorageError;

/// Errors emitted by `ProgressStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while fetching a server progress summary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("progress sync is not configured")]
    Disabled,
    #[error("progress summary request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("progress summary source unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a media handle or player factory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MediaError {
    #[error("player backend error: {0}")]
    Backend(String),
    #[error("unsupported embed {0}")]
    Unsupported(String),
}

/// Errors raised by the lesson rendering collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderError {
    #[error("lesson render failed: {0}")]
    Failed(String),
}

/// Errors raised by the course-content collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    #[error("course {0} not found")]
    NotFound(CourseId),
    #[error(transparent)]
    Invalid(#[from] CourseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

/// Errors emitted while loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid sync base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Errors emitted while opening a course view.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseViewError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error("structure is for course {found}, expected {expected}")]
    WrongCourse { expected: CourseId, found: CourseId },
}
