use async_trait::async_trait;
use course_core::model::{CompletionSet, CourseId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable local storage of completion sets, one per (user, course) scope.
///
/// Scopes never share rows: reading `(u1, c1)` can not observe writes to
/// `(u2, c1)` or `(u1, c2)`.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Read the persisted set for a scope, or `None` if nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn read_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CompletionSet>, StorageError>;

    /// Replace the persisted set for a scope with `set`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the set cannot be stored.
    async fn save_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        set: &CompletionSet,
    ) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    completions: Arc<Mutex<HashMap<(UserId, CourseId), CompletionSet>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn read_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CompletionSet>, StorageError> {
        let guard = self
            .completions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(user_id, course_id)).cloned())
    }

    async fn save_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        set: &CompletionSet,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .completions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((user_id, course_id), set.clone());
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}
