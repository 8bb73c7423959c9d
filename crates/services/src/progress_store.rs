use std::sync::Arc;

use course_core::model::{
    CompletionSet, CourseId, CourseProgress, CourseStructure, LessonKey, UserId,
};
use storage::repository::ProgressRepository;

use crate::error::ProgressError;

/// Result of recording a local completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkOutcome {
    pub newly_completed: bool,
    pub progress: CourseProgress,
}

/// Canonical completion bookkeeping for one (user, course) scope.
///
/// Every mutation is written through to the repository after the in-memory
/// change. Write failures are logged, never returned: the in-memory set stays
/// authoritative for the rest of the session.
pub struct ProgressStore {
    user_id: UserId,
    course_id: CourseId,
    set: CompletionSet,
    repo: Arc<dyn ProgressRepository>,
}

impl ProgressStore {
    /// Load the persisted set for the scope, or start empty.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the repository cannot be read.
    pub async fn load(
        repo: Arc<dyn ProgressRepository>,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Self, ProgressError> {
        let set = repo
            .read_completion(user_id, course_id)
            .await?
            .unwrap_or_default();
        tracing::debug!(%user_id, %course_id, completed = set.len(), "progress loaded");
        Ok(Self {
            user_id,
            course_id,
            set,
            repo,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn completion_set(&self) -> &CompletionSet {
        &self.set
    }

    /// Record a completion. Already-completed keys still persist and recompute.
    pub async fn mark_completed(
        &mut self,
        key: LessonKey,
        structure: &CourseStructure,
    ) -> MarkOutcome {
        let newly_completed = self.set.insert(key);
        self.persist().await;
        MarkOutcome {
            newly_completed,
            progress: self.set.progress(structure),
        }
    }

    /// Drop members that no longer exist in `structure`; returns the count removed.
    pub async fn prune(&mut self, structure: &CourseStructure) -> usize {
        let removed = self.set.prune(structure);
        if removed > 0 {
            tracing::info!(
                user_id = %self.user_id,
                course_id = %self.course_id,
                removed,
                "pruned completions for lessons no longer in the course"
            );
            self.persist().await;
        }
        removed
    }

    /// Union valid `keys` into the set; returns how many were new.
    pub async fn merge<I>(&mut self, keys: I, structure: &CourseStructure) -> usize
    where
        I: IntoIterator<Item = LessonKey> + Send,
    {
        let added = self.set.merge(keys, structure);
        if added > 0 {
            self.persist().await;
        }
        added
    }

    #[must_use]
    pub fn percentage(&self, structure: &CourseStructure) -> u8 {
        self.set.percentage(structure)
    }

    #[must_use]
    pub fn progress(&self, structure: &CourseStructure) -> CourseProgress {
        self.set.progress(structure)
    }

    async fn persist(&self) {
        if let Err(err) = self
            .repo
            .save_completion(self.user_id, self.course_id, &self.set)
            .await
        {
            tracing::error!(
                user_id = %self.user_id,
                course_id = %self.course_id,
                error = %err,
                "failed to persist completions"
            );
        }
    }
}
