//! Narrow interfaces to the systems around the engine.

use std::path::PathBuf;

use async_trait::async_trait;
use course_core::model::{
    CourseId, CourseStructure, CourseStructureDraft, LessonRef, RawProgressSummary,
    SummaryValidation, UserId,
};

use crate::error::{ContentError, RenderError, SyncError};
use crate::playback::EmbedNode;

/// Supplies course structure snapshots.
#[async_trait]
pub trait CourseContent: Send + Sync {
    /// # Errors
    ///
    /// Returns `ContentError` if the structure cannot be produced.
    async fn course_structure(&self, course_id: CourseId) -> Result<CourseStructure, ContentError>;
}

/// Loads and renders a lesson, returning the embeds that need players.
#[async_trait]
pub trait LessonRenderer: Send + Sync {
    /// # Errors
    ///
    /// Returns `RenderError` if the lesson cannot be rendered.
    async fn render_lesson(&self, lesson: &LessonRef) -> Result<Vec<EmbedNode>, RenderError>;
}

/// Fetches the server's view of a user's course progress.
#[async_trait]
pub trait ProgressSummarySource: Send + Sync {
    /// # Errors
    ///
    /// Returns `SyncError` on transport failures.
    async fn fetch_summary(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<RawProgressSummary, SyncError>;
}

/// Input and pointer affordances disabled while a lesson loads.
pub trait InputAffordances: Send + Sync {
    fn disable(&self);
    fn restore(&self);
}

/// Destination for corrupted-data reports.
pub trait TelemetrySink: Send + Sync {
    fn report_corrupt_summary(
        &self,
        user_id: UserId,
        course_id: CourseId,
        validation: &SummaryValidation,
    );
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAffordances;

impl InputAffordances for NoopAffordances {
    fn disable(&self) {}

    fn restore(&self) {}
}

/// Reports corrupted summaries as `tracing` error events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn report_corrupt_summary(
        &self,
        user_id: UserId,
        course_id: CourseId,
        validation: &SummaryValidation,
    ) {
        let issues: Vec<String> = validation.errors.iter().map(ToString::to_string).collect();
        tracing::error!(
            target: "telemetry",
            %user_id,
            %course_id,
            ?issues,
            "corrupted progress summary"
        );
    }
}

/// Serves a single, fixed structure.
#[derive(Debug, Clone)]
pub struct StaticCourseContent {
    structure: CourseStructure,
}

impl StaticCourseContent {
    #[must_use]
    pub fn new(structure: CourseStructure) -> Self {
        Self { structure }
    }
}

#[async_trait]
impl CourseContent for StaticCourseContent {
    async fn course_structure(&self, course_id: CourseId) -> Result<CourseStructure, ContentError> {
        if self.structure.course_id() != course_id {
            return Err(ContentError::NotFound(course_id));
        }
        Ok(self.structure.clone())
    }
}

/// Reads a structure from a JSON file on every request.
#[derive(Debug, Clone)]
pub struct JsonFileCourseContent {
    path: PathBuf,
}

impl JsonFileCourseContent {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CourseContent for JsonFileCourseContent {
    async fn course_structure(&self, course_id: CourseId) -> Result<CourseStructure, ContentError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let draft: CourseStructureDraft = serde_json::from_slice(&bytes)?;
        if draft.course_id != course_id {
            return Err(ContentError::NotFound(course_id));
        }
        Ok(draft.validate()?)
    }
}
