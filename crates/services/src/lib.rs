#![forbid(unsafe_code)]

pub mod collaborators;
pub mod config;
pub mod course_view;
pub mod error;
pub mod playback;
pub mod progress_store;
pub mod sync;

pub use course_core::Clock;

pub use collaborators::{
    CourseContent, InputAffordances, JsonFileCourseContent, LessonRenderer, NoopAffordances,
    ProgressSummarySource, StaticCourseContent, TelemetrySink, TracingTelemetry,
};
pub use config::{EngineConfig, SyncConfig};
pub use course_view::{CourseView, CourseViewDeps, SelectOutcome, SyncOutcome};
pub use error::{
    ConfigError, ContentError, CourseViewError, MediaError, ProgressError, RenderError, SyncError,
};
pub use playback::{
    EmbedNode, Generation, MediaHandle, PlaybackSessionController, PlayerFactory, SelectRejection,
};
pub use progress_store::{MarkOutcome, ProgressStore};
pub use sync::{
    HttpSummarySource, ReconcileOutcome, Resolution, ResolveAction, ResolveReason,
    ServerSyncReconciler,
};
