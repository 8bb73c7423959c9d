mod completion;
mod course;
mod ids;
mod lesson_key;
pub mod summary;

pub use ids::{CourseId, LessonId, ParseIdError, UserId};
pub use lesson_key::{LessonKey, ParseLessonKeyError};

pub use completion::{CompletionSet, CourseProgress};
pub use course::{CourseError, CourseStructure, CourseStructureDraft, Lesson, LessonRef, Unit};
pub use summary::{
    RawProgressSummary, SummaryIssue, SummaryRules, SummaryValidation, ValidatedSummary,
};
