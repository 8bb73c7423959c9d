use thiserror::Error;

use crate::model::{CourseError, ParseIdError, ParseLessonKeyError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    LessonKey(#[from] ParseLessonKeyError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
