use course_core::model::LessonKey;

use crate::repository::StorageError;

pub(super) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(super) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(super) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

/// Parse a persisted key; `None` for rows no current code could have written.
pub(super) fn lesson_key_from_str(raw: &str) -> Option<LessonKey> {
    raw.parse().ok()
}
