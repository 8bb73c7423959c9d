use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId};
use crate::model::lesson_key::LessonKey;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("lesson id {0} appears more than once")]
    DuplicateLessonId(String),

    #[error("lesson id cannot be empty (unit {unit}, lesson {lesson})")]
    EmptyLessonId { unit: usize, lesson: usize },

    #[error("course has too many units or lessons to index")]
    TooLarge,
}

//
// ─── STRUCTURE ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    #[serde(default)]
    pub title: String,
    pub lessons: Vec<Lesson>,
}

/// A lesson selected for playback: its positional key plus its stable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LessonRef {
    pub key: LessonKey,
    pub lesson_id: LessonId,
}

/// Unvalidated course structure, as read from the content collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStructureDraft {
    pub course_id: CourseId,
    pub units: Vec<Unit>,
}

impl CourseStructureDraft {
    /// Validate the draft into a usable snapshot.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if a lesson id is empty or repeated, or if indices
    /// do not fit in a `LessonKey`.
    pub fn validate(self) -> Result<CourseStructure, CourseError> {
        if u32::try_from(self.units.len()).is_err() {
            return Err(CourseError::TooLarge);
        }
        let mut seen = HashSet::new();
        for (unit_idx, unit) in self.units.iter().enumerate() {
            if u32::try_from(unit.lessons.len()).is_err() {
                return Err(CourseError::TooLarge);
            }
            for (lesson_idx, lesson) in unit.lessons.iter().enumerate() {
                if lesson.id.as_str().trim().is_empty() {
                    return Err(CourseError::EmptyLessonId {
                        unit: unit_idx,
                        lesson: lesson_idx,
                    });
                }
                if !seen.insert(lesson.id.clone()) {
                    return Err(CourseError::DuplicateLessonId(lesson.id.to_string()));
                }
            }
        }

        let total_lessons = self.units.iter().map(|u| u.lessons.len()).sum();
        Ok(CourseStructure {
            course_id: self.course_id,
            units: self.units,
            total_lessons,
        })
    }
}

/// Read-only snapshot of a course's ordered units and lessons.
///
/// Defines the universe of valid `LessonKey`s for pruning and percentages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CourseStructureDraft", rename_all = "camelCase")]
pub struct CourseStructure {
    course_id: CourseId,
    units: Vec<Unit>,
    #[serde(skip_serializing)]
    total_lessons: usize,
}

impl TryFrom<CourseStructureDraft> for CourseStructure {
    type Error = CourseError;

    fn try_from(draft: CourseStructureDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl CourseStructure {
    /// Build a structure from units.
    ///
    /// # Errors
    ///
    /// See [`CourseStructureDraft::validate`].
    pub fn new(course_id: CourseId, units: Vec<Unit>) -> Result<Self, CourseError> {
        CourseStructureDraft { course_id, units }.validate()
    }

    /// An empty course; every percentage against it is 0.
    #[must_use]
    pub fn empty(course_id: CourseId) -> Self {
        Self {
            course_id,
            units: Vec::new(),
            total_lessons: 0,
        }
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    #[must_use]
    pub fn total_lessons(&self) -> usize {
        self.total_lessons
    }

    #[must_use]
    pub fn lesson(&self, key: LessonKey) -> Option<&Lesson> {
        let unit = self.units.get(usize::try_from(key.unit()).ok()?)?;
        unit.lessons.get(usize::try_from(key.lesson()).ok()?)
    }

    #[must_use]
    pub fn contains(&self, key: LessonKey) -> bool {
        self.lesson(key).is_some()
    }

    #[must_use]
    pub fn lesson_ref(&self, key: LessonKey) -> Option<LessonRef> {
        self.lesson(key).map(|lesson| LessonRef {
            key,
            lesson_id: lesson.id.clone(),
        })
    }

    /// All valid keys in course order.
    pub fn keys(&self) -> impl Iterator<Item = LessonKey> + '_ {
        self.units.iter().enumerate().flat_map(|(u, unit)| {
            (0..unit.lessons.len()).map(move |l| {
                // Both indices were bounded to u32 during validation.
                LessonKey::new(u as u32, l as u32)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(ids: &[&str]) -> Unit {
        Unit {
            title: String::new(),
            lessons: ids
                .iter()
                .map(|id| Lesson {
                    id: LessonId::new(*id),
                    title: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn totals_and_lookups() {
        let course =
            CourseStructure::new(CourseId::new(1), vec![unit(&["a", "b"]), unit(&["c"])]).unwrap();
        assert_eq!(course.total_lessons(), 3);
        assert!(course.contains(LessonKey::new(1, 0)));
        assert!(!course.contains(LessonKey::new(1, 1)));
        assert!(!course.contains(LessonKey::new(2, 0)));
        assert_eq!(
            course.lesson_ref(LessonKey::new(0, 1)).unwrap().lesson_id,
            LessonId::new("b")
        );
        let keys: Vec<_> = course.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["0-0", "0-1", "1-0"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = CourseStructure::new(CourseId::new(1), vec![unit(&["a"]), unit(&["a"])])
            .unwrap_err();
        assert_eq!(err, CourseError::DuplicateLessonId("a".into()));
    }

    #[test]
    fn deserializes_through_validation() {
        let json = r#"{"courseId": 7, "units": [{"title": "Intro", "lessons": [{"id": "x"}, {"id": "y"}]}]}"#;
        let course: CourseStructure = serde_json::from_str(json).unwrap();
        assert_eq!(course.course_id(), CourseId::new(7));
        assert_eq!(course.total_lessons(), 2);

        let bad = r#"{"courseId": 7, "units": [{"lessons": [{"id": " "}]}]}"#;
        assert!(serde_json::from_str::<CourseStructure>(bad).is_err());
    }

    #[test]
    fn empty_course_has_no_lessons() {
        let course = CourseStructure::empty(CourseId::new(3));
        assert_eq!(course.total_lessons(), 0);
        assert_eq!(course.keys().count(), 0);
    }
}
