use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Position of a lesson inside a course: `(unit index, lesson index)`.
///
/// Serialized as `"u-l"`. The key is only stable while the course structure is
/// unchanged, and is never unique across courses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LessonKey {
    unit: u32,
    lesson: u32,
}

impl LessonKey {
    #[must_use]
    pub fn new(unit: u32, lesson: u32) -> Self {
        Self { unit, lesson }
    }

    #[must_use]
    pub fn unit(&self) -> u32 {
        self.unit
    }

    #[must_use]
    pub fn lesson(&self) -> u32 {
        self.lesson
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid lesson key {raw:?}: expected \"<unit>-<lesson>\"")]
pub struct ParseLessonKeyError {
    raw: String,
}

impl fmt::Display for LessonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.unit, self.lesson)
    }
}

impl FromStr for LessonKey {
    type Err = ParseLessonKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseLessonKeyError { raw: s.to_owned() };
        let (unit, lesson) = s.split_once('-').ok_or_else(err)?;
        // `u32::from_str` accepts a leading '+', which is not part of the format.
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(unit) || !digits(lesson) {
            return Err(err());
        }
        Ok(Self {
            unit: unit.parse().map_err(|_| err())?,
            lesson: lesson.parse().map_err(|_| err())?,
        })
    }
}

impl TryFrom<String> for LessonKey {
    type Error = ParseLessonKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LessonKey> for String {
    fn from(key: LessonKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_lesson_pairs() {
        let key: LessonKey = "2-13".parse().unwrap();
        assert_eq!(key, LessonKey::new(2, 13));
        assert_eq!(key.to_string(), "2-13");
    }

    #[test]
    fn rejects_malformed_keys() {
        for raw in ["", "3", "-1", "1-", "a-b", "1-2-3", "+1-2", "1--2"] {
            assert!(raw.parse::<LessonKey>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&LessonKey::new(0, 7)).unwrap();
        assert_eq!(json, "\"0-7\"");
        let back: LessonKey = serde_json::from_str("\"4-1\"").unwrap();
        assert_eq!(back, LessonKey::new(4, 1));
        assert!(serde_json::from_str::<LessonKey>("\"x\"").is_err());
    }

    #[test]
    fn ordering_is_unit_major() {
        let mut keys = vec![LessonKey::new(1, 0), LessonKey::new(0, 9), LessonKey::new(0, 2)];
        keys.sort();
        assert_eq!(
            keys,
            vec![LessonKey::new(0, 2), LessonKey::new(0, 9), LessonKey::new(1, 0)]
        );
    }
}
