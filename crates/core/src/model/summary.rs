//! Server-reported progress summaries.
//!
//! `RawProgressSummary` is the untrusted wire shape: every field is optional and
//! wrongly typed values deserialize to `None` instead of failing the whole
//! payload. Nothing may read it for decisions until it has passed
//! [`RawProgressSummary::validate`], which yields a `ValidatedSummary`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::model::ids::CourseId;
use crate::model::lesson_key::LessonKey;

//
// ─── RULES ─────────────────────────────────────────────────────────────────────
//

/// Thresholds applied during validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryRules {
    /// Counts above this are treated as corrupted.
    pub max_plausible_count: f64,
    /// Allowed gap, in percentage points, between the reported percent and
    /// the percent implied by the counts.
    pub drift_tolerance: f64,
}

impl Default for SummaryRules {
    fn default() -> Self {
        Self {
            max_plausible_count: 1000.0,
            drift_tolerance: 10.0,
        }
    }
}

//
// ─── ISSUES ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SummaryIssue {
    #[error("progressPercent is missing or not a number")]
    PercentNotANumber,

    #[error("progressPercent {0} is outside 0..=100")]
    PercentOutOfRange(f64),

    #[error("completedCount {completed} exceeds totalLessons {total}")]
    CompletedExceedsTotal { completed: f64, total: f64 },

    #[error("progressPercent {reported} drifts from computed {computed:.1}")]
    PercentDrift { computed: f64, reported: f64 },

    #[error("{field} {value} is implausible")]
    ImplausibleCount { field: &'static str, value: f64 },

    #[error("summary is for course {reported}, expected {expected}")]
    CourseMismatch {
        expected: CourseId,
        reported: CourseId,
    },
}

impl SummaryIssue {
    /// Severe issues indicate corrupted data worth reporting upstream.
    #[must_use]
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            SummaryIssue::CompletedExceedsTotal { .. } | SummaryIssue::ImplausibleCount { .. }
        )
    }
}

/// Outcome of validating a raw summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryValidation {
    pub errors: Vec<SummaryIssue>,
}

impl SummaryValidation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn is_severe(&self) -> bool {
        self.errors.iter().any(SummaryIssue::is_severe)
    }
}

//
// ─── RAW SUMMARY ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProgressSummary {
    #[serde(default, deserialize_with = "lenient")]
    pub course_id: Option<CourseId>,
    #[serde(default, deserialize_with = "lenient")]
    pub completed_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_lessons: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub progress_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub completed_lessons: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawProgressSummary {
    /// Check the summary for internal consistency.
    #[must_use]
    pub fn validate(&self, expected_course: CourseId, rules: &SummaryRules) -> SummaryValidation {
        let mut errors = Vec::new();

        if let Some(reported) = self.course_id {
            if reported != expected_course {
                errors.push(SummaryIssue::CourseMismatch {
                    expected: expected_course,
                    reported,
                });
            }
        }

        let percent = self.progress_percent.filter(|p| p.is_finite());
        match percent {
            None => errors.push(SummaryIssue::PercentNotANumber),
            Some(p) if !(0.0..=100.0).contains(&p) => {
                errors.push(SummaryIssue::PercentOutOfRange(p));
            }
            Some(_) => {}
        }

        for (field, value) in [
            ("completedCount", self.completed_count),
            ("totalLessons", self.total_lessons),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 || value > rules.max_plausible_count {
                    errors.push(SummaryIssue::ImplausibleCount { field, value });
                }
            }
        }

        if let (Some(completed), Some(total)) = (self.completed_count, self.total_lessons) {
            if total > 0.0 {
                if completed > total {
                    errors.push(SummaryIssue::CompletedExceedsTotal { completed, total });
                }
                if let Some(reported) = percent {
                    let computed = completed / total * 100.0;
                    if (computed - reported).abs() > rules.drift_tolerance {
                        errors.push(SummaryIssue::PercentDrift { computed, reported });
                    }
                }
            }
        }

        SummaryValidation { errors }
    }

    /// Validate and, on success, convert into a trusted summary.
    ///
    /// # Errors
    ///
    /// Returns the failed `SummaryValidation` when any check fails.
    pub fn into_validated(
        self,
        expected_course: CourseId,
        rules: &SummaryRules,
    ) -> Result<ValidatedSummary, SummaryValidation> {
        let validation = self.validate(expected_course, rules);
        let Some(progress_percent) = self.progress_percent.filter(|_| validation.is_valid()) else {
            return Err(validation);
        };

        let mut unparsed_keys = 0;
        let completed_lessons = self.completed_lessons.map(|raw| {
            raw.iter()
                .filter_map(|key| {
                    let parsed = key.parse::<LessonKey>().ok();
                    if parsed.is_none() {
                        unparsed_keys += 1;
                    }
                    parsed
                })
                .collect::<Vec<_>>()
        });

        Ok(ValidatedSummary {
            course_id: expected_course,
            completed_count: self.completed_count,
            total_lessons: self.total_lessons,
            progress_percent,
            completed_lessons,
            unparsed_keys,
            updated_at: self.updated_at,
        })
    }
}

//
// ─── VALIDATED SUMMARY ─────────────────────────────────────────────────────────
//

/// A server summary that passed validation; only obtainable via
/// [`RawProgressSummary::into_validated`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSummary {
    course_id: CourseId,
    completed_count: Option<f64>,
    total_lessons: Option<f64>,
    progress_percent: f64,
    completed_lessons: Option<Vec<LessonKey>>,
    unparsed_keys: usize,
    updated_at: Option<DateTime<Utc>>,
}

impl ValidatedSummary {
    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn completed_count(&self) -> Option<f64> {
        self.completed_count
    }

    #[must_use]
    pub fn total_lessons(&self) -> Option<f64> {
        self.total_lessons
    }

    /// Reported percent, guaranteed to be within `0..=100`.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.progress_percent
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn display_percent(&self) -> u8 {
        self.progress_percent.round().clamp(0.0, 100.0) as u8
    }

    /// Parsed lesson keys, or `None` when the server reported counts only.
    #[must_use]
    pub fn completed_lessons(&self) -> Option<&[LessonKey]> {
        self.completed_lessons.as_deref()
    }

    /// Entries of `completedLessons` that were not in `"u-l"` form.
    #[must_use]
    pub fn unparsed_keys(&self) -> usize {
        self.unparsed_keys
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

//
// ─── LENIENT DESERIALIZATION ───────────────────────────────────────────────────
//

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Value(T),
    Other(serde::de::IgnoredAny),
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<Lenient<T>>::deserialize(deserializer)? {
        Some(Lenient::Value(value)) => Some(value),
        Some(Lenient::Other(_)) | None => None,
    })
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<Lenient<Vec<Lenient<String>>>>::deserialize(deserializer)? {
            Some(Lenient::Value(items)) => Some(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Lenient::Value(s) => Some(s),
                        Lenient::Other(_) => None,
                    })
                    .collect(),
            ),
            Some(Lenient::Other(_)) | None => None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(completed: f64, total: f64, percent: f64) -> RawProgressSummary {
        RawProgressSummary {
            completed_count: Some(completed),
            total_lessons: Some(total),
            progress_percent: Some(percent),
            ..RawProgressSummary::default()
        }
    }

    fn check(summary: &RawProgressSummary) -> SummaryValidation {
        summary.validate(CourseId::new(1), &SummaryRules::default())
    }

    #[test]
    fn corrupted_counts_are_invalid_and_severe() {
        let v = check(&raw(39.0, 9.0, 433.0));
        assert!(!v.is_valid());
        assert!(v.is_severe());
        assert!(v.errors.contains(&SummaryIssue::PercentOutOfRange(433.0)));
        assert!(
            v.errors
                .contains(&SummaryIssue::CompletedExceedsTotal { completed: 39.0, total: 9.0 })
        );
    }

    #[test]
    fn consistent_summary_is_valid() {
        let v = check(&raw(8.0, 9.0, 89.0));
        assert!(v.is_valid());
        assert!(!v.is_severe());
    }

    #[test]
    fn drift_is_an_error_but_not_severe() {
        let v = check(&raw(3.0, 9.0, 60.0));
        assert!(!v.is_valid());
        assert!(!v.is_severe());
        assert!(matches!(v.errors[0], SummaryIssue::PercentDrift { .. }));
    }

    #[test]
    fn implausible_or_negative_counts_are_severe() {
        let v = check(&raw(5.0, 1500.0, 0.0));
        assert!(v.is_severe());

        let v = check(&RawProgressSummary {
            completed_count: Some(-1.0),
            progress_percent: Some(0.0),
            ..RawProgressSummary::default()
        });
        assert!(v.is_severe());
        assert_eq!(v.errors.len(), 1);
    }

    #[test]
    fn zero_total_skips_ratio_checks() {
        let v = check(&raw(0.0, 0.0, 0.0));
        assert!(v.is_valid());
    }

    #[test]
    fn missing_percent_is_invalid() {
        let v = check(&RawProgressSummary::default());
        assert_eq!(v.errors, vec![SummaryIssue::PercentNotANumber]);
        assert!(!v.is_severe());
    }

    #[test]
    fn other_course_is_rejected() {
        let summary = RawProgressSummary {
            course_id: Some(CourseId::new(2)),
            progress_percent: Some(10.0),
            ..RawProgressSummary::default()
        };
        assert!(!check(&summary).is_valid());
    }

    #[test]
    fn wrongly_typed_fields_deserialize_to_none() {
        let json = r#"{
            "courseId": "abc",
            "completedCount": 2,
            "totalLessons": "nine",
            "progressPercent": "22",
            "completedLessons": ["0-0", 5, "0-1", "bogus"],
            "updatedAt": "yesterday"
        }"#;
        let summary: RawProgressSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.course_id, None);
        assert_eq!(summary.completed_count, Some(2.0));
        assert_eq!(summary.total_lessons, None);
        assert_eq!(summary.progress_percent, None);
        assert_eq!(
            summary.completed_lessons,
            Some(vec!["0-0".to_string(), "0-1".to_string(), "bogus".to_string()])
        );
        assert_eq!(summary.updated_at, None);
    }

    #[test]
    fn validated_summary_parses_keys() {
        let summary = RawProgressSummary {
            completed_lessons: Some(vec!["0-0".into(), "0-1".into(), "nope".into()]),
            ..raw(2.0, 9.0, 22.0)
        };
        let validated = summary
            .into_validated(CourseId::new(1), &SummaryRules::default())
            .unwrap();
        assert_eq!(
            validated.completed_lessons(),
            Some(&[LessonKey::new(0, 0), LessonKey::new(0, 1)][..])
        );
        assert_eq!(validated.unparsed_keys(), 1);
        assert_eq!(validated.display_percent(), 22);
    }

    #[test]
    fn invalid_summary_does_not_convert() {
        let err = raw(39.0, 9.0, 433.0)
            .into_validated(CourseId::new(1), &SummaryRules::default())
            .unwrap_err();
        assert!(err.is_severe());
    }
}
