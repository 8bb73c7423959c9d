use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::course::CourseStructure;
use crate::model::lesson_key::LessonKey;

/// Canonical local record of completed lessons for one (user, course) scope.
///
/// Completions are only ever added by `insert`/`merge`; the single way a key
/// leaves the set is `prune`, when the lesson no longer exists in the course.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionSet {
    keys: BTreeSet<LessonKey>,
}

impl CompletionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: LessonKey) -> bool {
        self.keys.contains(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = LessonKey> + '_ {
        self.keys.iter().copied()
    }

    /// Returns `true` if the key was not already present.
    pub fn insert(&mut self, key: LessonKey) -> bool {
        self.keys.insert(key)
    }

    /// Drop every key that does not exist in `structure`; returns how many were removed.
    pub fn prune(&mut self, structure: &CourseStructure) -> usize {
        let before = self.keys.len();
        self.keys.retain(|key| structure.contains(*key));
        before - self.keys.len()
    }

    /// Non-mutating variant of [`prune`](Self::prune).
    #[must_use]
    pub fn pruned(&self, structure: &CourseStructure) -> Self {
        let mut copy = self.clone();
        copy.prune(structure);
        copy
    }

    /// Union the valid subset of `keys` into the set. Existing members are never
    /// removed. Returns the number of newly added keys.
    pub fn merge<I>(&mut self, keys: I, structure: &CourseStructure) -> usize
    where
        I: IntoIterator<Item = LessonKey>,
    {
        keys.into_iter()
            .filter(|key| structure.contains(*key))
            .filter(|key| self.keys.insert(*key))
            .count()
    }

    /// Number of members that reference a lesson present in `structure`.
    #[must_use]
    pub fn valid_count(&self, structure: &CourseStructure) -> usize {
        self.keys.iter().filter(|key| structure.contains(**key)).count()
    }

    /// Rounded completion percentage over the valid members, in `0..=100`.
    #[must_use]
    pub fn percentage(&self, structure: &CourseStructure) -> u8 {
        percent_of(self.valid_count(structure), structure.total_lessons())
    }

    #[must_use]
    pub fn progress(&self, structure: &CourseStructure) -> CourseProgress {
        let completed = self.valid_count(structure);
        let total = structure.total_lessons();
        CourseProgress {
            completed,
            total,
            percent: percent_of(completed, total),
        }
    }
}

impl FromIterator<LessonKey> for CompletionSet {
    fn from_iter<T: IntoIterator<Item = LessonKey>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Aggregated view of course progress, useful for display widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseProgress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent_of(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let raw = (completed as f64 / total as f64 * 100.0).round();
    raw.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::course::{Lesson, Unit};
    use crate::model::ids::{CourseId, LessonId};

    fn course(units: &[usize]) -> CourseStructure {
        let mut next = 0;
        let units = units
            .iter()
            .map(|count| Unit {
                title: String::new(),
                lessons: (0..*count)
                    .map(|_| {
                        next += 1;
                        Lesson {
                            id: LessonId::new(format!("l{next}")),
                            title: String::new(),
                        }
                    })
                    .collect(),
            })
            .collect();
        CourseStructure::new(CourseId::new(1), units).unwrap()
    }

    fn keys(raw: &[&str]) -> Vec<LessonKey> {
        raw.iter().map(|k| k.parse().unwrap()).collect()
    }

    #[test]
    fn prune_drops_stale_keys_and_is_idempotent() {
        let structure = course(&[9]);
        let mut set: CompletionSet = keys(&["0-0", "0-1", "0-2", "3-4"]).into_iter().collect();

        let once = set.pruned(&structure);
        assert_eq!(once.pruned(&structure), once);

        assert_eq!(set.prune(&structure), 1);
        assert_eq!(set.prune(&structure), 0);
        assert_eq!(set.len(), 3);
        assert_eq!(set.percentage(&structure), 33);
    }

    #[test]
    fn merge_filters_invalid_and_never_removes() {
        let structure = course(&[3, 2]);
        let mut set: CompletionSet = keys(&["0-0", "1-1"]).into_iter().collect();

        let added = set.merge(keys(&["0-0", "0-2", "5-0", "1-0"]), &structure);

        assert_eq!(added, 2);
        for k in keys(&["0-0", "1-1", "0-2", "1-0"]) {
            assert!(set.contains(k));
        }
        assert!(!set.contains(LessonKey::new(5, 0)));
    }

    #[test]
    fn merge_keeps_members_outside_the_merge_list() {
        let structure = course(&[4]);
        let mut set: CompletionSet = keys(&["0-3"]).into_iter().collect();
        set.merge(Vec::new(), &structure);
        assert!(set.contains(LessonKey::new(0, 3)));
    }

    #[test]
    fn percentage_is_bounded_and_safe_on_empty_courses() {
        let empty = CourseStructure::empty(CourseId::new(1));
        let set: CompletionSet = keys(&["0-0", "0-1"]).into_iter().collect();
        assert_eq!(set.percentage(&empty), 0);

        let structure = course(&[2]);
        assert_eq!(set.percentage(&structure), 100);
        assert_eq!(CompletionSet::new().percentage(&structure), 0);
    }

    #[test]
    fn percentage_ignores_stale_members_without_mutating() {
        let structure = course(&[3]);
        let set: CompletionSet = keys(&["0-0", "0-1", "0-2", "1-0", "1-1"]).into_iter().collect();
        assert_eq!(set.percentage(&structure), 100);
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn progress_reports_counts() {
        let structure = course(&[5, 4]);
        let set: CompletionSet = keys(&["0-0", "1-3", "7-7"]).into_iter().collect();
        assert_eq!(
            set.progress(&structure),
            CourseProgress {
                completed: 2,
                total: 9,
                percent: 22
            }
        );
    }
}
