use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use course_core::Clock;
use course_core::model::{
    CourseId, CourseStructure, RawProgressSummary, SummaryRules, SummaryValidation,
    ValidatedSummary,
};

use crate::collaborators::TelemetrySink;
use crate::progress_store::ProgressStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    UseServer,
    UseLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveReason {
    ServerDataRecent,
    LocalHasDetailedTracking,
    ServerShowsHigherProgress,
    LocalMoreGranular,
}

impl ResolveReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveReason::ServerDataRecent => "server_data_recent",
            ResolveReason::LocalHasDetailedTracking => "local_has_detailed_tracking",
            ResolveReason::ServerShowsHigherProgress => "server_shows_higher_progress",
            ResolveReason::LocalMoreGranular => "local_more_granular",
        }
    }
}

/// Which source drives the displayed percentage for one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub action: ResolveAction,
    pub reason: ResolveReason,
}

impl Resolution {
    fn server(reason: ResolveReason) -> Self {
        Self {
            action: ResolveAction::UseServer,
            reason,
        }
    }

    fn local(reason: ResolveReason) -> Self {
        Self {
            action: ResolveAction::UseLocal,
            reason,
        }
    }
}

/// Decide between local and server percentages for a validated summary.
///
/// Rules apply in order: a recently updated summary wins; then detailed local
/// tracking beats a summary without a lesson list; then the higher server
/// percent wins; otherwise local wins. An `updated_at` in the future counts as
/// recent.
#[must_use]
pub fn resolve(
    local_percent: u8,
    local_has_completions: bool,
    summary: &ValidatedSummary,
    now: DateTime<Utc>,
    recency_window: Duration,
) -> Resolution {
    let recent = summary.updated_at().is_some_and(|updated_at| {
        (now - updated_at)
            .to_std()
            .map_or(true, |age| age < recency_window)
    });
    if recent {
        return Resolution::server(ResolveReason::ServerDataRecent);
    }

    let server_has_list = summary.completed_lessons().is_some_and(|keys| !keys.is_empty());
    if local_has_completions && !server_has_list {
        return Resolution::local(ResolveReason::LocalHasDetailedTracking);
    }

    let server_percent = summary.percent();
    if server_percent > f64::from(local_percent) && server_percent <= 100.0 {
        return Resolution::server(ResolveReason::ServerShowsHigherProgress);
    }

    Resolution::local(ResolveReason::LocalMoreGranular)
}

/// A visible completion count that disagrees with the canonical one is
/// corrected to the larger of the two; completion only grows.
#[must_use]
pub fn reconcile_indicator_count(visible: usize, canonical: usize) -> usize {
    visible.max(canonical)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The summary failed validation; local state was not touched.
    Rejected { validation: SummaryValidation },
    /// The summary was merged and resolved.
    Applied {
        merged: usize,
        pruned: usize,
        resolution: Resolution,
        local_percent: u8,
        displayed_percent: u8,
    },
}

/// Validates server summaries and folds them into a `ProgressStore`.
#[derive(Clone)]
pub struct ServerSyncReconciler {
    rules: SummaryRules,
    recency_window: Duration,
    clock: Clock,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ServerSyncReconciler {
    #[must_use]
    pub fn new(
        rules: SummaryRules,
        recency_window: Duration,
        clock: Clock,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            rules,
            recency_window,
            clock,
            telemetry,
        }
    }

    #[must_use]
    pub fn validate(&self, summary: &RawProgressSummary, course_id: CourseId) -> SummaryValidation {
        summary.validate(course_id, &self.rules)
    }

    #[must_use]
    pub fn resolve(
        &self,
        local_percent: u8,
        local_has_completions: bool,
        summary: &ValidatedSummary,
    ) -> Resolution {
        resolve(
            local_percent,
            local_has_completions,
            summary,
            self.clock.now(),
            self.recency_window,
        )
    }

    /// Validate, merge, prune and resolve one server summary.
    ///
    /// The server's lesson list is always unioned into the store when the
    /// summary is valid; its scalar percent only ever affects the displayed
    /// value, never the completion set.
    pub async fn reconcile(
        &self,
        store: &mut ProgressStore,
        structure: &CourseStructure,
        summary: RawProgressSummary,
    ) -> ReconcileOutcome {
        let user_id = store.user_id();
        let course_id = store.course_id();

        let summary = match summary.into_validated(course_id, &self.rules) {
            Ok(summary) => summary,
            Err(validation) => {
                let issues: Vec<String> =
                    validation.errors.iter().map(ToString::to_string).collect();
                tracing::warn!(
                    %user_id,
                    %course_id,
                    severe = validation.is_severe(),
                    ?issues,
                    "ignoring invalid progress summary"
                );
                if validation.is_severe() {
                    self.telemetry
                        .report_corrupt_summary(user_id, course_id, &validation);
                }
                return ReconcileOutcome::Rejected { validation };
            }
        };

        if summary.unparsed_keys() > 0 {
            tracing::warn!(
                %user_id,
                %course_id,
                unparsed = summary.unparsed_keys(),
                "summary listed malformed lesson keys"
            );
        }

        let merged = match summary.completed_lessons() {
            Some(keys) if !keys.is_empty() => store.merge(keys.iter().copied(), structure).await,
            _ => 0,
        };
        let pruned = store.prune(structure).await;
        let local_percent = store.percentage(structure);
        let resolution = self.resolve(
            local_percent,
            !store.completion_set().is_empty(),
            &summary,
        );
        let displayed_percent = match resolution.action {
            ResolveAction::UseServer => summary.display_percent(),
            ResolveAction::UseLocal => local_percent,
        };

        tracing::info!(
            %user_id,
            %course_id,
            merged,
            pruned,
            local_percent,
            displayed_percent,
            reason = resolution.reason.as_str(),
            "progress summary reconciled"
        );

        ReconcileOutcome::Applied {
            merged,
            pruned,
            resolution,
            local_percent,
            displayed_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use course_core::model::{CompletionSet, Lesson, LessonId, LessonKey, Unit, UserId};
    use course_core::time::{fixed_clock, fixed_now};
    use std::sync::Mutex;
    use storage::repository::{InMemoryRepository, ProgressRepository};

    const WINDOW: Duration = Duration::from_secs(300);

    #[derive(Default)]
    struct RecordingTelemetry {
        reports: Mutex<Vec<SummaryValidation>>,
    }

    impl TelemetrySink for RecordingTelemetry {
        fn report_corrupt_summary(
            &self,
            _user_id: UserId,
            _course_id: CourseId,
            validation: &SummaryValidation,
        ) {
            self.reports.lock().unwrap().push(validation.clone());
        }
    }

    fn nine_lessons() -> CourseStructure {
        let unit = Unit {
            title: "Only unit".into(),
            lessons: (0..9)
                .map(|i| Lesson {
                    id: LessonId::new(format!("l{i}")),
                    title: String::new(),
                })
                .collect(),
        };
        CourseStructure::new(CourseId::new(1), vec![unit]).unwrap()
    }

    fn keys(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|k| (*k).to_string()).collect()
    }

    fn summary(
        percent: f64,
        lessons: Option<Vec<String>>,
        updated_at: Option<DateTime<Utc>>,
    ) -> ValidatedSummary {
        RawProgressSummary {
            progress_percent: Some(percent),
            completed_lessons: lessons,
            updated_at,
            ..RawProgressSummary::default()
        }
        .into_validated(CourseId::new(1), &SummaryRules::default())
        .unwrap()
    }

    async fn store_with(repo: Arc<InMemoryRepository>, raw: &[&str]) -> ProgressStore {
        let seeded: CompletionSet = raw.iter().map(|k| k.parse::<LessonKey>().unwrap()).collect();
        repo.save_completion(UserId::new(1), CourseId::new(1), &seeded)
            .await
            .unwrap();
        ProgressStore::load(repo, UserId::new(1), CourseId::new(1))
            .await
            .unwrap()
    }

    fn reconciler(telemetry: Arc<RecordingTelemetry>) -> ServerSyncReconciler {
        ServerSyncReconciler::new(SummaryRules::default(), WINDOW, fixed_clock(), telemetry)
    }

    #[test]
    fn recent_summary_wins_first() {
        let s = summary(10.0, None, Some(fixed_now() - ChronoDuration::minutes(2)));
        let r = resolve(80, true, &s, fixed_now(), WINDOW);
        assert_eq!(r, Resolution::server(ResolveReason::ServerDataRecent));
    }

    #[test]
    fn future_timestamps_count_as_recent() {
        let s = summary(10.0, None, Some(fixed_now() + ChronoDuration::minutes(1)));
        let r = resolve(80, true, &s, fixed_now(), WINDOW);
        assert_eq!(r.reason, ResolveReason::ServerDataRecent);
    }

    #[test]
    fn detailed_local_beats_coarse_server() {
        let stale = Some(fixed_now() - ChronoDuration::hours(1));
        let s = summary(90.0, Some(Vec::new()), stale);
        let r = resolve(20, true, &s, fixed_now(), WINDOW);
        assert_eq!(r, Resolution::local(ResolveReason::LocalHasDetailedTracking));
    }

    #[test]
    fn higher_server_percent_wins_when_local_is_empty() {
        let s = summary(40.0, None, None);
        let r = resolve(0, false, &s, fixed_now(), WINDOW);
        assert_eq!(r, Resolution::server(ResolveReason::ServerShowsHigherProgress));
    }

    #[test]
    fn local_is_the_default() {
        let s = summary(30.0, Some(keys(&["0-0"])), None);
        let r = resolve(30, true, &s, fixed_now(), WINDOW);
        assert_eq!(r, Resolution::local(ResolveReason::LocalMoreGranular));
    }

    #[test]
    fn exactly_five_minutes_is_not_recent() {
        let s = summary(90.0, None, Some(fixed_now() - ChronoDuration::minutes(5)));
        let r = resolve(10, false, &s, fixed_now(), WINDOW);
        assert_eq!(r.reason, ResolveReason::ServerShowsHigherProgress);
    }

    #[test]
    fn indicator_count_trusts_the_larger_value() {
        assert_eq!(reconcile_indicator_count(3, 8), 8);
        assert_eq!(reconcile_indicator_count(8, 3), 8);
    }

    #[tokio::test]
    async fn recent_valid_summary_is_merged_and_displayed() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let course = nine_lessons();
        let mut store =
            store_with(Arc::new(InMemoryRepository::new()), &["0-0", "0-1", "0-2"]).await;

        let raw = RawProgressSummary {
            course_id: Some(CourseId::new(1)),
            completed_count: Some(8.0),
            total_lessons: Some(9.0),
            progress_percent: Some(89.0),
            completed_lessons: Some(keys(&[
                "0-0", "0-1", "0-2", "0-3", "0-4", "0-5", "0-6", "0-7",
            ])),
            updated_at: Some(fixed_now() - ChronoDuration::seconds(30)),
        };

        let outcome = reconciler(telemetry.clone())
            .reconcile(&mut store, &course, raw)
            .await;

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                merged: 5,
                pruned: 0,
                resolution: Resolution::server(ResolveReason::ServerDataRecent),
                local_percent: 89,
                displayed_percent: 89,
            }
        );
        assert_eq!(store.completion_set().len(), 8);
        assert!(telemetry.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_summary_is_rejected_and_reported() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let course = nine_lessons();
        let mut store =
            store_with(Arc::new(InMemoryRepository::new()), &["0-0", "0-1", "0-2"]).await;

        let raw = RawProgressSummary {
            completed_count: Some(39.0),
            total_lessons: Some(9.0),
            progress_percent: Some(433.0),
            completed_lessons: Some(keys(&["0-3", "0-4"])),
            ..RawProgressSummary::default()
        };

        let outcome = reconciler(telemetry.clone())
            .reconcile(&mut store, &course, raw)
            .await;

        let ReconcileOutcome::Rejected { validation } = outcome else {
            panic!("corrupted summary must be rejected");
        };
        assert!(validation.is_severe());
        assert_eq!(store.completion_set().len(), 3);
        assert_eq!(store.percentage(&course), 33);
        assert_eq!(telemetry.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_severe_rejections_are_not_reported() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let course = nine_lessons();
        let mut store = store_with(Arc::new(InMemoryRepository::new()), &[]).await;

        let raw = RawProgressSummary {
            completed_count: Some(1.0),
            total_lessons: Some(9.0),
            progress_percent: Some(70.0),
            ..RawProgressSummary::default()
        };
        let outcome = reconciler(telemetry.clone())
            .reconcile(&mut store, &course, raw)
            .await;

        assert!(matches!(outcome, ReconcileOutcome::Rejected { .. }));
        assert!(telemetry.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_list_is_merged_even_when_local_wins() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let course = nine_lessons();
        let mut store =
            store_with(Arc::new(InMemoryRepository::new()), &["0-0", "0-1", "0-2", "0-3"]).await;

        let raw = RawProgressSummary {
            progress_percent: Some(22.0),
            completed_lessons: Some(keys(&["0-0", "0-8"])),
            updated_at: Some(fixed_now() - ChronoDuration::days(3)),
            ..RawProgressSummary::default()
        };
        let outcome = reconciler(telemetry)
            .reconcile(&mut store, &course, raw)
            .await;

        let ReconcileOutcome::Applied {
            merged,
            resolution,
            displayed_percent,
            ..
        } = outcome
        else {
            panic!("valid summary must apply");
        };
        assert_eq!(merged, 1);
        assert_eq!(resolution.action, ResolveAction::UseLocal);
        assert_eq!(displayed_percent, 56);
        assert!(store.completion_set().contains(LessonKey::new(0, 8)));
    }

    #[tokio::test]
    async fn stale_local_keys_are_pruned_during_reconcile() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let course = nine_lessons();
        let mut store = store_with(Arc::new(InMemoryRepository::new()), &["0-0", "3-3"]).await;

        let raw = RawProgressSummary {
            progress_percent: Some(11.0),
            ..RawProgressSummary::default()
        };
        let outcome = reconciler(telemetry)
            .reconcile(&mut store, &course, raw)
            .await;

        let ReconcileOutcome::Applied { pruned, local_percent, .. } = outcome else {
            panic!("valid summary must apply");
        };
        assert_eq!(pruned, 1);
        assert_eq!(local_percent, 11);
    }
}
