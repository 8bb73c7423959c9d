//! Per-course-view facade over playback, progress and sync.
//!
//! A `CourseView` owns one `PlaybackSessionController`, one `ProgressStore` and
//! one reconciler for a single (user, course) scope. Nothing is shared between
//! views, so two views over different courses never see each other's timers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use course_core::Clock;
use course_core::model::{CourseId, CourseProgress, CourseStructure, LessonKey, UserId};
use storage::repository::ProgressRepository;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::collaborators::{
    CourseContent, InputAffordances, LessonRenderer, ProgressSummarySource, TelemetrySink,
};
use crate::config::EngineConfig;
use crate::error::{CourseViewError, SyncError};
use crate::playback::{
    Generation, PlaybackSessionController, PlayerFactory, SelectRejection, SessionTicket,
    initialize_embedded_players, teardown_media,
};
use crate::progress_store::ProgressStore;
use crate::sync::{ReconcileOutcome, ServerSyncReconciler, reconcile_indicator_count};

/// External collaborators a view talks to.
#[derive(Clone)]
pub struct CourseViewDeps {
    pub renderer: Arc<dyn LessonRenderer>,
    pub players: Arc<dyn PlayerFactory>,
    pub summaries: Arc<dyn ProgressSummarySource>,
    pub affordances: Arc<dyn InputAffordances>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Content rendered and `players` embeds were initialized.
    Loaded { generation: Generation, players: usize },
    /// The renderer failed; the guard was released.
    Failed { generation: Generation },
    /// The safety deadline fired first; late results were discarded.
    Abandoned { generation: Generation },
    Rejected(SelectRejection),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No summary this cycle (sync disabled or a transient fetch failure).
    Skipped,
    Reconciled(ReconcileOutcome),
}

pub struct CourseView {
    user_id: UserId,
    course_id: CourseId,
    structure: CourseStructure,
    config: EngineConfig,
    playback: Arc<Mutex<PlaybackSessionController>>,
    store: tokio::sync::Mutex<ProgressStore>,
    displayed_percent: Mutex<u8>,
    deadline_task: Mutex<Option<(Generation, JoinHandle<()>)>>,
    reconciler: ServerSyncReconciler,
    deps: CourseViewDeps,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CourseView {
    /// Fetch the structure, load the persisted completions and prune them.
    ///
    /// # Errors
    ///
    /// Returns `CourseViewError` if the structure cannot be fetched, belongs
    /// to another course, or the persisted completions cannot be read.
    pub async fn open(
        content: &dyn CourseContent,
        repo: Arc<dyn ProgressRepository>,
        user_id: UserId,
        course_id: CourseId,
        config: EngineConfig,
        clock: Clock,
        deps: CourseViewDeps,
    ) -> Result<Arc<Self>, CourseViewError> {
        let structure = content.course_structure(course_id).await?;
        if structure.course_id() != course_id {
            return Err(CourseViewError::WrongCourse {
                expected: course_id,
                found: structure.course_id(),
            });
        }

        let mut store = ProgressStore::load(repo, user_id, course_id).await?;
        store.prune(&structure).await;
        let percent = store.percentage(&structure);

        let reconciler = ServerSyncReconciler::new(
            config.summary_rules,
            config.recency_window,
            clock,
            Arc::clone(&deps.telemetry),
        );
        let playback = PlaybackSessionController::new(config.debounce, config.safety_deadline);

        tracing::info!(
            %user_id,
            %course_id,
            lessons = structure.total_lessons(),
            percent,
            "course view opened"
        );

        Ok(Arc::new(Self {
            user_id,
            course_id,
            structure,
            config,
            playback: Arc::new(Mutex::new(playback)),
            store: tokio::sync::Mutex::new(store),
            displayed_percent: Mutex::new(percent),
            deadline_task: Mutex::new(None),
            reconciler,
            deps,
        }))
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn structure(&self) -> &CourseStructure {
        &self.structure
    }

    /// Whether a lesson transition is currently guarded.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        lock(&self.playback).is_guarded()
    }

    #[must_use]
    pub fn active_media_count(&self) -> usize {
        lock(&self.playback).active_media_count()
    }

    /// Entry point for lesson clicks.
    ///
    /// The guard check and the teardown of the previous lesson's media happen
    /// under one lock, before anything is awaited.
    pub async fn on_lesson_selected(&self, key: LessonKey) -> SelectOutcome {
        let Some(lesson) = self.structure.lesson_ref(key) else {
            tracing::debug!(lesson = %key, "selection of unknown lesson rejected");
            return SelectOutcome::Rejected(SelectRejection::UnknownLesson(key));
        };

        let ticket = {
            let mut playback = lock(&self.playback);
            let ticket = match playback.request_select(lesson, Instant::now()) {
                Ok(ticket) => ticket,
                Err(rejection) => return SelectOutcome::Rejected(rejection),
            };
            let report = playback.teardown_active_media();
            if report.released + report.failures > 0 {
                tracing::debug!(
                    released = report.released,
                    failures = report.failures,
                    "previous lesson media released"
                );
            }
            ticket
        };

        let generation = ticket.generation;
        tracing::debug!(%generation, lesson = %key, "lesson transition started");
        self.deps.affordances.disable();
        self.arm_deadline(&ticket);

        let outcome = match self.deps.renderer.render_lesson(&ticket.lesson).await {
            Ok(mut nodes) => {
                let handles = initialize_embedded_players(
                    self.deps.players.as_ref(),
                    &mut nodes,
                    self.config.player_init_yield,
                    || lock(&self.playback).is_current(generation),
                )
                .await;
                let players = handles.len();
                let installed = lock(&self.playback).install_media(generation, handles);
                match installed {
                    Ok(()) => SelectOutcome::Loaded {
                        generation,
                        players,
                    },
                    Err(stale) => {
                        tracing::debug!(
                            %generation,
                            "discarding players of a superseded transition"
                        );
                        teardown_media(stale);
                        SelectOutcome::Abandoned { generation }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%generation, lesson = %key, error = %err, "lesson render failed");
                SelectOutcome::Failed { generation }
            }
        };

        if !lock(&self.playback).complete_or_abort(generation) {
            return SelectOutcome::Abandoned { generation };
        }
        self.disarm_deadline(generation);
        self.deps.affordances.restore();
        outcome
    }

    /// Entry point for the content pipeline reporting a finished lesson.
    ///
    /// Keys outside the current structure are ignored.
    pub async fn on_lesson_completed(&self, key: LessonKey) -> Option<CourseProgress> {
        if !self.structure.contains(key) {
            tracing::warn!(
                user_id = %self.user_id,
                course_id = %self.course_id,
                lesson = %key,
                "ignoring completion of a lesson not in the course"
            );
            return None;
        }

        let mut store = self.store.lock().await;
        let outcome = store.mark_completed(key, &self.structure).await;
        *lock(&self.displayed_percent) = outcome.progress.percent;
        if outcome.newly_completed {
            tracing::info!(
                user_id = %self.user_id,
                course_id = %self.course_id,
                lesson = %key,
                percent = outcome.progress.percent,
                "lesson completed"
            );
        }
        Some(outcome.progress)
    }

    /// Percentage for display widgets, including any server display hint.
    #[must_use]
    pub fn current_percentage(&self) -> u8 {
        *lock(&self.displayed_percent)
    }

    /// Canonical local progress, ignoring display hints.
    pub async fn progress(&self) -> CourseProgress {
        self.store.lock().await.progress(&self.structure)
    }

    /// Correct a visible completion count against the canonical one.
    pub async fn correct_indicator_count(&self, visible: usize) -> usize {
        let canonical = self
            .store
            .lock()
            .await
            .completion_set()
            .valid_count(&self.structure);
        let corrected = reconcile_indicator_count(visible, canonical);
        if corrected != visible {
            tracing::debug!(visible, canonical, "indicator count corrected");
        }
        corrected
    }

    /// Fetch one server summary and reconcile it into local state.
    pub async fn sync_now(&self) -> SyncOutcome {
        let summary = match self
            .deps
            .summaries
            .fetch_summary(self.user_id, self.course_id)
            .await
        {
            Ok(summary) => summary,
            Err(SyncError::Disabled) => return SyncOutcome::Skipped,
            Err(err) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    course_id = %self.course_id,
                    error = %err,
                    "progress summary fetch failed; keeping local state"
                );
                return SyncOutcome::Skipped;
            }
        };

        let mut store = self.store.lock().await;
        let outcome = self
            .reconciler
            .reconcile(&mut store, &self.structure, summary)
            .await;
        if let ReconcileOutcome::Applied {
            displayed_percent, ..
        } = &outcome
        {
            *lock(&self.displayed_percent) = *displayed_percent;
        }
        SyncOutcome::Reconciled(outcome)
    }

    /// Run `sync_now` immediately and then every `sync_interval` until the
    /// view is dropped.
    pub fn spawn_periodic_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let view = Arc::downgrade(self);
        let every = self.config.sync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(view) = view.upgrade() else {
                    break;
                };
                view.sync_now().await;
            }
        })
    }

    fn arm_deadline(&self, ticket: &SessionTicket) {
        let playback = Arc::clone(&self.playback);
        let affordances = Arc::clone(&self.deps.affordances);
        let generation = ticket.generation;
        let deadline = ticket.safety_deadline;

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if lock(&playback).expire_deadline(generation) {
                affordances.restore();
            }
        });

        if let Some((_, previous)) = lock(&self.deadline_task).replace((generation, task)) {
            previous.abort();
        }
    }

    fn disarm_deadline(&self, generation: Generation) {
        let mut slot = lock(&self.deadline_task);
        if slot.as_ref().is_some_and(|(armed, _)| *armed == generation) {
            if let Some((_, task)) = slot.take() {
                task.abort();
            }
        }
    }
}

impl Drop for CourseView {
    fn drop(&mut self) {
        if let Some((_, task)) = lock(&self.deadline_task).take() {
            task.abort();
        }
        lock(&self.playback).teardown_active_media();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{NoopAffordances, StaticCourseContent, TracingTelemetry};
    use crate::error::RenderError;
    use crate::playback::EmbedNode;
    use crate::playback::testing::{FakeFactory, Recorder};
    use async_trait::async_trait;
    use course_core::model::{Lesson, LessonId, LessonRef, RawProgressSummary, Unit};
    use course_core::time::fixed_clock;
    use std::time::Duration;
    use storage::repository::InMemoryRepository;

    struct OneVideo;

    #[async_trait]
    impl LessonRenderer for OneVideo {
        async fn render_lesson(&self, lesson: &LessonRef) -> Result<Vec<EmbedNode>, RenderError> {
            Ok(vec![EmbedNode::new(
                format!("video-{}", lesson.key),
                "video:main",
            )])
        }
    }

    struct Offline;

    #[async_trait]
    impl ProgressSummarySource for Offline {
        async fn fetch_summary(
            &self,
            _user_id: UserId,
            _course_id: CourseId,
        ) -> Result<RawProgressSummary, SyncError> {
            Err(SyncError::Unavailable("offline".into()))
        }
    }

    fn structure() -> CourseStructure {
        let units = (0..2)
            .map(|u| Unit {
                title: format!("Unit {u}"),
                lessons: (0..2)
                    .map(|l| Lesson {
                        id: LessonId::new(format!("u{u}l{l}")),
                        title: String::new(),
                    })
                    .collect(),
            })
            .collect();
        CourseStructure::new(CourseId::new(3), units).unwrap()
    }

    async fn open(recorder: &Recorder) -> Arc<CourseView> {
        let deps = CourseViewDeps {
            renderer: Arc::new(OneVideo),
            players: Arc::new(FakeFactory {
                recorder: recorder.clone(),
            }),
            summaries: Arc::new(Offline),
            affordances: Arc::new(NoopAffordances),
            telemetry: Arc::new(TracingTelemetry),
        };
        CourseView::open(
            &StaticCourseContent::new(structure()),
            Arc::new(InMemoryRepository::new()),
            UserId::new(1),
            CourseId::new(3),
            EngineConfig::default(),
            fixed_clock(),
            deps,
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn switching_lessons_tears_down_previous_players() {
        let recorder = Recorder::default();
        let view = open(&recorder).await;

        let first = view.on_lesson_selected(LessonKey::new(0, 0)).await;
        assert!(matches!(first, SelectOutcome::Loaded { players: 1, .. }));
        assert_eq!(view.active_media_count(), 1);
        assert!(!view.is_loading());

        tokio::time::advance(Duration::from_secs(1)).await;
        let second = view.on_lesson_selected(LessonKey::new(1, 1)).await;
        assert!(matches!(second, SelectOutcome::Loaded { .. }));
        assert_eq!(view.active_media_count(), 1);

        let calls = recorder.calls();
        let destroyed = calls.iter().position(|c| c == "video-0-0:destroy").unwrap();
        let created = calls.iter().position(|c| c == "video-1-1:create").unwrap();
        assert!(destroyed < created);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_lessons_are_rejected() {
        let view = open(&Recorder::default()).await;
        assert_eq!(
            view.on_lesson_selected(LessonKey::new(9, 9)).await,
            SelectOutcome::Rejected(SelectRejection::UnknownLesson(LessonKey::new(9, 9)))
        );
        assert_eq!(view.on_lesson_completed(LessonKey::new(9, 9)).await, None);
    }

    #[tokio::test]
    async fn completion_updates_display_and_indicator() {
        let view = open(&Recorder::default()).await;
        let progress = view.on_lesson_completed(LessonKey::new(0, 1)).await.unwrap();
        assert_eq!(progress.percent, 25);
        assert_eq!(view.current_percentage(), 25);
        assert_eq!(view.correct_indicator_count(0).await, 1);
        assert_eq!(view.correct_indicator_count(3).await, 3);
    }

    #[tokio::test]
    async fn transient_sync_failure_is_skipped() {
        let view = open(&Recorder::default()).await;
        view.on_lesson_completed(LessonKey::new(0, 0)).await;
        assert_eq!(view.sync_now().await, SyncOutcome::Skipped);
        assert_eq!(view.current_percentage(), 25);
    }
}
