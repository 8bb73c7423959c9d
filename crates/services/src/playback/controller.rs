use std::fmt;
use std::time::Duration;

use course_core::model::{LessonKey, LessonRef};
use tokio::time::Instant;

use super::media::{MediaHandle, TeardownReport, teardown_media};

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Monotonic id of one lesson transition. Callbacks carrying an older
/// generation than the active session are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The in-flight (guarded) lesson transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSession {
    pub generation: Generation,
    pub lesson: LessonRef,
    pub accepted_at: Instant,
    pub safety_deadline: Instant,
}

/// Handed to the caller when a selection is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub generation: Generation,
    pub lesson: LessonRef,
    pub safety_deadline: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectRejection {
    /// Arrived within the debounce window of the last accepted selection.
    Debounced { since_last: Duration },
    /// Another transition is still guarded.
    TransitionInFlight { generation: Generation },
    /// The key does not exist in the current course structure.
    UnknownLesson(LessonKey),
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Serializes lesson transitions: Idle → Guarded → Idle.
///
/// Pure state machine; timers and rendering are driven by the owner. The only
/// ways out of Guarded are [`complete_or_abort`](Self::complete_or_abort) and
/// deadline expiry, and both land in the same Idle state.
pub struct PlaybackSessionController {
    debounce: Duration,
    safety_window: Duration,
    last_accepted_at: Option<Instant>,
    session: Option<PlaybackSession>,
    last_generation: u64,
    active_media: Vec<Box<dyn MediaHandle>>,
}

impl PlaybackSessionController {
    #[must_use]
    pub fn new(debounce: Duration, safety_window: Duration) -> Self {
        Self {
            debounce,
            safety_window,
            last_accepted_at: None,
            session: None,
            last_generation: 0,
            active_media: Vec::new(),
        }
    }

    /// Whether a transition is currently guarded.
    #[must_use]
    pub fn is_guarded(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    #[must_use]
    pub fn active_media_count(&self) -> usize {
        self.active_media.len()
    }

    /// Check-and-set the guard for a new selection.
    ///
    /// # Errors
    ///
    /// Returns `SelectRejection::Debounced` inside the debounce window and
    /// `SelectRejection::TransitionInFlight` while another session is guarded.
    pub fn request_select(
        &mut self,
        lesson: LessonRef,
        now: Instant,
    ) -> Result<SessionTicket, SelectRejection> {
        if let Some(last) = self.last_accepted_at {
            let since_last = now.saturating_duration_since(last);
            if since_last < self.debounce {
                tracing::debug!(lesson = %lesson.key, ?since_last, "selection debounced");
                return Err(SelectRejection::Debounced { since_last });
            }
        }
        if let Some(active) = &self.session {
            tracing::debug!(
                lesson = %lesson.key,
                generation = %active.generation,
                "selection rejected while a transition is in flight"
            );
            return Err(SelectRejection::TransitionInFlight {
                generation: active.generation,
            });
        }

        self.last_generation += 1;
        let generation = Generation(self.last_generation);
        let safety_deadline = now + self.safety_window;
        self.last_accepted_at = Some(now);
        self.session = Some(PlaybackSession {
            generation,
            lesson: lesson.clone(),
            accepted_at: now,
            safety_deadline,
        });

        Ok(SessionTicket {
            generation,
            lesson,
            safety_deadline,
        })
    }

    /// Release every active media handle. Must run before new content loads.
    pub fn teardown_active_media(&mut self) -> TeardownReport {
        teardown_media(std::mem::take(&mut self.active_media))
    }

    /// Adopt freshly created players for `generation`.
    ///
    /// # Errors
    ///
    /// Hands the players back when `generation` is no longer the guarded
    /// session, so the caller can tear them down instead of leaking them.
    pub fn install_media(
        &mut self,
        generation: Generation,
        handles: Vec<Box<dyn MediaHandle>>,
    ) -> Result<(), Vec<Box<dyn MediaHandle>>> {
        if !self.is_current(generation) {
            return Err(handles);
        }
        self.active_media.extend(handles);
        Ok(())
    }

    /// Render step resolved or failed. Returns `false` for a stale generation.
    pub fn complete_or_abort(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) {
            tracing::debug!(%generation, "ignoring completion from a superseded transition");
            return false;
        }
        self.session = None;
        true
    }

    /// Safety deadline fired. Returns `false` if the session already ended.
    pub fn expire_deadline(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        if let Some(session) = self.session.take() {
            tracing::warn!(
                %generation,
                lesson = %session.lesson.key,
                "lesson transition abandoned after safety deadline"
            );
        }
        true
    }

    /// Poll-style deadline check for hosts without a timer.
    pub fn check_deadline(&mut self, now: Instant) -> Option<Generation> {
        let session = self.session.as_ref()?;
        if now < session.safety_deadline {
            return None;
        }
        let generation = session.generation;
        self.expire_deadline(generation).then_some(generation)
    }
}

impl fmt::Debug for PlaybackSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSessionController")
            .field("debounce", &self.debounce)
            .field("safety_window", &self.safety_window)
            .field("session", &self.session)
            .field("last_generation", &self.last_generation)
            .field("active_media_len", &self.active_media.len())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
