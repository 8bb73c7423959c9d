use std::time::Duration;

use async_trait::async_trait;

use crate::error::MediaError;

/// Capability over one live player instance.
///
/// Keeps the controller independent of whatever actually renders media.
pub trait MediaHandle: Send {
    /// Short identifier used in logs.
    fn label(&self) -> String;
    fn pause(&mut self) -> Result<(), MediaError>;
    fn detach_source(&mut self) -> Result<(), MediaError>;
    fn destroy(&mut self) -> Result<(), MediaError>;
}

/// An embed found in rendered lesson content that needs a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedNode {
    pub id: String,
    pub source: String,
    initialized: bool,
}

impl EmbedNode {
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            initialized: false,
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }
}

/// Creates player instances for embed nodes.
#[async_trait]
pub trait PlayerFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns `MediaError` if the node cannot host a player.
    async fn create_player(&self, node: &EmbedNode) -> Result<Box<dyn MediaHandle>, MediaError>;
}

/// Result of tearing down a batch of handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub released: usize,
    pub failures: usize,
}

/// Pause, detach and destroy every handle, best effort.
///
/// A failing step is logged and the remaining steps and handles still run.
pub fn teardown_media(handles: Vec<Box<dyn MediaHandle>>) -> TeardownReport {
    let mut report = TeardownReport::default();
    for mut handle in handles {
        let label = handle.label();
        let steps = [
            ("pause", handle.pause()),
            ("detach", handle.detach_source()),
            ("destroy", handle.destroy()),
        ];
        let mut clean = true;
        for (step, result) in steps {
            if let Err(err) = result {
                clean = false;
                tracing::warn!(player = %label, step, error = %err, "media teardown step failed");
            }
        }
        if clean {
            report.released += 1;
        } else {
            report.failures += 1;
        }
    }
    report
}

/// Initialize players for `nodes` one at a time, pausing `step_pause` between
/// creations so a lesson with many embeds does not starve the event loop.
///
/// Nodes already marked initialized are skipped. `still_current` is checked
/// before every step; once it returns `false` the batch stops and whatever was
/// created so far is returned for the caller to install or tear down.
pub async fn initialize_embedded_players<F>(
    factory: &dyn PlayerFactory,
    nodes: &mut [EmbedNode],
    step_pause: Duration,
    still_current: F,
) -> Vec<Box<dyn MediaHandle>>
where
    F: Fn() -> bool,
{
    let mut created = Vec::new();
    let mut first = true;
    for node in nodes.iter_mut().filter(|n| !n.is_initialized()) {
        if !first {
            if step_pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(step_pause).await;
            }
        }
        first = false;

        if !still_current() {
            tracing::debug!(node = %node.id, "player initialization superseded");
            break;
        }

        match factory.create_player(node).await {
            Ok(handle) => {
                node.mark_initialized();
                created.push(handle);
            }
            Err(err) => {
                tracing::warn!(node = %node.id, error = %err, "player initialization failed");
            }
        }
    }
    created
}
