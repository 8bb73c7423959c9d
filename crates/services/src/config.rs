use std::env;
use std::time::Duration;

use course_core::model::SummaryRules;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(700);
pub const DEFAULT_SAFETY_DEADLINE: Duration = Duration::from_secs(6);
pub const DEFAULT_RECENCY_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PLAYER_INIT_YIELD: Duration = Duration::from_millis(16);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Tunables for one course view.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Minimum gap between two accepted lesson selections.
    pub debounce: Duration,
    /// How long a lesson transition may stay guarded before it is abandoned.
    pub safety_deadline: Duration,
    /// Server summaries updated within this window win reconciliation.
    pub recency_window: Duration,
    /// Pause between two embedded player initializations.
    pub player_init_yield: Duration,
    /// Period of the background summary sync.
    pub sync_interval: Duration,
    pub summary_rules: SummaryRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            safety_deadline: DEFAULT_SAFETY_DEADLINE,
            recency_window: DEFAULT_RECENCY_WINDOW,
            player_init_yield: DEFAULT_PLAYER_INIT_YIELD,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            summary_rules: SummaryRules::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `COURSE_DEBOUNCE_MS`, `COURSE_SAFETY_DEADLINE_MS`
    /// and `COURSE_SYNC_INTERVAL_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            debounce: env_duration("COURSE_DEBOUNCE_MS", Duration::from_millis)
                .unwrap_or(defaults.debounce),
            safety_deadline: env_duration("COURSE_SAFETY_DEADLINE_MS", Duration::from_millis)
                .unwrap_or(defaults.safety_deadline),
            sync_interval: env_duration("COURSE_SYNC_INTERVAL_SECS", Duration::from_secs)
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.sync_interval),
            ..defaults
        }
    }
}

fn env_duration(name: &str, unit: fn(u64) -> Duration) -> Option<Duration> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(unit(value)),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable duration");
            None
        }
    }
}

/// Where to fetch server progress summaries from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub base_url: Url,
    pub token: Option<String>,
}

impl SyncConfig {
    /// Build a config from a base URL and optional bearer token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the URL does not parse or is not http(s).
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim();
        let url =
            Url::parse(trimmed).map_err(|_| ConfigError::InvalidBaseUrl(trimmed.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl(trimmed.to_string()));
        }
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(Self {
            base_url: url,
            token,
        })
    }

    /// Reads `COURSE_SYNC_BASE_URL` and `COURSE_SYNC_TOKEN`.
    ///
    /// Returns `Ok(None)` when no base URL is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the configured URL is malformed.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(base_url) = env::var("COURSE_SYNC_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
        else {
            return Ok(None);
        };
        Self::new(&base_url, env::var("COURSE_SYNC_TOKEN").ok()).map(Some)
    }
}
