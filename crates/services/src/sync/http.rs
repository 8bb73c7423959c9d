use async_trait::async_trait;
use course_core::model::{CourseId, RawProgressSummary, UserId};
use reqwest::Client;
use url::Url;

use crate::collaborators::ProgressSummarySource;
use crate::config::SyncConfig;
use crate::error::{ConfigError, SyncError};

/// Fetches summaries from `GET {base}/users/{user}/courses/{course}/progress`.
#[derive(Clone)]
pub struct HttpSummarySource {
    client: Client,
    config: Option<SyncConfig>,
}

impl HttpSummarySource {
    /// # Errors
    ///
    /// Returns `ConfigError` if `COURSE_SYNC_BASE_URL` is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(SyncConfig::from_env()?))
    }

    #[must_use]
    pub fn new(config: Option<SyncConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    fn summary_url(
        config: &SyncConfig,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Url, SyncError> {
        let mut url = config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::Unavailable(format!("cannot extend {}", config.base_url)))?
            .pop_if_empty()
            .extend([
                "users",
                &user_id.to_string(),
                "courses",
                &course_id.to_string(),
                "progress",
            ]);
        Ok(url)
    }
}

#[async_trait]
impl ProgressSummarySource for HttpSummarySource {
    async fn fetch_summary(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<RawProgressSummary, SyncError> {
        let config = self.config.as_ref().ok_or(SyncError::Disabled)?;
        let url = Self::summary_url(config, user_id, course_id)?;

        let mut request = self.client.get(url);
        if let Some(token) = &config.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }

        Ok(response.json().await?)
    }
}
