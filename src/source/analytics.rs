//! HTTP client for the analytics service's saved-question API.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::config::AnalyticsConfig;
use crate::{AppError, Result};

use super::{OpportunityFetcher, RawOpportunity};

/// Fetcher that runs a saved analytics question and maps its JSON rows.
pub struct AnalyticsFetcher {
    client: reqwest::Client,
    base_url: String,
    card_id: u32,
    api_key: String,
}

impl AnalyticsFetcher {
    /// Build a fetcher from the analytics connectivity settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be constructed.
    pub fn new(config: &AnalyticsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            card_id: config.card_id,
            api_key: config.api_key.clone(),
        })
    }

    async fn query(&self) -> Result<Vec<RawOpportunity>> {
        let url = format!("{}/api/card/{}/query/json", self.base_url, self.card_id);
        debug!(%url, "querying analytics source");

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|err| AppError::Fetch(format!("analytics request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!(
                "analytics source returned {status}"
            )));
        }

        response
            .json::<Vec<RawOpportunity>>()
            .await
            .map_err(|err| AppError::Fetch(format!("invalid analytics payload: {err}")))
    }
}

impl OpportunityFetcher for AnalyticsFetcher {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Vec<RawOpportunity>>> + Send + '_>> {
        Box::pin(self.query())
    }
}
