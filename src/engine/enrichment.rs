use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::models::CheckIn;
use crate::error::AppError;

/// What the gateway returned for one response. All fields optional; absent
/// fields leave the stored check-in untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrichmentOutcome {
    pub suggestion: Option<String>,
    pub confidence: Option<f64>,
    pub sentiment_score: Option<f64>,
}

/// Analysis gateway for responded check-ins. Runs off the response path;
/// failures are logged and dropped, never surfaced to the responder.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich(&self, checkin: &CheckIn) -> Result<EnrichmentOutcome, AppError>;
}

/// Disabled enrichment: every call yields an empty outcome.
pub struct NoopEnrichment;

#[async_trait]
impl EnrichmentProvider for NoopEnrichment {
    async fn enrich(&self, _checkin: &CheckIn) -> Result<EnrichmentOutcome, AppError> {
        Ok(EnrichmentOutcome::default())
    }
}

#[derive(Debug, Serialize)]
struct EnrichmentRequest<'a> {
    checkin_id: &'a str,
    task_id: &'a str,
    user_id: &'a str,
    progress_indicator: Option<&'a str>,
    progress_notes: Option<&'a str>,
    blockers_reported: Option<&'a str>,
    help_needed: Option<&'a str>,
}

/// HTTP gateway client. Posts the response text to `<base>/analyze` and
/// parses the outcome from the JSON body.
pub struct HttpEnrichment {
    client: reqwest::Client,
    url: String,
}

impl HttpEnrichment {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Dependency(format!("enrichment client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/analyze", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichment {
    async fn enrich(&self, checkin: &CheckIn) -> Result<EnrichmentOutcome, AppError> {
        let request = EnrichmentRequest {
            checkin_id: &checkin.id,
            task_id: &checkin.task_id,
            user_id: &checkin.user_id,
            progress_indicator: checkin.progress_indicator.as_deref(),
            progress_notes: checkin.progress_notes.as_deref(),
            blockers_reported: checkin.blockers_reported.as_deref(),
            help_needed: checkin.help_needed.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Dependency(format!("enrichment call failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Dependency(format!(
                "enrichment gateway returned {}",
                response.status()
            )));
        }

        response
            .json::<EnrichmentOutcome>()
            .await
            .map_err(|e| AppError::Dependency(format!("enrichment response malformed: {e}")))
    }
}
