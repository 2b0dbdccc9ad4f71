use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::logger::CheatingViolation;
use crate::config::ClientConfig;
use crate::error::{ApiError, ConfigError};

/// Warning state of an attempt as the backend sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningSummary {
    pub warning_count: u32,
    pub max_warnings: u32,
    pub remaining_warnings: u32,
    pub should_auto_submit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<serde_json::Value>>,
}

/// Backend endpoints the monitor talks to.
#[async_trait]
pub trait AttemptApi: Send + Sync {
    /// `POST /attempts/{id}/cheating-violation`
    async fn report_violation(
        &self,
        attempt_id: &str,
        violation: &CheatingViolation,
    ) -> Result<WarningSummary, ApiError>;

    /// `GET /attempts/{id}/cheating-warnings`
    async fn fetch_warnings(&self, attempt_id: &str) -> Result<WarningSummary, ApiError>;

    /// `POST /attempts/{id}/submit`
    async fn submit_attempt(&self, attempt_id: &str) -> Result<(), ApiError>;
}

pub struct HttpAttemptApi {
    client: Client,
    base_url: String,
}

impl HttpAttemptApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        // no retries here, the request timeout is the only bound on a hung report
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, attempt_id: &str, path: &str) -> String {
        format!("{}/attempts/{}/{}", self.base_url, attempt_id, path)
    }
}

async fn read_summary(endpoint: &str, resp: reqwest::Response) -> Result<WarningSummary, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    resp.json::<WarningSummary>()
        .await
        .map_err(|e| ApiError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl AttemptApi for HttpAttemptApi {
    async fn report_violation(
        &self,
        attempt_id: &str,
        violation: &CheatingViolation,
    ) -> Result<WarningSummary, ApiError> {
        let url = self.endpoint(attempt_id, "cheating-violation");
        let resp = self.client.post(&url).json(violation).send().await?;
        read_summary(&url, resp).await
    }

    async fn fetch_warnings(&self, attempt_id: &str) -> Result<WarningSummary, ApiError> {
        let url = self.endpoint(attempt_id, "cheating-warnings");
        let resp = self.client.get(&url).send().await?;
        read_summary(&url, resp).await
    }

    async fn submit_attempt(&self, attempt_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(attempt_id, "submit");
        let resp = self.client.post(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Rejected {
                endpoint: url,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
