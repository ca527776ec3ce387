use std::time::Duration;

use tracing::{debug, warn};

use super::SentimentAnalyzer;
use crate::error::AnalysisError;

/// Tone analyzer reached over HTTP with basic auth.
///
/// Sends `POST {endpoint}/v3/tone?version={version}` with a `{"text": ..}`
/// body and returns the JSON document as-is.
pub struct HttpToneAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    version: String,
}

impl HttpToneAnalyzer {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            version: version.into(),
        })
    }

    fn tone_url(&self) -> String {
        format!("{}/v3/tone", self.endpoint)
    }
}

#[async_trait::async_trait]
impl SentimentAnalyzer for HttpToneAnalyzer {
    async fn text_sentiment(&self, text: &str) -> Result<serde_json::Value, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::InvalidInput("text is empty".to_string()));
        }

        debug!("Requesting tone analysis ({} chars)", text.len());

        let resp = self
            .client
            .post(self.tone_url())
            .query(&[("version", self.version.as_str())])
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Tone analyzer returned {}: {}", status, body);
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }
}
