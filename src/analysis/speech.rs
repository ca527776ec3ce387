use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::SpeechToText;
use crate::error::AnalysisError;

/// Recognized text of one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Best alternative of every final result, joined in order
    pub text: String,
    /// Mean confidence of those alternatives, when the service reports it
    pub confidence: Option<f64>,
}

impl Transcript {
    /// Pull the transcript out of a recognition result shaped like
    /// `{ "results": [{ "final": true, "alternatives": [{ "transcript", "confidence" }] }] }`.
    /// Interim results are skipped.
    pub fn from_result(result: &serde_json::Value) -> Result<Self, AnalysisError> {
        let results = result
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AnalysisError::Malformed("missing `results` array".to_string()))?;

        let mut parts = Vec::new();
        let mut confidences = Vec::new();

        for entry in results {
            if entry.get("final").and_then(|v| v.as_bool()) == Some(false) {
                continue;
            }

            let best = match entry.pointer("/alternatives/0") {
                Some(best) => best,
                None => continue,
            };

            if let Some(text) = best.get("transcript").and_then(|v| v.as_str()) {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            if let Some(confidence) = best.get("confidence").and_then(|v| v.as_f64()) {
                confidences.push(confidence);
            }
        }

        let confidence = if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
        };

        Ok(Self {
            text: parts.join(" "),
            confidence,
        })
    }
}

/// Speech-to-text service reached over HTTP with basic auth.
///
/// Sends the WAV as `audio/wav` to `POST {endpoint}/v1/recognize` with the
/// configured model (narrowband by default, matching the 8kHz slices).
pub struct HttpSpeechToText {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    model: String,
}

impl HttpSpeechToText {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            model: model.into(),
        })
    }
}

#[async_trait::async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn recognize(&self, wav: &[u8]) -> Result<Transcript, AnalysisError> {
        if wav.is_empty() {
            return Err(AnalysisError::InvalidInput("recording is empty".to_string()));
        }

        debug!("Requesting recognition of {} bytes with {}", wav.len(), self.model);

        let resp = self
            .client
            .post(format!("{}/v1/recognize", self.endpoint))
            .query(&[
                ("model", self.model.as_str()),
                ("timestamps", "true"),
                ("word_alternatives_threshold", "0.9"),
            ])
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "audio/wav")
            .body(wav.to_vec())
            .send()
            .await?;

        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Speech service returned {}: {}", status, body);
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let result: serde_json::Value = resp.json().await?;
        Transcript::from_result(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_final_results_are_joined() {
        let result = json!({
            "result_index": 0,
            "results": [
                { "final": true, "alternatives": [{ "transcript": "hello there ", "confidence": 0.9 }] },
                { "final": false, "alternatives": [{ "transcript": "how ar" }] },
                { "final": true, "alternatives": [
                    { "transcript": "how are you ", "confidence": 0.7 },
                    { "transcript": "who are you " }
                ] }
            ]
        });

        let transcript = Transcript::from_result(&result).unwrap();

        assert_eq!(transcript.text, "hello there how are you");
        let confidence = transcript.confidence.unwrap();
        assert!((confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_silence_gives_empty_transcript() {
        let transcript = Transcript::from_result(&json!({ "results": [] })).unwrap();

        assert_eq!(transcript.text, "");
        assert_eq!(transcript.confidence, None);
    }

    #[test]
    fn test_missing_results_is_malformed() {
        let err = Transcript::from_result(&json!({ "error": "nope" })).unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }
}
