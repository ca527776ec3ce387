//! Speech recognition and text tone analysis
//!
//! - `client`: HTTP client for a tone-analyzer service
//! - `speech`: HTTP client for a narrowband speech-to-text service
//! - `store`: per-session records derived from analysis results

mod client;
mod speech;
mod store;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

pub use client::HttpToneAnalyzer;
pub use speech::{HttpSpeechToText, Transcript};
pub use store::{AnalysisRecord, AnalysisStore, ToneScore};

/// Body of a text analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInput {
    pub text: String,
    /// Session the text belongs to; results are stored under it when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timestamp: Option<i64>,
}

/// Sentiment/tone analysis collaborator
#[async_trait::async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    /// Analyze `text`, returning the service's structured result
    async fn text_sentiment(&self, text: &str) -> Result<serde_json::Value, AnalysisError>;
}

/// Speech recognition collaborator
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    /// Recognize the speech in a mono 16-bit WAV recording
    async fn recognize(&self, wav: &[u8]) -> Result<Transcript, AnalysisError>;
}
