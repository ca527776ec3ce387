use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One tone score pulled from an analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneScore {
    pub category: String,
    pub tone_id: String,
    pub tone_name: String,
    pub score: f64,
}

/// What is kept of one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub session_timestamp: i64,
    pub text: String,
    pub tones: Vec<ToneScore>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Flatten `document_tone.tone_categories[].tones[]` of a result.
    /// Entries missing a name or score are skipped.
    pub fn from_result(result: &serde_json::Value, text: &str, session_timestamp: i64) -> Self {
        let categories = result
            .pointer("/document_tone/tone_categories")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let tones = categories
            .iter()
            .flat_map(|category| {
                let name = category
                    .get("category_name")
                    .or_else(|| category.get("category_id"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();

                category
                    .get("tones")
                    .and_then(|v| v.as_array())
                    .map(Vec::as_slice)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(move |tone| {
                        Some(ToneScore {
                            category: name.clone(),
                            tone_id: tone.get("tone_id")?.as_str()?.to_string(),
                            tone_name: tone.get("tone_name")?.as_str()?.to_string(),
                            score: tone.get("score")?.as_f64()?,
                        })
                    })
            })
            .collect();

        Self {
            session_timestamp,
            text: text.to_string(),
            tones,
            analyzed_at: Utc::now(),
        }
    }
}

/// Analysis records keyed by session timestamp
#[derive(Clone, Default)]
pub struct AnalysisStore {
    records: Arc<RwLock<HashMap<i64, Vec<AnalysisRecord>>>>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, record: AnalysisRecord) {
        let mut records = self.records.write().await;
        records
            .entry(record.session_timestamp)
            .or_default()
            .push(record);
    }

    pub async fn get(&self, session_timestamp: i64) -> Vec<AnalysisRecord> {
        let records = self.records.read().await;
        records.get(&session_timestamp).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_flattens_tone_categories() {
        let result = serde_json::json!({
            "document_tone": {
                "tone_categories": [
                    {
                        "category_id": "emotion_tone",
                        "category_name": "Emotion Tone",
                        "tones": [
                            { "tone_id": "joy", "tone_name": "Joy", "score": 0.71 },
                            { "tone_id": "anger", "tone_name": "Anger", "score": 0.05 }
                        ]
                    },
                    {
                        "category_id": "language_tone",
                        "category_name": "Language Tone",
                        "tones": [
                            { "tone_id": "analytical", "tone_name": "Analytical", "score": 0.3 },
                            { "tone_id": "broken" }
                        ]
                    }
                ]
            }
        });

        let record = AnalysisRecord::from_result(&result, "hello", 42);

        assert_eq!(record.session_timestamp, 42);
        assert_eq!(record.tones.len(), 3);
        assert_eq!(record.tones[0].category, "Emotion Tone");
        assert_eq!(record.tones[0].tone_name, "Joy");
        assert_eq!(record.tones[2].tone_id, "analytical");
    }

    #[test]
    fn test_record_without_tones_is_empty() {
        let record = AnalysisRecord::from_result(&serde_json::json!({}), "hello", 1);
        assert!(record.tones.is_empty());
    }
}
