use crate::analysis::{AnalysisStore, SentimentAnalyzer};
use crate::ingest::SessionAssembler;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Tone analysis collaborator
    pub analyzer: Arc<dyn SentimentAnalyzer>,

    /// Analysis records by session timestamp
    pub analyses: AnalysisStore,

    /// Timelines rebuilt from the pipeline messages
    pub assembler: Arc<RwLock<SessionAssembler>>,
}

impl AppState {
    pub fn new(analyzer: Arc<dyn SentimentAnalyzer>) -> Self {
        Self {
            analyzer,
            analyses: AnalysisStore::new(),
            assembler: Arc::new(RwLock::new(SessionAssembler::new())),
        }
    }
}
