pub mod analysis;
pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod media;
pub mod session;
pub mod transport;

pub use analysis::{
    AnalysisRecord, AnalysisStore, HttpSpeechToText, HttpToneAnalyzer, SentimentAnalyzer,
    SpeechToText, TextInput, Transcript,
};
pub use audio::{
    AudioChunker, AudioFrame, AudioSlice, AudioTranscoder, ChunkConfig, OrderedTranscoder, RawAudio,
    RawSlice, SliceJob, TranscodeConfig,
};
pub use capture::{CaptureController, PreviewState, Toggle, WidgetView};
pub use config::Config;
pub use error::{AnalysisError, CaptureError};
pub use http::{create_router, AppState};
pub use ingest::{
    CompletedRecording, IngestError, IngestOutcome, IngestService, SessionAssembler,
    TimelineSummary,
};
pub use media::{
    DeviceStream, FrameSampler, FrameSamplerConfig, MediaAcquisition, MediaConstraints,
    MediaDevices, StillFormat, StillImage, SyntheticConfig, SyntheticDevices,
};
pub use session::{
    FrameSnapshot, PipelineEvent, RecordingSession, SessionConfig, SessionId, SessionIdentity,
    SessionStats, StoppedSession,
};
pub use transport::{
    AudioMessage, ChannelTransport, FileMessage, InboundEvent, NatsTransport, OutboundMessage,
    RetryPolicy, RetryingTransport, SessionTransport,
};
