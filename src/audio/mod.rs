pub mod chunk;
pub mod decode;
pub mod frame;
pub mod transcode;

pub use chunk::{AudioChunker, AudioSlice, ChunkConfig, RawAudio, RawSlice};
pub use decode::decode_to_pcm;
pub use frame::AudioFrame;
pub use transcode::{AudioTranscoder, OrderedTranscoder, SliceJob, TranscodeConfig};
