//! Device access and still-frame sampling
//!
//! - `device`: the device API contract and the shared `DeviceStream` handle
//! - `acquisition`: reference-counted ownership of the stream across consumers
//! - `frame_sampler`: self-rescheduling still grabs from the video track
//! - `synthetic`: generated tone and test pattern standing in for hardware

pub mod acquisition;
pub mod device;
pub mod frame_sampler;
pub mod synthetic;

pub use acquisition::{wait_ready, ConsumerHandle, ConsumerId, MediaAcquisition, StreamState};
pub use device::{
    DeviceStream, MediaConstraints, MediaDevices, TrackControl, VideoFrame, VideoSource,
};
pub use frame_sampler::{FrameSampler, FrameSamplerConfig, StillFormat, StillImage};
pub use synthetic::{SyntheticConfig, SyntheticDevices};
