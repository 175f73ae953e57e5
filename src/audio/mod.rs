//! Microphone capture and speech endpoint detection.
//!
//! Audio flows one way per attempt: the capture stream produces fixed-size
//! signed 16-bit mono chunks, per-chunk features classify each chunk as
//! silence, speech, or noise, and the endpointer decides when the player has
//! started and stopped speaking.

/// Reference capture rate. The device may negotiate a different rate; the
/// endpointer config is rebuilt from the rate the stream actually opened with.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Samples per capture chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 2_048;

mod calibrate;
mod endpoint;
mod features;
mod source;
#[cfg(test)]
mod tests;

pub use calibrate::{
    calibrate_threshold, mean_abs_amplitude, threshold_from_ambient, MIN_SILENCE_THRESHOLD,
};
pub use endpoint::{capture, EndpointConfig, EndpointMetrics, EndpointResult, StopReason};
pub use features::{analyze, rms, zero_crossing_rate, ChunkFeatures};
pub use source::{AudioChunk, ChunkSource, CpalChunkSource, InputDevice};
