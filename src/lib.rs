//! Speech-practice game core: capture, endpoint, recognize, score.
//!
//! The library splits along the thread boundary the game runs on: the
//! `worker` module owns the microphone and the cloud recognizer, the
//! `status` module is the shared cell the game loop polls, and everything
//! else is the machinery between them.

pub mod audio;
pub mod config;
pub mod logging;
pub mod playback;
pub mod scoring;
pub mod status;
pub mod stt;
pub mod tts;
pub mod worker;

pub use logging::{init_logging, log_debug, log_debug_content, log_file_path};
