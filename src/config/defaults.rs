//! Default values shared by CLI parsing and validation.

/// Seconds of trailing silence that end a speech segment.
pub const DEFAULT_SILENCE_TAIL_S: f64 = 0.5;

/// Seconds to wait for speech to start before giving up on an attempt.
pub const DEFAULT_RECORD_TIMEOUT_S: f64 = 3.0;

/// Hard cap on one recording, in seconds.
pub const DEFAULT_RECORD_MAX_S: f64 = 10.0;

/// Leading chunks excluded from endpoint decisions while the device settles.
pub const DEFAULT_SKIP_CHUNKS: usize = 10;

/// Qualifying chunks required to confirm a speech start.
pub const DEFAULT_SPEECH_START_CHUNKS: usize = 5;

/// Consecutive voiced chunks that cancel an in-progress pause count.
pub const DEFAULT_PAUSE_RESET_CHUNKS: usize = 5;

/// ZCR above this marks broadband noise.
pub const DEFAULT_ZCR_NOISE: f64 = 0.2;

/// ZCR must stay below this for speech.
pub const DEFAULT_ZCR_SPEECH: f64 = 0.15;

/// Ambient-noise sample length for startup calibration, in milliseconds.
pub const DEFAULT_CALIBRATION_MS: u64 = 3_000;

/// Whole-request timeout for cloud calls, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_S: u64 = 15;

/// Correct answers needed to win a round.
pub const DEFAULT_TARGET_WORDS: usize = 5;

/// Recognition language (BCP 47 / ISO 639-1 code).
pub const DEFAULT_LANGUAGE: &str = "es";

/// Whisper-style transcription endpoint.
pub const DEFAULT_STT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Speech-synthesis endpoint for prompts.
pub const DEFAULT_TTS_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";

pub const DEFAULT_STT_MODEL: &str = "whisper-1";
pub const DEFAULT_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_TTS_VOICE: &str = "nova";

/// Built-in word list used when no prompt file is present or it fails to
/// parse. Matches the starter list the game ships with.
pub const FALLBACK_WORDS: &[&str] = &["apple", "banana", "orange", "grape", "mango"];

/// Built-in phrases for phrase mode.
pub const FALLBACK_PHRASES: &[&str] = &["I like mangoes", "the cat is sleeping"];
