//! Command-line parsing, validation, and the prompt book.

mod defaults;
mod validation;

use crate::audio::{self, EndpointConfig};
use crate::log_debug;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    DEFAULT_CALIBRATION_MS, DEFAULT_HTTP_TIMEOUT_S, DEFAULT_LANGUAGE, DEFAULT_PAUSE_RESET_CHUNKS,
    DEFAULT_RECORD_MAX_S, DEFAULT_RECORD_TIMEOUT_S, DEFAULT_SILENCE_TAIL_S, DEFAULT_SKIP_CHUNKS,
    DEFAULT_SPEECH_START_CHUNKS, DEFAULT_STT_ENDPOINT, DEFAULT_STT_MODEL, DEFAULT_TARGET_WORDS,
    DEFAULT_TTS_ENDPOINT, DEFAULT_TTS_MODEL, DEFAULT_TTS_VOICE, DEFAULT_ZCR_NOISE,
    DEFAULT_ZCR_SPEECH, FALLBACK_PHRASES, FALLBACK_WORDS,
};

/// Which prompt list the round draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GameMode {
    Words,
    Phrases,
}

/// CLI options for the speech-practice game.
#[derive(Debug, Parser, Clone)]
#[command(about = "Speech practice game for young language learners", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Practice words or whole phrases
    #[arg(long, value_enum, default_value = "words")]
    pub mode: GameMode,

    /// Recognition and prompt language (ISO 639-1 code)
    #[arg(long, env = "TALKALONG_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// Prompt list file (JSON); built-in lists are used when absent
    #[arg(long = "prompt-file")]
    pub prompt_file: Option<PathBuf>,

    /// Correct answers needed to finish a round
    #[arg(long = "target-words", default_value_t = DEFAULT_TARGET_WORDS)]
    pub target_words: usize,

    /// Silence threshold (RMS); 0 calibrates from ambient noise at startup
    #[arg(long = "silence-threshold", default_value_t = 0.0, allow_negative_numbers = true)]
    pub silence_threshold: f64,

    /// Ambient noise sample duration for calibration (milliseconds)
    #[arg(long = "calibration-ms", default_value_t = DEFAULT_CALIBRATION_MS)]
    pub calibration_ms: u64,

    /// Trailing silence that ends a recording (seconds)
    #[arg(long = "silence-tail-s", default_value_t = DEFAULT_SILENCE_TAIL_S)]
    pub silence_tail_s: f64,

    /// How long to wait for speech to start (seconds)
    #[arg(long = "record-timeout-s", default_value_t = DEFAULT_RECORD_TIMEOUT_S)]
    pub record_timeout_s: f64,

    /// Hard cap on one recording (seconds)
    #[arg(long = "record-max-s", default_value_t = DEFAULT_RECORD_MAX_S)]
    pub record_max_s: f64,

    /// API key for the speech services
    #[arg(long = "api-key", env = "TALKALONG_API_KEY", default_value = "")]
    pub api_key: String,

    /// Transcription endpoint URL
    #[arg(long = "stt-endpoint", env = "TALKALONG_STT_ENDPOINT", default_value = DEFAULT_STT_ENDPOINT)]
    pub stt_endpoint: String,

    /// Transcription model name
    #[arg(long = "stt-model", default_value = DEFAULT_STT_MODEL)]
    pub stt_model: String,

    /// Speech-synthesis endpoint URL
    #[arg(long = "tts-endpoint", env = "TALKALONG_TTS_ENDPOINT", default_value = DEFAULT_TTS_ENDPOINT)]
    pub tts_endpoint: String,

    /// Speech-synthesis model name
    #[arg(long = "tts-model", default_value = DEFAULT_TTS_MODEL)]
    pub tts_model: String,

    /// Speech-synthesis voice
    #[arg(long = "tts-voice", default_value = DEFAULT_TTS_VOICE)]
    pub tts_voice: String,

    /// Whole-request timeout for cloud calls (seconds)
    #[arg(long = "http-timeout-s", default_value_t = DEFAULT_HTTP_TIMEOUT_S)]
    pub http_timeout_s: u64,

    /// Directory for cached prompt audio (defaults to the temp dir)
    #[arg(long = "prompt-cache-dir")]
    pub prompt_cache_dir: Option<PathBuf>,

    /// Skip all speaker output (spoken prompts, cues, replays)
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "TALKALONG_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "TALKALONG_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcript snippets (debug log only)
    #[arg(long = "log-content", env = "TALKALONG_LOG_CONTENT", default_value_t = false)]
    pub log_content: bool,
}

impl AppConfig {
    /// Endpointer settings for this run, with the threshold chosen by
    /// calibration or `--silence-threshold`.
    pub fn endpoint_config(&self, silence_threshold: f64) -> EndpointConfig {
        EndpointConfig {
            sample_rate: audio::DEFAULT_SAMPLE_RATE,
            chunk_size: audio::DEFAULT_CHUNK_SIZE,
            silence_threshold,
            silence_duration: self.silence_tail_s,
            timeout_duration: self.record_timeout_s,
            max_duration: self.record_max_s,
            skip_chunks: DEFAULT_SKIP_CHUNKS,
            speech_start_required: DEFAULT_SPEECH_START_CHUNKS,
            pause_reset_run: DEFAULT_PAUSE_RESET_CHUNKS,
            zcr_noise_threshold: DEFAULT_ZCR_NOISE,
            zcr_speech_threshold: DEFAULT_ZCR_SPEECH,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_s)
    }

    pub fn prompt_cache_dir(&self) -> PathBuf {
        self.prompt_cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("talkalong-prompts"))
    }
}

/// How a list is walked during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptOrder {
    #[default]
    Random,
    Sequential,
}

/// One named list of prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub items: Vec<String>,
    pub order: PromptOrder,
}

/// All prompt lists available to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBook {
    /// Word lists keyed by their `word_list_*` name, in key order.
    pub word_lists: Vec<(String, PromptSet)>,
    pub phrases: PromptSet,
}

impl PromptBook {
    /// The built-in starter lists.
    pub fn fallback() -> Self {
        Self {
            word_lists: vec![(
                "word_list".to_string(),
                PromptSet {
                    items: FALLBACK_WORDS.iter().map(|w| (*w).to_string()).collect(),
                    order: PromptOrder::Random,
                },
            )],
            phrases: PromptSet {
                items: FALLBACK_PHRASES.iter().map(|p| (*p).to_string()).collect(),
                order: PromptOrder::Random,
            },
        }
    }

    /// List for the selected mode. The first word list wins until a list
    /// selector exists in the UI.
    pub fn set_for(&self, mode: GameMode) -> &PromptSet {
        match mode {
            GameMode::Words => &self.word_lists[0].1,
            GameMode::Phrases => &self.phrases,
        }
    }
}

#[derive(Deserialize)]
struct RawPromptSet {
    items: Vec<String>,
    #[serde(default)]
    order: String,
}

impl RawPromptSet {
    fn into_set(self) -> PromptSet {
        let order = match self.order.as_str() {
            "sequential" => PromptOrder::Sequential,
            _ => PromptOrder::Random,
        };
        PromptSet {
            items: self
                .items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            order,
        }
    }
}

/// Load the prompt book, tolerating a missing or malformed file: the game
/// must still start for a kid whose parent fat-fingered the JSON.
pub fn load_prompt_book(config: &AppConfig) -> PromptBook {
    let fallback = PromptBook::fallback();
    let Some(path) = config.prompt_file.as_deref() else {
        return fallback;
    };
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            log_debug(&format!(
                "prompt_file_unreadable: {} ({err}); using built-in lists",
                path.display()
            ));
            return fallback;
        }
    };
    let parsed: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            log_debug(&format!(
                "prompt_file_invalid: {} ({err}); using built-in lists",
                path.display()
            ));
            return fallback;
        }
    };

    let mut word_lists = Vec::new();
    let mut phrases = None;
    for (key, value) in parsed {
        let Ok(raw_set) = serde_json::from_value::<RawPromptSet>(value) else {
            log_debug(&format!("prompt_file_bad_list: {key}; skipping"));
            continue;
        };
        let set = raw_set.into_set();
        if set.items.is_empty() {
            continue;
        }
        if key.starts_with("word_list") {
            word_lists.push((key, set));
        } else if key == "phrase_list" {
            phrases = Some(set);
        }
    }

    if word_lists.is_empty() {
        word_lists = fallback.word_lists.clone();
    }
    PromptBook {
        word_lists,
        phrases: phrases.unwrap_or(fallback.phrases),
    }
}
