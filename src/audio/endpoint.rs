//! Speech endpoint detection.
//!
//! A small state machine over per-chunk features decides when the player
//! started speaking and when they stopped. Thresholds come in one config
//! struct so calibration and CLI overrides feed a single place.

use crate::audio::features::analyze;
use crate::audio::source::ChunkSource;
use crate::log_debug;

/// All knobs for one capture attempt.
///
/// Durations are in seconds; the chunk-count limits are derived from the
/// sample rate the stream actually opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub sample_rate: u32,
    pub chunk_size: usize,
    /// RMS floor below which a chunk counts as silence.
    pub silence_threshold: f64,
    /// Trailing low-energy audio required to end a speech segment.
    pub silence_duration: f64,
    /// How long to wait for speech to start before giving up.
    pub timeout_duration: f64,
    /// Hard cap on total recording time.
    pub max_duration: f64,
    /// Leading chunks retained but never classified, so device settling
    /// noise can't fake a speech start.
    pub skip_chunks: usize,
    /// Qualifying chunks needed to confirm the player started speaking.
    pub speech_start_required: usize,
    /// Consecutive voiced chunks needed to cancel an in-progress pause.
    pub pause_reset_run: usize,
    /// ZCR above this marks a chunk as broadband noise, not speech.
    pub zcr_noise_threshold: f64,
    /// ZCR must stay below this for a chunk to qualify as speech.
    pub zcr_speech_threshold: f64,
}

impl EndpointConfig {
    fn chunks_for(&self, seconds: f64) -> usize {
        let per_chunk = self.chunk_size.max(1) as f64 / f64::from(self.sample_rate.max(1));
        ((seconds / per_chunk).round() as usize).max(1)
    }

    /// Trailing-silence chunks required to end a speech segment.
    pub fn silence_chunks(&self) -> usize {
        self.chunks_for(self.silence_duration)
    }

    /// Chunk count at which an attempt with no confirmed speech gives up.
    pub fn timeout_chunks(&self) -> usize {
        self.chunks_for(self.timeout_duration)
    }

    /// Absolute chunk cap for one attempt.
    pub fn max_chunks(&self) -> usize {
        self.chunks_for(self.max_duration)
    }

    /// Shortest buffer that can plausibly contain confirmed speech.
    pub fn min_speech_chunks(&self) -> usize {
        self.skip_chunks + self.speech_start_required
    }

    /// Rebuild the derived limits against the rate the device negotiated.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

/// Why a capture attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Speech was confirmed and followed by enough trailing silence.
    SilenceAfterSpeech { pause_chunks: usize },
    /// No speech start within the timeout window.
    NoSpeechTimeout,
    /// The hard duration cap cut the recording off.
    MaxDuration,
}

/// Counters for session diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointMetrics {
    pub chunks_retained: usize,
    pub overflow_chunks: usize,
    pub read_errors: usize,
    /// Chunk index (1-based, counting retained chunks) at which speech was
    /// confirmed, if it ever was.
    pub speech_confirmed_at: Option<usize>,
}

/// Everything one capture attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResult {
    pub audio: Vec<i16>,
    pub reason: StopReason,
    pub metrics: EndpointMetrics,
}

impl EndpointResult {
    /// The captured speech, or `None` when the attempt timed out or nothing
    /// was ever buffered.
    pub fn speech(&self) -> Option<&[i16]> {
        match self.reason {
            StopReason::NoSpeechTimeout => None,
            _ if self.audio.is_empty() => None,
            _ => Some(&self.audio),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    AwaitingStart { qualifying: usize },
    InSpeech { pause: usize, recovery: usize },
}

/// Pull chunks from `source` until an endpoint decision is reached.
///
/// Every retained chunk lands in the output buffer, pre-roll included, so
/// the recognizer hears the very beginning of a fast speaker. Overflowed,
/// empty, and failed reads are dropped without touching any counter, but
/// every read counts against the `max_chunks` read limit so a wedged stream
/// still terminates.
pub fn capture(cfg: &EndpointConfig, source: &mut dyn ChunkSource) -> EndpointResult {
    let silence_chunks = cfg.silence_chunks();
    let timeout_chunks = cfg.timeout_chunks();
    let max_chunks = cfg.max_chunks();
    let min_speech_chunks = cfg.min_speech_chunks();

    let mut audio: Vec<i16> = Vec::with_capacity(max_chunks.saturating_mul(cfg.chunk_size));
    let mut metrics = EndpointMetrics::default();
    let mut phase = Phase::AwaitingStart { qualifying: 0 };
    let mut chunks_retained = 0usize;
    let mut reads = 0usize;

    let reason = loop {
        if chunks_retained >= max_chunks || reads >= max_chunks {
            break StopReason::MaxDuration;
        }
        reads += 1;

        let chunk = match source.read_chunk() {
            Ok(chunk) => chunk,
            Err(err) => {
                metrics.read_errors += 1;
                log_debug(&format!("endpoint_read_error: {err}"));
                continue;
            }
        };
        if chunk.overflow {
            metrics.overflow_chunks += 1;
            continue;
        }
        if chunk.samples.is_empty() {
            continue;
        }

        audio.extend_from_slice(&chunk.samples);
        chunks_retained += 1;
        metrics.chunks_retained = chunks_retained;

        // Pre-roll: buffered but never classified.
        if chunks_retained < cfg.skip_chunks {
            continue;
        }

        let features = analyze(&chunk.samples);
        phase = match phase {
            Phase::AwaitingStart { mut qualifying } => {
                if features.rms >= cfg.silence_threshold
                    && features.zcr < cfg.zcr_speech_threshold
                {
                    qualifying += 1;
                }
                if qualifying >= cfg.speech_start_required {
                    metrics.speech_confirmed_at = Some(chunks_retained);
                    Phase::InSpeech {
                        pause: 0,
                        recovery: 0,
                    }
                } else if chunks_retained >= timeout_chunks {
                    break StopReason::NoSpeechTimeout;
                } else {
                    Phase::AwaitingStart { qualifying }
                }
            }
            Phase::InSpeech {
                mut pause,
                mut recovery,
            } => {
                let trailing_silence = features.rms < cfg.silence_threshold
                    || features.zcr > cfg.zcr_noise_threshold;
                if trailing_silence {
                    pause += 1;
                    recovery = 0;
                } else if pause > 0 {
                    recovery += 1;
                    if recovery >= cfg.pause_reset_run {
                        pause = 0;
                        recovery = 0;
                    }
                }
                if pause >= silence_chunks && chunks_retained >= pause + min_speech_chunks {
                    break StopReason::SilenceAfterSpeech {
                        pause_chunks: pause,
                    };
                }
                Phase::InSpeech { pause, recovery }
            }
        };
    };

    log_debug(&format!(
        "endpoint_stop: reason={reason:?} retained={} overflow={} errors={}",
        metrics.chunks_retained, metrics.overflow_chunks, metrics.read_errors
    ));

    EndpointResult {
        audio,
        reason,
        metrics,
    }
}
