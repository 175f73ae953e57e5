use super::calibrate::{mean_abs_amplitude, threshold_from_ambient};
use super::endpoint::{capture, EndpointConfig, StopReason};
use super::features::{rms, zero_crossing_rate};
use super::source::{append_downmixed_samples, AudioChunk, ChunkDispatcher, ChunkQueue, ChunkSource};
use super::MIN_SILENCE_THRESHOLD;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CHUNK: usize = 100;

fn test_config() -> EndpointConfig {
    EndpointConfig {
        sample_rate: 1_000,
        chunk_size: CHUNK,
        silence_threshold: 200.0,
        silence_duration: 0.5,  // 5 chunks
        timeout_duration: 2.0,  // 20 chunks
        max_duration: 3.0,      // 30 chunks
        skip_chunks: 2,
        speech_start_required: 2,
        pause_reset_run: 2,
        zcr_noise_threshold: 0.2,
        zcr_speech_threshold: 0.15,
    }
}

/// Constant positive amplitude: high RMS, zero ZCR. Classifies as speech.
fn loud() -> AudioChunk {
    AudioChunk {
        samples: vec![1_000; CHUNK],
        overflow: false,
    }
}

/// All zeros: silence.
fn quiet() -> AudioChunk {
    AudioChunk {
        samples: vec![0; CHUNK],
        overflow: false,
    }
}

/// Alternating full swings: high RMS but ZCR of 1.0, so broadband noise.
fn noisy() -> AudioChunk {
    AudioChunk {
        samples: (0..CHUNK)
            .map(|i| if i % 2 == 0 { 1_000 } else { -1_000 })
            .collect(),
        overflow: false,
    }
}

fn overflowed() -> AudioChunk {
    AudioChunk {
        samples: vec![1_000; CHUNK],
        overflow: true,
    }
}

enum Step {
    Chunk(AudioChunk),
    Error,
}

/// Plays back a script, then repeats `tail` forever.
struct ScriptedSource {
    steps: Vec<Step>,
    next: usize,
    tail: AudioChunk,
}

impl ScriptedSource {
    fn new(steps: Vec<Step>, tail: AudioChunk) -> Self {
        Self {
            steps,
            next: 0,
            tail,
        }
    }

    fn chunks(chunks: Vec<AudioChunk>, tail: AudioChunk) -> Self {
        Self::new(chunks.into_iter().map(Step::Chunk).collect(), tail)
    }
}

impl ChunkSource for ScriptedSource {
    fn read_chunk(&mut self) -> anyhow::Result<AudioChunk> {
        let step = self.steps.get(self.next);
        self.next += 1;
        match step {
            Some(Step::Chunk(chunk)) => Ok(chunk.clone()),
            Some(Step::Error) => Err(anyhow::anyhow!("scripted read failure")),
            None => Ok(self.tail.clone()),
        }
    }

    fn discard_buffered(&mut self) {}

    fn sample_rate(&self) -> u32 {
        1_000
    }
}

// --- features ---

#[test]
fn rms_of_known_signal() {
    assert_eq!(rms(&[]), 0.0);
    assert_eq!(rms(&[0, 0, 0]), 0.0);
    assert!((rms(&[1_000; 64]) - 1_000.0).abs() < 1e-9);
    assert!((rms(&[300, -400]) - (125_000.0f64).sqrt()).abs() < 1e-9);
}

#[test]
fn zcr_extremes() {
    assert_eq!(zero_crossing_rate(&[]), 0.0);
    assert_eq!(zero_crossing_rate(&[5]), 0.0);
    assert_eq!(zero_crossing_rate(&[7; 32]), 0.0);
    let alternating: Vec<i16> = (0..32).map(|i| if i % 2 == 0 { 100 } else { -100 }).collect();
    assert!((zero_crossing_rate(&alternating) - 1.0).abs() < 1e-9);
}

#[test]
fn zcr_counts_half_swings_as_half() {
    // Positive to zero is one signum step, not a full crossing.
    assert!((zero_crossing_rate(&[100, 0]) - 0.5).abs() < 1e-9);
}

// --- downmix and dispatch ---

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[10i16, 20, 30, 40], 2, |sample| sample);
    assert_eq!(buf, vec![15, 35]);
}

#[test]
fn downmix_averages_a_partial_trailing_frame() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[10i16, 20, 30], 2, |sample| sample);
    assert_eq!(buf, vec![15, 30]);
}

#[test]
fn preserves_single_channel_audio() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[1i16, 2, 3], 1, |sample| sample);
    assert_eq!(buf, vec![1, 2, 3]);
}

#[test]
fn dispatcher_emits_fixed_size_chunks() {
    let (tx, rx) = bounded(8);
    let overflowed = Arc::new(AtomicBool::new(false));
    let mut dispatcher = ChunkDispatcher::new(4, tx, overflowed.clone());
    dispatcher.push(&[1i16, 2, 3, 4, 5, 6, 7, 8, 9], 1, |sample| sample);
    assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(rx.try_recv().unwrap(), vec![5, 6, 7, 8]);
    assert!(rx.try_recv().is_err()); // the ninth sample is still pending
    assert!(!overflowed.load(Ordering::Relaxed));
}

#[test]
fn dispatcher_flags_overflow_when_channel_is_full() {
    let (tx, rx) = bounded(1);
    let overflowed = Arc::new(AtomicBool::new(false));
    let mut dispatcher = ChunkDispatcher::new(2, tx, overflowed.clone());
    dispatcher.push(&[1i16, 2, 3, 4, 5, 6], 1, |sample| sample);
    assert_eq!(rx.try_recv().unwrap(), vec![1, 2]);
    assert!(overflowed.load(Ordering::Relaxed));
}

#[test]
fn discarding_buffered_audio_is_idempotent() {
    let (tx, rx) = bounded(4);
    let overflowed = Arc::new(AtomicBool::new(true));
    let mut queue = ChunkQueue::new(rx, overflowed.clone());
    tx.send(vec![1i16; 4]).unwrap();
    tx.send(vec![2i16; 4]).unwrap();

    queue.discard();
    assert!(!overflowed.load(Ordering::Relaxed));
    assert!(queue.read(Duration::from_millis(5)).is_err());

    // A second discard on the now-empty queue leaves the same state.
    queue.discard();
    assert!(!overflowed.load(Ordering::Relaxed));
    assert!(queue.read(Duration::from_millis(5)).is_err());

    // Audio arriving afterwards still flows through, with a clean flag.
    tx.send(vec![3i16; 2]).unwrap();
    let chunk = queue.read(Duration::from_millis(50)).unwrap();
    assert_eq!(chunk.samples, vec![3, 3]);
    assert!(!chunk.overflow);
}

// --- calibration ---

#[test]
fn ambient_level_is_the_mean_absolute_amplitude() {
    assert_eq!(mean_abs_amplitude(&[]), 0.0);
    assert_eq!(mean_abs_amplitude(&[0, 0]), 0.0);
    assert!((mean_abs_amplitude(&[100, -300]) - 200.0).abs() < 1e-9);
}

#[test]
fn threshold_rounds_up_to_the_next_hundred() {
    assert_eq!(threshold_from_ambient(450.0), 700.0); // 675 -> 700
    assert_eq!(threshold_from_ambient(1_000.0), 1_500.0);
    assert_eq!(threshold_from_ambient(200.0), 300.0);
}

#[test]
fn threshold_never_drops_below_the_floor() {
    assert_eq!(threshold_from_ambient(0.0), MIN_SILENCE_THRESHOLD);
    assert_eq!(threshold_from_ambient(50.0), MIN_SILENCE_THRESHOLD);
    assert_eq!(threshold_from_ambient(-10.0), MIN_SILENCE_THRESHOLD);
    assert_eq!(threshold_from_ambient(f64::NAN), MIN_SILENCE_THRESHOLD);
}

// --- endpointer ---

#[test]
fn stops_on_trailing_silence_and_keeps_every_chunk() {
    let cfg = test_config();
    // Enough qualifying chunks to cover pre-roll plus start confirmation,
    // then silence: 4 loud, then quiet forever.
    let mut source = ScriptedSource::chunks(vec![loud(), loud(), loud(), loud()], quiet());

    let result = capture(&cfg, &mut source);
    assert_eq!(
        result.reason,
        StopReason::SilenceAfterSpeech { pause_chunks: 5 }
    );
    assert_eq!(result.metrics.chunks_retained, 9);
    assert_eq!(result.audio.len(), 9 * CHUNK);
    assert!(result.metrics.chunks_retained < cfg.max_chunks());
    assert_eq!(result.metrics.speech_confirmed_at, Some(3));
    assert!(result.speech().is_some());
}

#[test]
fn times_out_at_exactly_the_timeout_chunk_count() {
    let cfg = test_config();
    let mut source = ScriptedSource::chunks(vec![], quiet());

    let result = capture(&cfg, &mut source);
    assert_eq!(result.reason, StopReason::NoSpeechTimeout);
    assert_eq!(result.metrics.chunks_retained, cfg.timeout_chunks());
    assert_eq!(result.audio.len(), cfg.timeout_chunks() * CHUNK);
    assert!(result.speech().is_none());
}

#[test]
fn noise_never_confirms_a_speech_start() {
    let cfg = test_config();
    // Loud but with a ZCR far above the speech ceiling.
    let mut source = ScriptedSource::chunks(vec![], noisy());

    let result = capture(&cfg, &mut source);
    assert_eq!(result.reason, StopReason::NoSpeechTimeout);
    assert_eq!(result.metrics.speech_confirmed_at, None);
}

#[test]
fn truncates_at_max_chunks_when_speech_never_ends() {
    let cfg = test_config();
    let mut source = ScriptedSource::chunks(vec![], loud());

    let result = capture(&cfg, &mut source);
    assert_eq!(result.reason, StopReason::MaxDuration);
    assert_eq!(result.metrics.chunks_retained, cfg.max_chunks());
    assert_eq!(result.audio.len(), cfg.max_chunks() * CHUNK);
    assert!(result.speech().is_some());
}

#[test]
fn start_confirmation_survives_gaps() {
    let cfg = test_config();
    // One qualifying chunk, a long quiet gap, then another qualifying
    // chunk: the confirmation counter holds across the gap.
    let mut chunks = vec![loud(), loud()];
    chunks.extend(std::iter::repeat_with(quiet).take(10));
    chunks.push(loud());
    let mut source = ScriptedSource::chunks(chunks, quiet());

    let result = capture(&cfg, &mut source);
    assert_eq!(
        result.reason,
        StopReason::SilenceAfterSpeech { pause_chunks: 5 }
    );
    assert_eq!(result.metrics.speech_confirmed_at, Some(13));
}

#[test]
fn a_convincing_resumption_cancels_the_pause() {
    let cfg = test_config();
    // Speech, a 3-chunk pause (below the 5-chunk stop), a 2-chunk voiced
    // run that resets it, more speech, then the real trailing silence.
    let mut chunks = vec![loud(), loud(), loud(), loud()];
    chunks.extend(std::iter::repeat_with(quiet).take(3));
    chunks.extend(std::iter::repeat_with(loud).take(2));
    let mut source = ScriptedSource::chunks(chunks, quiet());

    let result = capture(&cfg, &mut source);
    assert_eq!(
        result.reason,
        StopReason::SilenceAfterSpeech { pause_chunks: 5 }
    );
    // 4 speech + 3 pause + 2 recovery + 5 trailing silence.
    assert_eq!(result.metrics.chunks_retained, 14);
}

#[test]
fn overflow_chunks_are_dropped_without_touching_counters() {
    let cfg = test_config();
    let mut chunks = vec![loud(), overflowed(), loud(), overflowed(), loud(), loud()];
    chunks.extend(std::iter::repeat_with(quiet).take(10));
    let mut source = ScriptedSource::chunks(chunks, quiet());

    let result = capture(&cfg, &mut source);
    assert_eq!(
        result.reason,
        StopReason::SilenceAfterSpeech { pause_chunks: 5 }
    );
    assert_eq!(result.metrics.overflow_chunks, 2);
    // Same shape as the uninterrupted run: 4 speech + 5 silence retained.
    assert_eq!(result.metrics.chunks_retained, 9);
    assert_eq!(result.audio.len(), 9 * CHUNK);
}

#[test]
fn failed_reads_are_skipped_and_counted() {
    let cfg = test_config();
    let steps = vec![
        Step::Chunk(loud()),
        Step::Error,
        Step::Chunk(loud()),
        Step::Chunk(loud()),
        Step::Error,
        Step::Chunk(loud()),
    ];
    let mut source = ScriptedSource::new(steps, quiet());

    let result = capture(&cfg, &mut source);
    assert_eq!(
        result.reason,
        StopReason::SilenceAfterSpeech { pause_chunks: 5 }
    );
    assert_eq!(result.metrics.read_errors, 2);
    assert_eq!(result.metrics.chunks_retained, 9);
}

#[test]
fn empty_chunks_are_not_retained() {
    let cfg = test_config();
    let empty = AudioChunk {
        samples: Vec::new(),
        overflow: false,
    };
    let mut chunks = vec![loud(), empty, loud(), loud(), loud()];
    chunks.extend(std::iter::repeat_with(quiet).take(10));
    let mut source = ScriptedSource::chunks(chunks, quiet());

    let result = capture(&cfg, &mut source);
    assert_eq!(result.metrics.chunks_retained, 9);
    assert_eq!(result.audio.len(), 9 * CHUNK);
}

#[test]
fn derived_limits_round_to_nearest_chunk() {
    let cfg = test_config();
    assert_eq!(cfg.silence_chunks(), 5);
    assert_eq!(cfg.timeout_chunks(), 20);
    assert_eq!(cfg.max_chunks(), 30);
    assert_eq!(cfg.min_speech_chunks(), 4);

    let odd = EndpointConfig {
        silence_duration: 0.44, // 4.4 chunks -> 4
        timeout_duration: 0.46, // 4.6 chunks -> 5
        ..test_config()
    };
    assert_eq!(odd.silence_chunks(), 4);
    assert_eq!(odd.timeout_chunks(), 5);
}

#[test]
fn rate_rebuild_changes_chunk_limits() {
    let cfg = test_config().with_sample_rate(2_000);
    // Same durations, twice the rate: every limit doubles.
    assert_eq!(cfg.silence_chunks(), 10);
    assert_eq!(cfg.timeout_chunks(), 40);
    assert_eq!(cfg.max_chunks(), 60);
}
