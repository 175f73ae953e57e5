//! Background recognition worker.
//!
//! One thread owns the capture stream for the whole session and services
//! listen requests from the status cell. The game loop never touches the
//! microphone or the network; it only reads the cell.

use crate::audio::{self, ChunkSource, EndpointConfig, InputDevice};
use crate::log_debug;
use crate::playback::Playback;
use crate::status::{RecognizeError, StatusCell};
use crate::stt::Transcriber;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// How often the worker re-checks the shutdown flag while idle.
const IDLE_WAIT: Duration = Duration::from_millis(200);

/// Longest we let a queued prompt finish before recording over it.
const PROMPT_DRAIN_MAX: Duration = Duration::from_secs(5);

/// Longest we wait for the ready cue to finish playing.
const CUE_DRAIN_MAX: Duration = Duration::from_secs(1);

/// Handle the game loop uses to shut the worker down at exit.
pub struct RecognizerHandle {
    handle: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    sample_rate: u32,
}

impl RecognizerHandle {
    /// Rate the capture stream opened with; replays of captured audio must
    /// use this, not the rate the config asked for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Signal shutdown and wait for the thread to finish its current
    /// attempt and exit.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the recognition worker.
///
/// The capture stream is opened on the worker thread itself; audio streams
/// are not movable across threads on every platform. Startup blocks until
/// the stream either opens or fails, so a missing microphone surfaces as an
/// error here instead of as a silently dead worker.
pub fn spawn_recognizer(
    device: InputDevice,
    status: Arc<StatusCell>,
    transcriber: Arc<dyn Transcriber>,
    playback: Arc<dyn Playback>,
    endpoint_cfg: EndpointConfig,
    language: String,
) -> Result<RecognizerHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<std::result::Result<u32, String>>(1);

    let handle = thread::Builder::new()
        .name("talkalong-recognizer".to_string())
        .spawn(move || {
            let mut source = match device.open_chunk_source(endpoint_cfg.chunk_size) {
                Ok(source) => {
                    let _ = ready_tx.send(Ok(source.sample_rate()));
                    source
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(format!("{err:#}")));
                    return;
                }
            };
            // Derived chunk limits must match the rate the device actually
            // negotiated, not the rate we asked for.
            let cfg = endpoint_cfg.with_sample_rate(source.sample_rate());

            while !thread_stop.load(Ordering::Relaxed) {
                if !status.await_listen(IDLE_WAIT) {
                    continue;
                }
                run_attempt(
                    &status,
                    &mut source,
                    &cfg,
                    transcriber.as_ref(),
                    playback.as_ref(),
                    &language,
                );
            }
            log_debug("recognizer_worker: shutting down");
        })?;

    match ready_rx.recv() {
        Ok(Ok(rate)) => {
            log_debug(&format!("recognizer_worker: capture open at {rate} Hz"));
            Ok(RecognizerHandle {
                handle: Some(handle),
                stop,
                sample_rate: rate,
            })
        }
        Ok(Err(msg)) => {
            let _ = handle.join();
            Err(anyhow!("failed to open capture stream: {msg}"))
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("recognizer worker exited before reporting readiness"))
        }
    }
}

/// One claimed listen request, end to end.
///
/// Publishing goes through the status cell, which drops results for
/// attempts the game has already cancelled. A cancelled attempt also skips
/// the network call; there is no one left to read the transcript.
fn run_attempt(
    status: &StatusCell,
    source: &mut dyn audio::ChunkSource,
    cfg: &EndpointConfig,
    transcriber: &dyn Transcriber,
    playback: &dyn Playback,
    language: &str,
) {
    playback.wait_until_idle(PROMPT_DRAIN_MAX);
    playback.play_cue();
    playback.wait_until_idle(CUE_DRAIN_MAX);

    // Anything buffered before the cue belongs to the previous attempt.
    source.discard_buffered();

    let result = audio::capture(cfg, source);
    log_debug(&format!(
        "attempt_capture: reason={:?} retained={} overflow={} errors={}",
        result.reason,
        result.metrics.chunks_retained,
        result.metrics.overflow_chunks,
        result.metrics.read_errors
    ));

    let Some(speech) = result.speech() else {
        status.publish_error(RecognizeError::NoSpeechTimeout);
        return;
    };

    if !status.is_listening() {
        log_debug("attempt_capture: cancelled before transcription");
        return;
    }

    match transcriber.transcribe(speech, cfg.sample_rate, language) {
        Ok(text) if text.trim().is_empty() => {
            status.publish_error(RecognizeError::Unrecognized);
        }
        Ok(text) => status.publish_complete(text, Some(Arc::new(result.audio.clone()))),
        Err(err) => status.publish_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioChunk, ChunkSource};
    use crate::playback::SilentPlayback;
    use crate::status::{Outcome, RecognizerStatus};

    fn test_cfg() -> EndpointConfig {
        EndpointConfig {
            sample_rate: 1_000,
            chunk_size: 100,
            silence_threshold: 200.0,
            silence_duration: 0.5,
            timeout_duration: 2.0,
            max_duration: 10.0,
            skip_chunks: 2,
            speech_start_required: 2,
            pause_reset_run: 2,
            zcr_noise_threshold: 0.2,
            zcr_speech_threshold: 0.15,
        }
    }

    struct ScriptedSource {
        chunks: Vec<AudioChunk>,
        next: usize,
        discards: usize,
    }

    impl ScriptedSource {
        fn new(chunks: Vec<AudioChunk>) -> Self {
            Self {
                chunks,
                next: 0,
                discards: 0,
            }
        }
    }

    impl ChunkSource for ScriptedSource {
        fn read_chunk(&mut self) -> anyhow::Result<AudioChunk> {
            let chunk = self
                .chunks
                .get(self.next)
                .cloned()
                .unwrap_or_else(|| AudioChunk {
                    samples: vec![0; 100],
                    overflow: false,
                });
            self.next += 1;
            Ok(chunk)
        }

        fn discard_buffered(&mut self) {
            self.discards += 1;
        }

        fn sample_rate(&self) -> u32 {
            1_000
        }
    }

    struct FixedTranscriber(std::result::Result<String, RecognizeError>);

    impl Transcriber for FixedTranscriber {
        fn transcribe(
            &self,
            _samples: &[i16],
            _sample_rate: u32,
            _language: &str,
        ) -> Result<String, RecognizeError> {
            self.0.clone()
        }
    }

    struct PanicTranscriber;

    impl Transcriber for PanicTranscriber {
        fn transcribe(
            &self,
            _samples: &[i16],
            _sample_rate: u32,
            _language: &str,
        ) -> Result<String, RecognizeError> {
            panic!("transcriber must not be called for a silent attempt");
        }
    }

    fn loud_chunk() -> AudioChunk {
        AudioChunk {
            samples: vec![1_000; 100],
            overflow: false,
        }
    }

    fn quiet_chunk() -> AudioChunk {
        AudioChunk {
            samples: vec![0; 100],
            overflow: false,
        }
    }

    fn claimed_cell() -> Arc<StatusCell> {
        let status = Arc::new(StatusCell::new());
        assert!(status.request_listen());
        assert!(status.await_listen(Duration::from_millis(10)));
        status
    }

    #[test]
    fn attempt_publishes_transcript() {
        let status = claimed_cell();
        let mut source = ScriptedSource::new(vec![
            quiet_chunk(),
            loud_chunk(),
            loud_chunk(),
            loud_chunk(),
        ]);
        run_attempt(
            &status,
            &mut source,
            &test_cfg(),
            &FixedTranscriber(Ok("apple".to_string())),
            &SilentPlayback,
            "en",
        );
        assert_eq!(source.discards, 1);
        match status.take_outcome() {
            Some(Outcome::Recognized { text, audio }) => {
                assert_eq!(text, "apple");
                assert!(audio.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn silent_attempt_skips_the_network() {
        let status = claimed_cell();
        let mut source = ScriptedSource::new(vec![]);
        run_attempt(
            &status,
            &mut source,
            &test_cfg(),
            &PanicTranscriber,
            &SilentPlayback,
            "en",
        );
        assert_eq!(
            status.take_outcome(),
            Some(Outcome::Failed(RecognizeError::NoSpeechTimeout))
        );
    }

    #[test]
    fn blank_transcript_counts_as_unrecognized() {
        let status = claimed_cell();
        let mut source = ScriptedSource::new(vec![
            quiet_chunk(),
            loud_chunk(),
            loud_chunk(),
            loud_chunk(),
        ]);
        run_attempt(
            &status,
            &mut source,
            &test_cfg(),
            &FixedTranscriber(Ok("   ".to_string())),
            &SilentPlayback,
            "en",
        );
        assert_eq!(
            status.take_outcome(),
            Some(Outcome::Failed(RecognizeError::Unrecognized))
        );
    }

    #[test]
    fn service_error_reaches_the_game() {
        let status = claimed_cell();
        let mut source = ScriptedSource::new(vec![
            quiet_chunk(),
            loud_chunk(),
            loud_chunk(),
            loud_chunk(),
        ]);
        run_attempt(
            &status,
            &mut source,
            &test_cfg(),
            &FixedTranscriber(Err(RecognizeError::Service("boom".to_string()))),
            &SilentPlayback,
            "en",
        );
        assert_eq!(
            status.take_outcome(),
            Some(Outcome::Failed(RecognizeError::Service("boom".to_string())))
        );
    }

    #[test]
    fn cancelled_attempt_publishes_nothing() {
        let status = claimed_cell();
        status.cancel();
        let mut source = ScriptedSource::new(vec![
            quiet_chunk(),
            loud_chunk(),
            loud_chunk(),
            loud_chunk(),
        ]);
        run_attempt(
            &status,
            &mut source,
            &test_cfg(),
            &PanicTranscriber,
            &SilentPlayback,
            "en",
        );
        assert_eq!(status.status(), RecognizerStatus::Ready);
        assert!(status.take_outcome().is_none());
    }
}
