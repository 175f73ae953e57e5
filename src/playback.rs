//! Speaker output.
//!
//! A dedicated thread owns the output device; the game and the worker only
//! enqueue sounds. Audio devices are not generally movable across threads,
//! so everything device-shaped stays on the playback thread.

use crate::log_debug;
use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Sender};
use rodio::Source;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

const CUE_FREQUENCY_HZ: f32 = 880.0;
const CUE_DURATION: Duration = Duration::from_millis(180);
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Sound output the session depends on. The speaker-backed implementation
/// is the real one; tests and `--quiet` runs use [`SilentPlayback`].
pub trait Playback: Send + Sync {
    /// Short beep telling the player the microphone is live.
    fn play_cue(&self);

    /// Queue an encoded clip (WAV or MP3) such as a spoken prompt.
    fn play_clip(&self, bytes: Vec<u8>);

    /// True while any queued sound is still playing.
    fn is_busy(&self) -> bool;

    /// Block until the queue drains or `max` passes. The worker calls this
    /// before recording so the prompt audio can't bleed into the capture.
    fn wait_until_idle(&self, max: Duration) {
        let deadline = Instant::now() + max;
        while self.is_busy() && Instant::now() < deadline {
            std::thread::sleep(IDLE_POLL);
        }
    }
}

enum Cmd {
    Cue,
    Clip(Vec<u8>),
}

/// Plays through the default output device.
pub struct SpeakerOutput {
    sender: Sender<Cmd>,
    active: Arc<AtomicUsize>,
}

impl SpeakerOutput {
    /// Open the default output device. Fails fast if there is none, so the
    /// session can fall back to silent mode at startup rather than
    /// discovering a dead speaker mid-game.
    pub fn new() -> Result<Self> {
        let (sender, receiver) = unbounded::<Cmd>();
        let active = Arc::new(AtomicUsize::new(0));
        let thread_active = active.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<std::result::Result<(), String>>(1);

        std::thread::Builder::new()
            .name("talkalong-playback".to_string())
            .spawn(move || {
                let device_sink = match rodio::DeviceSinkBuilder::from_default_device() {
                    Ok(builder) => match builder.open_sink_or_fallback() {
                        Ok(sink) => sink,
                        Err(err) => {
                            let _ = ready_tx.send(Err(format!("open output device: {err}")));
                            return;
                        }
                    },
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("no output device: {err}")));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                for cmd in receiver {
                    match cmd {
                        Cmd::Cue => {
                            let sink = rodio::Player::connect_new(device_sink.mixer());
                            let tone = rodio::source::SineWave::new(CUE_FREQUENCY_HZ)
                                .take_duration(CUE_DURATION)
                                .amplify(0.25);
                            sink.append(tone);
                            sink.sleep_until_end();
                        }
                        Cmd::Clip(bytes) => match rodio::play(device_sink.mixer(), Cursor::new(bytes)) {
                            Ok(player) => player.sleep_until_end(),
                            Err(err) => log_debug(&format!("playback_decode_error: {err}")),
                        },
                    }
                    thread_active.fetch_sub(1, Ordering::SeqCst);
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { sender, active }),
            Ok(Err(msg)) => Err(anyhow!(msg)),
            Err(_) => Err(anyhow!("playback thread exited before reporting readiness")),
        }
    }

    fn enqueue(&self, cmd: Cmd) {
        self.active.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(cmd).is_err() {
            self.active.fetch_sub(1, Ordering::SeqCst);
            log_debug("playback_enqueue_failed: thread gone");
        }
    }
}

impl Playback for SpeakerOutput {
    fn play_cue(&self) {
        self.enqueue(Cmd::Cue);
    }

    fn play_clip(&self, bytes: Vec<u8>) {
        self.enqueue(Cmd::Clip(bytes));
    }

    fn is_busy(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }
}

/// No-op output for tests and machines without speakers.
#[derive(Default)]
pub struct SilentPlayback;

impl Playback for SilentPlayback {
    fn play_cue(&self) {}

    fn play_clip(&self, _bytes: Vec<u8>) {}

    fn is_busy(&self) -> bool {
        false
    }
}
