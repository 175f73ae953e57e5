//! Microphone capture via CPAL.
//!
//! The device stream is opened once and runs for the whole session; the
//! endpointer pulls fixed-size chunks out of a bounded channel fed by the
//! CPAL callback. All input formats are converted to signed 16-bit mono.

use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How many chunks may queue between the callback and the reader before the
/// source starts reporting overruns.
const CHANNEL_CAPACITY: usize = 64;

/// One fixed-size block of captured mono samples.
///
/// `overflow` is set when the capture channel overran since the previous
/// read; the endpointer discards such chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub overflow: bool,
}

/// Pull-based chunk reader the endpointer runs against.
///
/// The CPAL-backed implementation blocks for at most a few chunk durations
/// per read; tests substitute synthetic sources.
pub trait ChunkSource {
    /// Read the next chunk. Errors are transient (a stalled or disconnected
    /// stream); callers skip the read and continue.
    fn read_chunk(&mut self) -> Result<AudioChunk>;

    /// Drop any audio buffered since the last read. Idempotent; called at
    /// the start of every attempt so a previous prompt's tail can't leak
    /// into the new recording.
    fn discard_buffered(&mut self);

    /// Rate the stream actually opened with.
    fn sample_rate(&self) -> u32;
}

/// Downmix interleaved multi-channel input to mono i16 while applying the
/// format converter, so the endpointer sees one channel regardless of the
/// microphone layout.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<i16>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> i16,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    let mut acc = 0i32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += i32::from(convert(sample));
        count += 1;
        if count == channels {
            buf.push((acc / channels as i32) as i16);
            acc = 0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push((acc / count as i32) as i16);
    }
}

/// Accumulates callback deliveries into fixed-size chunks and hands them to
/// the reader side. Runs on the CPAL callback thread; must never block.
pub(super) struct ChunkDispatcher {
    chunk_samples: usize,
    pending: Vec<i16>,
    scratch: Vec<i16>,
    sender: Sender<Vec<i16>>,
    overflowed: Arc<AtomicBool>,
}

impl ChunkDispatcher {
    pub(super) fn new(
        chunk_samples: usize,
        sender: Sender<Vec<i16>>,
        overflowed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            chunk_samples: chunk_samples.max(1),
            pending: Vec::with_capacity(chunk_samples),
            scratch: Vec::new(),
            sender,
            overflowed,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> i16,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.chunk_samples {
            let chunk: Vec<i16> = self.pending.drain(..self.chunk_samples).collect();
            if let Err(err) = self.sender.try_send(chunk) {
                match err {
                    TrySendError::Full(_) => {
                        self.overflowed.store(true, Ordering::Relaxed);
                    }
                    TrySendError::Disconnected(_) => break,
                }
            }
        }
    }
}

/// Reader side of the capture channel: hands fixed-size chunks to the
/// endpointer and reports overruns flagged by the callback.
pub(super) struct ChunkQueue {
    receiver: Receiver<Vec<i16>>,
    overflowed: Arc<AtomicBool>,
}

impl ChunkQueue {
    pub(super) fn new(receiver: Receiver<Vec<i16>>, overflowed: Arc<AtomicBool>) -> Self {
        Self {
            receiver,
            overflowed,
        }
    }

    pub(super) fn read(&mut self, timeout: Duration) -> Result<AudioChunk> {
        match self.receiver.recv_timeout(timeout) {
            Ok(samples) => Ok(AudioChunk {
                samples,
                overflow: self.overflowed.swap(false, Ordering::Relaxed),
            }),
            Err(RecvTimeoutError::Timeout) => Err(anyhow!("capture stream produced no data")),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("capture stream disconnected")),
        }
    }

    /// Drain everything queued and clear the overrun flag. Safe to call any
    /// number of times; on an already-empty queue it changes nothing.
    pub(super) fn discard(&mut self) {
        while self.receiver.try_recv().is_ok() {}
        self.overflowed.store(false, Ordering::Relaxed);
    }
}

/// Audio input device wrapper.
///
/// Holds the CPAL device only; streams are built on the thread that uses
/// them, because a stream cannot move across threads on every platform.
pub struct InputDevice {
    device: cpal::Device,
}

impl InputDevice {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Open a device, optionally by name so users can pick the right
    /// microphone when a laptop exposes multiple inputs.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        Ok(Self { device })
    }

    /// Name of the active capture device.
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Record for a fixed `duration` and return mono i16 samples at the
    /// device rate. Used by ambient-noise calibration at startup.
    pub fn record_for(&self, duration: Duration) -> Result<Vec<i16>> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let sample_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));

        let expected =
            (duration.as_secs_f64() * f64::from(sample_rate)).ceil() as usize;
        let buffer = Arc::new(Mutex::new(Vec::<i16>::with_capacity(expected)));
        let buffer_clone = buffer.clone();

        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
        let stream = match format {
            SampleFormat::I16 => self.device.build_input_stream(
                &device_config,
                move |data: &[i16], _| {
                    if let Ok(mut buf) = buffer_clone.lock() {
                        append_downmixed_samples(&mut buf, data, channels, |sample| sample);
                    }
                },
                err_fn,
                None,
            )?,
            SampleFormat::F32 => self.device.build_input_stream(
                &device_config,
                move |data: &[f32], _| {
                    if let Ok(mut buf) = buffer_clone.lock() {
                        append_downmixed_samples(&mut buf, data, channels, f32_to_i16);
                    }
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => self.device.build_input_stream(
                &device_config,
                move |data: &[u16], _| {
                    if let Ok(mut buf) = buffer_clone.lock() {
                        append_downmixed_samples(&mut buf, data, channels, u16_to_i16);
                    }
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play()?;
        std::thread::sleep(duration);
        if let Err(err) = stream.pause() {
            log_debug(&format!("failed to pause calibration stream: {err}"));
        }
        drop(stream);

        let samples = buffer
            .lock()
            .map_err(|_| anyhow!("calibration buffer lock poisoned"))?;
        if samples.is_empty() {
            return Err(anyhow!(
                "no samples captured from '{}'; check microphone permissions and availability",
                self.device_name()
            ));
        }
        Ok(samples.clone())
    }

    /// Open the long-lived capture stream. Call on the thread that will read
    /// from it and keep the returned source alive for the whole session.
    pub fn open_chunk_source(self, chunk_size: usize) -> Result<CpalChunkSource> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let sample_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));

        let (sender, receiver) = bounded::<Vec<i16>>(CHANNEL_CAPACITY);
        let overflowed = Arc::new(AtomicBool::new(false));
        let dispatcher = Arc::new(Mutex::new(ChunkDispatcher::new(
            chunk_size,
            sender,
            overflowed.clone(),
        )));

        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
        let stream = match format {
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let overflowed = overflowed.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            overflowed.store(true, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let overflowed = overflowed.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, f32_to_i16);
                        } else {
                            overflowed.store(true, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let overflowed = overflowed.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, u16_to_i16);
                        } else {
                            overflowed.store(true, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play().context("failed to start capture stream")?;

        let chunk_duration =
            Duration::from_secs_f64(chunk_size as f64 / f64::from(sample_rate.max(1)));
        Ok(CpalChunkSource {
            queue: ChunkQueue::new(receiver, overflowed),
            _stream: stream,
            read_timeout: chunk_duration.saturating_mul(4).max(Duration::from_millis(50)),
            sample_rate,
        })
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32_767.0).clamp(-32_768.0, 32_767.0) as i16
}

fn u16_to_i16(sample: u16) -> i16 {
    (i32::from(sample) - 32_768) as i16
}

/// The session-wide capture stream. Only the recognition worker reads it.
pub struct CpalChunkSource {
    queue: ChunkQueue,
    _stream: cpal::Stream,
    read_timeout: Duration,
    sample_rate: u32,
}

impl ChunkSource for CpalChunkSource {
    fn read_chunk(&mut self) -> Result<AudioChunk> {
        self.queue.read(self.read_timeout)
    }

    fn discard_buffered(&mut self) {
        self.queue.discard();
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
