//! Ambient-noise calibration.
//!
//! A short sample of room noise at startup picks the silence threshold, so
//! the endpointer works in a quiet bedroom and a noisy classroom alike.

use crate::audio::source::InputDevice;
use crate::log_debug;
use anyhow::Result;
use std::time::Duration;

/// Floor for the silence threshold. Below this the endpointer would trigger
/// on electrical noise from cheap microphones.
pub const MIN_SILENCE_THRESHOLD: f64 = 200.0;

/// Headroom multiplier over the measured ambient level.
const AMBIENT_MARGIN: f64 = 1.5;

/// Map an ambient noise level to a silence threshold: half again the
/// ambient level, rounded up to the next hundred, never below the floor.
pub fn threshold_from_ambient(ambient_level: f64) -> f64 {
    let scaled = if ambient_level.is_finite() && ambient_level > 0.0 {
        (ambient_level * AMBIENT_MARGIN / 100.0).ceil() * 100.0
    } else {
        0.0
    };
    scaled.max(MIN_SILENCE_THRESHOLD)
}

/// Mean absolute amplitude of the ambient sample, the measure the silence
/// threshold is derived from.
pub fn mean_abs_amplitude(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples
        .iter()
        .map(|&s| f64::from(s).abs())
        .sum::<f64>()
        / samples.len() as f64
}

/// Record `duration` of room noise and derive the silence threshold from it.
pub fn calibrate_threshold(device: &InputDevice, duration: Duration) -> Result<f64> {
    let samples = device.record_for(duration)?;
    let ambient = mean_abs_amplitude(&samples);
    let threshold = threshold_from_ambient(ambient);
    log_debug(&format!(
        "calibration: ambient_level={ambient:.1} threshold={threshold:.0}"
    ));
    Ok(threshold)
}
