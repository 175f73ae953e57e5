//! Per-chunk signal features used for endpoint classification.
//!
//! Two cheap measures are enough to split a chunk three ways: RMS energy
//! separates silence from sound, and the zero-crossing rate separates voiced
//! speech (low ZCR) from broadband noise (high ZCR).

/// Features extracted from one capture chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkFeatures {
    /// Root-mean-square amplitude on the i16 sample scale. Never NaN.
    pub rms: f64,
    /// Mean sign-change rate over adjacent samples, halved. Range [0, 1].
    pub zcr: f64,
}

/// Compute both features for a mono chunk.
pub fn analyze(samples: &[i16]) -> ChunkFeatures {
    ChunkFeatures {
        rms: rms(samples),
        zcr: zero_crossing_rate(samples),
    }
}

/// RMS amplitude of a chunk.
///
/// A corrupt or all-zero chunk yields a non-positive (or NaN) mean square;
/// those cases return 0.0 so a bad read can never poison threshold
/// comparisons downstream.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square = samples
        .iter()
        .map(|&s| {
            let v = f64::from(s);
            v * v
        })
        .sum::<f64>()
        / samples.len() as f64;
    if !mean_square.is_finite() || mean_square <= 0.0 {
        return 0.0;
    }
    mean_square.sqrt()
}

/// Zero-crossing rate of a mono chunk.
///
/// `mean(|sign(x[i]) - sign(x[i-1])|) / 2` over consecutive samples. A full
/// sign flip contributes 2 before halving, so a chunk alternating +A/-A every
/// sample scores exactly 1.0 and any constant chunk scores 0.0.
pub fn zero_crossing_rate(samples: &[i16]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let total: f64 = samples
        .windows(2)
        .map(|pair| f64::from((i32::from(pair[1].signum()) - i32::from(pair[0].signum())).abs()))
        .sum();
    total / (samples.len() - 1) as f64 / 2.0
}
