use super::AppConfig;
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before anything touches the audio device or the
    /// network.
    pub fn validate(&self) -> Result<()> {
        if self.target_words == 0 {
            bail!("--target-words must be at least 1");
        }
        if !(2..=8).contains(&self.language.len())
            || !self.language.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
        {
            bail!(
                "--language must be a language code like 'en' or 'es', got '{}'",
                self.language
            );
        }
        if self.silence_threshold < 0.0 || !self.silence_threshold.is_finite() {
            bail!(
                "--silence-threshold must be a non-negative number, got {}",
                self.silence_threshold
            );
        }
        if !(500..=30_000).contains(&self.calibration_ms) {
            bail!(
                "--calibration-ms must be between 500 and 30000, got {}",
                self.calibration_ms
            );
        }
        if !(0.1..=10.0).contains(&self.silence_tail_s) {
            bail!(
                "--silence-tail-s must be between 0.1 and 10, got {}",
                self.silence_tail_s
            );
        }
        if !(0.5..=60.0).contains(&self.record_timeout_s) {
            bail!(
                "--record-timeout-s must be between 0.5 and 60, got {}",
                self.record_timeout_s
            );
        }
        if self.record_max_s < self.record_timeout_s || self.record_max_s > 120.0 {
            bail!(
                "--record-max-s must be between --record-timeout-s ({}) and 120, got {}",
                self.record_timeout_s,
                self.record_max_s
            );
        }
        if self.silence_tail_s > self.record_max_s {
            bail!(
                "--silence-tail-s ({}) cannot exceed --record-max-s ({})",
                self.silence_tail_s,
                self.record_max_s
            );
        }
        if !(1..=120).contains(&self.http_timeout_s) {
            bail!(
                "--http-timeout-s must be between 1 and 120, got {}",
                self.http_timeout_s
            );
        }
        Ok(())
    }
}
