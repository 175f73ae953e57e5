//! Prompt speech synthesis.
//!
//! Prompts are short and repeat across sessions, so synthesized clips are
//! cached on disk keyed by text and language. A cache hit costs one file
//! read; only new prompts hit the network.

use crate::status::RecognizeError;
use crate::{log_debug, log_debug_content};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Turns prompt text into an encoded audio clip.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, RecognizeError>;
}

/// Speech-synthesis endpoint client.
pub struct SpeechSynth {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
}

impl SpeechSynth {
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        voice: String,
        timeout: Duration,
    ) -> Result<Self, RecognizeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognizeError::Service(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
            voice,
        })
    }
}

impl Synthesizer for SpeechSynth {
    fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, RecognizeError> {
        #[derive(serde::Serialize)]
        struct SynthRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            language: &'a str,
        }

        log_debug_content(&format!("tts_request: lang={language} text={text}"));
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SynthRequest {
                model: &self.model,
                input: text,
                voice: &self.voice,
                language,
            })
            .send()
            .map_err(|e| RecognizeError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RecognizeError::Service(format!(
                "synthesis API error {status}: {body}"
            )));
        }

        let audio = response
            .bytes()
            .map_err(|e| RecognizeError::Service(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

/// Disk cache in front of a [`Synthesizer`].
pub struct PromptCache {
    dir: PathBuf,
}

impl PromptCache {
    /// Cache clips under `dir`, creating it if needed.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating prompt cache dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn clip_path(&self, text: &str, language: &str) -> PathBuf {
        self.dir.join(format!("{}.{language}.mp3", cache_key(text)))
    }

    /// Return the cached clip for `text`, synthesizing and storing it on a
    /// miss. A failed cache write is logged and ignored; the clip still
    /// plays this session.
    pub fn fetch(
        &self,
        synth: &dyn Synthesizer,
        text: &str,
        language: &str,
    ) -> Result<Vec<u8>, RecognizeError> {
        let path = self.clip_path(text, language);
        if let Ok(bytes) = fs::read(&path) {
            if !bytes.is_empty() {
                return Ok(bytes);
            }
        }

        let bytes = synth.synthesize(text, language)?;
        if let Err(err) = fs::write(&path, &bytes) {
            log_debug(&format!(
                "prompt_cache_write_failed: {} ({err})",
                path.display()
            ));
        }
        Ok(bytes)
    }
}

/// Filesystem-safe key for a prompt: lowercase alphanumerics, everything
/// else folded to single underscores.
fn cache_key(text: &str) -> String {
    let mut key = String::with_capacity(text.len());
    let mut last_was_sep = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            key.extend(ch.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            key.push('_');
            last_was_sep = true;
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    if key.is_empty() {
        key.push_str("prompt");
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSynth {
        calls: AtomicUsize,
    }

    impl Synthesizer for CountingSynth {
        fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>, RecognizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.as_bytes().to_vec())
        }
    }

    #[test]
    fn cache_key_is_filesystem_safe() {
        assert_eq!(cache_key("Say: apple!"), "say_apple");
        assert_eq!(cache_key("I like mangoes"), "i_like_mangoes");
        assert_eq!(cache_key("¿Cómo estás?"), "cómo_estás");
        assert_eq!(cache_key("???"), "prompt");
    }

    #[test]
    fn fetch_synthesizes_once_then_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PromptCache::new(dir.path().to_path_buf()).unwrap();
        let synth = CountingSynth {
            calls: AtomicUsize::new(0),
        };

        let first = cache.fetch(&synth, "apple", "en").unwrap();
        let second = cache.fetch(&synth, "apple", "en").unwrap();
        assert_eq!(first, second);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);

        cache.fetch(&synth, "apple", "es").unwrap();
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    }
}
