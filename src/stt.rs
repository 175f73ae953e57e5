//! Cloud speech-to-text.
//!
//! Captured PCM goes up as a WAV attachment; the transcript comes back and
//! is scrubbed of non-speech markers before anyone scores it.

use crate::status::RecognizeError;
use crate::{log_debug, log_debug_content};
use regex::Regex;
use std::io::Cursor;
use std::sync::OnceLock;
use std::time::Duration;

/// Recognition backend. The game only needs this one call; tests supply a
/// scripted implementation and the session wires in the cloud client.
pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        samples: &[i16],
        sample_rate: u32,
        language: &str,
    ) -> Result<String, RecognizeError>;
}

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style transcription endpoint client.
pub struct CloudTranscriber {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CloudTranscriber {
    /// `timeout` bounds the whole request, connect included; a dead network
    /// fails the attempt instead of hanging the worker.
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
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
        })
    }
}

impl Transcriber for CloudTranscriber {
    fn transcribe(
        &self,
        samples: &[i16],
        sample_rate: u32,
        language: &str,
    ) -> Result<String, RecognizeError> {
        let wav = pcm_to_wav(samples, sample_rate)
            .map_err(|e| RecognizeError::Service(format!("wav encode failed: {e}")))?;
        log_debug(&format!(
            "stt_request: bytes={} rate={sample_rate} lang={language}",
            wav.len()
        ));

        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| RecognizeError::Service(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", language.to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| RecognizeError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            log_debug(&format!("stt_http_error: status={status}"));
            return Err(RecognizeError::Service(format!(
                "transcription API error {status}: {body}"
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .map_err(|e| RecognizeError::Service(format!("malformed response: {e}")))?;

        let transcript = sanitize_transcript(&parsed.text);
        if transcript.is_empty() {
            return Err(RecognizeError::Unrecognized);
        }
        log_debug_content(&format!("stt_transcript: {transcript}"));
        Ok(transcript)
    }
}

/// Wrap mono 16-bit PCM in a WAV container, in memory.
pub fn pcm_to_wav(samples: &[i16], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Strip non-speech markers like `[silence]` or `(laughter)` that some
/// recognizers emit, then collapse whitespace. An all-marker transcript
/// sanitizes to the empty string.
pub fn sanitize_transcript(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    static NON_SPEECH_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_SPEECH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background|wind blowing)\s*)\)",
        )
        .expect("non-speech regex should compile")
    });
    let without_markers = re.replace_all(trimmed, " ");
    without_markers
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
