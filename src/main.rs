//! Console entrypoint: prompt a word, listen, score, repeat.
//!
//! The game loop never blocks on audio or the network. It requests an
//! attempt through the status cell, polls for the outcome, and leaves
//! capture and recognition to the worker thread.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use talkalong::audio::{calibrate_threshold, InputDevice};
use talkalong::config::{load_prompt_book, AppConfig, PromptOrder, PromptSet};
use talkalong::playback::{Playback, SilentPlayback, SpeakerOutput};
use talkalong::scoring::{has_common_word, is_match};
use talkalong::status::{Outcome, RecognizeError, StatusCell};
use talkalong::stt::{pcm_to_wav, CloudTranscriber};
use talkalong::tts::{PromptCache, SpeechSynth, Synthesizer};
use talkalong::worker::spawn_recognizer;
use talkalong::{init_logging, log_debug, log_file_path};

/// How often the game loop checks the status cell for a result.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Attempts per prompt before moving on so a struggling player isn't stuck.
const MAX_ATTEMPTS_PER_PROMPT: u32 = 3;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    log_debug("=== talkalong started ===");
    log_debug(&format!("log file: {:?}", log_file_path()));

    if config.list_input_devices {
        for name in InputDevice::list_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let book = load_prompt_book(&config);
    let prompts = book.set_for(config.mode).clone();

    let device = InputDevice::new(config.input_device.as_deref())?;
    println!("Microphone: {}", device.device_name());

    let threshold = if config.silence_threshold > 0.0 {
        config.silence_threshold
    } else {
        println!("Calibrating... please stay quiet for a moment.");
        calibrate_threshold(&device, Duration::from_millis(config.calibration_ms))
            .context("ambient noise calibration failed")?
    };
    println!("Silence threshold: {threshold:.0}");

    let playback: Arc<dyn Playback> = if config.quiet {
        Arc::new(SilentPlayback)
    } else {
        match SpeakerOutput::new() {
            Ok(output) => Arc::new(output),
            Err(err) => {
                eprintln!("No speaker output ({err:#}); continuing without sound.");
                Arc::new(SilentPlayback)
            }
        }
    };

    let transcriber = Arc::new(CloudTranscriber::new(
        config.stt_endpoint.clone(),
        config.api_key.clone(),
        config.stt_model.clone(),
        config.http_timeout(),
    )?);

    let speaker = if config.quiet {
        None
    } else {
        let synth = SpeechSynth::new(
            config.tts_endpoint.clone(),
            config.api_key.clone(),
            config.tts_model.clone(),
            config.tts_voice.clone(),
            config.http_timeout(),
        )?;
        let cache = PromptCache::new(config.prompt_cache_dir())?;
        Some((synth, cache))
    };

    let status = Arc::new(StatusCell::new());
    let handle = spawn_recognizer(
        device,
        status.clone(),
        transcriber,
        playback.clone(),
        config.endpoint_config(threshold),
        config.language.clone(),
    )?;

    let sample_rate = handle.sample_rate();
    let completed = run_game(
        &config,
        &prompts,
        &status,
        playback.as_ref(),
        speaker.as_ref(),
        sample_rate,
    );
    status.cancel();
    handle.shutdown();

    if completed >= config.target_words {
        println!("\nWell done! You said all {completed} prompts.");
    } else {
        println!("\nNo prompts were available to play.");
    }
    Ok(())
}

/// Localized "please say" lead-in, matching the prompt languages the game
/// ships voices for.
fn please_say(language: &str) -> &'static str {
    match language {
        "es" => "Por favor, di:",
        "zh" | "zh-CN" => "请说：",
        _ => "Please say:",
    }
}

fn well_done(language: &str) -> &'static str {
    match language {
        "es" => "¡Muy bien!",
        "zh" | "zh-CN" => "很好！",
        _ => "Great job!",
    }
}

fn try_again(language: &str) -> &'static str {
    match language {
        "es" => "Inténtalo de nuevo.",
        "zh" | "zh-CN" => "再试一次。",
        _ => "Let's try again.",
    }
}

fn almost(language: &str) -> &'static str {
    match language {
        "es" => "¡Casi! Otra vez.",
        "zh" | "zh-CN" => "差一点！再来。",
        _ => "Almost! One more time.",
    }
}

/// Play prompts until the target count is reached. Returns how many the
/// player completed; zero when there was nothing to play.
fn run_game(
    config: &AppConfig,
    prompts: &PromptSet,
    status: &StatusCell,
    playback: &dyn Playback,
    speaker: Option<&(SpeechSynth, PromptCache)>,
    sample_rate: u32,
) -> usize {
    if prompts.items.is_empty() {
        eprintln!("The prompt list is empty; nothing to play.");
        return 0;
    }
    let mut order: Vec<usize> = (0..prompts.items.len()).collect();
    if prompts.order == PromptOrder::Random {
        order.shuffle(&mut rand::thread_rng());
    }

    let mut completed = 0usize;
    let mut position = 0usize;
    while completed < config.target_words {
        if position >= order.len() {
            position = 0;
            if prompts.order == PromptOrder::Random {
                order.shuffle(&mut rand::thread_rng());
            }
        }
        let prompt = &prompts.items[order[position]];
        position += 1;

        if play_round(config, prompt, status, playback, speaker, sample_rate) {
            completed += 1;
            println!("Progress: {completed}/{}", config.target_words);
        }
    }
    completed
}

/// One prompt, up to [`MAX_ATTEMPTS_PER_PROMPT`] tries. Returns true if the
/// player got it.
fn play_round(
    config: &AppConfig,
    prompt: &str,
    status: &StatusCell,
    playback: &dyn Playback,
    speaker: Option<&(SpeechSynth, PromptCache)>,
    sample_rate: u32,
) -> bool {
    println!("\n{} {prompt}", please_say(&config.language));
    speak_prompt(config, prompt, playback, speaker);

    for attempt in 1..=MAX_ATTEMPTS_PER_PROMPT {
        if !status.request_listen() {
            // A stale result is still in the cell; clear it and retry.
            status.cancel();
            status.request_listen();
        }
        print!("Listening... ");
        let _ = std::io::stdout().flush();

        let outcome = loop {
            if let Some(outcome) = status.take_outcome() {
                break outcome;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        match outcome {
            Outcome::Recognized { text, audio } => {
                if is_match(prompt, &text) {
                    println!("heard \"{text}\" — {}", well_done(&config.language));
                    speak_line(config, well_done(&config.language), playback, speaker);
                    if let Some(audio) = audio {
                        replay_capture(&audio, sample_rate, playback);
                    }
                    return true;
                }
                // A shared non-stop word counts as a near miss.
                let line = if has_common_word(prompt, &text, None) {
                    almost(&config.language)
                } else {
                    try_again(&config.language)
                };
                println!("heard \"{text}\" — {line}");
                speak_line(config, line, playback, speaker);
            }
            Outcome::Failed(RecognizeError::NoSpeechTimeout) => {
                println!("I didn't hear anything.");
            }
            Outcome::Failed(RecognizeError::Unrecognized) => {
                println!("I couldn't make that out.");
            }
            Outcome::Failed(RecognizeError::Service(detail)) => {
                eprintln!("speech service problem: {detail}");
            }
        }

        if attempt < MAX_ATTEMPTS_PER_PROMPT {
            speak_prompt(config, prompt, playback, speaker);
        }
    }
    println!("Moving on — we'll come back to that one.");
    false
}

/// Speak the prompt through the cache; any synthesis failure downgrades to
/// text-only for this round.
fn speak_prompt(
    config: &AppConfig,
    prompt: &str,
    playback: &dyn Playback,
    speaker: Option<&(SpeechSynth, PromptCache)>,
) {
    let line = format!("{} {prompt}", please_say(&config.language));
    speak_line(config, &line, playback, speaker);
}

fn speak_line(
    config: &AppConfig,
    line: &str,
    playback: &dyn Playback,
    speaker: Option<&(SpeechSynth, PromptCache)>,
) {
    let Some((synth, cache)) = speaker else {
        return;
    };
    match cache.fetch(synth as &dyn Synthesizer, line, &config.language) {
        Ok(clip) => playback.play_clip(clip),
        Err(err) => log_debug(&format!("speech_synthesis_failed: {err}")),
    }
}

/// Echo the captured audio back so the player hears themselves.
fn replay_capture(samples: &[i16], sample_rate: u32, playback: &dyn Playback) {
    match pcm_to_wav(samples, sample_rate) {
        Ok(wav) => playback.play_clip(wav),
        Err(err) => log_debug(&format!("replay_encode_failed: {err:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn test_config() -> AppConfig {
        AppConfig::parse_from(["talkalong", "--target-words", "1", "--quiet"])
    }

    #[test]
    fn empty_prompt_list_completes_nothing() {
        let config = test_config();
        let prompts = PromptSet {
            items: Vec::new(),
            order: PromptOrder::Sequential,
        };
        let status = StatusCell::new();
        let completed = run_game(&config, &prompts, &status, &SilentPlayback, None, 44_100);
        assert_eq!(completed, 0);
    }

    #[test]
    fn completed_rounds_are_counted() {
        let config = test_config();
        let prompts = PromptSet {
            items: vec!["apple".to_string()],
            order: PromptOrder::Sequential,
        };
        let status = Arc::new(StatusCell::new());
        let responder = {
            let status = status.clone();
            std::thread::spawn(move || {
                assert!(status.await_listen(Duration::from_secs(5)));
                status.publish_complete("apple".to_string(), None);
            })
        };
        let completed = run_game(&config, &prompts, &status, &SilentPlayback, None, 44_100);
        responder.join().unwrap();
        assert_eq!(completed, 1);
    }
}
