//! Shared recognition state between the game loop and the worker.
//!
//! One mutex-guarded cell holds the whole protocol: the game requests a
//! listen, the worker claims it, and results flow back through the same
//! cell. A condvar wakes the worker when a request lands, so nobody spins.
//!
//! Cancellation is retroactive: if the game resets the cell to `Ready`
//! while the worker is mid-attempt, the worker's eventual publish finds the
//! status no longer `Listening` and drops the result on the floor.

use crate::log_debug;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A panicked holder can only have left the cell mid-protocol; the snapshot
/// itself is always valid, so recover the guard and keep going.
fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_debug(&format!("Mutex poisoned in {context}; recovering"));
            poisoned.into_inner()
        }
    }
}

/// Where a recognition attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerStatus {
    /// Idle; no attempt requested.
    Ready,
    /// The game asked for an attempt; the worker hasn't claimed it yet.
    Listen,
    /// The worker is recording and recognizing.
    Listening,
    /// A transcript is waiting to be consumed.
    Complete,
    /// The attempt failed; the error is waiting to be consumed.
    Error,
}

/// Why a recognition attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizeError {
    /// The player never started speaking within the timeout window.
    NoSpeechTimeout,
    /// Audio was captured but the service produced no usable transcript.
    Unrecognized,
    /// The speech service itself failed (network, HTTP, malformed body).
    Service(String),
}

impl fmt::Display for RecognizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeechTimeout => write!(f, "no speech detected"),
            Self::Unrecognized => write!(f, "speech was not recognized"),
            Self::Service(detail) => write!(f, "speech service error: {detail}"),
        }
    }
}

impl std::error::Error for RecognizeError {}

/// What the game loop receives when an attempt finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Recognized {
        text: String,
        /// The captured audio, kept so the game can replay what it heard.
        audio: Option<Arc<Vec<i16>>>,
    },
    Failed(RecognizeError),
}

impl Default for RecognizerStatus {
    fn default() -> Self {
        Self::Ready
    }
}

#[derive(Default)]
struct Shared {
    status: RecognizerStatus,
    text: Option<String>,
    error: Option<RecognizeError>,
    audio: Option<Arc<Vec<i16>>>,
}

/// The shared cell. One instance per session, wrapped in an `Arc`.
#[derive(Default)]
pub struct StatusCell {
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status, for display.
    pub fn status(&self) -> RecognizerStatus {
        lock_or_recover(&self.shared, "status.status").status
    }

    /// Ask the worker to start an attempt. Returns false if one is already
    /// in flight or a result is still unconsumed.
    pub fn request_listen(&self) -> bool {
        let mut shared = lock_or_recover(&self.shared, "status.request_listen");
        if shared.status != RecognizerStatus::Ready {
            return false;
        }
        shared.status = RecognizerStatus::Listen;
        self.changed.notify_all();
        true
    }

    /// Abandon whatever is in flight. Any result the worker publishes after
    /// this is discarded.
    pub fn cancel(&self) {
        let mut shared = lock_or_recover(&self.shared, "status.cancel");
        shared.status = RecognizerStatus::Ready;
        shared.text = None;
        shared.error = None;
        shared.audio = None;
        self.changed.notify_all();
    }

    /// Consume a finished attempt, resetting the cell to `Ready`. Returns
    /// `None` while the attempt is still pending or in flight.
    pub fn take_outcome(&self) -> Option<Outcome> {
        let mut shared = lock_or_recover(&self.shared, "status.take_outcome");
        match shared.status {
            RecognizerStatus::Complete => {
                shared.status = RecognizerStatus::Ready;
                let text = shared.text.take().unwrap_or_default();
                let audio = shared.audio.take();
                shared.error = None;
                self.changed.notify_all();
                Some(Outcome::Recognized { text, audio })
            }
            RecognizerStatus::Error => {
                shared.status = RecognizerStatus::Ready;
                let error = shared.error.take().unwrap_or(RecognizeError::Unrecognized);
                shared.text = None;
                shared.audio = None;
                self.changed.notify_all();
                Some(Outcome::Failed(error))
            }
            _ => None,
        }
    }

    /// Worker side: block until a listen request arrives or `timeout`
    /// passes. Claims the request by moving the cell to `Listening`.
    pub fn await_listen(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut shared = lock_or_recover(&self.shared, "status.await_listen");
        loop {
            if shared.status == RecognizerStatus::Listen {
                shared.status = RecognizerStatus::Listening;
                self.changed.notify_all();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(shared, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            shared = guard;
        }
    }

    /// Worker side: true while the attempt it claimed is still wanted.
    pub fn is_listening(&self) -> bool {
        lock_or_recover(&self.shared, "status.is_listening").status == RecognizerStatus::Listening
    }

    /// Worker side: publish a transcript. Discarded if the attempt was
    /// cancelled in the meantime.
    pub fn publish_complete(&self, text: String, audio: Option<Arc<Vec<i16>>>) {
        let mut shared = lock_or_recover(&self.shared, "status.publish_complete");
        if shared.status == RecognizerStatus::Listening {
            shared.status = RecognizerStatus::Complete;
            shared.text = Some(text);
            shared.error = None;
            shared.audio = audio;
            self.changed.notify_all();
        } else {
            shared.text = None;
            shared.error = None;
            shared.audio = None;
        }
    }

    /// Worker side: publish a failure. Discarded if cancelled.
    pub fn publish_error(&self, error: RecognizeError) {
        let mut shared = lock_or_recover(&self.shared, "status.publish_error");
        if shared.status == RecognizerStatus::Listening {
            shared.status = RecognizerStatus::Error;
            shared.error = Some(error);
            shared.text = None;
            shared.audio = None;
            self.changed.notify_all();
        } else {
            shared.text = None;
            shared.error = None;
            shared.audio = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_request_claims_once() {
        let cell = StatusCell::new();
        assert!(cell.request_listen());
        assert!(!cell.request_listen());
        assert!(cell.await_listen(Duration::from_millis(10)));
        assert_eq!(cell.status(), RecognizerStatus::Listening);
    }

    #[test]
    fn await_listen_times_out_when_idle() {
        let cell = StatusCell::new();
        assert!(!cell.await_listen(Duration::from_millis(10)));
        assert_eq!(cell.status(), RecognizerStatus::Ready);
    }

    #[test]
    fn complete_round_trip() {
        let cell = StatusCell::new();
        cell.request_listen();
        cell.await_listen(Duration::from_millis(10));
        cell.publish_complete("apple".to_string(), None);
        match cell.take_outcome() {
            Some(Outcome::Recognized { text, .. }) => assert_eq!(text, "apple"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(cell.status(), RecognizerStatus::Ready);
    }

    #[test]
    fn cancel_swallows_late_publish() {
        let cell = StatusCell::new();
        cell.request_listen();
        cell.await_listen(Duration::from_millis(10));
        cell.cancel();
        cell.publish_complete("stale".to_string(), None);
        assert_eq!(cell.status(), RecognizerStatus::Ready);
        assert!(cell.take_outcome().is_none());
    }

    #[test]
    fn cancel_swallows_late_error() {
        let cell = StatusCell::new();
        cell.request_listen();
        cell.await_listen(Duration::from_millis(10));
        cell.cancel();
        cell.publish_error(RecognizeError::Unrecognized);
        assert!(cell.take_outcome().is_none());
    }

    #[test]
    fn error_outcome_carries_variant() {
        let cell = StatusCell::new();
        cell.request_listen();
        cell.await_listen(Duration::from_millis(10));
        cell.publish_error(RecognizeError::NoSpeechTimeout);
        assert_eq!(
            cell.take_outcome(),
            Some(Outcome::Failed(RecognizeError::NoSpeechTimeout))
        );
    }

    #[test]
    fn await_listen_wakes_from_another_thread() {
        let cell = Arc::new(StatusCell::new());
        let waiter = {
            let cell = cell.clone();
            std::thread::spawn(move || cell.await_listen(Duration::from_secs(2)))
        };
        std::thread::sleep(Duration::from_millis(30));
        assert!(cell.request_listen());
        assert!(waiter.join().unwrap());
        assert_eq!(cell.status(), RecognizerStatus::Listening);
    }
}
