//! File-based debug logging.
//!
//! The game plays audio prompts on the same console the player looks at, so
//! diagnostics go to a size-capped temp file instead of stdout. Transcript
//! content is gated behind its own flag since it quotes player speech.

use crate::config::AppConfig;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

const LEVEL_OFF: u8 = 0;
const LEVEL_DEBUG: u8 = 1;
const LEVEL_CONTENT: u8 = 2;

static LEVEL: AtomicU8 = AtomicU8::new(LEVEL_OFF);
static SINK: OnceLock<Mutex<Option<LogSink>>> = OnceLock::new();

/// Path of the session log in the system temp directory.
pub fn log_file_path() -> PathBuf {
    std::env::temp_dir().join("talkalong.log")
}

/// Append-only log file, truncated in place once it outgrows the cap. Only
/// recent lines matter when troubleshooting a session.
struct LogSink {
    file: File,
    path: PathBuf,
    size: u64,
}

impl LogSink {
    fn open(path: PathBuf) -> Option<Self> {
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        let mut sink = Self { file, path, size };
        if sink.size > MAX_LOG_BYTES {
            sink.start_over();
        }
        Some(sink)
    }

    fn start_over(&mut self) {
        if let Ok(file) = File::create(&self.path) {
            self.file = file;
            self.size = 0;
        }
    }

    fn append(&mut self, line: &str) {
        if self.size.saturating_add(line.len() as u64) > MAX_LOG_BYTES {
            self.start_over();
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.size = self.size.saturating_add(line.len() as u64);
        }
    }
}

fn sink() -> &'static Mutex<Option<LogSink>> {
    SINK.get_or_init(|| Mutex::new(None))
}

/// Configure logging from CLI flags and environment.
pub fn init_logging(config: &AppConfig) {
    let level = if !config.logs || config.no_logs {
        LEVEL_OFF
    } else if config.log_content {
        LEVEL_CONTENT
    } else {
        LEVEL_DEBUG
    };
    LEVEL.store(level, Ordering::Relaxed);

    let mut guard = sink().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = if level == LEVEL_OFF {
        None
    } else {
        LogSink::open(log_file_path())
    };
}

fn write_line(msg: &str) {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut guard = sink().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(sink) = guard.as_mut() {
        sink.append(&format!("[{stamp}] {msg}\n"));
    }
}

/// Session diagnostics. A no-op unless logging is enabled.
pub fn log_debug(msg: &str) {
    if LEVEL.load(Ordering::Relaxed) >= LEVEL_DEBUG {
        write_line(msg);
    }
}

/// Diagnostics that may quote player speech; gated separately.
pub fn log_debug_content(msg: &str) {
    if LEVEL.load(Ordering::Relaxed) >= LEVEL_CONTENT {
        write_line(msg);
    }
}
