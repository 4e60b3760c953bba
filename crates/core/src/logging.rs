//! Category-filtered logging for the console runtime.
//!
//! # Architecture
//!
//! - **LogConfig**: process-wide configuration held in atomics
//! - **LogLevel**: Off < Error < Warn < Info < Debug < Trace
//! - **LogCategory**: Runtime, Guest, Framebuffer, Audio, Flash
//! - **log()**: lazy, rate-limited output to stderr or a log file
//!
//! File output is handed to a background writer thread over a channel, so a
//! guest that floods `trace` never stalls the tick loop on disk I/O. Each
//! category is limited to a fixed number of messages per sliding one-second
//! window; excess messages are dropped and summarized.
//!
//! # Usage
//!
//! ```rust
//! use badge_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Flash, LogLevel::Debug, || {
//!     format!("wrote flash page {}", 12)
//! });
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Default per-category rate limit.
pub const DEFAULT_RATE_LIMIT: usize = 60;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the runtime's components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Cart loading, lifecycle and faults
    Runtime,
    /// Output of the guest's `trace` capability
    Guest,
    /// Rasterizer and compositor hand-off
    Framebuffer,
    /// Tone synthesis and the sample bridge
    Audio,
    /// Flash reads and page writes
    Flash,
}

const CATEGORY_COUNT: usize = 5;

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::Runtime,
        LogCategory::Guest,
        LogCategory::Framebuffer,
        LogCategory::Audio,
        LogCategory::Flash,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::Runtime => 0,
            LogCategory::Guest => 1,
            LogCategory::Framebuffer => 2,
            LogCategory::Audio => 3,
            LogCategory::Flash => 4,
        }
    }

    /// Parse a category name (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "runtime" => Some(LogCategory::Runtime),
            "guest" | "trace" => Some(LogCategory::Guest),
            "framebuffer" | "fb" => Some(LogCategory::Framebuffer),
            "audio" => Some(LogCategory::Audio),
            "flash" => Some(LogCategory::Flash),
            _ => None,
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogCategory::Runtime => "runtime",
            LogCategory::Guest => "guest",
            LogCategory::Framebuffer => "framebuffer",
            LogCategory::Audio => "audio",
            LogCategory::Flash => "flash",
        };
        f.write_str(name)
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Window {
    timestamps: VecDeque<Instant>,
    dropped: usize,
    last_drop_report: Option<Instant>,
}

/// Sliding-window limiter, one window per category.
struct RateLimiter {
    max_per_second: AtomicUsize,
    window_duration: Duration,
    windows: Mutex<[Window; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            window_duration: Duration::from_secs(1),
            windows: Mutex::new(Default::default()),
        }
    }

    /// Returns whether the message may be written, plus a count of dropped
    /// messages to report, if one is due.
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let mut windows = lock(&self.windows);
        let window = &mut windows[category.index()];

        while let Some(&front) = window.timestamps.front() {
            if now.duration_since(front) > self.window_duration {
                window.timestamps.pop_front();
            } else {
                break;
            }
        }

        if window.timestamps.len() < self.max_per_second.load(Ordering::Relaxed) {
            window.timestamps.push_back(now);
            if window.dropped > 0 {
                window.last_drop_report = Some(now);
                return (true, Some(std::mem::take(&mut window.dropped)));
            }
            return (true, None);
        }

        window.dropped += 1;
        let report_due = window
            .last_drop_report
            .map_or(true, |last| now.duration_since(last) >= self.window_duration);
        if report_due {
            window.last_drop_report = Some(now);
            (false, Some(std::mem::take(&mut window.dropped)))
        } else {
            (false, None)
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    global_level: AtomicU8,
    levels: [AtomicU8; CATEGORY_COUNT],
    log_sender: Mutex<Option<Sender<String>>>,
    file_logging_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            levels: Default::default(),
            log_sender: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
        }
    }

    /// The process-wide instance.
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    /// Override the level for one category. `Off` falls back to the global level.
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category-specific level wins; otherwise the global level applies.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        match self.get_level(category) {
            LogLevel::Off => level <= self.get_global_level(),
            category_level => level <= category_level,
        }
    }

    /// Turn every level off.
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    pub fn set_rate_limit(&self, max_per_second: usize) {
        self.rate_limiter
            .max_per_second
            .store(max_per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.max_per_second.load(Ordering::Relaxed)
    }

    /// Append log output to `path` from a background writer thread.
    ///
    /// Replaces any previous log file; the old writer exits once its channel
    /// is dropped.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{message}");
                    let _ = file.flush();
                }
            })?;

        *lock(&self.log_sender) = Some(sender);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop writing to the log file and go back to stderr.
    pub fn clear_log_file(&self) {
        *lock(&self.log_sender) = None;
        self.file_logging_enabled.store(false, Ordering::Relaxed);
    }

    fn write_message(&self, message: String) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            if let Some(sender) = lock(&self.log_sender).as_ref() {
                if let Err(failed) = sender.send(message) {
                    eprintln!("{}", failed.0);
                }
                return;
            }
        }
        eprintln!("{message}");
    }
}

/// Log a lazily formatted message.
///
/// `message_fn` only runs when `category` is enabled at `level` and the
/// category is under its rate limit.
///
/// ```rust
/// use badge_core::logging::{log, LogCategory, LogLevel};
///
/// log(LogCategory::Runtime, LogLevel::Warn, || "cart is large".to_string());
/// ```
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped) = config.rate_limiter.should_allow(category);
    if let Some(count) = dropped.filter(|&n| n > 0) {
        config.write_message(format!(
            "[{category}] rate limit exceeded, {count} message(s) dropped in the last second"
        ));
    }
    if allowed {
        config.write_message(format!("[{category}] {}", message_fn()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("OFF"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("err"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("Warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("3"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("loud"), None);
    }

    #[test]
    fn test_category_parsing_and_display() {
        for category in LogCategory::ALL {
            assert_eq!(LogCategory::from_str(&category.to_string()), Some(category));
        }
        assert_eq!(LogCategory::from_str("TRACE"), Some(LogCategory::Guest));
        assert_eq!(LogCategory::from_str("cpu"), None);
    }

    #[test]
    fn test_category_level_overrides_global() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Error);
        config.set_level(LogCategory::Guest, LogLevel::Debug);

        assert!(config.should_log(LogCategory::Guest, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Guest, LogLevel::Trace));
        assert!(config.should_log(LogCategory::Audio, LogLevel::Error));
        assert!(!config.should_log(LogCategory::Audio, LogLevel::Warn));
    }

    #[test]
    fn test_off_is_never_logged() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Trace);
        assert!(!config.should_log(LogCategory::Runtime, LogLevel::Off));
    }

    #[test]
    fn test_reset() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Trace);
        config.set_level(LogCategory::Flash, LogLevel::Info);
        config.reset();
        assert_eq!(config.get_global_level(), LogLevel::Off);
        assert_eq!(config.get_level(LogCategory::Flash), LogLevel::Off);
    }

    #[test]
    fn test_rate_limit_is_per_category() {
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            assert!(limiter.should_allow(LogCategory::Guest).0);
        }
        assert!(!limiter.should_allow(LogCategory::Guest).0);
        assert!(limiter.should_allow(LogCategory::Runtime).0);
    }

    #[test]
    fn test_first_drop_is_reported_immediately() {
        let limiter = RateLimiter::new(2);
        limiter.should_allow(LogCategory::Guest);
        limiter.should_allow(LogCategory::Guest);
        assert_eq!(limiter.should_allow(LogCategory::Guest), (false, Some(1)));
        // Further drops in the same second are held back.
        assert_eq!(limiter.should_allow(LogCategory::Guest), (false, None));
    }

    #[test]
    fn test_window_slides_and_reports_drops() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            limiter.should_allow(LogCategory::Audio);
        }
        for _ in 0..10 {
            limiter.should_allow(LogCategory::Audio);
        }

        std::thread::sleep(Duration::from_millis(1100));

        let (allowed, dropped) = limiter.should_allow(LogCategory::Audio);
        assert!(allowed);
        // The first drop was reported on the spot.
        assert_eq!(dropped, Some(9));
    }

    #[test]
    fn test_rate_limit_setting() {
        let config = LogConfig::new();
        assert_eq!(config.get_rate_limit(), DEFAULT_RATE_LIMIT);
        config.set_rate_limit(5);
        assert_eq!(config.get_rate_limit(), 5);
    }
}
