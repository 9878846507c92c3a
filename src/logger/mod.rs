//! Structured logging for the stage tracker
//!
//! This module provides a small, ergonomic logging API with:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-tag debug control (`debug_tags` in config, `--debug-<tag>` on the CLI)
//! - Dual output: colored console + optional file persistence
//!
//! ## Usage
//!
//! ```rust
//! use stagetracker::logger::{self, LogTag};
//!
//! logger::error(LogTag::Store, "Connection pool exhausted");
//! logger::warning(LogTag::Signals, "Classifier response had no crossover");
//! logger::info(LogTag::Positions, "Opened XYZ at 1.00");
//! logger::debug(LogTag::Positions, "Latest episode: none"); // Only if positions debug is on
//! logger::verbose(LogTag::Jobs, "Raw classifier text: ..."); // Only if verbose
//! ```

mod config;
mod core;
mod file;
mod format;
mod levels;
mod tags;

pub use config::LoggerConfig;
use config::set_logger_config;
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system
///
/// Call once at startup, before any logging occurs. Installs the filtering
/// configuration and opens the log file when one is configured.
pub fn init(config: LoggerConfig) {
    let file_path = config.file_path.clone();
    set_logger_config(config);

    if let Some(path) = file_path {
        if let Err(e) = file::init_file_logging(&path) {
            core::log_internal(LogTag::System, LogLevel::Warning, &e);
        }
    }
}

/// Log at a level chosen at runtime
pub fn log(tag: LogTag, level: LogLevel, message: &str) {
    core::log_internal(tag, level, message);
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level, only shown when debug is enabled for the tag
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (very detailed tracing)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Force flush all pending log writes
///
/// Call this during shutdown to ensure all logs are written to disk.
pub fn flush() {
    file::flush_file_logging();
}
