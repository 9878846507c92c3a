/// Core logging implementation with automatic filtering
///
/// Checks whether a message should be displayed for its level and tag,
/// then hands it to the format module.
use super::config::{ with_logger_config, LoggerConfig };
use super::levels::LogLevel;
use super::tags::LogTag;

/// Check if a log message should be displayed
///
/// Filtering rules:
/// 1. Errors are always shown
/// 2. Check against minimum log level threshold
/// 3. Debug level requires debug mode for that tag
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    if level.is_unconditional() {
        return true;
    }
    with_logger_config(|config| passes_filter(config, tag, level))
}

fn passes_filter(config: &LoggerConfig, tag: &LogTag, level: LogLevel) -> bool {
    if level > config.min_level {
        return false;
    }
    !level.needs_tag_switch() || config.debug_tags.contains(tag)
}

pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }

    super::format::format_and_log(tag, level, message);
}
