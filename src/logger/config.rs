/// Logger configuration: minimum level, per-tag debug switches, file target
use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    /// Tags allowed to emit Debug output
    pub debug_tags: HashSet<LogTag>,
    pub file_path: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            file_path: None,
        }
    }
}

impl LoggerConfig {
    /// Build from the `[logging]` section of the application config
    ///
    /// Naming a debug tag raises the threshold to Debug so the tag can print.
    pub fn from_settings(settings: &crate::config::LoggingConfig) -> Self {
        let mut config = Self::default();
        match settings.level.parse::<LogLevel>() {
            Ok(level) => {
                config.min_level = level;
            }
            // The logger is not running yet
            Err(e) => eprintln!("⚠️  {}, keeping {}", e, config.min_level),
        }
        config.debug_tags = settings
            .debug_tags
            .iter()
            .filter_map(|key| LogTag::from_debug_key(key))
            .collect();
        if !config.debug_tags.is_empty() && config.min_level < LogLevel::Debug {
            config.min_level = LogLevel::Debug;
        }
        config.file_path = settings.file_path.clone();
        config
    }

    pub fn with_debug_tag(mut self, tag: LogTag) -> Self {
        self.debug_tags.insert(tag);
        if self.min_level < LogLevel::Debug {
            self.min_level = LogLevel::Debug;
        }
        self
    }

    pub fn verbose(mut self) -> Self {
        self.min_level = LogLevel::Verbose;
        self
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> = Lazy::new(|| RwLock::new(LoggerConfig::default()));

/// Run `f` against the active configuration under the read lock
pub fn with_logger_config<F, R>(f: F) -> R where F: FnOnce(&LoggerConfig) -> R {
    f(&LOGGER_CONFIG.read())
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;

    #[test]
    fn test_from_settings_enables_debug_tags() {
        let settings = LoggingConfig {
            level: "warning".to_string(),
            debug_tags: vec!["positions".to_string(), "bogus".to_string()],
            file_path: None,
        };
        let config = LoggerConfig::from_settings(&settings);
        assert_eq!(config.min_level, LogLevel::Debug);
        assert!(config.debug_tags.contains(&LogTag::Positions));
        assert_eq!(config.debug_tags.len(), 1);
    }

    #[test]
    fn test_unknown_level_keeps_default() {
        let settings = LoggingConfig {
            level: "chatty".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(LoggerConfig::from_settings(&settings).min_level, LogLevel::Info);
    }
}
