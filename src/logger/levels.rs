//! Severity of a tracker log line
//!
//! Lifecycle writes and ordinary no-op decisions are Info, bad signal input is
//! Warning, and history that needs manual repair is Error. A line prints when
//! its level is at or below the configured `[logging] level`.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Verbose,
}

impl LogLevel {
    /// Names accepted by `[logging] level`
    pub const NAMES: [&'static str; 5] = ["error", "warning", "info", "debug", "verbose"];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Verbose => "VERBOSE",
        }
    }

    /// Printed whatever the threshold
    pub fn is_unconditional(&self) -> bool {
        *self == LogLevel::Error
    }

    /// Debug lines additionally need the tag's debug switch (`--debug-<tag>`)
    pub fn needs_tag_switch(&self) -> bool {
        *self == LogLevel::Debug
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "verbose" | "trace" => Ok(LogLevel::Verbose),
            other =>
                Err(
                    format!(
                        "Unknown log level {:?}, expected one of: {}",
                        other,
                        Self::NAMES.join(", ")
                    )
                ),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Verbose);
    }

    #[test]
    fn test_config_names_round_trip() {
        for name in LogLevel::NAMES {
            let level: LogLevel = name.parse().unwrap();
            assert_eq!(level.as_str().to_lowercase(), name);
        }
        assert_eq!(" Warn ".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("trace".parse::<LogLevel>(), Ok(LogLevel::Verbose));
    }

    #[test]
    fn test_unknown_level_lists_accepted_names() {
        let error = "loud".parse::<LogLevel>().unwrap_err();
        assert!(error.contains("\"loud\""));
        assert!(error.contains("error, warning, info, debug, verbose"));
    }

    #[test]
    fn test_gating() {
        assert!(LogLevel::Error.is_unconditional());
        assert!(!LogLevel::Warning.is_unconditional());
        assert!(LogLevel::Debug.needs_tag_switch());
        assert!(!LogLevel::Verbose.needs_tag_switch());
    }
}
