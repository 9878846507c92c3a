/// Log tags identifying the subsystem a message comes from
///
/// Debug output is enabled per tag through `LoggerConfig::debug_tags`
/// using the lowercase key returned by `to_debug_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    Positions,
    Signals,
    Store,
    Jobs,
    Config,
    System,
}

impl LogTag {
    /// Key used in `debug_tags` and `--debug-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::Positions => "positions",
            LogTag::Signals => "signals",
            LogTag::Store => "store",
            LogTag::Jobs => "jobs",
            LogTag::Config => "config",
            LogTag::System => "system",
        }
        .to_string()
    }

    /// Uncolored tag label for file output
    pub fn to_plain_string(&self) -> String {
        self.to_debug_key().to_uppercase()
    }

    pub fn from_debug_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "positions" => Some(LogTag::Positions),
            "signals" => Some(LogTag::Signals),
            "store" => Some(LogTag::Store),
            "jobs" => Some(LogTag::Jobs),
            "config" => Some(LogTag::Config),
            "system" => Some(LogTag::System),
            _ => None,
        }
    }
}
