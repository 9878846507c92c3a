/// Configuration schemas - all config structures defined once with defaults
///
/// Each struct is defined using the config_struct! macro which provides:
/// - Single-source definition (no repetition)
/// - Embedded defaults
/// - Serde support
use crate::config_struct;
use serde::{ Deserialize, Serialize };

// ============================================================================
// DATABASE CONFIGURATION
// ============================================================================

config_struct! {
    /// Tracked positions store
    pub struct DatabaseConfig {
        /// SQLite file holding the tracked_stocks table
        path: String = "data/tracked_stocks.db".to_string(),
        pool_size: u32 = 4,
        /// How long a writer waits on another process' write lock
        busy_timeout_ms: u64 = 5_000,
        connection_timeout_secs: u64 = 30,
    }
}

// ============================================================================
// LIFECYCLE CONFIGURATION
// ============================================================================

/// Which stages end a tracked episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    /// Stage 1, 3 or 4 while open closes the episode
    #[default]
    AnyOtherStage,
    /// Only stage 3 (topping) closes the episode
    ToppingOnly,
}

config_struct! {
    /// Position lifecycle decisions
    pub struct LifecycleConfig {
        close_policy: ClosePolicy = ClosePolicy::default(),
        /// Re-reads after losing a race before giving up
        lost_race_retries: u32 = 1,
    }
}

// ============================================================================
// JOBS CONFIGURATION
// ============================================================================

config_struct! {
    /// Scan and re-evaluation job loops
    pub struct JobsConfig {
        /// Tickers processed in parallel within one round
        concurrency: usize = 4,
        apply_timeout_secs: u64 = 30,
        /// Price history window handed to the classifier
        history_days: u32 = 60,
    }
}

// ============================================================================
// LOGGING CONFIGURATION
// ============================================================================

config_struct! {
    pub struct LoggingConfig {
        /// error | warning | info | debug | verbose
        level: String = "info".to_string(),
        /// Tags with debug output enabled (e.g. "positions", "store")
        debug_tags: Vec<String> = Vec::new(),
        file_path: Option<String> = None,
    }
}

// ============================================================================
// ROOT CONFIGURATION
// ============================================================================

config_struct! {
    pub struct Config {
        database: DatabaseConfig = DatabaseConfig::default(),
        lifecycle: LifecycleConfig = LifecycleConfig::default(),
        jobs: JobsConfig = JobsConfig::default(),
        logging: LoggingConfig = LoggingConfig::default(),
    }
}
