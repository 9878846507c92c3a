use super::schemas::Config;
/// Configuration utilities - loading, saving, and access helpers
///
/// The global CONFIG is only used by the binary and the job loops; the core
/// components (store, lifecycle manager) receive their sections explicitly.
use crate::errors::{ TrackerError, TrackerResult };
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::path::Path;

/// Global configuration instance
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/config.toml";

/// Load configuration from a specific file path
///
/// A missing file is not an error: defaults from the schema definitions are used.
pub fn load_config_from_path(path: &str) -> TrackerResult<()> {
    let config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path).map_err(|e|
            TrackerError::Config(format!("Failed to read config file '{}': {}", path, e))
        )?;

        parse_config(&contents).map_err(|e|
            TrackerError::Config(format!("Failed to parse config file '{}': {}", path, e))
        )?
    } else {
        eprintln!("⚠️  Config file '{}' not found, using default values", path);
        Config::default()
    };

    CONFIG.set(RwLock::new(config)).map_err(|_|
        TrackerError::Config("Config already initialized".to_string())
    )?;

    Ok(())
}

/// Parse a TOML document into a Config, filling omitted keys with defaults
pub fn parse_config(contents: &str) -> TrackerResult<Config> {
    toml::from_str::<Config>(contents).map_err(|e| TrackerError::Config(e.to_string()))
}

/// Execute a function with read access to the configuration
///
/// Before `load_config_from_path()` runs, the closure sees the default configuration.
///
/// # Example
/// ```
/// use stagetracker::config::with_config;
///
/// let pool_size = with_config(|cfg| cfg.database.pool_size);
/// assert!(pool_size > 0);
/// ```
pub fn with_config<F, R>(f: F) -> R where F: FnOnce(&Config) -> R {
    match CONFIG.get() {
        Some(config_lock) => f(&config_lock.read()),
        None => f(&Config::default()),
    }
}

/// Get a clone of the entire configuration
///
/// Useful when config values must be held across await points.
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

/// Save the current configuration to disk
pub fn save_config(path: Option<&str>) -> TrackerResult<()> {
    let path = path.unwrap_or(CONFIG_FILE_PATH);

    let config_str = with_config(|cfg| {
        toml::to_string_pretty(cfg).map_err(|e|
            TrackerError::Config(format!("Failed to serialize config: {}", e))
        )
    })?;

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e|
                TrackerError::Config(format!("Failed to create config directory: {}", e))
            )?;
        }
    }

    std::fs::write(path, config_str).map_err(|e|
        TrackerError::Config(format!("Failed to write config file '{}': {}", path, e))
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClosePolicy;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.pool_size, 4);
        assert_eq!(config.lifecycle.lost_race_retries, 1);
        assert_eq!(config.lifecycle.close_policy, ClosePolicy::AnyOtherStage);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[lifecycle]"));
        assert!(toml_str.contains("close_policy = \"any_other_stage\""));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = parse_config(
            r#"
            [lifecycle]
            close_policy = "topping_only"

            [database]
            path = "/tmp/positions.db"
            "#
        ).unwrap();

        assert_eq!(config.lifecycle.close_policy, ClosePolicy::ToppingOnly);
        assert_eq!(config.lifecycle.lost_race_retries, 1);
        assert_eq!(config.database.path, "/tmp/positions.db");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.jobs.concurrency, 4);
    }

    #[test]
    fn test_unknown_close_policy_rejected() {
        let result = parse_config("[lifecycle]\nclose_policy = \"never\"\n");
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database\npath = ").unwrap();

        let error = load_config_from_path(&path.to_string_lossy()).unwrap_err();
        assert!(matches!(error, TrackerError::Config(ref detail) if detail.contains("Failed to parse")));
        assert!(error.is_critical());
    }
}
