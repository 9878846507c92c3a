/// Configuration system for the stage tracker
///
/// - `macros` - the `config_struct!` definition macro
/// - `schemas` - all configuration sections with their defaults
/// - `utils` - loading, saving and access helpers
pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::{ ClosePolicy, Config, DatabaseConfig, JobsConfig, LifecycleConfig, LoggingConfig };
pub use utils::{
    get_config_clone,
    load_config_from_path,
    parse_config,
    save_config,
    with_config,
    CONFIG_FILE_PATH,
};
