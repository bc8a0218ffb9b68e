//! Configuration module.
//!
//! Settings resolve in four layers, later ones winning: built-in defaults,
//! the TOML config file, environment variables, command line flags.

pub mod loader;

pub use loader::{
    apply_cli_overrides, apply_env_overrides, default_config_path, default_log_path,
    load_config_file, load_config_with_precedence, merge_config, ConfigError, ConfigFile,
    ResolvedConfig, ENV_ASSEMBLE_THREADS, ENV_CONFIG, ENV_MAX_TIMELINE_SIZE,
};
