//! Configuration module.
//!
//! Settings resolve through a fixed chain: built-in defaults, then the TOML
//! config file, then `ASV_*` environment variables, then command-line flags.

/// Config file loading and precedence.
pub mod loader;

pub use loader::{
    apply_cli_overrides, apply_env_overrides, default_config_path, default_log_path,
    load_config_file, load_config_with_precedence, merge_config, resolve, CliOverrides,
    CliSection, ConfigError, ConfigFile, ResolvedConfig,
};
