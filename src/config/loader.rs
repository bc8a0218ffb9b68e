//! Configuration file loading with precedence handling.

use crate::feed::{FeedPolicy, FeedPreferences, DEFAULT_MAX_TIMELINE_SIZE};
use crate::model::Did;
use crate::pager::{
    PagerSettings, DEFAULT_ADD_PAGE_SIZE, DEFAULT_DELETE_SIZE, DEFAULT_GAP_FILL_PAGE_SIZE,
    DEFAULT_NEXT_PAGE_THRESHOLD, DEFAULT_PREPEND_PAGE_SIZE,
};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Environment variable naming the config file.
pub const ENV_CONFIG: &str = "SKYFEED_CONFIG";
/// Environment variable overriding `max_timeline_size`.
pub const ENV_MAX_TIMELINE_SIZE: &str = "SKYFEED_MAX_TIMELINE_SIZE";
/// Environment variable overriding `assemble_threads`.
pub const ENV_ASSEMBLE_THREADS: &str = "SKYFEED_ASSEMBLE_THREADS";

/// Errors that can occur during config loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to read config file (file may not exist or have permission issues).
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML syntax.
    #[error("Invalid TOML in {path}: {reason}")]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },

    /// A value parsed but is out of range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// TOML configuration file structure.
///
/// All fields are optional - if not specified, hardcoded defaults are used.
/// Corresponds to `~/.config/skyfeed/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Bound on the stored cid set, and the row count at which the window
    /// counts as full.
    #[serde(default)]
    pub max_timeline_size: Option<usize>,

    /// Entries per next-page fetch.
    #[serde(default)]
    pub add_page_size: Option<usize>,

    /// Entries per prepend fetch.
    #[serde(default)]
    pub prepend_page_size: Option<usize>,

    /// Entries per gap fill fetch.
    #[serde(default)]
    pub gap_fill_page_size: Option<usize>,

    /// Rows dropped per tail trim.
    #[serde(default)]
    pub delete_size: Option<usize>,

    /// Rows left below the viewport that trigger a next-page fetch.
    #[serde(default)]
    pub next_page_threshold: Option<usize>,

    /// Pull thread root and parent next to replies.
    #[serde(default)]
    pub assemble_threads: Option<bool>,

    /// Drop reposts.
    #[serde(default)]
    pub hide_reposts: Option<bool>,

    /// Drop replies.
    #[serde(default)]
    pub hide_replies: Option<bool>,

    /// Drop replies to accounts the user does not follow.
    #[serde(default)]
    pub hide_replies_by_unfollowed: Option<bool>,

    /// DID of the acting user.
    #[serde(default)]
    pub user_did: Option<String>,

    /// Path to log file for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
}

/// Resolved configuration after applying precedence rules.
///
/// Created by merging defaults, config file, env vars, and CLI args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Stored cid bound and full-window row count.
    pub max_timeline_size: usize,
    /// Entries per next-page fetch.
    pub add_page_size: usize,
    /// Entries per prepend fetch.
    pub prepend_page_size: usize,
    /// Entries per gap fill fetch.
    pub gap_fill_page_size: usize,
    /// Rows dropped per tail trim.
    pub delete_size: usize,
    /// Next-page trigger.
    pub next_page_threshold: usize,
    /// Thread assembly.
    pub assemble_threads: bool,
    /// Drop reposts.
    pub hide_reposts: bool,
    /// Drop replies.
    pub hide_replies: bool,
    /// Drop replies to unfollowed accounts.
    pub hide_replies_by_unfollowed: bool,
    /// DID of the acting user.
    pub user_did: Option<String>,
    /// Path to log file for tracing output.
    pub log_file_path: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            max_timeline_size: DEFAULT_MAX_TIMELINE_SIZE,
            add_page_size: DEFAULT_ADD_PAGE_SIZE,
            prepend_page_size: DEFAULT_PREPEND_PAGE_SIZE,
            gap_fill_page_size: DEFAULT_GAP_FILL_PAGE_SIZE,
            delete_size: DEFAULT_DELETE_SIZE,
            next_page_threshold: DEFAULT_NEXT_PAGE_THRESHOLD,
            assemble_threads: true,
            hide_reposts: false,
            hide_replies: false,
            hide_replies_by_unfollowed: false,
            user_did: None,
            log_file_path: default_log_path(),
        }
    }
}

impl ResolvedConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero size or a malformed DID.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("max_timeline_size", self.max_timeline_size),
            ("add_page_size", self.add_page_size),
            ("prepend_page_size", self.prepend_page_size),
            ("gap_fill_page_size", self.gap_fill_page_size),
            ("delete_size", self.delete_size),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        self.user_did()?;
        Ok(())
    }

    /// Page sizes for the pager.
    pub fn pager_settings(&self) -> PagerSettings {
        PagerSettings {
            add_page_size: self.add_page_size,
            prepend_page_size: self.prepend_page_size,
            gap_fill_page_size: self.gap_fill_page_size,
            delete_size: self.delete_size,
            next_page_threshold: self.next_page_threshold,
        }
    }

    /// Reply and repost preferences.
    pub fn feed_preferences(&self) -> FeedPreferences {
        FeedPreferences {
            assemble_threads: self.assemble_threads,
            hide_reposts: self.hide_reposts,
            hide_replies: self.hide_replies,
            hide_replies_by_unfollowed: self.hide_replies_by_unfollowed,
        }
    }

    /// Feed policy for the configured user.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a malformed DID.
    pub fn feed_policy(&self) -> Result<FeedPolicy, ConfigError> {
        Ok(FeedPolicy::new(self.user_did()?, self.feed_preferences()))
    }

    fn user_did(&self) -> Result<Option<Did>, ConfigError> {
        self.user_did
            .as_deref()
            .map(Did::new)
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                field: "user_did",
                reason: e.to_string(),
            })
    }
}

/// Resolve default log file path.
///
/// Returns `~/.local/state/skyfeed/skyfeed.log` on Unix-like systems,
/// or appropriate platform path on other systems.
///
/// If state directory cannot be determined, falls back to current directory.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        state_dir.join("skyfeed").join("skyfeed.log")
    } else {
        PathBuf::from("skyfeed.log")
    }
}

/// Load configuration file from a specific path.
///
/// Returns `Ok(None)` if file doesn't exist (not an error - use defaults).
/// Returns `Err` if file exists but cannot be read or parsed.
///
/// # Errors
///
/// Returns error if file exists but has read or parse errors.
pub fn load_config_file(path: impl Into<PathBuf>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.into();

    // Missing file is not an error - use defaults
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let config: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    Ok(Some(config))
}

/// Resolve default config file path.
///
/// Returns `~/.config/skyfeed/config.toml` on Unix, appropriate path on other platforms.
/// Returns `None` if home directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("skyfeed").join("config.toml"))
}

/// Load configuration with precedence handling.
///
/// Precedence (highest to lowest):
/// 1. Explicit `config_path` argument (CLI `--config`)
/// 2. `SKYFEED_CONFIG` environment variable
/// 3. Default path `~/.config/skyfeed/config.toml`
///
/// Missing config files are NOT errors - defaults are used.
///
/// # Errors
///
/// Returns error only if a config file exists but cannot be read or parsed.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG) {
        return load_config_file(PathBuf::from(env_path));
    }

    if let Some(default_path) = default_config_path() {
        return load_config_file(default_path);
    }

    Ok(None)
}

/// Apply environment variable overrides to resolved config.
///
/// Checks for:
/// - `SKYFEED_MAX_TIMELINE_SIZE`: positive integer
/// - `SKYFEED_ASSEMBLE_THREADS`: `true`/`false`/`1`/`0`
///
/// Unparsable values are logged and ignored.
pub fn apply_env_overrides(mut config: ResolvedConfig) -> ResolvedConfig {
    if let Ok(raw) = std::env::var(ENV_MAX_TIMELINE_SIZE) {
        match raw.trim().parse::<usize>() {
            Ok(size) if size > 0 => config.max_timeline_size = size,
            _ => warn!(var = ENV_MAX_TIMELINE_SIZE, value = %raw, "Ignoring invalid override"),
        }
    }

    if let Ok(raw) = std::env::var(ENV_ASSEMBLE_THREADS) {
        match parse_bool(&raw) {
            Some(assemble) => config.assemble_threads = assemble,
            None => warn!(var = ENV_ASSEMBLE_THREADS, value = %raw, "Ignoring invalid override"),
        }
    }

    config
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Merge config file into defaults to create resolved config.
///
/// For each field in `ConfigFile`, if `Some(value)`, use it; otherwise use default.
pub fn merge_config(config_file: Option<ConfigFile>) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();

    let Some(config) = config_file else {
        return defaults;
    };

    ResolvedConfig {
        max_timeline_size: config
            .max_timeline_size
            .unwrap_or(defaults.max_timeline_size),
        add_page_size: config.add_page_size.unwrap_or(defaults.add_page_size),
        prepend_page_size: config
            .prepend_page_size
            .unwrap_or(defaults.prepend_page_size),
        gap_fill_page_size: config
            .gap_fill_page_size
            .unwrap_or(defaults.gap_fill_page_size),
        delete_size: config.delete_size.unwrap_or(defaults.delete_size),
        next_page_threshold: config
            .next_page_threshold
            .unwrap_or(defaults.next_page_threshold),
        assemble_threads: config.assemble_threads.unwrap_or(defaults.assemble_threads),
        hide_reposts: config.hide_reposts.unwrap_or(defaults.hide_reposts),
        hide_replies: config.hide_replies.unwrap_or(defaults.hide_replies),
        hide_replies_by_unfollowed: config
            .hide_replies_by_unfollowed
            .unwrap_or(defaults.hide_replies_by_unfollowed),
        user_did: config.user_did.or(defaults.user_did),
        log_file_path: config.log_file_path.unwrap_or(defaults.log_file_path),
    }
}

/// Apply CLI argument overrides to resolved config.
///
/// CLI args have the highest precedence and override all other sources.
/// Only applies overrides for flags that were explicitly set by the user.
///
/// Precedence chain: Defaults → Config File → Env Vars → CLI Args (highest)
pub fn apply_cli_overrides(
    mut config: ResolvedConfig,
    max_timeline_size_override: Option<usize>,
    assemble_threads_override: Option<bool>,
) -> ResolvedConfig {
    if let Some(size) = max_timeline_size_override {
        config.max_timeline_size = size;
    }

    if let Some(assemble) = assemble_threads_override {
        config.assemble_threads = assemble;
    }

    config
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
