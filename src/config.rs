//! Layered configuration.
//!
//! Values resolve in order: built-in defaults, then an optional TOML file,
//! then environment variables. Environment variables are prefixed with
//! `TREEWATCH_` and use double underscores for nesting:
//! `TREEWATCH_WATCHER__MAX_DEPTH=64` sets `watcher.max_depth`.

use std::collections::HashMap;
use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::watcher::DEFAULT_MAX_DEPTH;

const CONFIG_FILE: &str = "treewatch.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Deepest directory level the discovery walk will descend to.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Capacity of the bounded channel carrying normalized events; a slow
    /// consumer backpressures the syncer rather than growing unbounded.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter (`error`, `warn`, `info`, `debug`, `trace`).
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `syncer = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings, merging the given TOML file (or `treewatch.toml` in
    /// the working directory when none is given) and the environment over
    /// the defaults.
    pub fn load(config_file: Option<&Path>) -> Result<Self, figment::Error> {
        let figment = Figment::from(Serialized::defaults(Settings::default()));
        let figment = match config_file {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file(CONFIG_FILE)),
        };
        figment
            .merge(Env::prefixed("TREEWATCH_").split("__"))
            .extract()
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}
