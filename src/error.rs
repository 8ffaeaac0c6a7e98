//! Error types for plugin discovery and plugin state changes

use std::path::PathBuf;

/// Result alias used across the plugin subsystem
pub type Result<T> = std::result::Result<T, PluginError>;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin '{0}' is not installed.")]
    NotInstalled(String),

    #[error("Invalid plugin: {}. Expected dict.", path.display())]
    InvalidDocument { path: PathBuf },

    #[error("Invalid plugin: {}. Missing key: {key}", path.display())]
    MissingKey { path: PathBuf, key: &'static str },

    #[error("Invalid plugin: {origin}. Field '{field}': {reason}")]
    MalformedField {
        origin: String,
        field: &'static str,
        reason: String,
    },

    #[error("Invalid plugin: {origin}. Version must be a string, got {found}")]
    InvalidVersion { origin: String, found: String },

    #[error("Invalid plugin: {0}. Missing version attribute")]
    MissingVersion(String),

    #[error("plugin '{0}' does not define a version")]
    VersionNotImplemented(String),

    #[error("plugin module '{0}' could not be found")]
    ModuleNotFound(String),

    #[error("Invalid configuration: PLUGINS must be a list of plugin names, got {found}")]
    InvalidPluginList { found: String },

    #[error("plugin name must not be empty")]
    EmptyName,

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid plugin root pattern: {0}")]
    Glob(#[from] glob::PatternError),
}
