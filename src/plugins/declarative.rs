//! Plugins declared as YAML files under the plugin root.
//!
//! Each `*.yml` file holds one plugin:
//!
//! ```yaml
//! name: forum
//! version: "1.0"
//! config:
//!   add:
//!     SECRET_KEY: "{{ 24|random_string }}"
//!   set:
//!     FORUM_SECRET: abc
//! patches:
//!   local-docker-compose-services: |
//!     forum:
//!       image: forum:latest
//! hooks:
//!   init: [mysql, forum]
//! templates: /path/to/forum/templates
//! ```

use super::api::{
    describe_value, expect_version, HookServices, Plugin, PluginCommand, PluginObject, PluginOrigin,
};
use super::loader::{DiscoveryStrategy, StrategyCache};
use crate::config;
use crate::error::{PluginError, Result};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File pattern matched under the plugin root
pub const PLUGIN_FILE_PATTERN: &str = "*.yml";

/// Reads one plugin per YAML file under a root directory
#[derive(Debug)]
pub struct DeclarativeStrategy {
    root: PathBuf,
    cache: StrategyCache,
}

impl DeclarativeStrategy {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: StrategyCache::default(),
        }
    }

    /// Strategy scanning the root resolved from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(config::plugins_root())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Plugin files under the root, in path order
    fn plugin_files(&self) -> Result<Vec<PathBuf>> {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = Path::new(&root).join(PLUGIN_FILE_PATTERN);

        let mut files = Vec::new();
        let options = glob::MatchOptions {
            require_literal_leading_dot: true,
            ..glob::MatchOptions::new()
        };
        for entry in glob::glob_with(&pattern.to_string_lossy(), options)? {
            let path = entry.map_err(|err| PluginError::Io {
                path: err.path().to_path_buf(),
                source: err.into_error(),
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl DiscoveryStrategy for DeclarativeStrategy {
    fn origin(&self) -> PluginOrigin {
        PluginOrigin::Declarative
    }

    fn discover(&self) -> Result<Vec<Plugin>> {
        debug!("Scanning {} for plugin files", self.root.display());
        self.plugin_files()?
            .iter()
            .map(|path| load_plugin_file(path))
            .collect()
    }

    fn cache(&self) -> &StrategyCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut StrategyCache {
        &mut self.cache
    }
}

/// Build a plugin record from one plugin file
///
/// # Errors
/// Fails when the file cannot be read or parsed, does not hold a mapping,
/// lacks `name` or `version`, or has an ill-shaped optional key.
pub fn load_plugin_file(path: &Path) -> Result<Plugin> {
    let contents = fs::read_to_string(path).map_err(|source| PluginError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let data: Value = serde_yaml::from_str(&contents).map_err(|source| PluginError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Mapping(mut data) = data else {
        return Err(PluginError::InvalidDocument {
            path: path.to_path_buf(),
        });
    };

    let origin = path.display().to_string();
    let name = match required_key(&mut data, path, "name")? {
        Value::String(name) if name.is_empty() => {
            return Err(PluginError::MalformedField {
                origin,
                field: "name",
                reason: "must not be empty".to_string(),
            })
        }
        Value::String(name) => name,
        other => {
            return Err(PluginError::MalformedField {
                origin,
                field: "name",
                reason: format!("expected a string, got {}", describe_value(&other)),
            })
        }
    };
    let version = expect_version(&origin, required_key(&mut data, path, "version")?)?;

    let mut object = PluginObject::new();
    if let Some(config) = optional_key(&mut data, &origin, "config")? {
        object = object.config(config);
    }
    if let Some(patches) = optional_key::<BTreeMap<String, String>>(&mut data, &origin, "patches")? {
        object = object.patches(patches);
    }
    if let Some(hooks) =
        optional_key::<BTreeMap<String, HookServices>>(&mut data, &origin, "hooks")?
    {
        object = object.hooks(hooks);
    }
    if let Some(templates) = optional_key::<PathBuf>(&mut data, &origin, "templates")? {
        object = object.templates(templates);
    }
    if let Some(command) = data.remove("command").filter(|value| !value.is_null()) {
        object = object.command(PluginCommand::Declared(command));
    }

    let plugin = Plugin::new(name, object)?
        .with_version(version)
        .with_origin(PluginOrigin::Declarative)
        .with_source(path);
    debug!("Loaded plugin {} from {}", plugin.name(), path.display());
    Ok(plugin)
}

fn required_key(data: &mut Mapping, path: &Path, key: &'static str) -> Result<Value> {
    data.remove(key).ok_or_else(|| PluginError::MissingKey {
        path: path.to_path_buf(),
        key,
    })
}

/// Decode an optional key; an explicit `null` counts as absent
fn optional_key<T: DeserializeOwned>(
    data: &mut Mapping,
    origin: &str,
    key: &'static str,
) -> Result<Option<T>> {
    match data.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_yaml::from_value(value)
            .map(Some)
            .map_err(|err| PluginError::MalformedField {
                origin: origin.to_string(),
                field: key,
                reason: err.to_string(),
            }),
    }
}
