use crate::error::PluginError;
use crate::plugins::api::describe_value;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Key of the enabled-plugin list in the configuration mapping
pub const PLUGINS_KEY: &str = "PLUGINS";

/// Environment variable overriding the declarative plugin root
pub const PLUGINS_ROOT_ENV_VAR: &str = "DECKHAND_PLUGINS_ROOT";

/// Application name of the per-user data directory holding plugin files
const PLUGINS_DATA_DIR: &str = "deckhand-plugins";

/// Global configuration mapping.
///
/// The mapping is owned by the caller; plugin operations read it and mutate it
/// in place. Keys are kept in lexical order so saved files are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    values: BTreeMap<String, Value>,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Names listed in the enabled-plugin entry, in stored order.
    ///
    /// Non-string items are skipped.
    #[must_use]
    pub fn enabled_plugins(&self) -> Vec<String> {
        match self.values.get(PLUGINS_KEY) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether `name` appears in the enabled-plugin entry
    #[must_use]
    pub fn is_plugin_enabled(&self, name: &str) -> bool {
        match self.values.get(PLUGINS_KEY) {
            Some(Value::Sequence(items)) => items.iter().any(|item| item.as_str() == Some(name)),
            _ => false,
        }
    }

    /// Mutable access to the enabled-plugin entry, creating it when absent.
    ///
    /// A `null` entry becomes an empty list.
    ///
    /// # Errors
    /// [`PluginError::InvalidPluginList`] when the entry holds anything else
    /// than a list; the entry is left as it was.
    pub fn plugin_list_mut(&mut self) -> std::result::Result<&mut Vec<Value>, PluginError> {
        let entry = self
            .values
            .entry(PLUGINS_KEY.to_string())
            .or_insert(Value::Null);
        if entry.is_null() {
            *entry = Value::Sequence(Vec::new());
        }
        let found = describe_value(entry);
        let Value::Sequence(items) = entry else {
            return Err(PluginError::InvalidPluginList {
                found: found.to_string(),
            });
        };
        Ok(items)
    }

    /// Remove every occurrence of `name` from the enabled-plugin entry.
    ///
    /// Returns how many entries were removed. A missing entry stays missing.
    pub fn remove_enabled_plugin(&mut self, name: &str) -> usize {
        match self.values.get_mut(PLUGINS_KEY) {
            Some(Value::Sequence(items)) => {
                let before = items.len();
                items.retain(|item| item.as_str() != Some(name));
                before - items.len()
            }
            _ => 0,
        }
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        // An empty file is an empty mapping, not a parse error
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;

        Ok(home.join(".deckhand").join("config.yml"))
    }
}

impl From<BTreeMap<String, Value>> for Config {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Root directory scanned for declarative plugin files.
///
/// Reads [`PLUGINS_ROOT_ENV_VAR`], falling back to the per-user data directory.
#[must_use]
pub fn plugins_root() -> PathBuf {
    resolve_plugins_root(std::env::var(PLUGINS_ROOT_ENV_VAR).ok().as_deref())
}

/// Resolve the plugin root from an optional override value
#[must_use]
pub fn resolve_plugins_root(env_value: Option<&str>) -> PathBuf {
    match env_value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => expand_home(value),
        None => dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(PLUGINS_DATA_DIR),
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches(&['/', '\\'][..])),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_plugins_skips_non_strings() {
        let yaml = r#"
PLUGINS:
  - forum
  - 42
  - notes
LMS_HOST: example.com
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.enabled_plugins(), vec!["forum", "notes"]);
        assert!(config.is_plugin_enabled("notes"));
        assert!(!config.is_plugin_enabled("42"));
    }

    #[test]
    fn test_plugin_list_mut_creates_entry() {
        let mut config = Config::new();
        config.plugin_list_mut().unwrap().push(Value::from("forum"));
        assert_eq!(config.enabled_plugins(), vec!["forum"]);
    }

    #[test]
    fn test_plugin_list_mut_replaces_null_entry() {
        let mut config: Config = serde_yaml::from_str("PLUGINS: null").unwrap();
        assert!(config.plugin_list_mut().unwrap().is_empty());
        assert!(config.get(PLUGINS_KEY).unwrap().is_sequence());
    }

    #[test]
    fn test_plugin_list_mut_rejects_scalar_entry() {
        let mut config: Config = serde_yaml::from_str("PLUGINS: forum").unwrap();
        let before = config.clone();

        let err = config.plugin_list_mut().unwrap_err();
        assert!(matches!(err, PluginError::InvalidPluginList { ref found } if found == "a string"));
        assert_eq!(config, before);
    }

    #[test]
    fn test_plugin_list_mut_rejects_mapping_entry() {
        let mut config: Config = serde_yaml::from_str("PLUGINS: {forum: true}").unwrap();
        assert!(matches!(
            config.plugin_list_mut(),
            Err(PluginError::InvalidPluginList { .. })
        ));
        assert!(config.get(PLUGINS_KEY).unwrap().is_mapping());
    }

    #[test]
    fn test_remove_enabled_plugin_removes_duplicates() {
        let mut config: Config = serde_yaml::from_str("PLUGINS: [forum, notes, forum]").unwrap();
        assert_eq!(config.remove_enabled_plugin("forum"), 2);
        assert_eq!(config.enabled_plugins(), vec!["notes"]);

        let mut empty = Config::new();
        assert_eq!(empty.remove_enabled_plugin("forum"), 0);
        assert!(!empty.contains_key(PLUGINS_KEY));
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yml");

        let mut config = Config::new();
        config.insert("LMS_HOST", "example.com");
        config.plugin_list_mut().unwrap().push(Value::from("forum"));
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_empty_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "").unwrap();
        assert!(Config::load_from_file(&path).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_plugins_root_override() {
        assert_eq!(
            resolve_plugins_root(Some("/srv/plugins")),
            PathBuf::from("/srv/plugins")
        );
    }

    #[test]
    fn test_resolve_plugins_root_default() {
        let root = resolve_plugins_root(None);
        assert!(root.ends_with(PLUGINS_DATA_DIR));
        assert_eq!(resolve_plugins_root(Some("  ")), root);
    }

    #[test]
    fn test_resolve_plugins_root_expands_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                resolve_plugins_root(Some("~/plugins")),
                home.join("plugins")
            );
        }
        assert_eq!(
            resolve_plugins_root(Some("~other/plugins")),
            PathBuf::from("~other/plugins")
        );
    }
}
