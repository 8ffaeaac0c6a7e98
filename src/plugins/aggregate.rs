//! Merged views over the enabled plugins of one configuration snapshot

use super::api::{HookServices, Plugin, PluginCommand};
use super::registry::PluginRegistry;
use crate::config::Config;
use crate::error::Result;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;

/// Contributions of the enabled plugins, built once per configuration.
///
/// The configuration is copied on construction, so later changes to the
/// caller's mapping are not observed.
#[derive(Debug)]
pub struct Plugins {
    config: Config,
    enabled: Vec<Plugin>,
    /// slot -> plugin -> content
    patches: HashMap<String, HashMap<String, String>>,
    /// phase -> (plugin, services) in registry order
    hooks: HashMap<String, Vec<(String, HookServices)>>,
}

impl Plugins {
    pub fn new(registry: &mut PluginRegistry, config: &Config) -> Result<Self> {
        let config = config.clone();
        let enabled: Vec<Plugin> = registry
            .iter_installed()?
            .filter(|plugin| config.is_plugin_enabled(plugin.name()))
            .cloned()
            .collect();

        let mut patches: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut hooks: HashMap<String, Vec<(String, HookServices)>> = HashMap::new();

        for plugin in &enabled {
            for (slot, content) in &plugin.patches {
                patches
                    .entry(slot.clone())
                    .or_default()
                    .insert(plugin.name().to_string(), content.clone());
            }

            for (phase, services) in &plugin.hooks {
                let by_plugin = hooks.entry(phase.clone()).or_default();
                match by_plugin.iter_mut().find(|(name, _)| name == plugin.name()) {
                    Some(entry) => entry.1 = services.clone(),
                    None => by_plugin.push((plugin.name().to_string(), services.clone())),
                }
            }
        }

        Ok(Self {
            config,
            enabled,
            patches,
            hooks,
        })
    }

    /// Configuration snapshot this view was built from
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Enabled plugins in registry order
    pub fn iter_enabled(&self) -> impl Iterator<Item = &Plugin> {
        self.enabled.iter()
    }

    /// Patches for `slot` as `(plugin, content)`, sorted by plugin name
    pub fn iter_patches(&self, slot: &str) -> impl Iterator<Item = (&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .patches
            .get(slot)
            .map(|by_plugin| {
                by_plugin
                    .iter()
                    .map(|(plugin, content)| (plugin.as_str(), content.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }

    /// Hooks for `phase` as `(plugin, services)`, in enablement order.
    ///
    /// Unlike patches these are not sorted: hook execution follows registry
    /// order.
    pub fn iter_hooks(&self, phase: &str) -> impl Iterator<Item = (&str, &HookServices)> {
        self.hooks
            .get(phase)
            .into_iter()
            .flatten()
            .map(|(plugin, services)| (plugin.as_str(), services))
    }

    /// `add` entries of every enabled plugin, under their namespaced keys
    pub fn iter_config_add(&self) -> impl Iterator<Item = (String, &Value)> {
        self.enabled.iter().flat_map(|plugin| {
            plugin
                .config_add()
                .iter()
                .map(move |(key, value)| (plugin.config_key(key), value))
        })
    }

    /// `set` entries of every enabled plugin, keys verbatim
    pub fn iter_config_set(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.enabled.iter().flat_map(|plugin| {
            plugin
                .config_set()
                .iter()
                .map(|(key, value)| (key.as_str(), value))
        })
    }

    /// `defaults` entries of every enabled plugin, under their namespaced keys
    pub fn iter_config_defaults(&self) -> impl Iterator<Item = (String, &Value)> {
        self.enabled.iter().flat_map(|plugin| {
            plugin
                .config_defaults()
                .iter()
                .map(move |(key, value)| (plugin.config_key(key), value))
        })
    }

    /// Merge plugin variables into a configuration and its defaults.
    ///
    /// `add` and `set` entries never override a value already present in
    /// `config`; `defaults` entries always land in `defaults`. Values are
    /// copied unrendered.
    pub fn apply_config(&self, config: &mut Config, defaults: &mut Config) {
        for (key, value) in self.iter_config_add() {
            if !config.contains_key(&key) {
                config.insert(key, value.clone());
            }
        }
        for (key, value) in self.iter_config_defaults() {
            defaults.insert(key, value.clone());
        }
        for (key, value) in self.iter_config_set() {
            if !config.contains_key(key) {
                config.insert(key, value.clone());
            }
        }
    }

    /// Template directories of enabled plugins, as `(plugin, root)`
    pub fn iter_template_roots(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.enabled.iter().filter_map(|plugin| {
            plugin
                .templates_root
                .as_deref()
                .map(|root| (plugin.name(), root))
        })
    }

    /// Commands of enabled plugins, as `(plugin, command)`
    pub fn iter_commands(&self) -> impl Iterator<Item = (&str, &PluginCommand)> {
        self.enabled.iter().filter_map(|plugin| {
            plugin
                .command
                .as_ref()
                .map(|command| (plugin.name(), command))
        })
    }
}
