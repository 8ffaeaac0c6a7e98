//! Plugin discovery, registration and aggregation.
//!
//! Plugins are named, versioned bundles of configuration variables, template
//! patches and lifecycle hooks. They come from three sources:
//!
//! - first-party modules linked into the binary, loaded explicitly by name
//! - entries registered against the [`ENTRYPOINT`] extension point
//! - YAML files under the plugin root (see [`declarative`])
//!
//! The [`PluginRegistry`] merges them, and [`Plugins`] aggregates the
//! contributions of the plugins enabled in a [`Config`].

pub mod aggregate;
pub mod api;
pub mod declarative;
pub mod loader;
pub mod registry;

pub use aggregate::Plugins;
pub use api::{
    CommandHandler, Contribution, HookServices, Plugin, PluginCommand, PluginConfig, PluginObject,
    PluginOrigin,
};
pub use declarative::DeclarativeStrategy;
pub use loader::{
    DiscoveryStrategy, Distribution, EntryPoint, EntrypointStrategy, FirstPartyModule,
    FirstPartyStrategy, LinkedModules, ModuleResolver, ENTRYPOINT,
};
pub use registry::PluginRegistry;

use crate::config::{Config, PLUGINS_KEY};
use crate::error::{PluginError, Result};
use serde_yaml::Value;
use tracing::{debug, info};

/// Configuration key holding the enabled-plugin list
pub const CONFIG_KEY: &str = PLUGINS_KEY;

pub fn is_installed(registry: &mut PluginRegistry, name: &str) -> Result<bool> {
    registry.is_installed(name)
}

pub fn iter_installed(
    registry: &mut PluginRegistry,
) -> Result<impl Iterator<Item = &Plugin> + '_> {
    registry.iter_installed()
}

#[must_use]
pub fn is_enabled(config: &Config, name: &str) -> bool {
    config.is_plugin_enabled(name)
}

/// Enabled plugins for `config`, in registry order
pub fn iter_enabled(registry: &mut PluginRegistry, config: &Config) -> Result<Vec<Plugin>> {
    Ok(Plugins::new(registry, config)?.iter_enabled().cloned().collect())
}

/// Patches for `slot`, sorted by plugin name
pub fn iter_patches(
    registry: &mut PluginRegistry,
    config: &Config,
    slot: &str,
) -> Result<Vec<(String, String)>> {
    Ok(Plugins::new(registry, config)?
        .iter_patches(slot)
        .map(|(plugin, content)| (plugin.to_string(), content.to_string()))
        .collect())
}

/// Hooks for `phase`, in enablement order
pub fn iter_hooks(
    registry: &mut PluginRegistry,
    config: &Config,
    phase: &str,
) -> Result<Vec<(String, HookServices)>> {
    Ok(Plugins::new(registry, config)?
        .iter_hooks(phase)
        .map(|(plugin, services)| (plugin.to_string(), services.clone()))
        .collect())
}

/// Add `name` to the enabled-plugin list.
///
/// The list is kept sorted. Enabling an enabled plugin does nothing.
///
/// # Errors
/// [`PluginError::NotInstalled`] when no strategy provides `name`, and
/// [`PluginError::InvalidPluginList`] when the stored list is not a list. The
/// configuration is left untouched in both cases.
pub fn enable(registry: &mut PluginRegistry, config: &mut Config, name: &str) -> Result<()> {
    if !registry.is_installed(name)? {
        return Err(PluginError::NotInstalled(name.to_string()));
    }
    if config.is_plugin_enabled(name) {
        debug!("Plugin {} is already enabled", name);
        return Ok(());
    }

    let enabled = config.plugin_list_mut()?;
    enabled.push(Value::from(name));
    enabled.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    debug!("Enabled plugin {}", name);
    Ok(())
}

/// Remove `name` from the enabled-plugin list.
///
/// Variables the plugin overrode through `set` are removed from the
/// configuration first. Disabling a plugin that is not enabled only cleans the
/// list.
pub fn disable(registry: &mut PluginRegistry, config: &mut Config, name: &str) -> Result<()> {
    info!("Disabling plugin {}...", name);
    let plugins = Plugins::new(registry, config)?;
    for plugin in plugins.iter_enabled().filter(|plugin| plugin.name() == name) {
        for key in plugin.config_set().keys() {
            if let Some(value) = config.remove(key) {
                info!("    Removed config entry {}={}", key, display_value(&value));
            }
        }
    }

    config.remove_enabled_plugin(name);
    info!("    Plugin disabled");
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}
