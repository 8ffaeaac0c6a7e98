use super::api::Plugin;
use super::declarative::DeclarativeStrategy;
use super::loader::{
    DiscoveryStrategy, EntryPoint, EntrypointStrategy, FirstPartyStrategy, LinkedModules,
    ModuleResolver,
};
use crate::config;
use crate::error::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Installed plugins across every discovery strategy.
///
/// Strategies are consulted in priority order: first-party, registered
/// entrypoints, plugin files. When two strategies produce the same name the
/// first record wins. Discovery runs on first access and is cached until
/// [`PluginRegistry::clear`].
pub struct PluginRegistry {
    first_party: FirstPartyStrategy,
    entrypoints: EntrypointStrategy,
    declarative: DeclarativeStrategy,
}

impl PluginRegistry {
    /// Registry over linked modules, registered entrypoints and the plugin
    /// files under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            first_party: FirstPartyStrategy::new(LinkedModules),
            entrypoints: EntrypointStrategy::new(),
            declarative: DeclarativeStrategy::new(root),
        }
    }

    /// Registry scanning the plugin root resolved from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(config::plugins_root())
    }

    /// Replace the resolver used to import first-party modules
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ModuleResolver + 'static) -> Self {
        self.first_party = FirstPartyStrategy::new(resolver);
        self
    }

    /// Read a fixed list of entries instead of the linked extension registry
    #[must_use]
    pub fn with_entry_points(mut self, entry_points: Vec<EntryPoint>) -> Self {
        self.entrypoints = EntrypointStrategy::with_entry_points(entry_points);
        self
    }

    /// Directory scanned for plugin files
    #[must_use]
    pub fn plugins_root(&self) -> &Path {
        self.declarative.root()
    }

    /// Load the first-party plugin `name` into the installed set
    pub fn load_first_party(&mut self, name: &str) -> Result<&Plugin> {
        self.first_party.load(name)
    }

    /// Run discovery for every strategy that has not loaded yet
    pub fn load(&mut self) -> Result<()> {
        self.first_party.installed()?;
        self.entrypoints.installed()?;
        self.declarative.installed()?;
        Ok(())
    }

    /// Installed plugins, deduplicated by name, in strategy priority order
    pub fn iter_installed(&mut self) -> Result<impl Iterator<Item = &Plugin> + '_> {
        self.load()?;
        Ok(self.deduplicated().into_iter())
    }

    pub fn is_installed(&mut self, name: &str) -> Result<bool> {
        Ok(self.iter_installed()?.any(|plugin| plugin.name() == name))
    }

    /// Installed plugin called `name`
    pub fn get(&mut self, name: &str) -> Result<Option<&Plugin>> {
        Ok(self.iter_installed()?.find(|plugin| plugin.name() == name))
    }

    /// Drop every cached record so the next access rediscovers
    pub fn clear(&mut self) {
        self.first_party.clear();
        self.entrypoints.clear();
        self.declarative.clear();
    }

    fn deduplicated(&self) -> Vec<&Plugin> {
        let mut seen = HashSet::new();
        let mut plugins = Vec::new();

        let cached = self
            .first_party
            .cached()
            .iter()
            .chain(self.entrypoints.cached())
            .chain(self.declarative.cached());
        for plugin in cached {
            if seen.insert(plugin.name()) {
                plugins.push(plugin);
            } else {
                debug!(
                    "Ignoring duplicate {} plugin {}",
                    plugin.origin().map_or_else(String::new, |origin| origin.to_string()),
                    plugin.name()
                );
            }
        }

        plugins
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::api::{PluginObject, PluginOrigin};
    use std::fs;
    use tempfile::TempDir;

    fn shared() -> PluginObject {
        PluginObject::new()
            .version("9.9.9")
            .patches([("body", "<p>first-party</p>")])
    }

    fn shared_entrypoint() -> PluginObject {
        PluginObject::new().patches([("body", "<p>entrypoint</p>")])
    }

    fn resolver(module: &str) -> Option<PluginObject> {
        (module == "deckhandshared.plugin").then(shared)
    }

    fn registry(temp: &TempDir) -> PluginRegistry {
        PluginRegistry::new(temp.path())
            .with_resolver(resolver)
            .with_entry_points(vec![
                EntryPoint::new("shared", shared_entrypoint),
                EntryPoint::new("extension", shared_entrypoint)
                    .with_distribution("deckhand-extension", "0.3.0"),
            ])
    }

    #[test]
    fn test_union_in_priority_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("file.yml"), "name: file\nversion: \"1.0\"\n").unwrap();

        let mut registry = registry(&temp);
        registry.load_first_party("shared").unwrap();

        let names: Vec<_> = registry
            .iter_installed()
            .unwrap()
            .map(Plugin::name)
            .collect();
        assert_eq!(names, vec!["shared", "extension", "file"]);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("shared.yml"),
            "name: shared\nversion: \"0.1\"\n",
        )
        .unwrap();

        let mut registry = registry(&temp);
        registry.load_first_party("shared").unwrap();

        let shared: Vec<_> = registry
            .iter_installed()
            .unwrap()
            .filter(|plugin| plugin.name() == "shared")
            .collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].origin(), Some(PluginOrigin::FirstParty));
        assert_eq!(shared[0].version().unwrap(), "9.9.9");
    }

    #[test]
    fn test_entrypoint_beats_file() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("extension.yml"),
            "name: extension\nversion: \"0.1\"\n",
        )
        .unwrap();

        let mut registry = registry(&temp);
        let extension = registry.get("extension").unwrap().unwrap();
        assert_eq!(extension.origin(), Some(PluginOrigin::Entrypoint));
        assert_eq!(extension.version().unwrap(), "0.3.0");
    }

    #[test]
    fn test_is_installed() {
        let temp = TempDir::new().unwrap();
        let mut registry = registry(&temp);
        assert!(registry.is_installed("extension").unwrap());
        assert!(!registry.is_installed("Extension").unwrap());
        assert!(!registry.is_installed("unknown").unwrap());
    }

    #[test]
    fn test_clear_rediscovers_files() {
        let temp = TempDir::new().unwrap();
        let mut registry = registry(&temp);
        registry.load_first_party("shared").unwrap();
        assert!(!registry.is_installed("late").unwrap());

        fs::write(temp.path().join("late.yml"), "name: late\nversion: \"1.0\"\n").unwrap();
        assert!(!registry.is_installed("late").unwrap());

        registry.clear();
        assert!(registry.is_installed("late").unwrap());
        // first-party plugins must be loaded again after a clear
        assert_eq!(
            registry.get("shared").unwrap().unwrap().origin(),
            Some(PluginOrigin::Entrypoint)
        );
    }

    #[test]
    fn test_discovery_error_propagates() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("broken.yml"), "- not\n- a mapping\n").unwrap();

        let mut registry = registry(&temp);
        assert!(registry.iter_installed().is_err());
        assert!(registry.is_installed("extension").is_err());
    }
}
