use super::api::{expect_version, Plugin, PluginObject, PluginOrigin};
use crate::error::{PluginError, Result};
use tracing::{debug, info};

/// Extension point that registered plugins advertise
pub const ENTRYPOINT: &str = "deckhand.plugin.v0";

/// Prefix of first-party plugin module paths: `deckhand<name>.plugin`
pub const FIRST_PARTY_PREFIX: &str = "deckhand";

/// Discovered records of one strategy and whether discovery already ran
#[derive(Debug, Default)]
pub struct StrategyCache {
    installed: Vec<Plugin>,
    loaded: bool,
}

impl StrategyCache {
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// A mechanism that locates plugins from one kind of source.
///
/// Discovery runs once; later calls replay the cached records until
/// [`DiscoveryStrategy::clear`].
pub trait DiscoveryStrategy {
    /// Which source this strategy reads
    fn origin(&self) -> PluginOrigin;

    /// Scan the source and build its records
    fn discover(&self) -> Result<Vec<Plugin>>;

    fn cache(&self) -> &StrategyCache;

    fn cache_mut(&mut self) -> &mut StrategyCache;

    /// Installed records, discovering them on first access
    fn installed(&mut self) -> Result<&[Plugin]> {
        if !self.cache().loaded {
            let discovered = self.discover()?;
            debug!("Discovered {} {} plugin(s)", discovered.len(), self.origin());
            let cache = self.cache_mut();
            cache.installed.extend(discovered);
            cache.loaded = true;
        }
        Ok(&self.cache().installed)
    }

    /// Records cached so far, without triggering discovery
    fn cached(&self) -> &[Plugin] {
        &self.cache().installed
    }

    /// Forget every cached record and the loaded flag
    fn clear(&mut self) {
        let cache = self.cache_mut();
        cache.installed.clear();
        cache.loaded = false;
    }
}

// ---------------------------------------------------------------------------
// Registered extensions
// ---------------------------------------------------------------------------

/// Package that owns a registered plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribution {
    pub name: &'static str,
    pub version: &'static str,
}

/// Entry in the process-wide extension registry
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint {
    pub group: &'static str,
    pub name: &'static str,
    pub distribution: Option<Distribution>,
    pub load: fn() -> PluginObject,
}

inventory::collect!(EntryPoint);

impl EntryPoint {
    #[must_use]
    pub const fn new(name: &'static str, load: fn() -> PluginObject) -> Self {
        Self {
            group: ENTRYPOINT,
            name,
            distribution: None,
            load,
        }
    }

    #[must_use]
    pub const fn in_group(mut self, group: &'static str) -> Self {
        self.group = group;
        self
    }

    #[must_use]
    pub const fn with_distribution(mut self, name: &'static str, version: &'static str) -> Self {
        self.distribution = Some(Distribution { name, version });
        self
    }

    /// Version of the owning distribution, `0.0.0` when there is none
    #[must_use]
    pub fn version(&self) -> &'static str {
        self.distribution.map_or("0.0.0", |dist| dist.version)
    }

    fn load_plugin(&self) -> Result<Plugin> {
        let plugin = Plugin::new(self.name, (self.load)())?
            .with_version(self.version())
            .with_origin(PluginOrigin::Entrypoint);
        debug!("Loaded entrypoint plugin {} ({})", self.name, self.version());
        Ok(plugin)
    }
}

/// Register a plugin against the [`ENTRYPOINT`] extension point.
///
/// ```rust,ignore
/// fn forum() -> deckhand::plugins::PluginObject {
///     deckhand::plugins::PluginObject::new().patches([("body", "<p>forum</p>")])
/// }
///
/// deckhand::register_plugin!("forum", forum, dist = ("deckhand-forum", "1.2.0"));
/// ```
#[macro_export]
macro_rules! register_plugin {
    ($name:expr, $load:expr, dist = ($dist:expr, $version:expr)) => {
        $crate::inventory::submit! {
            $crate::plugins::EntryPoint::new($name, $load).with_distribution($dist, $version)
        }
    };
    ($name:expr, $load:expr) => {
        $crate::inventory::submit! {
            $crate::plugins::EntryPoint::new($name, $load)
        }
    };
}

/// Loads every registered entry advertising [`ENTRYPOINT`]
#[derive(Debug, Default)]
pub struct EntrypointStrategy {
    entry_points: Option<Vec<EntryPoint>>,
    cache: StrategyCache,
}

impl EntrypointStrategy {
    /// Strategy reading the linked extension registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy reading a fixed list of entries instead of the linked registry
    #[must_use]
    pub fn with_entry_points(entry_points: Vec<EntryPoint>) -> Self {
        Self {
            entry_points: Some(entry_points),
            cache: StrategyCache::default(),
        }
    }
}

impl DiscoveryStrategy for EntrypointStrategy {
    fn origin(&self) -> PluginOrigin {
        PluginOrigin::Entrypoint
    }

    fn discover(&self) -> Result<Vec<Plugin>> {
        let entry_points: Vec<&EntryPoint> = match &self.entry_points {
            Some(entry_points) => entry_points.iter().collect(),
            None => inventory::iter::<EntryPoint>.into_iter().collect(),
        };

        entry_points
            .into_iter()
            .filter(|entry_point| entry_point.group == ENTRYPOINT)
            .map(EntryPoint::load_plugin)
            .collect()
    }

    fn cache(&self) -> &StrategyCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut StrategyCache {
        &mut self.cache
    }
}

// ---------------------------------------------------------------------------
// First-party plugins
// ---------------------------------------------------------------------------

/// A first-party plugin module linked into the binary
#[derive(Debug, Clone, Copy)]
pub struct FirstPartyModule {
    pub path: &'static str,
    pub load: fn() -> PluginObject,
}

inventory::collect!(FirstPartyModule);

/// Link a first-party plugin module under its conventional path.
///
/// ```rust,ignore
/// deckhand::register_first_party!("deckhandforum.plugin", forum::plugin);
/// ```
#[macro_export]
macro_rules! register_first_party {
    ($path:expr, $load:expr) => {
        $crate::inventory::submit! {
            $crate::plugins::FirstPartyModule { path: $path, load: $load }
        }
    };
}

/// Imports first-party plugin modules by path
pub trait ModuleResolver {
    fn import(&self, module: &str) -> Option<PluginObject>;
}

/// Resolves modules registered with [`register_first_party!`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedModules;

impl ModuleResolver for LinkedModules {
    fn import(&self, module: &str) -> Option<PluginObject> {
        inventory::iter::<FirstPartyModule>
            .into_iter()
            .find(|linked| linked.path == module)
            .map(|linked| (linked.load)())
    }
}

impl<F> ModuleResolver for F
where
    F: Fn(&str) -> Option<PluginObject>,
{
    fn import(&self, module: &str) -> Option<PluginObject> {
        self(module)
    }
}

/// Module path of the first-party plugin `name`
#[must_use]
pub fn first_party_module(name: &str) -> String {
    format!("{FIRST_PARTY_PREFIX}{name}.plugin")
}

/// First-party plugins, added only through [`FirstPartyStrategy::load`]
pub struct FirstPartyStrategy {
    resolver: Box<dyn ModuleResolver>,
    cache: StrategyCache,
}

impl FirstPartyStrategy {
    #[must_use]
    pub fn new(resolver: impl ModuleResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            cache: StrategyCache::default(),
        }
    }

    /// Import the module of plugin `name` and append its record to the
    /// installed list.
    ///
    /// # Errors
    /// Fails when the module is unknown, or its version attribute is missing
    /// or not a string.
    pub fn load(&mut self, name: &str) -> Result<&Plugin> {
        let module = first_party_module(name);
        let mut object = self
            .resolver
            .import(&module)
            .ok_or_else(|| PluginError::ModuleNotFound(module.clone()))?;
        let version = object
            .version
            .take()
            .ok_or_else(|| PluginError::MissingVersion(module.clone()))?;
        let version = expect_version(&module, version)?;

        let plugin = Plugin::new(name, object)?
            .with_version(version)
            .with_origin(PluginOrigin::FirstParty);
        info!("Loaded first-party plugin {} from {}", name, module);
        self.cache.installed.push(plugin);

        let last = self.cache.installed.len() - 1;
        Ok(&self.cache.installed[last])
    }
}

impl Default for FirstPartyStrategy {
    fn default() -> Self {
        Self::new(LinkedModules)
    }
}

impl DiscoveryStrategy for FirstPartyStrategy {
    fn origin(&self) -> PluginOrigin {
        PluginOrigin::FirstParty
    }

    /// First-party plugins are never discovered, only loaded by name
    fn discover(&self) -> Result<Vec<Plugin>> {
        Ok(Vec::new())
    }

    fn cache(&self) -> &StrategyCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut StrategyCache {
        &mut self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes() -> PluginObject {
        PluginObject::new()
            .version("2.1.0")
            .patches([("body", "<p>notes</p>")])
    }

    fn numeric_version() -> PluginObject {
        PluginObject::new().version(3)
    }

    fn resolver(module: &str) -> Option<PluginObject> {
        match module {
            "deckhandnotes.plugin" => Some(notes()),
            "deckhandbroken.plugin" => Some(numeric_version()),
            "deckhandunversioned.plugin" => Some(PluginObject::new()),
            _ => None,
        }
    }

    #[test]
    fn test_first_party_module_path() {
        assert_eq!(first_party_module("forum"), "deckhandforum.plugin");
    }

    #[test]
    fn test_first_party_discovery_is_noop() {
        let mut strategy = FirstPartyStrategy::new(resolver);
        assert!(strategy.installed().unwrap().is_empty());
        assert!(strategy.cache().is_loaded());
    }

    #[test]
    fn test_first_party_load_appends() {
        let mut strategy = FirstPartyStrategy::new(resolver);
        let plugin = strategy.load("notes").unwrap();
        assert_eq!(plugin.name(), "notes");
        assert_eq!(plugin.version().unwrap(), "2.1.0");
        assert_eq!(plugin.origin(), Some(PluginOrigin::FirstParty));

        let installed = strategy.installed().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].patches["body"], "<p>notes</p>");
    }

    #[test]
    fn test_first_party_version_must_be_string() {
        let mut strategy = FirstPartyStrategy::new(resolver);
        let err = strategy.load("broken").unwrap_err();
        assert!(matches!(err, PluginError::InvalidVersion { ref origin, .. } if origin == "deckhandbroken.plugin"));
        assert!(strategy.cached().is_empty());
    }

    #[test]
    fn test_first_party_missing_version() {
        let mut strategy = FirstPartyStrategy::new(resolver);
        assert!(matches!(
            strategy.load("unversioned"),
            Err(PluginError::MissingVersion(_))
        ));
    }

    #[test]
    fn test_first_party_unknown_module() {
        let mut strategy = FirstPartyStrategy::new(resolver);
        assert!(matches!(
            strategy.load("missing"),
            Err(PluginError::ModuleNotFound(module)) if module == "deckhandmissing.plugin"
        ));
    }

    #[test]
    fn test_entrypoint_versions() {
        let mut strategy = EntrypointStrategy::with_entry_points(vec![
            EntryPoint::new("notes", notes).with_distribution("deckhand-notes", "4.0.1"),
            EntryPoint::new("orphan", PluginObject::new),
        ]);
        let installed = strategy.installed().unwrap();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[0].version().unwrap(), "4.0.1");
        assert_eq!(installed[1].version().unwrap(), "0.0.0");
        assert_eq!(installed[1].origin(), Some(PluginOrigin::Entrypoint));
    }

    #[test]
    fn test_entrypoint_filters_group() {
        let mut strategy = EntrypointStrategy::with_entry_points(vec![
            EntryPoint::new("notes", notes),
            EntryPoint::new("other", notes).in_group("someone-else.v1"),
        ]);
        let names: Vec<_> = strategy
            .installed()
            .unwrap()
            .iter()
            .map(Plugin::name)
            .collect();
        assert_eq!(names, vec!["notes"]);
    }

    #[test]
    fn test_entrypoint_version_ignores_object_attribute() {
        let mut strategy = EntrypointStrategy::with_entry_points(vec![EntryPoint::new(
            "broken",
            numeric_version,
        )]);
        assert_eq!(strategy.installed().unwrap()[0].version().unwrap(), "0.0.0");
    }

    #[test]
    fn test_clear_resets_cache() {
        let mut strategy = EntrypointStrategy::with_entry_points(vec![EntryPoint::new(
            "notes", notes,
        )]);
        assert_eq!(strategy.installed().unwrap().len(), 1);
        strategy.clear();
        assert!(!strategy.cache().is_loaded());
        assert!(strategy.cached().is_empty());
        assert_eq!(strategy.installed().unwrap().len(), 1);
    }
}
