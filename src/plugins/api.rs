//! Plugin record and the source objects records are built from

use crate::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Variables contributed by a plugin to the global configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// New variables, stored under `<NAME>_<KEY>`
    #[serde(default)]
    pub add: BTreeMap<String, Value>,
    /// Overrides of existing global variables, keys used verbatim
    #[serde(default)]
    pub set: BTreeMap<String, Value>,
    /// Plugin-local defaults, stored under `<NAME>_<KEY>`
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
}

/// Services to run for one hook phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HookServices {
    /// Services run in sequence
    Services(Vec<String>),
    /// Per-service parameters
    Parameters(BTreeMap<String, String>),
}

impl From<Vec<String>> for HookServices {
    fn from(services: Vec<String>) -> Self {
        Self::Services(services)
    }
}

impl From<Vec<&str>> for HookServices {
    fn from(services: Vec<&str>) -> Self {
        Self::Services(services.into_iter().map(str::to_string).collect())
    }
}

impl From<BTreeMap<String, String>> for HookServices {
    fn from(parameters: BTreeMap<String, String>) -> Self {
        Self::Parameters(parameters)
    }
}

/// Handler behind a natively implemented plugin command
pub trait CommandHandler: Send + Sync {
    /// Run the command with its command-line arguments
    fn run(&self, args: &[String]) -> anyhow::Result<()>;

    /// One-line description shown in command listings
    fn about(&self) -> Option<&str> {
        None
    }
}

/// Command exposed by a plugin. Opaque to discovery and aggregation.
#[derive(Clone)]
pub enum PluginCommand {
    Native(Arc<dyn CommandHandler>),
    /// Command definition carried by a plugin file
    Declared(Value),
}

impl fmt::Debug for PluginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(handler) => f
                .debug_tuple("Native")
                .field(&handler.about().unwrap_or("<handler>"))
                .finish(),
            Self::Declared(value) => f.debug_tuple("Declared").field(value).finish(),
        }
    }
}

/// A contributed attribute: either a value or a zero-argument function
/// computing it.
///
/// Functions are invoked once, when the plugin record is built.
pub enum Contribution<T> {
    Value(T),
    Lazy(Box<dyn FnOnce() -> T + Send>),
}

impl<T> Contribution<T> {
    /// Compute the contributed value
    pub fn resolve(self) -> T {
        match self {
            Self::Value(value) => value,
            Self::Lazy(compute) => compute(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Contribution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// Source object a plugin record is built from.
///
/// Every attribute is optional; absent attributes default to an empty mapping
/// or `None`.
#[derive(Debug, Default)]
pub struct PluginObject {
    pub(crate) version: Option<Value>,
    pub(crate) config: Option<Contribution<PluginConfig>>,
    pub(crate) patches: Option<Contribution<BTreeMap<String, String>>>,
    pub(crate) hooks: Option<Contribution<BTreeMap<String, HookServices>>>,
    pub(crate) templates: Option<Contribution<Option<PathBuf>>>,
    pub(crate) command: Option<PluginCommand>,
}

impl PluginObject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Version attribute, read by strategies whose source carries one
    #[must_use]
    pub fn version(mut self, version: impl Into<Value>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn config(mut self, config: PluginConfig) -> Self {
        self.config = Some(Contribution::Value(config));
        self
    }

    #[must_use]
    pub fn config_with(mut self, compute: impl FnOnce() -> PluginConfig + Send + 'static) -> Self {
        self.config = Some(Contribution::Lazy(Box::new(compute)));
        self
    }

    #[must_use]
    pub fn patches<K, V>(mut self, patches: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let patches = patches
            .into_iter()
            .map(|(slot, content)| (slot.into(), content.into()))
            .collect();
        self.patches = Some(Contribution::Value(patches));
        self
    }

    #[must_use]
    pub fn patches_with(
        mut self,
        compute: impl FnOnce() -> BTreeMap<String, String> + Send + 'static,
    ) -> Self {
        self.patches = Some(Contribution::Lazy(Box::new(compute)));
        self
    }

    #[must_use]
    pub fn hooks<K, V>(mut self, hooks: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<HookServices>,
    {
        let hooks = hooks
            .into_iter()
            .map(|(phase, services)| (phase.into(), services.into()))
            .collect();
        self.hooks = Some(Contribution::Value(hooks));
        self
    }

    #[must_use]
    pub fn hooks_with(
        mut self,
        compute: impl FnOnce() -> BTreeMap<String, HookServices> + Send + 'static,
    ) -> Self {
        self.hooks = Some(Contribution::Lazy(Box::new(compute)));
        self
    }

    #[must_use]
    pub fn templates(mut self, root: impl Into<PathBuf>) -> Self {
        self.templates = Some(Contribution::Value(Some(root.into())));
        self
    }

    #[must_use]
    pub fn templates_with(
        mut self,
        compute: impl FnOnce() -> Option<PathBuf> + Send + 'static,
    ) -> Self {
        self.templates = Some(Contribution::Lazy(Box::new(compute)));
        self
    }

    #[must_use]
    pub fn command(mut self, command: PluginCommand) -> Self {
        self.command = Some(command);
        self
    }
}

/// Discovery strategy a plugin record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginOrigin {
    /// Loaded explicitly by name from a linked first-party module
    FirstParty,
    /// Registered against the extension point
    Entrypoint,
    /// Read from a plugin file
    Declarative,
}

impl fmt::Display for PluginOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FirstParty => "first-party",
            Self::Entrypoint => "entrypoint",
            Self::Declarative => "file",
        };
        f.write_str(label)
    }
}

/// One discovered plugin.
///
/// Records are complete once built; nothing mutates them afterwards.
#[derive(Debug, Clone)]
pub struct Plugin {
    name: String,
    version: Option<String>,
    origin: Option<PluginOrigin>,
    source: Option<PathBuf>,
    pub config: PluginConfig,
    pub patches: BTreeMap<String, String>,
    pub hooks: BTreeMap<String, HookServices>,
    pub templates_root: Option<PathBuf>,
    pub command: Option<PluginCommand>,
}

impl Plugin {
    /// Build a record from a name and a source object.
    ///
    /// Lazy attributes are resolved here. The record has no version until a
    /// strategy attaches one with [`Plugin::with_version`].
    pub fn new(name: impl Into<String>, object: PluginObject) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PluginError::EmptyName);
        }

        Ok(Self {
            name,
            version: None,
            origin: None,
            source: None,
            config: object.config.map(Contribution::resolve).unwrap_or_default(),
            patches: object.patches.map(Contribution::resolve).unwrap_or_default(),
            hooks: object.hooks.map(Contribution::resolve).unwrap_or_default(),
            templates_root: object.templates.and_then(Contribution::resolve),
            command: object.command,
        })
    }

    #[must_use]
    pub(crate) fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub(crate) fn with_origin(mut self, origin: PluginOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    #[must_use]
    pub(crate) fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin version.
    ///
    /// # Errors
    /// Returns [`PluginError::VersionNotImplemented`] for a record that no
    /// discovery strategy produced.
    pub fn version(&self) -> Result<&str> {
        self.version
            .as_deref()
            .ok_or_else(|| PluginError::VersionNotImplemented(self.name.clone()))
    }

    #[must_use]
    pub fn origin(&self) -> Option<PluginOrigin> {
        self.origin
    }

    /// File the record was read from, for declarative plugins
    #[must_use]
    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    /// Namespace a variable key with the upper-cased plugin name
    #[must_use]
    pub fn config_key(&self, key: &str) -> String {
        format!("{}_{}", self.name.to_uppercase(), key)
    }

    #[must_use]
    pub fn config_add(&self) -> &BTreeMap<String, Value> {
        &self.config.add
    }

    #[must_use]
    pub fn config_set(&self) -> &BTreeMap<String, Value> {
        &self.config.set
    }

    #[must_use]
    pub fn config_defaults(&self) -> &BTreeMap<String, Value> {
        &self.config.defaults
    }
}

/// Check that a version attribute is a string
pub(crate) fn expect_version(origin: &str, version: Value) -> Result<String> {
    match version {
        Value::String(version) => Ok(version),
        other => Err(PluginError::InvalidVersion {
            origin: origin.to_string(),
            found: describe_value(&other).to_string(),
        }),
    }
}

pub(crate) fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
