//! Deckhand - plugin subsystem of the deckhand deployment tool
//!
//! This library discovers installable plugins from several sources, keeps a
//! deduplicated registry of them, and aggregates the contributions of the
//! enabled ones for template rendering, hook execution and configuration.
//!
//! # Modules
//!
//! - [`config`]: Global configuration mapping and plugin root resolution
//! - [`plugins`]: Plugin records, discovery strategies, registry and aggregation
//! - [`error`]: Error types shared by the plugin subsystem

pub mod config;
pub mod error;
pub mod plugins;

#[doc(hidden)]
pub use inventory;
