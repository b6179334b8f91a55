#![forbid(unsafe_code)]
//! Plugin discovery, dependency-ordered loading, and lifecycle management.
//!
//! A plugin is a statically linked [`Plugin`] implementation, discovered via
//! a `plugin.toml` sidecar manifest next to it on disk (see `meta.rs` for why
//! this differs from the original's source-scanning approach). The
//! [`PluginManager`] owns discovery, the dependency DAG, layered concurrent
//! loading, and enable/disable-by-rename.

mod error;
mod graph;
mod manager;
mod meta;
mod plugin_trait;
mod state;

pub use error::PluginError;
pub use graph::DependencyGraph;
pub use manager::{DEFAULT_MAX_CONCURRENT_LOADS, PluginEntry, PluginFactory, PluginManager, UnloadAllReport};
pub use meta::{MANAGER_VERSION, PluginMeta};
pub use plugin_trait::{Plugin, PluginContext};
pub use state::{PluginLoadStatus, PluginMetrics, PluginState};
