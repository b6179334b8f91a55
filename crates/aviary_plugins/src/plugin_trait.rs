//! The `Plugin` contract: since plugins here are statically linked Rust
//! types rather than dynamically executed modules (see `DESIGN.md`), a
//! plugin's "module exec" step is simply constructing its `Plugin` impl and
//! calling `on_load`; there is no separate worker-thread exec phase.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aviary_bus::EventBus;
use aviary_perms::PermSystem;
use aviary_registry::Registry;

/// Hooks a plugin implements. `on_unload` defaults to a no-op for plugins
/// that register nothing needing explicit teardown beyond what
/// `PluginContext`'s ownership tracking already purges.
#[async_trait]
pub trait Plugin: Send + Sync {
	async fn on_load(&self, ctx: &PluginContext) -> anyhow::Result<()>;

	async fn on_unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
		Ok(())
	}
}

/// What a plugin registered through its context, so the manager can purge
/// it on unload without the registry needing to track ownership itself.
enum Owned {
	Command(String),
	Function(String),
	Event(String, String),
}

/// Handed to a plugin's hooks. Wraps the shared subsystems and records
/// every registration the plugin makes, so `PluginManager::unload` can
/// purge them without the plugin needing its own teardown logic.
pub struct PluginContext {
	pub bus: Arc<EventBus>,
	pub registry: Arc<Registry>,
	pub perms: Arc<PermSystem>,
	plugin_name: String,
	owned: Mutex<Vec<Owned>>,
}

impl PluginContext {
	pub fn new(plugin_name: impl Into<String>, bus: Arc<EventBus>, registry: Arc<Registry>, perms: Arc<PermSystem>) -> Self {
		Self { bus, registry, perms, plugin_name: plugin_name.into(), owned: Mutex::new(Vec::new()) }
	}

	pub fn plugin_name(&self) -> &str {
		&self.plugin_name
	}

	/// Register a command and remember it belongs to this plugin.
	pub fn register_command<H>(&self, name: impl Into<String>, handler: H, permission: Option<Vec<String>>)
	where
		H: aviary_registry::CommandHandler + 'static,
	{
		let name = name.into();
		self.registry.register_command(name.clone(), handler, permission);
		self.owned.lock().unwrap().push(Owned::Command(name));
	}

	/// Register a named function and remember it belongs to this plugin.
	pub fn register_function<H>(&self, name: impl Into<String>, handler: H) -> Result<(), aviary_registry::RegistryError>
	where
		H: aviary_registry::FunctionHandler + 'static,
	{
		let name = name.into();
		self.registry.register_function(name.clone(), handler)?;
		self.owned.lock().unwrap().push(Owned::Function(name));
		Ok(())
	}

	/// Register an event listener and remember it belongs to this plugin.
	pub fn register_event<H, Fut>(&self, event_name: impl Into<String>, handler: H, priority: i32) -> Result<(), aviary_registry::RegistryError>
	where
		H: Fn(Arc<aviary_domain::GenericEvent>) -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
	{
		let event_name = event_name.into();
		let listener_name = self.plugin_name.clone();
		self.registry.register_event(event_name.clone(), listener_name.clone(), handler, priority)?;
		self.owned.lock().unwrap().push(Owned::Event(event_name, listener_name));
		Ok(())
	}

	/// Purge every registration this plugin made. Called by the manager
	/// after `on_unload` returns.
	pub(crate) fn purge(&self) {
		for owned in self.owned.lock().unwrap().drain(..) {
			match owned {
				Owned::Command(name) => self.registry.unregister_command(&name),
				Owned::Function(name) => self.registry.unregister_function(&name),
				Owned::Event(event_name, listener_name) => self.registry.unregister_event(&event_name, &listener_name),
			}
		}
	}
}
