//! The plugin manager: discovery, dependency-ordered concurrent loading,
//! and lifecycle (load/unload/enable/disable).
//!
//! Plugins here are statically linked `Plugin` implementations (see
//! `plugin_trait.rs`), so "module exec" is construction-plus-`on_load`
//! rather than executing a dynamically discovered source file. A plugin is
//! only eligible to load if its directory's `plugin.toml` name has a
//! matching entry in the manager's compiled-in factory table, supplied by
//! whoever bootstraps the framework (`aviary_server`).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use aviary_bus::EventBus;
use aviary_domain::GenericEvent;
use aviary_perms::PermSystem;
use aviary_registry::Registry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::graph::DependencyGraph;
use crate::meta::{MANAGER_VERSION, PluginMeta};
use crate::plugin_trait::{Plugin, PluginContext};
use crate::state::{PluginLoadStatus, PluginMetrics, PluginState};

const DISABLED_SUFFIX: &str = ".disabled";
/// Default cap on simultaneously loading plugins within one layer.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 5;

/// Constructs a fresh `Plugin` instance. Compiled-in, registered by name at
/// bootstrap — the static-registry idiom spec.md's design notes call for in
/// place of dynamic module loading.
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Registry record for one discovered plugin (spec.md's `PluginEntry`).
#[derive(Clone)]
pub struct PluginEntry {
	pub name: String,
	pub meta: PluginMeta,
	pub state: PluginState,
	pub metrics: PluginMetrics,
	pub load_status: Option<PluginLoadStatus>,
	pub error_message: Option<String>,
	pub dependencies_met: bool,
	pub loaded_at: Option<f64>,
}

/// Report returned by `unload_all`: plugins that unloaded cleanly vs. those
/// whose `on_unload`/purge failed (best-effort shutdown continues past
/// individual failures).
#[derive(Debug, Default)]
pub struct UnloadAllReport {
	pub unloaded: Vec<String>,
	pub failed: Vec<(String, String)>,
}

struct CacheEntry {
	hash: u64,
	meta: PluginMeta,
}

/// Discovers, loads, and supervises plugins.
pub struct PluginManager {
	plugin_dir: PathBuf,
	bus: Arc<EventBus>,
	registry: Arc<Registry>,
	perms: Arc<PermSystem>,
	factories: DashMap<String, PluginFactory>,
	entries: DashMap<String, PluginEntry>,
	instances: DashMap<String, Arc<dyn Plugin>>,
	contexts: DashMap<String, Arc<PluginContext>>,
	graph: Mutex<DependencyGraph>,
	parse_cache: DashMap<PathBuf, CacheEntry>,
	load_semaphore: Arc<Semaphore>,
}

impl PluginManager {
	pub fn new(plugin_dir: impl Into<PathBuf>, bus: Arc<EventBus>, registry: Arc<Registry>, perms: Arc<PermSystem>) -> Arc<Self> {
		Self::with_max_concurrent_loads(plugin_dir, bus, registry, perms, DEFAULT_MAX_CONCURRENT_LOADS)
	}

	pub fn with_max_concurrent_loads(plugin_dir: impl Into<PathBuf>, bus: Arc<EventBus>, registry: Arc<Registry>, perms: Arc<PermSystem>, max_concurrent_loads: usize) -> Arc<Self> {
		Arc::new(Self {
			plugin_dir: plugin_dir.into(),
			bus,
			registry,
			perms,
			factories: DashMap::new(),
			entries: DashMap::new(),
			instances: DashMap::new(),
			contexts: DashMap::new(),
			graph: Mutex::new(DependencyGraph::new()),
			parse_cache: DashMap::new(),
			load_semaphore: Arc::new(Semaphore::new(max_concurrent_loads.max(1))),
		})
	}

	/// Register a compiled-in plugin constructor under `name`. Must be
	/// called before `discover`/`load_all` for that plugin to be loadable.
	pub fn register_factory(&self, name: impl Into<String>, factory: PluginFactory) {
		self.factories.insert(name.into(), factory);
	}

	pub fn entry(&self, name: &str) -> Option<PluginEntry> {
		self.entries.get(name).map(|e| e.clone())
	}

	pub fn entries(&self) -> Vec<PluginEntry> {
		self.entries.iter().map(|e| e.clone()).collect()
	}

	/// Scan `plugin_dir` for immediate subdirectories containing a
	/// `plugin.toml`. Directories named with a `.disabled` suffix are
	/// recorded (state `Disabled`) but excluded from dependency resolution
	/// and loading.
	pub fn discover(&self) -> Result<(), PluginError> {
		self.graph.lock().clear_and_reset();
		let read_dir = match std::fs::read_dir(&self.plugin_dir) {
			Ok(rd) => rd,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(dir = %self.plugin_dir.display(), "plugin directory does not exist, nothing to discover");
				return Ok(());
			}
			Err(e) => return Err(PluginError::Io(e)),
		};

		let mut discovered: Vec<(String, PathBuf, bool)> = Vec::new();
		for entry in read_dir {
			let entry = entry.map_err(PluginError::Io)?;
			if !entry.file_type().map_err(PluginError::Io)?.is_dir() {
				continue;
			}
			let dir_name = entry.file_name().to_string_lossy().to_string();
			let disabled = dir_name.ends_with(DISABLED_SUFFIX);
			let manifest = entry.path().join("plugin.toml");
			if !manifest.exists() {
				continue;
			}
			discovered.push((dir_name, manifest, disabled));
		}

		for (dir_name, manifest, disabled) in discovered {
			let meta = match self.parse_cached(&manifest) {
				Ok(meta) => meta,
				Err(e) => {
					warn!(plugin = %dir_name, error = %e, "failed to parse plugin metadata, skipping");
					continue;
				}
			};

			{
				let mut graph = self.graph.lock();
				graph.add_plugin(&meta.name);
				for dep in &meta.dependencies {
					graph.add_dependency(&meta.name, dep);
				}
			}

			let state = if disabled { PluginState::Disabled } else { PluginState::Unloaded };
			self.entries.insert(
				meta.name.clone(),
				PluginEntry {
					name: meta.name.clone(),
					meta,
					state,
					metrics: PluginMetrics::default(),
					load_status: None,
					error_message: None,
					dependencies_met: true,
					loaded_at: None,
				},
			);
		}

		// Flag entries whose declared dependency was never discovered at all.
		let known: std::collections::HashSet<String> = self.entries.iter().map(|e| e.key().clone()).collect();
		for mut entry in self.entries.iter_mut() {
			let unmet = entry.meta.dependencies.iter().any(|d| !known.contains(d));
			if unmet {
				warn!(plugin = %entry.name, "declares a dependency that was never discovered");
				entry.dependencies_met = false;
			}
		}

		Ok(())
	}

	fn parse_cached(&self, manifest: &Path) -> Result<PluginMeta, PluginError> {
		let raw = std::fs::read_to_string(manifest).map_err(PluginError::Io)?;
		let mut hasher = DefaultHasher::new();
		raw.hash(&mut hasher);
		let hash = hasher.finish();

		if let Some(cached) = self.parse_cache.get(manifest) {
			if cached.hash == hash {
				return Ok(cached.meta.clone());
			}
		}

		let meta = PluginMeta::parse(manifest)?;
		self.parse_cache.insert(manifest.to_path_buf(), CacheEntry { hash, meta: meta.clone() });
		Ok(meta)
	}

	/// Discover, then load every enabled plugin in dependency-ordered
	/// concurrent layers. A cycle aborts loading only for the plugins
	/// participating in it — see `DESIGN.md`.
	pub async fn load_all(self: &Arc<Self>) -> Result<(), PluginError> {
		self.discover()?;

		let layers = match self.graph.lock().layers() {
			Ok(layers) => layers,
			Err(PluginError::Cycle) => {
				warn!("dependency graph contains a cycle; no participating plugin will load");
				self.mark_cycle_participants();
				return Ok(());
			}
			Err(e) => return Err(e),
		};

		for layer in layers {
			let loadable: Vec<String> = layer
				.into_iter()
				.filter(|name| matches!(self.entries.get(name).map(|e| e.state), Some(PluginState::Unloaded)))
				.collect();
			if loadable.is_empty() {
				continue;
			}

			debug!(layer = ?loadable, "loading plugin layer");
			let futs = loadable.into_iter().map(|name| {
				let this = Arc::clone(self);
				async move { this.load_one(&name).await }
			});
			futures::future::join_all(futs).await;
		}

		Ok(())
	}

	/// Any plugin whose dependency chain contains a cycle can never reach a
	/// zero-in-degree layer; `layers()` already refuses the whole graph in
	/// that case, so conservatively mark every undiscovered-as-loaded entry
	/// `dependencies_met = false` and leave it `Unloaded` (never `Loaded`).
	fn mark_cycle_participants(&self) {
		for mut entry in self.entries.iter_mut() {
			if entry.state == PluginState::Unloaded {
				entry.dependencies_met = false;
			}
		}
	}

	async fn load_one(self: &Arc<Self>, name: &str) -> Result<(), PluginError> {
		let _permit = self.load_semaphore.acquire().await.expect("semaphore never closed");

		let Some(mut entry) = self.entries.get_mut(name).map(|e| e.clone()) else {
			return Err(PluginError::NotFound(name.to_string()));
		};

		let deps_ok = entry.meta.dependencies.iter().all(|d| matches!(self.entries.get(d).map(|e| e.state), Some(PluginState::Loaded)));
		if !deps_ok {
			warn!(plugin = name, "a dependency failed to load; marking unloadable");
			self.set_entry(name, |e| {
				e.dependencies_met = false;
				e.state = PluginState::Error;
				e.load_status = Some(PluginLoadStatus::DependencyFailed);
			});
			return Ok(());
		}

		self.set_entry(name, |e| e.state = PluginState::Loading);

		if !entry.meta.is_compatible() {
			let err = PluginError::Incompatible { plugin: name.to_string(), required: entry.meta.compatibility, running: MANAGER_VERSION };
			warn!(plugin = name, error = %err, "plugin incompatible, skipping");
			self.set_entry(name, |e| {
				e.state = PluginState::Error;
				e.load_status = Some(PluginLoadStatus::Failed);
				e.error_message = Some(err.to_string());
			});
			return Ok(());
		}

		let Some(factory) = self.factories.get(name).map(|f| f.clone()) else {
			let err = PluginError::NoImplementation(name.to_string());
			warn!(plugin = name, error = %err, "skipping");
			self.set_entry(name, |e| {
				e.state = PluginState::Error;
				e.load_status = Some(PluginLoadStatus::Failed);
				e.error_message = Some(err.to_string());
			});
			return Ok(());
		};

		let ctx = Arc::new(PluginContext::new(name.to_string(), Arc::clone(&self.bus), Arc::clone(&self.registry), Arc::clone(&self.perms)));

		let start = Instant::now();
		let built = tokio::task::spawn_blocking(move || factory()).await;
		let plugin: Box<dyn Plugin> = match built {
			Ok(p) => p,
			Err(e) => {
				let panic_msg = e.try_into_panic().map(|p| panic_message(&p)).unwrap_or_else(|_| "task cancelled".to_string());
				self.fail_load(name, &ctx, "construction", anyhow::anyhow!(panic_msg));
				return Ok(());
			}
		};
		let plugin: Arc<dyn Plugin> = Arc::from(plugin);

		if let Err(e) = plugin.on_load(&ctx).await {
			self.fail_load(name, &ctx, "on_load", e);
			return Ok(());
		}

		let elapsed = start.elapsed().as_secs_f64();
		self.instances.insert(name.to_string(), plugin);
		self.contexts.insert(name.to_string(), ctx);
		self.set_entry(name, |e| {
			e.state = PluginState::Loaded;
			e.load_status = Some(PluginLoadStatus::Success);
			e.error_message = None;
			e.loaded_at = Some(aviary_util::time::unix_time_secs());
			e.metrics.record_load(elapsed);
		});

		info!(plugin = name, version = %entry.meta.version, elapsed_secs = elapsed, "plugin loaded");
		self.bus
			.publish(Arc::new(GenericEvent::new("plugin_loaded", "core").with_data(json!({
				"plugin_name": name,
				"plugin_version": entry.meta.version,
				"timestamp": aviary_util::time::unix_time_secs(),
			}))))
			.await;

		Ok(())
	}

	fn fail_load(&self, name: &str, ctx: &Arc<PluginContext>, phase: &'static str, source: anyhow::Error) {
		let err = PluginError::Runtime { plugin: name.to_string(), phase, source };
		warn!(plugin = name, error = %err, "plugin failed to load");
		ctx.purge();
		let message = err.to_string();
		self.set_entry(name, |e| {
			e.state = PluginState::Error;
			e.load_status = Some(PluginLoadStatus::Failed);
			e.metrics.record_error(message.clone());
			e.error_message = Some(message);
		});
	}

	fn set_entry(&self, name: &str, f: impl FnOnce(&mut PluginEntry)) {
		if let Some(mut e) = self.entries.get_mut(name) {
			f(&mut e);
		}
	}

	/// Unload a single plugin. Refuses if any currently-loaded plugin still
	/// depends on it.
	pub async fn unload(&self, name: &str) -> Result<(), PluginError> {
		let dependents: Vec<String> = self
			.graph
			.lock()
			.dependents(name)
			.into_iter()
			.filter(|d| matches!(self.entries.get(d).map(|e| e.state), Some(PluginState::Loaded)))
			.collect();
		if !dependents.is_empty() {
			return Err(PluginError::DependentsExist(name.to_string(), dependents));
		}

		let Some(plugin) = self.instances.get(name).map(|p| p.clone()) else {
			return Err(PluginError::NotFound(name.to_string()));
		};
		let Some(ctx) = self.contexts.get(name).map(|c| c.clone()) else {
			return Err(PluginError::NotFound(name.to_string()));
		};

		if let Err(e) = plugin.on_unload(&ctx).await {
			warn!(plugin = name, error = %e, "on_unload hook failed; purging registrations anyway");
		}
		ctx.purge();

		self.instances.remove(name);
		self.contexts.remove(name);
		self.set_entry(name, |e| {
			e.state = PluginState::Unloaded;
			e.metrics.record_unload();
		});
		info!(plugin = name, "plugin unloaded");
		Ok(())
	}

	/// Unload every loaded plugin in reverse dependency-layer order
	/// (dependents before dependencies), best-effort: a failure in one
	/// plugin does not block unloading the rest.
	pub async fn unload_all(&self) -> UnloadAllReport {
		let layers = match self.graph.lock().layers() {
			Ok(layers) => layers,
			Err(_) => vec![self.entries.iter().map(|e| e.key().clone()).collect()],
		};

		let mut report = UnloadAllReport::default();
		for layer in layers.into_iter().rev() {
			for name in layer {
				if !matches!(self.entries.get(&name).map(|e| e.state), Some(PluginState::Loaded)) {
					continue;
				}
				match self.unload(&name).await {
					Ok(()) => report.unloaded.push(name),
					Err(e) => report.failed.push((name, e.to_string())),
				}
			}
		}
		report
	}

	/// Disable a plugin by renaming its directory to carry a `.disabled`
	/// suffix. Unloads first if currently loaded.
	pub async fn disable(&self, name: &str) -> Result<(), PluginError> {
		let Some(entry) = self.entries.get(name).map(|e| e.clone()) else {
			return Err(PluginError::NotFound(name.to_string()));
		};

		if entry.state == PluginState::Loaded {
			self.unload(name).await?;
		}

		let from = entry.meta.path.clone();
		let to = from.with_file_name(format!("{}{DISABLED_SUFFIX}", dir_file_name(&from)));
		std::fs::rename(&from, &to).map_err(PluginError::Io)?;
		self.parse_cache.remove(&from.join("plugin.toml"));

		self.set_entry(name, |e| {
			e.state = PluginState::Disabled;
			e.meta.path = to.clone();
		});
		info!(plugin = name, "plugin disabled");
		Ok(())
	}

	/// Re-enable a disabled plugin by stripping the `.disabled` suffix.
	/// Does not load it — a subsequent `load_all`/`discover` pass does that.
	pub async fn enable(&self, name: &str) -> Result<(), PluginError> {
		let Some(entry) = self.entries.get(name).map(|e| e.clone()) else {
			return Err(PluginError::NotFound(name.to_string()));
		};

		let from = entry.meta.path.clone();
		let stem = dir_file_name(&from);
		let Some(base) = stem.strip_suffix(DISABLED_SUFFIX) else {
			debug!(plugin = name, "enable on an already-enabled plugin is a no-op");
			return Ok(());
		};
		let to = from.with_file_name(base);
		std::fs::rename(&from, &to).map_err(PluginError::Io)?;
		self.parse_cache.remove(&from.join("plugin.toml"));

		self.set_entry(name, |e| {
			e.state = PluginState::Enabled;
			e.meta.path = to.clone();
		});
		info!(plugin = name, "plugin enabled (not yet loaded)");
		Ok(())
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"plugin construction panicked".to_string()
	}
}

fn dir_file_name(path: &Path) -> String {
	path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use async_trait::async_trait;

	use super::*;

	struct CountingPlugin {
		load_count: Arc<AtomicU32>,
		fail: bool,
	}

	#[async_trait]
	impl Plugin for CountingPlugin {
		async fn on_load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
			if self.fail {
				anyhow::bail!("simulated load failure");
			}
			self.load_count.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn write_manifest(dir: &Path, name: &str, deps: &[&str]) {
		std::fs::create_dir_all(dir).unwrap();
		let deps_toml = deps.iter().map(|d| format!("\"{d}\"")).collect::<Vec<_>>().join(", ");
		std::fs::write(dir.join("plugin.toml"), format!("name = \"{name}\"\ndependencies = [{deps_toml}]\n")).unwrap();
	}

	fn harness() -> (tempfile::TempDir, Arc<PluginManager>) {
		let dir = tempfile::tempdir().unwrap();
		let perm_path = dir.path().join("test.perms");
		let bus = EventBus::new();
		let perms = Arc::new(PermSystem::load(&perm_path).unwrap());
		let registry = Registry::new(Arc::clone(&bus), perms.clone());
		let mgr = PluginManager::new(dir.path().join("plugins"), bus, registry, perms);
		(dir, mgr)
	}

	#[tokio::test]
	async fn dependency_layering_loads_dependency_before_dependents() {
		let (dir, mgr) = harness();
		let plugins_dir = dir.path().join("plugins");
		write_manifest(&plugins_dir.join("a"), "a", &[]);
		write_manifest(&plugins_dir.join("b"), "b", &["a"]);
		write_manifest(&plugins_dir.join("c"), "c", &["a"]);

		let counter = Arc::new(AtomicU32::new(0));
		for name in ["a", "b", "c"] {
			let counter = Arc::clone(&counter);
			mgr.register_factory(name, Arc::new(move || Box::new(CountingPlugin { load_count: Arc::clone(&counter), fail: false }) as Box<dyn Plugin>));
		}

		mgr.load_all().await.unwrap();

		assert_eq!(counter.load(Ordering::SeqCst), 3);
		assert_eq!(mgr.entry("a").unwrap().state, PluginState::Loaded);
		assert_eq!(mgr.entry("b").unwrap().state, PluginState::Loaded);
		assert_eq!(mgr.entry("c").unwrap().state, PluginState::Loaded);
	}

	#[tokio::test]
	async fn dependency_failure_marks_dependents_unloadable() {
		let (dir, mgr) = harness();
		let plugins_dir = dir.path().join("plugins");
		write_manifest(&plugins_dir.join("a"), "a", &[]);
		write_manifest(&plugins_dir.join("b"), "b", &["a"]);

		let counter = Arc::new(AtomicU32::new(0));
		mgr.register_factory("a", Arc::new({
			let counter = Arc::clone(&counter);
			move || Box::new(CountingPlugin { load_count: Arc::clone(&counter), fail: true }) as Box<dyn Plugin>
		}));
		mgr.register_factory("b", Arc::new({
			let counter = Arc::clone(&counter);
			move || Box::new(CountingPlugin { load_count: Arc::clone(&counter), fail: false }) as Box<dyn Plugin>
		}));

		mgr.load_all().await.unwrap();

		assert_eq!(mgr.entry("a").unwrap().state, PluginState::Error);
		let b = mgr.entry("b").unwrap();
		assert_eq!(b.state, PluginState::Error);
		assert!(!b.dependencies_met);
		assert_eq!(counter.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn self_dependency_cycle_never_loads() {
		let (dir, mgr) = harness();
		let plugins_dir = dir.path().join("plugins");
		write_manifest(&plugins_dir.join("a"), "a", &["a"]);

		mgr.register_factory("a", Arc::new(|| Box::new(CountingPlugin { load_count: Arc::new(AtomicU32::new(0)), fail: false }) as Box<dyn Plugin>));

		mgr.load_all().await.unwrap();
		assert_eq!(mgr.entry("a").unwrap().state, PluginState::Unloaded);
	}

	#[tokio::test]
	async fn disabled_directory_is_discovered_but_not_loaded() {
		let (dir, mgr) = harness();
		let plugins_dir = dir.path().join("plugins");
		write_manifest(&plugins_dir.join("a.disabled"), "a", &[]);

		mgr.register_factory("a", Arc::new(|| Box::new(CountingPlugin { load_count: Arc::new(AtomicU32::new(0)), fail: false }) as Box<dyn Plugin>));

		mgr.load_all().await.unwrap();
		assert_eq!(mgr.entry("a").unwrap().state, PluginState::Disabled);
	}

	#[tokio::test]
	async fn unload_refuses_while_a_loaded_dependent_exists() {
		let (dir, mgr) = harness();
		let plugins_dir = dir.path().join("plugins");
		write_manifest(&plugins_dir.join("a"), "a", &[]);
		write_manifest(&plugins_dir.join("b"), "b", &["a"]);

		for name in ["a", "b"] {
			mgr.register_factory(name, Arc::new(|| Box::new(CountingPlugin { load_count: Arc::new(AtomicU32::new(0)), fail: false }) as Box<dyn Plugin>));
		}
		mgr.load_all().await.unwrap();

		let err = mgr.unload("a").await.unwrap_err();
		assert!(matches!(err, PluginError::DependentsExist(_, _)));
	}

	#[tokio::test]
	async fn enable_disable_cycle_preserves_reloadability() {
		let (dir, mgr) = harness();
		let plugins_dir = dir.path().join("plugins");
		write_manifest(&plugins_dir.join("a"), "a", &[]);
		mgr.register_factory("a", Arc::new(|| Box::new(CountingPlugin { load_count: Arc::new(AtomicU32::new(0)), fail: false }) as Box<dyn Plugin>));

		mgr.load_all().await.unwrap();
		assert_eq!(mgr.entry("a").unwrap().state, PluginState::Loaded);

		mgr.disable("a").await.unwrap();
		assert_eq!(mgr.entry("a").unwrap().state, PluginState::Disabled);

		mgr.enable("a").await.unwrap();
		assert_eq!(mgr.entry("a").unwrap().state, PluginState::Enabled);

		mgr.discover().unwrap();
		mgr.load_all().await.unwrap();
		assert_eq!(mgr.entry("a").unwrap().state, PluginState::Loaded);
	}
}
