//! Bootstrap configuration: loaded from `./config.json`, following the
//! teacher's `chatty_server::config::mod` split (a loose `FileConfig`
//! deserialization shape feeding a validated runtime `Config`). Unlike the
//! teacher, the file format is JSON, not TOML, and the path is a literal
//! external contract (`original_source/Coral/core.py::CONFIG_FILE`), not a
//! per-user home-directory default.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// The framework's permission-manager compatibility stamp, written back
/// into `config.json` on every bootstrap alongside `coral_version` and
/// `last_init_time`. Plugins read these but never write them.
pub const CORAL_VERSION: &str = "0.1.0";

pub const DEFAULT_CONFIG_PATH: &str = "./config.json";
const DEFAULT_WEBSOCKET_PORT: u16 = 21050;
const DEFAULT_PLUGIN_DIR: &str = "./plugins";
const DEFAULT_PERM_FILE: &str = "./coral.perms";

/// Validated bootstrap configuration. `raw` retains every key from the file
/// verbatim (including the `dashboard` block and any `<name>_adapter`/
/// `<name>_driver` per-component maps) so unrecognized/out-of-core keys
/// round-trip through a save unmodified.
#[derive(Debug, Clone)]
pub struct Config {
	pub websocket_port: u16,
	pub self_id: String,
	pub plugin_dir: PathBuf,
	pub perm_file: PathBuf,
	pub index_url: Option<String>,
	pub metrics_bind: Option<String>,
	raw: Map<String, Value>,
}

impl Config {
	/// Fetch a per-component config block, e.g. `component("reversews",
	/// "driver")` reads the `reversews_driver` key. Missing keys default to
	/// an empty object, matching `original_source`'s `config.get(name +
	/// "_driver", {})`.
	pub fn component(&self, name: &str, suffix: &str) -> Value {
		self.raw.get(&format!("{name}_{suffix}")).cloned().unwrap_or_else(|| Value::Object(Map::new()))
	}

	fn from_file(file: FileConfig, raw: Map<String, Value>) -> Self {
		Self {
			websocket_port: file.websocket_port.unwrap_or(DEFAULT_WEBSOCKET_PORT),
			self_id: stringify_self_id(file.self_id),
			plugin_dir: file.plugin_dir.filter(|s| !s.trim().is_empty()).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGIN_DIR)),
			perm_file: file.perm_file.filter(|s| !s.trim().is_empty()).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_PERM_FILE)),
			index_url: file.index_url.filter(|s| !s.trim().is_empty()),
			metrics_bind: file.metrics_bind.filter(|s| !s.trim().is_empty()),
			raw,
		}
	}

	/// Re-serialize, stamping the framework-written keys
	/// (`coral_version`/`pluginmanager_version`/`last_init_time`) and
	/// persisting every recognized field back alongside the untouched
	/// passthrough keys (`dashboard`, `*_adapter`, `*_driver`, ...).
	fn to_file_value(&self, pluginmanager_version: i64) -> Value {
		let mut out = self.raw.clone();
		out.insert("websocket_port".to_string(), Value::from(self.websocket_port));
		out.insert("self_id".to_string(), Value::String(self.self_id.clone()));
		out.insert("plugin_dir".to_string(), Value::String(self.plugin_dir.display().to_string()));
		out.insert("perm_file".to_string(), Value::String(self.perm_file.display().to_string()));
		if let Some(index_url) = &self.index_url {
			out.insert("index_url".to_string(), Value::String(index_url.clone()));
		}
		out.insert("coral_version".to_string(), Value::String(CORAL_VERSION.to_string()));
		out.insert("pluginmanager_version".to_string(), Value::from(pluginmanager_version));
		out.insert("last_init_time".to_string(), Value::from(aviary_util::time::unix_time_secs()));
		Value::Object(out)
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	websocket_port: Option<u16>,
	#[serde(default)]
	self_id: Option<Value>,
	plugin_dir: Option<String>,
	perm_file: Option<String>,
	index_url: Option<String>,
	metrics_bind: Option<String>,
}

/// `self_id` is a string or a number on the wire; stringify either shape so
/// callers never special-case numeric ids.
fn stringify_self_id(v: Option<Value>) -> String {
	match v {
		Some(Value::String(s)) => s,
		Some(other) => other.to_string(),
		None => "unknown".to_string(),
	}
}

fn read_json_if_exists(path: &Path) -> anyhow::Result<Option<Map<String, Value>>> {
	match std::fs::read_to_string(path) {
		Ok(s) => {
			let value: Value = serde_json::from_str(&s)?;
			match value {
				Value::Object(map) => Ok(Some(map)),
				_ => Err(anyhow::anyhow!("config.json must contain a JSON object")),
			}
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e.into()),
	}
}

/// Load `config.json`, applying env overrides, and immediately persist the
/// resolved config back to disk (stamping the framework-written keys),
/// matching `original_source`'s "missing config creates a default and
/// writes it" behavior.
pub fn load_config_from_path(path: &Path, pluginmanager_version: i64) -> anyhow::Result<Config> {
	let raw = read_json_if_exists(path)?.unwrap_or_else(|| {
		warn!(path = %path.display(), "config file not found, starting from defaults");
		Map::new()
	});

	let file: FileConfig = serde_json::from_value(Value::Object(raw.clone()))?;
	let mut cfg = Config::from_file(file, raw);
	apply_env_overrides(&mut cfg);

	let stamped = cfg.to_file_value(pluginmanager_version);
	let bytes = serde_json::to_vec_pretty(&stamped)?;
	aviary_util::atomic_file::write_atomic(path, &bytes)?;

	Ok(cfg)
}

fn apply_env_overrides(cfg: &mut Config) {
	if let Ok(v) = std::env::var("AVIARY_WEBSOCKET_PORT")
		&& let Ok(port) = v.trim().parse::<u16>()
	{
		cfg.websocket_port = port;
		info!(port, "config: websocket_port overridden by env");
	}

	if let Ok(v) = std::env::var("AVIARY_SELF_ID") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.self_id = v;
			info!("config: self_id overridden by env");
		}
	}

	if let Ok(v) = std::env::var("AVIARY_PLUGIN_DIR") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.plugin_dir = PathBuf::from(v);
			info!("config: plugin_dir overridden by env");
		}
	}

	if let Ok(v) = std::env::var("AVIARY_PERM_FILE") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.perm_file = PathBuf::from(v);
			info!("config: perm_file overridden by env");
		}
	}

	if let Ok(v) = std::env::var("AVIARY_INDEX_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.index_url = Some(v);
			info!("config: index_url overridden by env");
		}
	}

	if let Ok(v) = std::env::var("AVIARY_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.metrics_bind = Some(v);
			info!("config: metrics_bind overridden by env");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_file_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");

		let cfg = load_config_from_path(&path, 250606).unwrap();
		assert_eq!(cfg.websocket_port, DEFAULT_WEBSOCKET_PORT);
		assert_eq!(cfg.self_id, "unknown");
		assert_eq!(cfg.plugin_dir, PathBuf::from(DEFAULT_PLUGIN_DIR));

		// defaults get written back, matching the original's "creates default config" behavior
		assert!(path.exists());
	}

	#[test]
	fn numeric_self_id_is_stringified() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"self_id": 123456789, "websocket_port": 8080}"#).unwrap();

		let cfg = load_config_from_path(&path, 250606).unwrap();
		assert_eq!(cfg.self_id, "123456789");
		assert_eq!(cfg.websocket_port, 8080);
	}

	#[test]
	fn passthrough_keys_round_trip_through_a_reload() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"dashboard": {"enable": true, "port": 8765}, "console_driver": {"prompt": "> "}}"#).unwrap();

		let cfg = load_config_from_path(&path, 250606).unwrap();
		assert_eq!(cfg.component("console", "driver"), serde_json::json!({"prompt": "> "}));

		let reloaded = load_config_from_path(&path, 250606).unwrap();
		assert_eq!(reloaded.component("console", "driver"), serde_json::json!({"prompt": "> "}));
	}

	#[test]
	fn missing_component_config_defaults_to_empty_object() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		let cfg = load_config_from_path(&path, 250606).unwrap();
		assert_eq!(cfg.component("reversews", "driver"), serde_json::json!({}));
	}
}
