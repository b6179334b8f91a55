//! Plugin metadata, sourced from a `plugin.toml` sidecar manifest rather
//! than from parsing plugin source — see `DESIGN.md` for why: this crate's
//! plugins are statically linked `Plugin` trait implementations, not
//! dynamically executed modules, so there is no source file to statically
//! analyze for a `__plugin_meta__` literal the way the original does.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PluginError;

/// The plugin-manager protocol/feature version this build implements.
/// `PluginMeta::compatibility` must be `>=` this for a plugin to load.
pub const MANAGER_VERSION: i64 = 250606;

#[derive(Debug, Clone, Deserialize)]
struct RawPluginMeta {
	name: String,
	#[serde(default = "default_version")]
	version: String,
	#[serde(default = "default_author")]
	author: String,
	#[serde(default)]
	description: String,
	#[serde(default = "default_compatibility")]
	compatibility: i64,
	#[serde(default)]
	dependencies: Vec<String>,
	#[serde(default)]
	requirements: Vec<String>,
	#[serde(default)]
	disabled: bool,
}

fn default_version() -> String {
	"1.0.0".to_string()
}
fn default_author() -> String {
	"Unknown".to_string()
}
fn default_compatibility() -> i64 {
	MANAGER_VERSION
}

/// Parsed `plugin.toml` contents plus the directory it was found in.
#[derive(Debug, Clone)]
pub struct PluginMeta {
	pub name: String,
	pub version: String,
	pub author: String,
	pub description: String,
	pub compatibility: i64,
	pub dependencies: Vec<String>,
	pub requirements: Vec<String>,
	pub path: PathBuf,
	pub disabled: bool,
}

impl PluginMeta {
	pub fn parse(manifest_path: &Path) -> Result<Self, PluginError> {
		let raw_toml = std::fs::read_to_string(manifest_path).map_err(PluginError::Io)?;
		let raw: RawPluginMeta = toml::from_str(&raw_toml).map_err(|source| PluginError::ManifestParse {
			plugin: manifest_path.display().to_string(),
			source,
		})?;
		Ok(Self {
			name: raw.name,
			version: raw.version,
			author: raw.author,
			description: raw.description,
			compatibility: raw.compatibility,
			dependencies: raw.dependencies,
			requirements: raw.requirements,
			path: manifest_path.parent().unwrap_or(manifest_path).to_path_buf(),
			disabled: raw.disabled,
		})
	}

	pub fn is_compatible(&self) -> bool {
		self.compatibility >= MANAGER_VERSION
	}
}
