use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
	#[error("circular dependency detected among plugins")]
	Cycle,
	#[error("plugin '{0}' not found")]
	NotFound(String),
	#[error("cannot unload '{0}': still depended on by {1:?}")]
	DependentsExist(String, Vec<String>),
	#[error("I/O error reading plugin directory: {0}")]
	Io(#[source] std::io::Error),
	#[error("failed to parse manifest for '{plugin}': {source}")]
	ManifestParse { plugin: String, #[source] source: toml::de::Error },
	#[error("plugin '{0}' has no registered implementation")]
	NoImplementation(String),
	#[error("plugin '{plugin}' is incompatible: requires manager version >= {required}, running {running}")]
	Incompatible { plugin: String, required: i64, running: i64 },
	#[error("plugin '{plugin}' failed during {phase}: {source}")]
	Runtime {
		plugin: String,
		phase: &'static str,
		#[source]
		source: anyhow::Error,
	},
}
