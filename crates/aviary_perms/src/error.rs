use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermError {
	#[error("permission '{0}' is not registered")]
	NotRegistered(String),
	#[error("permission store I/O error: {0}")]
	Io(#[source] std::io::Error),
	#[error("permission store serialization error: {0}")]
	Serialize(#[source] serde_json::Error),
}
