use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("function '{0}' already registered")]
	FunctionAlreadyRegistered(String),
	#[error("event listener '{listener}' already registered for event '{event}'")]
	EventListenerAlreadyRegistered { event: String, listener: String },
	#[error("function '{0}' not found, did you forget to register it?")]
	FunctionNotFound(String),
}
