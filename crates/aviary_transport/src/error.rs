use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the Adapter Manager's outbound routing. These never
/// cross the bus boundary as errors — callers turn them into a failed
/// `BotResponse` (see `aviary_domain::BotResponse::failed`).
#[derive(Debug, Error)]
pub enum AdapterError {
	#[error("no adapter registered for platform '{0}'")]
	NotSupported(String),

	#[error("adapter request timed out after {0:?}")]
	Timeout(Duration),

	#[error("internal adapter error: {0}")]
	Internal(#[from] anyhow::Error),
}

/// Errors surfaced by a `Driver`'s transport lifecycle.
#[derive(Debug, Error)]
pub enum DriverError {
	#[error("driver '{0}' is already running")]
	AlreadyRunning(String),

	#[error("driver '{0}' is not running")]
	NotRunning(String),

	#[error("transport error: {0}")]
	Transport(#[source] anyhow::Error),
}
