//! The `Driver` contract: owns a transport, forwards whatever it receives to
//! whoever is supervising it over an `mpsc` channel, and accepts outbound
//! actions to push back over the wire. Grounded in the teacher's
//! `chatty_platform::PlatformAdapter` channel-pair idiom (`AdapterControl`/
//! `AdapterEvent` over `mpsc`/`oneshot`), adapted to the Driver/Adapter split
//! `original_source/Coral/driver.py::BaseDriver` describes.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::DriverError;

/// What a driver reports to its supervising `DriverManager` as connections
/// come and go and bytes arrive.
#[derive(Debug, Clone)]
pub enum DriverEvent {
	/// A client connected (or, for the console driver, the process started)
	/// under the given `self_id`. Triggers `Adapter::create_bot_for_driver`.
	Connected { self_id: String, config: Value },
	/// The client behind `self_id` disconnected. Triggers
	/// `Adapter::remove_bot_for_driver`.
	Disconnected { self_id: String },
	/// An opaque inbound payload, handed verbatim to the bound adapter's
	/// `handle_incoming`.
	Raw(Value),
}

/// A transport. `start` spawns whatever background work the transport needs
/// and returns once it's listening/reading — it does not block for the
/// transport's lifetime. `stop` tears that background work down. `send_action`
/// pushes one outbound action out over the wire.
#[async_trait]
pub trait Driver: Send + Sync {
	/// The protocol tag this driver binds to (matched against an adapter's
	/// `Adapter::protocol()`, case-insensitively).
	fn protocol(&self) -> &str;

	/// Begin accepting/reading. `events_tx` is this driver's only channel
	/// back to its manager — every connect, disconnect, and inbound payload
	/// flows through it.
	async fn start(&self, events_tx: mpsc::Sender<DriverEvent>) -> Result<(), DriverError>;

	/// Stop accepting/reading and tear down background tasks. Idempotent.
	async fn stop(&self) -> Result<(), DriverError>;

	/// Send one outbound action over the wire.
	async fn send_action(&self, action: Value) -> Result<(), DriverError>;
}
