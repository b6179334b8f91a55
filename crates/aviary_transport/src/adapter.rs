//! The `Adapter` contract: protocol translation between a platform's raw
//! payloads and the framework's typed event model, plus the adapter-local
//! bot directory and outbound routing to its bound drivers. Grounded in
//! `original_source/Coral/adapter.py::BaseAdapter`.

use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use aviary_bus::EventBus;
use aviary_domain::{ActionRequest, Bot, BotId, BotResponse, Event, MessageRequest};
use dashmap::DashMap;
use serde_json::Value;
use tracing::{error, warn};

use crate::driver::Driver;

/// Protocol translation + bot directory + outbound fan-out to bound drivers.
#[async_trait]
pub trait Adapter: Send + Sync {
	/// The protocol tag this adapter speaks (e.g. `"onebotv11"`, `"console"`).
	fn protocol(&self) -> &str;

	/// Bind a driver to this adapter, so `AdapterCore::send_to_drivers`
	/// reaches it.
	fn add_driver(&self, driver: Arc<dyn Driver>);

	/// Parse one raw inbound payload and publish the typed event(s) it
	/// produces. Never returns an error: malformed payloads are logged and
	/// dropped, matching spec's "exceptions never cross a subsystem boundary".
	async fn handle_incoming(&self, raw: Value);

	/// Encode and send a chat message request, returning the delivery
	/// outcome.
	async fn handle_outgoing_message(&self, req: &MessageRequest) -> BotResponse;

	/// Encode and send a platform action request, returning the delivery
	/// outcome.
	async fn handle_outgoing_action(&self, req: &ActionRequest) -> BotResponse;

	/// Create and register a bot under this adapter for a newly connected
	/// driver identity.
	async fn create_bot_for_driver(&self, self_id: &str, config: Value) -> Bot;

	/// Remove a bot this adapter was hosting for a now-disconnected driver.
	async fn remove_bot_for_driver(&self, self_id: &str);

	/// All bots currently registered under this adapter.
	fn bots(&self) -> Vec<Bot>;

	/// Look up one bot by `self_id`.
	fn get_bot(&self, self_id: &str) -> Option<Bot>;
}

/// Shared plumbing every concrete `Adapter` composes: the weak event-bus
/// reference (no ownership cycle — the bus never holds a reference back),
/// the list of drivers bound to this adapter, and the adapter-local bot
/// directory.
pub struct AdapterCore {
	protocol: String,
	bus: Weak<EventBus>,
	drivers: RwLock<Vec<Arc<dyn Driver>>>,
	bots: DashMap<BotId, Bot>,
}

impl AdapterCore {
	pub fn new(protocol: impl Into<String>, bus: Weak<EventBus>) -> Self {
		Self {
			protocol: protocol.into(),
			bus,
			drivers: RwLock::new(Vec::new()),
			bots: DashMap::new(),
		}
	}

	pub fn protocol(&self) -> &str {
		&self.protocol
	}

	pub fn add_driver(&self, driver: Arc<dyn Driver>) {
		self.drivers.write().unwrap().push(driver);
	}

	/// Publish a typed event on the bus, if it still exists.
	pub async fn publish<E: Event + 'static>(&self, event: Arc<E>) {
		match self.bus.upgrade() {
			Some(bus) => bus.publish(event).await,
			None => warn!(protocol = %self.protocol, "event bus dropped, cannot publish"),
		}
	}

	/// Fan an outbound action out to every driver bound to this adapter.
	pub async fn send_to_drivers(&self, action: Value) {
		let drivers: Vec<_> = self.drivers.read().unwrap().clone();
		if drivers.is_empty() {
			warn!(protocol = %self.protocol, "no drivers bound, action dropped");
			return;
		}
		for driver in drivers {
			if let Err(e) = driver.send_action(action.clone()).await {
				error!(protocol = %self.protocol, error = %e, "failed to send action to driver");
			}
		}
	}

	pub fn insert_bot(&self, bot: Bot) {
		self.bots.insert(bot.self_id.clone(), bot);
	}

	pub fn remove_bot(&self, self_id: &str) {
		self.bots.remove(self_id);
	}

	pub fn bots(&self) -> Vec<Bot> {
		self.bots.iter().map(|e| e.value().clone()).collect()
	}

	pub fn get_bot(&self, self_id: &str) -> Option<Bot> {
		self.bots.get(self_id).map(|e| e.value().clone())
	}
}
