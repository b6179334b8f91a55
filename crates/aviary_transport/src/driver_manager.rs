//! The Driver Manager: registers drivers against the adapters matching
//! their protocol tag, starts/stops their transport loops, and translates
//! each driver's `DriverEvent` stream into adapter calls and bot-directory
//! updates. Grounded in `original_source/Coral/driver.py::DriverManager`
//! (`register_driver`, `start_all`/`stop_all`, protocol-match binding).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter_manager::AdapterManager;
use crate::driver::{Driver, DriverEvent};
use crate::error::DriverError;

struct DriverSlot {
	driver: Arc<dyn Driver>,
	event_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Owns every registered driver and the background task that drains each
/// one's `DriverEvent` stream into its bound adapter.
pub struct DriverManager {
	adapter_manager: Arc<AdapterManager>,
	drivers: DashMap<String, DriverSlot>,
}

impl DriverManager {
	pub fn new(adapter_manager: Arc<AdapterManager>) -> Arc<Self> {
		Arc::new(Self { adapter_manager, drivers: DashMap::new() })
	}

	/// Bind `driver` to the adapter matching its protocol tag. Skips
	/// registration with a warning if no such adapter exists — matches
	/// spec.md's "Driver Manager looks up the Adapter with the matching
	/// PROTOCOL" binding contract.
	pub fn register(&self, name: impl Into<String>, driver: Arc<dyn Driver>) {
		let name = name.into();
		let Some(adapter) = self.adapter_manager.get_adapter(driver.protocol()) else {
			warn!(driver = %name, protocol = driver.protocol(), "no adapter registered for this protocol, skipping driver");
			return;
		};
		adapter.add_driver(Arc::clone(&driver));
		self.drivers.insert(name, DriverSlot { driver, event_task: std::sync::Mutex::new(None) });
	}

	/// Start every registered driver's transport and spawn its event-drain
	/// task.
	pub async fn start_all(self: &Arc<Self>) {
		let names: Vec<String> = self.drivers.iter().map(|e| e.key().clone()).collect();
		for name in names {
			if let Err(e) = self.start_one(&name).await {
				warn!(driver = %name, error = %e, "driver failed to start");
			}
		}
	}

	async fn start_one(self: &Arc<Self>, name: &str) -> Result<(), DriverError> {
		let Some(entry) = self.drivers.get(name) else {
			return Err(DriverError::NotRunning(name.to_string()));
		};
		let driver = Arc::clone(&entry.driver);
		drop(entry);

		let (tx, mut rx) = mpsc::channel::<DriverEvent>(256);
		driver.start(tx).await?;

		let this = Arc::clone(self);
		let protocol = driver.protocol().to_string();
		let name_owned = name.to_string();
		let task = tokio::spawn(async move {
			while let Some(event) = rx.recv().await {
				this.handle_driver_event(&protocol, event).await;
			}
			info!(driver = %name_owned, "driver event stream closed");
		});

		if let Some(entry) = self.drivers.get(name) {
			*entry.event_task.lock().unwrap() = Some(task);
		}
		Ok(())
	}

	async fn handle_driver_event(&self, protocol: &str, event: DriverEvent) {
		let Some(adapter) = self.adapter_manager.get_adapter(protocol) else {
			warn!(protocol, "driver event for a protocol with no bound adapter");
			return;
		};

		match event {
			DriverEvent::Connected { self_id, config } => {
				let bot = adapter.create_bot_for_driver(&self_id, config).await;
				self.adapter_manager.register_bot(bot);
				info!(protocol, self_id, "bot connected");
			}
			DriverEvent::Disconnected { self_id } => {
				adapter.remove_bot_for_driver(&self_id).await;
				self.adapter_manager.unregister_bot(&self_id);
				info!(protocol, self_id, "bot disconnected");
			}
			DriverEvent::Raw(payload) => {
				adapter.handle_incoming(payload).await;
			}
		}
	}

	/// Stop every registered driver's transport and its event-drain task.
	pub async fn stop_all(&self) {
		let names: Vec<String> = self.drivers.iter().map(|e| e.key().clone()).collect();
		for name in names {
			if let Some(entry) = self.drivers.get(&name) {
				if let Err(e) = entry.driver.stop().await {
					warn!(driver = %name, error = %e, "driver failed to stop cleanly");
				}
				if let Some(task) = entry.event_task.lock().unwrap().take() {
					task.abort();
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::adapter::Adapter;
	use crate::adapter_manager::AdapterManagerConfig;
	use async_trait::async_trait;
	use aviary_domain::{ActionRequest, Bot, BotResponse, MessageRequest};
	use serde_json::Value;
	use std::sync::atomic::{AtomicBool, Ordering};

	struct StubAdapter {
		created: AtomicBool,
		removed: AtomicBool,
		seen_raw: AtomicBool,
	}

	#[async_trait]
	impl Adapter for StubAdapter {
		fn protocol(&self) -> &str {
			"console"
		}
		fn add_driver(&self, _driver: Arc<dyn Driver>) {}
		async fn handle_incoming(&self, _raw: Value) {
			self.seen_raw.store(true, Ordering::SeqCst);
		}
		async fn handle_outgoing_message(&self, req: &MessageRequest) -> BotResponse {
			BotResponse::ok(&req.platform, &req.self_id)
		}
		async fn handle_outgoing_action(&self, req: &ActionRequest) -> BotResponse {
			BotResponse::ok(&req.platform, &req.self_id)
		}
		async fn create_bot_for_driver(&self, self_id: &str, config: Value) -> Bot {
			self.created.store(true, Ordering::SeqCst);
			Bot::new("console", self_id, config)
		}
		async fn remove_bot_for_driver(&self, _self_id: &str) {
			self.removed.store(true, Ordering::SeqCst);
		}
		fn bots(&self) -> Vec<Bot> {
			vec![]
		}
		fn get_bot(&self, _self_id: &str) -> Option<Bot> {
			None
		}
	}

	struct StubDriver;

	#[async_trait]
	impl Driver for StubDriver {
		fn protocol(&self) -> &str {
			"console"
		}
		async fn start(&self, events_tx: mpsc::Sender<DriverEvent>) -> Result<(), DriverError> {
			tokio::spawn(async move {
				let _ = events_tx.send(DriverEvent::Connected { self_id: "Console".into(), config: Value::Null }).await;
				let _ = events_tx.send(DriverEvent::Raw(serde_json::json!({"text": "ping"}))).await;
				let _ = events_tx.send(DriverEvent::Disconnected { self_id: "Console".into() }).await;
			});
			Ok(())
		}
		async fn stop(&self) -> Result<(), DriverError> {
			Ok(())
		}
		async fn send_action(&self, _action: Value) -> Result<(), DriverError> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn connect_raw_disconnect_flow_updates_bot_directory() {
		let adapter_manager = AdapterManager::new(AdapterManagerConfig::default());
		let adapter = Arc::new(StubAdapter { created: AtomicBool::new(false), removed: AtomicBool::new(false), seen_raw: AtomicBool::new(false) });
		adapter_manager.register(Arc::clone(&adapter) as Arc<dyn Adapter>);

		let driver_manager = DriverManager::new(Arc::clone(&adapter_manager));
		driver_manager.register("console", Arc::new(StubDriver));
		driver_manager.start_all().await;

		tokio::time::sleep(std::time::Duration::from_millis(50)).await;

		assert!(adapter.created.load(Ordering::SeqCst));
		assert!(adapter.seen_raw.load(Ordering::SeqCst));
		assert!(adapter.removed.load(Ordering::SeqCst));
	}

	#[test]
	fn register_without_matching_adapter_is_skipped() {
		let adapter_manager = AdapterManager::new(AdapterManagerConfig::default());
		let driver_manager = DriverManager::new(adapter_manager);
		driver_manager.register("console", Arc::new(StubDriver));
		assert!(driver_manager.drivers.is_empty());
	}
}
