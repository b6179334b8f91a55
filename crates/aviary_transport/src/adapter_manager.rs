//! The Adapter Manager: the global bot directory plus outbound routing from
//! the bus's `MessageRequest`/`ActionRequest` events to the platform-keyed
//! `Adapter` that should handle them. Grounded in
//! `original_source/Coral/adapter.py::AdapterManager.handle_message/
//! handle_action`: dispatch by `platform.to_lowercase()`, a per-adapter
//! concurrency semaphore (default 10) and request timeout (default 30s);
//! failures become a failed `BotResponse`, never a bus-level error.

use std::sync::Arc;
use std::time::Duration;

use aviary_bus::EventBus;
use aviary_domain::{ActionRequest, Bot, BotId, BotResponse, MessageRequest};
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::adapter::Adapter;
use crate::error::AdapterError;

/// Per-adapter concurrency/timeout knobs. Defaults match
/// `original_source/Coral/adapter.py::BaseAdapter.__init__`.
#[derive(Debug, Clone, Copy)]
pub struct AdapterManagerConfig {
	pub max_concurrent_requests: usize,
	pub request_timeout: Duration,
}

impl Default for AdapterManagerConfig {
	fn default() -> Self {
		Self { max_concurrent_requests: 10, request_timeout: Duration::from_secs(30) }
	}
}

struct AdapterSlot {
	adapter: Arc<dyn Adapter>,
	semaphore: Arc<Semaphore>,
	timeout: Duration,
}

/// Owns the platform→adapter directory and the cross-platform bot directory.
/// Subscribes itself to `MessageRequest`/`ActionRequest` via `install`.
pub struct AdapterManager {
	adapters: DashMap<Arc<str>, AdapterSlot>,
	bots: DashMap<BotId, Bot>,
	default_config: AdapterManagerConfig,
}

impl AdapterManager {
	pub fn new(default_config: AdapterManagerConfig) -> Arc<Self> {
		Arc::new(Self { adapters: DashMap::new(), bots: DashMap::new(), default_config })
	}

	/// Register an adapter under its own protocol tag, with the default
	/// concurrency/timeout configuration.
	pub fn register(&self, adapter: Arc<dyn Adapter>) {
		self.register_with(adapter, self.default_config)
	}

	/// Register an adapter with an explicit per-adapter configuration.
	pub fn register_with(&self, adapter: Arc<dyn Adapter>, config: AdapterManagerConfig) {
		let protocol = aviary_util::intern::global().intern(adapter.protocol());
		self.adapters.insert(
			protocol,
			AdapterSlot {
				adapter,
				semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
				timeout: config.request_timeout,
			},
		);
	}

	pub fn get_adapter(&self, protocol: &str) -> Option<Arc<dyn Adapter>> {
		let tag = aviary_util::intern::global().intern(protocol);
		self.adapters.get(&tag).map(|s| Arc::clone(&s.adapter))
	}

	/// Register a bot in the global, cross-platform directory. Adapters call
	/// this (indirectly, via the `DriverManager`) when a driver connects.
	pub fn register_bot(&self, bot: Bot) {
		self.bots.insert(bot.self_id.clone(), bot);
	}

	pub fn unregister_bot(&self, self_id: &str) {
		self.bots.remove(self_id);
	}

	pub fn get_bot(&self, self_id: &str) -> Option<Bot> {
		self.bots.get(self_id).map(|e| e.value().clone())
	}

	pub fn bots(&self) -> Vec<Bot> {
		self.bots.iter().map(|e| e.value().clone()).collect()
	}

	/// Subscribe this manager to the bus's outbound-intent events. Bootstrap
	/// calls this once, after every adapter has been registered.
	pub fn install(self: &Arc<Self>, bus: &Arc<EventBus>) {
		let this = Arc::clone(self);
		bus.subscribe::<MessageRequest, _>(
			move |req| {
				let this = Arc::clone(&this);
				async move {
					let _ = this.dispatch_message(&req).await;
					Ok(None)
				}
			},
			0,
		);

		let this = Arc::clone(self);
		bus.subscribe::<ActionRequest, _>(
			move |req| {
				let this = Arc::clone(&this);
				async move {
					let _ = this.dispatch_action(&req).await;
					Ok(None)
				}
			},
			0,
		);
	}

	/// Route one `MessageRequest` to its platform's adapter.
	pub async fn dispatch_message(&self, req: &MessageRequest) -> BotResponse {
		let Some((adapter, semaphore, timeout)) = self.lookup(&req.platform) else {
			return self.not_supported(&req.platform, &req.self_id);
		};
		let Ok(_permit) = semaphore.acquire_owned().await else {
			return BotResponse::failed(&req.platform, &req.self_id, "adapter semaphore closed");
		};
		match tokio::time::timeout(timeout, adapter.handle_outgoing_message(req)).await {
			Ok(resp) => resp,
			Err(_) => self.timed_out(&req.platform, &req.self_id, timeout),
		}
	}

	/// Route one `ActionRequest` to its platform's adapter.
	pub async fn dispatch_action(&self, req: &ActionRequest) -> BotResponse {
		let Some((adapter, semaphore, timeout)) = self.lookup(&req.platform) else {
			return self.not_supported(&req.platform, &req.self_id);
		};
		let Ok(_permit) = semaphore.acquire_owned().await else {
			return BotResponse::failed(&req.platform, &req.self_id, "adapter semaphore closed");
		};
		match tokio::time::timeout(timeout, adapter.handle_outgoing_action(req)).await {
			Ok(resp) => resp,
			Err(_) => self.timed_out(&req.platform, &req.self_id, timeout),
		}
	}

	fn lookup(&self, platform: &str) -> Option<(Arc<dyn Adapter>, Arc<Semaphore>, Duration)> {
		let tag = aviary_util::intern::global().intern(platform);
		self.adapters.get(&tag).map(|s| (Arc::clone(&s.adapter), Arc::clone(&s.semaphore), s.timeout))
	}

	fn not_supported(&self, platform: &str, self_id: &str) -> BotResponse {
		let err = AdapterError::NotSupported(platform.to_string());
		warn!(platform, error = %err, "dispatch failed");
		BotResponse::failed(platform, self_id, err.to_string())
	}

	fn timed_out(&self, platform: &str, self_id: &str, timeout: Duration) -> BotResponse {
		let err = AdapterError::Timeout(timeout);
		metrics::counter!("aviary_adapter_timeouts_total", "platform" => platform.to_string()).increment(1);
		warn!(platform, error = %err, "dispatch failed");
		BotResponse::failed(platform, self_id, err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use aviary_domain::{ActionTarget, MessageChain};
	use serde_json::Value;

	struct EchoAdapter;

	#[async_trait]
	impl Adapter for EchoAdapter {
		fn protocol(&self) -> &str {
			"onebotv11"
		}
		fn add_driver(&self, _driver: Arc<dyn crate::driver::Driver>) {}
		async fn handle_incoming(&self, _raw: Value) {}
		async fn handle_outgoing_message(&self, req: &MessageRequest) -> BotResponse {
			BotResponse::ok(&req.platform, &req.self_id)
		}
		async fn handle_outgoing_action(&self, req: &ActionRequest) -> BotResponse {
			BotResponse::ok(&req.platform, &req.self_id)
		}
		async fn create_bot_for_driver(&self, self_id: &str, config: Value) -> Bot {
			Bot::new("onebotv11", self_id, config)
		}
		async fn remove_bot_for_driver(&self, _self_id: &str) {}
		fn bots(&self) -> Vec<Bot> {
			vec![]
		}
		fn get_bot(&self, _self_id: &str) -> Option<Bot> {
			None
		}
	}

	fn sample_message_request() -> MessageRequest {
		MessageRequest {
			platform: "OneBotV11".into(),
			event_id: String::new(),
			self_id: "10".into(),
			message: MessageChain::text("hi"),
			user: None,
			group: None,
			at_sender: false,
			recall_duration: None,
		}
	}

	#[tokio::test]
	async fn dispatch_message_routes_case_insensitively() {
		let mgr = AdapterManager::new(AdapterManagerConfig::default());
		mgr.register(Arc::new(EchoAdapter));
		let resp = mgr.dispatch_message(&sample_message_request()).await;
		assert!(resp.success);
	}

	#[tokio::test]
	async fn dispatch_message_to_unregistered_platform_fails_softly() {
		let mgr = AdapterManager::new(AdapterManagerConfig::default());
		let mut req = sample_message_request();
		req.platform = "discord".into();
		let resp = mgr.dispatch_message(&req).await;
		assert!(!resp.success);
		assert!(resp.message.unwrap().contains("no adapter registered"));
	}

	#[tokio::test]
	async fn dispatch_action_routes_to_registered_adapter() {
		let mgr = AdapterManager::new(AdapterManagerConfig::default());
		mgr.register(Arc::new(EchoAdapter));
		let req = ActionRequest {
			platform: "onebotv11".into(),
			self_id: "10".into(),
			r#type: aviary_domain::ActionType::Other("noop".into()),
			target: ActionTarget::User(aviary_domain::UserInfo::new("onebotv11", "42")),
			data: Value::Null,
			group: None,
			delay: None,
		};
		let resp = mgr.dispatch_action(&req).await;
		assert!(resp.success);
	}

	#[test]
	fn bot_directory_roundtrips() {
		let mgr = AdapterManager::new(AdapterManagerConfig::default());
		mgr.register_bot(Bot::new("onebotv11", "10", Value::Null));
		assert_eq!(mgr.bots().len(), 1);
		mgr.unregister_bot("10");
		assert!(mgr.get_bot("10").is_none());
	}
}
