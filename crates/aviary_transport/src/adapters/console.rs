//! The console adapter: the stdin/stdout side-channel used for local
//! operation and testing. Unlike every other adapter, incoming lines are
//! turned directly into `CommandEvent`s rather than `MessageEvent`s routed
//! through the chat-command bridge, and the synthesized user id
//! (`CONSOLE_USER_ID`) bypasses every permission check. Grounded in
//! `original_source/Coral/adapters/console.py`.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use aviary_bus::EventBus;
use aviary_domain::{ActionRequest, Bot, BotResponse, CommandEvent, GroupInfo, MessageChain, UserInfo, CONSOLE_USER_ID};
use serde_json::Value;
use tracing::warn;

use crate::adapter::{Adapter, AdapterCore};
use crate::driver::Driver;

pub const PROTOCOL: &str = "console";

pub struct ConsoleAdapter {
	core: AdapterCore,
}

impl ConsoleAdapter {
	pub fn new(bus: Weak<EventBus>) -> Self {
		Self { core: AdapterCore::new(PROTOCOL, bus) }
	}
}

#[async_trait]
impl Adapter for ConsoleAdapter {
	fn protocol(&self) -> &str {
		self.core.protocol()
	}

	fn add_driver(&self, driver: Arc<dyn Driver>) {
		self.core.add_driver(driver);
	}

	async fn handle_incoming(&self, raw: Value) {
		let Some(text) = raw.get("text").and_then(Value::as_str) else {
			warn!(?raw, "console adapter received a frame without a text field");
			return;
		};
		let text = text.trim();
		if text.is_empty() {
			return;
		}

		let mut parts = text.split_whitespace();
		let Some(command) = parts.next() else {
			return;
		};
		let args: Vec<String> = parts.map(str::to_string).collect();

		let event = CommandEvent {
			platform: PROTOCOL.into(),
			self_id: "Console".into(),
			time: aviary_util::time::unix_time_secs(),
			command: command.to_string(),
			args,
			raw_message: MessageChain::text(text),
			user: UserInfo::new(PROTOCOL, CONSOLE_USER_ID),
			group: Some(GroupInfo::new(PROTOCOL, CONSOLE_USER_ID)),
		};
		self.core.publish(Arc::new(event)).await;
	}

	async fn handle_outgoing_message(&self, req: &aviary_domain::MessageRequest) -> BotResponse {
		let text = req.message.to_plain_text();
		self.core.send_to_drivers(serde_json::json!({ "message": text })).await;
		BotResponse::ok(&req.platform, &req.self_id)
	}

	async fn handle_outgoing_action(&self, req: &ActionRequest) -> BotResponse {
		warn!(platform = %req.platform, r#type = ?req.r#type, "console adapter does not support platform actions");
		BotResponse::failed(&req.platform, &req.self_id, "console adapter does not support platform actions")
	}

	async fn create_bot_for_driver(&self, self_id: &str, config: Value) -> Bot {
		let bot = Bot::new(PROTOCOL, self_id, config);
		self.core.insert_bot(bot.clone());
		bot
	}

	async fn remove_bot_for_driver(&self, self_id: &str) {
		self.core.remove_bot(self_id);
	}

	fn bots(&self) -> Vec<Bot> {
		self.core.bots()
	}

	fn get_bot(&self, self_id: &str) -> Option<Bot> {
		self.core.get_bot(self_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aviary_domain::MessageRequest;
	use tokio::sync::mpsc;

	#[tokio::test]
	async fn incoming_line_becomes_a_console_command_event_bypassing_permissions() {
		let bus = EventBus::new();
		let adapter = ConsoleAdapter::new(Arc::downgrade(&bus));

		let (tx, mut rx) = mpsc::unbounded_channel();
		bus.subscribe::<CommandEvent, _>(
			move |ev| {
				let tx = tx.clone();
				async move {
					let _ = tx.send((*ev).clone());
					Ok(None)
				}
			},
			0,
		);
		bus.initialize().await;

		adapter.handle_incoming(serde_json::json!({"text": "ping a b"})).await;

		let ev = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
		assert_eq!(ev.command, "ping");
		assert_eq!(ev.args, vec!["a".to_string(), "b".to_string()]);
		assert_eq!(ev.user.user_id, CONSOLE_USER_ID);
	}

	#[tokio::test]
	async fn blank_line_is_ignored() {
		let bus = EventBus::new();
		let adapter = ConsoleAdapter::new(Arc::downgrade(&bus));
		adapter.handle_incoming(serde_json::json!({"text": "   "})).await;
	}

	#[tokio::test]
	async fn outgoing_action_is_unsupported() {
		let bus = EventBus::new();
		let adapter = ConsoleAdapter::new(Arc::downgrade(&bus));
		let req = ActionRequest {
			platform: PROTOCOL.into(),
			self_id: "Console".into(),
			r#type: aviary_domain::ActionType::Other("noop".into()),
			target: aviary_domain::ActionTarget::User(UserInfo::new(PROTOCOL, CONSOLE_USER_ID)),
			data: serde_json::json!({}),
			group: None,
			delay: None,
		};
		let resp = adapter.handle_outgoing_action(&req).await;
		assert!(!resp.success);
	}

	#[tokio::test]
	async fn outgoing_message_forwards_plain_text_to_drivers() {
		let bus = EventBus::new();
		let adapter = ConsoleAdapter::new(Arc::downgrade(&bus));
		let req = MessageRequest {
			platform: PROTOCOL.into(),
			event_id: "1".into(),
			self_id: "Console".into(),
			message: MessageChain::text("hi"),
			user: Some(UserInfo::new(PROTOCOL, CONSOLE_USER_ID)),
			group: None,
			at_sender: false,
			recall_duration: None,
		};
		let resp = adapter.handle_outgoing_message(&req).await;
		assert!(resp.success);
	}
}
