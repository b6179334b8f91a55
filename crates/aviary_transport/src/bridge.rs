//! The chat-command bridge: the built-in handler that turns a `!command`
//! prefixed chat message into a `CommandEvent`, gated by its own permission
//! separate from whatever permission the target command itself requires.
//! Grounded in spec.md §6 "Chat-command bridge".

use std::sync::Arc;

use aviary_bus::{EventBus, HandlerResult};
use aviary_domain::{CommandEvent, MessageEvent};
use aviary_perms::{PermQuery, PermSystem};
use aviary_registry::Registry;
use tracing::debug;

/// Base permission covering the whole chat-command bridge.
pub const CHAT_COMMAND_PERMISSION_BASE: &str = "chat_command";
/// Permission required to invoke any command through the `!`-prefix bridge.
pub const CHAT_COMMAND_PERMISSION: &str = "chat_command.execute";

pub struct ChatCommandBridge {
	registry: Arc<Registry>,
	perms: Arc<PermSystem>,
}

impl ChatCommandBridge {
	/// Registers the bridge's own permissions (`chat_command`,
	/// `chat_command.execute`) with the permission system, matching
	/// `original_source/utils/chat_command.py::register_plugin`.
	pub fn new(registry: Arc<Registry>, perms: Arc<PermSystem>) -> Arc<Self> {
		perms.register_perm(CHAT_COMMAND_PERMISSION_BASE, "use the !-prefixed chat-command bridge");
		perms.register_perm(CHAT_COMMAND_PERMISSION, "execute a command through the !-prefixed chat-command bridge");
		Arc::new(Self { registry, perms })
	}

	/// Subscribe to `MessageEvent` at priority 1, as spec.md §6 mandates.
	pub fn install(self: &Arc<Self>, bus: &Arc<EventBus>) {
		let this = Arc::clone(self);
		bus.subscribe::<MessageEvent, _>(
			move |ev: Arc<MessageEvent>| {
				let this = Arc::clone(&this);
				async move { this.on_message(ev).await }
			},
			1,
		);
	}

	async fn on_message(&self, ev: Arc<MessageEvent>) -> anyhow::Result<Option<HandlerResult>> {
		let text = ev.message.to_plain_text();
		let Some(rest) = text.strip_prefix('!') else {
			return Ok(None);
		};

		let mut parts = rest.split_whitespace();
		let Some(command) = parts.next() else {
			return Ok(None);
		};
		let args: Vec<String> = parts.map(str::to_string).collect();

		let group_id = ev.group.as_ref().map(|g| g.group_id.as_str());
		let gate = [CHAT_COMMAND_PERMISSION_BASE, CHAT_COMMAND_PERMISSION];
		if !self.perms.check(PermQuery::AnyOf(&gate), &ev.user.user_id, group_id) {
			debug!(command, user = %ev.user.user_id, "chat-command bridge: permission denied");
			return Ok(None);
		}

		let command_event = CommandEvent {
			platform: ev.platform.clone(),
			self_id: ev.self_id.clone(),
			time: ev.time,
			command: command.to_string(),
			args,
			raw_message: ev.message.clone(),
			user: ev.user.clone(),
			group: ev.group.clone(),
		};

		let response = self.registry.execute_command(Arc::new(command_event)).await;
		Ok(Some(HandlerResult::Event(Arc::new(response))))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aviary_domain::{GroupInfo, MessageChain, MessageRequest, UserInfo};
	use aviary_registry::CommandOutcome;

	fn perms() -> (tempfile::TempDir, Arc<PermSystem>) {
		let dir = tempfile::tempdir().unwrap();
		let sys = PermSystem::load(dir.path().join("coral.perms")).unwrap();
		(dir, Arc::new(sys))
	}

	fn sample_message(text: &str) -> MessageEvent {
		MessageEvent {
			platform: "console".into(),
			self_id: "Console".into(),
			time: 0.0,
			event_id: "1".into(),
			message: MessageChain::text(text),
			user: UserInfo::new("console", "42"),
			group: Some(GroupInfo::new("console", "7")),
			raw: None,
		}
	}

	#[tokio::test]
	async fn bang_prefixed_text_dispatches_a_command() {
		let bus = EventBus::new();
		let (_dir, perm_sys) = perms();
		let registry = Registry::new(Arc::clone(&bus), Arc::clone(&perm_sys));

		registry.register_command(
			"ping",
			|ev: Arc<CommandEvent>| async move { Ok(CommandOutcome::Text(format!("pong {}", ev.args.join(",")))) },
			None,
		);

		let bridge = ChatCommandBridge::new(Arc::clone(&registry), Arc::clone(&perm_sys));
		perm_sys.grant_global_perm(CHAT_COMMAND_PERMISSION, "42").unwrap();
		bridge.install(&bus);
		bus.initialize().await;

		let result = bridge.on_message(Arc::new(sample_message("!ping a b"))).await.unwrap();
		let Some(HandlerResult::Event(ev)) = result else {
			panic!("expected a MessageRequest result");
		};
		let req = aviary_domain::downcast_event::<MessageRequest>(ev).expect("MessageRequest");
		assert_eq!(req.message.to_plain_text(), "pong a,b");
	}

	#[tokio::test]
	async fn text_without_bang_prefix_is_ignored() {
		let bus = EventBus::new();
		let (_dir, perm_sys) = perms();
		let registry = Registry::new(Arc::clone(&bus), Arc::clone(&perm_sys));
		let bridge = ChatCommandBridge::new(registry, perm_sys);
		let result = bridge.on_message(Arc::new(sample_message("hello"))).await.unwrap();
		assert!(result.is_none());
	}

	#[tokio::test]
	async fn missing_bridge_permission_drops_the_command_silently() {
		let bus = EventBus::new();
		let (_dir, perm_sys) = perms();
		let registry = Registry::new(Arc::clone(&bus), Arc::clone(&perm_sys));
		registry.register_command(
			"ping",
			|_ev: Arc<CommandEvent>| async move { Ok(CommandOutcome::Text("pong".into())) },
			None,
		);
		let bridge = ChatCommandBridge::new(registry, perm_sys);
		let result = bridge.on_message(Arc::new(sample_message("!ping"))).await.unwrap();
		assert!(result.is_none());
	}
}
