//! Built-in commands registered directly by the bootstrap, as opposed to
//! ones a plugin registers through `PluginContext`. Grounded in
//! `original_source/Coral/core.py`'s direct wiring of `perm_system` into
//! the framework at startup rather than as a loadable plugin.

use std::sync::Arc;

use aviary_perms::PermSystem;
use aviary_registry::{CommandOutcome, Registry};

/// Permission gating the `perms` admin command. Not granted to anyone by
/// default; an operator must `grant` it through the console (which bypasses
/// permission checks entirely) before any chat user can manage grants.
pub const PERMS_COMMAND_PERMISSION: &str = "core.perms.admin";

pub fn register_builtin_commands(registry: &Arc<Registry>, perms: &Arc<PermSystem>) {
	perms.register_perm(PERMS_COMMAND_PERMISSION, "manage permission grants via the perms command");

	let perms = Arc::clone(perms);
	registry.register_command(
		"perms",
		move |ev| {
			let perms = Arc::clone(&perms);
			async move { Ok(CommandOutcome::Text(aviary_perms::perm_command(&perms, &ev.args))) }
		},
		Some(vec![PERMS_COMMAND_PERMISSION.to_string()]),
	);
}

#[cfg(test)]
mod tests {
	use super::*;
	use aviary_bus::EventBus;
	use aviary_domain::{CONSOLE_USER_ID, CommandEvent, GroupInfo, MessageChain, UserInfo};

	fn perms() -> (tempfile::TempDir, Arc<PermSystem>) {
		let dir = tempfile::tempdir().unwrap();
		let sys = Arc::new(PermSystem::load(dir.path().join("coral.perms")).unwrap());
		(dir, sys)
	}

	fn command_event(user_id: &str, args: &[&str]) -> Arc<CommandEvent> {
		Arc::new(CommandEvent {
			platform: "console".into(),
			self_id: "Console".into(),
			time: 0.0,
			command: "perms".into(),
			args: args.iter().map(|s| s.to_string()).collect(),
			raw_message: MessageChain::text("!perms"),
			user: UserInfo::new("console", user_id),
			group: Some(GroupInfo::new("console", "lobby")),
		})
	}

	#[tokio::test]
	async fn console_user_bypasses_the_perms_admin_gate() {
		let (_dir, perms) = perms();
		let bus = EventBus::new();
		let registry = Registry::new(bus, Arc::clone(&perms));
		register_builtin_commands(&registry, &perms);

		let resp = registry.execute_command(command_event(CONSOLE_USER_ID, &["show"])).await;
		assert!(!resp.message.to_plain_text().contains("Permission denied"));
	}

	#[tokio::test]
	async fn ungranted_chat_user_is_denied() {
		let (_dir, perms) = perms();
		let bus = EventBus::new();
		let registry = Registry::new(bus, Arc::clone(&perms));
		register_builtin_commands(&registry, &perms);

		let resp = registry.execute_command(command_event("42", &["show"])).await;
		assert!(resp.message.to_plain_text().contains("Permission denied"));
	}
}
