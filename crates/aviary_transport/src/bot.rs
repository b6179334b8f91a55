//! `BotHandle`: the other half of `aviary_domain::Bot`. That crate models
//! only the identity record (`{platform, self_id, config}`) to keep the
//! domain-model crate free of a dependency on this one; `BotHandle` pairs
//! that record with a `Weak<dyn Adapter>` back-reference so callers holding
//! one can reach the adapter that owns it without the adapter itself having
//! to be threaded through every call site. See `DESIGN.md`.

use std::sync::Weak;

use aviary_domain::Bot;

use crate::adapter::Adapter;

/// A `Bot` plus a weak reference to the `Adapter` that hosts it.
#[derive(Clone)]
pub struct BotHandle {
	pub bot: Bot,
	pub adapter: Weak<dyn Adapter>,
}

impl BotHandle {
	pub fn new(bot: Bot, adapter: Weak<dyn Adapter>) -> Self {
		Self { bot, adapter }
	}

	/// Upgrade the adapter reference, if it's still alive.
	pub fn adapter(&self) -> Option<std::sync::Arc<dyn Adapter>> {
		self.adapter.upgrade()
	}
}

impl std::fmt::Debug for BotHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BotHandle")
			.field("bot", &self.bot)
			.field("adapter_alive", &(self.adapter.strong_count() > 0))
			.finish()
	}
}
