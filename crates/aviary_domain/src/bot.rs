//! The `Bot` identity record: `{platform, self_id, config}`.
//!
//! This crate only models the identity half of a `Bot` — the adapter
//! back-reference spec.md describes is a transport-layer concept (it would
//! make `aviary_domain` depend on `aviary_transport`, inverting the crate
//! graph), so `aviary_transport::BotHandle` wraps this record with a
//! `Weak<dyn Adapter>` reference. See `DESIGN.md`.

use serde_json::Value;

/// `self_id` is the primary key for a [`Bot`] — unique within a platform,
/// used both in the owning adapter's local directory and the adapter
/// manager's global directory.
pub type BotId = String;

/// Per-connection identity on a platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Bot {
	pub platform: String,
	pub self_id: BotId,
	pub config: Value,
}

impl Bot {
	pub fn new(platform: impl Into<String>, self_id: impl Into<String>, config: Value) -> Self {
		Self {
			platform: platform.into(),
			self_id: self_id.into(),
			config,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn self_id_is_the_identity_key() {
		let a = Bot::new("onebot", "10001", Value::Null);
		let b = Bot::new("onebot", "10001", Value::Null);
		assert_eq!(a.self_id, b.self_id);
	}
}
