//! Outbound-intent request types. These double as events: a handler that
//! returns one gets it enqueued on the bus's result queue, where the
//! adapter manager's subscription picks it up and routes it to a platform.

use serde_json::Value;

use crate::message::MessageChain;
use crate::types::ActionType;
use crate::user::{GroupInfo, UserInfo};

/// A request to send a chat message, either a fresh one or a reply to an
/// inbound event (carrying that event's `event_id`).
#[derive(Debug, Clone)]
pub struct MessageRequest {
	pub platform: String,
	pub event_id: String,
	pub self_id: String,
	pub message: MessageChain,
	pub user: Option<UserInfo>,
	pub group: Option<GroupInfo>,
	pub at_sender: bool,
	/// Seconds after which the adapter should attempt to recall the sent
	/// message, if the platform supports it.
	pub recall_duration: Option<f64>,
}

/// A request to perform a platform-native action (moderation, profile
/// queries, and so on) that isn't a chat message.
#[derive(Debug, Clone)]
pub struct ActionRequest {
	pub platform: String,
	pub self_id: String,
	pub r#type: ActionType,
	pub target: ActionTarget,
	pub data: Value,
	pub group: Option<GroupInfo>,
	/// Delay, in seconds, before the adapter should execute this action.
	pub delay: Option<f64>,
}

/// The subject of an [`ActionRequest`].
#[derive(Debug, Clone)]
pub enum ActionTarget {
	User(UserInfo),
	Group(GroupInfo),
}

/// The outcome of executing a request against a platform, also published
/// on the bus so plugins can observe delivery success/failure.
#[derive(Debug, Clone)]
pub struct BotResponse {
	pub success: bool,
	pub message: Option<String>,
	pub data: Option<Value>,
	pub event_id: Option<String>,
	pub platform: String,
	pub self_id: String,
	pub time: f64,
}

impl BotResponse {
	pub fn ok(platform: impl Into<String>, self_id: impl Into<String>) -> Self {
		Self {
			success: true,
			message: None,
			data: None,
			event_id: None,
			platform: platform.into(),
			self_id: self_id.into(),
			time: aviary_util::time::unix_time_secs(),
		}
	}

	pub fn failed(platform: impl Into<String>, self_id: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			success: false,
			message: Some(message.into()),
			data: None,
			event_id: None,
			platform: platform.into(),
			self_id: self_id.into(),
			time: aviary_util::time::unix_time_secs(),
		}
	}
}
