//! The event hierarchy and the type-erased `Event` trait the bus dispatches
//! on.
//!
//! Every event type that can flow through [`aviary_bus::EventBus`] implements
//! `Event`. Subscribers register against a concrete type (`MessageEvent`,
//! `CommandEvent`, ...); the bus stores handlers behind `TypeId` and uses
//! `as_any_arc`/`downcast_event` to get back to the concrete type before
//! calling a handler. This is the same `Arc<dyn Any>`-downcast idiom used
//! for bot identity elsewhere in the corpus (see `downcast_bot` in the
//! adapter-framework reference material): each concrete event implements the
//! trait explicitly rather than via a blanket impl, so the set of publishable
//! event types stays a closed, greppable list.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::message::MessageChain;
use crate::request::MessageRequest;
use crate::user::{GroupInfo, UserInfo};

/// Marker trait for anything that can be published on the event bus.
pub trait Event: Any + fmt::Debug + Send + Sync {
	/// Returns `self` as an `Arc<dyn Any>` for downcasting. Implementors
	/// always return `self` unchanged; see [`downcast_event`].
	fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A boxed `Event` trait object, as stored in the bus and the result queue.
pub type BoxedEvent = Arc<dyn Event>;

/// Attempts to downcast a [`BoxedEvent`] back to a concrete event type.
pub fn downcast_event<T: Event + 'static>(event: BoxedEvent) -> Option<Arc<T>> {
	Arc::downcast::<T>(event.as_any_arc()).ok()
}

macro_rules! impl_event {
	($ty:ty) => {
		impl Event for $ty {
			fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
				self
			}
		}
	};
}

/// A chat message received from (or, via `reply`, destined for) a platform.
#[derive(Debug, Clone)]
pub struct MessageEvent {
	pub platform: String,
	pub self_id: String,
	pub time: f64,
	pub event_id: String,
	pub message: MessageChain,
	pub user: UserInfo,
	pub group: Option<GroupInfo>,
	/// Opaque platform-native payload, kept for adapters/plugins that need
	/// more than the typed projection.
	pub raw: Option<Value>,
}

impl MessageEvent {
	pub fn is_private(&self) -> bool {
		self.group.is_none()
	}

	pub fn is_group(&self) -> bool {
		self.group.is_some()
	}

	/// True iff any `at` segment in the message targets `self_id`.
	pub fn to_me(&self) -> bool {
		self.message.segments.iter().any(|seg| {
			matches!(seg, crate::message::MessageSegment::At { user_id } if user_id == &self.self_id)
		})
	}

	/// Build a [`MessageRequest`] replying to this event.
	pub fn reply(&self, body: MessageChain, at_sender: bool, recall_after: Option<f64>) -> MessageRequest {
		MessageRequest {
			platform: self.platform.clone(),
			event_id: self.event_id.clone(),
			self_id: self.self_id.clone(),
			message: body,
			user: Some(self.user.clone()),
			group: self.group.clone(),
			at_sender,
			recall_duration: recall_after,
		}
	}
}

impl_event!(MessageEvent);

/// A platform-native notice: member joins/leaves, recalls, pokes, and so on.
#[derive(Debug, Clone)]
pub struct NoticeEvent {
	pub platform: String,
	pub self_id: String,
	pub time: f64,
	/// Platform-native notice type string, preserved verbatim.
	pub r#type: String,
	pub user: Option<UserInfo>,
	pub group: Option<GroupInfo>,
	pub operator: Option<UserInfo>,
	pub target: Option<UserInfo>,
	pub comment: Option<String>,
}

impl NoticeEvent {
	pub fn is_private(&self) -> bool {
		self.group.is_none()
	}

	pub fn is_group(&self) -> bool {
		self.group.is_some()
	}

	/// True iff the operator performing this notice is the bot itself.
	pub fn is_operator(&self) -> bool {
		self.operator.as_ref().is_some_and(|op| op.user_id == self.self_id)
	}
}

impl_event!(NoticeEvent);

/// A parsed `!command arg1 arg2` invocation, synthesized either by the
/// chat-command bridge or directly by a driver (e.g. the console driver).
#[derive(Debug, Clone)]
pub struct CommandEvent {
	pub platform: String,
	pub self_id: String,
	pub time: f64,
	pub command: String,
	pub args: Vec<String>,
	pub raw_message: MessageChain,
	pub user: UserInfo,
	pub group: Option<GroupInfo>,
}

impl_event!(CommandEvent);

/// An internal lifecycle/custom event: `coral_initialized`, `coral_shutdown`,
/// `plugin_loaded`, or any plugin-defined named event dispatched through
/// `Registry::execute_event`.
#[derive(Debug, Clone)]
pub struct GenericEvent {
	pub name: String,
	pub data: Option<Value>,
	pub platform: String,
	pub self_id: String,
	pub time: f64,
}

impl GenericEvent {
	pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			data: None,
			platform: platform.into(),
			self_id: String::new(),
			time: aviary_util::time::unix_time_secs(),
		}
	}

	pub fn with_data(mut self, data: Value) -> Self {
		self.data = Some(data);
		self
	}
}

impl_event!(GenericEvent);

impl_event!(crate::request::MessageRequest);
impl_event!(crate::request::ActionRequest);
impl_event!(crate::request::BotResponse);

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::MessageSegment;

	fn sample_user(id: &str) -> UserInfo {
		UserInfo {
			platform: "onebot".into(),
			user_id: id.into(),
			nickname: None,
			cardname: None,
			avatar: None,
			roles: vec![],
		}
	}

	#[test]
	fn to_me_detects_at_segment_targeting_self() {
		let ev = MessageEvent {
			platform: "onebot".into(),
			self_id: "10".into(),
			time: 0.0,
			event_id: "1".into(),
			message: MessageChain::from_segments(vec![MessageSegment::At { user_id: "10".into() }]),
			user: sample_user("42"),
			group: None,
			raw: None,
		};
		assert!(ev.to_me());

		let ev2 = MessageEvent {
			message: MessageChain::from_segments(vec![MessageSegment::At { user_id: "99".into() }]),
			..ev
		};
		assert!(!ev2.to_me());
	}

	#[test]
	fn downcast_event_roundtrips_through_boxed_event() {
		let ev: BoxedEvent = Arc::new(GenericEvent::new("coral_initialized", "core"));
		let back = downcast_event::<GenericEvent>(ev).expect("downcast should succeed");
		assert_eq!(back.name, "coral_initialized");
	}

	#[test]
	fn downcast_event_rejects_mismatched_type() {
		let ev: BoxedEvent = Arc::new(GenericEvent::new("coral_initialized", "core"));
		assert!(downcast_event::<CommandEvent>(ev).is_none());
	}
}
