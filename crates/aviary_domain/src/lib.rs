#![forbid(unsafe_code)]
//! Immutable data model shared by every Aviary subsystem: users, groups,
//! messages, the event hierarchy, and the outbound request types that
//! re-enter the event bus as results.

pub mod bot;
pub mod event;
pub mod message;
pub mod types;
pub mod user;

pub use bot::{Bot, BotId};
pub use event::{
	BoxedEvent, CommandEvent, Event, GenericEvent, MessageEvent, NoticeEvent, downcast_event,
};
pub use message::{MessageChain, MessageSegment, ShareKind};
pub use types::{ActionType, EventType};
pub use user::{GroupInfo, UserInfo};

/// Literal protocol version stamped on every payload that crosses an
/// external boundary (wire frames, `BotResponse`, framework metadata).
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// The `user_id` sentinel that bypasses every permission check.
pub const CONSOLE_USER_ID: &str = "Console";

/// Outbound-intent requests. These are also published on the event bus so
/// the adapter manager's `MessageRequest`/`ActionRequest` subscription can
/// pick them up and route them to a platform.
pub mod request;
pub use request::{ActionRequest, ActionTarget, BotResponse, MessageRequest};
