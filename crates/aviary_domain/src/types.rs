//! `ActionType`/`EventType`: enumerated, namespaced wire-value vocabularies.
//!
//! The source protocol exposes these as Python classes holding nested enums
//! (`EventType.Group`, `EventType.Bot`, ...); here each namespace is a
//! variant carrying its own closed sub-enum, with an `Other(String)` escape
//! hatch per namespace for platform-native values outside the known set.

use serde::{Deserialize, Serialize};

/// Group-scoped notice subtypes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupEventKind {
	#[serde(rename = "group_upload")]
	Upload,
	#[serde(rename = "set_group_admin")]
	SetAdmin,
	#[serde(rename = "unset_group_admin")]
	UnsetAdmin,
	#[serde(rename = "group_decrease")]
	MemberDecrease,
	#[serde(rename = "group_increase")]
	MemberIncrease,
	#[serde(rename = "group_ban")]
	Ban,
	#[serde(rename = "group_lift_ban")]
	LiftBan,
	#[serde(rename = "group_recall")]
	Recall,
	#[serde(rename = "group_poke")]
	Poke,
	#[serde(rename = "group_honor")]
	Honor,
	#[serde(rename = "group_add_request")]
	AddRequest,
	#[serde(rename = "group_invite_request")]
	InviteRequest,
}

/// Friend-scoped notice subtypes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendEventKind {
	#[serde(rename = "friend_add")]
	FriendAdd,
	#[serde(rename = "friend_recall")]
	Recall,
	#[serde(rename = "friend_add_request")]
	AddRequest,
}

/// Bot lifecycle notice subtypes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotEventKind {
	#[serde(rename = "lifecycle")]
	Lifecycle,
	#[serde(rename = "heartbeat")]
	Heartbeat,
}

/// Namespace of event-type wire values (`NoticeEvent::type`, meta events).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventType {
	Group(GroupEventKind),
	Friend(FriendEventKind),
	Bot(BotEventKind),
	/// Forward-compatibility escape hatch for platform-native values outside
	/// the known vocabulary.
	Other(String),
}

/// Message-action wire values (`ActionType::Message`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageActionKind {
	#[serde(rename = "send_msg")]
	SendMsg,
	#[serde(rename = "delete_msg")]
	DeleteMsg,
	#[serde(rename = "get_msg")]
	GetMsg,
	#[serde(rename = "get_forward_msg")]
	GetForwardMsg,
}

/// Group-action wire values (`ActionType::Group`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupActionKind {
	#[serde(rename = "set_group_kick")]
	Kick,
	#[serde(rename = "set_group_ban")]
	Ban,
	#[serde(rename = "set_group_anonymous_ban")]
	AnonymousBan,
	#[serde(rename = "set_group_whole_ban")]
	WholeBan,
	#[serde(rename = "set_group_admin")]
	SetAdmin,
	#[serde(rename = "set_group_card")]
	SetCard,
	#[serde(rename = "set_group_name")]
	SetName,
	#[serde(rename = "set_group_leave")]
	Leave,
	#[serde(rename = "set_group_special_title")]
	SetSpecialTitle,
	#[serde(rename = "set_group_add_request")]
	AddRequest,
	#[serde(rename = "get_group_info")]
	GetInfo,
	#[serde(rename = "get_group_member_list")]
	GetMemberList,
	#[serde(rename = "get_group_member_info")]
	GetMemberInfo,
}

/// Friend-action wire values (`ActionType::Friend`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendActionKind {
	#[serde(rename = "send_like")]
	SendLike,
	#[serde(rename = "set_friend_add_request")]
	AddRequest,
	#[serde(rename = "get_friend_list")]
	GetList,
}

/// Bot-action wire values (`ActionType::Bot`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotActionKind {
	#[serde(rename = "get_login_info")]
	GetLoginInfo,
	#[serde(rename = "get_stranger_info")]
	GetStrangerInfo,
	#[serde(rename = "get_friend_list")]
	GetFriendList,
	#[serde(rename = "get_group_list")]
	GetGroupList,
	#[serde(rename = "get_cookies")]
	GetCookies,
	#[serde(rename = "get_csrf_token")]
	GetCsrfToken,
	#[serde(rename = "get_credentials")]
	GetCredentials,
	#[serde(rename = "get_record")]
	GetRecord,
	#[serde(rename = "get_image")]
	GetImage,
	#[serde(rename = "can_send_image")]
	CanSendImage,
	#[serde(rename = "can_send_record")]
	CanSendRecord,
	#[serde(rename = "get_status")]
	GetStatus,
	#[serde(rename = "get_version")]
	GetVersion,
	#[serde(rename = "set_restart")]
	SetRestart,
	#[serde(rename = "clean_cache")]
	CleanCache,
}

/// Namespace of outbound action-type wire values (`ActionRequest::type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionType {
	Group(GroupActionKind),
	Friend(FriendActionKind),
	Bot(BotActionKind),
	Message(MessageActionKind),
	Other(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn event_type_serializes_to_platform_native_wire_value() {
		let ev = EventType::Bot(BotEventKind::Heartbeat);
		assert_eq!(serde_json::to_value(&ev).unwrap(), "heartbeat");
	}

	#[test]
	fn action_type_serializes_to_platform_native_wire_value() {
		let action = ActionType::Message(MessageActionKind::SendMsg);
		assert_eq!(serde_json::to_value(&action).unwrap(), "send_msg");
	}

	#[test]
	fn other_variant_round_trips_unknown_values() {
		let action = ActionType::Other("vendor_specific_action".into());
		let json = serde_json::to_value(&action).unwrap();
		let back: ActionType = serde_json::from_value(json).unwrap();
		assert_eq!(action, back);
	}
}
