//! User and group identity records.

use serde::{Deserialize, Serialize};

/// Identity of a chat user. `user_id` is always a string even on platforms
/// that use numeric IDs, so callers never have to special-case parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
	pub platform: String,
	pub user_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nickname: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cardname: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub avatar: Option<String>,
	#[serde(default)]
	pub roles: Vec<String>,
}

impl UserInfo {
	/// Construct a minimal `UserInfo` with no optional fields set.
	pub fn new(platform: impl Into<String>, user_id: impl Into<String>) -> Self {
		Self {
			platform: platform.into(),
			user_id: user_id.into(),
			nickname: None,
			cardname: None,
			avatar: None,
			roles: Vec::new(),
		}
	}

	/// The `"Console"` sentinel user that bypasses all permission checks.
	pub fn console() -> Self {
		Self::new("console", crate::CONSOLE_USER_ID)
	}

	pub fn is_console(&self) -> bool {
		self.user_id == crate::CONSOLE_USER_ID
	}
}

/// Identity of a chat group/room. Its absence on a [`crate::MessageEvent`]
/// means the message was sent in a private chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
	pub platform: String,
	pub group_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub owner_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub member_count: Option<u64>,
}

impl GroupInfo {
	pub fn new(platform: impl Into<String>, group_id: impl Into<String>) -> Self {
		Self {
			platform: platform.into(),
			group_id: group_id.into(),
			name: None,
			owner_id: None,
			member_count: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn console_user_is_recognized() {
		assert!(UserInfo::console().is_console());
		assert!(!UserInfo::new("onebot", "42").is_console());
	}

	#[test]
	fn user_info_roundtrips_through_json() {
		let u = UserInfo {
			nickname: Some("Ferris".into()),
			..UserInfo::new("onebot", "42")
		};
		let json = serde_json::to_string(&u).unwrap();
		let back: UserInfo = serde_json::from_str(&json).unwrap();
		assert_eq!(u, back);
	}
}
