#![forbid(unsafe_code)]
//! Permission system: per-user and per-group permission grants, checked in a
//! fixed resolution order, persisted to a single JSON file on disk.

mod command;
mod error;
mod store;

pub use command::perm_command;
pub use error::PermError;

use std::path::{Path, PathBuf};

use aviary_domain::CONSOLE_USER_ID;
use parking_lot::RwLock;
use store::PermStore;
use tracing::{debug, warn};

/// Group id under which a permission grant applies to every group.
pub const GLOBAL_GROUP: &str = "ALL";
/// Group id under which a group-level grant applies to every group (distinct
/// from `GLOBAL_GROUP`, which is a per-user scope marker).
pub const ALL_GROUPS: &str = "-1";
const BUILTIN_ALL_PERM: &str = "ALL";
const BUILTIN_SELF_PERM: &str = "permission_system";

/// The permission system. Cheap to clone-share via `Arc`; all mutation goes
/// through an internal lock and is persisted to `perm_file` after every
/// change.
pub struct PermSystem {
	perm_file: PathBuf,
	state: RwLock<PermStore>,
}

impl PermSystem {
	/// Load (or create) the permission store at `perm_file`, registering the
	/// two permissions every Aviary instance ships with.
	pub fn load(perm_file: impl AsRef<Path>) -> Result<Self, PermError> {
		let perm_file = perm_file.as_ref().to_path_buf();
		let state = PermStore::load_or_create(&perm_file)?;
		let sys = Self { perm_file, state: RwLock::new(state) };
		sys.register_perm(BUILTIN_ALL_PERM, "all permissions");
		sys.register_perm(BUILTIN_SELF_PERM, "manage the permission system itself");
		Ok(sys)
	}

	/// Register a permission name with a human-readable description.
	/// Overwrites the description if already registered.
	pub fn register_perm(&self, perm_name: impl Into<String>, perm_desc: impl Into<String>) {
		let perm_name = perm_name.into();
		let mut state = self.state.write();
		if state.registered_perms.contains_key(&perm_name) {
			warn!(perm = %perm_name, "permission already registered, overwriting description");
		}
		state.registered_perms.insert(perm_name.clone(), perm_desc.into());
		debug!(perm = %perm_name, "registered permission");
	}

	/// Check whether `user_id` (in `group_id`, or no group for private chats)
	/// holds `perm`. `perm` may be a single name or an any-of list — the
	/// check passes if at least one name in the list resolves to `true`.
	///
	/// Resolution order per name:
	/// 1. `user_id == "Console"` always passes.
	/// 2. Permission not registered: passes (with a warning) — an unknown
	///    permission can't meaningfully deny anyone.
	/// 3. The user holds `(perm: "ALL", group: *)`.
	/// 4. The user holds `(perm, group: "ALL")` (a global per-user grant).
	/// 5. The user holds `(perm, group: group_id)`.
	/// 6. `group_id`'s group-level grants include `perm`.
	/// 7. The global group `"-1"`'s group-level grants include `perm`.
	pub fn check(&self, perm: PermQuery<'_>, user_id: &str, group_id: Option<&str>) -> bool {
		if user_id == CONSOLE_USER_ID {
			return true;
		}
		match perm {
			PermQuery::Single(name) => self.check_single(name, user_id, group_id),
			PermQuery::AnyOf(names) => names.iter().any(|name| self.check_single(name, user_id, group_id)),
		}
	}

	fn check_single(&self, perm_name: &str, user_id: &str, group_id: Option<&str>) -> bool {
		let state = self.state.read();
		if !state.registered_perms.contains_key(perm_name) {
			warn!(perm = %perm_name, "permission not registered, allowing by default");
			return true;
		}

		let group_id = group_id.unwrap_or(ALL_GROUPS);

		if let Some(entries) = state.user_perms.get(user_id) {
			if entries.iter().any(|e| e.perm == BUILTIN_ALL_PERM) {
				return true;
			}
			if entries.iter().any(|e| e.perm == perm_name && e.group == GLOBAL_GROUP) {
				return true;
			}
			if entries.iter().any(|e| e.perm == perm_name && e.group == group_id) {
				return true;
			}
		}

		if let Some(perms) = state.group_perms.get(group_id) {
			if perms.iter().any(|p| p == perm_name) {
				return true;
			}
		}
		if let Some(perms) = state.group_perms.get(ALL_GROUPS) {
			if perms.iter().any(|p| p == perm_name) {
				return true;
			}
		}

		false
	}

	/// Grant `perm_name` to `user_id` within `group_id` (use `"-1"` for "no
	/// particular group"/global group scope is irrelevant), or to the whole
	/// group if `user_id == "-1"`.
	pub fn add_perm(&self, perm_name: &str, user_id: &str, group_id: &str) -> Result<String, PermError> {
		if !self.state.read().registered_perms.contains_key(perm_name) {
			return Err(PermError::NotRegistered(perm_name.to_string()));
		}

		let message = {
			let mut state = self.state.write();
			if user_id == ALL_GROUPS {
				let perms = state.group_perms.entry(group_id.to_string()).or_default();
				if perms.iter().any(|p| p == perm_name) {
					format!("group {group_id} already holds permission '{perm_name}'")
				} else {
					perms.push(perm_name.to_string());
					format!("granted permission '{perm_name}' to group {group_id}")
				}
			} else {
				let entries = state.user_perms.entry(user_id.to_string()).or_default();
				if entries.iter().any(|e| e.perm == perm_name && e.group == group_id) {
					format!("user {user_id} already holds permission '{perm_name}' in group {group_id}")
				} else {
					entries.push(store::PermEntry { perm: perm_name.to_string(), group: group_id.to_string() });
					format!("granted permission '{perm_name}' to user {user_id} in group {group_id}")
				}
			}
		};
		self.persist()?;
		Ok(message)
	}

	/// Revoke `perm_name` from `user_id` within `group_id` (or from the
	/// whole group if `user_id == "-1"`).
	pub fn remove_perm(&self, perm_name: &str, user_id: &str, group_id: &str) -> Result<String, PermError> {
		let message = {
			let mut state = self.state.write();
			if user_id == ALL_GROUPS {
				let had = state.group_perms.get_mut(group_id).is_some_and(|perms| {
					let before = perms.len();
					perms.retain(|p| p != perm_name);
					perms.len() != before
				});
				if had {
					format!("revoked permission '{perm_name}' from group {group_id}")
				} else {
					format!("group {group_id} does not hold permission '{perm_name}'")
				}
			} else {
				let had = state.user_perms.get_mut(user_id).is_some_and(|entries| {
					let before = entries.len();
					entries.retain(|e| !(e.perm == perm_name && e.group == group_id));
					entries.len() != before
				});
				if had {
					format!("revoked permission '{perm_name}' from user {user_id} in group {group_id}")
				} else {
					format!("user {user_id} does not hold permission '{perm_name}' in group {group_id}")
				}
			}
		};
		self.persist()?;
		Ok(message)
	}

	pub fn grant_global_perm(&self, perm_name: &str, user_id: &str) -> Result<String, PermError> {
		self.add_perm(perm_name, user_id, GLOBAL_GROUP)
	}

	pub fn revoke_global_perm(&self, perm_name: &str, user_id: &str) -> Result<String, PermError> {
		self.remove_perm(perm_name, user_id, GLOBAL_GROUP)
	}

	pub fn show_perms(&self) -> String {
		let state = self.state.read();
		if state.registered_perms.is_empty() {
			return "no permissions registered".to_string();
		}
		let mut names: Vec<_> = state.registered_perms.keys().collect();
		names.sort();
		let mut out = format!("registered permissions ({}):\n", names.len());
		for name in names {
			out.push_str(&format!("  {name}: {}\n", state.registered_perms[name]));
		}
		out
	}

	pub fn list_perms(&self) -> String {
		let state = self.state.read();
		let mut out = String::from("permission assignments:\n\ngroups:\n");
		if state.group_perms.is_empty() {
			out.push_str("  (none)\n");
		} else {
			let mut groups: Vec<_> = state.group_perms.keys().collect();
			groups.sort();
			for group_id in groups {
				let perms = &state.group_perms[group_id];
				if perms.is_empty() {
					continue;
				}
				out.push_str(&format!("  group {group_id}:\n"));
				for perm in perms {
					out.push_str(&format!("    - {perm}\n"));
				}
			}
		}

		out.push_str("\nusers:\n");
		if state.user_perms.is_empty() {
			out.push_str("  (none)\n");
		} else {
			let mut users: Vec<_> = state.user_perms.keys().collect();
			users.sort();
			for user_id in users {
				let entries = &state.user_perms[user_id];
				if entries.is_empty() {
					continue;
				}
				out.push_str(&format!("  user {user_id}:\n"));
				for entry in entries {
					let scope = if entry.group == GLOBAL_GROUP { " (global)".to_string() } else { format!(" (group: {})", entry.group) };
					out.push_str(&format!("    - {}{}\n", entry.perm, scope));
				}
			}
		}
		out
	}

	pub fn user_perms(&self, user_id: &str) -> Vec<(String, String)> {
		self.state.read().user_perms.get(user_id).map(|e| e.iter().map(|p| (p.perm.clone(), p.group.clone())).collect()).unwrap_or_default()
	}

	pub fn group_perms(&self, group_id: &str) -> Vec<String> {
		self.state.read().group_perms.get(group_id).cloned().unwrap_or_default()
	}

	pub fn clear_user_perms(&self, user_id: &str) -> Result<bool, PermError> {
		let removed = self.state.write().user_perms.remove(user_id).is_some();
		if removed {
			self.persist()?;
		}
		Ok(removed)
	}

	pub fn clear_group_perms(&self, group_id: &str) -> Result<bool, PermError> {
		let removed = self.state.write().group_perms.remove(group_id).is_some();
		if removed {
			self.persist()?;
		}
		Ok(removed)
	}

	fn persist(&self) -> Result<(), PermError> {
		self.state.read().save(&self.perm_file)
	}
}

/// A permission check target: either a single permission name, or an
/// any-of list where holding at least one member is sufficient.
pub enum PermQuery<'a> {
	Single(&'a str),
	AnyOf(&'a [&'a str]),
}

impl<'a> From<&'a str> for PermQuery<'a> {
	fn from(name: &'a str) -> Self {
		PermQuery::Single(name)
	}
}

impl<'a> From<&'a [&'a str]> for PermQuery<'a> {
	fn from(names: &'a [&'a str]) -> Self {
		PermQuery::AnyOf(names)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn temp_system() -> (tempfile::TempDir, PermSystem) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("coral.perms");
		let sys = PermSystem::load(&path).unwrap();
		(dir, sys)
	}

	#[test]
	fn console_bypasses_every_check() {
		let (_dir, sys) = temp_system();
		assert!(sys.check(PermQuery::Single("nonexistent"), CONSOLE_USER_ID, None));
	}

	#[test]
	fn unregistered_permission_defaults_to_allow() {
		let (_dir, sys) = temp_system();
		assert!(sys.check(PermQuery::Single("not_registered"), "42", Some("100")));
	}

	#[test]
	fn global_user_grant_applies_in_every_group() {
		let (_dir, sys) = temp_system();
		sys.register_perm("use_feature", "use the feature");
		sys.grant_global_perm("use_feature", "42").unwrap();

		assert!(sys.check(PermQuery::Single("use_feature"), "42", Some("100")));
		assert!(sys.check(PermQuery::Single("use_feature"), "42", Some("999")));
		assert!(sys.check(PermQuery::Single("use_feature"), "42", None));
		assert!(!sys.check(PermQuery::Single("use_feature"), "43", Some("100")));
	}

	#[test]
	fn group_scoped_grant_does_not_leak_to_other_groups() {
		let (_dir, sys) = temp_system();
		sys.register_perm("use_feature", "use the feature");
		sys.add_perm("use_feature", "42", "100").unwrap();

		assert!(sys.check(PermQuery::Single("use_feature"), "42", Some("100")));
		assert!(!sys.check(PermQuery::Single("use_feature"), "42", Some("200")));
	}

	#[test]
	fn group_level_grant_applies_to_every_member() {
		let (_dir, sys) = temp_system();
		sys.register_perm("use_feature", "use the feature");
		sys.add_perm("use_feature", ALL_GROUPS, "100").unwrap();

		assert!(sys.check(PermQuery::Single("use_feature"), "any_user", Some("100")));
		assert!(!sys.check(PermQuery::Single("use_feature"), "any_user", Some("200")));
	}

	#[test]
	fn global_group_grant_applies_everywhere() {
		let (_dir, sys) = temp_system();
		sys.register_perm("use_feature", "use the feature");
		sys.add_perm("use_feature", ALL_GROUPS, ALL_GROUPS).unwrap();

		assert!(sys.check(PermQuery::Single("use_feature"), "any_user", Some("100")));
		assert!(sys.check(PermQuery::Single("use_feature"), "any_user", Some("other")));
	}

	#[test]
	fn any_of_list_passes_if_one_member_resolves() {
		let (_dir, sys) = temp_system();
		sys.register_perm("a", "perm a");
		sys.register_perm("b", "perm b");
		sys.grant_global_perm("b", "42").unwrap();

		assert!(sys.check(PermQuery::AnyOf(&["a", "b"]), "42", None));
	}

	#[test]
	fn removing_absent_grant_reports_failure_without_erroring() {
		let (_dir, sys) = temp_system();
		sys.register_perm("use_feature", "use the feature");
		let msg = sys.remove_perm("use_feature", "42", "100").unwrap();
		assert!(msg.contains("does not hold"));
	}

	#[test]
	fn grants_persist_across_reloads() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("coral.perms");
		{
			let sys = PermSystem::load(&path).unwrap();
			sys.register_perm("use_feature", "use the feature");
			sys.grant_global_perm("use_feature", "42").unwrap();
		}
		let sys = PermSystem::load(&path).unwrap();
		sys.register_perm("use_feature", "use the feature");
		assert!(sys.check(PermQuery::Single("use_feature"), "42", Some("anything")));
	}
}
