//! On-disk shape of the permission store: a single JSON file holding user
//! and group grants. `registered_perms` is intentionally NOT persisted — it
//! is re-populated at process start as subsystems call `register_perm`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::PermError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PermEntry {
	pub perm: String,
	pub group: String,
}

#[derive(Default, Serialize, Deserialize)]
struct OnDisk {
	#[serde(default)]
	user_perms: HashMap<String, Vec<PermEntry>>,
	#[serde(default)]
	group_perms: HashMap<String, Vec<String>>,
}

pub(crate) struct PermStore {
	pub registered_perms: HashMap<String, String>,
	pub user_perms: HashMap<String, Vec<PermEntry>>,
	pub group_perms: HashMap<String, Vec<String>>,
}

impl PermStore {
	pub fn load_or_create(path: &Path) -> Result<Self, PermError> {
		if !path.exists() {
			info!(path = %path.display(), "permission file does not exist, creating a new one");
			let store = Self { registered_perms: HashMap::new(), user_perms: HashMap::new(), group_perms: HashMap::new() };
			store.save(path)?;
			return Ok(store);
		}

		let raw = std::fs::read_to_string(path).map_err(PermError::Io)?;
		match serde_json::from_str::<OnDisk>(&raw) {
			Ok(on_disk) => {
				info!(users = on_disk.user_perms.len(), groups = on_disk.group_perms.len(), "permission data loaded");
				Ok(Self { registered_perms: HashMap::new(), user_perms: on_disk.user_perms, group_perms: on_disk.group_perms })
			}
			Err(e) => {
				error!(error = %e, "failed to parse permission file, starting from an empty store");
				Ok(Self { registered_perms: HashMap::new(), user_perms: HashMap::new(), group_perms: HashMap::new() })
			}
		}
	}

	pub fn save(&self, path: &Path) -> Result<(), PermError> {
		let on_disk = OnDisk { user_perms: self.user_perms.clone(), group_perms: self.group_perms.clone() };
		let json = serde_json::to_vec_pretty(&on_disk).map_err(PermError::Serialize)?;
		aviary_util::atomic_file::write_atomic(path, &json).map_err(PermError::Io)
	}
}
