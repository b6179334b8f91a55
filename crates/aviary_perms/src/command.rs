//! The built-in `perms` command: `show`, `list`, `add`, `remove`, `grant`,
//! `revoke`. Wired into the registry by whichever crate bootstraps the
//! framework (see `aviary_server`), since only it knows the registry's
//! command-handler contract.

use crate::PermSystem;

const HELP: &str = "permission management\nusage:\n  perms show\n  perms list\n  perms add <perm> <user_id> [group_id]\n  perms remove <perm> <user_id> [group_id]\n  perms grant <perm> <user_id>\n  perms revoke <perm> <user_id>";

/// Handle a `perms <subcommand> [args...]` invocation and return the
/// response text.
pub fn perm_command(sys: &PermSystem, args: &[String]) -> String {
	let Some(subcommand) = args.first() else {
		return HELP.to_string();
	};

	match subcommand.as_str() {
		"show" => sys.show_perms(),
		"list" => sys.list_perms(),
		"add" => {
			let Some((perm, user_id, group_id)) = parse_perm_user_group(args) else {
				return "error: not enough arguments\nusage: perms add <perm> <user_id> <group_id>".to_string();
			};
			sys.add_perm(perm, user_id, &group_id).unwrap_or_else(|e| e.to_string())
		}
		"remove" => {
			let Some((perm, user_id, group_id)) = parse_perm_user_group(args) else {
				return "error: not enough arguments\nusage: perms remove <perm> <user_id> <group_id>".to_string();
			};
			sys.remove_perm(perm, user_id, &group_id).unwrap_or_else(|e| e.to_string())
		}
		"grant" => {
			if args.len() < 3 {
				return "error: not enough arguments\nusage: perms grant <perm> <user_id>".to_string();
			}
			sys.grant_global_perm(&args[1], &args[2]).unwrap_or_else(|e| e.to_string())
		}
		"revoke" => {
			if args.len() < 3 {
				return "error: not enough arguments\nusage: perms revoke <perm> <user_id>".to_string();
			}
			sys.revoke_global_perm(&args[1], &args[2]).unwrap_or_else(|e| e.to_string())
		}
		other => format!("error: unknown subcommand '{other}'\n{HELP}"),
	}
}

fn parse_perm_user_group(args: &[String]) -> Option<(&str, &str, String)> {
	if args.len() < 3 {
		return None;
	}
	let group_id = args.get(3).cloned().unwrap_or_else(|| "-1".to_string());
	Some((&args[1], &args[2], group_id))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn temp_system() -> (tempfile::TempDir, PermSystem) {
		let dir = tempfile::tempdir().unwrap();
		let sys = PermSystem::load(dir.path().join("coral.perms")).unwrap();
		(dir, sys)
	}

	fn args(parts: &[&str]) -> Vec<String> {
		parts.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn no_subcommand_shows_help() {
		let (_dir, sys) = temp_system();
		assert_eq!(perm_command(&sys, &[]), HELP);
	}

	#[test]
	fn add_then_show_reflects_the_grant() {
		let (_dir, sys) = temp_system();
		sys.register_perm("use_feature", "use the feature");
		let msg = perm_command(&sys, &args(&["add", "use_feature", "42", "100"]));
		assert!(msg.contains("granted"));
		assert!(sys.check(crate::PermQuery::Single("use_feature"), "42", Some("100")));
	}

	#[test]
	fn add_missing_group_defaults_to_global() {
		let (_dir, sys) = temp_system();
		sys.register_perm("use_feature", "use the feature");
		perm_command(&sys, &args(&["add", "use_feature", "42"]));
		assert!(sys.check(crate::PermQuery::Single("use_feature"), "42", Some("anything")));
	}
}
