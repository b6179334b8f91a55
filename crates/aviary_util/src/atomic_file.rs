//! Atomic "write temp file, then rename" helper.
//!
//! Every store that persists to a single JSON file on disk (the permission
//! store, the plugin metadata cache) needs writes that never leave a reader
//! looking at a half-written file. `write_atomic` writes to a sibling temp
//! file in the same directory (so the final `rename` is same-filesystem and
//! therefore atomic on POSIX) and only then replaces the target.

use std::io;
use std::path::Path;

use tracing::debug;

/// Write `contents` to `path` atomically.
///
/// Creates parent directories if missing. The temp file is named
/// `<filename>.tmp-<pid>` so concurrent writers from distinct processes
/// don't collide.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			std::fs::create_dir_all(parent)?;
		}
	}

	let file_name = path
		.file_name()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
	let tmp_name = format!("{}.tmp-{}", file_name.to_string_lossy(), std::process::id());
	let tmp_path = path.with_file_name(tmp_name);

	std::fs::write(&tmp_path, contents)?;
	std::fs::rename(&tmp_path, path)?;
	debug!(path = %path.display(), bytes = contents.len(), "wrote file atomically");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn writes_and_overwrites_atomically() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("data.json");

		write_atomic(&path, b"{\"a\":1}").unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":1}");

		write_atomic(&path, b"{\"a\":2}").unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":2}");

		// no leftover temp files
		let siblings: Vec<_> = std::fs::read_dir(path.parent().unwrap())
			.unwrap()
			.filter_map(|e| e.ok())
			.collect();
		assert_eq!(siblings.len(), 1);
	}
}
