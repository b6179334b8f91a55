//! String interning for platform/protocol tags.
//!
//! Platform routing happens by lower-cased string comparison all over the
//! framework (adapter selection, command dispatch, bot directories). Rather
//! than re-lowercasing and re-allocating a `String` on every lookup, callers
//! intern the tag once and carry the resulting `Arc<str>` around; equality
//! and hashing are then just the usual `Arc<str>` comparisons, with the
//! original wire string still available via `as_str`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// A pool of interned, lower-cased tags (platform names, protocol tags).
#[derive(Default)]
pub struct Interner {
	tags: RwLock<HashMap<String, Arc<str>>>,
}

impl Interner {
	pub fn new() -> Self {
		Self::default()
	}

	/// Intern `raw`, normalizing to lowercase first. Repeated calls with the
	/// same (case-insensitive) value return a clone of the same `Arc<str>`.
	pub fn intern(&self, raw: &str) -> Arc<str> {
		let key = raw.to_ascii_lowercase();

		if let Some(existing) = self.tags.read().unwrap().get(&key) {
			return Arc::clone(existing);
		}

		let mut tags = self.tags.write().unwrap();
		// Re-check under the write lock in case another writer beat us to it.
		if let Some(existing) = tags.get(&key) {
			return Arc::clone(existing);
		}
		let interned: Arc<str> = Arc::from(key.clone());
		tags.insert(key, Arc::clone(&interned));
		interned
	}

	pub fn len(&self) -> usize {
		self.tags.read().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// The process-wide interner used by `Platform`/protocol-tag lookups.
pub fn global() -> &'static Interner {
	static GLOBAL: OnceLock<Interner> = OnceLock::new();
	GLOBAL.get_or_init(Interner::new)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn interning_same_value_case_insensitively_returns_identical_pointer() {
		let pool = Interner::new();
		let a = pool.intern("OneBot");
		let b = pool.intern("onebot");
		assert!(Arc::ptr_eq(&a, &b));
		assert_eq!(&*a, "onebot");
	}

	#[test]
	fn distinct_values_intern_distinctly() {
		let pool = Interner::new();
		let a = pool.intern("onebot");
		let b = pool.intern("console");
		assert!(!Arc::ptr_eq(&a, &b));
		assert_eq!(pool.len(), 2);
	}
}
