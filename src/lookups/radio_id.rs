//! Radio ID ACL table.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// One radio ID entry. Membership is tri-state: absent entries are
/// "allow by default", present entries are explicitly enabled or disabled.
#[derive(Debug, Clone, Copy)]
pub struct RadioId {
	pub enabled: bool,
	/// True for the implicit entry returned on a miss.
	pub default: bool,
}

impl RadioId {
	const DEFAULT: RadioId = RadioId {
		enabled: false,
		default: true,
	};
}

/// Whitelist/blacklist table for subscriber radio IDs.
///
/// Readers hold an `Arc` snapshot; a reload builds a fresh table and swaps
/// it in whole, bumping the generation counter.
#[derive(Debug)]
pub struct RadioIdLookup {
	table: HashMap<u32, bool>,
	acl: bool,
	generation: AtomicU32,
}

impl RadioIdLookup {
	pub fn new(acl: bool) -> Self {
		Self {
			table: HashMap::new(),
			acl,
			generation: AtomicU32::new(0),
		}
	}

	pub fn acl_enabled(&self) -> bool {
		self.acl
	}

	pub fn insert(&mut self, id: u32, enabled: bool) {
		self.table.insert(id, enabled);
		self.generation.fetch_add(1, Ordering::Relaxed);
	}

	pub fn remove(&mut self, id: u32) -> bool {
		let removed = self.table.remove(&id).is_some();
		if removed {
			self.generation.fetch_add(1, Ordering::Relaxed);
		}
		removed
	}

	pub fn find(&self, id: u32) -> RadioId {
		match self.table.get(&id) {
			Some(enabled) => RadioId {
				enabled: *enabled,
				default: false,
			},
			None => RadioId::DEFAULT,
		}
	}

	pub fn len(&self) -> usize {
		self.table.len()
	}

	pub fn is_empty(&self) -> bool {
		self.table.is_empty()
	}

	/// Monotonic reload counter; bumped by every mutation or table swap.
	pub fn generation(&self) -> u32 {
		self.generation.load(Ordering::Relaxed)
	}

	/// Replaces the whole table, as the file reload machinery does.
	pub fn reload<I: IntoIterator<Item = (u32, bool)>>(&mut self, entries: I) {
		self.table.clear();
		self.table.extend(entries);
		self.generation.fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tristate_lookup() {
		let mut t = RadioIdLookup::new(true);
		t.insert(1, true);
		t.insert(2, false);

		assert!(t.find(1).enabled);
		assert!(!t.find(2).enabled);
		assert!(t.find(3).default);
		assert!(!t.find(1).default);
	}

	#[test]
	fn reload_bumps_generation() {
		let mut t = RadioIdLookup::new(true);
		let g0 = t.generation();
		t.reload([(5, true), (6, false)]);
		assert!(t.generation() > g0);
		assert_eq!(t.len(), 2);
		assert!(t.find(5).enabled);
	}
}
