//! Talkgroup rule table.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Configuration bits of one talkgroup.
#[derive(Debug, Clone, Copy)]
pub struct TalkgroupRule {
	pub id: u32,
	pub active: bool,
	/// Calls are granted only to affiliated sources.
	pub affiliated: bool,
	/// Excluded from automatic channel preference.
	pub nonpreferred: bool,
	/// Clear voice attempts are denied.
	pub encrypted_only: bool,
	/// Preferred DMR slot, 0 when either will do.
	pub slot: u8,
}

impl TalkgroupRule {
	pub fn new(id: u32, active: bool) -> Self {
		Self {
			id,
			active,
			affiliated: false,
			nonpreferred: false,
			encrypted_only: false,
			slot: 0,
		}
	}
}

/// Rule table keyed by talkgroup ID, swapped whole on reload.
#[derive(Debug)]
pub struct TalkgroupRuleLookup {
	table: HashMap<u32, TalkgroupRule>,
	acl: bool,
	generation: AtomicU32,
}

impl TalkgroupRuleLookup {
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

	pub fn insert(&mut self, rule: TalkgroupRule) {
		self.table.insert(rule.id, rule);
		self.generation.fetch_add(1, Ordering::Relaxed);
	}

	pub fn remove(&mut self, id: u32) -> bool {
		let removed = self.table.remove(&id).is_some();
		if removed {
			self.generation.fetch_add(1, Ordering::Relaxed);
		}
		removed
	}

	pub fn find(&self, id: u32) -> Option<TalkgroupRule> {
		self.table.get(&id).copied()
	}

	pub fn len(&self) -> usize {
		self.table.len()
	}

	pub fn is_empty(&self) -> bool {
		self.table.is_empty()
	}

	pub fn generation(&self) -> u32 {
		self.generation.load(Ordering::Relaxed)
	}

	pub fn reload<I: IntoIterator<Item = TalkgroupRule>>(&mut self, entries: I) {
		self.table.clear();
		for rule in entries {
			self.table.insert(rule.id, rule);
		}
		self.generation.fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rules_round_trip() {
		let mut t = TalkgroupRuleLookup::new(true);
		let mut rule = TalkgroupRule::new(50, true);
		rule.affiliated = true;
		rule.slot = 2;
		t.insert(rule);

		let found = t.find(50).unwrap();
		assert!(found.affiliated);
		assert_eq!(found.slot, 2);
		assert!(t.find(51).is_none());
	}
}
