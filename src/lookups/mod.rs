//! In-memory lookup tables: radio ID ACLs, talkgroup rules, and the
//! per-protocol affiliation/grant bookkeeping.
//!
//! The ACL tables are read-mostly; writers swap whole snapshots behind an
//! [`std::sync::Arc`] and bump a generation counter. The affiliation table
//! is exclusively owned by its protocol controller.

pub mod affiliation;
pub mod radio_id;
pub mod talkgroup;

pub use affiliation::{AffiliationLookup, VoiceChData};
pub use radio_id::{RadioId, RadioIdLookup};
pub use talkgroup::{TalkgroupRule, TalkgroupRuleLookup};

use std::sync::Arc;

/// Validates a source radio ID against the RID ACL.
pub fn validate_src_id(rid_lookup: &Arc<RadioIdLookup>, id: u32) -> bool {
	let rid = rid_lookup.find(id);
	if !rid_lookup.acl_enabled() {
		// with ACLs off only an explicit Disabled entry rejects
		return rid.default || rid.enabled;
	}
	rid.enabled
}

/// Validates a talkgroup ID against the TG rule table.
pub fn validate_tg_id(tid_lookup: &Arc<TalkgroupRuleLookup>, id: u32) -> bool {
	// TG0 is never valid
	if id == 0 {
		return false;
	}

	if !tid_lookup.acl_enabled() {
		return true;
	}

	match tid_lookup.find(id) {
		Some(rule) => rule.active,
		None => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn src_validation_tristate() {
		let mut table = RadioIdLookup::new(true);
		table.insert(100, true);
		table.insert(200, false);
		let table = Arc::new(table);

		assert!(validate_src_id(&table, 100));
		assert!(!validate_src_id(&table, 200));
		// unknown RID with ACL on: default entries are not enabled
		assert!(!validate_src_id(&table, 300));

		let mut open = RadioIdLookup::new(false);
		open.insert(200, false);
		let open = Arc::new(open);
		// ACL off: everything except explicit Disabled passes
		assert!(validate_src_id(&open, 300));
		assert!(!validate_src_id(&open, 200));
	}

	#[test]
	fn tg_validation() {
		let mut table = TalkgroupRuleLookup::new(true);
		table.insert(TalkgroupRule::new(10, true));
		table.insert(TalkgroupRule::new(11, false));
		let table = Arc::new(table);

		assert!(!validate_tg_id(&table, 0));
		assert!(validate_tg_id(&table, 10));
		assert!(!validate_tg_id(&table, 11));
		assert!(!validate_tg_id(&table, 99));

		let open = Arc::new(TalkgroupRuleLookup::new(false));
		assert!(validate_tg_id(&open, 99));
		assert!(!validate_tg_id(&open, 0));
	}
}
