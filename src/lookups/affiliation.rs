//! Subscriber registration, group affiliation and channel grant
//! bookkeeping for one protocol instance.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::timers::Timer;

/// Release notifications produced by [`AffiliationLookup::clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantRelease {
	pub ch_no: u32,
	pub dst_id: u32,
	pub slot: u8,
}

/// Where to reach the voice channel serving a channel number.
#[derive(Debug, Clone, Default)]
pub struct VoiceChData {
	pub ch_no: u32,
	pub address: String,
	pub port: u16,
}

impl VoiceChData {
	pub fn new(ch_no: u32, address: impl Into<String>, port: u16) -> Self {
		Self {
			ch_no,
			address: address.into(),
			port,
		}
	}

	pub fn is_valid(&self) -> bool {
		self.ch_no != 0 && !self.address.is_empty() && self.port > 0
	}
}

struct Grant {
	ch_no: u32,
	src_id: u32,
	slot: u8,
	group: bool,
	net_granted: bool,
	timer: Timer,
	timeout_secs: u32,
}

/// Dynamic affiliation state: a unit registration set, a one-group-per-unit
/// affiliation map, and the destination→channel grant table with per-entry
/// countdown timers over an RF channel pool.
pub struct AffiliationLookup {
	name: &'static str,

	rf_ch_pool: Vec<u32>,
	rf_ch_free: Vec<u32>,
	rf_ch_data: HashMap<u32, VoiceChData>,

	unit_reg: Vec<u32>,
	group_aff: HashMap<u32, u32>,

	grants: HashMap<u32, Grant>,

	on_release: Option<Box<dyn FnMut(u32, u32, u8) + Send>>,

	verbose: bool,
}

impl AffiliationLookup {
	pub fn new(name: &'static str, verbose: bool) -> Self {
		Self {
			name,
			rf_ch_pool: Vec::new(),
			rf_ch_free: Vec::new(),
			rf_ch_data: HashMap::new(),
			unit_reg: Vec::new(),
			group_aff: HashMap::new(),
			grants: HashMap::new(),
			on_release: None,
			verbose,
		}
	}

	/// Publishes the release hook C7 uses to emit protocol release OSPs.
	pub fn set_release_callback<F: FnMut(u32, u32, u8) + Send + 'static>(&mut self, f: F) {
		self.on_release = Some(Box::new(f));
	}

	/*
	** RF channel pool
	*/

	pub fn add_rf_ch(&mut self, ch_no: u32) {
		if !self.rf_ch_pool.contains(&ch_no) {
			self.rf_ch_pool.push(ch_no);
			self.rf_ch_free.push(ch_no);
		}
	}

	pub fn set_rf_ch_data(&mut self, data: VoiceChData) {
		self.rf_ch_data.insert(data.ch_no, data);
	}

	pub fn rf_ch_data(&self, ch_no: u32) -> Option<&VoiceChData> {
		self.rf_ch_data.get(&ch_no)
	}

	pub fn is_rf_ch_available(&self) -> bool {
		!self.rf_ch_free.is_empty()
	}

	pub fn rf_ch_count(&self) -> usize {
		self.rf_ch_pool.len()
	}

	pub fn rf_ch_free_count(&self) -> usize {
		self.rf_ch_free.len()
	}

	/// Configured voice channels, for the admin report surface.
	pub fn rf_ch_list(&self) -> &[u32] {
		&self.rf_ch_pool
	}

	/*
	** Unit registration
	*/

	pub fn unit_reg(&mut self, src_id: u32) {
		if !self.is_unit_reg(src_id) {
			self.unit_reg.push(src_id);
			if self.verbose {
				info!("{}, unit registration, srcId = {}", self.name, src_id);
			}
		}
	}

	pub fn unit_dereg(&mut self, src_id: u32) -> bool {
		let Some(pos) = self.unit_reg.iter().position(|id| *id == src_id) else {
			return false;
		};
		self.unit_reg.remove(pos);
		self.group_unaff(src_id);
		if self.verbose {
			info!("{}, unit deregistration, srcId = {}", self.name, src_id);
		}
		true
	}

	pub fn is_unit_reg(&self, src_id: u32) -> bool {
		self.unit_reg.contains(&src_id)
	}

	pub fn unit_reg_size(&self) -> usize {
		self.unit_reg.len()
	}

	pub fn unit_reg_table(&self) -> &[u32] {
		&self.unit_reg
	}

	/// Releases every registration (admin clear).
	pub fn clear_unit_reg(&mut self) {
		self.unit_reg.clear();
		self.group_aff.clear();
	}

	/*
	** Group affiliation
	*/

	/// Affiliates `src_id`, replacing any prior group.
	pub fn group_aff(&mut self, src_id: u32, dst_id: u32) {
		self.group_aff.insert(src_id, dst_id);
		if self.verbose {
			info!(
				"{}, group affiliation, srcId = {}, dstId = {}",
				self.name, src_id, dst_id
			);
		}
	}

	pub fn group_unaff(&mut self, src_id: u32) -> bool {
		self.group_aff.remove(&src_id).is_some()
	}

	pub fn is_group_aff(&self, src_id: u32, dst_id: u32) -> bool {
		self.group_aff.get(&src_id) == Some(&dst_id)
	}

	/// True when any unit is affiliated to `dst_id`.
	pub fn has_group_aff(&self, dst_id: u32) -> bool {
		self.group_aff.values().any(|dst| *dst == dst_id)
	}

	pub fn group_aff_size(&self) -> usize {
		self.group_aff.len()
	}

	pub fn group_aff_table(&self) -> &HashMap<u32, u32> {
		&self.group_aff
	}

	/// Clears affiliations to `dst_id` (or all of them); returns the units
	/// that were released.
	pub fn clear_group_aff(&mut self, dst_id: u32, release_all: bool) -> SmallVec<[u32; 8]> {
		let mut released = SmallVec::new();
		self.group_aff.retain(|src, dst| {
			if release_all || *dst == dst_id {
				released.push(*src);
				false
			} else {
				true
			}
		});
		released
	}

	/*
	** Channel grants
	*/

	/// Grants the first free channel to `dst_id`. Fails when the pool is
	/// exhausted or the destination already holds a grant.
	pub fn grant_ch(
		&mut self,
		dst_id: u32,
		src_id: u32,
		timeout_secs: u32,
		group: bool,
		net_granted: bool,
	) -> bool {
		self.grant_ch_slot(dst_id, src_id, timeout_secs, 0, group, net_granted)
	}

	/// Slot-aware grant used by DMR; `slot` 0 claims the whole channel.
	pub fn grant_ch_slot(
		&mut self,
		dst_id: u32,
		src_id: u32,
		timeout_secs: u32,
		slot: u8,
		group: bool,
		net_granted: bool,
	) -> bool {
		if self.grants.contains_key(&dst_id) {
			return false;
		}
		let Some(ch_no) = self.rf_ch_free.first().copied() else {
			return false;
		};

		self.rf_ch_free.retain(|ch| *ch != ch_no);

		let mut timer = Timer::new(1000, timeout_secs, 0);
		timer.start();
		self.grants.insert(
			dst_id,
			Grant {
				ch_no,
				src_id,
				slot,
				group,
				net_granted,
				timer,
				timeout_secs,
			},
		);

		if self.verbose {
			info!(
				"{}, granting channel, chNo = {}, dstId = {}, srcId = {}, group = {}",
				self.name, ch_no, dst_id, src_id, group
			);
		}
		true
	}

	/// Restarts the grant countdown for `dst_id`.
	pub fn touch_grant(&mut self, dst_id: u32) {
		if let Some(grant) = self.grants.get_mut(&dst_id) {
			let secs = grant.timeout_secs;
			grant.timer.set_timeout(secs, 0);
			grant.timer.start();
		}
	}

	/// Releases the grant for `dst_id`. With `release_all`, every grant
	/// sharing the same physical channel goes too (DMR two-slot channels).
	pub fn release_grant(&mut self, dst_id: u32, release_all: bool) -> bool {
		let Some(ch_no) = self.grants.get(&dst_id).map(|g| g.ch_no) else {
			return false;
		};

		let victims: SmallVec<[u32; 4]> = if release_all {
			self.grants
				.iter()
				.filter(|(_, g)| g.ch_no == ch_no)
				.map(|(dst, _)| *dst)
				.collect()
		} else {
			SmallVec::from_slice(&[dst_id])
		};

		for dst in victims {
			if let Some(grant) = self.grants.remove(&dst) {
				if !self.rf_ch_free.contains(&grant.ch_no)
					&& self.rf_ch_pool.contains(&grant.ch_no)
				{
					self.rf_ch_free.push(grant.ch_no);
				}
				if self.verbose {
					info!(
						"{}, releasing grant, chNo = {}, dstId = {}",
						self.name, grant.ch_no, dst
					);
				}
			}
		}
		true
	}

	/// Releases every grant (admin clear).
	pub fn release_all_grants(&mut self) {
		let dsts: SmallVec<[u32; 8]> = self.grants.keys().copied().collect();
		for dst in dsts {
			self.release_grant(dst, false);
		}
	}

	pub fn is_granted(&self, dst_id: u32) -> bool {
		self.grants.contains_key(&dst_id)
	}

	pub fn is_ch_busy(&self, ch_no: u32) -> bool {
		self.grants.values().any(|g| g.ch_no == ch_no)
	}

	pub fn granted_ch(&self, dst_id: u32) -> Option<u32> {
		self.grants.get(&dst_id).map(|g| g.ch_no)
	}

	pub fn granted_src(&self, dst_id: u32) -> Option<u32> {
		self.grants.get(&dst_id).map(|g| g.src_id)
	}

	pub fn granted_slot(&self, dst_id: u32) -> Option<u8> {
		self.grants.get(&dst_id).map(|g| g.slot)
	}

	pub fn is_net_granted(&self, dst_id: u32) -> bool {
		self.grants.get(&dst_id).is_some_and(|g| g.net_granted)
	}

	pub fn is_group_granted(&self, dst_id: u32) -> bool {
		self.grants.get(&dst_id).is_some_and(|g| g.group)
	}

	pub fn grant_size(&self) -> usize {
		self.grants.len()
	}

	/// Snapshot of the grant table for status reports.
	pub fn grant_table(&self) -> Vec<(u32, u32, u32, u8)> {
		self.grants
			.iter()
			.map(|(dst, g)| (*dst, g.ch_no, g.src_id, g.slot))
			.collect()
	}

	/// Advances the grant timers; expired grants are released and
	/// reported (and handed to the release callback, if any).
	pub fn clock(&mut self, ms: u32) -> SmallVec<[GrantRelease; 2]> {
		let mut expired: SmallVec<[GrantRelease; 2]> = SmallVec::new();

		for (dst, grant) in self.grants.iter_mut() {
			grant.timer.clock(ms);
			if grant.timer.is_running() && grant.timer.has_expired() {
				expired.push(GrantRelease {
					ch_no: grant.ch_no,
					dst_id: *dst,
					slot: grant.slot,
				});
			}
		}

		for rel in &expired {
			warn!(
				"{}, grant timeout, chNo = {}, dstId = {}",
				self.name, rel.ch_no, rel.dst_id
			);
			self.release_grant(rel.dst_id, false);
			if let Some(cb) = self.on_release.as_mut() {
				cb(rel.ch_no, rel.dst_id, rel.slot);
			}
		}

		expired
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table() -> AffiliationLookup {
		let mut t = AffiliationLookup::new("TEST", false);
		t.add_rf_ch(7);
		t.add_rf_ch(8);
		t
	}

	#[test]
	fn unit_reg_is_idempotent() {
		let mut t = table();
		t.unit_reg(100);
		t.unit_reg(100);
		assert_eq!(t.unit_reg_size(), 1);
		assert!(t.is_unit_reg(100));

		assert!(t.unit_dereg(100));
		assert!(!t.unit_dereg(100));
	}

	#[test]
	fn dereg_clears_affiliation() {
		let mut t = table();
		t.unit_reg(100);
		t.group_aff(100, 50);
		assert!(t.is_group_aff(100, 50));
		t.unit_dereg(100);
		assert!(!t.is_group_aff(100, 50));
	}

	#[test]
	fn group_aff_overwrites() {
		let mut t = table();
		t.group_aff(100, 50);
		t.group_aff(100, 51);
		assert!(!t.is_group_aff(100, 50));
		assert!(t.is_group_aff(100, 51));
		assert_eq!(t.group_aff_size(), 1);
	}

	#[test]
	fn clear_group_aff_reports_units() {
		let mut t = table();
		t.group_aff(100, 50);
		t.group_aff(101, 50);
		t.group_aff(102, 51);

		let released = t.clear_group_aff(50, false);
		assert_eq!(released.len(), 2);
		assert!(released.contains(&100));
		assert!(released.contains(&101));
		assert!(t.is_group_aff(102, 51));
	}

	#[test]
	fn grant_pool_invariant() {
		let mut t = table();
		assert_eq!(t.grant_size() + t.rf_ch_free_count(), t.rf_ch_count());

		assert!(t.grant_ch(50, 1001, 15, true, false));
		assert_eq!(t.granted_ch(50), Some(7));
		assert_eq!(t.granted_src(50), Some(1001));
		assert!(t.is_ch_busy(7));
		assert_eq!(t.grant_size() + t.rf_ch_free_count(), t.rf_ch_count());

		assert!(t.grant_ch(51, 1002, 15, true, false));
		assert_eq!(t.granted_ch(51), Some(8));
		assert!(!t.is_rf_ch_available());

		// pool exhausted
		assert!(!t.grant_ch(52, 1003, 15, true, false));

		assert!(t.release_grant(50, false));
		assert_eq!(t.grant_size() + t.rf_ch_free_count(), t.rf_ch_count());
		assert!(!t.is_ch_busy(7));

		// releasing twice is a no-op
		assert!(!t.release_grant(50, false));
	}

	#[test]
	fn grant_timer_expiry_fires_once() {
		let mut t = table();
		assert!(t.grant_ch(50, 1001, 15, true, false));

		// 14.9 s: still held
		assert!(t.clock(14_900).is_empty());
		// past 15 s
		let released = t.clock(200);
		assert_eq!(released.len(), 1);
		assert_eq!(
			released[0],
			GrantRelease {
				ch_no: 7,
				dst_id: 50,
				slot: 0
			}
		);
		assert!(!t.is_granted(50));
		assert_eq!(t.rf_ch_free_count(), 2);

		// no further firing
		assert!(t.clock(20_000).is_empty());
	}

	#[test]
	fn touch_grant_defers_expiry() {
		let mut t = table();
		assert!(t.grant_ch(50, 1001, 15, true, false));

		assert!(t.clock(10_000).is_empty());
		t.touch_grant(50);
		// another 10 s would have expired the untouched grant
		assert!(t.clock(10_000).is_empty());
		assert!(t.is_granted(50));
		assert_eq!(t.clock(5_100).len(), 1);
	}

	#[test]
	fn release_all_covers_shared_channel() {
		let mut t = AffiliationLookup::new("TEST", false);
		t.add_rf_ch(7);
		// DMR-style: both slots of channel 7
		assert!(t.grant_ch_slot(50, 1001, 15, 1, true, false));
		// second slot grant goes on the same channel only if the pool had
		// returned it; emulate the controller reusing the channel
		assert_eq!(t.granted_ch(50), Some(7));

		assert!(t.release_grant(50, true));
		assert_eq!(t.rf_ch_free_count(), 1);
	}
}
