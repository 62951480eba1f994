//! DMR control: per-slot call state machines and the Tier III trunking
//! control channel (TSCC).
//!
//! Slot 1 carries the TSCC when control is enabled; both slots carry
//! voice/data traffic. Grants allocate a logical channel and slot out of
//! the shared pool, so one physical channel can serve two calls.

use std::sync::Arc;

use super::csbk::{self, Csbk};
use super::lc::FullLc;
use super::slot_type::SlotType;
use super::{
	AMBE_LENGTH_BYTES, DEFAULT_SILENCE_THRESHOLD, DataType, FRAME_LENGTH_BYTES,
	TSCC_REASON_ACCEPTED, TSCC_REASON_NO_RESOURCE, TSCC_REASON_NOT_PERMITTED, WUID_FNE,
};
use crate::bits::{read_bit, write_bit};
use crate::edac::{ambe, bptc};
use crate::lookups::{
	AffiliationLookup, RadioIdLookup, TalkgroupRuleLookup, validate_src_id, validate_tg_id,
};
use crate::modem::{TAG_DATA, TAG_EOT, TxQueue};
use crate::network::{FneNetwork, NetSubFunc, PeerRpc, RPC_DEADLINE, RpcOp, rpc};
use crate::timers::Timer;
use crate::{NetState, RfState, SiteData};

/// Tunables of the DMR machine.
#[derive(Debug, Clone)]
pub struct DmrConfig {
	pub enabled: bool,
	pub authoritative: bool,
	pub supervisor: bool,
	/// Slot 1 runs as a dedicated TSCC.
	pub dedicated_control: bool,
	pub verify_aff: bool,
	pub verify_reg: bool,
	pub ignore_affiliation_check: bool,
	pub color_code: u8,
	pub call_timeout_secs: u32,
	pub rf_tg_hang_secs: u32,
	pub net_tg_hang_secs: u32,
	pub rejection_hang_secs: u32,
	pub grant_timeout_secs: u32,
	pub cc_bcast_interval_ms: u32,
	pub silence_threshold: u32,
	pub verbose: bool,
	pub debug: bool,
}

impl Default for DmrConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			authoritative: true,
			supervisor: false,
			dedicated_control: false,
			verify_aff: false,
			verify_reg: false,
			ignore_affiliation_check: false,
			color_code: 1,
			call_timeout_secs: 180,
			rf_tg_hang_secs: 5,
			net_tg_hang_secs: 5,
			rejection_hang_secs: 1,
			grant_timeout_secs: 15,
			cc_bcast_interval_ms: 4500,
			silence_threshold: DEFAULT_SILENCE_THRESHOLD,
			verbose: false,
			debug: false,
		}
	}
}

/// Per-slot call state.
struct Slot {
	slot_no: u8,
	rf_state: RfState,
	net_state: NetState,
	rf_last_dst: u32,
	rf_last_src: u32,
	net_last_dst: u32,
	net_last_src: u32,
	/// Destination the FNE last permitted on this slot.
	permitted_dst: u32,
	rf_lc: Option<FullLc>,
	rf_timeout: Timer,
	rf_tg_hang: Timer,
	net_timeout: Timer,
	net_tg_hang: Timer,
	rejection_timer: Timer,
	rf_frames: u32,
	rf_bits: u32,
	rf_errs: u32,
	rf_call_errs: u32,
	rf_stream_id: u32,
}

impl Slot {
	fn new(slot_no: u8, config: &DmrConfig) -> Self {
		Self {
			slot_no,
			rf_state: RfState::Listening,
			net_state: NetState::Idle,
			rf_last_dst: 0,
			rf_last_src: 0,
			net_last_dst: 0,
			net_last_src: 0,
			permitted_dst: 0,
			rf_lc: None,
			rf_timeout: Timer::new(1000, config.call_timeout_secs, 0),
			rf_tg_hang: Timer::new(1000, config.rf_tg_hang_secs, 0),
			net_timeout: Timer::new(1000, config.call_timeout_secs, 0),
			net_tg_hang: Timer::new(1000, config.net_tg_hang_secs, 0),
			rejection_timer: Timer::new(1000, config.rejection_hang_secs, 0),
			rf_frames: 0,
			rf_bits: 0,
			rf_errs: 0,
			rf_call_errs: 0,
			rf_stream_id: 0,
		}
	}
}

/// The DMR protocol controller: two slots over one physical channel.
pub struct DmrControl {
	config: DmrConfig,
	site: SiteData,

	slots: [Slot; 2],

	cc_bcast_timer: Timer,
	cc_seq: u8,

	affiliations: AffiliationLookup,

	rid_lookup: Arc<RadioIdLookup>,
	tid_lookup: Arc<TalkgroupRuleLookup>,
	tx_queue: Arc<TxQueue>,
}

impl DmrControl {
	pub fn new(
		config: DmrConfig,
		site: SiteData,
		rid_lookup: Arc<RadioIdLookup>,
		tid_lookup: Arc<TalkgroupRuleLookup>,
		tx_queue: Arc<TxQueue>,
	) -> Self {
		let mut cc_bcast_timer = Timer::millis();
		cc_bcast_timer.set_timeout(0, config.cc_bcast_interval_ms);
		cc_bcast_timer.start();

		Self {
			site,
			slots: [Slot::new(1, &config), Slot::new(2, &config)],
			cc_bcast_timer,
			cc_seq: 0,
			affiliations: AffiliationLookup::new("DMR", config.verbose),
			rid_lookup,
			tid_lookup,
			tx_queue,
			config,
		}
	}

	pub fn rf_state(&self, slot_no: u8) -> RfState {
		self.slots[slot_index(slot_no)].rf_state
	}

	pub fn net_state(&self, slot_no: u8) -> NetState {
		self.slots[slot_index(slot_no)].net_state
	}

	pub fn affiliations(&self) -> &AffiliationLookup {
		&self.affiliations
	}

	pub fn affiliations_mut(&mut self) -> &mut AffiliationLookup {
		&mut self.affiliations
	}

	/// Publishes a fresh radio ID ACL snapshot.
	pub fn set_rid_lookup(&mut self, rid_lookup: Arc<RadioIdLookup>) {
		self.rid_lookup = rid_lookup;
	}

	/// Publishes a fresh talkgroup rule snapshot.
	pub fn set_tid_lookup(&mut self, tid_lookup: Arc<TalkgroupRuleLookup>) {
		self.tid_lookup = tid_lookup;
	}

	/// Starts or stops dedicated control channel operation.
	pub fn set_control_enabled(&mut self, enabled: bool) {
		if self.config.dedicated_control != enabled {
			info!("DMR, control channel {}", if enabled { "enabled" } else { "disabled" });
		}
		self.config.dedicated_control = enabled;
	}

	/*
	** RF path
	*/

	/// Processes one tag-stripped 33-byte burst from the modem.
	pub fn process_rf(
		&mut self,
		slot_no: u8,
		data: &[u8],
		net: &mut FneNetwork,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		if !self.config.enabled || data.len() < FRAME_LENGTH_BYTES {
			return false;
		}

		match SlotType::decode(data) {
			Ok(st) => {
				if st.color_code != self.config.color_code {
					return false;
				}
				match st.data_type {
					DataType::CsbK => self.process_rf_csbk(slot_no, data, net, peer_rpc),
					DataType::VoiceLcHeader => self.process_rf_voice_header(slot_no, data, net),
					DataType::TerminatorWithLc => {
						self.process_rf_eot(slot_no, data, net);
						true
					}
					DataType::Idle => true,
					DataType::DataHeader | DataType::Rate12Data | DataType::Rate34Data => {
						self.process_rf_data(slot_no, data)
					}
					DataType::Voice | DataType::VoiceSync => false,
				}
			}
			// bursts without a decodable slot type are voice
			Err(_) => self.process_rf_voice(slot_no, data, net),
		}
	}

	fn process_rf_csbk(
		&mut self,
		slot_no: u8,
		data: &[u8],
		net: &mut FneNetwork,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		let csbk = match Csbk::decode(data) {
			Ok(csbk) => csbk,
			Err(err) => {
				debug!("DMR Slot {slot_no}, undecodable CSBK, {err}");
				return false;
			}
		};

		let (src_id, dst_id) = csbk.ids();

		match &csbk {
			Csbk::Rand(req) => {
				if self.config.verbose {
					info!(
						"DMR Slot {slot_no}, {}, serviceKind = ${:02X}, srcId = {src_id}, dstId = {dst_id}",
						csbk.name(),
						req.service_kind
					);
				}
				match req.service_kind {
					csbk::service_kind::GRP_VOICE => {
						if !self.acl_check_rf(slot_no, src_id, dst_id, true) {
							return false;
						}
						if self.config.authoritative {
							self.write_rf_grant(
								slot_no,
								src_id,
								dst_id,
								req.service_options,
								true,
								false,
								peer_rpc,
							);
						} else {
							net.write_grant_req(NetSubFunc::Dmr, src_id, dst_id, slot_no, false);
						}
					}
					csbk::service_kind::IND_VOICE => {
						if !self.acl_check_rf(slot_no, src_id, dst_id, false) {
							return false;
						}
						if self.config.authoritative {
							self.write_rf_grant(
								slot_no,
								src_id,
								dst_id,
								req.service_options,
								false,
								false,
								peer_rpc,
							);
						} else {
							net.write_grant_req(NetSubFunc::Dmr, src_id, dst_id, slot_no, true);
						}
					}
					csbk::service_kind::REG_SVC => {
						self.write_rf_reg_rsp(slot_no, src_id, dst_id, net);
					}
					_ => {
						self.write_rf_ack(
							slot_no,
							src_id,
							dst_id,
							req.service_kind,
							TSCC_REASON_NOT_PERMITTED,
							true,
						);
					}
				}
			}
			Csbk::UuVReq(_) => {
				if !self.acl_check_rf(slot_no, src_id, dst_id, false) {
					return false;
				}
				// repeat the request toward the target unit
				self.write_rf_csbk(slot_no, &csbk, false);
			}
			Csbk::UuAnsRsp(_) => {
				self.write_rf_csbk(slot_no, &csbk, false);
			}
			Csbk::ExtFnct(v) => {
				if self.config.verbose {
					info!(
						"DMR Slot {slot_no}, {}, func = ${:02X}, srcId = {src_id}, dstId = {dst_id}",
						csbk.name(),
						v.function
					);
				}
				self.write_rf_csbk(slot_no, &csbk, false);
			}
			Csbk::Bsdwnact(_) => {
				if self.config.verbose {
					info!("DMR Slot {slot_no}, {}, srcId = {src_id}", csbk.name());
				}
			}
			_ => {
				warn!("DMR Slot {slot_no}, unhandled CSBK on RF path, {}", csbk.name());
			}
		}

		true
	}

	fn process_rf_voice_header(
		&mut self,
		slot_no: u8,
		data: &[u8],
		net: &mut FneNetwork,
	) -> bool {
		let mut payload = [0u8; 12];
		if bptc::decode(data, &mut payload).is_err() {
			self.slots[slot_index(slot_no)].rf_state = RfState::LateEntry;
			return false;
		}
		let Ok(lc) = FullLc::decode(&payload) else {
			self.slots[slot_index(slot_no)].rf_state = RfState::LateEntry;
			return false;
		};

		if !self.acl_check_rf(slot_no, lc.src_id, lc.dst_id, lc.group) {
			return false;
		}

		let slot = &mut self.slots[slot_index(slot_no)];
		if slot.net_state != NetState::Idle {
			// the network call on this talkgroup keeps the slot; anything
			// else is preempted by fresh RF traffic
			if slot.net_last_dst == lc.dst_id {
				warn!(
					"DMR Slot {slot_no}, traffic collision, rf dstId = {} matches network traffic",
					lc.dst_id
				);
				return false;
			}

			warn!(
				"DMR Slot {slot_no}, preempting network traffic, net dstId = {}, rf dstId = {}",
				slot.net_last_dst, lc.dst_id
			);
			slot.net_timeout.stop();
			slot.net_tg_hang.start();
			slot.net_state = NetState::Idle;
		}

		slot.rf_state = RfState::Audio;
		slot.rf_last_dst = lc.dst_id;
		slot.rf_last_src = lc.src_id;
		slot.rf_lc = Some(lc);
		slot.rf_frames = 0;
		slot.rf_bits = 0;
		slot.rf_errs = 0;
		slot.rf_call_errs = 0;
		slot.rf_stream_id = net.create_stream_id();
		slot.rf_timeout.start();
		info!(
			"DMR Slot {slot_no}, voice transmission, srcId = {}, dstId = {}, group = {}",
			lc.src_id, lc.dst_id, lc.group
		);

		// repeat the header and forward it
		let frame = crate::modem::tag_frame(TAG_DATA, 0, &data[..FRAME_LENGTH_BYTES]);
		self.tx_queue.add_frame(&frame, false);
		self.write_net_frame(slot_no, DataType::VoiceLcHeader, data, net);
		true
	}

	fn process_rf_voice(&mut self, slot_no: u8, data: &[u8], net: &mut FneNetwork) -> bool {
		{
			let slot = &mut self.slots[slot_index(slot_no)];
			if slot.rf_state == RfState::Rejected && !slot.rejection_timer.has_expired() {
				return false;
			}
			if slot.rf_state == RfState::Listening {
				slot.rf_state = RfState::LateEntry;
				return false;
			}
			if slot.rf_state != RfState::Audio && slot.rf_state != RfState::LateEntry {
				return false;
			}
			slot.rf_state = RfState::Audio;
		}

		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		frame.copy_from_slice(&data[..FRAME_LENGTH_BYTES]);

		// lift the two 108-bit voice halves out, regenerate, reinsert
		let mut voice = [0u8; AMBE_LENGTH_BYTES];
		extract_voice(&frame, &mut voice);
		let errs = ambe::regenerate_dmr(&mut voice);

		let slot = &mut self.slots[slot_index(slot_no)];
		slot.rf_frames += 1;
		slot.rf_bits += 216;
		slot.rf_errs += errs;
		slot.rf_call_errs += errs;

		if slot.rf_call_errs > self.config.silence_threshold {
			warn!(
				"DMR Slot {slot_no}, exceeded lost audio threshold, filling in with null audio"
			);
			for n in 0..3 {
				voice[n * 9..n * 9 + 9].copy_from_slice(&ambe::NULL_AMBE);
			}
			slot.rf_call_errs = 0;
		}
		insert_voice(&mut frame, &voice);

		if self.config.verbose {
			debug!(
				"DMR Slot {slot_no}, voice audio, srcId = {}, dstId = {}, errs = {errs}",
				slot.rf_last_src, slot.rf_last_dst
			);
		}

		slot.rf_tg_hang.start();
		let dst = slot.rf_last_dst;
		self.affiliations.touch_grant(dst);

		let out = crate::modem::tag_frame(TAG_DATA, 0, &frame);
		self.tx_queue.add_frame(&out, false);
		self.write_net_frame(slot_no, DataType::Voice, &frame, net);
		true
	}

	fn process_rf_data(&mut self, slot_no: u8, data: &[u8]) -> bool {
		let slot = &mut self.slots[slot_index(slot_no)];
		if slot.rf_state != RfState::Data {
			slot.rf_state = RfState::Data;
		}

		let frame = crate::modem::tag_frame(TAG_DATA, 0, &data[..FRAME_LENGTH_BYTES]);
		self.tx_queue.add_frame(&frame, false);
		true
	}

	fn process_rf_eot(&mut self, slot_no: u8, data: &[u8], net: &mut FneNetwork) {
		let slot = &mut self.slots[slot_index(slot_no)];
		if slot.rf_state == RfState::Audio {
			info!(
				"DMR Slot {slot_no}, end of voice transmission, {} frames, BER: {:.3}%",
				slot.rf_frames,
				if slot.rf_bits > 0 {
					(slot.rf_errs as f32 / slot.rf_bits as f32) * 100.0
				} else {
					0.0
				}
			);

			// EOT to the air ahead of the state change
			let frame = crate::modem::tag_frame(TAG_EOT, 0, &data[..FRAME_LENGTH_BYTES]);
			self.tx_queue.add_frame(&frame, false);
			self.write_net_frame(slot_no, DataType::TerminatorWithLc, data, net);
		}

		let slot = &mut self.slots[slot_index(slot_no)];
		slot.rf_tg_hang.start();
		slot.rf_timeout.stop();
		slot.rf_lc = None;
		slot.rf_state = RfState::Listening;
	}

	/*
	** Network path
	*/

	/// Processes one FNE message body: slot, data type, then the burst.
	pub fn process_network(&mut self, message: &[u8], _net: &mut FneNetwork) -> bool {
		if !self.config.enabled || message.len() < 2 + FRAME_LENGTH_BYTES {
			return false;
		}

		let slot_no = if message[0] == 2 { 2 } else { 1 };
		let Ok(data_type) = DataType::try_from(message[1]) else {
			return false;
		};
		let data = &message[2..];

		match data_type {
			DataType::VoiceLcHeader | DataType::Voice | DataType::VoiceSync => {
				self.process_net_voice(slot_no, data_type, data)
			}
			DataType::TerminatorWithLc => {
				self.process_net_eot(slot_no, data);
				true
			}
			DataType::CsbK => {
				// control blocks from the FNE go to the air as-is
				if let Ok(csbk) = Csbk::decode_raw(data) {
					self.write_rf_csbk(slot_no, &csbk, false);
					true
				} else {
					false
				}
			}
			_ => {
				let frame = crate::modem::tag_frame(TAG_DATA, 0, &data[..FRAME_LENGTH_BYTES]);
				self.tx_queue.add_frame(&frame, false);
				true
			}
		}
	}

	fn process_net_voice(&mut self, slot_no: u8, data_type: DataType, data: &[u8]) -> bool {
		if data.len() < FRAME_LENGTH_BYTES {
			return false;
		}

		if data_type == DataType::VoiceLcHeader {
			let mut payload = [0u8; 12];
			if bptc::decode(data, &mut payload).is_ok() {
				if let Ok(lc) = FullLc::decode(&payload) {
					let slot = &mut self.slots[slot_index(slot_no)];

					if slot.net_state == NetState::Idle {
						if self.config.authoritative {
							// any in-progress RF call holds the slot
							if slot.rf_state != RfState::Listening {
								warn!(
									"DMR Slot {slot_no}, traffic collision, net dstId = {}, rf dstId = {}",
									lc.dst_id, slot.rf_last_dst
								);
								return false;
							}
						} else if lc.dst_id != slot.permitted_dst {
							// the FNE has not permitted this destination
							warn!(
								"DMR Slot {slot_no}, rejecting unpermitted network traffic, dstId = {}",
								lc.dst_id
							);
							return false;
						}

						slot.net_state = NetState::Audio;
						slot.net_last_dst = lc.dst_id;
						slot.net_last_src = lc.src_id;
						slot.net_timeout.start();
						info!(
							"DMR Slot {slot_no}, network voice transmission, srcId = {}, dstId = {}",
							lc.src_id, lc.dst_id
						);
					}
				}
			}
		}

		let slot = &mut self.slots[slot_index(slot_no)];
		if slot.net_state != NetState::Audio {
			return false;
		}

		slot.net_tg_hang.start();
		let dst = slot.net_last_dst;
		self.affiliations.touch_grant(dst);

		let frame = crate::modem::tag_frame(TAG_DATA, 0, &data[..FRAME_LENGTH_BYTES]);
		self.tx_queue.add_frame(&frame, false);
		true
	}

	fn process_net_eot(&mut self, slot_no: u8, data: &[u8]) {
		let slot = &mut self.slots[slot_index(slot_no)];
		if slot.net_state == NetState::Audio {
			info!(
				"DMR Slot {slot_no}, network end of voice transmission, dstId = {}",
				slot.net_last_dst
			);
			if data.len() >= FRAME_LENGTH_BYTES {
				let frame = crate::modem::tag_frame(TAG_EOT, 0, &data[..FRAME_LENGTH_BYTES]);
				self.tx_queue.add_frame(&frame, false);
			}
		}

		slot.net_tg_hang.start();
		slot.net_timeout.stop();
		slot.net_state = NetState::Idle;
	}

	/*
	** Checks
	*/

	fn acl_check_rf(&mut self, slot_no: u8, src_id: u32, dst_id: u32, group: bool) -> bool {
		if !validate_src_id(&self.rid_lookup, src_id) {
			warn!("DMR Slot {slot_no}, RID rejection, srcId = {src_id}");
			self.write_rf_ack(
				slot_no,
				src_id,
				dst_id,
				csbk::service_kind::GRP_VOICE,
				TSCC_REASON_NOT_PERMITTED,
				true,
			);
			self.reject(slot_no);
			return false;
		}

		if group {
			if !validate_tg_id(&self.tid_lookup, dst_id) {
				warn!("DMR Slot {slot_no}, TGID rejection, dstId = {dst_id}");
				self.write_rf_ack(
					slot_no,
					src_id,
					dst_id,
					csbk::service_kind::GRP_VOICE,
					TSCC_REASON_NOT_PERMITTED,
					true,
				);
				self.reject(slot_no);
				return false;
			}

			if self.config.verify_aff && !self.affiliations.is_group_aff(src_id, dst_id) {
				warn!(
					"DMR Slot {slot_no}, RID not affiliated to TGID, srcId = {src_id}, dstId = {dst_id}"
				);
				self.write_rf_ack(
					slot_no,
					src_id,
					dst_id,
					csbk::service_kind::GRP_VOICE,
					TSCC_REASON_NOT_PERMITTED,
					true,
				);
				self.reject(slot_no);
				return false;
			}
		} else if dst_id != 0 && !validate_src_id(&self.rid_lookup, dst_id) {
			warn!("DMR Slot {slot_no}, RID rejection, dstId = {dst_id}");
			self.write_rf_ack(
				slot_no,
				src_id,
				dst_id,
				csbk::service_kind::IND_VOICE,
				TSCC_REASON_NOT_PERMITTED,
				true,
			);
			self.reject(slot_no);
			return false;
		}

		true
	}

	fn reject(&mut self, slot_no: u8) {
		let slot = &mut self.slots[slot_index(slot_no)];
		slot.rf_state = RfState::Rejected;
		slot.rejection_timer.start();
	}

	/*
	** Grant machinery
	*/

	/// The DMR grant pipeline: the channel pool hands out `(channel,
	/// slot)` pairs, preferring the talkgroup's configured slot.
	pub fn write_rf_grant(
		&mut self,
		slot_no: u8,
		src_id: u32,
		dst_id: u32,
		service_options: u8,
		group: bool,
		net_granted: bool,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		let service_kind = if group {
			csbk::service_kind::GRP_VOICE
		} else {
			csbk::service_kind::IND_VOICE
		};

		if !self.affiliations.is_granted(dst_id) {
			if group && !self.config.ignore_affiliation_check {
				let affiliated_required = self
					.tid_lookup
					.find(dst_id)
					.is_some_and(|rule| rule.affiliated);
				if affiliated_required && !self.affiliations.has_group_aff(dst_id) {
					warn!("DMR Slot {slot_no}, grant ignored, no group affiliations, dstId = {dst_id}");
					return false;
				}
			}

			if !self.affiliations.is_rf_ch_available() {
				warn!("DMR Slot {slot_no}, grant queued, no channels available, dstId = {dst_id}");
				if !net_granted {
					self.write_rf_ack(
						slot_no,
						src_id,
						dst_id,
						service_kind,
						TSCC_REASON_NO_RESOURCE,
						true,
					);
					self.reject(slot_no);
				}
				return false;
			}

			let grant_slot = self
				.tid_lookup
				.find(dst_id)
				.map(|rule| rule.slot)
				.filter(|slot| *slot == 1 || *slot == 2)
				.unwrap_or(1);
			if !self.affiliations.grant_ch_slot(
				dst_id,
				src_id,
				self.config.grant_timeout_secs,
				grant_slot,
				group,
				net_granted,
			) {
				return false;
			}
		} else {
			let granted_src = self.affiliations.granted_src(dst_id).unwrap_or(0);
			if src_id != granted_src && !net_granted {
				warn!("DMR Slot {slot_no}, grant denied, traffic in progress, dstId = {dst_id}");
				self.write_rf_ack(
					slot_no,
					src_id,
					dst_id,
					service_kind,
					TSCC_REASON_NOT_PERMITTED,
					true,
				);
				self.reject(slot_no);
				return false;
			}
			self.affiliations.touch_grant(dst_id);
		}

		let ch_no = self.affiliations.granted_ch(dst_id).unwrap_or(0);
		let grant_slot = self.affiliations.granted_slot(dst_id).unwrap_or(1);

		if self.config.authoritative && self.config.supervisor {
			let ch_data = self.affiliations.rf_ch_data(ch_no).cloned();
			if let Some(ch_data) = ch_data.filter(|ch| ch.is_valid()) {
				let op = RpcOp {
					op: rpc::RPC_PERMIT_DMR_TG,
					dst_id,
					slot: grant_slot,
				};
				if let Err(err) = peer_rpc.request(&ch_data, op, RPC_DEADLINE) {
					error!("DMR Slot {slot_no}, failed to permit TG for use, chNo = {ch_no}, {err}");
					self.affiliations.release_grant(dst_id, false);
					if !net_granted {
						self.write_rf_ack(
							slot_no,
							src_id,
							dst_id,
							service_kind,
							TSCC_REASON_NO_RESOURCE,
							true,
						);
						self.reject(slot_no);
					}
					return false;
				}
			}
		}

		if self.config.verbose {
			info!(
				"DMR Slot {slot_no}, grant, chNo = {ch_no}, grantSlot = {grant_slot}, srcId = {src_id}, dstId = {dst_id}, group = {group}"
			);
		}

		self.write_rf_csbk(
			slot_no,
			&Csbk::VoiceGrant(csbk::VoiceGrant {
				group,
				broadcast: false,
				logical_ch: ch_no,
				slot: grant_slot,
				late_entry: false,
				emergency: service_options & 0x80 == 0x80,
				site_offset_timing: false,
				dst_id,
				src_id,
			}),
			true,
		);
		true
	}

	fn write_rf_reg_rsp(&mut self, slot_no: u8, src_id: u32, dst_id: u32, net: &mut FneNetwork) {
		let mut reason = TSCC_REASON_ACCEPTED;

		if !validate_src_id(&self.rid_lookup, src_id) {
			warn!("DMR Slot {slot_no}, registration denial, RID rejection, srcId = {src_id}");
			reason = TSCC_REASON_NOT_PERMITTED;
		}
		if reason == TSCC_REASON_ACCEPTED && dst_id != 0 && !validate_tg_id(&self.tid_lookup, dst_id)
		{
			warn!("DMR Slot {slot_no}, affiliation denial, TGID rejection, dstId = {dst_id}");
			reason = TSCC_REASON_NOT_PERMITTED;
		}

		if reason == TSCC_REASON_ACCEPTED {
			if self.config.verbose {
				info!("DMR Slot {slot_no}, unit registration, srcId = {src_id}, dstId = {dst_id}");
			}
			self.affiliations.unit_reg(src_id);
			net.announce_unit_registration(src_id);
			if dst_id != 0 {
				self.affiliations.group_aff(src_id, dst_id);
				net.announce_group_affiliation(src_id, dst_id);
			}
		}

		self.write_rf_ack(slot_no, src_id, dst_id, csbk::service_kind::REG_SVC, reason, false);
	}

	fn write_rf_ack(
		&mut self,
		slot_no: u8,
		src_id: u32,
		dst_id: u32,
		service_kind: u8,
		reason: u8,
		negative: bool,
	) {
		let rsp = csbk::AckRsp {
			service_kind,
			reason,
			dst_id: src_id,
			src_id: if dst_id != 0 { dst_id } else { WUID_FNE },
		};
		let csbk = if negative {
			Csbk::NackRsp(rsp)
		} else {
			Csbk::AckRsp(rsp)
		};
		self.write_rf_csbk(slot_no, &csbk, true);
	}

	/// Serializes a CSBK burst onto the air.
	pub fn write_rf_csbk(&mut self, slot_no: u8, csbk: &Csbk, immediate: bool) {
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		csbk.encode(self.config.color_code, &mut frame, true);

		if self.config.debug {
			debug!("DMR Slot {slot_no}, writing CSBK, {}", csbk.name());
		}

		let mut out = Vec::with_capacity(FRAME_LENGTH_BYTES + 3);
		out.push(TAG_DATA);
		out.push(0);
		out.push(slot_no);
		out.extend_from_slice(&frame);
		self.tx_queue.add_frame(&out, immediate);
	}

	fn write_net_frame(
		&mut self,
		slot_no: u8,
		data_type: DataType,
		data: &[u8],
		net: &mut FneNetwork,
	) {
		let slot = &self.slots[slot_index(slot_no)];
		let mut msg = Vec::with_capacity(2 + FRAME_LENGTH_BYTES);
		msg.push(slot_no);
		msg.push(u8::from(data_type));
		msg.extend_from_slice(&data[..FRAME_LENGTH_BYTES]);
		net.write_protocol(NetSubFunc::Dmr, slot.rf_stream_id, &msg);
	}

	/*
	** Admin surface
	*/

	/// REST-originated inhibit/uninhibit toward a unit.
	pub fn write_rf_ext_fnct(&mut self, function: u8, dst_id: u32) {
		self.write_rf_csbk(
			1,
			&Csbk::ExtFnct(csbk::ExtFnct {
				data_content: false,
				group: false,
				function,
				dst_id,
				src_id: WUID_FNE,
			}),
			false,
		);
	}

	/// FNE-originated TSCC payload channel activation.
	pub fn tscc_payload_activate(&mut self, dst_id: u32, src_id: u32, group: bool) {
		if self.config.verbose {
			info!("DMR, TSCC payload activation, srcId = {src_id}, dstId = {dst_id}");
		}
		let slot = self.affiliations.granted_slot(dst_id).unwrap_or(1);
		let ch = self.affiliations.granted_ch(dst_id).unwrap_or(0);
		self.write_rf_csbk(
			1,
			&Csbk::VoiceGrant(csbk::VoiceGrant {
				group,
				broadcast: false,
				logical_ch: ch,
				slot,
				late_entry: true,
				emergency: false,
				site_offset_timing: false,
				dst_id,
				src_id,
			}),
			false,
		);
	}

	pub fn admin_release_grants(&mut self, dst_id: Option<u32>) {
		match dst_id {
			Some(dst) => {
				// covers both slots of the physical channel
				self.affiliations.release_grant(dst, true);
			}
			None => self.affiliations.release_all_grants(),
		}
	}

	pub fn admin_release_affs(&mut self) {
		self.affiliations.clear_unit_reg();
	}

	pub fn permit_tg(&mut self, slot_no: u8, dst_id: u32) {
		if self.config.verbose {
			info!("DMR Slot {slot_no}, TG permitted, dstId = {dst_id}");
		}
		let slot = &mut self.slots[slot_index(slot_no)];
		slot.permitted_dst = dst_id;
		slot.net_last_dst = dst_id;
	}

	/*
	** Clocking
	*/

	pub fn clock(&mut self, ms: u32) {
		if !self.config.enabled {
			return;
		}

		for slot in &mut self.slots {
			slot.rf_tg_hang.clock(ms);
			slot.net_tg_hang.clock(ms);
			slot.rf_timeout.clock(ms);
			slot.net_timeout.clock(ms);

			slot.rejection_timer.clock(ms);
			if slot.rf_state == RfState::Rejected && slot.rejection_timer.has_expired() {
				slot.rejection_timer.stop();
				slot.rf_state = RfState::Listening;
			}

			if slot.rf_state == RfState::Audio && slot.rf_timeout.has_expired() {
				warn!(
					"DMR Slot {}, call timeout, dstId = {}",
					slot.slot_no, slot.rf_last_dst
				);
				slot.rf_timeout.stop();
				slot.rf_state = RfState::Listening;
			}
			if slot.net_state == NetState::Audio && slot.net_timeout.has_expired() {
				warn!(
					"DMR Slot {}, network call timeout, dstId = {}",
					slot.slot_no, slot.net_last_dst
				);
				slot.net_timeout.stop();
				slot.net_state = NetState::Idle;
			}
		}

		let released = self.affiliations.clock(ms);
		if self.config.dedicated_control {
			for rel in released {
				self.write_rf_csbk(
					1,
					&Csbk::PClear(csbk::PClear {
						logical_ch: rel.ch_no,
						group: true,
						dst_id: rel.dst_id,
						src_id: WUID_FNE,
					}),
					false,
				);
			}
		}

		self.cc_bcast_timer.clock(ms);
		if self.config.dedicated_control && self.cc_bcast_timer.has_expired() {
			self.write_cc_broadcast();
			self.cc_bcast_timer.set_timeout(0, self.config.cc_bcast_interval_ms);
			self.cc_bcast_timer.start();
		}
	}

	fn write_cc_broadcast(&mut self) {
		if self.tx_queue.free_space() < FRAME_LENGTH_BYTES + 4 {
			return;
		}

		// announcement rotation: site parameters then vote-now filler
		let ann_type = match self.cc_seq {
			0 => 0x00, // Ann-WD TSCC
			1 => 0x01, // system parameters
			_ => 0x03, // vote now advice
		};
		let body = (u64::from(self.site.sys_id & 0xFFF) << 24)
			| u64::from(self.site.channel_no & 0xFFF);

		self.write_rf_csbk(
			1,
			&Csbk::Broadcast(csbk::Broadcast { ann_type, body }),
			false,
		);
		self.cc_seq = (self.cc_seq + 1) % 3;
	}
}

fn slot_index(slot_no: u8) -> usize {
	if slot_no == 2 { 1 } else { 0 }
}

/// Copies the 216 voice payload bits (either side of the sync field) out
/// of a burst.
fn extract_voice(frame: &[u8], voice: &mut [u8; AMBE_LENGTH_BYTES]) {
	for n in 0..108 {
		write_bit(voice, n, read_bit(frame, n));
		write_bit(voice, 108 + n, read_bit(frame, 156 + n));
	}
}

fn insert_voice(frame: &mut [u8], voice: &[u8; AMBE_LENGTH_BYTES]) {
	for n in 0..108 {
		write_bit(frame, n, read_bit(voice, n));
		write_bit(frame, 156 + n, read_bit(voice, 108 + n));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lookups::{TalkgroupRule, VoiceChData};

	struct NullRpc;

	impl PeerRpc for NullRpc {
		fn request(
			&mut self,
			_target: &VoiceChData,
			_op: RpcOp,
			_deadline: std::time::Duration,
		) -> std::io::Result<()> {
			Ok(())
		}
	}

	fn harness() -> (DmrControl, FneNetwork, NullRpc) {
		let rid = Arc::new(RadioIdLookup::new(false));
		let mut tid = TalkgroupRuleLookup::new(false);
		let mut rule = TalkgroupRule::new(22, true);
		rule.slot = 2;
		tid.insert(rule);
		let tid = Arc::new(tid);
		let queue = Arc::new(TxQueue::default());

		let config = DmrConfig {
			dedicated_control: true,
			..DmrConfig::default()
		};

		let mut control =
			DmrControl::new(config, SiteData::default(), rid, tid, queue);
		control.affiliations_mut().add_rf_ch(2);
		(control, FneNetwork::new(1), NullRpc)
	}

	#[test]
	fn grant_prefers_configured_slot() {
		let (mut control, _net, mut rpc) = harness();

		assert!(control.write_rf_grant(1, 111, 22, 0x00, true, false, &mut rpc));
		assert_eq!(control.affiliations().granted_ch(22), Some(2));
		assert_eq!(control.affiliations().granted_slot(22), Some(2));
	}

	#[test]
	fn voice_round_trip_through_burst() {
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		let mut voice = [0u8; AMBE_LENGTH_BYTES];
		for (n, byte) in voice.iter_mut().enumerate() {
			*byte = (n as u8).wrapping_mul(7);
		}
		insert_voice(&mut frame, &voice);

		let mut out = [0u8; AMBE_LENGTH_BYTES];
		extract_voice(&frame, &mut out);
		assert_eq!(out, voice);
	}

	#[test]
	fn voice_skips_the_sync_field() {
		let mut frame = [0xFFu8; FRAME_LENGTH_BYTES];
		let voice = [0u8; AMBE_LENGTH_BYTES];
		insert_voice(&mut frame, &voice);

		// bits 108..156 belong to sync/EMB and stay untouched
		for n in 108..156 {
			assert!(read_bit(&frame, n), "bit {n} was clobbered");
		}
	}

	#[test]
	fn rf_csbk_rand_group_voice_grants() {
		let (mut control, mut net, mut rpc) = harness();

		let req = Csbk::Rand(csbk::Rand {
			service_kind: csbk::service_kind::GRP_VOICE,
			service_options: 0x00,
			dst_id: 22,
			src_id: 111,
		});
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		req.encode(1, &mut frame, true);

		assert!(control.process_rf(1, &frame, &mut net, &mut rpc));
		assert!(control.affiliations().is_granted(22));
	}

	fn net_voice_header(dst_id: u32, src_id: u32) -> Vec<u8> {
		let lc = FullLc::group_voice(dst_id, src_id);
		let payload = lc.encode();
		let mut burst = [0u8; FRAME_LENGTH_BYTES];
		bptc::encode(&payload, &mut burst);

		let mut msg = vec![1u8, u8::from(DataType::VoiceLcHeader)];
		msg.extend_from_slice(&burst);
		msg
	}

	#[test]
	fn network_collision_is_dropped() {
		let (mut control, mut net, _rpc) = harness();

		// RF slot mid-call on dst 22
		{
			let slot = &mut control.slots[0];
			slot.rf_state = RfState::Audio;
			slot.rf_last_dst = 22;
		}

		// network header for a different dst on the same slot
		let msg = net_voice_header(99, 555);
		assert!(!control.process_network(&msg, &mut net));
		assert_eq!(control.net_state(1), NetState::Idle);
		assert_eq!(control.rf_state(1), RfState::Audio);
	}

	#[test]
	fn network_collision_same_tg_is_dropped() {
		// rf mid-call (src = 111, dst = 22); net arrives (src = 999,
		// dst = 22): the frame is dropped and rf is untouched
		let (mut control, mut net, _rpc) = harness();
		{
			let slot = &mut control.slots[0];
			slot.rf_state = RfState::Audio;
			slot.rf_last_dst = 22;
			slot.rf_last_src = 111;
		}

		let msg = net_voice_header(22, 999);
		assert!(!control.process_network(&msg, &mut net));
		assert_eq!(control.net_state(1), NetState::Idle);
		assert_eq!(control.rf_state(1), RfState::Audio);
	}

	#[test]
	fn rf_yields_to_network_call_on_same_tg() {
		let (mut control, mut net, mut rpc) = harness();
		{
			let slot = &mut control.slots[0];
			slot.net_state = NetState::Audio;
			slot.net_last_dst = 22;
		}

		let lc = FullLc::group_voice(22, 111);
		let payload = lc.encode();
		let mut burst = [0u8; FRAME_LENGTH_BYTES];
		bptc::encode(&payload, &mut burst);
		SlotType::new(1, DataType::VoiceLcHeader).encode(&mut burst);

		assert!(!control.process_rf(1, &burst, &mut net, &mut rpc));
		assert_eq!(control.rf_state(1), RfState::Listening);
		assert_eq!(control.net_state(1), NetState::Audio);
	}

	#[test]
	fn rf_preempts_mismatched_network_call() {
		let (mut control, mut net, mut rpc) = harness();
		{
			let slot = &mut control.slots[0];
			slot.net_state = NetState::Audio;
			slot.net_last_dst = 99;
		}

		let lc = FullLc::group_voice(22, 111);
		let payload = lc.encode();
		let mut burst = [0u8; FRAME_LENGTH_BYTES];
		bptc::encode(&payload, &mut burst);
		SlotType::new(1, DataType::VoiceLcHeader).encode(&mut burst);

		assert!(control.process_rf(1, &burst, &mut net, &mut rpc));
		assert_eq!(control.rf_state(1), RfState::Audio);
		assert_eq!(control.net_state(1), NetState::Idle);
	}

	#[test]
	fn non_authoritative_net_requires_permit() {
		let (mut control, mut net, _rpc) = harness();
		control.config.authoritative = false;

		// unpermitted destination is refused even on an idle slot
		let msg = net_voice_header(22, 999);
		assert!(!control.process_network(&msg, &mut net));
		assert_eq!(control.net_state(1), NetState::Idle);

		// once the FNE permits the TG the call flows
		control.permit_tg(1, 22);
		assert!(control.process_network(&msg, &mut net));
		assert_eq!(control.net_state(1), NetState::Audio);
	}

	#[test]
	fn release_covers_both_slots_of_a_channel() {
		let (mut control, _net, mut rpc) = harness();
		assert!(control.write_rf_grant(1, 111, 22, 0, true, false, &mut rpc));

		control.admin_release_grants(Some(22));
		assert!(!control.affiliations().is_granted(22));
		assert_eq!(control.affiliations().rf_ch_free_count(), 1);
	}
}
