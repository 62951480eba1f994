//! NXDN control: RCCH control signalling, RTCH voice handling and the
//! control-channel broadcast cadence.

use std::sync::Arc;

use super::channel::{Cac, Facch1, Lich};
use super::rcch::{CallOptions, Rcch, SiteCounters};
use super::{
	AMBE_LENGTH_BITS, AMBE_OFFSET_BITS, AMBE_PER_FRAME, DEFAULT_SILENCE_THRESHOLD,
	FRAME_LENGTH_BYTES, NULL_AMBE, RCCH_LC_LENGTH_BYTES, add_post_bits, cause, ch_option,
	func_channel_type, rf_channel_type, scrambler,
};
use crate::bits::{read_bit, write_bit};
use crate::edac::ambe;
use crate::lookups::{
	AffiliationLookup, RadioIdLookup, TalkgroupRuleLookup, validate_src_id, validate_tg_id,
};
use crate::modem::{TAG_DATA, TAG_EOT, TxQueue};
use crate::network::{FneNetwork, NetSubFunc, PeerRpc, RPC_DEADLINE, RpcOp, rpc};
use crate::sync::{NXDN_FSW, NXDN_FSW_MASK, add_nxdn_sync};
use crate::timers::Timer;
use crate::{NetState, RfState, SiteData};

/// Network message kinds ahead of the body.
const NET_MSG_LAYER3: u8 = 0x00;
const NET_MSG_FRAME: u8 = 0x01;

/// Tunables of the NXDN machine.
#[derive(Debug, Clone)]
pub struct NxdnConfig {
	pub enabled: bool,
	pub authoritative: bool,
	pub supervisor: bool,
	pub dedicated_control: bool,
	pub verify_aff: bool,
	pub verify_reg: bool,
	pub ignore_affiliation_check: bool,
	pub disable_grant_src_check: bool,
	pub ran: u8,
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

impl Default for NxdnConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			authoritative: true,
			supervisor: false,
			dedicated_control: false,
			verify_aff: false,
			verify_reg: false,
			ignore_affiliation_check: false,
			disable_grant_src_check: false,
			ran: 1,
			call_timeout_secs: 180,
			rf_tg_hang_secs: 5,
			net_tg_hang_secs: 5,
			rejection_hang_secs: 1,
			grant_timeout_secs: 15,
			cc_bcast_interval_ms: 3000,
			silence_threshold: DEFAULT_SILENCE_THRESHOLD,
			verbose: false,
			debug: false,
		}
	}
}

/// The NXDN protocol controller.
pub struct NxdnControl {
	config: NxdnConfig,
	site: SiteData,

	rf_state: RfState,
	net_state: NetState,
	rf_last_dst: u32,
	rf_last_src: u32,
	net_last_dst: u32,
	net_last_src: u32,

	rf_timeout: Timer,
	rf_tg_hang: Timer,
	net_timeout: Timer,
	net_tg_hang: Timer,
	rejection_timer: Timer,
	cc_bcast_timer: Timer,

	counters: SiteCounters,

	rf_frames: u32,
	rf_bits: u32,
	rf_errs: u32,
	rf_call_errs: u32,
	rf_stream_id: u32,
	/// Destination the FNE last permitted on this channel.
	net_permitted_dst: u32,

	affiliations: AffiliationLookup,

	rid_lookup: Arc<RadioIdLookup>,
	tid_lookup: Arc<TalkgroupRuleLookup>,
	tx_queue: Arc<TxQueue>,
}

impl NxdnControl {
	pub fn new(
		config: NxdnConfig,
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
			rf_state: RfState::Listening,
			net_state: NetState::Idle,
			rf_last_dst: 0,
			rf_last_src: 0,
			net_last_dst: 0,
			net_last_src: 0,
			rf_timeout: Timer::new(1000, config.call_timeout_secs, 0),
			rf_tg_hang: Timer::new(1000, config.rf_tg_hang_secs, 0),
			net_timeout: Timer::new(1000, config.call_timeout_secs, 0),
			net_tg_hang: Timer::new(1000, config.net_tg_hang_secs, 0),
			rejection_timer: Timer::new(1000, config.rejection_hang_secs, 0),
			cc_bcast_timer,
			counters: SiteCounters::default(),
			rf_frames: 0,
			rf_bits: 0,
			rf_errs: 0,
			rf_call_errs: 0,
			rf_stream_id: 0,
			net_permitted_dst: 0,
			affiliations: AffiliationLookup::new("NXDN", config.verbose),
			rid_lookup,
			tid_lookup,
			tx_queue,
			config,
		}
	}

	pub fn rf_state(&self) -> RfState {
		self.rf_state
	}

	pub fn net_state(&self) -> NetState {
		self.net_state
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
			info!("NXDN, control channel {}", if enabled { "enabled" } else { "disabled" });
		}
		self.config.dedicated_control = enabled;
	}

	pub fn set_site_counters(&mut self, counters: SiteCounters) {
		self.counters = counters;
	}

	/*
	** RF path
	*/

	/// Processes one tag-stripped 48-byte frame from the modem.
	pub fn process_rf(
		&mut self,
		data: &[u8],
		net: &mut FneNetwork,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		if !self.config.enabled || data.len() < FRAME_LENGTH_BYTES {
			return false;
		}

		// frame sync gate
		for (n, (fsw, mask)) in NXDN_FSW.iter().zip(NXDN_FSW_MASK.iter()).enumerate() {
			if data[n] & mask != fsw & mask {
				return false;
			}
		}

		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		frame.copy_from_slice(&data[..FRAME_LENGTH_BYTES]);
		scrambler(&mut frame);

		let Ok(lich) = Lich::decode(&frame) else {
			return false;
		};

		match lich.rfct {
			rf_channel_type::RCCH => self.process_rf_cac(&frame, net, peer_rpc),
			rf_channel_type::RTCH | rf_channel_type::RTCH_C => {
				match lich.fct {
					func_channel_type::USC_SACCH_NS => self.process_rf_facch(&frame, net),
					func_channel_type::USC_SACCH_SS => self.process_rf_voice(&mut frame, net),
					_ => false,
				}
			}
			_ => false,
		}
	}

	fn process_rf_cac(
		&mut self,
		frame: &[u8],
		net: &mut FneNetwork,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		let cac = match Cac::decode(frame) {
			Ok(cac) => cac,
			Err(err) => {
				if self.rf_state == RfState::Listening {
					return false;
				}
				debug!("NXDN, undecodable CAC, {err}");
				return false;
			}
		};

		if cac.ran != self.config.ran && cac.ran != 0 {
			return false;
		}

		let Ok(message) = Rcch::decode(&cac.data, false) else {
			return false;
		};
		let (src_id, dst_id) = message.ids();
		let (src_id, dst_id) = (u32::from(src_id), u32::from(dst_id));

		match &message {
			Rcch::VCall { options, .. } => {
				if !self.support_check(&message, src_id) {
					return false;
				}
				if !self.acl_check_rf(&message, src_id, dst_id, true) {
					return false;
				}
				if self.config.verbose {
					info!(
						"NXDN, {}, srcId = {src_id}, dstId = {dst_id}, emerg = {}, encrypt = {}, prio = {}",
						message.name(),
						options.emergency,
						options.encrypted,
						options.priority
					);
				}

				if self.config.authoritative {
					let opts = *options;
					self.write_rf_message_grant(src_id, dst_id, opts, true, false, peer_rpc);
				} else {
					net.write_grant_req(NetSubFunc::Nxdn, src_id, dst_id, 0, false);
				}
			}
			Rcch::Reg { loc_id, reg_option, .. } => {
				if !self.support_check(&message, src_id) {
					return false;
				}
				if self.config.verbose {
					info!(
						"NXDN, {}, srcId = {src_id}, locId = ${loc_id:04X}, regOption = ${reg_option:02X}",
						message.name()
					);
				}
				self.write_rf_u_reg_rsp(src_id, dst_id, u32::from(*loc_id), net);
			}
			Rcch::GrpReg { loc_id, .. } => {
				if !self.support_check(&message, src_id) {
					return false;
				}
				if self.config.verbose {
					info!(
						"NXDN, {}, srcId = {src_id}, dstId = {dst_id}, locId = ${loc_id:04X}",
						message.name()
					);
				}
				self.write_rf_grp_reg_rsp(src_id, dst_id, u32::from(*loc_id), net);
			}
			Rcch::RegC { .. } => {
				if !self.support_check(&message, src_id) {
					return false;
				}
				if self.affiliations.unit_dereg(src_id) {
					net.announce_unit_deregistration(src_id);
				}
				self.write_rf_message(
					&Rcch::RegC {
						reg_option: 0,
						loc_id: (self.site.loc_id & 0xFFFF) as u16,
						src_id: src_id as u16,
						cause: cause::MM_REG_ACCEPTED,
					},
					false,
				);
			}
			Rcch::Disc { .. } => {
				if self.config.verbose {
					info!("NXDN, {}, srcId = {src_id}", message.name());
				}
			}
			_ => {
				warn!("NXDN, unhandled message type on RF path, {}", message.name());
			}
		}

		true
	}

	fn process_rf_facch(&mut self, frame: &[u8], net: &mut FneNetwork) -> bool {
		let Ok(facch) = Facch1::decode(frame) else {
			if self.rf_state == RfState::Listening {
				self.rf_state = RfState::LateEntry;
			}
			return false;
		};

		let mut l3 = [0u8; RCCH_LC_LENGTH_BYTES];
		l3[..facch.data.len()].copy_from_slice(&facch.data);
		let Ok(message) = Rcch::decode(&l3, true) else {
			return false;
		};

		match &message {
			Rcch::VCall { src_id, dst_id, .. } => {
				let (src_id, dst_id) = (u32::from(*src_id), u32::from(*dst_id));
				if self.rf_state != RfState::Audio {
					if !self.acl_check_rf(&message, src_id, dst_id, true) {
						return false;
					}
					if self.net_state != NetState::Idle {
						// the network call on this talkgroup keeps the
						// channel; anything else yields to fresh RF
						if self.net_last_dst == dst_id {
							warn!(
								"NXDN, traffic collision, rf dstId = {dst_id} matches network traffic"
							);
							return false;
						}

						warn!(
							"NXDN, preempting network traffic, net dstId = {}, rf dstId = {dst_id}",
							self.net_last_dst
						);
						self.net_timeout.stop();
						self.net_tg_hang.start();
						self.net_state = NetState::Idle;
					}

					self.rf_state = RfState::Audio;
					self.rf_last_dst = dst_id;
					self.rf_last_src = src_id;
					self.rf_frames = 0;
					self.rf_bits = 0;
					self.rf_errs = 0;
					self.rf_call_errs = 0;
					self.rf_stream_id = net.create_stream_id();
					self.rf_timeout.start();
					info!("NXDN, voice transmission, srcId = {src_id}, dstId = {dst_id}");
				}

				self.repeat_rf_frame(frame, false);
				self.write_net_frame(frame, net);
			}
			Rcch::TxRel { .. } => {
				self.process_rf_eot(frame, net);
			}
			_ => return false,
		}
		true
	}

	fn process_rf_voice(&mut self, frame: &mut [u8; FRAME_LENGTH_BYTES], net: &mut FneNetwork) -> bool {
		if self.rf_state == RfState::Rejected && !self.rejection_timer.has_expired() {
			return false;
		}
		if self.rf_state == RfState::Listening {
			self.rf_state = RfState::LateEntry;
			return false;
		}
		if self.rf_state != RfState::Audio && self.rf_state != RfState::LateEntry {
			return false;
		}
		self.rf_state = RfState::Audio;

		// regenerate the four half-rate frames in place
		let mut errs = 0u32;
		for n in 0..AMBE_PER_FRAME {
			let mut voice = [0u8; 9];
			let offset = AMBE_OFFSET_BITS + n * AMBE_LENGTH_BITS;
			for bit in 0..AMBE_LENGTH_BITS {
				write_bit(&mut voice, bit, read_bit(frame, offset + bit));
			}
			errs += ambe::regenerate_nxdn(&mut voice);
			for bit in 0..AMBE_LENGTH_BITS {
				write_bit(frame, offset + bit, read_bit(&voice, bit));
			}
		}

		self.rf_frames += 1;
		self.rf_bits += (AMBE_PER_FRAME * AMBE_LENGTH_BITS) as u32;
		self.rf_errs += errs;
		self.rf_call_errs += errs;

		if self.rf_call_errs > self.config.silence_threshold {
			warn!("NXDN, exceeded lost audio threshold, filling in with null audio");
			for n in 0..AMBE_PER_FRAME {
				let offset = AMBE_OFFSET_BITS + n * AMBE_LENGTH_BITS;
				for bit in 0..AMBE_LENGTH_BITS {
					write_bit(frame, offset + bit, read_bit(&NULL_AMBE, bit));
				}
			}
			self.rf_call_errs = 0;
		}

		if self.config.verbose {
			debug!(
				"NXDN, voice audio, srcId = {}, dstId = {}, errs = {errs}",
				self.rf_last_src, self.rf_last_dst
			);
		}

		self.rf_tg_hang.start();
		self.affiliations.touch_grant(self.rf_last_dst);

		self.repeat_rf_frame(frame, false);
		self.write_net_frame(frame, net);
		true
	}

	fn process_rf_eot(&mut self, frame: &[u8], net: &mut FneNetwork) {
		if self.rf_state == RfState::Audio {
			info!(
				"NXDN, end of voice transmission, {} frames, BER: {:.3}%",
				self.rf_frames,
				if self.rf_bits > 0 {
					(self.rf_errs as f32 / self.rf_bits as f32) * 100.0
				} else {
					0.0
				}
			);

			self.write_net_frame(frame, net);
			self.repeat_rf_frame(frame, true);
		}

		self.rf_tg_hang.start();
		self.rf_timeout.stop();
		self.rf_state = RfState::Listening;
	}

	/*
	** Network path
	*/

	/// Processes one FNE message body (kind byte plus payload).
	pub fn process_network(
		&mut self,
		message: &[u8],
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		if !self.config.enabled || message.is_empty() {
			return false;
		}

		match message[0] {
			NET_MSG_LAYER3 => self.process_net_layer3(&message[1..], peer_rpc),
			NET_MSG_FRAME => self.process_net_frame(&message[1..]),
			_ => false,
		}
	}

	fn process_net_layer3(&mut self, data: &[u8], peer_rpc: &mut dyn PeerRpc) -> bool {
		let Ok(message) = Rcch::decode(data, false) else {
			return false;
		};
		let (src_id, dst_id) = message.ids();
		let (src_id, dst_id) = (u32::from(src_id), u32::from(dst_id));

		match &message {
			Rcch::VCall { options, .. } => {
				self.net_last_dst = dst_id;
				self.net_last_src = src_id;

				// dedicated control issues the grant on behalf of the FNE
				if self.config.dedicated_control && !self.affiliations.is_granted(dst_id) {
					let opts = *options;
					self.write_rf_message_grant(src_id, dst_id, opts, true, true, peer_rpc);
				}
				true
			}
			Rcch::VCallConn { .. } | Rcch::VCallAssgn { .. } => {
				// the FNE may explicitly send these to the air
				self.write_rf_message(&message, true);
				true
			}
			Rcch::TxRel { .. } => {
				self.process_net_eot();
				true
			}
			_ => {
				warn!("NXDN, unhandled message type on network path, {}", message.name());
				false
			}
		}
	}

	fn process_net_frame(&mut self, data: &[u8]) -> bool {
		if data.len() < FRAME_LENGTH_BYTES {
			return false;
		}

		if self.net_state == NetState::Idle {
			if self.config.authoritative {
				// any in-progress RF call holds the channel
				if self.rf_state != RfState::Listening {
					warn!(
						"NXDN, traffic collision, net dstId = {}, rf dstId = {}",
						self.net_last_dst, self.rf_last_dst
					);
					return false;
				}
			} else if self.net_permitted_dst == 0 || self.net_permitted_dst != self.net_last_dst {
				// the FNE has not permitted this destination
				warn!(
					"NXDN, rejecting unpermitted network traffic, dstId = {}",
					self.net_last_dst
				);
				return false;
			}

			self.net_state = NetState::Audio;
			self.net_timeout.start();
		}

		self.net_tg_hang.start();
		self.affiliations.touch_grant(self.net_last_dst);

		// network frames arrive descrambled; restore the on-air form
		let mut out = [0u8; FRAME_LENGTH_BYTES];
		out.copy_from_slice(&data[..FRAME_LENGTH_BYTES]);
		scrambler(&mut out);
		let frame = crate::modem::tag_frame(TAG_DATA, 0, &out);
		self.tx_queue.add_frame(&frame, false);
		true
	}

	fn process_net_eot(&mut self) {
		if self.net_state == NetState::Audio {
			info!(
				"NXDN, network end of voice transmission, dstId = {}",
				self.net_last_dst
			);
		}
		self.net_tg_hang.start();
		self.net_timeout.stop();
		self.net_state = NetState::Idle;
	}

	/*
	** Checks
	*/

	fn support_check(&mut self, message: &Rcch, src_id: u32) -> bool {
		if !self.config.dedicated_control && !self.config.authoritative {
			warn!(
				"NXDN, {} denial, unsupported service, srcId = {src_id}",
				message.name()
			);
			self.write_rf_message_deny(0, src_id, cause::SVC_UNAVAILABLE);
			self.reject();
			return false;
		}
		true
	}

	fn acl_check_rf(&mut self, message: &Rcch, src_id: u32, dst_id: u32, group: bool) -> bool {
		if !validate_src_id(&self.rid_lookup, src_id) {
			warn!("NXDN, {} denial, RID rejection, srcId = {src_id}", message.name());
			self.write_rf_message_deny(0, src_id, cause::VD_REQ_UNIT_NOT_PERM);
			self.reject();
			return false;
		}

		if group && !validate_tg_id(&self.tid_lookup, dst_id) {
			warn!("NXDN, {} denial, TGID rejection, dstId = {dst_id}", message.name());
			self.write_rf_message_deny(0, src_id, cause::VD_TGT_UNIT_NOT_PERM);
			self.reject();
			return false;
		}

		if self.config.verify_aff && !self.affiliations.is_group_aff(src_id, dst_id) {
			warn!(
				"NXDN, {} denial, RID not affiliated to TGID, srcId = {src_id}, dstId = {dst_id}",
				message.name()
			);
			self.write_rf_message_deny(0, src_id, cause::VD_REQ_UNIT_NOT_REG);
			self.reject();
			return false;
		}

		true
	}

	fn reject(&mut self) {
		self.rf_state = RfState::Rejected;
		self.rejection_timer.start();
	}

	/*
	** Grant machinery
	*/

	/// Grant pipeline mirroring the P25 machine, answered with VCALL_CONN.
	pub fn write_rf_message_grant(
		&mut self,
		src_id: u32,
		dst_id: u32,
		options: CallOptions,
		group: bool,
		net_granted: bool,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		if !self.affiliations.is_granted(dst_id) {
			if self.rf_state != RfState::Listening && self.rf_state != RfState::Data {
				if !net_granted {
					warn!("NXDN, grant denied, traffic in progress, dstId = {dst_id}");
					self.write_rf_message_deny(0, src_id, cause::VD_QUE_GRP_BUSY);
					self.reject();
				}
				return false;
			}
			if self.net_state != NetState::Idle && dst_id != self.net_last_dst {
				if !net_granted {
					warn!("NXDN, grant denied, traffic in progress, dstId = {dst_id}");
					self.write_rf_message_deny(0, src_id, cause::VD_QUE_GRP_BUSY);
					self.reject();
				}
				return false;
			}
			if self.rf_last_dst != 0
				&& self.rf_last_dst != dst_id
				&& self.rf_tg_hang.is_running()
				&& !self.rf_tg_hang.has_expired()
			{
				if !net_granted {
					self.write_rf_message_deny(0, src_id, cause::VD_QUE_GRP_BUSY);
					self.reject();
				}
				return false;
			}

			if group && !self.config.ignore_affiliation_check {
				let affiliated_required = self
					.tid_lookup
					.find(dst_id)
					.is_some_and(|rule| rule.affiliated);
				if affiliated_required && !self.affiliations.has_group_aff(dst_id) {
					warn!("NXDN, grant ignored, no group affiliations, dstId = {dst_id}");
					return false;
				}
			}
			if !group
				&& !self.config.ignore_affiliation_check
				&& !self.affiliations.is_unit_reg(dst_id)
			{
				warn!("NXDN, grant ignored, no unit registration, dstId = {dst_id}");
				return false;
			}

			if !self.affiliations.is_rf_ch_available() {
				warn!("NXDN, grant queued, no channels available, dstId = {dst_id}");
				if !net_granted {
					self.write_rf_message_deny(0, src_id, cause::VD_QUE_CHN_RESOURCE_NOT_AVAIL);
					self.reject();
				}
				return false;
			}

			if !self.affiliations.grant_ch(
				dst_id,
				src_id,
				self.config.grant_timeout_secs,
				group,
				net_granted,
			) {
				return false;
			}
		} else {
			if !self.config.disable_grant_src_check && !net_granted {
				let granted_src = self.affiliations.granted_src(dst_id).unwrap_or(0);
				if src_id != granted_src {
					warn!("NXDN, grant denied, traffic in progress, dstId = {dst_id}");
					self.write_rf_message_deny(0, src_id, cause::VD_QUE_GRP_BUSY);
					self.reject();
					return false;
				}
			}
			self.affiliations.touch_grant(dst_id);
		}

		let ch_no = self.affiliations.granted_ch(dst_id).unwrap_or(0);

		if self.config.authoritative && self.config.supervisor {
			let ch_data = self.affiliations.rf_ch_data(ch_no).cloned();
			match ch_data {
				Some(ch_data) if ch_data.is_valid() && ch_no != self.site.channel_no => {
					let op = RpcOp {
						op: rpc::RPC_PERMIT_NXDN_TG,
						dst_id,
						slot: 0,
					};
					if let Err(err) = peer_rpc.request(&ch_data, op, RPC_DEADLINE) {
						error!("NXDN, failed to permit TG for use, chNo = {ch_no}, {err}");
						self.affiliations.release_grant(dst_id, false);
						if !net_granted {
							self.write_rf_message_deny(0, src_id, cause::VD_QUE_GRP_BUSY);
							self.reject();
						}
						return false;
					}
				}
				_ => {
					error!("NXDN, failed to permit TG for use, chNo = {ch_no}");
				}
			}
		}

		let message = Rcch::VCallConn {
			options,
			call_type: 0x01,
			src_id: src_id as u16,
			dst_id: dst_id as u16,
			cause: cause::VD_ACCEPTED,
			grp_vch_no: ch_no as u16,
		};
		if self.config.verbose {
			info!(
				"NXDN, {}, emerg = {}, encrypt = {}, prio = {}, chNo = {ch_no}, srcId = {src_id}, dstId = {dst_id}",
				message.name(),
				options.emergency,
				options.encrypted,
				options.priority
			);
		}
		self.write_rf_message(&message, true);
		true
	}

	fn write_rf_message_deny(&mut self, dst_id: u32, src_id: u32, reason: u8) {
		let message = Rcch::VCallConn {
			options: CallOptions::default(),
			call_type: 0x01,
			src_id: src_id as u16,
			dst_id: dst_id as u16,
			cause: reason,
			grp_vch_no: 0,
		};
		if self.config.verbose {
			info!(
				"NXDN, MSG_DENIAL (Message Denial), reason = ${reason:02X}, srcId = {src_id}, dstId = {dst_id}"
			);
		}
		self.write_rf_message_imm(&message);
	}

	fn write_rf_u_reg_rsp(&mut self, src_id: u32, dst_id: u32, loc_id: u32, net: &mut FneNetwork) {
		let mut rsp_cause = cause::MM_REG_ACCEPTED;

		// validate the location ID
		if loc_id != (self.site.loc_id & 0xFFFF) {
			warn!("NXDN, REG denial, LOCID rejection, locId = ${loc_id:06X}");
			rsp_cause = cause::MM_REG_FAILED;
		}
		if rsp_cause == cause::MM_REG_ACCEPTED && !validate_src_id(&self.rid_lookup, src_id) {
			warn!("NXDN, REG denial, RID rejection, srcId = {src_id}");
			rsp_cause = cause::MM_REG_FAILED;
		}
		if rsp_cause == cause::MM_REG_ACCEPTED && dst_id != 0 && !validate_tg_id(&self.tid_lookup, dst_id)
		{
			warn!("NXDN, REG denial, TGID rejection, dstId = {dst_id}");
			rsp_cause = cause::MM_REG_FAILED;
		}

		if rsp_cause == cause::MM_REG_ACCEPTED {
			if self.config.verbose {
				info!("NXDN, REG, srcId = {src_id}, locId = ${loc_id:06X}");
			}
			self.affiliations.unit_reg(src_id);
			net.announce_unit_registration(src_id);
		}

		self.write_rf_message_imm(&Rcch::Reg {
			reg_option: 0,
			loc_id: loc_id as u16,
			src_id: src_id as u16,
			dst_id: dst_id as u16,
			cause: rsp_cause,
		});
	}

	fn write_rf_grp_reg_rsp(&mut self, src_id: u32, dst_id: u32, loc_id: u32, net: &mut FneNetwork) {
		let mut rsp_cause = cause::MM_REG_ACCEPTED;

		if loc_id != (self.site.loc_id & 0xFFFF) {
			warn!("NXDN, GRP_REG denial, LOCID rejection, locId = ${loc_id:06X}");
			rsp_cause = cause::MM_REG_FAILED;
		}
		if rsp_cause == cause::MM_REG_ACCEPTED && !validate_src_id(&self.rid_lookup, src_id) {
			warn!("NXDN, GRP_REG denial, RID rejection, srcId = {src_id}");
			rsp_cause = cause::MM_REG_FAILED;
		}
		if rsp_cause == cause::MM_REG_ACCEPTED && self.config.verify_reg
			&& !self.affiliations.is_unit_reg(src_id)
		{
			warn!("NXDN, GRP_REG denial, RID not registered, srcId = {src_id}");
			rsp_cause = cause::MM_REG_REFUSED;
		}
		if rsp_cause == cause::MM_REG_ACCEPTED && dst_id != 0 && !validate_tg_id(&self.tid_lookup, dst_id)
		{
			warn!("NXDN, GRP_REG denial, TGID rejection, dstId = {dst_id}");
			rsp_cause = cause::MM_LOC_ACPT_GRP_REFUSE;
		}

		if rsp_cause == cause::MM_REG_ACCEPTED {
			if self.config.verbose {
				info!("NXDN, GRP_REG, srcId = {src_id}, dstId = {dst_id}");
			}
			self.affiliations.group_aff(src_id, dst_id);
			net.announce_group_affiliation(src_id, dst_id);
		}

		self.write_rf_message_imm(&Rcch::GrpReg {
			grp_option: 0,
			loc_id: loc_id as u16,
			src_id: src_id as u16,
			dst_id: dst_id as u16,
			cause: rsp_cause,
		});
	}

	/*
	** Frame assembly
	*/

	/// Serializes an RCCH message into a CAC frame on the air.
	pub fn write_rf_message(&mut self, message: &Rcch, immediate: bool) {
		if !self.config.dedicated_control && !self.config.authoritative {
			return;
		}

		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		add_nxdn_sync(&mut frame);

		Lich::new(
			rf_channel_type::RCCH,
			func_channel_type::CAC_OUTBOUND,
			ch_option::DATA_NORMAL,
			true,
		)
		.encode(&mut frame);

		let mut cac = Cac::new(self.config.ran, 0);
		cac.data = message.encode();
		cac.encode(&mut frame);

		scrambler(&mut frame);
		add_post_bits(&mut frame);

		if self.config.debug {
			debug!("NXDN, writing RCCH, {}", message.name());
		}

		let frame = crate::modem::tag_frame(TAG_DATA, 0, &frame);
		self.tx_queue.add_frame(&frame, immediate);
	}

	fn write_rf_message_imm(&mut self, message: &Rcch) {
		self.write_rf_message(message, true);
	}

	fn repeat_rf_frame(&mut self, frame: &[u8], eot: bool) {
		let mut out = [0u8; FRAME_LENGTH_BYTES];
		out.copy_from_slice(&frame[..FRAME_LENGTH_BYTES]);
		scrambler(&mut out);

		let tag = if eot { TAG_EOT } else { TAG_DATA };
		let tagged = crate::modem::tag_frame(tag, 0, &out);
		self.tx_queue.add_frame(&tagged, false);
	}

	fn write_net_frame(&mut self, frame: &[u8], net: &mut FneNetwork) {
		let mut msg = Vec::with_capacity(1 + FRAME_LENGTH_BYTES);
		msg.push(NET_MSG_FRAME);
		msg.extend_from_slice(&frame[..FRAME_LENGTH_BYTES]);
		net.write_protocol(NetSubFunc::Nxdn, self.rf_stream_id, &msg);
	}

	/*
	** Admin surface
	*/

	pub fn admin_release_grants(&mut self, dst_id: Option<u32>) {
		match dst_id {
			Some(dst) => {
				self.affiliations.release_grant(dst, false);
			}
			None => self.affiliations.release_all_grants(),
		}
	}

	pub fn admin_release_affs(&mut self) {
		self.affiliations.clear_unit_reg();
	}

	pub fn permit_tg(&mut self, dst_id: u32) {
		if self.config.verbose {
			info!("NXDN, TG permitted, dstId = {dst_id}");
		}
		self.net_permitted_dst = dst_id;
		self.net_last_dst = dst_id;
	}

	/*
	** Clocking
	*/

	pub fn clock(&mut self, ms: u32) {
		if !self.config.enabled {
			return;
		}

		self.rf_tg_hang.clock(ms);
		self.net_tg_hang.clock(ms);
		self.rf_timeout.clock(ms);
		self.net_timeout.clock(ms);

		self.rejection_timer.clock(ms);
		if self.rf_state == RfState::Rejected && self.rejection_timer.has_expired() {
			self.rejection_timer.stop();
			self.rf_state = RfState::Listening;
		}

		if self.rf_state == RfState::Audio && self.rf_timeout.has_expired() {
			warn!("NXDN, call timeout, dstId = {}", self.rf_last_dst);
			self.rf_timeout.stop();
			self.rf_state = RfState::Listening;
		}
		if self.net_state == NetState::Audio && self.net_timeout.has_expired() {
			warn!("NXDN, network call timeout, dstId = {}", self.net_last_dst);
			self.net_timeout.stop();
			self.net_state = NetState::Idle;
		}

		let released = self.affiliations.clock(ms);
		if self.config.dedicated_control {
			for rel in released {
				self.write_rf_message(
					&Rcch::TxRel {
						src_id: 0,
						dst_id: rel.dst_id as u16,
						cause: cause::DISC_USER,
					},
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

	/// One broadcast iteration: exactly one SITE_INFO followed by one
	/// SRV_INFO.
	fn write_cc_broadcast(&mut self) {
		if self.tx_queue.free_space() < 2 * (FRAME_LENGTH_BYTES + 3) {
			return;
		}

		let site_info = Rcch::site_info(&self.site, &self.counters);
		self.write_rf_message(&site_info, false);

		let srv_info = Rcch::srv_info(&self.site);
		self.write_rf_message(&srv_info, false);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lookups::VoiceChData;

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

	fn harness() -> (NxdnControl, FneNetwork, NullRpc) {
		let rid = Arc::new(RadioIdLookup::new(false));
		let mut tid = TalkgroupRuleLookup::new(false);
		tid.insert(crate::lookups::TalkgroupRule::new(50, true));
		let tid = Arc::new(tid);
		let queue = Arc::new(TxQueue::default());

		let config = NxdnConfig {
			dedicated_control: true,
			..NxdnConfig::default()
		};

		let mut site = SiteData::default();
		site.loc_id = 0x012345;
		site.channel_no = 1;
		site.net_active = true;

		let mut control = NxdnControl::new(config, site, rid, tid, queue);
		control.affiliations_mut().add_rf_ch(7);
		(control, FneNetwork::new(1), NullRpc)
	}

	fn cac_frame(control: &NxdnControl, message: &Rcch, long: bool) -> Vec<u8> {
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		add_nxdn_sync(&mut frame);
		Lich::new(
			rf_channel_type::RCCH,
			if long {
				func_channel_type::CAC_INBOUND_LONG
			} else {
				func_channel_type::CAC_INBOUND_SHORT
			},
			ch_option::DATA_NORMAL,
			false,
		)
		.encode(&mut frame);

		let mut cac = Cac::new(control.config.ran, 0);
		cac.data = message.encode();
		cac.encode(&mut frame);
		scrambler(&mut frame);
		frame.to_vec()
	}

	#[test]
	fn vcall_request_grants_a_channel() {
		let (mut control, mut net, mut rpc) = harness();

		let request = Rcch::VCall {
			options: CallOptions {
				emergency: false,
				encrypted: false,
				priority: 4,
			},
			call_type: 0x01,
			src_id: 1001,
			dst_id: 50,
		};
		let frame = cac_frame(&control, &request, true);

		assert!(control.process_rf(&frame, &mut net, &mut rpc));
		assert_eq!(control.affiliations().granted_ch(50), Some(7));
		assert_eq!(control.affiliations().granted_src(50), Some(1001));

		// the VCALL_CONN grant went out, scrambled; decode it back
		let out = control.tx_queue.get_frame().unwrap();
		let mut grant_frame = [0u8; FRAME_LENGTH_BYTES];
		grant_frame.copy_from_slice(&out[2..2 + FRAME_LENGTH_BYTES]);
		scrambler(&mut grant_frame);

		let cac = Cac::decode(&grant_frame).unwrap();
		match Rcch::decode(&cac.data, false).unwrap() {
			Rcch::VCallConn {
				cause: c,
				grp_vch_no,
				dst_id,
				src_id,
				..
			} => {
				assert_eq!(c, cause::VD_ACCEPTED);
				assert_eq!(grp_vch_no, 7);
				assert_eq!(dst_id, 50);
				assert_eq!(src_id, 1001);
			}
			other => panic!("wrong message: {}", other.name()),
		}
	}

	#[test]
	fn registration_flow() {
		let (mut control, mut net, mut rpc) = harness();

		let request = Rcch::Reg {
			reg_option: 0x0A,
			loc_id: 0x2345,
			src_id: 400,
			dst_id: 50,
			cause: 0,
		};
		let frame = cac_frame(&control, &request, true);
		assert!(control.process_rf(&frame, &mut net, &mut rpc));
		assert!(control.affiliations().is_unit_reg(400));
	}

	#[test]
	fn foreign_ran_is_ignored() {
		let (mut control, mut net, mut rpc) = harness();

		let request = Rcch::VCall {
			options: CallOptions::default(),
			call_type: 0x01,
			src_id: 1001,
			dst_id: 50,
		};
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		add_nxdn_sync(&mut frame);
		Lich::new(
			rf_channel_type::RCCH,
			func_channel_type::CAC_INBOUND_LONG,
			ch_option::DATA_NORMAL,
			false,
		)
		.encode(&mut frame);
		let mut cac = Cac::new(9, 0); // wrong RAN
		cac.data = request.encode();
		cac.encode(&mut frame);
		scrambler(&mut frame);

		assert!(!control.process_rf(&frame, &mut net, &mut rpc));
		assert!(!control.affiliations().is_granted(50));
	}

	#[test]
	fn broadcast_iteration_emits_site_then_srv() {
		let (mut control, _net, _rpc) = harness();
		while control.tx_queue.get_frame().is_some() {}

		control.clock(3_100);

		let first = control.tx_queue.get_frame().unwrap();
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		frame.copy_from_slice(&first[2..2 + FRAME_LENGTH_BYTES]);
		scrambler(&mut frame);
		let cac = Cac::decode(&frame).unwrap();
		assert!(matches!(
			Rcch::decode(&cac.data, false).unwrap(),
			Rcch::SiteInfo { .. }
		));

		let second = control.tx_queue.get_frame().unwrap();
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		frame.copy_from_slice(&second[2..2 + FRAME_LENGTH_BYTES]);
		scrambler(&mut frame);
		let cac = Cac::decode(&frame).unwrap();
		match Rcch::decode(&cac.data, false).unwrap() {
			Rcch::SrvInfo { loc_id, .. } => assert_eq!(loc_id, 0x012345),
			other => panic!("wrong message: {}", other.name()),
		}
	}

	#[test]
	fn grant_timeout_emits_release() {
		let (mut control, mut net, mut rpc) = harness();

		let request = Rcch::VCall {
			options: CallOptions::default(),
			call_type: 0x01,
			src_id: 1001,
			dst_id: 50,
		};
		let frame = cac_frame(&control, &request, true);
		assert!(control.process_rf(&frame, &mut net, &mut rpc));
		while control.tx_queue.get_frame().is_some() {}

		control.clock(15_100);
		assert!(!control.affiliations().is_granted(50));

		// a TX_REL went to the air
		let out = control.tx_queue.get_frame().unwrap();
		let mut rel_frame = [0u8; FRAME_LENGTH_BYTES];
		rel_frame.copy_from_slice(&out[2..2 + FRAME_LENGTH_BYTES]);
		scrambler(&mut rel_frame);
		let cac = Cac::decode(&rel_frame).unwrap();
		assert!(matches!(
			Rcch::decode(&cac.data, false).unwrap(),
			Rcch::TxRel { .. }
		));
	}

	fn facch_vcall_frame(dst_id: u16, src_id: u16) -> [u8; FRAME_LENGTH_BYTES] {
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		add_nxdn_sync(&mut frame);
		Lich::new(
			rf_channel_type::RTCH,
			func_channel_type::USC_SACCH_NS,
			ch_option::STEAL_FACCH,
			false,
		)
		.encode(&mut frame);

		let l3 = Rcch::VCall {
			options: CallOptions::default(),
			call_type: 0x01,
			src_id,
			dst_id,
		}
		.encode();
		let mut data = [0u8; 7];
		data.copy_from_slice(&l3[..7]);
		Facch1 { data }.encode(&mut frame);

		scrambler(&mut frame);
		frame
	}

	fn layer3_vcall(dst_id: u16, src_id: u16) -> Vec<u8> {
		let l3 = Rcch::VCall {
			options: CallOptions::default(),
			call_type: 0x01,
			src_id,
			dst_id,
		}
		.encode();
		let mut msg = vec![0x00u8];
		msg.extend_from_slice(&l3);
		msg
	}

	#[test]
	fn rf_yields_to_network_call_on_same_tg() {
		let (mut control, mut net, mut rpc) = harness();
		control.net_state = NetState::Audio;
		control.net_last_dst = 50;

		let frame = facch_vcall_frame(50, 1001);
		assert!(!control.process_rf(&frame, &mut net, &mut rpc));
		assert_eq!(control.rf_state(), RfState::Listening);
		assert_eq!(control.net_state(), NetState::Audio);
	}

	#[test]
	fn rf_preempts_mismatched_network_call() {
		let (mut control, mut net, mut rpc) = harness();
		control.net_state = NetState::Audio;
		control.net_last_dst = 99;

		let frame = facch_vcall_frame(50, 1001);
		assert!(control.process_rf(&frame, &mut net, &mut rpc));
		assert_eq!(control.rf_state(), RfState::Audio);
		assert_eq!(control.net_state(), NetState::Idle);
	}

	#[test]
	fn network_frame_collision_is_dropped() {
		// rf mid-call; an incoming network audio frame must not reach the
		// TX queue
		let (mut control, _net, mut rpc) = harness();
		control.rf_state = RfState::Audio;
		control.rf_last_dst = 22;
		while control.tx_queue.get_frame().is_some() {}

		let mut msg = vec![0x01u8];
		msg.extend_from_slice(&[0u8; FRAME_LENGTH_BYTES]);
		assert!(!control.process_network(&msg, &mut rpc));
		assert_eq!(control.net_state(), NetState::Idle);
		assert!(control.tx_queue.get_frame().is_none());
	}

	#[test]
	fn non_authoritative_net_requires_permit() {
		let (mut control, _net, mut rpc) = harness();
		control.config.authoritative = false;

		// the layer-3 call announce alone does not open the audio path
		let announce = layer3_vcall(50, 1001);
		assert!(control.process_network(&announce, &mut rpc));

		let mut msg = vec![0x01u8];
		msg.extend_from_slice(&[0u8; FRAME_LENGTH_BYTES]);
		assert!(!control.process_network(&msg, &mut rpc));
		assert_eq!(control.net_state(), NetState::Idle);

		// once the FNE permits the TG the audio flows
		control.permit_tg(50);
		assert!(control.process_network(&msg, &mut rpc));
		assert_eq!(control.net_state(), NetState::Audio);
	}
}
