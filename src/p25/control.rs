//! P25 control: the RF/network call state machine and the trunking
//! control channel.
//!
//! One instance owns the P25 half of the host: call state, the
//! affiliation/grant tables, the control-channel broadcast rotation and
//! the deny/queue logic wrapped around every service request.

use std::sync::Arc;

use super::nid::{NID_LENGTH_BYTES, Nid};
use super::tsbk::{self, Tsbk};
use super::voice;
use super::{
	Duid, LDU_FRAME_LENGTH_BYTES, QUE_RSN_CHN_RESOURCE_NOT_AVAIL, RSP_ACCEPT, RSP_REFUSED,
	TSBK_FEC_LENGTH_BYTES, WUID_FNE,
};
use crate::lookups::{
	AffiliationLookup, RadioIdLookup, TalkgroupRuleLookup, validate_src_id, validate_tg_id,
};
use crate::modem::{TAG_DATA, TAG_EOT, TxQueue};
use crate::network::{FneNetwork, NetSubFunc, PeerRpc, RPC_DEADLINE, RpcOp, rpc};
use crate::sync::add_p25_sync;
use crate::timers::Timer;
use crate::{NetState, RfState, SiteData};

/// Deny/queue service types quoted back in QUE/DENY responses.
const SVC_GRP_VCH: u8 = 0x00;
const SVC_UU_VCH: u8 = 0x04;

/// TSDU frame length on the modem port.
pub const TSDU_FRAME_LENGTH_BYTES: usize = 6 + NID_LENGTH_BYTES + TSBK_FEC_LENGTH_BYTES;

/// TDU frame length on the modem port.
pub const TDU_FRAME_LENGTH_BYTES: usize = 6 + NID_LENGTH_BYTES;

/// Tunables of the P25 machine; defaults match a conventional site.
#[derive(Debug, Clone)]
pub struct P25Config {
	pub enabled: bool,
	/// Authoritative hosts decide grants locally; others wait for FNE
	/// permits.
	pub authoritative: bool,
	/// Supervisor hosts issue grant RPCs to their voice channels.
	pub supervisor: bool,
	/// Dedicated control channel; emits release OSPs on grant expiry.
	pub dedicated_control: bool,
	pub verify_aff: bool,
	pub verify_reg: bool,
	pub ignore_affiliation_check: bool,
	pub disable_grant_src_check: bool,
	pub nac: u16,
	pub call_timeout_secs: u32,
	pub rf_tg_hang_secs: u32,
	pub net_tg_hang_secs: u32,
	pub rejection_hang_secs: u32,
	pub grant_timeout_secs: u32,
	pub cc_bcast_interval_ms: u32,
	pub verbose: bool,
	pub debug: bool,
}

impl Default for P25Config {
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
			nac: super::DEFAULT_NAC,
			call_timeout_secs: 180,
			rf_tg_hang_secs: 5,
			net_tg_hang_secs: 5,
			rejection_hang_secs: 1,
			grant_timeout_secs: 15,
			cc_bcast_interval_ms: 4000,
			verbose: false,
			debug: false,
		}
	}
}

/// A neighbouring site carried in ADJ_STS_BCAST rotations.
#[derive(Debug, Clone, Copy)]
pub struct AdjSite {
	pub sys_id: u32,
	pub rfss_id: u8,
	pub site_id: u8,
	pub ch_id: u8,
	pub ch_no: u32,
	pub svc_class: u8,
}

/// The P25 protocol controller.
pub struct P25Control {
	config: P25Config,
	site: SiteData,
	iden: crate::IdenEntry,

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
	cc_seq: u8,
	adj_seq: usize,

	rf_frames: u32,
	rf_bits: u32,
	rf_errs: u32,
	rf_stream_id: u32,
	/// Destination the FNE last permitted on this channel.
	net_permitted_dst: u32,

	affiliations: AffiliationLookup,
	adj_sites: Vec<AdjSite>,

	rid_lookup: Arc<RadioIdLookup>,
	tid_lookup: Arc<TalkgroupRuleLookup>,
	tx_queue: Arc<TxQueue>,

	last_reject_id: u32,
}

impl P25Control {
	pub fn new(
		config: P25Config,
		site: SiteData,
		iden: crate::IdenEntry,
		rid_lookup: Arc<RadioIdLookup>,
		tid_lookup: Arc<TalkgroupRuleLookup>,
		tx_queue: Arc<TxQueue>,
	) -> Self {
		let mut cc_bcast_timer = Timer::millis();
		cc_bcast_timer.set_timeout(0, config.cc_bcast_interval_ms);
		cc_bcast_timer.start();

		let mut control = Self {
			site,
			iden,
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
			cc_seq: 0,
			adj_seq: 0,
			rf_frames: 0,
			rf_bits: 0,
			rf_errs: 0,
			rf_stream_id: 0,
			net_permitted_dst: 0,
			affiliations: AffiliationLookup::new("P25", config.verbose),
			adj_sites: Vec::new(),
			rid_lookup,
			tid_lookup,
			tx_queue,
			last_reject_id: 0,
			config,
		};
		control.affiliations.set_release_callback(|ch, dst, _slot| {
			debug!("P25, grant released, chNo = {ch}, dstId = {dst}");
		});
		control
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
			info!("P25, control channel {}", if enabled { "enabled" } else { "disabled" });
		}
		self.config.dedicated_control = enabled;
	}

	pub fn add_adj_site(&mut self, site: AdjSite) {
		self.adj_sites.push(site);
	}

	/*
	** RF path
	*/

	/// Processes one tag-stripped frame from the modem.
	pub fn process_rf(
		&mut self,
		data: &[u8],
		net: &mut FneNetwork,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		if !self.config.enabled {
			return false;
		}
		if data.len() < TDU_FRAME_LENGTH_BYTES {
			return false;
		}

		let Ok(nid) = Nid::decode(&data[6..], self.config.nac) else {
			return false;
		};

		match nid.duid {
			Duid::Tsdu => self.process_rf_tsdu(data, net, peer_rpc),
			Duid::Ldu1 | Duid::Ldu2 => self.process_rf_voice(data, nid.duid, net),
			Duid::Tdu | Duid::Tdulc => {
				self.process_rf_eot(data, net);
				true
			}
			Duid::Hdu | Duid::Pdu => {
				// header/data units only move us out of late entry
				if self.rf_state == RfState::LateEntry {
					self.rf_state = RfState::Audio;
				}
				true
			}
		}
	}

	fn process_rf_tsdu(
		&mut self,
		data: &[u8],
		net: &mut FneNetwork,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		if data.len() < TSDU_FRAME_LENGTH_BYTES {
			return false;
		}

		let tsbk = match Tsbk::decode(&data[6 + NID_LENGTH_BYTES..], false) {
			Ok(tsbk) => tsbk,
			Err(err) => {
				debug!("P25, undecodable TSDU, {err}");
				return false;
			}
		};

		let (src_id, dst_id) = tsbk.ids();
		let prev_state = self.rf_state;

		match &tsbk {
			Tsbk::GrpVchGrant(req) => {
				if !self.acl_check_rf(src_id, dst_id, true, SVC_GRP_VCH) {
					return false;
				}
				if self.config.verbose {
					info!(
						"P25, {}, srcId = {src_id}, dstId = {dst_id}, emerg = {}, encrypt = {}, prio = {}",
						tsbk.name(),
						req.emergency,
						req.encrypted,
						req.priority
					);
				}
				let opts = super::ServiceOptions::from_parts(req.emergency, req.encrypted, req.priority);
				if self.config.authoritative {
					self.write_rf_grant(src_id, dst_id, opts, true, false, peer_rpc);
				} else {
					net.write_grant_req(NetSubFunc::P25, src_id, dst_id, 0, false);
				}
			}
			Tsbk::UuVchGrant(req) => {
				if !self.acl_check_rf(src_id, dst_id, false, SVC_UU_VCH) {
					return false;
				}
				let opts = super::ServiceOptions::from_parts(req.emergency, req.encrypted, req.priority);
				if self.config.authoritative {
					self.write_rf_grant(src_id, dst_id, opts, false, false, peer_rpc);
				} else {
					net.write_grant_req(NetSubFunc::P25, src_id, dst_id, 0, true);
				}
			}
			Tsbk::GrpAff(_) => {
				self.write_rf_grp_aff_rsp(src_id, dst_id, net);
			}
			Tsbk::UReg(_) => {
				self.write_rf_u_reg_rsp(src_id, net);
			}
			Tsbk::UDereg(_) => {
				if self.config.verbose {
					info!("P25, {}, srcId = {src_id}", tsbk.name());
				}
				if self.affiliations.unit_dereg(src_id) {
					net.announce_unit_deregistration(src_id);
				}
				self.write_rf_tsdu(
					&Tsbk::UDereg(tsbk::UDereg { src_id }),
					false,
				);
			}
			Tsbk::LocRegReq(_) => {
				if !self.acl_check_rf(src_id, dst_id, true, SVC_GRP_VCH) {
					return false;
				}
				if self.config.verbose {
					info!("P25, {}, srcId = {src_id}, dstId = {dst_id}", tsbk.name());
				}
				self.write_rf_tsdu(
					&Tsbk::LocRegRsp(tsbk::LocRegRsp {
						response: RSP_ACCEPT,
						dst_id,
						src_id,
					}),
					false,
				);
			}
			Tsbk::CallAlrt(v) => {
				if !self.acl_check_rf(src_id, dst_id, false, SVC_UU_VCH) {
					return false;
				}
				if self.config.verbose {
					info!("P25, {}, srcId = {src_id}, dstId = {dst_id}", tsbk.name());
				}
				// repeat toward the target
				self.write_rf_tsdu(&Tsbk::CallAlrt(*v), false);
			}
			Tsbk::StsUpdt(v) => {
				if !self.acl_check_rf(src_id, dst_id, false, SVC_UU_VCH) {
					return false;
				}
				self.write_rf_tsdu(&Tsbk::StsUpdt(*v), false);
			}
			Tsbk::MsgUpdt(v) => {
				if !self.acl_check_rf(src_id, dst_id, false, SVC_UU_VCH) {
					return false;
				}
				self.write_rf_tsdu(&Tsbk::MsgUpdt(*v), false);
			}
			Tsbk::ExtFnct(v) => {
				if self.config.verbose {
					info!(
						"P25, {}, func = ${:04X}, srcId = {src_id}, dstId = {dst_id}",
						tsbk.name(),
						v.function
					);
				}
				self.write_rf_tsdu(&Tsbk::ExtFnct(*v), false);
			}
			Tsbk::UuAnsRsp(v) => {
				if self.config.verbose {
					info!(
						"P25, {}, response = ${:02X}, srcId = {src_id}, dstId = {dst_id}",
						tsbk.name(),
						v.response
					);
				}
			}
			Tsbk::SndcpChReq(_) => {
				// no data subsystem behind this host
				self.write_rf_deny(src_id, dst_id, QUE_RSN_CHN_RESOURCE_NOT_AVAIL, SVC_GRP_VCH);
			}
			Tsbk::AuthResp(_) | Tsbk::AuthSuDmd(_) | Tsbk::CanSrvReq(_) | Tsbk::SndcpRecReq(_) => {
				if self.config.debug {
					debug!("P25, {} ignored", tsbk.name());
				}
			}
			_ => {
				warn!("P25, unhandled TSBK on RF path, {}", tsbk.name());
			}
		}

		self.rf_state = if self.rf_state == RfState::Rejected {
			RfState::Rejected
		} else {
			prev_state
		};
		true
	}

	fn process_rf_voice(&mut self, data: &[u8], duid: Duid, net: &mut FneNetwork) -> bool {
		if data.len() < LDU_FRAME_LENGTH_BYTES {
			return false;
		}

		if self.rf_state == RfState::Rejected && !self.rejection_timer.has_expired() {
			return false;
		}

		let mut frame = [0u8; LDU_FRAME_LENGTH_BYTES];
		frame.copy_from_slice(&data[..LDU_FRAME_LENGTH_BYTES]);

		// LDU1 carries the call identity
		if duid == Duid::Ldu1 {
			match super::lc::LinkControl::decode(&frame[voice::RS_OFFSET..]) {
				Ok(lc) => {
					if self.rf_state != RfState::Audio {
						if !self.acl_check_rf(lc.src_id, lc.dst_id, lc.group, SVC_GRP_VCH) {
							return false;
						}

						if self.net_state != NetState::Idle {
							// the network call on this talkgroup keeps the
							// channel; anything else yields to fresh RF
							if self.net_last_dst == lc.dst_id {
								warn!(
									"P25, traffic collision, rf dstId = {} matches network traffic",
									lc.dst_id
								);
								return false;
							}

							warn!(
								"P25, preempting network traffic, net dstId = {}, rf dstId = {}",
								self.net_last_dst, lc.dst_id
							);
							self.net_timeout.stop();
							self.net_tg_hang.start();
							self.net_state = NetState::Idle;
						}

						self.rf_state = RfState::Audio;
						self.rf_last_dst = lc.dst_id;
						self.rf_last_src = lc.src_id;
						self.rf_frames = 0;
						self.rf_bits = 0;
						self.rf_errs = 0;
						self.rf_stream_id = net.create_stream_id();
						self.rf_timeout.start();
						info!(
							"P25, voice transmission, srcId = {}, dstId = {}, group = {}",
							lc.src_id, lc.dst_id, lc.group
						);
					}
				}
				Err(_) if self.rf_state == RfState::Listening => {
					// undecodable entry, wait for a refreshed header
					self.rf_state = RfState::LateEntry;
					return false;
				}
				Err(_) => {}
			}
		} else if self.rf_state == RfState::Listening {
			self.rf_state = RfState::LateEntry;
			return false;
		}

		if self.rf_state != RfState::Audio && self.rf_state != RfState::LateEntry {
			return false;
		}
		self.rf_state = RfState::Audio;

		let errs = voice::regenerate_audio(&mut frame);
		self.rf_frames += 1;
		self.rf_bits += voice::LDU_VOICE_BITS;
		self.rf_errs += errs;

		if self.config.verbose {
			debug!(
				"P25, {:?} audio, srcId = {}, dstId = {}, errs = {errs}",
				duid, self.rf_last_src, self.rf_last_dst
			);
		}

		self.rf_tg_hang.start();
		self.affiliations.touch_grant(self.rf_last_dst);

		// repeat to the air and forward to the FNE
		let frame_out = crate::modem::tag_frame(TAG_DATA, 0, &frame);
		self.tx_queue.add_frame(&frame_out, false);

		let mut msg = Vec::with_capacity(1 + frame.len());
		msg.push(u8::from(duid));
		msg.extend_from_slice(&frame);
		net.write_protocol(NetSubFunc::P25, self.rf_stream_id, &msg);

		true
	}

	fn process_rf_eot(&mut self, data: &[u8], net: &mut FneNetwork) {
		if self.rf_state == RfState::Audio {
			info!(
				"P25, end of voice transmission, {} frames, BER: {:.3}%",
				self.rf_frames,
				if self.rf_bits > 0 {
					(self.rf_errs as f32 / self.rf_bits as f32) * 100.0
				} else {
					0.0
				}
			);

			let mut msg = Vec::with_capacity(1 + TDU_FRAME_LENGTH_BYTES);
			msg.push(u8::from(Duid::Tdu));
			msg.extend_from_slice(&data[..TDU_FRAME_LENGTH_BYTES]);
			net.write_protocol(NetSubFunc::P25, self.rf_stream_id, &msg);

			// the EOT goes to the air ahead of the state change
			let frame = crate::modem::tag_frame(TAG_EOT, 0, &data[..TDU_FRAME_LENGTH_BYTES]);
			self.tx_queue.add_frame(&frame, false);
		}

		self.rf_tg_hang.start();
		self.rf_timeout.stop();
		self.rf_state = RfState::Listening;
	}

	/*
	** Network path
	*/

	/// Processes one FNE message body (leading DUID byte plus frame).
	pub fn process_network(&mut self, message: &[u8], _net: &mut FneNetwork) -> bool {
		if !self.config.enabled || message.is_empty() {
			return false;
		}

		let Ok(duid) = Duid::try_from(message[0]) else {
			return false;
		};
		let data = &message[1..];

		match duid {
			Duid::Ldu1 | Duid::Ldu2 => self.process_net_voice(data, duid),
			Duid::Tdu | Duid::Tdulc => {
				self.process_net_eot();
				true
			}
			Duid::Tsdu => {
				// control blocks from the FNE go straight to the air
				if let Ok(tsbk) = Tsbk::decode(data, true) {
					self.write_rf_tsdu(&tsbk, false);
					true
				} else {
					false
				}
			}
			Duid::Hdu | Duid::Pdu => true,
		}
	}

	fn process_net_voice(&mut self, data: &[u8], duid: Duid) -> bool {
		if data.len() < LDU_FRAME_LENGTH_BYTES {
			return false;
		}

		let mut frame = [0u8; LDU_FRAME_LENGTH_BYTES];
		frame.copy_from_slice(&data[..LDU_FRAME_LENGTH_BYTES]);

		if duid == Duid::Ldu1 {
			if let Ok(lc) = super::lc::LinkControl::decode(&frame[voice::RS_OFFSET..]) {
				if self.net_state == NetState::Idle {
					if self.config.authoritative {
						// any in-progress RF call holds the channel
						if self.rf_state != RfState::Listening {
							warn!(
								"P25, traffic collision, net dstId = {}, rf dstId = {}",
								lc.dst_id, self.rf_last_dst
							);
							return false;
						}
					} else if lc.dst_id != self.net_permitted_dst {
						// the FNE has not permitted this destination
						warn!(
							"P25, rejecting unpermitted network traffic, dstId = {}",
							lc.dst_id
						);
						return false;
					}

					self.net_state = NetState::Audio;
					self.net_last_dst = lc.dst_id;
					self.net_last_src = lc.src_id;
					self.net_timeout.start();
					info!(
						"P25, network voice transmission, srcId = {}, dstId = {}",
						lc.src_id, lc.dst_id
					);
				}
			}
		}

		if self.net_state != NetState::Audio {
			return false;
		}

		self.net_tg_hang.start();
		self.affiliations.touch_grant(self.net_last_dst);

		let frame_out = crate::modem::tag_frame(TAG_DATA, 0, &frame);
		self.tx_queue.add_frame(&frame_out, false);
		true
	}

	fn process_net_eot(&mut self) {
		if self.net_state == NetState::Audio {
			info!(
				"P25, network end of voice transmission, dstId = {}",
				self.net_last_dst
			);

			let mut tdu = [0u8; TDU_FRAME_LENGTH_BYTES];
			add_p25_sync(&mut tdu);
			Nid::new(self.config.nac, Duid::Tdu).encode(&mut tdu[6..]);
			let frame = crate::modem::tag_frame(TAG_EOT, 0, &tdu);
			self.tx_queue.add_frame(&frame, false);
		}

		self.net_tg_hang.start();
		self.net_timeout.stop();
		self.net_state = NetState::Idle;
	}

	/*
	** Checks
	*/

	/// Runs the ordered precondition chain; emits the deny and parks the
	/// machine in `Rejected` on the first failure.
	fn acl_check_rf(&mut self, src_id: u32, dst_id: u32, group: bool, service: u8) -> bool {
		if !validate_src_id(&self.rid_lookup, src_id) {
			if self.last_reject_id != src_id {
				warn!("P25, RID rejection, srcId = {src_id}");
				self.write_rf_deny(src_id, dst_id, super::DENY_RSN_REQ_UNIT_NOT_VALID, service);
				self.last_reject_id = src_id;
			}
			self.reject();
			return false;
		}

		if group {
			if !validate_tg_id(&self.tid_lookup, dst_id) {
				if self.last_reject_id != dst_id {
					warn!("P25, TGID rejection, dstId = {dst_id}");
					self.write_rf_deny(src_id, dst_id, super::DENY_RSN_TGT_GROUP_NOT_VALID, service);
					self.last_reject_id = dst_id;
				}
				self.reject();
				return false;
			}

			if self.config.verify_aff && !self.affiliations.is_group_aff(src_id, dst_id) {
				warn!("P25, RID not affiliated to TGID, srcId = {src_id}, dstId = {dst_id}");
				self.write_rf_deny(src_id, dst_id, super::DENY_RSN_REQ_UNIT_NOT_AUTH, service);
				self.reject();
				return false;
			}
		} else if dst_id != 0 && !validate_src_id(&self.rid_lookup, dst_id) {
			if self.last_reject_id != dst_id {
				warn!("P25, RID rejection, dstId = {dst_id}");
				self.write_rf_deny(src_id, dst_id, super::DENY_RSN_TGT_UNIT_NOT_VALID, service);
				self.last_reject_id = dst_id;
			}
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

	/// The full grant pipeline: busy checks, affiliation gating, channel
	/// selection, the bounded permit RPC with rollback, and the grant
	/// block itself.
	pub fn write_rf_grant(
		&mut self,
		src_id: u32,
		dst_id: u32,
		opts: super::ServiceOptions,
		group: bool,
		net_granted: bool,
		peer_rpc: &mut dyn PeerRpc,
	) -> bool {
		if !self.affiliations.is_granted(dst_id) {
			// don't grant over an in-progress call on another destination
			if self.net_state != NetState::Idle && dst_id != self.net_last_dst {
				if !net_granted {
					warn!("P25, grant denied, traffic in progress, dstId = {dst_id}");
					self.write_rf_deny(src_id, dst_id, super::QUE_RSN_TGT_UNIT_QUEUED, SVC_GRP_VCH);
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
					self.write_rf_deny(src_id, dst_id, super::QUE_RSN_TGT_UNIT_QUEUED, SVC_GRP_VCH);
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
					warn!("P25, grant ignored, no group affiliations, dstId = {dst_id}");
					return false;
				}
			}
			if !group
				&& !self.config.ignore_affiliation_check
				&& !self.affiliations.is_unit_reg(dst_id)
			{
				warn!("P25, grant ignored, no unit registration, dstId = {dst_id}");
				return false;
			}

			if !self.affiliations.is_rf_ch_available() {
				warn!("P25, grant queued, no channels available, dstId = {dst_id}");
				if !net_granted {
					self.write_rf_queue(src_id, dst_id, QUE_RSN_CHN_RESOURCE_NOT_AVAIL, SVC_GRP_VCH);
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
			// a retry from the original source refreshes; anyone else is
			// colliding
			if !self.config.disable_grant_src_check && !net_granted {
				let granted_src = self.affiliations.granted_src(dst_id).unwrap_or(0);
				if src_id != granted_src {
					warn!("P25, grant denied, traffic in progress, dstId = {dst_id}");
					self.write_rf_deny(src_id, dst_id, super::QUE_RSN_TGT_UNIT_QUEUED, SVC_GRP_VCH);
					self.reject();
					return false;
				}
			}
			self.affiliations.touch_grant(dst_id);
		}

		let ch_no = self.affiliations.granted_ch(dst_id).unwrap_or(0);

		// callback RPC to permit the granted TG on the voice channel,
		// bounded and rolled back on failure
		if self.config.authoritative && self.config.supervisor {
			let ch_data = self.affiliations.rf_ch_data(ch_no).cloned();
			match ch_data {
				Some(ch_data) if ch_data.is_valid() && ch_no != self.site.channel_no => {
					let op = RpcOp {
						op: rpc::RPC_PERMIT_P25_TG,
						dst_id,
						slot: 0,
					};
					if let Err(err) = peer_rpc.request(&ch_data, op, RPC_DEADLINE) {
						error!("P25, failed to permit TG for use, chNo = {ch_no}, {err}");
						self.affiliations.release_grant(dst_id, false);
						if !net_granted {
							self.write_rf_deny(
								src_id,
								dst_id,
								super::QUE_RSN_TGT_UNIT_QUEUED,
								SVC_GRP_VCH,
							);
							self.reject();
						}
						return false;
					}
				}
				_ => {
					error!("P25, failed to permit TG for use, chNo = {ch_no}");
				}
			}
		}

		if self.config.verbose {
			info!(
				"P25, grant, chNo = {ch_no}, srcId = {src_id}, dstId = {dst_id}, group = {group}, net = {net_granted}"
			);
		}

		let grant = Tsbk::GrpVchGrant(tsbk::GrpVchGrant {
			emergency: opts.contains(super::ServiceOptions::EMERGENCY),
			encrypted: opts.contains(super::ServiceOptions::ENCRYPTED),
			priority: opts.priority(),
			grp_vch_id: self.iden.channel_id,
			grp_vch_no: ch_no,
			dst_id,
			src_id,
		});
		let grant = if group {
			grant
		} else {
			Tsbk::UuVchGrant(tsbk::UuVchGrant {
				emergency: opts.contains(super::ServiceOptions::EMERGENCY),
				encrypted: opts.contains(super::ServiceOptions::ENCRYPTED),
				priority: opts.priority(),
				grp_vch_id: self.iden.channel_id,
				grp_vch_no: ch_no,
				dst_id,
				src_id,
			})
		};
		self.write_rf_tsdu(&grant, true);
		true
	}

	fn write_rf_grp_aff_rsp(&mut self, src_id: u32, dst_id: u32, net: &mut FneNetwork) {
		let mut response = RSP_ACCEPT;

		if !validate_src_id(&self.rid_lookup, src_id) {
			warn!("P25, affiliation denial, RID rejection, srcId = {src_id}");
			response = RSP_REFUSED;
		}
		if response == RSP_ACCEPT && !validate_tg_id(&self.tid_lookup, dst_id) {
			warn!("P25, affiliation denial, TGID rejection, dstId = {dst_id}");
			response = RSP_REFUSED;
		}
		if response == RSP_ACCEPT && self.config.verify_reg && !self.affiliations.is_unit_reg(src_id)
		{
			warn!("P25, affiliation denial, RID not registered, srcId = {src_id}");
			response = RSP_REFUSED;
		}

		if response == RSP_ACCEPT {
			if self.config.verbose {
				info!("P25, group affiliation, srcId = {src_id}, dstId = {dst_id}");
			}
			self.affiliations.group_aff(src_id, dst_id);
			net.announce_group_affiliation(src_id, dst_id);
		}

		self.write_rf_tsdu(
			&Tsbk::GrpAff(tsbk::GrpAff {
				response,
				announce_group: super::TGID_ALL,
				sys_id: self.site.sys_id,
				dst_id,
				src_id,
			}),
			false,
		);
	}

	fn write_rf_u_reg_rsp(&mut self, src_id: u32, net: &mut FneNetwork) {
		let mut response = RSP_ACCEPT;

		if !validate_src_id(&self.rid_lookup, src_id) {
			warn!("P25, registration denial, RID rejection, srcId = {src_id}");
			response = RSP_REFUSED;
		}

		if response == RSP_ACCEPT {
			if self.config.verbose {
				info!("P25, unit registration, srcId = {src_id}");
			}
			self.affiliations.unit_reg(src_id);
			net.announce_unit_registration(src_id);
		}

		self.write_rf_tsdu(
			&Tsbk::UReg(tsbk::UReg {
				response,
				net_id: self.site.net_id,
				sys_id: self.site.sys_id,
				dst_id: src_id,
				src_id,
			}),
			false,
		);
	}

	fn write_rf_deny(&mut self, src_id: u32, dst_id: u32, reason: u8, service: u8) {
		self.write_rf_tsdu(
			&Tsbk::DenyRsp(tsbk::DenyRsp {
				aiv: true,
				group: true,
				service,
				response: reason,
				dst_id,
				src_id,
			}),
			true,
		);
	}

	fn write_rf_queue(&mut self, src_id: u32, dst_id: u32, reason: u8, service: u8) {
		self.write_rf_tsdu(
			&Tsbk::QueRsp(tsbk::QueRsp {
				aiv: true,
				group: true,
				service,
				response: reason,
				dst_id,
				src_id,
			}),
			true,
		);
	}

	/// Serializes a TSDU onto the air: sync, NID, trellis-coded block.
	pub fn write_rf_tsdu(&mut self, tsbk: &Tsbk, immediate: bool) {
		let mut frame = [0u8; TSDU_FRAME_LENGTH_BYTES];
		add_p25_sync(&mut frame);
		Nid::new(self.config.nac, Duid::Tsdu).encode(&mut frame[6..]);

		if !tsbk.encode(&self.site, &mut frame[6 + NID_LENGTH_BYTES..], false, false) {
			return;
		}

		if self.config.debug {
			debug!("P25, writing TSDU, {}", tsbk.name());
		}

		let frame = crate::modem::tag_frame(TAG_DATA, 0, &frame);
		self.tx_queue.add_frame(&frame, immediate);
	}

	/*
	** Admin surface
	*/

	/// REST-originated inhibit/uninhibit toward a unit.
	pub fn write_rf_ext_fnct(&mut self, function: u16, dst_id: u32) {
		self.write_rf_tsdu(
			&Tsbk::ExtFnct(tsbk::ExtFnct {
				function,
				dst_id,
				src_id: WUID_FNE,
			}),
			false,
		);
	}

	/// REST-originated grant.
	pub fn admin_grant_tg(&mut self, dst_id: u32, peer_rpc: &mut dyn PeerRpc) -> bool {
		let opts = super::ServiceOptions::from_parts(false, false, 4);
		self.write_rf_grant(WUID_FNE, dst_id, opts, true, false, peer_rpc)
	}

	/// REST-originated release of one or all grants.
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

	/// FNE permit for a destination on this (voice) channel; drives the
	/// non-authoritative path.
	pub fn permit_tg(&mut self, dst_id: u32) {
		if self.config.verbose {
			info!("P25, TG permitted, dstId = {dst_id}");
		}
		self.net_permitted_dst = dst_id;
		self.net_last_dst = dst_id;
	}

	/*
	** Clocking
	*/

	/// Advances every timer; fires control-channel broadcasts and expired
	/// grants.
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
			self.last_reject_id = 0;
		}

		if self.rf_state == RfState::Audio && self.rf_timeout.has_expired() {
			warn!("P25, call timeout, dstId = {}", self.rf_last_dst);
			self.rf_timeout.stop();
			self.rf_state = RfState::Listening;
		}
		if self.net_state == NetState::Audio && self.net_timeout.has_expired() {
			warn!("P25, network call timeout, dstId = {}", self.net_last_dst);
			self.net_timeout.stop();
			self.net_state = NetState::Idle;
		}

		// grant expiry; on a dedicated control channel the release is
		// announced over the air
		let released = self.affiliations.clock(ms);
		if self.config.dedicated_control {
			for rel in released {
				self.write_rf_tsdu(
					&Tsbk::GrpVchGrantUpd(tsbk::GrpVchGrantUpd {
						grp_vch_id: self.iden.channel_id,
						grp_vch_no: 0,
						dst_id: rel.dst_id,
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

	/// Round-robin control channel announcements.
	fn write_cc_broadcast(&mut self) {
		// a beacon never preempts queued traffic
		if self.tx_queue.free_space() < TSDU_FRAME_LENGTH_BYTES + 3 {
			return;
		}

		match self.cc_seq {
			0 => self.write_rf_tsdu(&Tsbk::RfssStsBcast(tsbk::RfssStsBcast { roamer_reaccess: false }), false),
			1 => self.write_rf_tsdu(&Tsbk::NetStsBcast(tsbk::NetStsBcast), false),
			2 => {
				if !self.adj_sites.is_empty() {
					let adj = self.adj_sites[self.adj_seq % self.adj_sites.len()];
					self.adj_seq = self.adj_seq.wrapping_add(1);
					self.write_rf_tsdu(
						&Tsbk::AdjStsBcast(tsbk::AdjStsBcast {
							adj_site_lra: self.site.lra,
							adj_cfva: 0x0C,
							adj_sys_id: adj.sys_id,
							adj_rfss_id: adj.rfss_id,
							adj_site_id: adj.site_id,
							adj_ch_id: adj.ch_id,
							adj_ch_no: adj.ch_no,
							adj_svc_class: adj.svc_class,
						}),
						false,
					);
				}
			}
			3 => self.write_rf_tsdu(&Tsbk::IdenUp(tsbk::IdenUp { iden: self.iden }), false),
			4 => self.write_rf_tsdu(
				&Tsbk::SysSrvBcast(tsbk::SysSrvBcast {
					services_available: 0x00_01_00,
					services_supported: 0x00_01_00,
				}),
				false,
			),
			5 => self.write_rf_tsdu(&Tsbk::TimeDateAnn(tsbk::TimeDateAnn), false),
			_ => self.write_rf_tsdu(&Tsbk::SyncBcast(tsbk::SyncBcast { microslot_count: 0 }), false),
		}

		self.cc_seq = (self.cc_seq + 1) % 7;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lookups::VoiceChData;

	struct NullRpc {
		fail: bool,
		calls: u32,
	}

	impl PeerRpc for NullRpc {
		fn request(
			&mut self,
			_target: &VoiceChData,
			_op: RpcOp,
			_deadline: std::time::Duration,
		) -> std::io::Result<()> {
			self.calls += 1;
			if self.fail {
				Err(std::io::Error::other("peer unreachable"))
			} else {
				Ok(())
			}
		}
	}

	fn harness(authoritative: bool) -> (P25Control, FneNetwork, NullRpc) {
		let rid = Arc::new(RadioIdLookup::new(false));
		let mut tid = TalkgroupRuleLookup::new(false);
		tid.insert(crate::lookups::TalkgroupRule::new(50, true));
		let tid = Arc::new(tid);
		let queue = Arc::new(TxQueue::default());

		let config = P25Config {
			authoritative,
			dedicated_control: true,
			..P25Config::default()
		};

		let mut site = SiteData::default();
		site.channel_no = 1;
		let iden = crate::IdenEntry {
			channel_id: 1,
			base_frequency: 762_000_000,
			tx_offset_mhz: -30.0,
			ch_bandwidth_khz: 12.5,
			ch_space_khz: 12.5,
		};

		let mut control = P25Control::new(config, site, iden, rid, tid, queue);
		control.affiliations_mut().add_rf_ch(7);
		control
			.affiliations_mut()
			.set_rf_ch_data(VoiceChData::new(7, "127.0.0.1", 9990));

		(control, FneNetwork::new(1), NullRpc { fail: false, calls: 0 })
	}

	#[test]
	fn rf_group_grant_records_and_emits() {
		let (mut control, _net, mut rpc) = harness(true);

		let opts = crate::p25::ServiceOptions::from_parts(false, false, 4);
		assert!(control.write_rf_grant(1001, 50, opts, true, false, &mut rpc));

		assert_eq!(control.affiliations().granted_ch(50), Some(7));
		assert_eq!(control.affiliations().granted_src(50), Some(1001));
		// the grant TSDU is queued immediately
		assert!(!control.tx_queue.is_empty());
	}

	#[test]
	fn grant_denied_when_pool_empty() {
		let (mut control, _net, mut rpc) = harness(true);
		let opts = crate::p25::ServiceOptions::from_parts(false, false, 4);

		assert!(control.write_rf_grant(1001, 50, opts, true, false, &mut rpc));
		// second destination has no channel left
		assert!(!control.write_rf_grant(1002, 60, opts, true, false, &mut rpc));
		assert_eq!(control.rf_state(), RfState::Rejected);
	}

	#[test]
	fn grant_retry_from_other_source_collides() {
		let (mut control, _net, mut rpc) = harness(true);
		let opts = crate::p25::ServiceOptions::from_parts(false, false, 4);

		assert!(control.write_rf_grant(1001, 50, opts, true, false, &mut rpc));
		assert!(!control.write_rf_grant(9999, 50, opts, true, false, &mut rpc));
		// the original holder still owns the grant
		assert_eq!(control.affiliations().granted_src(50), Some(1001));
	}

	#[test]
	fn rpc_failure_rolls_back_the_grant() {
		let (mut control, _net, _) = harness(true);
		let mut rpc = NullRpc { fail: true, calls: 0 };
		control.config.supervisor = true;

		let opts = crate::p25::ServiceOptions::from_parts(false, false, 4);
		assert!(!control.write_rf_grant(1001, 50, opts, true, false, &mut rpc));
		assert_eq!(rpc.calls, 1);
		assert!(!control.affiliations().is_granted(50));
		assert_eq!(control.affiliations().rf_ch_free_count(), 1);
	}

	#[test]
	fn grant_expiry_restores_the_pool() {
		let (mut control, _net, mut rpc) = harness(true);
		let opts = crate::p25::ServiceOptions::from_parts(false, false, 4);
		assert!(control.write_rf_grant(1001, 50, opts, true, false, &mut rpc));

		control.clock(15_100);
		assert!(!control.affiliations().is_granted(50));
		assert_eq!(control.affiliations().rf_ch_free_count(), 1);
	}

	fn ldu1_frame(control: &P25Control, dst_id: u32, src_id: u32) -> [u8; LDU_FRAME_LENGTH_BYTES] {
		let mut frame = [0u8; LDU_FRAME_LENGTH_BYTES];
		add_p25_sync(&mut frame);
		Nid::new(control.config.nac, Duid::Ldu1).encode(&mut frame[6..]);
		super::super::lc::LinkControl::group_voice(dst_id, src_id)
			.encode(&mut frame[voice::RS_OFFSET..]);
		frame
	}

	fn net_ldu1(control: &P25Control, dst_id: u32, src_id: u32) -> Vec<u8> {
		let mut msg = vec![u8::from(Duid::Ldu1)];
		msg.extend_from_slice(&ldu1_frame(control, dst_id, src_id));
		msg
	}

	#[test]
	fn network_collision_same_tg_is_dropped() {
		// rf mid-call (src = 111, dst = 22); net arrives (src = 999,
		// dst = 22): the frame is dropped and rf is untouched
		let (mut control, mut net, _rpc) = harness(true);
		control.rf_state = RfState::Audio;
		control.rf_last_dst = 22;
		control.rf_last_src = 111;

		let msg = net_ldu1(&control, 22, 999);
		assert!(!control.process_network(&msg, &mut net));
		assert_eq!(control.net_state(), NetState::Idle);
		assert_eq!(control.rf_state(), RfState::Audio);
	}

	#[test]
	fn network_collision_other_tg_is_dropped() {
		let (mut control, mut net, _rpc) = harness(true);
		control.rf_state = RfState::Audio;
		control.rf_last_dst = 22;

		let msg = net_ldu1(&control, 99, 999);
		assert!(!control.process_network(&msg, &mut net));
		assert_eq!(control.net_state(), NetState::Idle);
	}

	#[test]
	fn rf_yields_to_network_call_on_same_tg() {
		let (mut control, mut net, mut rpc) = harness(true);
		control.net_state = NetState::Audio;
		control.net_last_dst = 50;

		let frame = ldu1_frame(&control, 50, 1001);
		assert!(!control.process_rf(&frame, &mut net, &mut rpc));
		assert_eq!(control.rf_state(), RfState::Listening);
		assert_eq!(control.net_state(), NetState::Audio);
	}

	#[test]
	fn rf_preempts_mismatched_network_call() {
		let (mut control, mut net, mut rpc) = harness(true);
		control.net_state = NetState::Audio;
		control.net_last_dst = 99;

		let frame = ldu1_frame(&control, 50, 1001);
		assert!(control.process_rf(&frame, &mut net, &mut rpc));
		assert_eq!(control.rf_state(), RfState::Audio);
		assert_eq!(control.net_state(), NetState::Idle);
	}

	#[test]
	fn non_authoritative_net_requires_permit() {
		let (mut control, mut net, _rpc) = harness(false);

		let msg = net_ldu1(&control, 50, 1001);
		assert!(!control.process_network(&msg, &mut net));
		assert_eq!(control.net_state(), NetState::Idle);

		control.permit_tg(50);
		assert!(control.process_network(&msg, &mut net));
		assert_eq!(control.net_state(), NetState::Audio);
	}

	#[test]
	fn cc_broadcast_rotates(){
		let (mut control, _net, _rpc) = harness(true);

		// drain anything pending
		while control.tx_queue.get_frame().is_some() {}

		control.clock(4_100);
		assert!(control.tx_queue.get_frame().is_some());
	}
}
