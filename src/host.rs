//! Host scaffolding: the cooperative main-loop state, admin (REST
//! originated) events, protocol dispatch and lookup snapshot publishing.
//!
//! The outer shell owns the actual loop, the modem port and the FNE
//! socket; everything protocol-shaped funnels through here. All state is
//! mutated from a single thread; admin mutations arrive as queued events
//! and are applied at tick boundaries.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::dmr::control::{DmrConfig, DmrControl};
use crate::lookups::{RadioIdLookup, TalkgroupRule, TalkgroupRuleLookup};
use crate::modem::TxQueue;
use crate::network::{FneMessage, FneNetwork, NetFunc, NetSubFunc, PeerRpc, parse_frame};
use crate::nxdn::control::{NxdnConfig, NxdnControl};
use crate::p25::control::{P25Config, P25Control};
use crate::{IdenEntry, NetState, RfState, SiteData};

/// Host operating states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
	Idle,
	Dmr,
	P25,
	Nxdn,
	Lockout,
	Error,
}

/// Protocol selector for admin events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	Dmr,
	P25,
	Nxdn,
}

/// REST-originated events the core honours.
#[derive(Debug, Clone)]
pub enum AdminEvent {
	SetMode(HostState),
	PermitTg {
		protocol: Protocol,
		dst_id: u32,
		slot: u8,
	},
	GrantTg {
		protocol: Protocol,
		dst_id: u32,
	},
	ReleaseGrants {
		protocol: Protocol,
		dst_id: Option<u32>,
	},
	ReleaseAffs {
		protocol: Protocol,
	},
	RidUpdate {
		id: u32,
		enabled: bool,
	},
	RidRemove {
		id: u32,
	},
	InhibitUnit {
		protocol: Protocol,
		dst_id: u32,
	},
	UninhibitUnit {
		protocol: Protocol,
		dst_id: u32,
	},
	DmrPayloadActivate {
		dst_id: u32,
		src_id: u32,
		group: bool,
	},
	CcEnable {
		protocol: Protocol,
		enabled: bool,
	},
}

/// Everything needed to stand the core up.
pub struct HostConfig {
	pub site: SiteData,
	pub iden: IdenEntry,
	pub peer_id: u32,
	pub dmr: Option<DmrConfig>,
	pub p25: Option<P25Config>,
	pub nxdn: Option<NxdnConfig>,
	pub rid_acl: bool,
	pub tg_acl: bool,
}

/// Per-protocol status snapshot for the admin GET surface.
#[derive(Debug, Clone)]
pub struct ProtocolStatus {
	pub rf_state: RfState,
	pub net_state: NetState,
	pub grants: Vec<(u32, u32, u32, u8)>,
	pub unit_regs: usize,
	pub group_affs: usize,
}

/// The trunking core host.
pub struct Host {
	state: HostState,

	dmr: Option<DmrControl>,
	p25: Option<P25Control>,
	nxdn: Option<NxdnControl>,

	net: FneNetwork,
	tx_queue: Arc<TxQueue>,

	/// Master ACL tables; controllers hold published snapshots.
	rid_master: Vec<(u32, bool)>,
	rid_acl: bool,
	tg_acl: bool,

	events: VecDeque<AdminEvent>,
}

impl Host {
	pub fn new(config: HostConfig) -> Self {
		let tx_queue = Arc::new(TxQueue::default());
		let rid = Arc::new(RadioIdLookup::new(config.rid_acl));
		let tid = Arc::new(TalkgroupRuleLookup::new(config.tg_acl));

		let dmr = config.dmr.map(|c| {
			DmrControl::new(
				c,
				config.site.clone(),
				Arc::clone(&rid),
				Arc::clone(&tid),
				Arc::clone(&tx_queue),
			)
		});
		let p25 = config.p25.map(|c| {
			P25Control::new(
				c,
				config.site.clone(),
				config.iden,
				Arc::clone(&rid),
				Arc::clone(&tid),
				Arc::clone(&tx_queue),
			)
		});
		let nxdn = config.nxdn.map(|c| {
			NxdnControl::new(
				c,
				config.site.clone(),
				Arc::clone(&rid),
				Arc::clone(&tid),
				Arc::clone(&tx_queue),
			)
		});

		Self {
			state: HostState::Idle,
			dmr,
			p25,
			nxdn,
			net: FneNetwork::new(config.peer_id),
			tx_queue,
			rid_master: Vec::new(),
			rid_acl: config.rid_acl,
			tg_acl: config.tg_acl,
			events: VecDeque::new(),
		}
	}

	pub fn state(&self) -> HostState {
		self.state
	}

	pub fn tx_queue(&self) -> &Arc<TxQueue> {
		&self.tx_queue
	}

	pub fn dmr(&mut self) -> Option<&mut DmrControl> {
		self.dmr.as_mut()
	}

	pub fn p25(&mut self) -> Option<&mut P25Control> {
		self.p25.as_mut()
	}

	pub fn nxdn(&mut self) -> Option<&mut NxdnControl> {
		self.nxdn.as_mut()
	}

	/// Queues an admin event; applied at the next tick boundary.
	pub fn submit(&mut self, event: AdminEvent) {
		self.events.push_back(event);
	}

	/// Replaces the published talkgroup rules (file reload).
	pub fn reload_talkgroups<I: IntoIterator<Item = TalkgroupRule>>(&mut self, rules: I) {
		let mut table = TalkgroupRuleLookup::new(self.tg_acl);
		table.reload(rules);
		let table = Arc::new(table);
		if let Some(dmr) = self.dmr.as_mut() {
			dmr.set_tid_lookup(Arc::clone(&table));
		}
		if let Some(p25) = self.p25.as_mut() {
			p25.set_tid_lookup(Arc::clone(&table));
		}
		if let Some(nxdn) = self.nxdn.as_mut() {
			nxdn.set_tid_lookup(table);
		}
	}

	/// Publishes the RID master list as a fresh snapshot.
	fn publish_rids(&mut self) {
		let mut table = RadioIdLookup::new(self.rid_acl);
		table.reload(self.rid_master.iter().copied());
		let table = Arc::new(table);
		if let Some(dmr) = self.dmr.as_mut() {
			dmr.set_rid_lookup(Arc::clone(&table));
		}
		if let Some(p25) = self.p25.as_mut() {
			p25.set_rid_lookup(Arc::clone(&table));
		}
		if let Some(nxdn) = self.nxdn.as_mut() {
			nxdn.set_rid_lookup(table);
		}
	}

	/// Replaces the whole RID list (file reload).
	pub fn reload_rids<I: IntoIterator<Item = (u32, bool)>>(&mut self, entries: I) {
		self.rid_master = entries.into_iter().collect();
		self.publish_rids();
	}

	/*
	** Inbound dispatch
	*/

	/// Dispatches one tag-stripped modem frame by its length-implicit
	/// protocol framing.
	pub fn process_modem_frame(&mut self, data: &[u8], peer_rpc: &mut dyn PeerRpc) -> bool {
		if self.state == HostState::Lockout || self.state == HostState::Error {
			return false;
		}

		match data.len() {
			// DMR bursts lead with the slot number
			34 => {
				let slot_no = if data[0] == 2 { 2 } else { 1 };
				match self.dmr.as_mut() {
					Some(dmr) => dmr.process_rf(slot_no, &data[1..], &mut self.net, peer_rpc),
					None => false,
				}
			}
			crate::nxdn::FRAME_LENGTH_BYTES => match self.nxdn.as_mut() {
				Some(nxdn) => nxdn.process_rf(data, &mut self.net, peer_rpc),
				None => false,
			},
			_ => match self.p25.as_mut() {
				Some(p25) => p25.process_rf(data, &mut self.net, peer_rpc),
				None => false,
			},
		}
	}

	/// Parses and routes one FNE datagram.
	pub fn process_network_datagram(&mut self, data: &[u8], peer_rpc: &mut dyn PeerRpc) -> bool {
		let message = match parse_frame(data) {
			Ok(message) => message,
			Err(err) => {
				debug!("FNE, discarding datagram, {err}");
				return false;
			}
		};

		match NetFunc::try_from(message.fne.func) {
			Ok(NetFunc::Protocol) => self.route_protocol(&message, peer_rpc),
			Ok(NetFunc::Grant) => self.route_grant(&message),
			Ok(NetFunc::Ping) => {
				// answered by the outer shell's keepalive machinery
				true
			}
			Ok(_) => true,
			Err(_) => {
				warn!("FNE, unknown function, func = ${:02X}", message.fne.func);
				false
			}
		}
	}

	fn route_protocol(&mut self, message: &FneMessage<'_>, peer_rpc: &mut dyn PeerRpc) -> bool {
		match NetSubFunc::try_from(message.fne.subfunc) {
			Ok(NetSubFunc::Dmr) => match self.dmr.as_mut() {
				Some(dmr) => dmr.process_network(message.message, &mut self.net),
				None => false,
			},
			Ok(NetSubFunc::P25) => match self.p25.as_mut() {
				Some(p25) => p25.process_network(message.message, &mut self.net),
				None => false,
			},
			Ok(NetSubFunc::Nxdn) => match self.nxdn.as_mut() {
				Some(nxdn) => nxdn.process_network(message.message, peer_rpc),
				None => false,
			},
			Err(_) => false,
		}
	}

	fn route_grant(&mut self, message: &FneMessage<'_>) -> bool {
		// PERMIT RPCs from the FNE carry the destination in the body
		if message.message.len() < 11 {
			return false;
		}
		let dst_id = crate::bits::get_u32(message.message, 5);
		let slot = message.message[9];

		match NetSubFunc::try_from(message.fne.subfunc) {
			Ok(NetSubFunc::Dmr) => {
				if let Some(dmr) = self.dmr.as_mut() {
					dmr.permit_tg(slot, dst_id);
				}
			}
			Ok(NetSubFunc::P25) => {
				if let Some(p25) = self.p25.as_mut() {
					p25.permit_tg(dst_id);
				}
			}
			Ok(NetSubFunc::Nxdn) => {
				if let Some(nxdn) = self.nxdn.as_mut() {
					nxdn.permit_tg(dst_id);
				}
			}
			Err(_) => return false,
		}
		true
	}

	/// Next outbound FNE datagram for the socket pump.
	pub fn poll_network(&mut self) -> Option<Vec<u8>> {
		self.net.poll_outbound()
	}

	/*
	** Clocking
	*/

	/// One main-loop tick: apply queued admin events, then clock every
	/// protocol machine.
	pub fn clock(&mut self, ms: u32, peer_rpc: &mut dyn PeerRpc) {
		while let Some(event) = self.events.pop_front() {
			self.apply_event(event, peer_rpc);
		}

		if let Some(dmr) = self.dmr.as_mut() {
			dmr.clock(ms);
		}
		if let Some(p25) = self.p25.as_mut() {
			p25.clock(ms);
		}
		if let Some(nxdn) = self.nxdn.as_mut() {
			nxdn.clock(ms);
		}
	}

	fn apply_event(&mut self, event: AdminEvent, peer_rpc: &mut dyn PeerRpc) {
		match event {
			AdminEvent::SetMode(state) => {
				info!("host, mode change, {:?} -> {state:?}", self.state);
				self.state = state;
			}
			AdminEvent::PermitTg {
				protocol,
				dst_id,
				slot,
			} => match protocol {
				Protocol::Dmr => {
					if let Some(dmr) = self.dmr.as_mut() {
						dmr.permit_tg(slot, dst_id);
					}
				}
				Protocol::P25 => {
					if let Some(p25) = self.p25.as_mut() {
						p25.permit_tg(dst_id);
					}
				}
				Protocol::Nxdn => {
					if let Some(nxdn) = self.nxdn.as_mut() {
						nxdn.permit_tg(dst_id);
					}
				}
			},
			AdminEvent::GrantTg { protocol, dst_id } => match protocol {
				Protocol::Dmr => {
					if let Some(dmr) = self.dmr.as_mut() {
						dmr.write_rf_grant(1, crate::dmr::WUID_FNE, dst_id, 0, true, false, peer_rpc);
					}
				}
				Protocol::P25 => {
					if let Some(p25) = self.p25.as_mut() {
						p25.admin_grant_tg(dst_id, peer_rpc);
					}
				}
				Protocol::Nxdn => {
					if let Some(nxdn) = self.nxdn.as_mut() {
						nxdn.write_rf_message_grant(
							crate::dmr::WUID_FNE,
							dst_id,
							crate::nxdn::rcch::CallOptions::default(),
							true,
							false,
							peer_rpc,
						);
					}
				}
			},
			AdminEvent::ReleaseGrants { protocol, dst_id } => match protocol {
				Protocol::Dmr => {
					if let Some(dmr) = self.dmr.as_mut() {
						dmr.admin_release_grants(dst_id);
					}
				}
				Protocol::P25 => {
					if let Some(p25) = self.p25.as_mut() {
						p25.admin_release_grants(dst_id);
					}
				}
				Protocol::Nxdn => {
					if let Some(nxdn) = self.nxdn.as_mut() {
						nxdn.admin_release_grants(dst_id);
					}
				}
			},
			AdminEvent::ReleaseAffs { protocol } => match protocol {
				Protocol::Dmr => {
					if let Some(dmr) = self.dmr.as_mut() {
						dmr.admin_release_affs();
					}
				}
				Protocol::P25 => {
					if let Some(p25) = self.p25.as_mut() {
						p25.admin_release_affs();
					}
				}
				Protocol::Nxdn => {
					if let Some(nxdn) = self.nxdn.as_mut() {
						nxdn.admin_release_affs();
					}
				}
			},
			AdminEvent::RidUpdate { id, enabled } => {
				self.rid_master.retain(|(rid, _)| *rid != id);
				self.rid_master.push((id, enabled));
				self.publish_rids();
			}
			AdminEvent::RidRemove { id } => {
				self.rid_master.retain(|(rid, _)| *rid != id);
				self.publish_rids();
			}
			AdminEvent::InhibitUnit { protocol, dst_id } => match protocol {
				Protocol::Dmr => {
					if let Some(dmr) = self.dmr.as_mut() {
						dmr.write_rf_ext_fnct(crate::dmr::EXT_FNCT_INHIBIT, dst_id);
					}
				}
				Protocol::P25 => {
					if let Some(p25) = self.p25.as_mut() {
						p25.write_rf_ext_fnct(crate::p25::EXT_FNCT_INHIBIT, dst_id);
					}
				}
				Protocol::Nxdn => {}
			},
			AdminEvent::UninhibitUnit { protocol, dst_id } => match protocol {
				Protocol::Dmr => {
					if let Some(dmr) = self.dmr.as_mut() {
						dmr.write_rf_ext_fnct(crate::dmr::EXT_FNCT_UNINHIBIT, dst_id);
					}
				}
				Protocol::P25 => {
					if let Some(p25) = self.p25.as_mut() {
						p25.write_rf_ext_fnct(crate::p25::EXT_FNCT_UNINHIBIT, dst_id);
					}
				}
				Protocol::Nxdn => {}
			},
			AdminEvent::DmrPayloadActivate {
				dst_id,
				src_id,
				group,
			} => {
				if let Some(dmr) = self.dmr.as_mut() {
					dmr.tscc_payload_activate(dst_id, src_id, group);
				}
			}
			AdminEvent::CcEnable { protocol, enabled } => match protocol {
				Protocol::Dmr => {
					if let Some(dmr) = self.dmr.as_mut() {
						dmr.set_control_enabled(enabled);
					}
				}
				Protocol::P25 => {
					if let Some(p25) = self.p25.as_mut() {
						p25.set_control_enabled(enabled);
					}
				}
				Protocol::Nxdn => {
					if let Some(nxdn) = self.nxdn.as_mut() {
						nxdn.set_control_enabled(enabled);
					}
				}
			},
		}
	}

	/*
	** Status surface
	*/

	pub fn dmr_status(&self) -> Option<ProtocolStatus> {
		self.dmr.as_ref().map(|dmr| ProtocolStatus {
			rf_state: dmr.rf_state(1),
			net_state: dmr.net_state(1),
			grants: dmr.affiliations().grant_table(),
			unit_regs: dmr.affiliations().unit_reg_size(),
			group_affs: dmr.affiliations().group_aff_size(),
		})
	}

	pub fn p25_status(&self) -> Option<ProtocolStatus> {
		self.p25.as_ref().map(|p25| ProtocolStatus {
			rf_state: p25.rf_state(),
			net_state: p25.net_state(),
			grants: p25.affiliations().grant_table(),
			unit_regs: p25.affiliations().unit_reg_size(),
			group_affs: p25.affiliations().group_aff_size(),
		})
	}

	pub fn nxdn_status(&self) -> Option<ProtocolStatus> {
		self.nxdn.as_ref().map(|nxdn| ProtocolStatus {
			rf_state: nxdn.rf_state(),
			net_state: nxdn.net_state(),
			grants: nxdn.affiliations().grant_table(),
			unit_regs: nxdn.affiliations().unit_reg_size(),
			group_affs: nxdn.affiliations().group_aff_size(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lookups::VoiceChData;
	use crate::network::RpcOp;

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

	fn host() -> Host {
		let mut host = Host::new(HostConfig {
			site: SiteData::default(),
			iden: IdenEntry::default(),
			peer_id: 9_000_100,
			dmr: Some(DmrConfig::default()),
			p25: Some(P25Config::default()),
			nxdn: Some(NxdnConfig::default()),
			rid_acl: false,
			tg_acl: false,
		});
		if let Some(p25) = host.p25() {
			p25.affiliations_mut().add_rf_ch(7);
		}
		host
	}

	#[test]
	fn admin_events_apply_at_tick() {
		let mut host = host();
		let mut rpc = NullRpc;

		host.submit(AdminEvent::SetMode(HostState::P25));
		assert_eq!(host.state(), HostState::Idle);

		host.clock(10, &mut rpc);
		assert_eq!(host.state(), HostState::P25);
	}

	#[test]
	fn admin_grant_flows_to_controller() {
		let mut host = host();
		let mut rpc = NullRpc;

		host.submit(AdminEvent::GrantTg {
			protocol: Protocol::P25,
			dst_id: 50,
		});
		host.clock(10, &mut rpc);

		let status = host.p25_status().unwrap();
		assert_eq!(status.grants.len(), 1);
		assert_eq!(status.grants[0].0, 50);
	}

	#[test]
	fn rid_updates_are_published() {
		let mut host = host();
		let mut rpc = NullRpc;

		host.submit(AdminEvent::RidUpdate {
			id: 2002,
			enabled: false,
		});
		host.clock(10, &mut rpc);

		// a disabled RID must now be rejected by the P25 machine even with
		// ACLs off
		host.submit(AdminEvent::GrantTg {
			protocol: Protocol::P25,
			dst_id: 60,
		});
		host.clock(10, &mut rpc);
	}

	#[test]
	fn lockout_drops_modem_frames(){
		let mut host = host();
		let mut rpc = NullRpc;

		host.submit(AdminEvent::SetMode(HostState::Lockout));
		host.clock(10, &mut rpc);

		let frame = [0u8; 48];
		assert!(!host.process_modem_frame(&frame, &mut rpc));
	}

	#[test]
	fn malformed_datagram_is_discarded() {
		let mut host = host();
		let mut rpc = NullRpc;
		assert!(!host.process_network_datagram(&[0u8; 8], &mut rpc));
	}
}
