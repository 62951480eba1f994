//! Trunking signalling block (TSBK) codec.
//!
//! Single-block trunking signalling: 12 bytes (opcode, manufacturer ID,
//! a packed 64-bit value and a CCITT CRC), rate-3/4 trellis coded on air.
//! Inbound (ISP) and outbound (OSP) messages share opcode points; decode
//! reads the inbound layout, encode writes the outbound one, matching the
//! over-the-air direction this host sees.

use time::OffsetDateTime;

use super::{MFID_MOT, MFID_STANDARD, SVC_CLS_INVALID, TSBK_LENGTH_BYTES};
use crate::bits::{get_u64, set_u64};
use crate::edac::{crc, trellis};
use crate::errors::DecodeError;
use crate::{IdenEntry, SiteData};

/// TSBK opcode points. ISP/OSP directions reuse values; names follow the
/// direction this host handles them in.
pub mod opcode {
	pub const IOSP_GRP_VCH: u8 = 0x00;
	pub const OSP_GRP_VCH_GRANT_UPD: u8 = 0x02;
	pub const IOSP_UU_VCH: u8 = 0x04;
	pub const IOSP_UU_ANS: u8 = 0x05;
	pub const OSP_UU_VCH_GRANT_UPD: u8 = 0x06;
	pub const ISP_SNDCP_CH_REQ: u8 = 0x12;
	pub const OSP_SNDCP_CH_GNT: u8 = 0x14;
	pub const ISP_SNDCP_REC_REQ: u8 = 0x16;
	pub const IOSP_STS_UPDT: u8 = 0x18;
	pub const IOSP_MSG_UPDT: u8 = 0x1C;
	pub const IOSP_CALL_ALRT: u8 = 0x1F;
	pub const IOSP_ACK_RSP: u8 = 0x20;
	pub const OSP_QUE_RSP: u8 = 0x21;
	pub const ISP_AUTH_RESP: u8 = 0x22;
	pub const ISP_CAN_SRV_REQ: u8 = 0x23;
	pub const IOSP_EXT_FNCT: u8 = 0x24;
	pub const ISP_AUTH_SU_DMD: u8 = 0x25;
	pub const OSP_DENY_RSP: u8 = 0x27;
	pub const IOSP_GRP_AFF: u8 = 0x28;
	pub const OSP_GRP_AFF_Q: u8 = 0x2A;
	pub const OSP_LOC_REG_RSP: u8 = 0x2B;
	pub const IOSP_U_REG: u8 = 0x2C;
	/// Outbound: unit registration command.
	pub const OSP_U_REG_CMD: u8 = 0x2D;
	/// Inbound: location registration request (same point as U_REG_CMD).
	pub const ISP_LOC_REG_REQ: u8 = 0x2D;
	pub const IOSP_U_DEREG: u8 = 0x2F;
	pub const OSP_SYNC_BCAST: u8 = 0x30;
	pub const OSP_TIME_DATE_ANN: u8 = 0x34;
	pub const OSP_SYS_SRV_BCAST: u8 = 0x38;
	pub const OSP_SCCB: u8 = 0x39;
	pub const OSP_RFSS_STS_BCAST: u8 = 0x3A;
	pub const OSP_NET_STS_BCAST: u8 = 0x3B;
	pub const OSP_ADJ_STS_BCAST: u8 = 0x3C;
	pub const OSP_IDEN_UP: u8 = 0x3D;

	// Motorola opcode points (MFID 0x90)
	pub const OSP_MOT_GRG_ADD: u8 = 0x00;
	pub const OSP_MOT_GRG_DEL: u8 = 0x01;
	pub const OSP_MOT_GRG_VCH_UPD: u8 = 0x03;
	pub const OSP_MOT_CC_BSI: u8 = 0x3E;
	pub const OSP_MOT_PSH_CCH: u8 = 0x3F;
}

/// Decodes the 12 protected bytes out of an on-air or raw TSBK.
fn base_decode(data: &[u8], raw_tsbk: bool) -> Result<[u8; TSBK_LENGTH_BYTES], DecodeError> {
	let mut tsbk = [0u8; TSBK_LENGTH_BYTES];

	if raw_tsbk {
		if data.len() < TSBK_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}
		tsbk.copy_from_slice(&data[..TSBK_LENGTH_BYTES]);
	} else {
		let mut payload = [0u8; 18];
		trellis::decode34(data, &mut payload)?;
		tsbk.copy_from_slice(&payload[..TSBK_LENGTH_BYTES]);
	}

	if !crc::check_ccitt162(&tsbk, TSBK_LENGTH_BYTES) {
		return Err(DecodeError::Crc);
	}
	Ok(tsbk)
}

/// Serializes 12 TSBK bytes onto the air (or raw, for the network path).
fn base_encode(data: &mut [u8], tsbk: &mut [u8; TSBK_LENGTH_BYTES], raw_tsbk: bool, no_trellis: bool) {
	crc::add_ccitt162(tsbk, TSBK_LENGTH_BYTES);

	if raw_tsbk || no_trellis {
		data[..TSBK_LENGTH_BYTES].copy_from_slice(tsbk);
	} else {
		let mut payload = [0u8; 18];
		payload[..TSBK_LENGTH_BYTES].copy_from_slice(tsbk);
		trellis::encode34(&payload, data);
	}
}

/// The packed 64-bit value in bytes 2..10.
fn to_value(tsbk: &[u8; TSBK_LENGTH_BYTES]) -> u64 {
	get_u64(tsbk, 2)
}

fn from_value(value: u64, lco: u8, mfid: u8, last_block: bool) -> [u8; TSBK_LENGTH_BYTES] {
	let mut tsbk = [0u8; TSBK_LENGTH_BYTES];
	tsbk[0] = (lco & 0x3F) | if last_block { 0x80 } else { 0x00 };
	tsbk[1] = mfid;
	set_u64(value, &mut tsbk, 2);
	tsbk
}

/// Group voice channel request (ISP) / grant (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrpVchGrant {
	pub emergency: bool,
	pub encrypted: bool,
	pub priority: u8,
	pub grp_vch_id: u8,
	pub grp_vch_no: u32,
	pub dst_id: u32,
	pub src_id: u32,
}

impl GrpVchGrant {
	fn decode(value: u64) -> Self {
		Self {
			emergency: (value >> 56) & 0x80 == 0x80,
			encrypted: (value >> 56) & 0x40 == 0x40,
			priority: ((value >> 56) & 0x07) as u8,
			grp_vch_id: 0,
			grp_vch_no: 0,
			dst_id: ((value >> 24) & 0xFFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self, site: &SiteData) -> u64 {
		let mut value: u64 = u64::from(self.emergency) << 7
			| u64::from(self.encrypted) << 6
			| u64::from(self.priority & 0x07);
		let ch_id = if self.grp_vch_id != 0 { self.grp_vch_id } else { site.channel_id };
		value = (value << 4) | u64::from(ch_id & 0x0F);
		value = (value << 12) | u64::from(self.grp_vch_no & 0xFFF);
		value = (value << 16) | u64::from(self.dst_id & 0xFFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Group voice channel grant update (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrpVchGrantUpd {
	pub grp_vch_id: u8,
	pub grp_vch_no: u32,
	pub dst_id: u32,
}

impl GrpVchGrantUpd {
	fn decode(value: u64) -> Self {
		Self {
			grp_vch_id: ((value >> 60) & 0x0F) as u8,
			grp_vch_no: ((value >> 48) & 0xFFF) as u32,
			dst_id: ((value >> 32) & 0xFFFF) as u32,
		}
	}

	fn encode(&self, site: &SiteData) -> u64 {
		let ch_id = if self.grp_vch_id != 0 { self.grp_vch_id } else { site.channel_id };
		let mut value = u64::from(ch_id & 0x0F);
		value = (value << 12) | u64::from(self.grp_vch_no & 0xFFF);
		value = (value << 16) | u64::from(self.dst_id & 0xFFFF);
		value << 32
	}
}

/// Unit-to-unit voice channel request (ISP) / grant (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UuVchGrant {
	pub emergency: bool,
	pub encrypted: bool,
	pub priority: u8,
	pub grp_vch_id: u8,
	pub grp_vch_no: u32,
	pub dst_id: u32,
	pub src_id: u32,
}

impl UuVchGrant {
	fn decode(value: u64) -> Self {
		Self {
			emergency: (value >> 56) & 0x80 == 0x80,
			encrypted: (value >> 56) & 0x40 == 0x40,
			priority: ((value >> 56) & 0x07) as u8,
			grp_vch_id: ((value >> 52) & 0x0F) as u8,
			grp_vch_no: ((value >> 40) & 0xFFF) as u32,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self, site: &SiteData) -> u64 {
		let mut value: u64 = u64::from(self.emergency) << 7
			| u64::from(self.encrypted) << 6
			| u64::from(self.priority & 0x07);
		let ch_id = if self.grp_vch_id != 0 { self.grp_vch_id } else { site.channel_id };
		value = (value << 4) | u64::from(ch_id & 0x0F);
		value = (value << 12) | u64::from(self.grp_vch_no & 0xFFF);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Unit-to-unit voice channel grant update (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UuVchGrantUpd {
	pub grp_vch_id: u8,
	pub grp_vch_no: u32,
	pub dst_id: u32,
	pub src_id: u32,
}

impl UuVchGrantUpd {
	fn decode(value: u64) -> Self {
		Self {
			grp_vch_id: ((value >> 60) & 0x0F) as u8,
			grp_vch_no: ((value >> 48) & 0xFFF) as u32,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self, site: &SiteData) -> u64 {
		let ch_id = if self.grp_vch_id != 0 { self.grp_vch_id } else { site.channel_id };
		let mut value = u64::from(ch_id & 0x0F);
		value = (value << 12) | u64::from(self.grp_vch_no & 0xFFF);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Unit-to-unit answer response (IOSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UuAnsRsp {
	pub response: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl UuAnsRsp {
	fn decode(value: u64) -> Self {
		Self {
			response: ((value >> 56) & 0xFF) as u8,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.response);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Acknowledge response (IOSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckRsp {
	pub aiv: bool,
	pub extended_addr: bool,
	pub service: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl AckRsp {
	fn decode(value: u64) -> Self {
		Self {
			aiv: (value >> 56) & 0x80 == 0x80,
			extended_addr: (value >> 56) & 0x40 == 0x40,
			service: ((value >> 56) & 0x3F) as u8,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self, site: &SiteData) -> u64 {
		let mut value = u64::from(self.service & 0x3F)
			| if self.aiv { 0x80 } else { 0x00 }
			| if self.extended_addr { 0x40 } else { 0x00 };
		if self.aiv && self.extended_addr {
			value = (value << 20) | u64::from(site.net_id);
			value = (value << 12) | u64::from(site.sys_id);
		} else {
			value = (value << 32) | u64::from(self.dst_id);
		}
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Queued response (OSP); `response` is the queue reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueRsp {
	pub aiv: bool,
	pub group: bool,
	pub service: u8,
	pub response: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl QueRsp {
	fn decode(value: u64) -> Self {
		Self {
			aiv: (value >> 56) & 0x80 == 0x80,
			group: true,
			service: ((value >> 56) & 0x3F) as u8,
			response: ((value >> 48) & 0xFF) as u8,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.service & 0x3F) | if self.aiv { 0x80 } else { 0x00 };
		value = (value << 8) | u64::from(self.response);
		if self.aiv {
			if self.group {
				// group queue: call options pad then the talkgroup
				value = (value << 8) | 0;
				value = (value << 16) | u64::from(self.dst_id & 0xFFFF);
			} else {
				value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
			}
		} else {
			value <<= 24;
		}
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Deny response (OSP). Same body shape as [`QueRsp`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DenyRsp {
	pub aiv: bool,
	pub group: bool,
	pub service: u8,
	pub response: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl DenyRsp {
	fn decode(value: u64) -> Self {
		let q = QueRsp::decode(value);
		Self {
			aiv: q.aiv,
			group: q.group,
			service: q.service,
			response: q.response,
			dst_id: q.dst_id,
			src_id: q.src_id,
		}
	}

	fn encode(&self) -> u64 {
		QueRsp {
			aiv: self.aiv,
			group: self.group,
			service: self.service,
			response: self.response,
			dst_id: self.dst_id,
			src_id: self.src_id,
		}
		.encode()
	}
}

/// Extended function command/response (IOSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtFnct {
	pub function: u16,
	pub dst_id: u32,
	pub src_id: u32,
}

impl ExtFnct {
	fn decode(value: u64) -> Self {
		Self {
			function: ((value >> 48) & 0xFFFF) as u16,
			// inbound: argument rides ahead of the responding unit
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.function);
		// outbound: argument (the FNE address), then the target unit
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value
	}
}

/// Group affiliation request (ISP) / response (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrpAff {
	pub response: u8,
	pub announce_group: u32,
	pub sys_id: u32,
	pub dst_id: u32,
	pub src_id: u32,
}

impl GrpAff {
	fn decode(value: u64) -> Self {
		Self {
			response: 0,
			announce_group: 0,
			sys_id: ((value >> 40) & 0xFFF) as u32,
			dst_id: ((value >> 24) & 0xFFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		// global affiliation flag leads the response
		let mut value: u64 = 1;
		value = (value << 7) | u64::from(self.response & 0x03);
		value = (value << 16) | u64::from(self.announce_group & 0xFFFF);
		value = (value << 16) | u64::from(self.dst_id & 0xFFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Group affiliation query (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrpAffQ {
	pub dst_id: u32,
	pub src_id: u32,
}

impl GrpAffQ {
	fn encode(&self) -> u64 {
		let mut value = u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value << 16
	}
}

/// Status update (IOSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StsUpdt {
	pub status: u16,
	pub dst_id: u32,
	pub src_id: u32,
}

impl StsUpdt {
	fn decode(value: u64) -> Self {
		Self {
			status: ((value >> 48) & 0xFFFF) as u16,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.status);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Message update (IOSP). Same packing as [`StsUpdt`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgUpdt {
	pub message: u16,
	pub dst_id: u32,
	pub src_id: u32,
}

impl MsgUpdt {
	fn decode(value: u64) -> Self {
		let s = StsUpdt::decode(value);
		Self {
			message: s.status,
			dst_id: s.dst_id,
			src_id: s.src_id,
		}
	}

	fn encode(&self) -> u64 {
		StsUpdt {
			status: self.message,
			dst_id: self.dst_id,
			src_id: self.src_id,
		}
		.encode()
	}
}

/// Call alert (IOSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallAlrt {
	pub dst_id: u32,
	pub src_id: u32,
}

impl CallAlrt {
	fn decode(value: u64) -> Self {
		Self {
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Unit registration request (ISP) / response (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UReg {
	pub response: u8,
	pub net_id: u32,
	pub sys_id: u32,
	pub dst_id: u32,
	pub src_id: u32,
}

impl UReg {
	fn decode(value: u64) -> Self {
		Self {
			response: 0,
			net_id: ((value >> 36) & 0xF_FFFF) as u32,
			sys_id: ((value >> 24) & 0xFFF) as u32,
			dst_id: 0,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self, site: &SiteData) -> u64 {
		let mut value = u64::from(self.response & 0x03);
		value = (value << 12) | u64::from(site.sys_id);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Unit registration command (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct URegCmd {
	pub dst_id: u32,
	pub src_id: u32,
}

impl URegCmd {
	fn encode(&self) -> u64 {
		let mut value = u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Unit de-registration request (ISP) / ack (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UDereg {
	pub src_id: u32,
}

impl UDereg {
	fn decode(value: u64) -> Self {
		Self {
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		// ack addresses everyone
		let mut value = u64::from(super::WUID_FNE);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Location registration request (ISP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocRegReq {
	pub lra: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl LocRegReq {
	fn decode(value: u64) -> Self {
		Self {
			lra: ((value >> 40) & 0xFF) as u8,
			dst_id: ((value >> 24) & 0xFFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}
}

/// Location registration response (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocRegRsp {
	pub response: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl LocRegRsp {
	fn encode(&self, site: &SiteData) -> u64 {
		let mut value = u64::from(self.response & 0x03);
		value = (value << 16) | u64::from(self.dst_id & 0xFFFF);
		value = (value << 8) | u64::from(site.rfss_id);
		value = (value << 8) | u64::from(site.site_id);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Authentication response (ISP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthResp {
	pub standalone: bool,
	pub auth_res: [u8; 4],
	pub src_id: u32,
}

impl AuthResp {
	fn decode(value: u64, tsbk: &[u8; TSBK_LENGTH_BYTES]) -> Self {
		Self {
			standalone: (value >> 56) & 0x01 == 0x01,
			auth_res: [tsbk[1], tsbk[2], tsbk[3], tsbk[4]],
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}
}

/// Authentication demand from a unit (ISP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthSuDmd {
	pub src_id: u32,
}

impl AuthSuDmd {
	fn decode(value: u64) -> Self {
		Self {
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}
}

/// Cancel service request (ISP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanSrvReq {
	pub aiv: bool,
	pub service: u8,
	pub reason: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl CanSrvReq {
	fn decode(value: u64) -> Self {
		Self {
			aiv: (value >> 56) & 0x80 == 0x80,
			service: ((value >> 56) & 0x3F) as u8,
			reason: ((value >> 48) & 0xFF) as u8,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}
}

/// SNDCP data channel request (ISP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SndcpChReq {
	pub data_service_options: u8,
	pub data_access_control: u32,
	pub src_id: u32,
}

impl SndcpChReq {
	fn decode(value: u64) -> Self {
		Self {
			data_service_options: ((value >> 56) & 0xFF) as u8,
			data_access_control: ((value >> 40) & 0xFFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}
}

/// SNDCP data channel record request (ISP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SndcpRecReq {
	pub data_to_send: bool,
	pub data_service_options: u8,
	pub data_access_control: u32,
	pub src_id: u32,
}

impl SndcpRecReq {
	fn decode(value: u64, tsbk: &[u8; TSBK_LENGTH_BYTES]) -> Self {
		Self {
			data_to_send: tsbk[4] & 0x80 == 0x80,
			data_service_options: ((value >> 56) & 0xFF) as u8,
			data_access_control: ((value >> 40) & 0xFFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}
}

/// SNDCP data channel grant (OSP); derives the receive channel number
/// from the identity table frequency plan.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SndcpChGnt {
	pub data_service_options: u8,
	pub grp_vch_id: u8,
	pub data_ch_no: u32,
	pub dst_id: u32,
	pub iden: IdenEntry,
}

impl SndcpChGnt {
	fn encode(&self, site: &SiteData) -> u64 {
		let calc_space = (self.iden.ch_space_khz / 0.125) as u32;
		let tx_frequency = self.iden.base_frequency + (calc_space * 125) * self.data_ch_no;
		let rx_frequency = (tx_frequency as f32 + self.iden.tx_offset_mhz * 1_000_000.0) as u32;
		let root_freq = rx_frequency - self.iden.base_frequency;
		let rx_ch_no = root_freq / (self.iden.ch_space_khz * 1000.0) as u32;

		let ch_id = if self.grp_vch_id != 0 { self.grp_vch_id } else { site.channel_id };
		let mut value = u64::from(self.data_service_options);
		value = (value << 4) | u64::from(ch_id & 0x0F);
		value = (value << 12) | u64::from(self.data_ch_no & 0xFFF);
		value = (value << 4) | u64::from(ch_id & 0x0F);
		value = (value << 12) | u64::from(rx_ch_no & 0xFFF);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value
	}
}

/// Synchronization broadcast (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncBcast {
	pub microslot_count: u16,
}

impl SyncBcast {
	fn encode(&self, site: &SiteData) -> u64 {
		let now = OffsetDateTime::now_utc();

		let lto = (site.lto.unsigned_abs()) & 0x1F;
		let negative_lto = site.lto < 0;
		let valid_lto = lto > 0;

		let mc = 0u64;
		let microslot = if self.microslot_count > 7999 { 0 } else { self.microslot_count };

		// US / MMU flags set, minute-correction straddles the byte edge
		let mut value: u64 = 0x0A | ((mc & 0x03) >> 1);
		value = (value << 8)
			| ((mc & 0x01) << 7)
			| if valid_lto { 0x40 } else { 0x00 }
			| if negative_lto { 0x20 } else { 0x00 }
			| u64::from(lto);
		value = (value << 7) | u64::from((now.year() - 2000) as u8 & 0x7F);
		value = (value << 4) | u64::from(u8::from(now.month()) & 0x0F);
		value = (value << 5) | u64::from(now.day() & 0x1F);
		value = (value << 5) | u64::from(now.hour() & 0x1F);
		value = (value << 6) | u64::from(now.minute() & 0x3F);
		value = (value << 13) | u64::from(microslot & 0x1FFF);
		value
	}
}

/// Time and date announcement (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeDateAnn;

impl TimeDateAnn {
	fn encode(&self, site: &SiteData) -> u64 {
		let now = OffsetDateTime::now_utc();

		let lto = u64::from(site.lto.unsigned_abs()) * 2;
		let valid_lto = lto > 0;

		// VD and VT flags set
		let mut value: u64 = 0xC0 | if valid_lto { 0x20 } else { 0x00 } | ((lto >> 8) & 0x0F);
		value = (value << 8) | (lto & 0xFF);
		value = (value << 4) | u64::from(u8::from(now.month()) & 0x0F);
		value = (value << 5) | u64::from(now.day() & 0x1F);
		value = (value << 13) | u64::from((now.year() - 2000) as u16 & 0x1FFF);
		value <<= 2;
		value = (value << 5) | u64::from(now.hour() & 0x1F);
		value = (value << 6) | u64::from(now.minute() & 0x3F);
		value = (value << 6) | u64::from(now.second() & 0x3F);
		value << 7
	}
}

/// System service broadcast (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SysSrvBcast {
	pub services_available: u32,
	pub services_supported: u32,
}

impl SysSrvBcast {
	fn encode(&self) -> u64 {
		let mut value = u64::from(self.services_available & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.services_supported & 0xFF_FFFF);
		value << 16
	}
}

/// Secondary control channel broadcast (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sccb {
	pub sccb_ch_id1: u16,
	pub sccb_ch_id2: u16,
}

impl Sccb {
	fn encode(&self, site: &SiteData) -> u64 {
		let mut value = u64::from(site.rfss_id);
		value = (value << 8) | u64::from(site.site_id);
		value = (value << 16) | u64::from(self.sccb_ch_id1);
		value = (value << 8)
			| if self.sccb_ch_id1 > 0 {
				u64::from(site.service_class)
			} else {
				u64::from(SVC_CLS_INVALID)
			};
		value = (value << 16) | u64::from(self.sccb_ch_id2);
		value = (value << 8)
			| if self.sccb_ch_id2 > 0 {
				u64::from(site.service_class)
			} else {
				u64::from(SVC_CLS_INVALID)
			};
		value
	}
}

/// RFSS status broadcast (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RfssStsBcast {
	pub roamer_reaccess: bool,
}

impl RfssStsBcast {
	fn encode(&self, site: &SiteData) -> u64 {
		let mut value = u64::from(site.lra);
		value = (value << 4)
			| if self.roamer_reaccess { 0x02 } else { 0x00 }
			| u64::from(site.net_active);
		value = (value << 12) | u64::from(site.sys_id);
		value = (value << 8) | u64::from(site.rfss_id);
		value = (value << 8) | u64::from(site.site_id);
		value = (value << 4) | u64::from(site.channel_id & 0x0F);
		value = (value << 12) | u64::from(site.channel_no & 0xFFF);
		value = (value << 8) | u64::from(site.service_class);
		value
	}
}

/// Network status broadcast (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStsBcast;

impl NetStsBcast {
	fn encode(&self, site: &SiteData) -> u64 {
		let mut value = u64::from(site.lra);
		value = (value << 20) | u64::from(site.net_id);
		value = (value << 12) | u64::from(site.sys_id);
		value = (value << 4) | u64::from(site.channel_id & 0x0F);
		value = (value << 12) | u64::from(site.channel_no & 0xFFF);
		value = (value << 8) | u64::from(site.service_class);
		value
	}
}

/// Adjacent site status broadcast (OSP); carries the neighbour's identity
/// rather than ours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjStsBcast {
	pub adj_site_lra: u8,
	pub adj_cfva: u8,
	pub adj_sys_id: u32,
	pub adj_rfss_id: u8,
	pub adj_site_id: u8,
	pub adj_ch_id: u8,
	pub adj_ch_no: u32,
	pub adj_svc_class: u8,
}

impl AdjStsBcast {
	fn decode(value: u64) -> Self {
		Self {
			adj_site_lra: ((value >> 56) & 0xFF) as u8,
			adj_cfva: ((value >> 52) & 0x0F) as u8,
			adj_sys_id: ((value >> 40) & 0xFFF) as u32,
			adj_rfss_id: ((value >> 32) & 0xFF) as u8,
			adj_site_id: ((value >> 24) & 0xFF) as u8,
			adj_ch_id: ((value >> 20) & 0x0F) as u8,
			adj_ch_no: ((value >> 8) & 0xFFF) as u32,
			adj_svc_class: (value & 0xFF) as u8,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.adj_site_lra);
		value = (value << 4) | u64::from(self.adj_cfva & 0x0F);
		value = (value << 12) | u64::from(self.adj_sys_id & 0xFFF);
		value = (value << 8) | u64::from(self.adj_rfss_id);
		value = (value << 8) | u64::from(self.adj_site_id);
		value = (value << 4) | u64::from(self.adj_ch_id & 0x0F);
		value = (value << 12) | u64::from(self.adj_ch_no & 0xFFF);
		value = (value << 8) | u64::from(self.adj_svc_class);
		value
	}
}

/// Channel identifier update (OSP).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IdenUp {
	pub iden: IdenEntry,
}

impl IdenUp {
	/// Returns `None` when the identity entry cannot express a legal
	/// broadcast; the caller skips the TSBK.
	fn encode(&self) -> Option<u64> {
		if !self.iden.is_valid() {
			error!(
				"P25, invalid values for OSP_IDEN_UP, baseFrequency = {}Hz",
				self.iden.base_frequency
			);
			return None;
		}
		if self.iden.base_frequency < 762_000_000 {
			error!(
				"P25, invalid values for OSP_IDEN_UP, baseFrequency = {}Hz",
				self.iden.base_frequency
			);
			return None;
		}

		let calc_space = (self.iden.ch_space_khz / 0.125) as u64;
		let mut tx_offset = ((self.iden.tx_offset_mhz.abs() * 1_000_000.0) / 250_000.0) as u64;
		if self.iden.tx_offset_mhz > 0.0 {
			tx_offset |= 0x2000;
		}
		let base_freq = u64::from(self.iden.base_frequency / 5);
		let ch_bw = ((self.iden.ch_bandwidth_khz * 1000.0) / 125.0) as u64;

		let mut value = u64::from(self.iden.channel_id & 0x0F);
		value = (value << 9) | (ch_bw & 0x1FF);
		value = (value << 9) | (tx_offset & 0x3FFF);
		value = (value << 10) | (calc_space & 0x3FF);
		value = (value << 32) | base_freq;
		Some(value)
	}
}

/// Motorola control-channel broadcast system identifier (OSP, MFID 0x90).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotCcBsi;

impl MotCcBsi {
	fn encode(&self, site: &SiteData) -> u64 {
		let mut value = u64::from(site.callsign[0].wrapping_sub(43) & 0x3F);
		for ch in &site.callsign[1..] {
			value = (value << 6) | u64::from(ch.wrapping_sub(43) & 0x3F);
		}
		value = (value << 4) | u64::from(site.channel_id & 0x0F);
		value = (value << 12) | u64::from(site.channel_no & 0xFFF);
		value
	}
}

/// Motorola patch group add/delete (OSP, MFID 0x90).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotGrgManage {
	pub supergroup: u32,
	pub group1: u32,
	pub group2: u32,
	pub group3: u32,
}

impl MotGrgManage {
	fn encode(&self) -> Option<u64> {
		if self.supergroup == 0 || self.group1 == 0 {
			error!(
				"P25, invalid values for OSP_MOT_GRG, supergroup = ${:02X}, group1 = ${:02X}",
				self.supergroup, self.group1
			);
			return None;
		}

		let mut value = u64::from(self.supergroup & 0xFFFF);
		value = (value << 16) | u64::from(self.group1 & 0xFFFF);
		let g2 = if self.group2 != 0 { self.group2 } else { self.group1 };
		value = (value << 16) | u64::from(g2 & 0xFFFF);
		let g3 = if self.group3 != 0 { self.group3 } else { self.group1 };
		value = (value << 16) | u64::from(g3 & 0xFFFF);
		Some(value)
	}
}

/// Motorola patch supergroup voice channel update (OSP, MFID 0x90).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotGrgVchUpd {
	pub group1: u32,
	pub group2: u32,
}

impl MotGrgVchUpd {
	fn encode(&self, site: &SiteData) -> u64 {
		let mut value = u64::from(site.channel_id & 0x0F);
		value = (value << 12) | u64::from(site.channel_no & 0xFFF);
		value = (value << 16) | u64::from(self.group1 & 0xFFFF);
		value = (value << 4) | u64::from(site.channel_id & 0x0F);
		value = (value << 12) | u64::from(site.channel_no & 0xFFF);
		value = (value << 16) | u64::from(self.group2 & 0xFFFF);
		value
	}
}

/// Pre-built 12-byte payload pushed through the FEC stack untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsbkRaw {
	pub lco: u8,
	pub mfid: u8,
	pub last_block: bool,
	pub tsbk: [u8; TSBK_LENGTH_BYTES],
}

impl TsbkRaw {
	/// Captures a pre-built payload, lifting the opcode fields out of it.
	pub fn from_payload(tsbk: [u8; TSBK_LENGTH_BYTES]) -> Self {
		Self {
			lco: tsbk[0] & 0x3F,
			mfid: tsbk[1],
			last_block: tsbk[0] & 0x80 == 0x80,
			tsbk,
		}
	}
}

/// One decoded or to-be-encoded trunking signalling block.
#[derive(Debug, Clone, PartialEq)]
pub enum Tsbk {
	GrpVchGrant(GrpVchGrant),
	GrpVchGrantUpd(GrpVchGrantUpd),
	UuVchGrant(UuVchGrant),
	UuVchGrantUpd(UuVchGrantUpd),
	UuAnsRsp(UuAnsRsp),
	AckRsp(AckRsp),
	QueRsp(QueRsp),
	DenyRsp(DenyRsp),
	ExtFnct(ExtFnct),
	GrpAff(GrpAff),
	GrpAffQ(GrpAffQ),
	StsUpdt(StsUpdt),
	MsgUpdt(MsgUpdt),
	CallAlrt(CallAlrt),
	UReg(UReg),
	URegCmd(URegCmd),
	UDereg(UDereg),
	LocRegReq(LocRegReq),
	LocRegRsp(LocRegRsp),
	AuthResp(AuthResp),
	AuthSuDmd(AuthSuDmd),
	CanSrvReq(CanSrvReq),
	SndcpChReq(SndcpChReq),
	SndcpRecReq(SndcpRecReq),
	SndcpChGnt(SndcpChGnt),
	SyncBcast(SyncBcast),
	TimeDateAnn(TimeDateAnn),
	SysSrvBcast(SysSrvBcast),
	Sccb(Sccb),
	RfssStsBcast(RfssStsBcast),
	NetStsBcast(NetStsBcast),
	AdjStsBcast(AdjStsBcast),
	IdenUp(IdenUp),
	MotCcBsi(MotCcBsi),
	MotGrgAdd(MotGrgManage),
	MotGrgDel(MotGrgManage),
	MotGrgVchUpd(MotGrgVchUpd),
	MotPshCch,
	Raw(TsbkRaw),
}

impl Tsbk {
	/// Decodes an inbound TSBK; `raw_tsbk` skips the trellis layer for
	/// network-sourced payloads.
	pub fn decode(data: &[u8], raw_tsbk: bool) -> Result<Self, DecodeError> {
		let tsbk = base_decode(data, raw_tsbk)?;
		let lco = tsbk[0] & 0x3F;
		let mfid = tsbk[1];
		let value = to_value(&tsbk);

		if mfid == MFID_MOT {
			// Motorola blocks are carried through raw
			return Ok(Self::Raw(TsbkRaw::from_payload(tsbk)));
		}

		use opcode::*;
		let variant = match lco {
			IOSP_GRP_VCH => Self::GrpVchGrant(GrpVchGrant::decode(value)),
			OSP_GRP_VCH_GRANT_UPD => Self::GrpVchGrantUpd(GrpVchGrantUpd::decode(value)),
			IOSP_UU_VCH => Self::UuVchGrant(UuVchGrant::decode(value)),
			OSP_UU_VCH_GRANT_UPD => Self::UuVchGrantUpd(UuVchGrantUpd::decode(value)),
			IOSP_UU_ANS => Self::UuAnsRsp(UuAnsRsp::decode(value)),
			IOSP_ACK_RSP => Self::AckRsp(AckRsp::decode(value)),
			OSP_QUE_RSP => Self::QueRsp(QueRsp::decode(value)),
			OSP_DENY_RSP => Self::DenyRsp(DenyRsp::decode(value)),
			IOSP_EXT_FNCT => Self::ExtFnct(ExtFnct::decode(value)),
			IOSP_GRP_AFF => Self::GrpAff(GrpAff::decode(value)),
			IOSP_STS_UPDT => Self::StsUpdt(StsUpdt::decode(value)),
			IOSP_MSG_UPDT => Self::MsgUpdt(MsgUpdt::decode(value)),
			IOSP_CALL_ALRT => Self::CallAlrt(CallAlrt::decode(value)),
			IOSP_U_REG => Self::UReg(UReg::decode(value)),
			ISP_LOC_REG_REQ => Self::LocRegReq(LocRegReq::decode(value)),
			IOSP_U_DEREG => Self::UDereg(UDereg::decode(value)),
			ISP_AUTH_RESP => Self::AuthResp(AuthResp::decode(value, &tsbk)),
			ISP_AUTH_SU_DMD => Self::AuthSuDmd(AuthSuDmd::decode(value)),
			ISP_CAN_SRV_REQ => Self::CanSrvReq(CanSrvReq::decode(value)),
			ISP_SNDCP_CH_REQ => Self::SndcpChReq(SndcpChReq::decode(value)),
			ISP_SNDCP_REC_REQ => Self::SndcpRecReq(SndcpRecReq::decode(value, &tsbk)),
			OSP_ADJ_STS_BCAST => Self::AdjStsBcast(AdjStsBcast::decode(value)),
			_ => {
				debug!("P25, unhandled TSBK, lco = ${lco:02X}, mfId = ${mfid:02X}");
				return Err(DecodeError::Format);
			}
		};
		Ok(variant)
	}

	/// Encodes the outbound form onto the air (or raw, for the network).
	///
	/// Returns false when the variant cannot legally be built (bad
	/// identity table values, missing patch groups).
	pub fn encode(&self, site: &SiteData, data: &mut [u8], raw_tsbk: bool, no_trellis: bool) -> bool {
		use opcode::*;

		if let Self::Raw(raw) = self {
			let mut tsbk = raw.tsbk;
			tsbk[0] = (raw.lco & 0x3F) | if raw.last_block { 0x80 } else { 0x00 };
			tsbk[1] = raw.mfid;
			base_encode(data, &mut tsbk, raw_tsbk, no_trellis);
			return true;
		}

		let (lco, mfid, value) = match self {
			Self::GrpVchGrant(v) => (IOSP_GRP_VCH, MFID_STANDARD, v.encode(site)),
			Self::GrpVchGrantUpd(v) => (OSP_GRP_VCH_GRANT_UPD, MFID_STANDARD, v.encode(site)),
			Self::UuVchGrant(v) => (IOSP_UU_VCH, MFID_STANDARD, v.encode(site)),
			Self::UuVchGrantUpd(v) => (OSP_UU_VCH_GRANT_UPD, MFID_STANDARD, v.encode(site)),
			Self::UuAnsRsp(v) => (IOSP_UU_ANS, MFID_STANDARD, v.encode()),
			Self::AckRsp(v) => (IOSP_ACK_RSP, MFID_STANDARD, v.encode(site)),
			Self::QueRsp(v) => {
				if v.response == 0 {
					error!("P25, invalid values for OSP_QUE_RSP, reason = {}", v.response);
					return false;
				}
				(OSP_QUE_RSP, MFID_STANDARD, v.encode())
			}
			Self::DenyRsp(v) => (OSP_DENY_RSP, MFID_STANDARD, v.encode()),
			Self::ExtFnct(v) => (IOSP_EXT_FNCT, MFID_STANDARD, v.encode()),
			Self::GrpAff(v) => (IOSP_GRP_AFF, MFID_STANDARD, v.encode()),
			Self::GrpAffQ(v) => (OSP_GRP_AFF_Q, MFID_STANDARD, v.encode()),
			Self::StsUpdt(v) => (IOSP_STS_UPDT, MFID_STANDARD, v.encode()),
			Self::MsgUpdt(v) => (IOSP_MSG_UPDT, MFID_STANDARD, v.encode()),
			Self::CallAlrt(v) => (IOSP_CALL_ALRT, MFID_STANDARD, v.encode()),
			Self::UReg(v) => (IOSP_U_REG, MFID_STANDARD, v.encode(site)),
			Self::URegCmd(v) => (OSP_U_REG_CMD, MFID_STANDARD, v.encode()),
			Self::UDereg(v) => (IOSP_U_DEREG, MFID_STANDARD, v.encode()),
			Self::LocRegRsp(v) => (OSP_LOC_REG_RSP, MFID_STANDARD, v.encode(site)),
			Self::SndcpChGnt(v) => (OSP_SNDCP_CH_GNT, MFID_STANDARD, v.encode(site)),
			Self::SyncBcast(v) => (OSP_SYNC_BCAST, MFID_STANDARD, v.encode(site)),
			Self::TimeDateAnn(v) => (OSP_TIME_DATE_ANN, MFID_STANDARD, v.encode(site)),
			Self::SysSrvBcast(v) => (OSP_SYS_SRV_BCAST, MFID_STANDARD, v.encode()),
			Self::Sccb(v) => (OSP_SCCB, MFID_STANDARD, v.encode(site)),
			Self::RfssStsBcast(v) => (OSP_RFSS_STS_BCAST, MFID_STANDARD, v.encode(site)),
			Self::NetStsBcast(v) => (OSP_NET_STS_BCAST, MFID_STANDARD, v.encode(site)),
			Self::AdjStsBcast(v) => (OSP_ADJ_STS_BCAST, MFID_STANDARD, v.encode()),
			Self::IdenUp(v) => match v.encode() {
				Some(value) => (OSP_IDEN_UP, MFID_STANDARD, value),
				None => return false,
			},
			Self::MotCcBsi(v) => (OSP_MOT_CC_BSI, MFID_MOT, v.encode(site)),
			Self::MotGrgAdd(v) => match v.encode() {
				Some(value) => (OSP_MOT_GRG_ADD, MFID_MOT, value),
				None => return false,
			},
			Self::MotGrgDel(v) => match v.encode() {
				Some(value) => (OSP_MOT_GRG_DEL, MFID_MOT, value),
				None => return false,
			},
			Self::MotGrgVchUpd(v) => (OSP_MOT_GRG_VCH_UPD, MFID_MOT, v.encode(site)),
			Self::MotPshCch => (OSP_MOT_PSH_CCH, MFID_MOT, 0),
			// decode-only variants have no outbound form
			Self::LocRegReq(_)
			| Self::AuthResp(_)
			| Self::AuthSuDmd(_)
			| Self::CanSrvReq(_)
			| Self::SndcpChReq(_)
			| Self::SndcpRecReq(_) => return false,
			Self::Raw(_) => unreachable!(),
		};

		let mut tsbk = from_value(value, lco, mfid, true);
		base_encode(data, &mut tsbk, raw_tsbk, no_trellis);
		true
	}

	/// Display name, matching the log vocabulary of the control machine.
	pub fn name(&self) -> &'static str {
		match self {
			Self::GrpVchGrant(_) => "IOSP_GRP_VCH (Group Voice Channel Grant)",
			Self::GrpVchGrantUpd(_) => "OSP_GRP_VCH_GRANT_UPD (Group Voice Channel Grant Update)",
			Self::UuVchGrant(_) => "IOSP_UU_VCH (Unit-to-Unit Voice Channel Grant)",
			Self::UuVchGrantUpd(_) => "OSP_UU_VCH_GRANT_UPD (Unit-to-Unit Voice Channel Grant Update)",
			Self::UuAnsRsp(_) => "IOSP_UU_ANS (Unit-to-Unit Answer Response)",
			Self::AckRsp(_) => "IOSP_ACK_RSP (Acknowledge Response)",
			Self::QueRsp(_) => "OSP_QUE_RSP (Queued Response)",
			Self::DenyRsp(_) => "OSP_DENY_RSP (Deny Response)",
			Self::ExtFnct(_) => "IOSP_EXT_FNCT (Extended Function)",
			Self::GrpAff(_) => "IOSP_GRP_AFF (Group Affiliation)",
			Self::GrpAffQ(_) => "OSP_GRP_AFF_Q (Group Affiliation Query)",
			Self::StsUpdt(_) => "IOSP_STS_UPDT (Status Update)",
			Self::MsgUpdt(_) => "IOSP_MSG_UPDT (Message Update)",
			Self::CallAlrt(_) => "IOSP_CALL_ALRT (Call Alert)",
			Self::UReg(_) => "IOSP_U_REG (Unit Registration)",
			Self::URegCmd(_) => "OSP_U_REG_CMD (Unit Registration Command)",
			Self::UDereg(_) => "IOSP_U_DEREG (Unit Deregistration)",
			Self::LocRegReq(_) => "ISP_LOC_REG_REQ (Location Registration Request)",
			Self::LocRegRsp(_) => "OSP_LOC_REG_RSP (Location Registration Response)",
			Self::AuthResp(_) => "ISP_AUTH_RESP (Authentication Response)",
			Self::AuthSuDmd(_) => "ISP_AUTH_SU_DMD (Authentication Demand)",
			Self::CanSrvReq(_) => "ISP_CAN_SRV_REQ (Cancel Service Request)",
			Self::SndcpChReq(_) => "ISP_SNDCP_CH_REQ (SNDCP Data Channel Request)",
			Self::SndcpRecReq(_) => "ISP_SNDCP_REC_REQ (SNDCP Reconnect Request)",
			Self::SndcpChGnt(_) => "OSP_SNDCP_CH_GNT (SNDCP Data Channel Grant)",
			Self::SyncBcast(_) => "OSP_SYNC_BCAST (Synchronization Broadcast)",
			Self::TimeDateAnn(_) => "OSP_TIME_DATE_ANN (Time and Date Announcement)",
			Self::SysSrvBcast(_) => "OSP_SYS_SRV_BCAST (System Service Broadcast)",
			Self::Sccb(_) => "OSP_SCCB (Secondary Control Channel Broadcast)",
			Self::RfssStsBcast(_) => "OSP_RFSS_STS_BCAST (RFSS Status Broadcast)",
			Self::NetStsBcast(_) => "OSP_NET_STS_BCAST (Network Status Broadcast)",
			Self::AdjStsBcast(_) => "OSP_ADJ_STS_BCAST (Adjacent Site Status Broadcast)",
			Self::IdenUp(_) => "OSP_IDEN_UP (Channel Identifier Update)",
			Self::MotCcBsi(_) => "OSP_MOT_CC_BSI (Motorola Control Channel BSI)",
			Self::MotGrgAdd(_) => "OSP_MOT_GRG_ADD (Motorola Patch Group Add)",
			Self::MotGrgDel(_) => "OSP_MOT_GRG_DEL (Motorola Patch Group Delete)",
			Self::MotGrgVchUpd(_) => "OSP_MOT_GRG_VCH_UPD (Motorola Patch Group Channel Update)",
			Self::MotPshCch => "OSP_MOT_PSH_CCH (Motorola Planned Control Channel Shutdown)",
			Self::Raw(_) => "TSBK_RAW (Raw Trunking Block)",
		}
	}

	/// `(src_id, dst_id)` where the variant carries them.
	pub fn ids(&self) -> (u32, u32) {
		match self {
			Self::GrpVchGrant(v) => (v.src_id, v.dst_id),
			Self::UuVchGrant(v) => (v.src_id, v.dst_id),
			Self::UuVchGrantUpd(v) => (v.src_id, v.dst_id),
			Self::UuAnsRsp(v) => (v.src_id, v.dst_id),
			Self::AckRsp(v) => (v.src_id, v.dst_id),
			Self::QueRsp(v) => (v.src_id, v.dst_id),
			Self::DenyRsp(v) => (v.src_id, v.dst_id),
			Self::ExtFnct(v) => (v.src_id, v.dst_id),
			Self::GrpAff(v) => (v.src_id, v.dst_id),
			Self::GrpAffQ(v) => (v.src_id, v.dst_id),
			Self::StsUpdt(v) => (v.src_id, v.dst_id),
			Self::MsgUpdt(v) => (v.src_id, v.dst_id),
			Self::CallAlrt(v) => (v.src_id, v.dst_id),
			Self::UReg(v) => (v.src_id, v.dst_id),
			Self::URegCmd(v) => (v.src_id, v.dst_id),
			Self::UDereg(v) => (v.src_id, 0),
			Self::LocRegReq(v) => (v.src_id, v.dst_id),
			Self::LocRegRsp(v) => (v.src_id, v.dst_id),
			Self::AuthResp(v) => (v.src_id, 0),
			Self::AuthSuDmd(v) => (v.src_id, 0),
			Self::CanSrvReq(v) => (v.src_id, v.dst_id),
			Self::SndcpChReq(v) => (v.src_id, 0),
			Self::SndcpRecReq(v) => (v.src_id, 0),
			Self::SndcpChGnt(v) => (0, v.dst_id),
			Self::GrpVchGrantUpd(v) => (0, v.dst_id),
			_ => (0, 0),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn site() -> SiteData {
		let mut site = SiteData::new(0xBB800, 0x293, 1, 1, 1, 1);
		site.set_callsign("KA1BTK");
		site
	}

	#[test]
	fn grp_vch_grant_scenario() {
		// granting dst 50 to src 1001 on channel 1/7, priority 4
		let grant = GrpVchGrant {
			emergency: false,
			encrypted: false,
			priority: 4,
			grp_vch_id: 1,
			grp_vch_no: 7,
			dst_id: 50,
			src_id: 1001,
		};

		let value = grant.encode(&site());
		assert_eq!((value >> 56) & 0xFF, 0x04); // service options
		assert_eq!((value >> 52) & 0x0F, 1); // channel id
		assert_eq!((value >> 40) & 0xFFF, 7); // channel number
		assert_eq!((value >> 24) & 0xFFFF, 50);
		assert_eq!(value & 0xFF_FFFF, 1001);
	}

	#[test]
	fn tsbk_round_trip_through_trellis() {
		let tsbk = Tsbk::GrpVchGrantUpd(GrpVchGrantUpd {
			grp_vch_id: 1,
			grp_vch_no: 7,
			dst_id: 50,
		});

		let mut data = [0u8; 25];
		assert!(tsbk.encode(&site(), &mut data, false, false));

		let decoded = Tsbk::decode(&data, false).unwrap();
		match decoded {
			Tsbk::GrpVchGrantUpd(upd) => {
				assert_eq!(upd.grp_vch_id, 1);
				assert_eq!(upd.grp_vch_no, 7);
				assert_eq!(upd.dst_id, 50);
			}
			other => panic!("wrong variant: {}", other.name()),
		}
	}

	#[test]
	fn raw_round_trip_without_trellis() {
		let tsbk = Tsbk::AdjStsBcast(AdjStsBcast {
			adj_site_lra: 3,
			adj_cfva: 0x0C,
			adj_sys_id: 0x2F5,
			adj_rfss_id: 2,
			adj_site_id: 9,
			adj_ch_id: 1,
			adj_ch_no: 0x30A,
			adj_svc_class: 0x10,
		});

		let mut data = [0u8; TSBK_LENGTH_BYTES];
		assert!(tsbk.encode(&site(), &mut data, true, false));

		let decoded = Tsbk::decode(&data, true).unwrap();
		assert_eq!(decoded, tsbk);
	}

	#[test]
	fn crc_rejection() {
		let tsbk = Tsbk::CallAlrt(CallAlrt {
			dst_id: 2002,
			src_id: 1001,
		});
		let mut data = [0u8; TSBK_LENGTH_BYTES];
		assert!(tsbk.encode(&site(), &mut data, true, false));

		data[5] ^= 0x01;
		assert_eq!(Tsbk::decode(&data, true), Err(DecodeError::Crc));
	}

	#[test]
	fn ureg_response_layout() {
		let rsp = UReg {
			response: super::super::RSP_ACCEPT,
			net_id: 0,
			sys_id: 0,
			dst_id: 1001,
			src_id: 1001,
		};
		let value = rsp.encode(&site());
		assert_eq!((value >> 48) & 0xFFF, 0x293); // system id
		assert_eq!(value & 0xFF_FFFF, 1001);
	}

	#[test]
	fn que_rsp_requires_reason() {
		let tsbk = Tsbk::QueRsp(QueRsp::default());
		let mut data = [0u8; TSBK_LENGTH_BYTES];
		assert!(!tsbk.encode(&site(), &mut data, true, false));
	}

	#[test]
	fn iden_up_rejects_low_band_plans() {
		let tsbk = Tsbk::IdenUp(IdenUp {
			iden: IdenEntry {
				channel_id: 1,
				base_frequency: 450_000_000,
				tx_offset_mhz: 5.0,
				ch_bandwidth_khz: 12.5,
				ch_space_khz: 12.5,
			},
		});
		let mut data = [0u8; TSBK_LENGTH_BYTES];
		assert!(!tsbk.encode(&site(), &mut data, true, false));
	}

	#[test]
	fn decode_only_variants_refuse_encode() {
		let tsbk = Tsbk::LocRegReq(LocRegReq::default());
		let mut data = [0u8; TSBK_LENGTH_BYTES];
		assert!(!tsbk.encode(&site(), &mut data, true, false));
	}
}
