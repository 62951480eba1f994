//! Control signalling block (CSBK) codec.
//!
//! A CSBK is 12 bytes: opcode + feature ID, a packed 64-bit value and a
//! CCITT CRC masked with 0xA5A5, all under BPTC(196,96) on air.

use super::{CSBK_LENGTH_BYTES, DataType, FID_DMRA, FID_ETSI, FRAME_LENGTH_BYTES};
use super::slot_type::SlotType;
use crate::bits::{get_u64, set_u64};
use crate::edac::{bptc, crc};
use crate::errors::DecodeError;
use crate::sync::add_dmr_data_sync;

/// CSBK opcode points.
pub mod csbko {
	pub const UU_V_REQ: u8 = 0x04;
	pub const UU_ANS_RSP: u8 = 0x05;
	pub const RAND: u8 = 0x1F;
	pub const ACK_RSP: u8 = 0x20;
	pub const EXT_FNCT: u8 = 0x24;
	pub const NACK_RSP: u8 = 0x26;
	pub const BROADCAST: u8 = 0x28;
	pub const P_CLEAR: u8 = 0x2E;
	pub const PV_GRANT: u8 = 0x30;
	pub const TV_GRANT: u8 = 0x31;
	pub const BTV_GRANT: u8 = 0x32;
	pub const BSDWNACT: u8 = 0x38;
	pub const PRECCSBK: u8 = 0x3D;
}

/// Tier III service kinds carried by C_RAND.
pub mod service_kind {
	pub const IND_VOICE: u8 = 0x00;
	pub const GRP_VOICE: u8 = 0x01;
	pub const IND_DATA: u8 = 0x02;
	pub const GRP_DATA: u8 = 0x03;
	pub const REG_SVC: u8 = 0x0B;
}

/// The CRC mask distinguishing CSBKs from data headers.
const CSBK_CRC_MASK: [u8; 2] = [0xA5, 0xA5];

fn base_decode(frame: &[u8]) -> Result<[u8; CSBK_LENGTH_BYTES], DecodeError> {
	let mut csbk = [0u8; CSBK_LENGTH_BYTES];
	bptc::decode(frame, &mut csbk)?;

	csbk[10] ^= CSBK_CRC_MASK[0];
	csbk[11] ^= CSBK_CRC_MASK[1];
	let ok = crc::check_ccitt162(&csbk, CSBK_LENGTH_BYTES);
	csbk[10] ^= CSBK_CRC_MASK[0];
	csbk[11] ^= CSBK_CRC_MASK[1];

	if !ok {
		return Err(DecodeError::Crc);
	}
	Ok(csbk)
}

fn base_encode(frame: &mut [u8], csbk: &mut [u8; CSBK_LENGTH_BYTES]) {
	crc::add_ccitt162(csbk, CSBK_LENGTH_BYTES);
	csbk[10] ^= CSBK_CRC_MASK[0];
	csbk[11] ^= CSBK_CRC_MASK[1];
	bptc::encode(csbk, frame);
}

fn to_value(csbk: &[u8; CSBK_LENGTH_BYTES]) -> u64 {
	get_u64(csbk, 2)
}

fn from_value(value: u64, csbko: u8, fid: u8, last_block: bool) -> [u8; CSBK_LENGTH_BYTES] {
	let mut csbk = [0u8; CSBK_LENGTH_BYTES];
	csbk[0] = (csbko & 0x3F) | if last_block { 0x80 } else { 0x00 };
	csbk[1] = fid;
	set_u64(value, &mut csbk, 2);
	csbk
}

/// Extended function command/response (FID DMRA).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtFnct {
	pub data_content: bool,
	pub group: bool,
	pub function: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl ExtFnct {
	fn decode(value: u64) -> Self {
		Self {
			data_content: (value >> 56) & 0x80 == 0x80,
			group: (value >> 56) & 0x40 == 0x40,
			function: ((value >> 48) & 0xFF) as u8,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value: u64 = u64::from(self.data_content) << 7 | u64::from(self.group) << 6;
		value = (value << 8) | u64::from(self.function);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value
	}
}

/// Talkgroup/broadcast/private voice grant. `broadcast` selects BTV_GRANT,
/// `group` false selects PV_GRANT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceGrant {
	pub group: bool,
	pub broadcast: bool,
	pub logical_ch: u32,
	pub slot: u8,
	pub late_entry: bool,
	pub emergency: bool,
	pub site_offset_timing: bool,
	pub dst_id: u32,
	pub src_id: u32,
}

impl VoiceGrant {
	fn decode(value: u64, csbko: u8) -> Self {
		Self {
			group: csbko != csbko::PV_GRANT,
			broadcast: csbko == csbko::BTV_GRANT,
			logical_ch: ((value >> 52) & 0xFFF) as u32,
			slot: if (value >> 51) & 0x01 == 0x01 { 2 } else { 1 },
			late_entry: (value >> 50) & 0x01 == 0x01,
			emergency: (value >> 49) & 0x01 == 0x01,
			site_offset_timing: (value >> 48) & 0x01 == 0x01,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.logical_ch & 0xFFF);
		value = (value << 1) | u64::from(self.slot == 2);
		value = (value << 1) | u64::from(self.late_entry);
		value = (value << 1) | u64::from(self.emergency);
		value = (value << 1) | u64::from(self.site_offset_timing);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}

	fn csbko(&self) -> u8 {
		if !self.group {
			csbko::PV_GRANT
		} else if self.broadcast {
			csbko::BTV_GRANT
		} else {
			csbko::TV_GRANT
		}
	}
}

/// Payload channel clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PClear {
	pub logical_ch: u32,
	pub group: bool,
	pub dst_id: u32,
	pub src_id: u32,
}

impl PClear {
	fn decode(value: u64) -> Self {
		Self {
			logical_ch: ((value >> 52) & 0xFFF) as u32,
			group: (value >> 48) & 0x01 == 0x01,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.logical_ch & 0xFFF);
		value <<= 3; // reserved
		value = (value << 1) | u64::from(self.group);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Unit-to-unit voice request / answer response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UuVoice {
	pub response: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl UuVoice {
	fn decode(value: u64) -> Self {
		Self {
			response: ((value >> 48) & 0xFF) as u8,
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

/// Tier III acknowledge/negative-acknowledge response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckRsp {
	pub service_kind: u8,
	pub reason: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl AckRsp {
	fn decode(value: u64) -> Self {
		Self {
			service_kind: ((value >> 56) & 0x0F) as u8,
			reason: ((value >> 48) & 0xFF) as u8,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.service_kind & 0x0F);
		value = (value << 8) | u64::from(self.reason);
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Tier III random access service request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rand {
	pub service_kind: u8,
	pub service_options: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl Rand {
	fn decode(value: u64) -> Self {
		Self {
			service_kind: ((value >> 60) & 0x0F) as u8,
			service_options: ((value >> 52) & 0xFF) as u8,
			dst_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}

	fn encode(&self) -> u64 {
		let mut value = u64::from(self.service_kind & 0x0F);
		value = (value << 8) | u64::from(self.service_options);
		value <<= 4; // reserved
		value = (value << 24) | u64::from(self.dst_id & 0xFF_FFFF);
		value = (value << 24) | u64::from(self.src_id & 0xFF_FFFF);
		value
	}
}

/// Base station downlink activation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bsdwnact {
	pub bs_id: u32,
	pub src_id: u32,
}

impl Bsdwnact {
	fn decode(value: u64) -> Self {
		Self {
			bs_id: ((value >> 24) & 0xFF_FFFF) as u32,
			src_id: (value & 0xFF_FFFF) as u32,
		}
	}
}

/// Tier III announcement broadcast; the announcement body is carried
/// opaquely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Broadcast {
	pub ann_type: u8,
	pub body: u64,
}

impl Broadcast {
	fn decode(value: u64) -> Self {
		Self {
			ann_type: ((value >> 59) & 0x1F) as u8,
			body: value & 0x07FF_FFFF_FFFF_FFFF,
		}
	}

	fn encode(&self) -> u64 {
		(u64::from(self.ann_type & 0x1F) << 59) | (self.body & 0x07FF_FFFF_FFFF_FFFF)
	}
}

/// Pre-built payload pushed through the FEC stack untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsbkRaw {
	pub csbko: u8,
	pub fid: u8,
	pub last_block: bool,
	pub csbk: [u8; CSBK_LENGTH_BYTES],
}

impl CsbkRaw {
	pub fn from_payload(csbk: [u8; CSBK_LENGTH_BYTES]) -> Self {
		Self {
			csbko: csbk[0] & 0x3F,
			fid: csbk[1],
			last_block: csbk[0] & 0x80 == 0x80,
			csbk,
		}
	}
}

/// One decoded or to-be-encoded control signalling block.
#[derive(Debug, Clone, PartialEq)]
pub enum Csbk {
	ExtFnct(ExtFnct),
	VoiceGrant(VoiceGrant),
	PClear(PClear),
	UuVReq(UuVoice),
	UuAnsRsp(UuVoice),
	AckRsp(AckRsp),
	NackRsp(AckRsp),
	Rand(Rand),
	Bsdwnact(Bsdwnact),
	Broadcast(Broadcast),
	Raw(CsbkRaw),
}

impl Csbk {
	/// Decodes a CSBK out of a 33-byte burst.
	pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
		if frame.len() < FRAME_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}
		let csbk = base_decode(frame)?;
		Self::from_payload_bytes(csbk)
	}

	/// Decodes from a raw 12-byte payload (network path).
	pub fn decode_raw(payload: &[u8]) -> Result<Self, DecodeError> {
		if payload.len() < CSBK_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}
		let mut csbk = [0u8; CSBK_LENGTH_BYTES];
		csbk.copy_from_slice(&payload[..CSBK_LENGTH_BYTES]);

		csbk[10] ^= CSBK_CRC_MASK[0];
		csbk[11] ^= CSBK_CRC_MASK[1];
		let ok = crc::check_ccitt162(&csbk, CSBK_LENGTH_BYTES);
		csbk[10] ^= CSBK_CRC_MASK[0];
		csbk[11] ^= CSBK_CRC_MASK[1];
		if !ok {
			return Err(DecodeError::Crc);
		}

		Self::from_payload_bytes(csbk)
	}

	fn from_payload_bytes(csbk: [u8; CSBK_LENGTH_BYTES]) -> Result<Self, DecodeError> {
		let csbko = csbk[0] & 0x3F;
		let fid = csbk[1];
		let value = to_value(&csbk);

		let variant = match (csbko, fid) {
			(csbko::EXT_FNCT, FID_DMRA) => Self::ExtFnct(ExtFnct::decode(value)),
			(csbko::TV_GRANT | csbko::BTV_GRANT | csbko::PV_GRANT, _) => {
				Self::VoiceGrant(VoiceGrant::decode(value, csbko))
			}
			(csbko::P_CLEAR, _) => Self::PClear(PClear::decode(value)),
			(csbko::UU_V_REQ, _) => Self::UuVReq(UuVoice::decode(value)),
			(csbko::UU_ANS_RSP, _) => Self::UuAnsRsp(UuVoice::decode(value)),
			(csbko::ACK_RSP, _) => Self::AckRsp(AckRsp::decode(value)),
			(csbko::NACK_RSP, _) => Self::NackRsp(AckRsp::decode(value)),
			(csbko::RAND, _) => Self::Rand(Rand::decode(value)),
			(csbko::BSDWNACT, _) => Self::Bsdwnact(Bsdwnact::decode(value)),
			(csbko::BROADCAST, _) => Self::Broadcast(Broadcast::decode(value)),
			_ => Self::Raw(CsbkRaw::from_payload(csbk)),
		};
		Ok(variant)
	}

	/// Encodes into a 33-byte burst (BPTC, slot type, data sync).
	pub fn encode(&self, color_code: u8, frame: &mut [u8], duplex: bool) {
		let mut csbk = self.to_payload();
		base_encode(frame, &mut csbk);

		SlotType::new(color_code, DataType::CsbK).encode(frame);
		add_dmr_data_sync(frame, duplex);
	}

	/// Encodes just the 12-byte payload (network path).
	pub fn encode_raw(&self) -> [u8; CSBK_LENGTH_BYTES] {
		let mut csbk = self.to_payload();
		crc::add_ccitt162(&mut csbk, CSBK_LENGTH_BYTES);
		csbk[10] ^= CSBK_CRC_MASK[0];
		csbk[11] ^= CSBK_CRC_MASK[1];
		csbk
	}

	fn to_payload(&self) -> [u8; CSBK_LENGTH_BYTES] {
		match self {
			Self::ExtFnct(v) => from_value(v.encode(), csbko::EXT_FNCT, FID_DMRA, true),
			Self::VoiceGrant(v) => from_value(v.encode(), v.csbko(), FID_ETSI, true),
			Self::PClear(v) => from_value(v.encode(), csbko::P_CLEAR, FID_ETSI, true),
			Self::UuVReq(v) => from_value(v.encode(), csbko::UU_V_REQ, FID_ETSI, true),
			Self::UuAnsRsp(v) => from_value(v.encode(), csbko::UU_ANS_RSP, FID_ETSI, true),
			Self::AckRsp(v) => from_value(v.encode(), csbko::ACK_RSP, FID_ETSI, true),
			Self::NackRsp(v) => from_value(v.encode(), csbko::NACK_RSP, FID_ETSI, true),
			Self::Rand(v) => from_value(v.encode(), csbko::RAND, FID_ETSI, true),
			Self::Broadcast(v) => from_value(v.encode(), csbko::BROADCAST, FID_ETSI, true),
			Self::Bsdwnact(_) => from_value(0, csbko::BSDWNACT, FID_ETSI, true),
			Self::Raw(raw) => {
				let mut csbk = raw.csbk;
				csbk[0] = (raw.csbko & 0x3F) | if raw.last_block { 0x80 } else { 0x00 };
				csbk[1] = raw.fid;
				csbk
			}
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::ExtFnct(_) => "CSBKO, EXT_FNCT (Extended Function)",
			Self::VoiceGrant(v) if !v.group => "CSBKO, PV_GRANT (Private Voice Channel Grant)",
			Self::VoiceGrant(v) if v.broadcast => {
				"CSBKO, BTV_GRANT (Broadcast Talkgroup Voice Channel Grant)"
			}
			Self::VoiceGrant(_) => "CSBKO, TV_GRANT (Talkgroup Voice Channel Grant)",
			Self::PClear(_) => "CSBKO, P_CLEAR (Payload Channel Clear)",
			Self::UuVReq(_) => "CSBKO, UU_V_REQ (Unit-to-Unit Voice Request)",
			Self::UuAnsRsp(_) => "CSBKO, UU_ANS_RSP (Unit-to-Unit Answer Response)",
			Self::AckRsp(_) => "CSBKO, ACK_RSP (Acknowledge Response)",
			Self::NackRsp(_) => "CSBKO, NACK_RSP (Negative Acknowledge Response)",
			Self::Rand(_) => "CSBKO, RAND (Random Access Service Request)",
			Self::Bsdwnact(_) => "CSBKO, BSDWNACT (BS Downlink Activate)",
			Self::Broadcast(_) => "CSBKO, BROADCAST (Announcement Broadcast)",
			Self::Raw(_) => "CSBKO, RAW (Raw Control Block)",
		}
	}

	pub fn ids(&self) -> (u32, u32) {
		match self {
			Self::ExtFnct(v) => (v.src_id, v.dst_id),
			Self::VoiceGrant(v) => (v.src_id, v.dst_id),
			Self::PClear(v) => (v.src_id, v.dst_id),
			Self::UuVReq(v) | Self::UuAnsRsp(v) => (v.src_id, v.dst_id),
			Self::AckRsp(v) | Self::NackRsp(v) => (v.src_id, v.dst_id),
			Self::Rand(v) => (v.src_id, v.dst_id),
			Self::Bsdwnact(v) => (v.src_id, v.bs_id),
			Self::Broadcast(_) | Self::Raw(_) => (0, 0),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ext_fnct_inhibit_layout() {
		// admin inhibit of unit 2002 signed by the FNE
		let csbk = ExtFnct {
			data_content: false,
			group: false,
			function: super::super::EXT_FNCT_INHIBIT,
			dst_id: 2002,
			src_id: super::super::WUID_FNE,
		};
		let value = csbk.encode();
		assert_eq!((value >> 48) & 0xFF, 0x7F);
		assert_eq!((value >> 24) & 0xFF_FFFF, u64::from(super::super::WUID_FNE));
		assert_eq!(value & 0xFF_FFFF, 2002);
	}

	#[test]
	fn csbk_round_trip_through_bptc() {
		let csbk = Csbk::Rand(Rand {
			service_kind: service_kind::GRP_VOICE,
			service_options: 0x04,
			dst_id: 22,
			src_id: 111,
		});

		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		csbk.encode(1, &mut frame, true);

		let decoded = Csbk::decode(&frame).unwrap();
		assert_eq!(decoded, csbk);

		// the slot type travelled with it
		let st = SlotType::decode(&frame).unwrap();
		assert_eq!(st.data_type, DataType::CsbK);
	}

	#[test]
	fn tv_grant_round_trip() {
		let grant = VoiceGrant {
			group: true,
			broadcast: false,
			logical_ch: 2,
			slot: 2,
			late_entry: false,
			emergency: false,
			site_offset_timing: false,
			dst_id: 22,
			src_id: 111,
		};
		let csbk = Csbk::VoiceGrant(grant);

		let raw = csbk.encode_raw();
		let decoded = Csbk::decode_raw(&raw).unwrap();
		match decoded {
			Csbk::VoiceGrant(v) => {
				assert_eq!(v.logical_ch, 2);
				assert_eq!(v.slot, 2);
				assert_eq!(v.dst_id, 22);
				assert_eq!(v.src_id, 111);
			}
			other => panic!("wrong variant: {}", other.name()),
		}
	}

	#[test]
	fn crc_mask_distinguishes_payload_kinds() {
		let csbk = Csbk::PClear(PClear {
			logical_ch: 7,
			group: true,
			dst_id: 22,
			src_id: super::super::WUID_FNE,
		});
		let mut raw = csbk.encode_raw();
		// stripping the mask must break the check
		raw[10] ^= 0xA5;
		raw[11] ^= 0xA5;
		assert!(Csbk::decode_raw(&raw).is_err());
	}

	#[test]
	fn corrupted_burst_is_rejected_or_corrected() {
		let csbk = Csbk::UuAnsRsp(UuVoice {
			response: 0x20,
			dst_id: 1001,
			src_id: 2002,
		});
		let mut frame = [0u8; FRAME_LENGTH_BYTES];
		csbk.encode(1, &mut frame, true);

		frame[1] ^= 0x08;
		assert_eq!(Csbk::decode(&frame).unwrap(), csbk);
	}
}
