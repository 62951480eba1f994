//! P25 (TIA-102) protocol stack: NID, trunking signalling (TSBK/AMBT),
//! terminator link control, LDU voice link control, DFSI framing and the
//! control-channel state machine.

pub mod ambt;
pub mod control;
pub mod dfsi;
pub mod lc;
pub mod nid;
pub mod tdulc;
pub mod tsbk;
pub mod voice;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Data unit IDs carried in the NID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Duid {
	Hdu = 0x00,
	Tdu = 0x03,
	Ldu1 = 0x05,
	Tsdu = 0x07,
	Ldu2 = 0x0A,
	Pdu = 0x0C,
	Tdulc = 0x0F,
}

/// Default network access code.
pub const DEFAULT_NAC: u16 = 0x293;

/// TSBK/TDULC payload length, in bytes (including CRC).
pub const TSBK_LENGTH_BYTES: usize = 12;

/// Trellis block length on air, in bytes.
pub const TSBK_FEC_LENGTH_BYTES: usize = 25;

/// LDU frame length, in bytes (sync, NID, RS block, LSD, nine IMBE frames).
pub const LDU_FRAME_LENGTH_BYTES: usize = 198;

/// Full-rate IMBE frame length, in bytes.
pub const IMBE_FRAME_LENGTH_BYTES: usize = 18;

/// Manufacturer IDs.
pub const MFID_STANDARD: u8 = 0x00;
pub const MFID_MOT: u8 = 0x90;

/// System service class bits.
pub const SVC_CLS_INVALID: u8 = 0x00;
pub const SVC_CLS_COMPOSITE: u8 = 0x01;
pub const SVC_CLS_VOICE: u8 = 0x10;
pub const SVC_CLS_DATA: u8 = 0x20;
pub const SVC_CLS_REG: u8 = 0x40;

/// WUID the FNE itself signs outbound commands with.
pub const WUID_FNE: u32 = 0xFFFFFC;
/// WUID addressing every unit.
pub const WUID_ALL: u32 = 0xFFFFFF;
/// Talkgroup addressing every unit.
pub const TGID_ALL: u32 = 0xFFFF;

/// Extended function opcodes (IOSP_EXT_FNCT).
pub const EXT_FNCT_CHECK: u16 = 0x0000;
pub const EXT_FNCT_UNINHIBIT: u16 = 0x007E;
pub const EXT_FNCT_INHIBIT: u16 = 0x007F;
pub const EXT_FNCT_CHECK_ACK: u16 = 0x0080;
pub const EXT_FNCT_UNINHIBIT_ACK: u16 = 0x00FE;
pub const EXT_FNCT_INHIBIT_ACK: u16 = 0x00FF;

/// Deny/queue reason codes.
pub const DENY_RSN_REQ_UNIT_NOT_VALID: u8 = 0x10;
pub const DENY_RSN_REQ_UNIT_NOT_AUTH: u8 = 0x2F;
pub const DENY_RSN_TGT_UNIT_NOT_VALID: u8 = 0x20;
pub const DENY_RSN_TGT_GROUP_NOT_VALID: u8 = 0x2F;
pub const QUE_RSN_CHN_RESOURCE_NOT_AVAIL: u8 = 0x21;
pub const QUE_RSN_TGT_UNIT_QUEUED: u8 = 0x2F;

/// Response codes for IOSP_ACK_RSP / affiliation / registration.
pub const RSP_ACCEPT: u8 = 0x00;
pub const RSP_FAIL: u8 = 0x01;
pub const RSP_DENY: u8 = 0x02;
pub const RSP_REFUSED: u8 = 0x03;

bitflags! {
	/// Voice service options.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct ServiceOptions: u8 {
		const EMERGENCY = 0x80;
		const ENCRYPTED = 0x40;
		const DUPLEX = 0x20;
		const PACKET_MODE = 0x10;
		const PRIORITY = 0x07;
	}
}

impl ServiceOptions {
	pub fn priority(self) -> u8 {
		self.bits() & Self::PRIORITY.bits()
	}

	pub fn from_parts(emergency: bool, encrypted: bool, priority: u8) -> Self {
		let mut bits = priority & 0x07;
		if emergency {
			bits |= 0x80;
		}
		if encrypted {
			bits |= 0x40;
		}
		Self::from_bits_retain(bits)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn service_options_packing() {
		let opts = ServiceOptions::from_parts(false, false, 4);
		assert_eq!(opts.bits(), 0x04);
		assert_eq!(opts.priority(), 4);

		let opts = ServiceOptions::from_parts(true, true, 7);
		assert_eq!(opts.bits(), 0xC7);
		assert!(opts.contains(ServiceOptions::EMERGENCY));
	}

	#[test]
	fn duid_conversions() {
		assert_eq!(Duid::try_from(0x07).unwrap(), Duid::Tsdu);
		assert_eq!(u8::from(Duid::Ldu2), 0x0A);
		assert!(Duid::try_from(0x01).is_err());
	}
}
