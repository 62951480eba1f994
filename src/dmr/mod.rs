//! DMR (ETSI TS 102 361) protocol stack: slot framing, link control,
//! CSBK trunking signalling and the two-slot call state machine.

pub mod control;
pub mod csbk;
pub mod lc;
pub mod slot_type;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// DMR burst length, in bytes.
pub const FRAME_LENGTH_BYTES: usize = 33;

/// CSBK/LC payload length, in bytes.
pub const CSBK_LENGTH_BYTES: usize = 12;

/// Full link control length, in bytes.
pub const LC_LENGTH_BYTES: usize = 9;

/// AMBE payload per voice burst, in bytes.
pub const AMBE_LENGTH_BYTES: usize = 27;

/// Burst data types carried in the slot type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DataType {
	VoiceLcHeader = 0x00,
	TerminatorWithLc = 0x02,
	CsbK = 0x03,
	DataHeader = 0x06,
	Rate12Data = 0x07,
	Rate34Data = 0x08,
	Idle = 0x09,
	VoiceSync = 0x20,
	Voice = 0x21,
}

/// Feature set IDs.
pub const FID_ETSI: u8 = 0x00;
pub const FID_DMRA: u8 = 0x10;

/// WUID the FNE signs outbound commands with.
pub const WUID_FNE: u32 = 0xFFFFEC;
/// All-call talkgroup.
pub const TGID_ALL: u32 = 0xFFFFFF;

/// Extended function opcodes (CSBK_EXT_FNCT).
pub const EXT_FNCT_CHECK: u8 = 0x00;
pub const EXT_FNCT_UNINHIBIT: u8 = 0x7E;
pub const EXT_FNCT_INHIBIT: u8 = 0x7F;
pub const EXT_FNCT_CHECK_ACK: u8 = 0x80;
pub const EXT_FNCT_UNINHIBIT_ACK: u8 = 0xFE;
pub const EXT_FNCT_INHIBIT_ACK: u8 = 0xFF;

/// Tier III answer/deny reason codes.
pub const TSCC_REASON_ACCEPTED: u8 = 0x44;
pub const TSCC_REASON_QUEUED: u8 = 0xA0;
pub const TSCC_REASON_NO_RESOURCE: u8 = 0x33;
pub const TSCC_REASON_NOT_PERMITTED: u8 = 0x27;

/// Silence threshold, repaired bits per voice call before null audio is
/// substituted.
pub const DEFAULT_SILENCE_THRESHOLD: u32 = 14;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn data_type_conversions() {
		assert_eq!(DataType::try_from(0x03).unwrap(), DataType::CsbK);
		assert_eq!(u8::from(DataType::Voice), 0x21);
		assert!(DataType::try_from(0x15).is_err());
	}
}
