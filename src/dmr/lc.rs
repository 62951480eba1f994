//! DMR full link control, carried by voice LC headers and terminators
//! under the BPTC layer.

use super::{CSBK_LENGTH_BYTES, FID_ETSI, LC_LENGTH_BYTES};
use crate::bits::{get_u24, set_u24};
use crate::edac::crc;
use crate::errors::DecodeError;

/// Full link control opcodes.
pub mod flco {
	pub const GROUP: u8 = 0x00;
	pub const PRIVATE: u8 = 0x03;
}

/// Full link control of a voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullLc {
	pub flco: u8,
	pub fid: u8,
	pub group: bool,
	pub emergency: bool,
	pub encrypted: bool,
	pub priority: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl FullLc {
	pub fn group_voice(dst_id: u32, src_id: u32) -> Self {
		Self {
			flco: flco::GROUP,
			fid: FID_ETSI,
			group: true,
			emergency: false,
			encrypted: false,
			priority: 0,
			dst_id,
			src_id,
		}
	}

	pub fn private_voice(dst_id: u32, src_id: u32) -> Self {
		Self {
			flco: flco::PRIVATE,
			group: false,
			..Self::group_voice(dst_id, src_id)
		}
	}

	/// Packs the LC plus checksum into a 12-byte BPTC payload.
	pub fn encode(&self) -> [u8; CSBK_LENGTH_BYTES] {
		let mut payload = [0u8; CSBK_LENGTH_BYTES];
		payload[0] = self.flco & 0x3F;
		payload[1] = self.fid;
		payload[2] = if self.emergency { 0x80 } else { 0x00 }
			| if self.encrypted { 0x40 } else { 0x00 }
			| (self.priority & 0x07);
		set_u24(self.dst_id, &mut payload, 3);
		set_u24(self.src_id, &mut payload, 6);
		crc::add_ccitt162(&mut payload, LC_LENGTH_BYTES + 2);
		payload
	}

	/// Unpacks a checked 12-byte BPTC payload.
	pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
		if payload.len() < CSBK_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}
		if !crc::check_ccitt162(payload, LC_LENGTH_BYTES + 2) {
			return Err(DecodeError::Crc);
		}

		let opcode = payload[0] & 0x3F;
		let group = match opcode {
			flco::GROUP => true,
			flco::PRIVATE => false,
			_ => return Err(DecodeError::Format),
		};

		Ok(Self {
			flco: opcode,
			fid: payload[1],
			group,
			emergency: payload[2] & 0x80 == 0x80,
			encrypted: payload[2] & 0x40 == 0x40,
			priority: payload[2] & 0x07,
			dst_id: get_u24(payload, 3),
			src_id: get_u24(payload, 6),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let lc = FullLc::group_voice(22, 111);
		let payload = lc.encode();
		assert_eq!(FullLc::decode(&payload).unwrap(), lc);
	}

	#[test]
	fn checksum_rejection() {
		let lc = FullLc::private_voice(2002, 1001);
		let mut payload = lc.encode();
		payload[4] ^= 0x01;
		assert_eq!(FullLc::decode(&payload), Err(DecodeError::Crc));
	}
}
