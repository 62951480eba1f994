//! Alternate multi-block trunking (AMBT) PDUs.
//!
//! Service requests and responses too wide for a single TSBK ride in a
//! confirmed PDU: a 12-byte header (whose trailing "field 8"/"field 9"
//! bytes extend the opcode-specific payload) followed by confirmed data
//! blocks. Each block carries a 7-bit serial and a CRC-9 over its 80
//! payload bits; the assembled payload ends with a CRC-32.

use super::TSBK_LENGTH_BYTES;
use crate::edac::crc;
use crate::errors::DecodeError;

/// Maximum data blocks a single AMBT may carry.
pub const AMBT_MAX_BLOCKS: usize = 3;

/// Payload bytes per confirmed data block (serial and CRC-9 lead it).
const BLOCK_PAYLOAD_BYTES: usize = 10;

/// The confirmed-PDU header fronting an AMBT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbtHeader {
	/// Opcode, shared with the single-block TSBK namespace.
	pub lco: u8,
	pub mfid: u8,
	/// Logical link ID of the addressed unit.
	pub llid: u32,
	pub blocks_to_follow: u8,
	/// Opcode-specific header extension bytes.
	pub field8: u8,
	pub field9: u8,
}

/// One multi-block trunking PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambt {
	pub header: AmbtHeader,
	/// Extended payload spread over the data blocks.
	pub payload: Vec<u8>,
}

impl Ambt {
	pub fn new(lco: u8, mfid: u8, llid: u32, payload: &[u8]) -> Self {
		let blocks = (payload.len() + 4).div_ceil(BLOCK_PAYLOAD_BYTES).max(1);
		debug_assert!(blocks <= AMBT_MAX_BLOCKS);

		Self {
			header: AmbtHeader {
				lco: lco & 0x3F,
				mfid,
				llid: llid & 0xFF_FFFF,
				blocks_to_follow: blocks as u8,
				field8: 0,
				field9: 0,
			},
			payload: payload.to_vec(),
		}
	}

	/// Total serialized length: header plus the data blocks.
	pub fn length(&self) -> usize {
		TSBK_LENGTH_BYTES * (1 + usize::from(self.header.blocks_to_follow))
	}

	/// CRC-9 over a block's serial and payload bits.
	fn block_crc9(serial: u8, payload: &[u8]) -> u16 {
		let mut scratch = [0u8; 1 + BLOCK_PAYLOAD_BYTES + 1];
		scratch[0] = (serial & 0x7F) << 1;
		scratch[1..1 + BLOCK_PAYLOAD_BYTES].copy_from_slice(payload);
		crc::create_crc9(&scratch, (1 + BLOCK_PAYLOAD_BYTES) * 8)
	}

	/// Serializes the header block and confirmed data blocks; the last
	/// four payload bytes carry the CRC-32 over the assembled payload.
	pub fn encode(&self, data: &mut [u8]) -> bool {
		let blocks = usize::from(self.header.blocks_to_follow);
		if blocks == 0 || blocks > AMBT_MAX_BLOCKS {
			error!(
				"P25, invalid AMBT block count, blocksToFollow = {}",
				self.header.blocks_to_follow
			);
			return false;
		}
		if data.len() < self.length() {
			return false;
		}

		// per-block payload capacity less the trailing CRC-32
		let capacity = blocks * BLOCK_PAYLOAD_BYTES - 4;
		if self.payload.len() > capacity {
			error!(
				"P25, AMBT payload overflow, len = {}, capacity = {capacity}",
				self.payload.len()
			);
			return false;
		}

		let mut header = [0u8; TSBK_LENGTH_BYTES];
		header[0] = self.header.lco & 0x3F;
		header[1] = self.header.mfid;
		crate::bits::set_u24(self.header.llid, &mut header, 2);
		header[5] = self.header.blocks_to_follow & 0x7F;
		header[6] = 0;
		header[7] = 0;
		header[8] = self.header.field8;
		header[9] = self.header.field9;
		crc::add_ccitt162(&mut header, TSBK_LENGTH_BYTES);
		data[..TSBK_LENGTH_BYTES].copy_from_slice(&header);

		let sdu_len = blocks * BLOCK_PAYLOAD_BYTES;
		let mut sdu = vec![0u8; sdu_len];
		sdu[..self.payload.len()].copy_from_slice(&self.payload);
		crc::add_crc32(&mut sdu, sdu_len);

		for n in 0..blocks {
			let serial = (n + 1) as u8;
			let payload = &sdu[n * BLOCK_PAYLOAD_BYTES..(n + 1) * BLOCK_PAYLOAD_BYTES];
			let crc = Self::block_crc9(serial, payload);

			let off = TSBK_LENGTH_BYTES * (1 + n);
			data[off] = ((serial & 0x7F) << 1) | ((crc >> 8) as u8 & 0x01);
			data[off + 1] = crc as u8;
			data[off + 2..off + TSBK_LENGTH_BYTES].copy_from_slice(payload);
		}

		true
	}

	/// Parses a header block plus its confirmed data blocks.
	pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
		if data.len() < 2 * TSBK_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}
		if !crc::check_ccitt162(data, TSBK_LENGTH_BYTES) {
			return Err(DecodeError::Crc);
		}

		let blocks_to_follow = data[5] & 0x7F;
		let blocks = usize::from(blocks_to_follow);
		if blocks == 0 || blocks > AMBT_MAX_BLOCKS {
			return Err(DecodeError::Format);
		}
		if data.len() < TSBK_LENGTH_BYTES * (1 + blocks) {
			return Err(DecodeError::Format);
		}

		let sdu_len = blocks * BLOCK_PAYLOAD_BYTES;
		let mut sdu = vec![0u8; sdu_len];
		for n in 0..blocks {
			let off = TSBK_LENGTH_BYTES * (1 + n);
			let serial = data[off] >> 1;
			if usize::from(serial) != n + 1 {
				return Err(DecodeError::Format);
			}

			let payload = &data[off + 2..off + TSBK_LENGTH_BYTES];
			let crc = (u16::from(data[off] & 0x01) << 8) | u16::from(data[off + 1]);
			if Self::block_crc9(serial, payload) != crc {
				return Err(DecodeError::Crc);
			}

			sdu[n * BLOCK_PAYLOAD_BYTES..(n + 1) * BLOCK_PAYLOAD_BYTES].copy_from_slice(payload);
		}

		if !crc::check_crc32(&sdu, sdu_len) {
			return Err(DecodeError::Crc);
		}

		Ok(Self {
			header: AmbtHeader {
				lco: data[0] & 0x3F,
				mfid: data[1],
				llid: crate::bits::get_u24(data, 2),
				blocks_to_follow,
				field8: data[8],
				field9: data[9],
			},
			payload: sdu[..sdu_len - 4].to_vec(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		// adjacent-site broadcast style payload, wider than one TSBK
		let payload: Vec<u8> = (0u8..16).collect();
		let mut ambt = Ambt::new(0x3C, 0x00, 0xFFFFFC, &payload);
		ambt.header.field8 = 0x29;
		ambt.header.field9 = 0x3B;

		let mut data = vec![0u8; ambt.length()];
		assert!(ambt.encode(&mut data));

		let decoded = Ambt::decode(&data).unwrap();
		assert_eq!(decoded.header.lco, 0x3C);
		assert_eq!(decoded.header.field8, 0x29);
		assert_eq!(decoded.header.field9, 0x3B);
		assert_eq!(&decoded.payload[..16], &payload[..]);
	}

	#[test]
	fn header_crc_rejection() {
		let ambt = Ambt::new(0x28, 0x00, 1001, &[1, 2, 3, 4]);
		let mut data = vec![0u8; ambt.length()];
		assert!(ambt.encode(&mut data));

		data[2] ^= 0x40;
		assert_eq!(Ambt::decode(&data), Err(DecodeError::Crc));
	}

	#[test]
	fn block_crc9_rejection() {
		let ambt = Ambt::new(0x28, 0x00, 1001, &[9; 6]);
		let mut data = vec![0u8; ambt.length()];
		assert!(ambt.encode(&mut data));

		// corrupt a payload byte inside the first confirmed block
		data[TSBK_LENGTH_BYTES + 4] ^= 0x01;
		assert_eq!(Ambt::decode(&data), Err(DecodeError::Crc));
	}

	#[test]
	fn block_serial_rejection() {
		let ambt = Ambt::new(0x28, 0x00, 1001, &(0u8..16).collect::<Vec<u8>>());
		let mut data = vec![0u8; ambt.length()];
		assert!(ambt.encode(&mut data));

		// swap the two confirmed blocks wholesale; the serials no longer
		// run in sequence
		let (a, b) = (TSBK_LENGTH_BYTES, 2 * TSBK_LENGTH_BYTES);
		for n in 0..TSBK_LENGTH_BYTES {
			data.swap(a + n, b + n);
		}
		assert_eq!(Ambt::decode(&data), Err(DecodeError::Format));
	}

	#[test]
	fn payload_capacity_is_enforced() {
		let mut ambt = Ambt::new(0x28, 0x00, 1001, &[0; 8]);
		ambt.payload = vec![0; 40];
		let mut data = vec![0u8; ambt.length()];
		assert!(!ambt.encode(&mut data));
	}
}
