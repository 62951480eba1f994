//! Slot type: colour code and data type, Golay(20,8) protected, carried
//! in the 10-bit fields either side of a burst's sync word.

use super::DataType;
use crate::bits::{read_bit, write_bit};
use crate::edac::golay;
use crate::errors::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotType {
	pub color_code: u8,
	pub data_type: DataType,
}

impl SlotType {
	pub fn new(color_code: u8, data_type: DataType) -> Self {
		Self {
			color_code: color_code & 0x0F,
			data_type,
		}
	}

	/// Decodes the 20 slot-type bits of a 33-byte burst.
	pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
		let mut word = 0u32;
		for n in 0..10 {
			word = (word << 1) | u32::from(read_bit(frame, 98 + n));
		}
		for n in 0..10 {
			word = (word << 1) | u32::from(read_bit(frame, 156 + n));
		}

		let data = golay::decode2087(word).ok_or(DecodeError::Irrecoverable)?;
		let data_type = DataType::try_from(data & 0x0F).map_err(|_| DecodeError::Format)?;
		Ok(Self {
			color_code: data >> 4,
			data_type,
		})
	}

	/// Encodes the slot type into a 33-byte burst.
	pub fn encode(&self, frame: &mut [u8]) {
		let data = (self.color_code << 4) | (u8::from(self.data_type) & 0x0F);
		let word = golay::encode2087(data);

		for n in 0..10 {
			write_bit(frame, 98 + n, word & (1 << (19 - n)) != 0);
		}
		for n in 0..10 {
			write_bit(frame, 156 + n, word & (1 << (9 - n)) != 0);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let st = SlotType::new(1, DataType::CsbK);
		let mut frame = [0u8; 33];
		st.encode(&mut frame);
		assert_eq!(SlotType::decode(&frame).unwrap(), st);
	}

	#[test]
	fn corrects_damage() {
		let st = SlotType::new(9, DataType::TerminatorWithLc);
		let mut frame = [0u8; 33];
		st.encode(&mut frame);

		// two flipped bits across the split halves
		frame[12] ^= 0x10;
		frame[19] ^= 0x04;
		assert_eq!(SlotType::decode(&frame).unwrap(), st);
	}

	#[test]
	fn voice_data_types_are_synthetic() {
		// VOICE/VOICE_SYNC never ride in a slot type on air; the codes sit
		// above the 4-bit field
		assert!(u8::from(DataType::Voice) > 0x0F);
	}
}
