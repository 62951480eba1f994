//! Network Identifier: the NAC plus DUID word protecting every P25 frame,
//! carried under BCH with a trailing parity bit.

use bit_field::BitField;

use super::Duid;
use crate::edac::bch;
use crate::errors::DecodeError;

/// Encoded NID length, in bytes.
pub const NID_LENGTH_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nid {
	pub nac: u16,
	pub duid: Duid,
}

impl Nid {
	pub fn new(nac: u16, duid: Duid) -> Self {
		Self {
			nac: nac & 0xFFF,
			duid,
		}
	}

	/// Decodes and error-corrects a NID, verifying the NAC matches.
	pub fn decode(data: &[u8], nac: u16) -> Result<Self, DecodeError> {
		let mut word = [0u8; NID_LENGTH_BYTES];
		word.copy_from_slice(&data[..NID_LENGTH_BYTES]);

		let value = bch::decode(&word).ok_or(DecodeError::Irrecoverable)?;

		let got_nac = value.get_bits(4..16);
		let duid = Duid::try_from(value.get_bits(0..4) as u8).map_err(|_| DecodeError::Format)?;

		if got_nac != (nac & 0xFFF) && got_nac != 0xF7E {
			// 0xF7E is the "use default" NAC
			return Err(DecodeError::Format);
		}

		Ok(Self { nac: got_nac, duid })
	}

	pub fn encode(&self, data: &mut [u8]) {
		let mut value = 0u16;
		value.set_bits(4..16, self.nac);
		value.set_bits(0..4, u16::from(u8::from(self.duid)));
		let mut word = [0u8; NID_LENGTH_BYTES];
		word[0] = (value >> 8) as u8;
		word[1] = value as u8;
		bch::encode(&mut word);
		data[..NID_LENGTH_BYTES].copy_from_slice(&word);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bits::write_bit;

	#[test]
	fn nid_round_trip() {
		let nid = Nid::new(0x293, Duid::Tsdu);
		let mut buf = [0u8; NID_LENGTH_BYTES];
		nid.encode(&mut buf);
		assert_eq!(Nid::decode(&buf, 0x293).unwrap(), nid);
	}

	#[test]
	fn nid_corrects_one_flip() {
		let nid = Nid::new(0x1A7, Duid::Ldu1);
		let mut buf = [0u8; NID_LENGTH_BYTES];
		nid.encode(&mut buf);

		let flipped = !crate::bits::read_bit(&buf, 20);
		write_bit(&mut buf, 20, flipped);
		assert_eq!(Nid::decode(&buf, 0x1A7).unwrap(), nid);
	}

	#[test]
	fn nid_rejects_foreign_nac() {
		let nid = Nid::new(0x123, Duid::Tdu);
		let mut buf = [0u8; NID_LENGTH_BYTES];
		nid.encode(&mut buf);
		assert_eq!(Nid::decode(&buf, 0x293), Err(DecodeError::Format));
	}
}
