//! Voice-frame link control: the LC word carried by LDU1 and the
//! encryption sync word carried by LDU2.

use super::{MFID_STANDARD, tdulc};
use crate::edac::rs634717;
use crate::errors::DecodeError;

/// Link-control word length, in bytes.
pub const LC_LENGTH_BYTES: usize = 9;

/// RS-protected LC block length, in bytes.
pub const LC_FEC_LENGTH_BYTES: usize = 18;

/// Encryption sync word length, in bytes (MI + ALGID + KID).
pub const ESYNC_LENGTH_BYTES: usize = 12;

/// RS-protected encryption sync block length, in bytes.
pub const ESYNC_FEC_LENGTH_BYTES: usize = 18;

/// Message indicator length, in bytes.
pub const MI_LENGTH_BYTES: usize = 9;

/// Clear-voice algorithm ID.
pub const ALGO_UNENCRYPT: u8 = 0x80;

/// The link control word of a voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkControl {
	pub lco: u8,
	pub mfid: u8,
	pub group: bool,
	pub emergency: bool,
	pub encrypted: bool,
	pub priority: u8,
	pub dst_id: u32,
	pub src_id: u32,
}

impl LinkControl {
	pub fn group_voice(dst_id: u32, src_id: u32) -> Self {
		Self {
			lco: tdulc::lco::GROUP,
			mfid: MFID_STANDARD,
			group: true,
			emergency: false,
			encrypted: false,
			priority: 4,
			dst_id,
			src_id,
		}
	}

	pub fn private_voice(dst_id: u32, src_id: u32) -> Self {
		Self {
			lco: tdulc::lco::PRIVATE,
			group: false,
			..Self::group_voice(dst_id, src_id)
		}
	}

	fn pack(&self) -> [u8; LC_LENGTH_BYTES] {
		let mut lc = [0u8; LC_LENGTH_BYTES];
		lc[0] = self.lco & 0x3F;
		lc[1] = self.mfid;
		lc[2] = if self.emergency { 0x80 } else { 0x00 }
			| if self.encrypted { 0x40 } else { 0x00 }
			| (self.priority & 0x07);
		if self.group {
			crate::bits::set_u16((self.dst_id & 0xFFFF) as u16, &mut lc, 4);
		} else {
			crate::bits::set_u24(self.dst_id, &mut lc, 3);
		}
		crate::bits::set_u24(self.src_id, &mut lc, 6);
		lc
	}

	fn unpack(lc: &[u8; LC_LENGTH_BYTES]) -> Result<Self, DecodeError> {
		let lco = lc[0] & 0x3F;
		let group = match lco {
			tdulc::lco::GROUP | tdulc::lco::GROUP_UPDT => true,
			tdulc::lco::PRIVATE => false,
			_ => return Err(DecodeError::Format),
		};

		Ok(Self {
			lco,
			mfid: lc[1],
			group,
			emergency: lc[2] & 0x80 == 0x80,
			encrypted: lc[2] & 0x40 == 0x40,
			priority: lc[2] & 0x07,
			dst_id: if group {
				u32::from(crate::bits::get_u16(lc, 4))
			} else {
				crate::bits::get_u24(lc, 3)
			},
			src_id: crate::bits::get_u24(lc, 6),
		})
	}

	/// Encodes the RS(24,12)-protected LC block of an LDU1.
	pub fn encode(&self, data: &mut [u8]) {
		let lc = self.pack();
		let mut rs = [0u8; 24];
		rs[..12].copy_from_slice(&hexbits_from_bytes(&lc)[..12]);
		rs634717::encode241213(&mut rs);
		bytes_from_hexbits(&rs, data);
	}

	/// Decodes and corrects the LC block of an LDU1.
	pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
		if data.len() < LC_FEC_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}
		let mut rs = hexbits_from_slice(data);
		rs634717::decode241213(&mut rs)?;

		let mut lc = [0u8; LC_LENGTH_BYTES];
		pack_hexbits(&rs[..12], &mut lc);
		Self::unpack(&lc)
	}
}

/// The encryption synchronization word of an LDU2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionSync {
	pub mi: [u8; MI_LENGTH_BYTES],
	pub alg_id: u8,
	pub kid: u16,
}

impl EncryptionSync {
	pub fn clear() -> Self {
		Self {
			mi: [0; MI_LENGTH_BYTES],
			alg_id: ALGO_UNENCRYPT,
			kid: 0,
		}
	}

	/// Encodes the RS(24,16)-protected encryption sync block of an LDU2.
	pub fn encode(&self, data: &mut [u8]) {
		let mut es = [0u8; ESYNC_LENGTH_BYTES];
		es[..MI_LENGTH_BYTES].copy_from_slice(&self.mi);
		es[9] = self.alg_id;
		crate::bits::set_u16(self.kid, &mut es, 10);

		let mut rs = [0u8; 24];
		rs[..16].copy_from_slice(&hexbits_from_bytes(&es)[..16]);
		rs634717::encode24169(&mut rs);
		bytes_from_hexbits(&rs, data);
	}

	/// Decodes and corrects the encryption sync block of an LDU2.
	pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
		if data.len() < ESYNC_FEC_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}
		let mut rs = hexbits_from_slice(data);
		rs634717::decode24169(&mut rs)?;

		let mut es = [0u8; ESYNC_LENGTH_BYTES];
		pack_hexbits(&rs[..16], &mut es);

		let mut mi = [0u8; MI_LENGTH_BYTES];
		mi.copy_from_slice(&es[..MI_LENGTH_BYTES]);
		Ok(Self {
			mi,
			alg_id: es[9],
			kid: crate::bits::get_u16(&es, 10),
		})
	}
}

/// Splits `N` bytes into `N·8/6` hexbits, MSB first.
fn hexbits_from_bytes<const N: usize>(bytes: &[u8; N]) -> [u8; 16] {
	let mut hexbits = [0u8; 16];
	for (i, hb) in hexbits.iter_mut().take(N * 8 / 6).enumerate() {
		for n in 0..6 {
			if crate::bits::read_bit(bytes, i * 6 + n) {
				*hb |= 1 << (5 - n);
			}
		}
	}
	hexbits
}

fn hexbits_from_slice(data: &[u8]) -> [u8; 24] {
	let mut rs = [0u8; 24];
	for (i, hb) in rs.iter_mut().enumerate() {
		for n in 0..6 {
			if crate::bits::read_bit(data, i * 6 + n) {
				*hb |= 1 << (5 - n);
			}
		}
	}
	rs
}

fn pack_hexbits(hexbits: &[u8], out: &mut [u8]) {
	for (i, hb) in hexbits.iter().enumerate() {
		for n in 0..6 {
			let idx = i * 6 + n;
			if idx >= out.len() * 8 {
				return;
			}
			crate::bits::write_bit(out, idx, hb & (1 << (5 - n)) != 0);
		}
	}
}

fn bytes_from_hexbits(hexbits: &[u8; 24], out: &mut [u8]) {
	for (i, hb) in hexbits.iter().enumerate() {
		for n in 0..6 {
			crate::bits::write_bit(out, i * 6 + n, hb & (1 << (5 - n)) != 0);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn group_lc_round_trip() {
		let lc = LinkControl::group_voice(50, 1001);
		let mut data = [0u8; LC_FEC_LENGTH_BYTES];
		lc.encode(&mut data);
		assert_eq!(LinkControl::decode(&data).unwrap(), lc);
	}

	#[test]
	fn private_lc_round_trip_with_errors() {
		let lc = LinkControl::private_voice(0xBEEF01, 0x0A0B0C);
		let mut data = [0u8; LC_FEC_LENGTH_BYTES];
		lc.encode(&mut data);

		data[3] ^= 0x3F;
		data[15] ^= 0xC0;
		assert_eq!(LinkControl::decode(&data).unwrap(), lc);
	}

	#[test]
	fn esync_round_trip() {
		let es = EncryptionSync {
			mi: [1, 2, 3, 4, 5, 6, 7, 8, 9],
			alg_id: 0xAA,
			kid: 0x1234,
		};
		let mut data = [0u8; ESYNC_FEC_LENGTH_BYTES];
		es.encode(&mut data);
		assert_eq!(EncryptionSync::decode(&data).unwrap(), es);
	}

	#[test]
	fn clear_esync_defaults() {
		let es = EncryptionSync::clear();
		assert_eq!(es.alg_id, ALGO_UNENCRYPT);
		assert_eq!(es.kid, 0);
	}
}
