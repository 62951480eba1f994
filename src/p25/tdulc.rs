//! Terminator data unit with link control (TDULC).
//!
//! The 72-bit terminator link-control word rides under RS(24,12,13) as 24
//! hexbits; the first byte pairs the implicit/protect flags with the LCO,
//! the second carries the manufacturer ID, and the remaining 56 bits pack
//! per-opcode fields.

use super::WUID_FNE;
use crate::bits::{read_bit, write_bit};
use crate::edac::rs634717;
use crate::errors::DecodeError;
use crate::{IdenEntry, SiteData};

/// Protected TDULC block length, in bytes (24 hexbits).
pub const TDULC_FEC_LENGTH_BYTES: usize = 18;

/// Link-control payload length, in bytes.
pub const TDULC_LENGTH_BYTES: usize = 9;

/// Terminator link-control opcodes.
pub mod lco {
	pub const GROUP: u8 = 0x00;
	pub const GROUP_UPDT: u8 = 0x02;
	pub const PRIVATE: u8 = 0x03;
	pub const EXPLICIT_SOURCE_ID: u8 = 0x09;
	pub const CALL_TERM: u8 = 0x0F;
	pub const IDEN_UP: u8 = 0x18;
	pub const SYS_SRV_BCAST: u8 = 0x20;
	pub const ADJ_STS_BCAST: u8 = 0x22;
	pub const RFSS_STS_BCAST: u8 = 0x23;
	pub const NET_STS_BCAST: u8 = 0x24;
}

fn rs_to_bytes(rs: &[u8; 24]) -> [u8; TDULC_FEC_LENGTH_BYTES] {
	let mut out = [0u8; TDULC_FEC_LENGTH_BYTES];
	for (i, hexbit) in rs.iter().enumerate() {
		for n in 0..6 {
			write_bit(&mut out, i * 6 + n, hexbit & (1 << (5 - n)) != 0);
		}
	}
	out
}

fn bytes_to_rs(data: &[u8]) -> [u8; 24] {
	let mut rs = [0u8; 24];
	for (i, hexbit) in rs.iter_mut().enumerate() {
		for n in 0..6 {
			if read_bit(data, i * 6 + n) {
				*hexbit |= 1 << (5 - n);
			}
		}
	}
	rs
}

fn base_decode(data: &[u8], raw_tdulc: bool) -> Result<[u8; TDULC_LENGTH_BYTES], DecodeError> {
	let mut lc = [0u8; TDULC_LENGTH_BYTES];

	if raw_tdulc {
		if data.len() < TDULC_LENGTH_BYTES {
			return Err(DecodeError::Format);
		}
		lc.copy_from_slice(&data[..TDULC_LENGTH_BYTES]);
		return Ok(lc);
	}

	if data.len() < TDULC_FEC_LENGTH_BYTES {
		return Err(DecodeError::Format);
	}
	let mut rs = bytes_to_rs(data);
	rs634717::decode241213(&mut rs)?;

	// 12 data hexbits back to 9 payload bytes
	let bytes = rs_to_bytes(&rs);
	lc.copy_from_slice(&bytes[..TDULC_LENGTH_BYTES]);
	Ok(lc)
}

fn base_encode(data: &mut [u8], lc: &[u8; TDULC_LENGTH_BYTES], raw_tdulc: bool) {
	if raw_tdulc {
		data[..TDULC_LENGTH_BYTES].copy_from_slice(lc);
		return;
	}

	let mut rs = [0u8; 24];
	let padded = {
		let mut p = [0u8; TDULC_FEC_LENGTH_BYTES];
		p[..TDULC_LENGTH_BYTES].copy_from_slice(lc);
		p
	};
	rs[..12].copy_from_slice(&bytes_to_rs(&padded)[..12]);
	rs634717::encode241213(&mut rs);
	data[..TDULC_FEC_LENGTH_BYTES].copy_from_slice(&rs_to_bytes(&rs));
}

/// The 64-bit packed value rides in bytes 1..9; for explicit-form words
/// its top byte doubles as the manufacturer ID.
fn to_value(lc: &[u8; TDULC_LENGTH_BYTES]) -> u64 {
	let mut value = 0u64;
	for byte in &lc[1..TDULC_LENGTH_BYTES] {
		value = (value << 8) | u64::from(*byte);
	}
	value
}

fn from_value(value: u64, lco: u8, implicit: bool) -> [u8; TDULC_LENGTH_BYTES] {
	let mut lc = [0u8; TDULC_LENGTH_BYTES];
	lc[0] = (lco & 0x3F) | if implicit { 0x40 } else { 0x00 };
	for n in 0..8 {
		lc[1 + n] = (value >> (56 - n * 8)) as u8;
	}
	lc
}

/// Terminator link control words.
#[derive(Debug, Clone, PartialEq)]
pub enum Tdulc {
	/// Group voice channel user.
	Group {
		mfid: u8,
		emergency: bool,
		encrypted: bool,
		priority: u8,
		dst_id: u32,
		src_id: u32,
	},
	/// Call termination/cancellation.
	CallTerm,
	/// Explicit source identity (network + system + unit).
	ExplicitSourceId { net_id: u32, sys_id: u32, src_id: u32 },
	/// Adjacent site broadcast over the terminator.
	AdjStsBcast {
		adj_sys_id: u32,
		adj_rfss_id: u8,
		adj_site_id: u8,
		adj_ch_id: u8,
		adj_ch_no: u32,
		adj_svc_class: u8,
	},
	/// Channel identity plan over the terminator.
	IdenUp { iden: IdenEntry },
	/// Pre-built payload pushed through the RS stack untouched.
	Raw { lc: [u8; TDULC_LENGTH_BYTES] },
}

impl Tdulc {
	pub fn decode(data: &[u8], raw_tdulc: bool) -> Result<Self, DecodeError> {
		let lc = base_decode(data, raw_tdulc)?;
		let opcode = lc[0] & 0x3F;
		let value = to_value(&lc);

		let variant = match opcode {
			lco::GROUP => Self::Group {
				mfid: lc[1],
				emergency: lc[2] & 0x80 == 0x80,
				encrypted: lc[2] & 0x40 == 0x40,
				priority: lc[2] & 0x07,
				dst_id: ((value >> 24) & 0xFFFF) as u32,
				src_id: (value & 0xFF_FFFF) as u32,
			},
			lco::CALL_TERM => Self::CallTerm,
			lco::EXPLICIT_SOURCE_ID => Self::ExplicitSourceId {
				net_id: ((value >> 36) & 0xF_FFFF) as u32,
				sys_id: ((value >> 24) & 0xFFF) as u32,
				src_id: (value & 0xFF_FFFF) as u32,
			},
			_ => Self::Raw { lc },
		};
		Ok(variant)
	}

	/// Returns false when the variant cannot legally be built.
	pub fn encode(&self, site: &SiteData, data: &mut [u8], raw_tdulc: bool) -> bool {
		let lc = match self {
			Self::Group {
				mfid,
				emergency,
				encrypted,
				priority,
				dst_id,
				src_id,
			} => {
				let mut value = u64::from(*mfid);
				value = (value << 8)
					| u64::from(*emergency) << 7
					| u64::from(*encrypted) << 6
					| u64::from(priority & 0x07);
				value = (value << 24) | u64::from(dst_id & 0xFFFF);
				value = (value << 24) | u64::from(src_id & 0xFF_FFFF);
				from_value(value, lco::GROUP, false)
			}
			Self::CallTerm => {
				let value = u64::from(WUID_FNE);
				from_value(value, lco::CALL_TERM, true)
			}
			Self::ExplicitSourceId { net_id, sys_id, src_id } => {
				let mut value = u64::from(*net_id);
				value = (value << 12) | u64::from(sys_id & 0xFFF);
				value = (value << 24) | u64::from(src_id & 0xFF_FFFF);
				from_value(value, lco::EXPLICIT_SOURCE_ID, true)
			}
			Self::AdjStsBcast {
				adj_sys_id,
				adj_rfss_id,
				adj_site_id,
				adj_ch_id,
				adj_ch_no,
				adj_svc_class,
			} => {
				if *adj_rfss_id == 0 || *adj_site_id == 0 || *adj_ch_no == 0 {
					error!(
						"P25, invalid values for LC_ADJ_STS_BCAST, adjRfssId = ${adj_rfss_id:02X}, adjSiteId = ${adj_site_id:02X}, adjChNo = ${adj_ch_no:02X}"
					);
					return false;
				}
				let sys_id = if *adj_sys_id == 0 { site.sys_id } else { *adj_sys_id };

				let mut value = u64::from(site.lra);
				value = (value << 12) | u64::from(sys_id & 0xFFF);
				value = (value << 8) | u64::from(*adj_rfss_id);
				value = (value << 8) | u64::from(*adj_site_id);
				value = (value << 4) | u64::from(adj_ch_id & 0x0F);
				value = (value << 12) | u64::from(adj_ch_no & 0xFFF);
				value = (value << 8) | u64::from(*adj_svc_class);
				from_value(value, lco::ADJ_STS_BCAST, true)
			}
			Self::IdenUp { iden } => {
				if !iden.is_valid() {
					error!(
						"P25, invalid values for LC_IDEN_UP, baseFrequency = {}Hz",
						iden.base_frequency
					);
					return false;
				}

				let calc_space = (iden.ch_space_khz / 0.125) as u64;
				let mut tx_offset =
					((iden.tx_offset_mhz.abs() * 1_000_000.0) / 250_000.0) as u64;
				if iden.tx_offset_mhz > 0.0 {
					tx_offset |= 0x2000;
				}
				let base_freq = u64::from(iden.base_frequency / 5);
				let ch_bw = ((iden.ch_bandwidth_khz * 1000.0) / 125.0) as u64;

				let mut value = u64::from(iden.channel_id & 0x0F);
				value = (value << 4) | (ch_bw & 0x0F);
				value = (value << 14) | (tx_offset & 0x3FFF);
				value = (value << 10) | (calc_space & 0x3FF);
				value = (value << 32) | base_freq;
				from_value(value, lco::IDEN_UP, true)
			}
			Self::Raw { lc } => *lc,
		};

		base_encode(data, &lc, raw_tdulc);
		true
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::Group { .. } => "LC_GROUP (Group Voice Channel User)",
			Self::CallTerm => "LC_CALL_TERM (Call Termination)",
			Self::ExplicitSourceId { .. } => "LC_EXPLICIT_SOURCE_ID (Explicit Source ID)",
			Self::AdjStsBcast { .. } => "LC_ADJ_STS_BCAST (Adjacent Site Status Broadcast)",
			Self::IdenUp { .. } => "LC_IDEN_UP (Channel Identifier Update)",
			Self::Raw { .. } => "LC_TDULC_RAW (Raw Terminator Link Control)",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn group_round_trip_through_rs() {
		let lc = Tdulc::Group {
			mfid: 0,
			emergency: false,
			encrypted: false,
			priority: 4,
			dst_id: 50,
			src_id: 1001,
		};

		let mut data = [0u8; TDULC_FEC_LENGTH_BYTES];
		assert!(lc.encode(&SiteData::default(), &mut data, false));
		assert_eq!(Tdulc::decode(&data, false).unwrap(), lc);
	}

	#[test]
	fn group_survives_symbol_errors() {
		let lc = Tdulc::Group {
			mfid: 0,
			emergency: true,
			encrypted: false,
			priority: 7,
			dst_id: 0x2A2A,
			src_id: 0x0F4240,
		};
		let mut data = [0u8; TDULC_FEC_LENGTH_BYTES];
		assert!(lc.encode(&SiteData::default(), &mut data, false));

		data[0] ^= 0x3C;
		data[9] ^= 0x0F;
		assert_eq!(Tdulc::decode(&data, false).unwrap(), lc);
	}

	#[test]
	fn call_term_addresses_the_fne() {
		let mut data = [0u8; TDULC_FEC_LENGTH_BYTES];
		assert!(Tdulc::CallTerm.encode(&SiteData::default(), &mut data, false));
		match Tdulc::decode(&data, false).unwrap() {
			Tdulc::CallTerm => {}
			other => panic!("wrong variant: {}", other.name()),
		}
	}

	#[test]
	fn adj_sts_requires_neighbour_identity() {
		let lc = Tdulc::AdjStsBcast {
			adj_sys_id: 0,
			adj_rfss_id: 0,
			adj_site_id: 0,
			adj_ch_id: 0,
			adj_ch_no: 0,
			adj_svc_class: 0,
		};
		let mut data = [0u8; TDULC_FEC_LENGTH_BYTES];
		assert!(!lc.encode(&SiteData::default(), &mut data, false));
	}

	#[test]
	fn raw_passthrough() {
		let payload = [0x29u8, 0x00, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
		let lc = Tdulc::Raw { lc: payload };
		let mut data = [0u8; TDULC_LENGTH_BYTES];
		assert!(lc.encode(&SiteData::default(), &mut data, true));
		assert_eq!(data, payload);
	}
}
