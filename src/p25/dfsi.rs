//! DFSI (Digital Fixed Station Interface) framing for serial-over-IP
//! voice forwarding.
//!
//! The TIA frame family: a control octet, one or more block headers
//! (compact or verbose), a start-of-stream marker and full-rate voice
//! blocks carrying raw IMBE.

use crate::errors::DecodeError;

/// DFSI block types.
pub mod block_type {
	pub const FULL_RATE_VOICE: u8 = 0x00;
	pub const VOICE_HEADER_1: u8 = 0x60;
	pub const VOICE_HEADER_2: u8 = 0x61;
	pub const START_OF_STREAM: u8 = 0x09;
	pub const END_OF_STREAM: u8 = 0x25;
}

/// Leading control octet: `S | C | BHC(6)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlOctet {
	pub signal: bool,
	/// Compact (true) or verbose (false) block headers follow.
	pub compact: bool,
	pub block_header_cnt: u8,
}

impl ControlOctet {
	pub const LENGTH: usize = 1;

	pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
		if data.is_empty() {
			return Err(DecodeError::Format);
		}
		Ok(Self {
			signal: data[0] & 0x80 == 0x80,
			compact: data[0] & 0x40 == 0x40,
			block_header_cnt: data[0] & 0x3F,
		})
	}

	pub fn encode(&self, data: &mut [u8]) {
		data[0] = if self.signal { 0x80 } else { 0x00 }
			| if self.compact { 0x40 } else { 0x00 }
			| (self.block_header_cnt & 0x3F);
	}
}

/// Block header: compact form `E | BT(7)`, verbose form adds a 14-bit
/// timestamp offset and a 10-bit block length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHeader {
	pub payload: bool,
	pub block_type: u8,
	pub timestamp_offset: u16,
	pub block_length: u16,
}

impl BlockHeader {
	pub const LENGTH: usize = 1;
	pub const VERBOSE_LENGTH: usize = 4;

	pub fn decode(data: &[u8], verbose: bool) -> Result<Self, DecodeError> {
		let need = if verbose { Self::VERBOSE_LENGTH } else { Self::LENGTH };
		if data.len() < need {
			return Err(DecodeError::Format);
		}

		let mut hdr = Self {
			payload: data[0] & 0x80 == 0x80,
			block_type: data[0] & 0x7F,
			timestamp_offset: 0,
			block_length: 0,
		};
		if verbose {
			hdr.timestamp_offset =
				(u16::from(data[1]) << 6) | (u16::from(data[2]) >> 2);
			hdr.block_length = (u16::from(data[2] & 0x03) << 8) | u16::from(data[3]);
		}
		Ok(hdr)
	}

	pub fn encode(&self, data: &mut [u8], verbose: bool) {
		data[0] = if self.payload { 0x80 } else { 0x00 } | (self.block_type & 0x7F);
		if verbose {
			data[1] = (self.timestamp_offset >> 6) as u8;
			data[2] = ((self.timestamp_offset << 2) & 0xFC) as u8
				| ((self.block_length >> 8) & 0x03) as u8;
			data[3] = self.block_length as u8;
		}
	}
}

/// Start-of-stream marker: `NID(16) | Rsvd(4) | ErrC(4)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOfStream {
	pub nid: u16,
	pub error_count: u8,
}

impl StartOfStream {
	pub const LENGTH: usize = 4;

	pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
		if data.len() < Self::LENGTH {
			return Err(DecodeError::Format);
		}
		Ok(Self {
			nid: crate::bits::get_u16(data, 0),
			error_count: data[2] & 0x0F,
		})
	}

	pub fn encode(&self, data: &mut [u8]) {
		crate::bits::set_u16(self.nid, data, 0);
		data[2] = self.error_count & 0x0F;
		data[3] = 0;
	}
}

/// Full-rate voice block: frame type, raw IMBE and trailing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullRateVoice {
	pub frame_type: u8,
	pub imbe: [u8; 11],
	pub total_errors: u8,
	pub muted: bool,
	pub lost: bool,
}

impl FullRateVoice {
	pub const LENGTH: usize = 14;

	pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
		if data.len() < Self::LENGTH {
			return Err(DecodeError::Format);
		}

		let mut imbe = [0u8; 11];
		imbe.copy_from_slice(&data[1..12]);
		Ok(Self {
			frame_type: data[0],
			imbe,
			total_errors: (data[12] >> 5) & 0x07,
			muted: data[12] & 0x02 == 0x02,
			lost: data[12] & 0x01 == 0x01,
		})
	}

	pub fn encode(&self, data: &mut [u8]) {
		data[0] = self.frame_type;
		data[1..12].copy_from_slice(&self.imbe);
		data[12] = ((self.total_errors & 0x07) << 5)
			| if self.muted { 0x02 } else { 0x00 }
			| if self.lost { 0x01 } else { 0x00 };
		data[13] = 0;
	}
}

impl Default for FullRateVoice {
	fn default() -> Self {
		Self {
			frame_type: block_type::FULL_RATE_VOICE,
			imbe: crate::edac::ambe::NULL_IMBE_RAW,
			total_errors: 0,
			muted: false,
			lost: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn control_octet_round_trip() {
		let octet = ControlOctet {
			signal: true,
			compact: true,
			block_header_cnt: 3,
		};
		let mut buf = [0u8; 1];
		octet.encode(&mut buf);
		assert_eq!(buf[0], 0xC3);
		assert_eq!(ControlOctet::decode(&buf).unwrap(), octet);
	}

	#[test]
	fn verbose_block_header_round_trip() {
		let hdr = BlockHeader {
			payload: true,
			block_type: block_type::FULL_RATE_VOICE,
			timestamp_offset: 0x1234,
			block_length: 0x21A,
		};
		let mut buf = [0u8; 4];
		hdr.encode(&mut buf, true);
		assert_eq!(BlockHeader::decode(&buf, true).unwrap(), hdr);
	}

	#[test]
	fn compact_block_header_drops_extras() {
		let hdr = BlockHeader {
			payload: false,
			block_type: block_type::START_OF_STREAM,
			timestamp_offset: 99,
			block_length: 99,
		};
		let mut buf = [0u8; 1];
		hdr.encode(&mut buf, false);
		let decoded = BlockHeader::decode(&buf, false).unwrap();
		assert_eq!(decoded.block_type, block_type::START_OF_STREAM);
		assert_eq!(decoded.timestamp_offset, 0);
	}

	#[test]
	fn full_rate_voice_round_trip() {
		let voice = FullRateVoice {
			frame_type: block_type::FULL_RATE_VOICE,
			imbe: [9; 11],
			total_errors: 5,
			muted: false,
			lost: true,
		};
		let mut buf = [0u8; FullRateVoice::LENGTH];
		voice.encode(&mut buf);
		assert_eq!(FullRateVoice::decode(&buf).unwrap(), voice);
	}

	#[test]
	fn start_of_stream_round_trip() {
		let sos = StartOfStream {
			nid: 0x293B,
			error_count: 2,
		};
		let mut buf = [0u8; StartOfStream::LENGTH];
		sos.encode(&mut buf);
		assert_eq!(StartOfStream::decode(&buf).unwrap(), sos);
	}
}
