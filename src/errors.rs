//! Error types shared across the trunking core.

use thiserror::Error;

/// Failure modes of the bit-level codecs.
///
/// Every decoder in [`crate::edac`] and the link-control layer reports one
/// of these; the frame is dropped before state-machine dispatch and the
/// machine stays in its prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
	/// FEC chainback failed (trellis fix-up exhausted, BPTC uncorrectable).
	#[error("uncorrectable codeword")]
	Irrecoverable,
	/// A protected CRC did not verify.
	#[error("CRC check failed")]
	Crc,
	/// Wrong length, reserved-bit violation or unknown opcode.
	#[error("malformed frame")]
	Format,
}

/// Failure modes of the FNE wire framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NetworkError {
	#[error("datagram shorter than the RTP preamble")]
	Truncated,
	#[error("unsupported RTP version")]
	RtpVersion,
	#[error("extension payload type is not DVM_FRAME_START")]
	NotDvmFrame,
	#[error("extension length field does not cover the FNE header")]
	ExtensionLength,
	#[error("FNE message CRC mismatch")]
	Crc,
	#[error("message length field exceeds the datagram")]
	MessageLength,
}

/// Unrecoverable startup conditions; the outer shell terminates on these.
#[derive(Debug, Error)]
pub enum HostError {
	#[error("configuration rejected: {0}")]
	Config(String),
	#[error("ACLs enabled but no lookup tables were supplied")]
	MissingLookups,
	#[error("modem port open failure: {0}")]
	ModemOpen(std::io::Error),
}
