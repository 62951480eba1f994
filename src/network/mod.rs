//! FNE network multiplex.
//!
//! Every datagram to or from the FNE is `RTP ‖ RTP-EXT ‖ FNE-EXT ‖ message`
//! (§ [`rtp`]). This module owns packet assembly and validation, the
//! opcode namespace routing messages into the protocol stacks, and the
//! request-with-deadline model for grant RPCs to voice-channel peers.

pub mod rtp;

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::{Rng, SeedableRng};

use crate::edac::crc;
use crate::errors::NetworkError;
use crate::lookups::VoiceChData;
use rtp::{
	DVM_FRAME_START, FNE_PREAMBLE_LENGTH, RTP_EXTENSION_HEADER_LENGTH, RTP_FNE_HEADER_WORDS,
	RTP_GENERIC_CLOCK_RATE, RTP_HEADER_LENGTH, RtpExtensionHeader, RtpFneHeader, RtpHeader,
};

/// Network function opcodes (FNE header `func`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum NetFunc {
	/// Protocol voice/data traffic; subfunc selects the protocol.
	Protocol = 0x00,
	/// Grant control toward voice channels.
	Grant = 0x10,
	/// Affiliation/registration announcements.
	Announce = 0x20,
	/// Peer registration handshake (outside the core).
	PeerLink = 0x60,
	/// Keepalive ping.
	Ping = 0x74,
	/// Keepalive pong.
	Pong = 0x75,
	/// Positive acknowledgement.
	Ack = 0x7E,
	/// Negative acknowledgement.
	Nak = 0x7F,
}

/// Protocol subfunctions under [`NetFunc::Protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum NetSubFunc {
	Dmr = 0x00,
	P25 = 0x01,
	Nxdn = 0x02,
}

/// Announcement subfunctions under [`NetFunc::Announce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AnnounceSubFunc {
	GroupAffiliation = 0x00,
	UnitRegistration = 0x01,
	UnitDeregistration = 0x02,
	GroupUnaffiliation = 0x03,
	AffiliationUpdate = 0x90,
}

/// RTP payload types, namespaced per message kind.
pub mod payload_type {
	pub const DMR_VOICE: u8 = 0x56;
	pub const P25_VOICE: u8 = 0x57;
	pub const NXDN_VOICE: u8 = 0x58;
	pub const TRUNK_CONTROL: u8 = 0x59;
	pub const KEEPALIVE: u8 = 0x5A;
	pub const REGISTRATION: u8 = 0x5B;
	pub const GRANT: u8 = 0x5C;
	pub const KEY_MANAGEMENT: u8 = 0x5D;
}

/// RPC operation codes toward voice-channel peers.
pub mod rpc {
	pub const RPC_PERMIT_P25_TG: u16 = 0x0001;
	pub const RPC_PERMIT_DMR_TG: u16 = 0x0002;
	pub const RPC_PERMIT_NXDN_TG: u16 = 0x0003;
	pub const RPC_DMR_TSCC_PAYLOAD_ACT: u16 = 0x0010;
	pub const RPC_RELEASE_P25_TG: u16 = 0x0101;
	pub const RPC_RELEASE_DMR_TG: u16 = 0x0102;
	pub const RPC_RELEASE_NXDN_TG: u16 = 0x0103;
	pub const RPC_TOUCH_P25_TG: u16 = 0x0201;
	pub const RPC_TOUCH_DMR_TG: u16 = 0x0202;
	pub const RPC_TOUCH_NXDN_TG: u16 = 0x0203;
	pub const RPC_REGISTER_CC_VC: u16 = 0x1000;
}

/// A grant-control RPC request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcOp {
	pub op: u16,
	pub dst_id: u32,
	pub slot: u8,
}

/// Hard deadline on grant-emission RPCs; the main loop never waits longer.
pub const RPC_DEADLINE: Duration = Duration::from_millis(500);

/// Blocking request-with-deadline transport toward a voice-channel peer.
///
/// The only blocking call the core ever makes; implementations must return
/// by the deadline.
pub trait PeerRpc: Send {
	fn request(&mut self, target: &VoiceChData, op: RpcOp, deadline: Duration) -> io::Result<()>;
}

/// A parsed inbound FNE message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FneMessage<'a> {
	pub rtp: RtpHeader,
	pub fne: RtpFneHeader,
	pub message: &'a [u8],
}

/// Validates a datagram per the FNE framing rules.
pub fn parse_frame(data: &[u8]) -> Result<FneMessage<'_>, NetworkError> {
	if data.len() < FNE_PREAMBLE_LENGTH {
		return Err(NetworkError::Truncated);
	}

	let rtp = RtpHeader::decode(data)?;

	let ext = RtpExtensionHeader::decode(&data[RTP_HEADER_LENGTH..])?;
	if ext.payload_type != DVM_FRAME_START {
		return Err(NetworkError::NotDvmFrame);
	}
	if ext.payload_length != RTP_FNE_HEADER_WORDS {
		return Err(NetworkError::ExtensionLength);
	}

	let fne = RtpFneHeader::decode(&data[RTP_HEADER_LENGTH + RTP_EXTENSION_HEADER_LENGTH..])?;

	let message = &data[FNE_PREAMBLE_LENGTH..];
	if (fne.message_length as usize) > message.len() {
		return Err(NetworkError::MessageLength);
	}
	let message = &message[..fne.message_length as usize];

	if !message.is_empty() && crc::create_crc16(message, message.len() * 8) != fne.crc16 {
		return Err(NetworkError::Crc);
	}

	Ok(FneMessage { rtp, fne, message })
}

/// Outbound packet assembly toward the FNE.
///
/// Owns the per-process sequence counters, the RTP timestamp base and the
/// stream-id generator; queues finished datagrams for the socket pump.
pub struct FneNetwork {
	peer_id: u32,
	ssrc: u32,
	seq: u16,
	ts_offset: u32,
	epoch: Instant,
	rng: ChaCha8Rng,
	outbound: VecDeque<Vec<u8>>,
}

impl FneNetwork {
	pub fn new(peer_id: u32) -> Self {
		let mut seed = [0u8; 32];
		// seeded from the wall clock; stream IDs need uniqueness, not secrecy
		let nanos = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
			.unwrap_or(0x5EED_1D)
			.wrapping_add(peer_id);
		for (i, b) in seed.iter_mut().enumerate() {
			*b = (nanos.rotate_left(i as u32) & 0xFF) as u8 ^ (i as u8);
		}
		let mut rng = ChaCha8Rng::from_seed(seed);
		let ts_offset = rng.next_u32();

		Self {
			peer_id,
			ssrc: peer_id,
			seq: 0,
			ts_offset,
			epoch: Instant::now(),
			rng,
			outbound: VecDeque::new(),
		}
	}

	pub fn peer_id(&self) -> u32 {
		self.peer_id
	}

	/// A fresh stream ID for a new logical call.
	pub fn create_stream_id(&mut self) -> u32 {
		loop {
			let id = self.rng.next_u32();
			if id != 0 {
				return id;
			}
		}
	}

	/// Microsecond monotonic clock scaled to the 8 kHz RTP clock.
	fn rtp_timestamp(&self) -> u32 {
		let micros = self.epoch.elapsed().as_micros() as u64;
		self.ts_offset
			.wrapping_add((micros * RTP_GENERIC_CLOCK_RATE / 1_000_000) as u32)
	}

	/// Assembles `RTP ‖ RTP-EXT ‖ FNE-EXT ‖ message` and queues it.
	pub fn write_frame(
		&mut self,
		payload_type: u8,
		func: NetFunc,
		subfunc: u8,
		stream_id: u32,
		message: &[u8],
	) {
		let mut frame = vec![0u8; FNE_PREAMBLE_LENGTH + message.len()];

		let mut rtp = RtpHeader::new(payload_type);
		rtp.seq = self.seq;
		self.seq = self.seq.wrapping_add(1);
		rtp.timestamp = self.rtp_timestamp();
		rtp.ssrc = self.ssrc;
		rtp.encode(&mut frame);

		let ext = RtpExtensionHeader {
			payload_type: DVM_FRAME_START,
			payload_length: RTP_FNE_HEADER_WORDS,
		};
		ext.encode(&mut frame[RTP_HEADER_LENGTH..]);

		let fne = RtpFneHeader {
			crc16: crc::create_crc16(message, message.len() * 8),
			func: func.into(),
			subfunc,
			stream_id,
			peer_id: self.peer_id,
			message_length: message.len() as u32,
		};
		fne.encode(&mut frame[RTP_HEADER_LENGTH + RTP_EXTENSION_HEADER_LENGTH..]);

		frame[FNE_PREAMBLE_LENGTH..].copy_from_slice(message);
		self.outbound.push_back(frame);
	}

	/// Queues protocol traffic (voice/data/control) for one protocol.
	pub fn write_protocol(&mut self, subfunc: NetSubFunc, stream_id: u32, message: &[u8]) {
		let pt = match subfunc {
			NetSubFunc::Dmr => payload_type::DMR_VOICE,
			NetSubFunc::P25 => payload_type::P25_VOICE,
			NetSubFunc::Nxdn => payload_type::NXDN_VOICE,
		};
		self.write_frame(pt, NetFunc::Protocol, subfunc.into(), stream_id, message);
	}

	/// Non-authoritative hosts ask the FNE for a grant decision instead of
	/// deciding locally.
	pub fn write_grant_req(
		&mut self,
		subfunc: NetSubFunc,
		src_id: u32,
		dst_id: u32,
		slot: u8,
		unit_to_unit: bool,
	) {
		let mut message = [0u8; 11];
		message[0] = subfunc.into();
		crate::bits::set_u32(src_id, &mut message, 1);
		crate::bits::set_u32(dst_id, &mut message, 5);
		message[9] = slot;
		message[10] = u8::from(unit_to_unit);

		let stream_id = self.create_stream_id();
		self.write_frame(
			payload_type::GRANT,
			NetFunc::Grant,
			subfunc.into(),
			stream_id,
			&message,
		);
	}

	/// Announces a group affiliation to the FNE.
	pub fn announce_group_affiliation(&mut self, src_id: u32, dst_id: u32) {
		let mut message = [0u8; 8];
		crate::bits::set_u32(src_id, &mut message, 0);
		crate::bits::set_u32(dst_id, &mut message, 4);
		let stream_id = self.create_stream_id();
		self.write_frame(
			payload_type::REGISTRATION,
			NetFunc::Announce,
			AnnounceSubFunc::GroupAffiliation.into(),
			stream_id,
			&message,
		);
	}

	/// Announces a unit registration to the FNE.
	pub fn announce_unit_registration(&mut self, src_id: u32) {
		let mut message = [0u8; 4];
		crate::bits::set_u32(src_id, &mut message, 0);
		let stream_id = self.create_stream_id();
		self.write_frame(
			payload_type::REGISTRATION,
			NetFunc::Announce,
			AnnounceSubFunc::UnitRegistration.into(),
			stream_id,
			&message,
		);
	}

	pub fn announce_unit_deregistration(&mut self, src_id: u32) {
		let mut message = [0u8; 4];
		crate::bits::set_u32(src_id, &mut message, 0);
		let stream_id = self.create_stream_id();
		self.write_frame(
			payload_type::REGISTRATION,
			NetFunc::Announce,
			AnnounceSubFunc::UnitDeregistration.into(),
			stream_id,
			&message,
		);
	}

	/// Next finished datagram for the socket pump.
	pub fn poll_outbound(&mut self) -> Option<Vec<u8>> {
		self.outbound.pop_front()
	}

	pub fn outbound_len(&self) -> usize {
		self.outbound.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn frame_round_trip() {
		let mut net = FneNetwork::new(9_000_100);
		let stream = net.create_stream_id();
		net.write_protocol(NetSubFunc::P25, stream, &[0x64, 0x73, 0x0A]);

		let frame = net.poll_outbound().unwrap();
		let parsed = parse_frame(&frame).unwrap();
		assert_eq!(parsed.fne.peer_id, 9_000_100);
		assert_eq!(parsed.fne.stream_id, stream);
		assert_eq!(parsed.fne.func, u8::from(NetFunc::Protocol));
		assert_eq!(parsed.fne.subfunc, u8::from(NetSubFunc::P25));
		assert_eq!(parsed.message, &[0x64, 0x73, 0x0A]);
	}

	#[test]
	fn sequence_increments_per_frame() {
		let mut net = FneNetwork::new(1);
		net.write_protocol(NetSubFunc::Dmr, 5, &[0u8; 4]);
		net.write_protocol(NetSubFunc::Dmr, 5, &[0u8; 4]);

		let a = parse_frame(&net.poll_outbound().unwrap()).unwrap().rtp.seq;
		let frame = net.poll_outbound().unwrap();
		let b = parse_frame(&frame).unwrap().rtp.seq;
		assert_eq!(b, a.wrapping_add(1));
	}

	#[test]
	fn rejects_wrong_magic() {
		let mut net = FneNetwork::new(1);
		net.write_protocol(NetSubFunc::Dmr, 5, &[1, 2, 3]);
		let mut frame = net.poll_outbound().unwrap();

		frame[RTP_HEADER_LENGTH] = 0x00; // clobber DVM_FRAME_START
		assert_eq!(parse_frame(&frame), Err(NetworkError::NotDvmFrame));
	}

	#[test]
	fn rejects_wrong_extension_length() {
		let mut net = FneNetwork::new(1);
		net.write_protocol(NetSubFunc::Dmr, 5, &[1, 2, 3]);
		let mut frame = net.poll_outbound().unwrap();

		frame[RTP_HEADER_LENGTH + 3] = 9;
		assert_eq!(parse_frame(&frame), Err(NetworkError::ExtensionLength));
	}

	#[test]
	fn rejects_corrupt_body() {
		let mut net = FneNetwork::new(1);
		net.write_protocol(NetSubFunc::Nxdn, 5, &[1, 2, 3, 4]);
		let mut frame = net.poll_outbound().unwrap();

		let last = frame.len() - 1;
		frame[last] ^= 0xFF;
		assert_eq!(parse_frame(&frame), Err(NetworkError::Crc));
	}

	#[test]
	fn rejects_short_message_length_field() {
		let mut net = FneNetwork::new(1);
		net.write_protocol(NetSubFunc::Nxdn, 5, &[1, 2, 3, 4]);
		let mut frame = net.poll_outbound().unwrap();

		// message_length claims more than the datagram holds
		let off = RTP_HEADER_LENGTH + RTP_EXTENSION_HEADER_LENGTH + 12;
		frame[off + 3] = 200;
		assert_eq!(parse_frame(&frame), Err(NetworkError::MessageLength));
	}

	#[test]
	fn stream_ids_are_nonzero_and_distinct() {
		let mut net = FneNetwork::new(1);
		let a = net.create_stream_id();
		let b = net.create_stream_id();
		assert_ne!(a, 0);
		assert_ne!(a, b);
	}
}
