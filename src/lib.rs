//! Real-time digital voice trunking core for DMR (ETSI TS 102 361),
//! P25 (TIA-102) and NXDN (TIA-TSB-102).
//!
//! The crate terminates the three bit-level air-interface protocols toward a
//! radio modem on one side and the FNE (Fixed Network Equipment) wide-area
//! fabric on the other: framing/deframing with forward error correction,
//! trunking control signalling, per-slot call state machines and the
//! grant/affiliation bookkeeping that backs a trunked site.
//!
//! The core is single-threaded and cooperative: one [`host::Host`] owns the
//! per-protocol controllers and clocks them from a millisecond tick. The
//! modem port and the FNE socket live outside the crate behind the
//! [`modem::ModemPort`] and datagram interfaces.

#![warn(rust_2018_idioms)]

// EXTERNAL CRATES
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod bits;
pub mod dmr;
pub mod edac;
pub mod errors;
pub mod host;
pub mod logging;
pub mod lookups;
pub mod modem;
pub mod network;
pub mod nxdn;
pub mod p25;
pub mod sync;
pub mod timers;

pub use errors::{DecodeError, HostError, NetworkError};

/// Crate version, surfaced by the admin GET interface.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repeater RF channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfState {
	Listening,
	LateEntry,
	Audio,
	Data,
	Rejected,
	Invalid,
}

/// Repeater network channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetState {
	Idle,
	Audio,
	Data,
}

/// Length of a site callsign, in characters.
pub const CALLSIGN_LENGTH: usize = 8;

/// Static identity of the site this host is serving.
///
/// Immutable after boot; shared by all protocol controllers.
#[derive(Debug, Clone)]
pub struct SiteData {
	/// P25 Wide Area Communications Network ID (20 bits).
	pub net_id: u32,
	/// System ID (12 bits).
	pub sys_id: u32,
	/// RF Sub-System ID.
	pub rfss_id: u8,
	/// Site ID.
	pub site_id: u8,
	/// Channel identity (4 bits).
	pub channel_id: u8,
	/// Channel number (12 bits).
	pub channel_no: u32,
	/// System service class bits.
	pub service_class: u8,
	/// Location registration area.
	pub lra: u8,
	/// Local time offset from UTC, in half-hour steps.
	pub lto: i8,
	/// Whether the site participates in a network.
	pub net_active: bool,
	/// NXDN location ID composite (24 bits).
	pub loc_id: u32,
	/// NXDN Radio Access Number.
	pub ran: u8,
	/// Site callsign, space padded.
	pub callsign: [u8; CALLSIGN_LENGTH],
}

impl SiteData {
	pub fn new(
		net_id: u32,
		sys_id: u32,
		rfss_id: u8,
		site_id: u8,
		channel_id: u8,
		channel_no: u32,
	) -> Self {
		Self {
			net_id: net_id & 0xFFFFF,
			sys_id: sys_id & 0xFFF,
			rfss_id,
			site_id,
			channel_id: channel_id & 0x0F,
			channel_no: channel_no & 0xFFF,
			service_class: 0,
			lra: 0,
			lto: 0,
			net_active: false,
			loc_id: 0,
			ran: 1,
			callsign: *b"CHANGEME",
		}
	}

	pub fn set_callsign(&mut self, callsign: &str) {
		let mut cs = [b' '; CALLSIGN_LENGTH];
		for (dst, src) in cs.iter_mut().zip(callsign.bytes()) {
			*dst = src.to_ascii_uppercase();
		}
		self.callsign = cs;
	}
}

impl Default for SiteData {
	fn default() -> Self {
		Self::new(0xBB800, 0x001, 1, 1, 1, 1)
	}
}

/// P25 channel identity table entry, used by IDEN_UP broadcasts and the
/// SNDCP data channel frequency math.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IdenEntry {
	/// Channel identity (4 bits).
	pub channel_id: u8,
	/// Base frequency, in Hz.
	pub base_frequency: u32,
	/// Transmit offset, in MHz.
	pub tx_offset_mhz: f32,
	/// Channel bandwidth, in kHz.
	pub ch_bandwidth_khz: f32,
	/// Channel spacing, in kHz.
	pub ch_space_khz: f32,
}

impl IdenEntry {
	/// An entry is usable once every field carries a real value.
	pub fn is_valid(&self) -> bool {
		self.base_frequency != 0
			&& self.ch_bandwidth_khz != 0.0
			&& self.ch_space_khz != 0.0
			&& self.tx_offset_mhz != 0.0
	}
}
