//! Error detection and correction codecs for the three air interfaces.
//!
//! Every decoder reports [`DecodeError`](crate::errors::DecodeError) and
//! touches nothing outside the slices it is handed.

pub mod ambe;
pub mod bch;
pub mod bptc;
pub mod crc;
pub mod golay;
pub mod hamming;
pub mod qr1676;
pub mod rs634717;
pub mod trellis;
