//! BPTC (196,96), the block product turbo code behind DMR data bursts.
//!
//! 96 data bits live in a 13×15 matrix (one reserved leading bit):
//! Hamming(15,11,3) across each of the 9 data rows, Hamming(13,9,3) down
//! each of the 15 columns. On air the 196 bits are interleaved and split
//! around the burst's sync/slot-type field.

use super::hamming;
use crate::bits::{read_bit, write_bit};
use crate::errors::DecodeError;

/// Decodes a 33-byte DMR burst payload region into 12 data bytes.
pub fn decode(data: &[u8], payload: &mut [u8]) -> Result<(), DecodeError> {
	debug_assert!(data.len() >= 33);
	debug_assert!(payload.len() >= 12);

	let mut raw = [false; 196];
	extract_binary(data, &mut raw);

	let mut deinter = [false; 196];
	deinterleave(&raw, &mut deinter);

	error_check(&mut deinter)?;

	extract_data(&deinter, payload);
	Ok(())
}

/// Encodes 12 data bytes into the payload region of a 33-byte DMR burst.
pub fn encode(payload: &[u8], data: &mut [u8]) {
	debug_assert!(payload.len() >= 12);
	debug_assert!(data.len() >= 33);

	let mut deinter = [false; 196];
	insert_data(payload, &mut deinter);

	// rows first, then the columns cover the fresh row parity
	for r in 0..9 {
		let pos = r * 15 + 1;
		hamming::encode15113(&mut deinter[pos..pos + 15]);
	}
	for c in 0..15 {
		let mut col = [false; 13];
		for (a, bit) in col.iter_mut().enumerate() {
			*bit = deinter[c + 1 + a * 15];
		}
		hamming::encode1393(&mut col);
		for (a, bit) in col.iter().enumerate() {
			deinter[c + 1 + a * 15] = *bit;
		}
	}

	let mut raw = [false; 196];
	interleave(&deinter, &mut raw);
	insert_binary(&raw, data);
}

/// The payload region skips the 68-bit sync/slot-type field in the middle
/// of the burst.
fn extract_binary(data: &[u8], raw: &mut [bool; 196]) {
	for (i, bit) in raw.iter_mut().enumerate() {
		let n = if i < 98 { i } else { i + 68 };
		*bit = read_bit(data, n);
	}
}

fn insert_binary(raw: &[bool; 196], data: &mut [u8]) {
	for (i, bit) in raw.iter().enumerate() {
		let n = if i < 98 { i } else { i + 68 };
		write_bit(data, n, *bit);
	}
}

fn deinterleave(raw: &[bool; 196], deinter: &mut [bool; 196]) {
	for i in 0..196 {
		deinter[i] = raw[(i * 181) % 196];
	}
}

fn interleave(deinter: &[bool; 196], raw: &mut [bool; 196]) {
	for i in 0..196 {
		raw[(i * 181) % 196] = deinter[i];
	}
}

/// Iterates row/column correction until the matrix settles.
fn error_check(deinter: &mut [bool; 196]) -> Result<(), DecodeError> {
	let mut fixing = true;
	let mut passes = 0;

	while fixing && passes < 5 {
		fixing = false;

		for c in 0..15 {
			let mut col = [false; 13];
			for (a, bit) in col.iter_mut().enumerate() {
				*bit = deinter[c + 1 + a * 15];
			}
			let before = col;
			if !hamming::decode1393(&mut col) {
				return Err(DecodeError::Irrecoverable);
			}
			if col != before {
				fixing = true;
				for (a, bit) in col.iter().enumerate() {
					deinter[c + 1 + a * 15] = *bit;
				}
			}
		}

		for r in 0..9 {
			let pos = r * 15 + 1;
			let mut row = [false; 15];
			row.copy_from_slice(&deinter[pos..pos + 15]);
			let before = row;
			if !hamming::decode15113(&mut row) {
				return Err(DecodeError::Irrecoverable);
			}
			if row != before {
				fixing = true;
				deinter[pos..pos + 15].copy_from_slice(&row);
			}
		}

		passes += 1;
	}

	Ok(())
}

fn extract_data(deinter: &[bool; 196], payload: &mut [u8]) {
	let mut n = 0;
	for a in 4..12 {
		write_bit(payload, n, deinter[a]);
		n += 1;
	}
	for r in 1..9 {
		let pos = r * 15 + 1;
		for a in 0..11 {
			write_bit(payload, n, deinter[pos + a]);
			n += 1;
		}
	}
}

fn insert_data(payload: &[u8], deinter: &mut [bool; 196]) {
	let mut n = 0;
	for a in 4..12 {
		deinter[a] = read_bit(payload, n);
		n += 1;
	}
	for r in 1..9 {
		let pos = r * 15 + 1;
		for a in 0..11 {
			deinter[pos + a] = read_bit(payload, n);
			n += 1;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let payload: [u8; 12] = [
			0xBD, 0x00, 0x80, 0x9A, 0x10, 0xA0, 0x00, 0x4F, 0xD7, 0xDF, 0x75, 0xF2,
		];
		let mut frame = [0u8; 33];
		encode(&payload, &mut frame);

		let mut out = [0u8; 12];
		decode(&frame, &mut out).unwrap();
		assert_eq!(out, payload);
	}

	#[test]
	fn corrects_scattered_bit_errors() {
		let payload: [u8; 12] = [
			0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC,
		];
		let mut frame = [0u8; 33];
		encode(&payload, &mut frame);

		// one flipped bit in each half of the burst
		frame[2] ^= 0x10;
		frame[30] ^= 0x02;

		let mut out = [0u8; 12];
		decode(&frame, &mut out).unwrap();
		assert_eq!(out, payload);
	}

	#[test]
	fn leaves_the_sync_region_untouched(){
		let payload = [0xFFu8; 12];
		let mut frame = [0u8; 33];
		// paint the sync/slot-type region and verify the encoder skips it
		for n in 98..166 {
			write_bit(&mut frame, n, true);
		}
		encode(&payload, &mut frame);
		for n in 98..166 {
			assert!(read_bit(&frame, n));
		}
	}
}
