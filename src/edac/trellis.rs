//! Rate 3/4 and rate 1/2 trellis codes (P25 TSBK bodies, DMR rate-3/4 data).
//!
//! Both rates share the same structure: 49 4FSK constellation points carry
//! 48 payload symbols plus a zero terminator; the dibit stream is
//! interleaved on air. Decoding walks the trellis against the encode table
//! and, on a mismatch, runs a bounded fix-up that tries every alternative
//! point at the failing position, keeping whichever pushes the next
//! mismatch furthest, with a single-position backtrack as a last resort.

use crate::bits::{read_bit, write_bit};
use crate::errors::DecodeError;

const INTERLEAVE_TABLE: [usize; 98] = [
	0, 1, 8, 9, 16, 17, 24, 25, 32, 33, 40, 41, 48, 49, 56, 57, 64, 65, 72, 73, 80, 81, 88, 89,
	96, 97, 2, 3, 10, 11, 18, 19, 26, 27, 34, 35, 42, 43, 50, 51, 58, 59, 66, 67, 74, 75, 82, 83,
	90, 91, 4, 5, 12, 13, 20, 21, 28, 29, 36, 37, 44, 45, 52, 53, 60, 61, 68, 69, 76, 77, 84, 85,
	92, 93, 6, 7, 14, 15, 22, 23, 30, 31, 38, 39, 46, 47, 54, 55, 62, 63, 70, 71, 78, 79, 86, 87,
	94, 95,
];

const ENCODE_TABLE_34: [u8; 64] = [
	0, 8, 4, 12, 2, 10, 6, 14, //
	4, 12, 2, 10, 6, 14, 0, 8, //
	1, 9, 5, 13, 3, 11, 7, 15, //
	5, 13, 3, 11, 7, 15, 1, 9, //
	3, 11, 7, 15, 1, 9, 5, 13, //
	7, 15, 1, 9, 5, 13, 3, 11, //
	2, 10, 6, 14, 0, 8, 4, 12, //
	6, 14, 0, 8, 4, 12, 2, 10,
];

const ENCODE_TABLE_12: [u8; 16] = [
	0, 15, 12, 3, //
	4, 11, 8, 7, //
	13, 2, 1, 14, //
	9, 6, 5, 10,
];

/// Sentinel for "no mismatch found".
const NO_FAIL: usize = 999;

/// Maximum fix-up iterations before declaring the codeword irrecoverable.
const MAX_FIXES: usize = 20;

/// Decodes 196 on-air bits of rate-3/4 trellis into 18 payload bytes.
pub fn decode34(data: &[u8], payload: &mut [u8]) -> Result<(), DecodeError> {
	let mut dibits = [0i8; 98];
	deinterleave(data, &mut dibits);

	let mut points = [0u8; 49];
	dibits_to_points(&dibits, &mut points);

	let mut tribits = [0u8; 49];
	let fail_pos = check_code34(&points, &mut tribits);
	if fail_pos == NO_FAIL {
		tribits_to_bits(&tribits, payload);
		return Ok(());
	}

	let save_points = points;
	if fix_code34(&mut points, fail_pos, payload) {
		return Ok(());
	}

	if fail_pos == 0 {
		return Err(DecodeError::Irrecoverable);
	}

	// Backtrack one place for a last go
	let mut points = save_points;
	if fix_code34(&mut points, fail_pos - 1, payload) {
		Ok(())
	} else {
		Err(DecodeError::Irrecoverable)
	}
}

/// Encodes 18 payload bytes into 196 on-air bits of rate-3/4 trellis.
pub fn encode34(payload: &[u8], data: &mut [u8]) {
	let mut tribits = [0u8; 49];
	bits_to_tribits(payload, &mut tribits);

	let mut points = [0u8; 49];
	let mut state = 0u8;
	for (i, tribit) in tribits.iter().enumerate() {
		points[i] = ENCODE_TABLE_34[usize::from(state) * 8 + usize::from(*tribit)];
		state = *tribit;
	}

	let mut dibits = [0i8; 98];
	points_to_dibits(&points, &mut dibits);
	interleave(&dibits, data);
}

/// Decodes 196 on-air bits of rate-1/2 trellis into 12 payload bytes.
pub fn decode12(data: &[u8], payload: &mut [u8]) -> Result<(), DecodeError> {
	let mut dibits = [0i8; 98];
	deinterleave(data, &mut dibits);

	let mut points = [0u8; 49];
	dibits_to_points(&dibits, &mut points);

	let mut bits = [0u8; 49];
	let fail_pos = check_code12(&points, &mut bits);
	if fail_pos == NO_FAIL {
		dibits_to_bits(&bits, payload);
		return Ok(());
	}

	let save_points = points;
	if fix_code12(&mut points, fail_pos, payload) {
		return Ok(());
	}

	if fail_pos == 0 {
		return Err(DecodeError::Irrecoverable);
	}

	let mut points = save_points;
	if fix_code12(&mut points, fail_pos - 1, payload) {
		Ok(())
	} else {
		Err(DecodeError::Irrecoverable)
	}
}

/// Encodes 12 payload bytes into 196 on-air bits of rate-1/2 trellis.
pub fn encode12(payload: &[u8], data: &mut [u8]) {
	let mut bits = [0u8; 49];
	bits_to_dibits(payload, &mut bits);

	let mut points = [0u8; 49];
	let mut state = 0u8;
	for (i, bit) in bits.iter().enumerate() {
		points[i] = ENCODE_TABLE_12[usize::from(state) * 4 + usize::from(*bit)];
		state = *bit;
	}

	let mut dibits = [0i8; 98];
	points_to_dibits(&points, &mut dibits);
	interleave(&dibits, data);
}

fn deinterleave(data: &[u8], dibits: &mut [i8; 98]) {
	for i in 0..98 {
		let b1 = read_bit(data, i * 2);
		let b2 = read_bit(data, i * 2 + 1);

		let dibit = match (b1, b2) {
			(false, true) => 3,
			(false, false) => 1,
			(true, false) => -1,
			(true, true) => -3,
		};

		dibits[INTERLEAVE_TABLE[i]] = dibit;
	}
}

fn interleave(dibits: &[i8; 98], data: &mut [u8]) {
	for i in 0..98 {
		let (b1, b2) = match dibits[INTERLEAVE_TABLE[i]] {
			3 => (false, true),
			1 => (false, false),
			-1 => (true, false),
			_ => (true, true),
		};

		write_bit(data, i * 2, b1);
		write_bit(data, i * 2 + 1, b2);
	}
}

/// 4FSK dibit pair to constellation point, one point per table row.
const POINT_TABLE: [(i8, i8); 16] = [
	(1, -1),
	(-1, -1),
	(3, -3),
	(-3, -3),
	(-3, -1),
	(3, -1),
	(-1, -3),
	(1, -3),
	(-3, 3),
	(3, 3),
	(-1, 1),
	(1, 1),
	(1, 3),
	(-1, 3),
	(3, 1),
	(-3, 1),
];

fn dibits_to_points(dibits: &[i8; 98], points: &mut [u8; 49]) {
	for i in 0..49 {
		let pair = (dibits[i * 2], dibits[i * 2 + 1]);
		for (point, entry) in POINT_TABLE.iter().enumerate() {
			if pair == *entry {
				points[i] = point as u8;
				break;
			}
		}
	}
}

fn points_to_dibits(points: &[u8; 49], dibits: &mut [i8; 98]) {
	for i in 0..49 {
		let (d1, d2) = POINT_TABLE[usize::from(points[i]) & 0x0F];
		dibits[i * 2] = d1;
		dibits[i * 2 + 1] = d2;
	}
}

fn bits_to_tribits(payload: &[u8], tribits: &mut [u8; 49]) {
	for (i, tribit) in tribits.iter_mut().take(48).enumerate() {
		let n = i * 3;
		let mut t = 0u8;
		if read_bit(payload, n) {
			t |= 4;
		}
		if read_bit(payload, n + 1) {
			t |= 2;
		}
		if read_bit(payload, n + 2) {
			t |= 1;
		}
		*tribit = t;
	}
	tribits[48] = 0;
}

fn bits_to_dibits(payload: &[u8], dibits: &mut [u8; 49]) {
	for (i, dibit) in dibits.iter_mut().take(48).enumerate() {
		let n = i * 2;
		let mut d = 0u8;
		if read_bit(payload, n) {
			d |= 2;
		}
		if read_bit(payload, n + 1) {
			d |= 1;
		}
		*dibit = d;
	}
	dibits[48] = 0;
}

fn tribits_to_bits(tribits: &[u8; 49], payload: &mut [u8]) {
	for (i, tribit) in tribits.iter().take(48).enumerate() {
		let n = i * 3;
		write_bit(payload, n, tribit & 4 != 0);
		write_bit(payload, n + 1, tribit & 2 != 0);
		write_bit(payload, n + 2, tribit & 1 != 0);
	}
}

fn dibits_to_bits(dibits: &[u8; 49], payload: &mut [u8]) {
	for (i, dibit) in dibits.iter().take(48).enumerate() {
		let n = i * 2;
		write_bit(payload, n, dibit & 2 != 0);
		write_bit(payload, n + 1, dibit & 1 != 0);
	}
}

/// Walks the 8-state trellis; returns the first failing symbol position or
/// [`NO_FAIL`] when the chain (including the zero terminator) closes.
fn check_code34(points: &[u8; 49], tribits: &mut [u8; 49]) -> usize {
	let mut state = 0u8;

	for i in 0..49 {
		tribits[i] = 9;

		for j in 0..8u8 {
			if points[i] == ENCODE_TABLE_34[usize::from(state) * 8 + usize::from(j)] {
				tribits[i] = j;
				break;
			}
		}

		if tribits[i] == 9 {
			return i;
		}

		state = tribits[i];
	}

	if tribits[48] != 0 {
		return 48;
	}

	NO_FAIL
}

fn fix_code34(points: &mut [u8; 49], mut fail_pos: usize, payload: &mut [u8]) -> bool {
	for _ in 0..MAX_FIXES {
		let mut best_pos = 0;
		let mut best_val = 0u8;

		for i in 0..16u8 {
			points[fail_pos] = i;

			let mut tribits = [0u8; 49];
			let pos = check_code34(points, &mut tribits);
			if pos == NO_FAIL {
				tribits_to_bits(&tribits, payload);
				return true;
			}

			if pos > best_pos {
				best_pos = pos;
				best_val = i;
			}
		}

		points[fail_pos] = best_val;
		fail_pos = best_pos;
	}

	false
}

fn check_code12(points: &[u8; 49], dibits: &mut [u8; 49]) -> usize {
	let mut state = 0u8;

	for i in 0..49 {
		dibits[i] = 5;

		for j in 0..4u8 {
			if points[i] == ENCODE_TABLE_12[usize::from(state) * 4 + usize::from(j)] {
				dibits[i] = j;
				break;
			}
		}

		if dibits[i] == 5 {
			return i;
		}

		state = dibits[i];
	}

	if dibits[48] != 0 {
		return 48;
	}

	NO_FAIL
}

fn fix_code12(points: &mut [u8; 49], mut fail_pos: usize, payload: &mut [u8]) -> bool {
	for _ in 0..MAX_FIXES {
		let mut best_pos = 0;
		let mut best_val = 0u8;

		for i in 0..4u8 {
			points[fail_pos] = i;

			let mut dibits = [0u8; 49];
			let pos = check_code12(points, &mut dibits);
			if pos == NO_FAIL {
				dibits_to_bits(&dibits, payload);
				return true;
			}

			if pos > best_pos {
				best_pos = pos;
				best_val = i;
			}
		}

		points[fail_pos] = best_val;
		fail_pos = best_pos;
	}

	false
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rate34_round_trip() {
		let payload: [u8; 18] = [
			0x3D, 0x01, 0x22, 0xA8, 0x55, 0x00, 0x7F, 0x10, 0x99, 0xC3, 0x04, 0x62, 0xEE, 0x1B,
			0x30, 0x48, 0x5A, 0x6D,
		];
		let mut data = [0u8; 25];
		encode34(&payload, &mut data);

		let mut out = [0u8; 18];
		decode34(&data, &mut out).unwrap();
		assert_eq!(out, payload);
	}

	#[test]
	fn rate34_corrects_one_corrupted_symbol() {
		let payload: [u8; 18] = [
			0x10, 0x32, 0x54, 0x76, 0x98, 0xBA, 0xDC, 0xFE, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
			0x66, 0x77, 0x88, 0x99,
		];
		let mut data = [0u8; 25];
		encode34(&payload, &mut data);

		// corrupt both bits of one on-air dibit
		data[6] ^= 0xC0;

		let mut out = [0u8; 18];
		decode34(&data, &mut out).unwrap();
		assert_eq!(out, payload);
	}

	#[test]
	fn rate34_fixup_terminates_on_garbage() {
		// arbitrary noise must either decode or fail cleanly, never hang
		let mut data = [0u8; 25];
		for (i, byte) in data.iter_mut().enumerate() {
			*byte = (i as u8).wrapping_mul(37).wrapping_add(101);
		}
		let mut out = [0u8; 18];
		let _ = decode34(&data, &mut out);
	}

	#[test]
	fn rate12_round_trip() {
		let payload: [u8; 12] = [
			0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF,
		];
		let mut data = [0u8; 25];
		encode12(&payload, &mut data);

		let mut out = [0u8; 12];
		decode12(&data, &mut out).unwrap();
		assert_eq!(out, payload);
	}

	#[test]
	fn rate12_corrects_one_corrupted_symbol() {
		let payload: [u8; 12] = [0x0F, 0xF0, 0x3C, 0xC3, 0xA5, 0x5A, 0x00, 0xFF, 0x12, 0x34, 0x56, 0x78];
		let mut data = [0u8; 25];
		encode12(&payload, &mut data);

		data[6] ^= 0x30;

		let mut out = [0u8; 12];
		decode12(&data, &mut out).unwrap();
		assert_eq!(out, payload);
	}
}
