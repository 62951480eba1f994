//! Reed-Solomon codes over GF(2^6) protecting the P25 link-control and
//! encryption-sync words: RS(24,12,13), RS(24,16,9) and RS(36,20,17),
//! all shortenings of RS(63,·) with 6-bit "hexbit" symbols.

use std::sync::OnceLock;

use crate::errors::DecodeError;

/// GF(2^6) primitive polynomial x^6 + x + 1.
const GF64_POLY: u8 = 0x03;

struct Tables {
	exp: [u8; 126],
	log: [u8; 64],
}

fn tables() -> &'static Tables {
	static TABLES: OnceLock<Tables> = OnceLock::new();
	TABLES.get_or_init(|| {
		let mut t = Tables {
			exp: [0; 126],
			log: [0; 64],
		};
		let mut x = 1u8;
		for i in 0..63 {
			t.exp[i] = x;
			t.exp[i + 63] = x;
			t.log[usize::from(x)] = i as u8;
			let carry = x & 0x20 != 0;
			x <<= 1;
			if carry {
				x ^= GF64_POLY;
			}
			x &= 0x3F;
		}
		t
	})
}

#[inline]
fn gf_mul(a: u8, b: u8) -> u8 {
	if a == 0 || b == 0 {
		return 0;
	}
	let t = tables();
	t.exp[usize::from(t.log[usize::from(a)]) + usize::from(t.log[usize::from(b)])]
}

#[inline]
fn gf_inv(a: u8) -> u8 {
	debug_assert_ne!(a, 0);
	let t = tables();
	t.exp[63 - usize::from(t.log[usize::from(a)])]
}

#[inline]
fn gf_pow(p: usize) -> u8 {
	tables().exp[p % 63]
}

/// Generator polynomial for `2t` parity symbols: ∏ (x − α^i), i = 1..=2t.
/// Coefficient index is the power of x.
fn generator(parity: usize) -> Vec<u8> {
	let mut g = vec![1u8];
	for i in 1..=parity {
		let root = gf_pow(i);
		let mut next = vec![0u8; g.len() + 1];
		for (k, c) in g.iter().enumerate() {
			next[k + 1] ^= *c;
			next[k] ^= gf_mul(*c, root);
		}
		g = next;
	}
	g
}

/// Systematic encode: `data[..k]` holds the message hexbits, parity lands
/// in `data[k..n]`.
fn rs_encode(data: &mut [u8], n: usize, k: usize) {
	let parity = n - k;
	let g = generator(parity);

	// polynomial long division of msg(x)·x^parity
	let mut rem = vec![0u8; parity];
	for pos in 0..k {
		let coef = data[pos] ^ rem[parity - 1];
		for j in (1..parity).rev() {
			rem[j] = rem[j - 1] ^ gf_mul(coef, g[j]);
		}
		rem[0] = gf_mul(coef, g[0]);
	}

	for (i, r) in rem.iter().rev().enumerate() {
		data[k + i] = *r;
	}
}

/// Corrects up to `(n - k) / 2` symbol errors in place; returns the number
/// corrected.
fn rs_decode(data: &mut [u8], n: usize, k: usize) -> Result<u32, DecodeError> {
	let parity = n - k;

	let syndromes = |data: &[u8]| -> Vec<u8> {
		(1..=parity)
			.map(|j| {
				let mut s = 0u8;
				for (pos, c) in data[..n].iter().enumerate() {
					if *c != 0 {
						s ^= gf_mul(*c, gf_pow(j * (n - 1 - pos)));
					}
				}
				s
			})
			.collect()
	};

	let synd = syndromes(data);
	if synd.iter().all(|s| *s == 0) {
		return Ok(0);
	}

	// Berlekamp-Massey
	let mut sigma = vec![0u8; parity + 1];
	let mut prev = vec![0u8; parity + 1];
	sigma[0] = 1;
	prev[0] = 1;
	let mut l = 0usize;
	let mut m = 1usize;
	let mut b = 1u8;

	for i in 0..parity {
		let mut delta = synd[i];
		for j in 1..=l {
			delta ^= gf_mul(sigma[j], synd[i - j]);
		}

		if delta == 0 {
			m += 1;
		} else if 2 * l <= i {
			let tmp = sigma.clone();
			let scale = gf_mul(delta, gf_inv(b));
			for j in 0..=(parity - m) {
				sigma[j + m] ^= gf_mul(scale, prev[j]);
			}
			l = i + 1 - l;
			prev = tmp;
			b = delta;
			m = 1;
		} else {
			let scale = gf_mul(delta, gf_inv(b));
			for j in 0..=(parity - m) {
				sigma[j + m] ^= gf_mul(scale, prev[j]);
			}
			m += 1;
		}
	}

	if l > parity / 2 {
		return Err(DecodeError::Irrecoverable);
	}

	// error evaluator Ω(x) = S(x)·σ(x) mod x^parity
	let mut omega = vec![0u8; parity];
	for i in 0..parity {
		for j in 0..=l.min(i) {
			omega[i] ^= gf_mul(sigma[j], synd[i - j]);
		}
	}

	// Chien search over the shortened positions + Forney magnitudes
	let mut corrected = 0u32;
	for pos in 0..n {
		let power = n - 1 - pos;
		// X_i^{-1} = α^{-power}
		let x_inv = gf_pow(63 - (power % 63));

		let mut val = 0u8;
		let mut xp = 1u8;
		for s in sigma.iter().take(l + 1) {
			val ^= gf_mul(*s, xp);
			xp = gf_mul(xp, x_inv);
		}
		if val != 0 {
			continue;
		}

		// σ'(x) keeps only odd powers over GF(2)
		let mut sigma_prime = 0u8;
		let mut xp = 1u8;
		for j in (1..=l).step_by(2) {
			sigma_prime ^= gf_mul(sigma[j], xp);
			xp = gf_mul(xp, gf_mul(x_inv, x_inv));
		}
		if sigma_prime == 0 {
			return Err(DecodeError::Irrecoverable);
		}

		let mut omega_val = 0u8;
		let mut xp = 1u8;
		for o in &omega {
			omega_val ^= gf_mul(*o, xp);
			xp = gf_mul(xp, x_inv);
		}

		let magnitude = gf_mul(omega_val, gf_inv(sigma_prime));
		data[pos] ^= magnitude;
		corrected += 1;
	}

	if corrected as usize != l {
		return Err(DecodeError::Irrecoverable);
	}

	// the corrected word has to re-verify
	if syndromes(data).iter().any(|s| *s != 0) {
		return Err(DecodeError::Irrecoverable);
	}

	Ok(corrected)
}

/// RS(24,12,13), the P25 LDU1 link control code.
pub fn encode241213(data: &mut [u8; 24]) {
	rs_encode(data, 24, 12);
}

pub fn decode241213(data: &mut [u8; 24]) -> Result<u32, DecodeError> {
	rs_decode(data, 24, 12)
}

/// RS(24,16,9), the P25 LDU2 encryption sync code.
pub fn encode24169(data: &mut [u8; 24]) {
	rs_encode(data, 24, 16);
}

pub fn decode24169(data: &mut [u8; 24]) -> Result<u32, DecodeError> {
	rs_decode(data, 24, 16)
}

/// RS(36,20,17), the P25 header data unit code.
pub fn encode362017(data: &mut [u8; 36]) {
	rs_encode(data, 36, 20);
}

pub fn decode362017(data: &mut [u8; 36]) -> Result<u32, DecodeError> {
	rs_decode(data, 36, 20)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fill(data: &mut [u8], seed: u8) {
		for (i, d) in data.iter_mut().enumerate() {
			*d = (seed.wrapping_add(i as u8).wrapping_mul(23)) & 0x3F;
		}
	}

	#[test]
	fn rs241213_round_trip_and_correction() {
		let mut data = [0u8; 24];
		fill(&mut data[..12], 7);
		encode241213(&mut data);
		let clean = data;

		assert_eq!(decode241213(&mut data).unwrap(), 0);

		// t = 6 symbol errors
		let mut noisy = clean;
		for pos in [0usize, 3, 7, 11, 15, 23] {
			noisy[pos] ^= 0x15;
		}
		assert_eq!(decode241213(&mut noisy).unwrap(), 6);
		assert_eq!(noisy, clean);
	}

	#[test]
	fn rs241213_never_recovers_beyond_capacity() {
		let mut data = [0u8; 24];
		fill(&mut data[..12], 19);
		encode241213(&mut data);
		let clean = data;

		for pos in 0..8 {
			data[pos] ^= 0x2A;
		}
		// 8 > t errors: whatever the decoder does, a fixed-up word can
		// never be the original message again
		let _ = decode241213(&mut data);
		assert_ne!(&data[..12], &clean[..12]);
	}

	#[test]
	fn rs24169_round_trip_and_correction() {
		let mut data = [0u8; 24];
		fill(&mut data[..16], 42);
		encode24169(&mut data);
		let clean = data;

		let mut noisy = clean;
		for pos in [2usize, 9, 17, 22] {
			noisy[pos] ^= 0x31;
		}
		assert_eq!(decode24169(&mut noisy).unwrap(), 4);
		assert_eq!(noisy, clean);
	}

	#[test]
	fn rs362017_round_trip_and_correction() {
		let mut data = [0u8; 36];
		fill(&mut data[..20], 3);
		encode362017(&mut data);
		let clean = data;

		let mut noisy = clean;
		for pos in [0usize, 5, 12, 19, 25, 30, 33, 35] {
			noisy[pos] ^= 0x08;
		}
		assert_eq!(decode362017(&mut noisy).unwrap(), 8);
		assert_eq!(noisy, clean);
	}

	#[test]
	fn parity_symbols_stay_in_range() {
		let mut data = [0u8; 36];
		fill(&mut data[..20], 11);
		encode362017(&mut data);
		assert!(data.iter().all(|d| *d < 64));
	}
}
