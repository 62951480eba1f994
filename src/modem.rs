//! Transmit queue and modem gateway.
//!
//! The controllers are the single producer, the modem I/O surface the
//! single consumer. Frames carry a two-byte `{tag, rssi}` prefix on the
//! ring; the consumer drains one complete frame per tick.

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

/// Frame tag bytes on the modem port.
pub const TAG_HEADER: u8 = 0x00;
pub const TAG_DATA: u8 = 0x01;
pub const TAG_LOST: u8 = 0x02;
pub const TAG_EOT: u8 = 0x03;
pub const TAG_NODATA: u8 = 0x04;

/// Default ring capacity: at least twice the largest protocol frame plus
/// control-channel slack.
pub const DEFAULT_QUEUE_BYTES: usize = 8192;

/// Byte-oriented port toward the physical modem board.
///
/// Implementations deliver pre-timed symbol bursts; the core neither times
/// nor paces them.
pub trait ModemPort: Send {
	/// Reads one tagged frame if a complete one is available.
	fn read_frame(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
	/// Writes one tagged frame.
	fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// A length-prefixed frame awaiting transmission.
struct QueuedFrame {
	data: Vec<u8>,
}

/// Bounded transmit ring shared between the controllers and the modem
/// consumer; a single mutex guards it.
pub struct TxQueue {
	inner: Mutex<TxQueueInner>,
}

struct TxQueueInner {
	frames: VecDeque<QueuedFrame>,
	/// Immediate frames pending at the head of the queue.
	immediates: usize,
	used: usize,
	capacity: usize,
}

impl TxQueue {
	pub fn new(capacity: usize) -> Self {
		Self {
			inner: Mutex::new(TxQueueInner {
				frames: VecDeque::new(),
				immediates: 0,
				used: 0,
				capacity,
			}),
		}
	}

	/// Queues one tagged frame. `immediate` insertions jump to the head
	/// but keep order among themselves.
	///
	/// Returns false (and drops the frame) when the ring is full.
	pub fn add_frame(&self, frame: &[u8], immediate: bool) -> bool {
		let mut inner = self.inner.lock().unwrap();

		// each frame costs its bytes plus a length byte, as on the wire
		let cost = frame.len() + 1;
		if inner.used + cost > inner.capacity {
			warn!("TX queue full, dropping {} byte frame", frame.len());
			return false;
		}

		inner.used += cost;
		let queued = QueuedFrame {
			data: frame.to_vec(),
		};
		if immediate {
			// behind any earlier immediate frames, ahead of the rest
			let pos = inner.immediates;
			inner.frames.insert(pos, queued);
			inner.immediates += 1;
		} else {
			inner.frames.push_back(queued);
		}
		true
	}

	/// Bytes still available to the producer.
	pub fn free_space(&self) -> usize {
		let inner = self.inner.lock().unwrap();
		inner.capacity - inner.used
	}

	pub fn is_empty(&self) -> bool {
		self.inner.lock().unwrap().frames.is_empty()
	}

	pub fn clear(&self) {
		let mut inner = self.inner.lock().unwrap();
		inner.frames.clear();
		inner.immediates = 0;
		inner.used = 0;
	}

	/// Pops the next complete frame; the modem consumer calls this once
	/// per tick.
	pub fn get_frame(&self) -> Option<Vec<u8>> {
		let mut inner = self.inner.lock().unwrap();
		let frame = inner.frames.pop_front()?;
		inner.used -= frame.data.len() + 1;
		inner.immediates = inner.immediates.saturating_sub(1);
		Some(frame.data)
	}
}

impl Default for TxQueue {
	fn default() -> Self {
		Self::new(DEFAULT_QUEUE_BYTES)
	}
}

/// Builds the two-byte tag prefix ahead of a protocol payload.
pub fn tag_frame(tag: u8, rssi: u8, payload: &[u8]) -> Vec<u8> {
	let mut frame = Vec::with_capacity(payload.len() + 2);
	frame.push(tag);
	frame.push(rssi);
	frame.extend_from_slice(payload);
	frame
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fifo_order_for_normal_frames() {
		let q = TxQueue::new(256);
		assert!(q.add_frame(&[TAG_DATA, 0, 1], false));
		assert!(q.add_frame(&[TAG_DATA, 0, 2], false));
		assert!(q.add_frame(&[TAG_EOT, 0, 3], false));

		assert_eq!(q.get_frame().unwrap()[2], 1);
		assert_eq!(q.get_frame().unwrap()[2], 2);
		assert_eq!(q.get_frame().unwrap()[2], 3);
		assert!(q.get_frame().is_none());
	}

	#[test]
	fn immediate_frames_jump_the_queue() {
		let q = TxQueue::new(256);
		q.add_frame(&[TAG_DATA, 0, 1], false);
		q.add_frame(&[TAG_DATA, 0, 2], false);
		q.add_frame(&[TAG_DATA, 0, 8], true);
		q.add_frame(&[TAG_DATA, 0, 9], true);

		// immediates first, in their own insertion order
		assert_eq!(q.get_frame().unwrap()[2], 8);
		assert_eq!(q.get_frame().unwrap()[2], 9);
		assert_eq!(q.get_frame().unwrap()[2], 1);
		assert_eq!(q.get_frame().unwrap()[2], 2);
	}

	#[test]
	fn capacity_is_enforced() {
		let q = TxQueue::new(16);
		assert!(q.add_frame(&[0u8; 10], false));
		assert!(!q.add_frame(&[0u8; 10], false));

		q.get_frame();
		assert!(q.add_frame(&[0u8; 10], false));
	}

	#[test]
	fn free_space_tracks_usage() {
		let q = TxQueue::new(64);
		let before = q.free_space();
		q.add_frame(&[0u8; 20], false);
		assert_eq!(q.free_space(), before - 21);
		q.clear();
		assert_eq!(q.free_space(), 64);
	}

	#[test]
	fn tagging() {
		let frame = tag_frame(TAG_DATA, 0x2A, &[0xAA, 0xBB]);
		assert_eq!(frame, vec![TAG_DATA, 0x2A, 0xAA, 0xBB]);
	}
}
