/*!
# Spindle: Ring Buffer

The only memory shared between the transport and the sink worker: a
circular byte buffer carved into device-period slots, with an `Arc<Packet>`
tag per slot recording which packet's audio lives there. The producer
appends at `data_end`; the consumer drains whole periods at `play_pos`; a
single mutex and condvar arbitrate.

Appends double as the transport's tripwire: a call returns as soon as bytes
are stored, the audible packet changes, the device error changes, or the
buffer closes, so the transport can refresh the published state without
polling.
*/

use crate::{
	BYTES_PER_SECOND,
	MAX_PERIODS_PER_SECOND,
	Packet,
	RING_SECONDS,
	SpindleError,
};
use std::sync::{
	Arc,
	Condvar,
	Mutex,
	MutexGuard,
};



#[derive(Debug)]
/// # Append Outcome.
pub(crate) enum Append {
	/// # Bytes Stored (Possibly Zero, On a Tripwire Wake).
	Stored {
		/// # Bytes Actually Copied.
		stored: usize,

		/// # The Packet Audible Right Now.
		playing: Option<Arc<Packet>>,

		/// # Last Device Error.
		err: Option<String>,
	},

	/// # The Sink Stopped Accepting Data.
	Closed,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Take Outcome.
pub(crate) enum Take {
	/// # One Period Copied Out.
	Period,

	/// # The Buffer Closed.
	Closed,

	/// # State Changed; Re-Check Before Waiting Again.
	Interrupted,
}



/// # Guarded Innards.
#[derive(Debug, Default)]
struct RingState {
	/// # The Bytes. Empty until the device period is known.
	buf: Vec<u8>,

	/// # Period Size (Bytes).
	period: usize,

	/// # Per-Period Packet Tags.
	tags: Vec<Option<Arc<Packet>>>,

	/// # Consumer Offset (Bytes, Period-Aligned).
	play_pos: usize,

	/// # Producer Offset (Bytes).
	data_end: usize,

	/// # Buffered Byte Count.
	data_size: usize,

	/// # Accepting Data?
	open: bool,

	/// # Last Device Error.
	err: Option<String>,

	/// # Interrupt Generation.
	///
	/// Bumped whenever the sink state machine wants the consumer (or a
	/// parked producer) to wake up and look around.
	epoch: u64,
}

impl RingState {
	/// # The Packet Audible Now.
	fn playing(&self) -> Option<Arc<Packet>> {
		if self.period == 0 { return None; }
		self.tags.get(self.play_pos / self.period).cloned().flatten()
	}
}



#[derive(Debug, Default)]
/// # Ring Buffer.
pub(crate) struct RingBuffer {
	/// # Guarded State.
	inner: Mutex<RingState>,

	/// # Shared Condition.
	cond: Condvar,
}

impl RingBuffer {
	/// # Allocate (Or Re-Use) Storage.
	///
	/// Called by the sink worker once the device has negotiated its period
	/// size: five seconds of audio, rounded down to whole periods. If the
	/// buffer already matches — a reopen after pause or error — the data in
	/// it is kept.
	///
	/// ## Errors
	///
	/// This will return an error if the device insists on a period small
	/// enough to exceed the per-second period cap.
	pub(crate) fn allocate(&self, period: usize) -> Result<(), SpindleError> {
		if period == 0 || period * (MAX_PERIODS_PER_SECOND as usize) < (BYTES_PER_SECOND as usize) {
			return Err(SpindleError::PeriodSize(period));
		}

		let mut st = self.lock();
		if st.period == period && ! st.buf.is_empty() { return Ok(()); }

		let periods = usize::max(1, (BYTES_PER_SECOND * RING_SECONDS) as usize / period);
		st.period = period;
		st.buf = vec![0; periods * period];
		st.tags = vec![None; periods];
		st.play_pos = 0;
		st.data_end = 0;
		st.data_size = 0;
		st.epoch += 1;
		self.cond.notify_all();
		Ok(())
	}

	/// # Append.
	///
	/// Copy as much of `bytes` as fits without wrapping, tagging every
	/// period touched with the owning packet. Blocks while the buffer is
	/// full (or not yet allocated), waking early — with `stored: 0` — if
	/// the audible packet changes or the device error stops matching what
	/// the caller last saw (`entry_err`), and immediately if the buffer
	/// closes.
	pub(crate) fn append(
		&self,
		packet: &Arc<Packet>,
		bytes: &[u8],
		swap: bool,
		entry_err: Option<&str>,
	) -> Append {
		let mut st = self.lock();
		let entry_playing = st.playing();
		loop {
			if ! st.open { return Append::Closed; }

			if ! st.buf.is_empty() {
				let free = st.buf.len() - st.data_size;
				let tail = st.buf.len() - st.data_end;
				let span = bytes.len().min(free).min(tail);
				if span != 0 {
					let start = st.data_end;
					if swap {
						for (dst, src) in st.buf[start..start + span]
							.chunks_exact_mut(2)
							.zip(bytes[..span].chunks_exact(2)) {
							dst[0] = src[1];
							dst[1] = src[0];
						}
					}
					else {
						st.buf[start..start + span].copy_from_slice(&bytes[..span]);
					}

					// One tag write per period touched; partial periods
					// count too.
					let period = st.period;
					let first = start / period;
					let last = (start + span - 1) / period;
					for slot in first..=last {
						st.tags[slot] = Some(Arc::clone(packet));
					}

					st.data_end = (start + span) % st.buf.len();
					st.data_size += span;
					self.cond.notify_all();
					return Append::Stored {
						stored: span,
						playing: st.playing(),
						err: st.err.clone(),
					};
				}
			}

			// Nothing fit; anything tripwire-worthy before we park?
			let now_playing = st.playing();
			let playing_changed = match (&entry_playing, &now_playing) {
				(Some(a), Some(b)) => ! Arc::ptr_eq(a, b),
				(None, None) => false,
				_ => true,
			};
			if playing_changed || st.err.as_deref() != entry_err {
				return Append::Stored {
					stored: 0,
					playing: now_playing,
					err: st.err.clone(),
				};
			}

			st = self.wait(st);
		}
	}

	/// # Take One Period.
	///
	/// Copy exactly one period into `dst`, blocking until one is buffered.
	/// Returns early when the buffer closes or something bumps the epoch,
	/// so the worker can re-check the sink state without holding anything.
	///
	/// The copy happens under the lock: nothing the consumer holds points
	/// into the buffer afterward, so a racing `reset` can't invalidate an
	/// in-flight device write.
	pub(crate) fn take_period(&self, dst: &mut [u8]) -> Take {
		let mut st = self.lock();
		let entry_epoch = st.epoch;
		loop {
			if ! st.open { return Take::Closed; }
			if st.epoch != entry_epoch { return Take::Interrupted; }
			if st.period != 0 && st.period <= st.data_size && st.period <= dst.len() {
				let start = st.play_pos;
				let period = st.period;
				dst[..period].copy_from_slice(&st.buf[start..start + period]);
				return Take::Period;
			}
			st = self.wait(st);
		}
	}

	/// # Advance Past a Consumed Period.
	///
	/// Called by the worker after a successful device write: releases the
	/// consumed period's packet tag, moves `play_pos`, and wakes the
	/// producer. Returns the packet now audible, if any.
	pub(crate) fn advance_play(&self) -> Option<Arc<Packet>> {
		let mut st = self.lock();
		if st.period == 0 || st.data_size < st.period { return st.playing(); }

		let slot = st.play_pos / st.period;
		st.tags[slot] = None; // Exactly one release per consumed period.
		st.play_pos = (st.play_pos + st.period) % st.buf.len();
		st.data_size -= st.period;
		self.cond.notify_all();
		st.playing()
	}

	/// # Zero-Pad the Tail.
	///
	/// Round a partial final period up to a whole one so the consumer can
	/// drain everything. A stream that ends exactly on a period boundary
	/// needs (and gets) no padding.
	pub(crate) fn drain_pad(&self) {
		let mut st = self.lock();
		if st.period == 0 { return; }
		let partial = st.data_size % st.period;
		if partial != 0 {
			let pad = st.period - partial;
			let start = st.data_end;
			st.buf[start..start + pad].fill(0);
			st.data_end = (start + pad) % st.buf.len();
			st.data_size += pad;
			self.cond.notify_all();
		}
	}

	/// # Reset.
	///
	/// Clear positions and drop every packet tag. Storage and period stick
	/// around for the next session with the same device parameters.
	pub(crate) fn reset(&self) {
		let mut st = self.lock();
		st.play_pos = 0;
		st.data_end = 0;
		st.data_size = 0;
		for tag in &mut st.tags { *tag = None; }
		st.epoch += 1;
		self.cond.notify_all();
	}

	/// # Open For Business.
	pub(crate) fn reopen(&self) {
		let mut st = self.lock();
		st.open = true;
		st.epoch += 1;
		self.cond.notify_all();
	}

	/// # Stop Accepting Data.
	///
	/// Parked producers return [`Append::Closed`]; parked consumers get
	/// [`Take::Closed`].
	pub(crate) fn close(&self) {
		let mut st = self.lock();
		st.open = false;
		st.epoch += 1;
		self.cond.notify_all();
	}

	/// # Poke the Consumer.
	pub(crate) fn interrupt(&self) {
		let mut st = self.lock();
		st.epoch += 1;
		self.cond.notify_all();
	}

	/// # Wait For Something Observable.
	///
	/// The drain-side tripwire: blocks until the audible packet or device
	/// error changes — returning the fresh pair — or the buffer closes,
	/// which returns `None` and means the drain (or a stop) finished.
	pub(crate) fn wait_change(&self) -> Option<(Option<Arc<Packet>>, Option<String>)> {
		let mut st = self.lock();
		let entry_playing = st.playing();
		let entry_err = st.err.clone();
		loop {
			if ! st.open { return None; }

			let now = st.playing();
			let changed = match (&entry_playing, &now) {
				(Some(a), Some(b)) => ! Arc::ptr_eq(a, b),
				(None, None) => false,
				_ => true,
			};
			if changed || entry_err != st.err {
				return Some((now, st.err.clone()));
			}

			st = self.wait(st);
		}
	}

	/// # Record (Or Clear) a Device Error.
	pub(crate) fn set_device_error(&self, err: Option<String>) {
		let mut st = self.lock();
		if st.err != err {
			st.err = err;
			self.cond.notify_all();
		}
	}

	/// # Last Device Error.
	pub(crate) fn device_error(&self) -> Option<String> {
		self.lock().err.clone()
	}

	/// # The Packet Audible Now.
	pub(crate) fn playing(&self) -> Option<Arc<Packet>> {
		self.lock().playing()
	}

	/// # Buffered Byte Count.
	pub(crate) fn buffered(&self) -> usize {
		self.lock().data_size
	}
}

impl RingBuffer {
	/// # Lock.
	fn lock(&self) -> MutexGuard<'_, RingState> {
		self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// # Wait On the Condition.
	fn wait<'a>(&self, guard: MutexGuard<'a, RingState>) -> MutexGuard<'a, RingState> {
		self.cond.wait(guard).unwrap_or_else(std::sync::PoisonError::into_inner)
	}
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::DiscId;

	/// Small enough to exercise wrapping quickly, big enough to pass the
	/// period cap.
	const PERIOD: usize = 4410;

	/// # Test Packet.
	fn packet(data: Vec<u8>) -> Arc<Packet> {
		Arc::new(Packet {
			disc_id: DiscId::default(),
			track: 1,
			index: 1,
			file_offset: 0,
			abs_pos: 0,
			track_length: 0,
			flags: 0,
			data,
		})
	}

	/// # Ready-To-Go Ring.
	fn ring() -> RingBuffer {
		let ring = RingBuffer::default();
		ring.reopen();
		ring.allocate(PERIOD).expect("Allocation failed.");
		ring
	}

	#[test]
	fn t_allocate() {
		let ring = RingBuffer::default();
		assert!(
			matches!(ring.allocate(1024), Err(SpindleError::PeriodSize(1024))),
			"Chatty periods must be refused.",
		);
		assert!(ring.allocate(PERIOD).is_ok(), "A tenth of a second is fine.");

		// Five seconds, rounded down to whole periods.
		let st = ring.lock();
		assert_eq!(st.buf.len(), 200 * PERIOD, "Expected two hundred periods.");
		assert_eq!(st.tags.len(), 200, "One tag per period.");
	}

	#[test]
	fn t_fifo() {
		let ring = ring();
		let data: Vec<u8> = (0..u8::MAX).cycle().take(PERIOD * 3 + 100).collect();
		let pk = packet(data.clone());

		// Feed it in, chunk by chunk.
		let mut fed = 0;
		while fed < data.len() {
			match ring.append(&pk, &data[fed..], false, None) {
				Append::Stored { stored, .. } => { fed += stored; },
				Append::Closed => panic!("The ring closed unexpectedly."),
			}
		}

		ring.drain_pad();

		// Drain it back out.
		let mut out = Vec::new();
		let mut buf = vec![0_u8; PERIOD];
		while ring.buffered() >= PERIOD {
			assert_eq!(ring.take_period(&mut buf), Take::Period, "Take failed.");
			out.extend_from_slice(&buf);
			ring.advance_play();
		}

		assert_eq!(out.len(), PERIOD * 4, "Expected four padded periods back.");
		assert_eq!(&out[..data.len()], data.as_slice(), "FIFO order broken.");
		assert!(
			out[data.len()..].iter().all(|&b| b == 0),
			"The pad must be silence.",
		);
	}

	#[test]
	fn t_swap() {
		let ring = ring();
		let data: Vec<u8> = (0..u8::MAX).cycle().take(PERIOD).collect();
		let pk = packet(data.clone());

		match ring.append(&pk, &data, true, None) {
			Append::Stored { stored, .. } => assert_eq!(stored, PERIOD, "Short store."),
			Append::Closed => panic!("The ring closed unexpectedly."),
		}

		let mut buf = vec![0_u8; PERIOD];
		assert_eq!(ring.take_period(&mut buf), Take::Period, "Take failed.");
		for (pair, orig) in buf.chunks_exact(2).zip(data.chunks_exact(2)) {
			assert_eq!(pair[0], orig[1], "Byte swap missed.");
			assert_eq!(pair[1], orig[0], "Byte swap missed.");
		}
	}

	#[test]
	fn t_tag_release() {
		let ring = ring();
		let pk = packet(vec![0; PERIOD]);
		assert_eq!(Arc::strong_count(&pk), 1, "Fresh packets have one owner.");

		match ring.append(&pk, &pk.data.clone(), false, None) {
			Append::Stored { stored, playing, .. } => {
				assert_eq!(stored, PERIOD, "Short store.");
				assert!(
					playing.as_ref().is_some_and(|p| Arc::ptr_eq(p, &pk)),
					"The audible packet should be ours.",
				);
			},
			Append::Closed => panic!("The ring closed unexpectedly."),
		}
		assert_eq!(Arc::strong_count(&pk), 2, "The ring should hold one tag.");

		let mut buf = vec![0_u8; PERIOD];
		assert_eq!(ring.take_period(&mut buf), Take::Period, "Take failed.");
		ring.advance_play();
		assert_eq!(Arc::strong_count(&pk), 1, "Consumption must release the tag.");
	}

	#[test]
	fn t_closed() {
		let ring = ring();
		ring.close();
		let pk = packet(vec![0; 16]);
		assert!(
			matches!(ring.append(&pk, &pk.data.clone(), false, None), Append::Closed),
			"Appends to a closed ring must bail.",
		);
		let mut buf = vec![0_u8; PERIOD];
		assert_eq!(ring.take_period(&mut buf), Take::Closed, "Takes too.");
	}

	#[test]
	fn t_exact_boundary_no_pad() {
		let ring = ring();
		let pk = packet(vec![7; PERIOD]);
		match ring.append(&pk, &pk.data.clone(), false, None) {
			Append::Stored { stored, .. } => assert_eq!(stored, PERIOD, "Short store."),
			Append::Closed => panic!("The ring closed unexpectedly."),
		}
		ring.drain_pad();
		assert_eq!(ring.buffered(), PERIOD, "Exact boundaries need no padding.");
	}

	#[test]
	fn t_threaded_fifo() {
		let ring = Arc::new(ring());
		let total = PERIOD * 512; // Forces plenty of wrapping.
		let data: Vec<u8> = (0..=u8::MAX).cycle().take(total).collect();

		let consumer = {
			let ring = Arc::clone(&ring);
			std::thread::spawn(move || {
				let mut out = Vec::with_capacity(total);
				let mut buf = vec![0_u8; PERIOD];
				while out.len() < total {
					match ring.take_period(&mut buf) {
						Take::Period => {
							out.extend_from_slice(&buf);
							ring.advance_play();
						},
						Take::Interrupted => {},
						Take::Closed => break,
					}
				}
				out
			})
		};

		let pk = packet(Vec::new());
		let mut fed = 0;
		while fed < total {
			match ring.append(&pk, &data[fed..], false, None) {
				Append::Stored { stored, .. } => { fed += stored; },
				Append::Closed => panic!("The ring closed unexpectedly."),
			}
		}

		let out = consumer.join().expect("The consumer died.");
		assert_eq!(out, data, "Concurrent FIFO order broken.");
	}
}
