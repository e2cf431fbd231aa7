/*!
# Spindle: PCM Sink

The realtime half of playback: a worker thread that opens the audio
device, negotiates parameters, and shovels ring-buffer periods into it,
while the public face accepts packets and lifecycle commands from the
transport.

The state token is one-hot, guarded by the sink mutex. Whether the sink is
accepting data is a separate bit carried by the ring buffer's open flag:
`start` raises it, `stop`/`shutdown` lower it, and every `add_packet` call
consults it implicitly by appending.

```text
CLOSED → STARTING → PLAYING ⇄ PAUSING → PAUSED ⇄ RESUME → PLAYING
                         │                              │
                         └────── DRAINING ──────────────┘
                                      │
                                 CLOSING → CLOSED
                                 SHUTDOWN → (thread exit)
```
*/

use crate::{
	Append,
	LogLevel,
	log::LogSender,
	Packet,
	PcmDevice,
	PcmOpen,
	RingBuffer,
	SpindleError,
	Take,
};
use std::{
	sync::{
		Arc,
		Condvar,
		Mutex,
		MutexGuard,
		atomic::{
			AtomicBool,
			Ordering::{
				Acquire,
				Release,
			},
		},
	},
	thread::JoinHandle,
	time::Duration,
};



/// # Backoff Slice.
///
/// The device-open backoff sleeps in small slices so a stop or shutdown
/// doesn't have to wait out the whole thing.
const BACKOFF_SLICE: Duration = Duration::from_millis(100);



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Sink State.
pub(crate) enum SinkState {
	/// # Nothing Doing.
	Closed,

	/// # Waiting On the First Device Open.
	Starting,

	/// # Playing.
	Playing,

	/// # Pause Requested.
	Pausing,

	/// # Paused.
	Paused,

	/// # Resume Requested.
	Resume,

	/// # Playing Out the Buffered Tail.
	Draining,

	/// # Tearing Down.
	Closing,

	/// # Thread Exit Requested.
	Shutdown,
}



#[derive(Debug)]
/// # Guarded Control Block.
struct SinkCtl {
	/// # Current State.
	state: SinkState,

	/// # Draining Context?
	///
	/// Remembers whether a pause or close interrupted a drain, so the
	/// worker can pick the right exit: device drain versus device drop,
	/// resume-to-DRAINING versus resume-to-PLAYING.
	draining: bool,
}

#[derive(Debug)]
/// # Shared Innards.
struct SinkShared {
	/// # Control Block.
	ctl: Mutex<SinkCtl>,

	/// # State-Change Condition.
	cond: Condvar,

	/// # The Ring Buffer.
	ring: RingBuffer,

	/// # Producer Byte-Swap Flag.
	///
	/// Set by the worker after negotiation; consulted on every append.
	swap: AtomicBool,
}

impl SinkShared {
	/// # Lock the Control Block.
	fn lock(&self) -> MutexGuard<'_, SinkCtl> {
		self.ctl.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// # Wait On the Condition.
	fn wait<'a>(&self, guard: MutexGuard<'a, SinkCtl>) -> MutexGuard<'a, SinkCtl> {
		self.cond.wait(guard).unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// # Current State.
	fn state(&self) -> SinkState { self.lock().state }

	/// # Change State and Wake Everyone.
	fn set_state(&self, state: SinkState) {
		let mut ctl = self.lock();
		ctl.state = state;
		self.cond.notify_all();
	}
}



#[derive(Debug, Default)]
/// # Add-Packet Outcome.
///
/// What the transport learns from each append: how much went in, what's
/// audible now, and whether the device has anything to complain about.
pub struct AddPacket {
	/// # Bytes Stored.
	pub stored: usize,

	/// # The Packet Audible Now.
	pub playing: Option<Arc<Packet>>,

	/// # Last Device Error.
	pub err: Option<String>,

	/// # The Sink Stopped Accepting Data.
	pub closed: bool,
}



#[derive(Debug)]
/// # PCM Sink.
pub struct PcmSink {
	/// # Shared Innards.
	shared: Arc<SinkShared>,

	/// # Worker Handle.
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PcmSink {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl PcmSink {
	#[must_use]
	/// # New.
	///
	/// Spawn the worker thread. It parks immediately; nothing touches the
	/// device until [`PcmSink::start`].
	///
	/// `backoff` is the pause between device-open retries — three seconds
	/// in production, something tiny in tests.
	pub fn new(opener: Box<dyn PcmOpen>, log: &crate::LogQueue, backoff: Duration) -> Self {
		let shared = Arc::new(SinkShared {
			ctl: Mutex::new(SinkCtl { state: SinkState::Closed, draining: false }),
			cond: Condvar::new(),
			ring: RingBuffer::default(),
			swap: AtomicBool::new(false),
		});

		let worker = {
			let shared = Arc::clone(&shared);
			let log = log.sender();
			std::thread::Builder::new()
				.name("spindle-sink".to_owned())
				.spawn(move || worker(&shared, opener, &log, backoff))
				.ok()
		};

		Self { shared, worker: Mutex::new(worker) }
	}

	/// # Start.
	///
	/// Open the buffer for data and set the worker chasing the device.
	///
	/// ## Errors
	///
	/// Returns an error — without side effects — unless the sink is
	/// currently `CLOSED`.
	pub fn start(&self) -> Result<(), SpindleError> {
		let mut ctl = self.shared.lock();
		if ctl.state != SinkState::Closed {
			return Err(SpindleError::InvalidState("start"));
		}
		ctl.state = SinkState::Starting;
		ctl.draining = false;
		drop(ctl);

		self.shared.ring.reopen();
		self.shared.cond.notify_all();
		Ok(())
	}

	#[must_use]
	/// # Add (Part Of) a Packet.
	///
	/// Append the packet's bytes from `from` onward, blocking until
	/// something observable happens: bytes stored, the audible packet
	/// changed, the device error no longer matching `last_err` (whatever
	/// the caller saw on its previous call), or the sink closed. The
	/// caller re-submits any remainder.
	pub fn add_packet(
		&self,
		packet: &Arc<Packet>,
		from: usize,
		last_err: Option<&str>,
	) -> AddPacket {
		let swap = self.shared.swap.load(Acquire);
		match self.shared.ring.append(packet, &packet.data[from..], swap, last_err) {
			Append::Stored { stored, playing, err } => AddPacket {
				stored, playing, err, closed: false,
			},
			Append::Closed => AddPacket { closed: true, ..AddPacket::default() },
		}
	}

	/// # Drain.
	///
	/// Flip to `DRAINING` (zero-padding any partial tail) and report one
	/// observable change per call: `Some((playing, err))` while audio is
	/// still trickling out, `None` once the buffer has emptied and the
	/// device finished (or the sink was stopped out from under us).
	pub fn drain(&self) -> Option<(Option<Arc<Packet>>, Option<String>)> {
		{
			let mut ctl = self.shared.lock();
			match ctl.state {
				SinkState::Closed | SinkState::Closing | SinkState::Shutdown => return None,
				// Mid-pause (or already draining): the flag remembers, the
				// tripwire below just watches.
				SinkState::Draining | SinkState::Pausing | SinkState::Paused |
				SinkState::Resume => { ctl.draining = true; },
				SinkState::Starting | SinkState::Playing => {
					ctl.state = SinkState::Draining;
					ctl.draining = true;
					drop(ctl);
					self.shared.ring.drain_pad();
					self.shared.ring.interrupt();
					self.shared.cond.notify_all();
				},
			}
		}

		self.shared.ring.wait_change()
	}

	/// # Pause.
	///
	/// Valid from `PLAYING` or `DRAINING`; anything else is a no-op. The
	/// logical state always advances even if the hardware refuses to
	/// cooperate.
	pub fn pause(&self) -> bool {
		let mut ctl = self.shared.lock();
		match ctl.state {
			SinkState::Playing => { ctl.draining = false; },
			SinkState::Draining => { ctl.draining = true; },
			_ => return false,
		}
		ctl.state = SinkState::Pausing;
		drop(ctl);
		self.shared.ring.interrupt();
		self.shared.cond.notify_all();
		true
	}

	/// # Resume.
	///
	/// Valid from `PAUSED` only.
	pub fn resume(&self) -> bool {
		let mut ctl = self.shared.lock();
		if ctl.state != SinkState::Paused { return false; }
		ctl.state = SinkState::Resume;
		drop(ctl);
		self.shared.cond.notify_all();
		true
	}

	/// # Stop.
	///
	/// Force a close — hardware drop, not drain — from any state, then
	/// wait for the worker to finish tearing down. A no-op when already
	/// closed.
	pub fn stop(&self) {
		{
			let mut ctl = self.shared.lock();
			match ctl.state {
				SinkState::Closed | SinkState::Shutdown => return,
				SinkState::Closing => {},
				_ => {
					ctl.state = SinkState::Closing;
					ctl.draining = false;
				},
			}
		}
		self.shared.ring.close();
		self.shared.cond.notify_all();

		// Wait out the teardown.
		let mut ctl = self.shared.lock();
		while ! matches!(ctl.state, SinkState::Closed | SinkState::Shutdown) {
			ctl = self.shared.wait(ctl);
		}
	}

	/// # Shut Down For Good.
	///
	/// Stop everything and reap the worker thread. The sink is unusable
	/// afterward; this is for daemon exit (and `Drop`).
	pub fn shutdown(&self) {
		self.shared.set_state(SinkState::Shutdown);
		self.shared.ring.close();
		let worker = self.worker.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.take();
		if let Some(worker) = worker {
			let _res = worker.join();
		}
	}

	#[must_use]
	/// # The Packet Audible Now.
	pub fn playing(&self) -> Option<Arc<Packet>> { self.shared.ring.playing() }

	#[must_use]
	/// # Last Device Error.
	pub fn device_error(&self) -> Option<String> { self.shared.ring.device_error() }

	#[cfg(test)]
	/// # Peek At the State Token.
	pub(crate) fn state(&self) -> SinkState { self.shared.state() }
}



/// # The Worker.
///
/// One big match on the state token, per the diagram up top. The only
/// blocking points are the ring-buffer condition and the device write; the
/// sink lock is never held across either.
fn worker(
	shared: &SinkShared,
	opener: Box<dyn PcmOpen>,
	log: &LogSender,
	backoff: Duration,
) {
	realtime_priority(log);

	let mut device: Option<Box<dyn PcmDevice>> = None;
	let mut period: Vec<u8> = Vec::new();

	loop {
		match shared.state() {
			SinkState::Closed => {
				let mut ctl = shared.lock();
				while ctl.state == SinkState::Closed { ctl = shared.wait(ctl); }
			},
			SinkState::Shutdown => {
				if let Some(mut d) = device.take() {
					if d.discard().is_err() {
						log.push(LogLevel::Warning, "the device wouldn't even stop".to_owned());
					}
				}
				return;
			},
			SinkState::Starting => {
				if open_device(shared, &*opener, &mut device, &mut period, log) {
					let mut ctl = shared.lock();
					// Stop may have won the race.
					if ctl.state == SinkState::Starting {
						ctl.state = SinkState::Playing;
						shared.cond.notify_all();
					}
				}
				else { backoff_sleep(shared, SinkState::Starting, backoff); }
			},
			state @ (SinkState::Playing | SinkState::Draining) => {
				// Step one: a device, if we haven't got one.
				if device.is_none() {
					if ! open_device(shared, &*opener, &mut device, &mut period, log) {
						backoff_sleep(shared, state, backoff);
						continue;
					}
				}

				// A draining buffer with less than a period left is done;
				// everything real was zero-padded to a boundary up front.
				if state == SinkState::Draining && shared.ring.buffered() < period.len() {
					shared.set_state(SinkState::Closing);
					continue;
				}

				match shared.ring.take_period(&mut period) {
					Take::Period => {
						write_period(shared, &mut device, &period, log);
					},
					// Closed or state change; the outer loop sorts it out.
					Take::Closed | Take::Interrupted => {},
				}
			},
			SinkState::Pausing => {
				// Even on device failure the music stops; a dead handle
				// just means resume has to reopen.
				if let Some(d) = device.as_mut() {
					if let Err(e) = d.pause(true) {
						log.push(LogLevel::Warning, format!("device pause failed: {e}"));
						device = None;
					}
				}
				shared.set_state(SinkState::Paused);
			},
			SinkState::Paused => {
				let mut ctl = shared.lock();
				while ctl.state == SinkState::Paused { ctl = shared.wait(ctl); }
			},
			SinkState::Resume => {
				if let Some(d) = device.as_mut() {
					if let Err(e) = d.pause(false) {
						log.push(LogLevel::Warning, format!("device unpause failed: {e}"));
						device = None;
					}
				}
				let mut ctl = shared.lock();
				if ctl.state == SinkState::Resume {
					ctl.state =
						if ctl.draining { SinkState::Draining }
						else { SinkState::Playing };
					shared.cond.notify_all();
				}
			},
			SinkState::Closing => {
				if let Some(mut d) = device.take() {
					let res =
						if shared.lock().draining { d.drain() }
						else { d.discard() };
					if let Err(e) = res {
						log.push(LogLevel::Warning, format!("device close stumbled: {e}"));
					}
				}
				shared.ring.close();
				shared.ring.reset();

				let mut ctl = shared.lock();
				if ctl.state == SinkState::Closing {
					ctl.state = SinkState::Closed;
					ctl.draining = false;
					shared.cond.notify_all();
				}
			},
		}
	}
}

/// # Open and Negotiate.
///
/// On success the ring gets sized for the period, the swap flag lands
/// where the producer can see it, and any standing device error clears.
fn open_device(
	shared: &SinkShared,
	opener: &dyn PcmOpen,
	device: &mut Option<Box<dyn PcmDevice>>,
	period: &mut Vec<u8>,
	log: &LogSender,
) -> bool {
	match opener.open() {
		Ok((d, negotiated)) => {
			if let Err(e) = shared.ring.allocate(negotiated.period_bytes) {
				log.push(LogLevel::Error, e.to_string());
				shared.ring.set_device_error(Some(e.to_string()));
				return false;
			}
			shared.swap.store(negotiated.swap, Release);
			period.resize(negotiated.period_bytes, 0);
			device.replace(d);
			shared.ring.set_device_error(None);
			true
		},
		Err(e) => {
			shared.ring.set_device_error(Some(e.to_string()));
			false
		},
	}
}

/// # Write One Period.
///
/// Recoverable complaints — `EINTR`, `EPIPE`, `ESTRPIPE` — get one
/// recovery and one retry; anything else closes the device so the main
/// loop can start over on the reopen path.
fn write_period(
	shared: &SinkShared,
	device: &mut Option<Box<dyn PcmDevice>>,
	period: &[u8],
	log: &LogSender,
) {
	let Some(d) = device.as_mut() else { return; };

	let mut res = d.write_period(period);
	if let Err(e) = &res {
		if e.recoverable() {
			log.push(LogLevel::Warning, format!("device hiccup: {e}"));
			res = d.recover().and_then(|()| d.write_period(period));
		}
	}

	match res {
		Ok(()) => {
			shared.ring.advance_play();
		},
		Err(e) => {
			log.push(LogLevel::Error, format!("device write failed: {e}"));
			*device = None;
			shared.ring.set_device_error(Some(e.to_string()));
		},
	}
}

/// # Backoff Between Open Attempts.
///
/// Sliced so a stop or shutdown only waits a beat, not the whole backoff.
fn backoff_sleep(shared: &SinkShared, entry: SinkState, backoff: Duration) {
	let mut left = backoff;
	while ! left.is_zero() {
		if shared.state() != entry { return; }
		let nap = left.min(BACKOFF_SLICE);
		std::thread::sleep(nap);
		left -= nap;
	}
}

#[allow(unsafe_code, reason = "Scheduler syscalls have no safe wrapper.")]
/// # Ask For Realtime Scheduling.
///
/// Minimum round-robin priority, which is all a single audio stream
/// needs. Refusal (usually permissions) downgrades to default scheduling
/// with a note in the log.
fn realtime_priority(log: &LogSender) {
	// SAFETY: plain libc scheduling calls on the current thread with a
	// stack-local parameter block.
	let refused = unsafe {
		let priority = libc::sched_get_priority_min(libc::SCHED_RR);
		if priority < 0 { true }
		else {
			let param = libc::sched_param { sched_priority: priority };
			0 != libc::pthread_setschedparam(
				libc::pthread_self(),
				libc::SCHED_RR,
				&param,
			)
		}
	};
	if refused {
		log.push(
			LogLevel::Warning,
			"realtime scheduling unavailable; continuing at default priority".to_owned(),
		);
	}
}



#[cfg(test)]
/// # Scripted Stand-In For ALSA.
///
/// Shared by the sink, transport, and player tests: records everything
/// written, injects scripted failures, and can throttle consumption so
/// playback takes observable time.
pub(crate) mod fake {
	use crate::{
		DeviceError,
		Negotiated,
		PcmDevice,
		PcmOpen,
	};
	use std::{
		collections::VecDeque,
		sync::{
			Arc,
			Mutex,
			atomic::{
				AtomicUsize,
				Ordering,
			},
		},
		time::Duration,
	};

	/// # Fake Period (Bytes).
	///
	/// Small but still under the period-per-second cap.
	pub(crate) const PERIOD: usize = 4410;

	#[derive(Debug, Default)]
	/// # Shared Fake-Device Guts.
	pub(crate) struct FakeGuts {
		/// # Everything Written.
		pub(crate) written: Mutex<Vec<u8>>,

		/// # Scripted Write Failures.
		pub(crate) fail_writes: Mutex<VecDeque<DeviceError>>,

		/// # Opens To Fail First.
		pub(crate) fail_opens: AtomicUsize,

		/// # Per-Write Delay.
		pub(crate) throttle: Mutex<Duration>,

		/// # Hardware Pause Count.
		pub(crate) pauses: AtomicUsize,

		/// # Device Drain Count.
		pub(crate) drains: AtomicUsize,

		/// # Device Drop Count.
		pub(crate) drops: AtomicUsize,

		/// # Recovery Count.
		pub(crate) recovers: AtomicUsize,
	}

	/// # The Device Half.
	pub(crate) struct FakeDevice(pub(crate) Arc<FakeGuts>);

	impl PcmDevice for FakeDevice {
		fn write_period(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
			if let Some(e) = self.0.fail_writes.lock().unwrap().pop_front() {
				return Err(e);
			}
			let nap = *self.0.throttle.lock().unwrap();
			if ! nap.is_zero() { std::thread::sleep(nap); }
			self.0.written.lock().unwrap().extend_from_slice(bytes);
			Ok(())
		}
		fn recover(&mut self) -> Result<(), DeviceError> {
			self.0.recovers.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
		fn pause(&mut self, pause: bool) -> Result<(), DeviceError> {
			if pause { self.0.pauses.fetch_add(1, Ordering::SeqCst); }
			Ok(())
		}
		fn drain(&mut self) -> Result<(), DeviceError> {
			self.0.drains.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
		fn discard(&mut self) -> Result<(), DeviceError> {
			self.0.drops.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	/// # The Opener Half.
	pub(crate) struct FakeOpen(pub(crate) Arc<FakeGuts>);

	impl PcmOpen for FakeOpen {
		fn open(&self) -> Result<(Box<dyn PcmDevice>, Negotiated), DeviceError> {
			let left = self.0.fail_opens.load(Ordering::SeqCst);
			if left != 0 {
				self.0.fail_opens.store(left - 1, Ordering::SeqCst);
				return Err(DeviceError::Fatal("No such file or directory".to_owned()));
			}
			Ok((
				Box::new(FakeDevice(Arc::clone(&self.0))),
				Negotiated { period_bytes: PERIOD, swap: false },
			))
		}
	}
}
