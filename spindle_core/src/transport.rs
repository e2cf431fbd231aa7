/*!
# Spindle: Transport

The glue between the source streamer and the PCM sink: one pump worker
pulling packets and pushing them into the blocking `add_packet`, plus the
command surface (play, pause, stop, next, prev, seek) that restarts or
nudges the stream. The blocking append is the only flow control there is:
a slow ripper stalls the streamer, a full buffer stalls the pump, and
everything self-throttles.

After every append — including the zero-byte tripwire returns — the pump
recomputes the published state from the packet actually audible and hands
it up to the player.
*/

use crate::{
	DiscId,
	DiscInfo,
	PacketStream,
	PcmSink,
	PlayerPhase,
	PlayerState,
	SpindleError,
	rip::RipWatch,
};
use std::{
	path::PathBuf,
	sync::{
		Arc,
		Condvar,
		Mutex,
		MutexGuard,
		atomic::{
			AtomicBool,
			Ordering::Release,
		},
		mpsc::Sender,
	},
	thread::JoinHandle,
	time::Duration,
};



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Desired Run Mode.
enum Run {
	/// # Rolling.
	Play,

	/// # Holding.
	Pause,

	/// # Nothing Queued.
	Stop,
}

#[derive(Debug, Clone)]
/// # One Loaded Disc's Session Context.
struct Session {
	/// # The Disc.
	disc: Arc<DiscInfo>,

	/// # The Id Asked For (Alias Source).
	source_id: DiscId,

	/// # The PCM File.
	pcm: PathBuf,

	/// # Rip Watch, When Live.
	watch: Option<Arc<RipWatch>>,
}

#[derive(Debug)]
/// # A Requested (Re)Start.
struct StreamStart {
	/// # Starting Track Number.
	track: u8,

	/// # Starting Position (Seconds From Index One).
	position: Option<i32>,

	/// # Hold At the First Packet?
	paused: bool,
}

#[derive(Debug)]
/// # Guarded Control Block.
struct TransportCtl {
	/// # Session Context, While a Disc Is Loaded.
	session: Option<Session>,

	/// # Pending (Re)Start.
	pending: Option<StreamStart>,

	/// # Run Mode.
	run: Run,

	/// # Halt Flag of the Active Stream.
	halt: Option<Arc<AtomicBool>>,

	/// # Last Published State.
	last: PlayerState,

	/// # State Outbox.
	tx: Sender<PlayerState>,

	/// # Time To Die?
	shutdown: bool,
}

#[derive(Debug)]
/// # Shared Innards.
struct TransportShared {
	/// # Control Block.
	ctl: Mutex<TransportCtl>,

	/// # Change Condition.
	cond: Condvar,

	/// # The Sink.
	sink: PcmSink,

	/// # Live-Rip Poll Interval.
	poll: Duration,
}

impl TransportShared {
	/// # Lock.
	fn lock(&self) -> MutexGuard<'_, TransportCtl> {
		self.ctl.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// # Wait.
	fn wait<'a>(&self, guard: MutexGuard<'a, TransportCtl>) -> MutexGuard<'a, TransportCtl> {
		self.cond.wait(guard).unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// # Publish a State (If It Changed).
	fn publish(&self, state: PlayerState) {
		let mut ctl = self.lock();
		if ctl.last != state {
			ctl.last = state.clone();
			let _res = ctl.tx.send(state);
		}
	}

	/// # Halt the Active Stream and Close the Sink.
	///
	/// Unblocks a pump parked in either `next_packet` or `add_packet` so
	/// it can notice whatever we're about to queue up.
	fn kick(&self, ctl: &mut TransportCtl) {
		if let Some(halt) = ctl.halt.take() { halt.store(true, Release); }
		self.sink.stop();
		self.cond.notify_all();
	}
}



#[derive(Debug)]
/// # Transport.
pub struct Transport {
	/// # Shared Innards.
	shared: Arc<TransportShared>,

	/// # Pump Worker.
	worker: Option<JoinHandle<()>>,
}

impl Drop for Transport {
	fn drop(&mut self) { self.shutdown(); }
}

impl Transport {
	#[must_use]
	/// # New.
	///
	/// Take ownership of the sink and start the (idle) pump. States go out
	/// through `tx` as playback makes them.
	pub fn new(sink: PcmSink, tx: Sender<PlayerState>, poll: Duration) -> Self {
		let shared = Arc::new(TransportShared {
			ctl: Mutex::new(TransportCtl {
				session: None,
				pending: None,
				run: Run::Stop,
				halt: None,
				last: PlayerState::default(),
				tx,
				shutdown: false,
			}),
			cond: Condvar::new(),
			sink,
			poll,
		});

		let worker = {
			let shared = Arc::clone(&shared);
			std::thread::Builder::new()
				.name("spindle-transport".to_owned())
				.spawn(move || pump(&shared))
				.ok()
		};

		Self { shared, worker }
	}

	/// # Load a Disc and Start Playing.
	///
	/// Replaces whatever was going on before. `watch` ties a live rip to
	/// the streamer so it knows to wait for the file to grow.
	pub fn load(
		&self,
		disc: Arc<DiscInfo>,
		source_id: DiscId,
		pcm: PathBuf,
		watch: Option<Arc<RipWatch>>,
	) {
		let track = disc.first_track().unwrap_or(1);
		let working = PlayerState {
			state: PlayerPhase::Working,
			disc_id: Some(disc.id.clone()),
			source_disc_id: Some(source_id.clone()),
			no_tracks: disc.no_tracks(),
			..PlayerState::default()
		};

		let mut ctl = self.shared.lock();
		ctl.session.replace(Session { disc, source_id, pcm, watch });
		ctl.pending.replace(StreamStart { track, position: None, paused: false });
		ctl.run = Run::Play;
		if ctl.last != working {
			ctl.last = working.clone();
			let _res = ctl.tx.send(working);
		}
		self.shared.kick(&mut ctl);
	}

	/// # Unload (Eject).
	///
	/// Stop everything and forget the disc. The player publishes the
	/// `NO_DISC` state itself, after it has released the hardware.
	pub fn unload(&self) {
		let mut ctl = self.shared.lock();
		ctl.session = None;
		ctl.pending = None;
		ctl.run = Run::Stop;
		ctl.last = PlayerState::default();
		let _res = ctl.tx.send(ctl.last.clone());
		self.shared.kick(&mut ctl);
	}

	/// # Play.
	///
	/// Resume from `PAUSE`, restart from `STOP`, nothing otherwise.
	pub fn play(&self) {
		let mut ctl = self.shared.lock();
		match ctl.run {
			Run::Pause => {
				ctl.run = Run::Play;
				// A mid-track pause resumes in place; a boundary hold is
				// woken by the notify below.
				let _res = self.shared.sink.resume();
				let mut state = ctl.last.clone();
				state.state = PlayerPhase::Play;
				if ctl.last != state {
					ctl.last = state.clone();
					let _res = ctl.tx.send(state);
				}
				self.shared.cond.notify_all();
			},
			Run::Stop => if let Some(session) = &ctl.session {
				let track = session.disc.first_track().unwrap_or(1);
				ctl.pending.replace(StreamStart { track, position: None, paused: false });
				ctl.run = Run::Play;
				self.shared.kick(&mut ctl);
			},
			Run::Play => {},
		}
	}

	/// # Pause.
	///
	/// Only meaningful while playing.
	pub fn pause(&self) {
		let mut ctl = self.shared.lock();
		if ctl.run != Run::Play || ctl.session.is_none() { return; }
		ctl.run = Run::Pause;
		let _res = self.shared.sink.pause();

		let mut state = ctl.last.clone();
		state.state = PlayerPhase::Pause;
		if ctl.last != state {
			ctl.last = state.clone();
			let _res = ctl.tx.send(state);
		}
	}

	/// # Stop.
	///
	/// Kill the stream but keep the disc loaded.
	pub fn stop(&self) {
		let mut ctl = self.shared.lock();
		if ctl.session.is_none() { return; }
		ctl.pending = None;
		ctl.run = Run::Stop;
		self.shared.kick(&mut ctl);

		let mut state = ctl.last.clone();
		state.state = PlayerPhase::Stop;
		if ctl.last != state {
			ctl.last = state.clone();
			let _res = ctl.tx.send(state);
		}
	}

	/// # Next / Previous Track.
	///
	/// Restart at the adjacent non-skipped track, preserving pause. Next
	/// past the end stops; previous before the beginning restarts the
	/// first track.
	pub fn skip(&self, forward: bool) {
		let mut ctl = self.shared.lock();
		let Some(session) = &ctl.session else { return; };
		let disc = Arc::clone(&session.disc);

		let current = ctl.last.track;
		let target = disc.adjacent_track(current, forward)
			.or_else(||
				// Nowhere to anchor (or walked off the front): the first
				// playable track. Off the back stays None and stops.
				if forward && disc.track(current).is_some() { None }
				else { disc.first_track() }
			);

		match target {
			Some(track) => {
				let paused = ctl.run == Run::Pause;
				ctl.pending.replace(StreamStart { track, position: None, paused });
				if ctl.run == Run::Stop { ctl.run = Run::Play; }
				self.shared.kick(&mut ctl);
			},
			// Ran off the end.
			None => if forward {
				drop(ctl);
				self.stop();
			},
		}
	}

	/// # Play a Specific Track.
	///
	/// ## Errors
	///
	/// This will return an error if the track doesn't exist on the loaded
	/// disc (or nothing is loaded).
	pub fn play_track(&self, track: u8) -> Result<(), SpindleError> {
		let mut ctl = self.shared.lock();
		let Some(session) = &ctl.session else { return Err(SpindleError::NoDisc); };
		if session.disc.track(track).is_none() {
			return Err(SpindleError::NoTrack(track));
		}

		ctl.pending.replace(StreamStart { track, position: None, paused: false });
		ctl.run = Run::Play;
		self.shared.kick(&mut ctl);
		Ok(())
	}

	/// # Seek Within the Current Track.
	///
	/// ## Errors
	///
	/// This will return an error if nothing is playing.
	pub fn seek(&self, seconds: i32) -> Result<(), SpindleError> {
		let mut ctl = self.shared.lock();
		let Some(session) = &ctl.session else { return Err(SpindleError::NoDisc); };
		let track = ctl.last.track;
		if session.disc.track(track).is_none() {
			return Err(SpindleError::InvalidState("seek"));
		}

		let paused = ctl.run == Run::Pause;
		ctl.pending.replace(StreamStart { track, position: Some(seconds), paused });
		self.shared.kick(&mut ctl);
		Ok(())
	}

	#[must_use]
	/// # Current Source Disc Id.
	pub fn source_id(&self) -> Option<DiscId> {
		self.shared.lock().session.as_ref().map(|s| s.source_id.clone())
	}

	#[must_use]
	/// # Last Published State.
	pub fn last_state(&self) -> PlayerState { self.shared.lock().last.clone() }

	/// # Shut Down.
	pub fn shutdown(&mut self) {
		{
			let mut ctl = self.shared.lock();
			ctl.shutdown = true;
			ctl.pending = None;
			self.shared.kick(&mut ctl);
		}
		if let Some(worker) = self.worker.take() {
			let _res = worker.join();
		}
		self.shared.sink.shutdown();
	}
}



/// # The Pump.
///
/// Sessions come and go; within one, packets flow until the stream runs
/// dry, somebody queues a replacement, or the sink closes under us.
fn pump(shared: &TransportShared) {
	loop {
		// Wait for work.
		let Some((session, start)) = next_start(shared) else { return; };

		let halt = Arc::new(AtomicBool::new(false));
		shared.lock().halt.replace(Arc::clone(&halt));

		let mut stream = match PacketStream::new(
			Arc::clone(&session.disc),
			&session.pcm,
			start.track,
			start.position,
			shared.poll,
			session.watch.clone(),
			Arc::clone(&halt),
		) {
			Ok(stream) => stream,
			Err(e) => {
				publish_error(shared, &session, e);
				continue;
			},
		};

		// A clean sink for a clean stream.
		shared.sink.stop();
		if let Err(e) = shared.sink.start() {
			publish_error(shared, &session, e);
			continue;
		}

		let mut hold = start.paused;
		let mut last_err: Option<String> = None;
		'stream: loop {
			// A replacement (or stop) may have been queued while we were
			// busy; don't play over it.
			if halted(shared) { break 'stream; }

			let packet = match stream.next_packet() {
				Ok(Some(packet)) => packet,
				// Dry: either halted (the next session is queued) or the
				// disc genuinely ran out.
				Ok(None) => {
					if ! halted(shared) { finish_stream(shared, &session); }
					break 'stream;
				},
				Err(e) => {
					shared.sink.stop();
					publish_error(shared, &session, e);
					break 'stream;
				},
			};

			// A boundary hold: flush what's audible, report the pause,
			// and sit tight for a resume.
			if packet.pause_before() || hold {
				hold = false;
				while let Some((playing, err)) = shared.sink.drain() {
					if let Some(playing) = playing {
						publish_packet(shared, &session, &playing, err, PlayerPhase::Play);
					}
				}
				shared.lock().run = Run::Pause;
				publish_packet(shared, &session, &packet, None, PlayerPhase::Pause);
				if ! wait_resume(shared) { break 'stream; }
				if shared.sink.start().is_err() {
					// Somebody else owns the sink now; bow out.
					break 'stream;
				}
			}

			// Feed it through, re-publishing as the audible packet (or
			// the device's mood) changes.
			let mut offset = 0;
			while offset < packet.data().len() {
				let res = shared.sink.add_packet(&packet, offset, last_err.as_deref());
				if res.closed { break 'stream; }
				offset += res.stored;
				last_err.clone_from(&res.err);

				if let Some(playing) = &res.playing {
					let phase = phase_now(shared);
					publish_packet(shared, &session, playing, res.err.clone(), phase);
				}
				else if let Some(err) = res.err {
					// No audio moving yet, but the device has news.
					publish_packet(shared, &session, &packet, Some(err), phase_now(shared));
				}
			}
		}

		shared.lock().halt = None;
	}
}

/// # Wait For a Stream Start.
///
/// `None` means shutdown.
fn next_start(shared: &TransportShared) -> Option<(Session, StreamStart)> {
	let mut ctl = shared.lock();
	loop {
		if ctl.shutdown { return None; }
		if let Some(start) = ctl.pending.take() {
			if let Some(session) = ctl.session.clone() {
				return Some((session, start));
			}
		}
		ctl = shared.wait(ctl);
	}
}

/// # Current Phase From the Run Mode.
fn phase_now(shared: &TransportShared) -> PlayerPhase {
	match shared.lock().run {
		Run::Pause => PlayerPhase::Pause,
		_ => PlayerPhase::Play,
	}
}

/// # Halted?
fn halted(shared: &TransportShared) -> bool {
	let ctl = shared.lock();
	ctl.shutdown || ctl.pending.is_some() || ctl.run == Run::Stop
}

/// # Park At a Pause Boundary.
///
/// Returns `true` on resume, `false` if the session is over (replaced,
/// stopped, or shut down).
fn wait_resume(shared: &TransportShared) -> bool {
	let mut ctl = shared.lock();
	loop {
		if ctl.shutdown || ctl.pending.is_some() || ctl.run == Run::Stop { return false; }
		if ctl.run == Run::Play { return true; }
		ctl = shared.wait(ctl);
	}
}

/// # Publish a Packet-Derived State.
fn publish_packet(
	shared: &TransportShared,
	session: &Session,
	packet: &crate::Packet,
	err: Option<String>,
	phase: PlayerPhase,
) {
	shared.publish(PlayerState {
		state: phase,
		disc_id: Some(session.disc.id.clone()),
		source_disc_id: Some(session.source_id.clone()),
		track: packet.track(),
		no_tracks: session.disc.no_tracks(),
		index: packet.index(),
		position: packet.position_seconds(),
		length: packet.track_length(),
		error: err,
	})
}

/// # Natural End of Stream.
///
/// Drain the tail, then settle into `STOP` wherever playback ended.
fn finish_stream(shared: &TransportShared, session: &Session) {
	while let Some((playing, err)) = shared.sink.drain() {
		if let Some(playing) = playing {
			publish_packet(shared, session, &playing, err, PlayerPhase::Play);
		}
	}

	let mut ctl = shared.lock();
	ctl.run = Run::Stop;
	let mut state = ctl.last.clone();
	state.state = PlayerPhase::Stop;
	if ctl.last != state {
		ctl.last = state.clone();
		let _res = ctl.tx.send(state);
	}
}

/// # Publish an Error Stop.
fn publish_error(shared: &TransportShared, session: &Session, err: SpindleError) {
	{
		let mut ctl = shared.lock();
		ctl.run = Run::Stop;
	}
	shared.publish(PlayerState {
		state: PlayerPhase::Stop,
		disc_id: Some(session.disc.id.clone()),
		source_disc_id: Some(session.source_id.clone()),
		no_tracks: session.disc.no_tracks(),
		error: Some(err.to_string()),
		..PlayerState::default()
	});
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		LogQueue,
		TrackInfo,
		PACKET_BYTES,
		sink::fake::{
			FakeGuts,
			FakeOpen,
		},
	};
	use std::{
		io::Write,
		sync::mpsc::{
			Receiver,
			channel,
		},
		time::Instant,
	};
	use tempfile::NamedTempFile;

	const PKT: u64 = PACKET_BYTES as u64;

	/// # Three-Track Disc and Matching PCM File.
	///
	/// Track one: ten packets (a second of audio). Track two: five. Track
	/// three: five, with half a packet of pregap carved from track two.
	fn disc() -> (Arc<DiscInfo>, NamedTempFile) {
		let t1_len = PKT * 10;
		let t2_start = t1_len;
		let t2_len = PKT * 5;
		let t3_pregap = t2_start + t2_len;
		let t3_start = t3_pregap + PKT / 2;
		let t3_len = PKT * 5;

		let disc = Arc::new(DiscInfo {
			tracks: vec![
				TrackInfo {
					number: 1,
					file_offset: 0,
					length: t1_len,
					pregap_offset: 0,
					..TrackInfo::default()
				},
				TrackInfo {
					number: 2,
					file_offset: t2_start,
					length: t2_len,
					pregap_offset: t2_start,
					..TrackInfo::default()
				},
				TrackInfo {
					number: 3,
					file_offset: t3_start,
					length: t3_len,
					pregap_offset: t3_pregap,
					..TrackInfo::default()
				},
			],
			..DiscInfo::default()
		});

		let total = usize::try_from(disc.expected_pcm_bytes()).expect("Total doesn't fit.");
		let data: Vec<u8> = (0..u8::MAX).cycle().take(total).collect();
		let mut file = NamedTempFile::new().expect("Tempfile failed.");
		file.write_all(&data).expect("PCM write failed.");
		file.flush().expect("PCM flush failed.");

		(disc, file)
	}

	/// # Fixture.
	fn fixture(throttle: Duration) -> (Transport, Arc<FakeGuts>, Receiver<PlayerState>, LogQueue) {
		let guts = Arc::new(FakeGuts::default());
		*guts.throttle.lock().unwrap() = throttle;
		let log = LogQueue::default();
		let sink = PcmSink::new(
			Box::new(FakeOpen(Arc::clone(&guts))),
			&log,
			Duration::from_millis(10),
		);
		let (tx, rx) = channel();
		let transport = Transport::new(sink, tx, Duration::from_millis(5));
		(transport, guts, rx, log)
	}

	/// # Collect States Until a Predicate Hits (Or Five Seconds Pass).
	fn wait_state<F>(rx: &Receiver<PlayerState>, seen: &mut Vec<PlayerState>, mut what: F) -> bool
	where F: FnMut(&PlayerState) -> bool {
		let deadline = Instant::now() + Duration::from_secs(5);
		while Instant::now() < deadline {
			match rx.recv_timeout(Duration::from_millis(100)) {
				Ok(state) => {
					let hit = what(&state);
					seen.push(state);
					if hit { return true; }
				},
				Err(_) => {},
			}
		}
		false
	}

	#[test]
	fn t_play_through() {
		let (disc, file) = disc();
		let (mut transport, guts, rx, _log) = fixture(Duration::ZERO);

		transport.load(
			Arc::clone(&disc),
			disc.id.clone(),
			file.path().to_path_buf(),
			None,
		);

		let mut seen = Vec::new();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Stop),
			"Playback should end in STOP.",
		);

		// It should have visited every track, in order, in PLAY.
		let tracks: Vec<u8> = seen.iter()
			.filter(|s| s.state == PlayerPhase::Play)
			.map(|s| s.track)
			.collect();
		assert!(tracks.contains(&1), "Track one never played.");
		assert!(tracks.contains(&2), "Track two never played.");
		assert!(tracks.contains(&3), "Track three never played.");
		assert!(tracks.windows(2).all(|w| w[0] <= w[1]), "Tracks played out of order.");

		// The final STOP keeps its place.
		let last = seen.last().expect("No states at all.");
		assert_eq!(last.track, 3, "STOP should keep the final track.");

		// And every byte should have reached the device.
		let written = guts.written.lock().unwrap().len() as u64;
		assert!(
			written >= disc.expected_pcm_bytes(),
			"The device should hear the whole disc (plus pad).",
		);

		transport.shutdown();
	}

	#[test]
	fn t_positions_monotonic() {
		let (disc, file) = disc();
		let (mut transport, _guts, rx, _log) = fixture(Duration::from_millis(2));

		transport.load(
			Arc::clone(&disc),
			disc.id.clone(),
			file.path().to_path_buf(),
			None,
		);

		let mut seen = Vec::new();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Stop),
			"Playback should end in STOP.",
		);

		// Within one track, PLAY positions never go backward.
		for pair in seen.iter()
			.filter(|s| s.state == PlayerPhase::Play)
			.collect::<Vec<_>>()
			.windows(2) {
			if pair[0].track == pair[1].track {
				assert!(
					pair[0].position <= pair[1].position,
					"Positions went backward mid-track.",
				);
			}
		}

		transport.shutdown();
	}

	#[test]
	fn t_pause_resume() {
		let (disc, file) = disc();
		let (mut transport, guts, rx, _log) = fixture(Duration::from_millis(5));

		transport.load(
			Arc::clone(&disc),
			disc.id.clone(),
			file.path().to_path_buf(),
			None,
		);

		let mut seen = Vec::new();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Play),
			"Playback should start.",
		);

		transport.pause();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Pause),
			"Pause should publish PAUSE.",
		);
		let held = seen.last().expect("No states at all.").position;
		assert!(guts.pauses.load(std::sync::atomic::Ordering::SeqCst) >= 1, "No hardware pause.");

		// Nothing should advance while held.
		std::thread::sleep(Duration::from_millis(50));
		transport.play();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Play),
			"Resume should publish PLAY.",
		);
		assert!(
			(seen.last().expect("No states at all.").position - held).abs() <= 1,
			"Resume should pick up within a second of the hold.",
		);

		transport.shutdown();
	}

	#[test]
	fn t_skip_over_skipped() {
		let (disc, file) = disc();
		let mut disc2 = (*disc).clone();
		disc2.tracks[1].skip = true; // Skip #2.
		let disc = Arc::new(disc2);

		let (mut transport, _guts, rx, _log) = fixture(Duration::from_millis(2));
		transport.load(
			Arc::clone(&disc),
			disc.id.clone(),
			file.path().to_path_buf(),
			None,
		);

		let mut seen = Vec::new();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Play && s.track == 1),
			"Track one should play.",
		);

		transport.skip(true);
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Play && s.track == 3),
			"Next should land on track three.",
		);
		assert!(
			seen.iter().all(|s| s.track != 2),
			"The skipped track must never surface.",
		);

		transport.shutdown();
	}

	#[test]
	fn t_pause_after_boundary() {
		let (disc, file) = disc();
		let mut disc2 = (*disc).clone();
		disc2.tracks[0].pause_after = true;
		let disc = Arc::new(disc2);

		let (mut transport, guts, rx, _log) = fixture(Duration::ZERO);
		transport.load(
			Arc::clone(&disc),
			disc.id.clone(),
			file.path().to_path_buf(),
			None,
		);

		// The boundary should come up PAUSE on track two, position zero,
		// before any of track two's audio hits the device.
		let mut seen = Vec::new();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Pause),
			"The boundary should pause.",
		);
		let held = seen.last().expect("No states at all.");
		assert_eq!(held.track, 2, "The pause belongs to track two.");
		assert_eq!(held.position, 0, "The pause sits at position zero.");

		let t1_bytes = disc.tracks[0].length;
		let written = guts.written.lock().unwrap().len() as u64;
		assert!(
			written <= t1_bytes,
			"No track-two audio before the resume.",
		);

		// Resume and let it finish.
		transport.play();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Stop),
			"Playback should finish after the resume.",
		);

		transport.shutdown();
	}

	#[test]
	fn t_stop_keeps_disc() {
		let (disc, file) = disc();
		let (mut transport, _guts, rx, _log) = fixture(Duration::from_millis(5));

		transport.load(
			Arc::clone(&disc),
			disc.id.clone(),
			file.path().to_path_buf(),
			None,
		);

		let mut seen = Vec::new();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Play),
			"Playback should start.",
		);

		transport.stop();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Stop),
			"Stop should publish STOP.",
		);
		assert!(transport.source_id().is_some(), "The disc should stay loaded.");

		// And play should start it over.
		transport.play();
		assert!(
			wait_state(&rx, &mut seen, |s| s.state == PlayerPhase::Play && s.track == 1),
			"Play from STOP should restart at track one.",
		);

		transport.shutdown();
	}
}
