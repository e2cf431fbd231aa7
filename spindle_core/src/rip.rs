/*!
# Spindle: Ripping

Spindle doesn't read audio off the disc itself; it supervises two external
programs that do. The audio ripper runs first so playback can begin the
moment bytes hit the archive; the subchannel/TOC reader follows, and its
output gets reconciled into the disc record. Both children run on a leash:
a wall-clock timeout, a kill switch for eject, and a configurable speed
cap passed through on the command line.

Audio progress is inferred by watching the output file grow; the TOC
reader's progress is scraped from its stderr.
*/

use crate::{
	Archive,
	Config,
	DiscId,
	DiscInfo,
	RipPhase,
	RipState,
	SpindleError,
};
use dactyl::int_div_float;
use std::{
	io::{
		BufRead,
		BufReader,
	},
	process::{
		Child,
		Command,
		Stdio,
	},
	sync::{
		Arc,
		Mutex,
		atomic::{
			AtomicBool,
			AtomicU8,
			Ordering::{
				Acquire,
				Release,
			},
		},
		mpsc::Sender,
	},
	thread::JoinHandle,
	time::{
		Duration,
		Instant,
	},
};



/// # Monitor Poll Interval.
const MONITOR_POLL: Duration = Duration::from_millis(250);

/// # Progress Unknown Marker.
const PROGRESS_UNKNOWN: u8 = u8::MAX;



#[derive(Debug, Default)]
/// # Rip Watch.
///
/// A little shared scoreboard so the source streamer knows whether the
/// bytes it's waiting on might still show up.
pub struct RipWatch {
	/// # Audio Phase Running?
	audio: AtomicBool,

	/// # Terminal Failure?
	failed: AtomicBool,
}

impl RipWatch {
	#[must_use]
	/// # Is Audio Still Coming?
	pub fn audio_live(&self) -> bool { self.audio.load(Acquire) }

	/// # Flip the Audio Phase Flag.
	pub(crate) fn set_audio_live(&self, live: bool) { self.audio.store(live, Release); }

	#[must_use]
	/// # Did the Rip Die?
	pub fn failed(&self) -> bool { self.failed.load(Acquire) }

	/// # Mark It Dead.
	pub(crate) fn set_failed(&self) { self.failed.store(true, Release); }
}



#[derive(Debug, Clone)]
/// # Rip Updates.
///
/// Everything the supervisor has to say flows through the player's queue
/// as one of these; nothing is ever thrown across the thread boundary.
pub enum RipUpdate {
	/// # Phase/Progress/Error Changed.
	Progress(RipState),

	/// # The Subchannel TOC Landed.
	///
	/// Time for the player to reconcile it into the disc record.
	TocReady(DiscId),

	/// # All Done (Well Or Badly).
	Finished(DiscId),
}



#[derive(Debug)]
/// # Ripper.
///
/// Supervises one disc's rip from spawn to finish. Dropping (or aborting)
/// kills whichever child is running.
pub struct Ripper {
	/// # Shared Scoreboard.
	watch: Arc<RipWatch>,

	/// # Kill Flag.
	halt: Arc<AtomicBool>,

	/// # The Current Child, If Any.
	child: Arc<Mutex<Option<Child>>>,

	/// # Supervisor Thread.
	worker: Option<JoinHandle<()>>,
}

impl Drop for Ripper {
	fn drop(&mut self) { self.abort(); }
}

impl Ripper {
	/// # Spawn.
	///
	/// Kick off the audio phase and return immediately; everything else
	/// happens on the supervisor thread, reporting through `tx`.
	///
	/// ## Errors
	///
	/// This will return an error if the supervisor thread can't be
	/// spawned; child-program failures are reported asynchronously.
	pub fn spawn(
		config: &Config,
		archive: &Archive,
		disc: &DiscInfo,
		tx: Sender<RipUpdate>,
	) -> Result<Self, SpindleError> {
		let watch = Arc::new(RipWatch::default());
		// Live from the caller's point of view the moment we return, not
		// whenever the supervisor thread gets scheduled; the streamer may
		// look immediately.
		watch.set_audio_live(true);
		let halt = Arc::new(AtomicBool::new(false));
		let child = Arc::new(Mutex::new(None));

		let worker = {
			let watch = Arc::clone(&watch);
			let halt = Arc::clone(&halt);
			let child = Arc::clone(&child);
			let config = config.clone();
			let archive = archive.clone();
			let disc = disc.clone();
			std::thread::Builder::new()
				.name("spindle-rip".to_owned())
				.spawn(move || supervise(&config, &archive, &disc, &watch, &halt, &child, &tx))
				.map_err(|_| SpindleError::Rip("unable to spawn the supervisor".to_owned()))?
		};

		Ok(Self { watch, halt, child, worker: Some(worker) })
	}

	#[must_use]
	/// # The Scoreboard.
	pub fn watch(&self) -> Arc<RipWatch> { Arc::clone(&self.watch) }

	/// # Abort.
	///
	/// Kill whatever child is running and reap the supervisor. Called on
	/// eject and shutdown; harmless to repeat.
	pub fn abort(&mut self) {
		self.halt.store(true, Release);
		if let Some(child) = self.child.lock().unwrap_or_else(std::sync::PoisonError::into_inner).as_mut() {
			let _res = child.kill();
		}
		if let Some(worker) = self.worker.take() {
			let _res = worker.join();
		}
	}

	#[must_use]
	/// # Still Going?
	pub fn running(&self) -> bool {
		self.worker.as_ref().is_some_and(|w| ! w.is_finished())
	}
}



/// # The Supervisor.
///
/// Audio first, TOC second, updates throughout.
fn supervise(
	config: &Config,
	archive: &Archive,
	disc: &DiscInfo,
	watch: &RipWatch,
	halt: &AtomicBool,
	child: &Mutex<Option<Child>>,
	tx: &Sender<RipUpdate>,
) {
	let id = disc.id.clone();
	let send_state = |phase: RipPhase, progress: Option<u8>, error: Option<String>| {
		let _res = tx.send(RipUpdate::Progress(RipState {
			state: phase,
			disc_id: Some(id.clone()),
			progress,
			error,
		}));
	};

	// Phase one: audio.
	watch.set_audio_live(true);
	send_state(RipPhase::Audio, Some(0), None);
	let audio = audio_phase(config, archive, disc, halt, child, &send_state);
	watch.set_audio_live(false);

	match audio {
		Ok(()) => { send_state(RipPhase::Audio, Some(100), None); },
		Err(e) => {
			// Whatever was read stays in the archive; the disc will re-rip
			// on a later insertion. But there's no point reading the
			// subchannel for a disc we couldn't even get audio off of.
			watch.set_failed();
			send_state(RipPhase::Inactive, None, Some(e.to_string()));
			let _res = tx.send(RipUpdate::Finished(id));
			return;
		},
	}

	// Phase two: the subchannel TOC.
	send_state(RipPhase::Toc, None, None);
	match toc_phase(config, archive, disc, halt, child, &send_state) {
		Ok(()) => {
			send_state(RipPhase::Inactive, Some(100), None);
			let _res = tx.send(RipUpdate::TocReady(id.clone()));
		},
		// A TOC failure leaves the disc playable on the basic TOC alone.
		Err(e) => { send_state(RipPhase::Inactive, None, Some(e.to_string())); },
	}

	let _res = tx.send(RipUpdate::Finished(id));
}

/// # Audio Phase.
///
/// Launch the ripper and watch its output file grow until the child exits,
/// the clock runs out, or somebody pulls the plug.
fn audio_phase(
	config: &Config,
	archive: &Archive,
	disc: &DiscInfo,
	halt: &AtomicBool,
	child_slot: &Mutex<Option<Child>>,
	send_state: &dyn Fn(RipPhase, Option<u8>, Option<String>),
) -> Result<(), SpindleError> {
	let dest = archive.pcm_path(&disc.id);

	// A partial rip from an earlier insertion starts over. Truncate in
	// place rather than unlinking: the streamer may already hold the file
	// open, and it needs to see the fresh bytes land.
	if dest.exists() && ! archive.complete(disc) {
		let _res = std::fs::File::create(&dest);
	}

	let cmd = config.audio_rip_cmd(&dest.to_string_lossy());
	let _stderr = spawn_child(&cmd, Stdio::null(), child_slot)?;

	let expected = disc.expected_pcm_bytes();
	let started = Instant::now();
	let mut last_progress = Some(0_u8);

	loop {
		if let Some(status) = poll_child(child_slot, halt, started, config.rip_timeout())? {
			// A sour exit with bytes on disk is partial success; empty-
			// handed is failure.
			return
				if status || archive.pcm_len(&disc.id) != 0 { Ok(()) }
				else { Err(SpindleError::Rip("the audio ripper produced nothing".to_owned())) };
		}

		let progress = percent(archive.pcm_len(&disc.id), expected);
		if progress != last_progress {
			last_progress = progress;
			send_state(RipPhase::Audio, progress, None);
		}
		std::thread::sleep(MONITOR_POLL);
	}
}

/// # TOC Phase.
///
/// Launch the subchannel reader and scrape percentages off its stderr.
fn toc_phase(
	config: &Config,
	archive: &Archive,
	disc: &DiscInfo,
	halt: &AtomicBool,
	child_slot: &Mutex<Option<Child>>,
	send_state: &dyn Fn(RipPhase, Option<u8>, Option<String>),
) -> Result<(), SpindleError> {
	let dest = archive.full_toc_path(&disc.id);

	// cdrdao refuses to clobber; clear the way.
	if dest.exists() { let _res = std::fs::remove_file(&dest); }

	let cmd = config.toc_rip_cmd(&dest.to_string_lossy());
	let stderr = spawn_child(&cmd, Stdio::piped(), child_slot)?;

	// Percentages arrive on their own schedule; a side thread parses them
	// into an atomic the monitor loop can poll.
	let scraped = Arc::new(AtomicU8::new(PROGRESS_UNKNOWN));
	let scraper = stderr.map(|stderr| {
		let scraped = Arc::clone(&scraped);
		std::thread::spawn(move || {
			for line in BufReader::new(stderr).lines() {
				let Ok(line) = line else { break; };
				if let Some(pct) = scrape_percent(&line) {
					scraped.store(pct, Release);
				}
			}
		})
	});

	let started = Instant::now();
	let mut last_progress = None;
	let res = loop {
		if let Some(status) = poll_child(child_slot, halt, started, config.rip_timeout())? {
			break status;
		}

		let pct = scraped.load(Acquire);
		let progress = if pct == PROGRESS_UNKNOWN { None } else { Some(pct) };
		if progress.is_some() && progress != last_progress {
			last_progress = progress;
			send_state(RipPhase::Toc, progress, None);
		}
		std::thread::sleep(MONITOR_POLL);
	};

	if let Some(scraper) = scraper { let _res = scraper.join(); }

	if res && dest.is_file() { Ok(()) }
	else { Err(SpindleError::Rip("the TOC reader failed".to_owned())) }
}



/// # Spawn a Child.
///
/// Returns the piped stderr handle, if piping was requested.
fn spawn_child(
	cmd: &[String],
	stderr: Stdio,
	child_slot: &Mutex<Option<Child>>,
) -> Result<Option<std::process::ChildStderr>, SpindleError> {
	let (program, args) = cmd.split_first()
		.ok_or_else(|| SpindleError::Rip("empty rip command".to_owned()))?;

	let mut child = Command::new(program)
		.args(args)
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(stderr)
		.spawn()
		.map_err(|_| SpindleError::Child(program.clone()))?;

	let stderr = child.stderr.take();
	child_slot.lock()
		.unwrap_or_else(std::sync::PoisonError::into_inner)
		.replace(child);
	Ok(stderr)
}

/// # Poll the Child.
///
/// Returns `Some(success)` once the child has exited, handling kill
/// requests and the wall-clock timeout along the way.
///
/// ## Errors
///
/// This will return an error if the rip was aborted or timed out; the
/// child is killed first either way.
fn poll_child(
	child_slot: &Mutex<Option<Child>>,
	halt: &AtomicBool,
	started: Instant,
	timeout: Duration,
) -> Result<Option<bool>, SpindleError> {
	let mut guard = child_slot.lock()
		.unwrap_or_else(std::sync::PoisonError::into_inner);
	let Some(child) = guard.as_mut() else { return Ok(Some(false)); };

	if halt.load(Acquire) {
		let _res = child.kill();
		let _res = child.wait();
		guard.take();
		return Err(SpindleError::Killed);
	}

	if timeout < started.elapsed() {
		let _res = child.kill();
		let _res = child.wait();
		guard.take();
		return Err(SpindleError::Rip("ran out the clock".to_owned()));
	}

	match child.try_wait() {
		Ok(Some(status)) => {
			guard.take();
			Ok(Some(status.success()))
		},
		Ok(None) => Ok(None),
		Err(_) => {
			guard.take();
			Err(SpindleError::Rip("lost track of the child".to_owned()))
		},
	}
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "Range-checked.")]
/// # Percent of Expected.
fn percent(got: u64, expected: u64) -> Option<u8> {
	if expected == 0 { return None; }
	let pct = (int_div_float(got, expected)? * 100.0).floor();
	if pct.is_finite() && (0.0..=100.0).contains(&pct) { Some(pct as u8) }
	else { Some(100) }
}

/// # Scrape a Percentage From a Progress Line.
///
/// The TOC readers print things like `Analyzing track 3: 42%`; the number
/// right before the last percent sign is the one we want.
fn scrape_percent(line: &str) -> Option<u8> {
	let pos = line.rfind('%')?;
	let digits: String = line[..pos].chars()
		.rev()
		.take_while(char::is_ascii_digit)
		.collect::<String>()
		.chars()
		.rev()
		.collect();
	let pct = digits.parse::<u8>().ok()?;
	if pct <= 100 { Some(pct) }
	else { None }
}



#[cfg(test)]
mod test {
	use super::*;
	use cdtoc::Toc;
	use std::sync::mpsc;
	use tempfile::TempDir;

	/// A disc small enough to "rip" with dd.
	const CDTOC_TINY: &str = "1+96+2D2B";

	/// # Fixture.
	fn fixture() -> (TempDir, Archive, DiscInfo) {
		let dir = TempDir::new().expect("Tempdir failed.");
		let archive = Archive::new(dir.path()).expect("Archive failed.");
		let toc = Toc::from_cdtoc(CDTOC_TINY).expect("TOC failed to parse.");
		let disc = DiscInfo::from_toc(&toc);
		archive.create(&disc, &toc).expect("Create failed.");
		(dir, archive, disc)
	}

	/// # Wait For the Finished Marker.
	fn drain(rx: &mpsc::Receiver<RipUpdate>) -> Vec<RipUpdate> {
		let mut out = Vec::new();
		while let Ok(update) = rx.recv_timeout(Duration::from_secs(10)) {
			let done = matches!(update, RipUpdate::Finished(_));
			out.push(update);
			if done { break; }
		}
		out
	}

	#[test]
	fn t_scrape_percent() {
		assert_eq!(scrape_percent("Analyzing track 3: 42%"), Some(42), "Plain percent.");
		assert_eq!(scrape_percent("42% done, 10% idle... 7%"), Some(7), "Last one wins.");
		assert_eq!(scrape_percent("100%"), Some(100), "Bare percent.");
		assert_eq!(scrape_percent("no numbers here"), None, "No percent, no answer.");
		assert_eq!(scrape_percent("930%"), None, "Silly values are ignored.");
	}

	#[test]
	fn t_percent() {
		assert_eq!(percent(0, 100), Some(0), "Zero of anything is zero.");
		assert_eq!(percent(50, 100), Some(50), "Half is half.");
		assert_eq!(percent(200, 100), Some(100), "Overshoot caps at 100.");
		assert_eq!(percent(1, 0), None, "Unknown totals are unknowable.");
	}

	#[test]
	fn t_rip_happy() {
		let (_dir, archive, disc) = fixture();
		let expected = disc.expected_pcm_bytes();

		// Stand-ins: dd "rips" the audio; printf "reads" the TOC.
		let audio_script = format!(
			"dd if=/dev/zero of={{file}} bs={expected} count=1 2>/dev/null",
		);
		let config = Config::default()
			.with_audio_rip_cmd(
				["sh", "-c", audio_script.as_str()]
					.into_iter().map(str::to_owned),
			)
			.with_toc_rip_cmd(
				["sh", "-c", "printf 'CD_DA\\nTRACK AUDIO\\nFILE \"data.wav\" 0 11413\\n' > {file}; echo '100%' >&2"]
					.into_iter().map(str::to_owned),
			);

		let (tx, rx) = mpsc::channel();
		let mut ripper = Ripper::spawn(&config, &archive, &disc, tx)
			.expect("Spawn failed.");
		let watch = ripper.watch();

		let updates = drain(&rx);
		assert!(
			updates.iter().any(|u| matches!(u, RipUpdate::TocReady(_))),
			"The TOC phase should report in.",
		);
		assert!(
			updates.iter().any(|u| matches!(u, RipUpdate::Finished(_))),
			"The rip should finish.",
		);
		assert!(! watch.failed(), "Nothing should have failed.");
		assert!(! watch.audio_live(), "The audio phase should be over.");
		assert!(archive.complete(&disc), "The archive should be fully ripped.");
		assert!(
			archive.load_full_toc(&disc.id).expect("TOC read failed.").is_some(),
			"The full TOC should be on disk.",
		);

		ripper.abort(); // Harmless after the fact.
	}

	#[test]
	fn t_rip_audio_failure() {
		let (_dir, archive, disc) = fixture();

		let config = Config::default()
			.with_audio_rip_cmd(["false"].into_iter().map(str::to_owned))
			.with_toc_rip_cmd(["true"].into_iter().map(str::to_owned));

		let (tx, rx) = mpsc::channel();
		let mut ripper = Ripper::spawn(&config, &archive, &disc, tx)
			.expect("Spawn failed.");
		let watch = ripper.watch();

		let updates = drain(&rx);
		assert!(watch.failed(), "An empty-handed audio rip is a failure.");
		assert!(
			! updates.iter().any(|u| matches!(u, RipUpdate::TocReady(_))),
			"No TOC phase after a dead audio phase.",
		);
		assert!(
			updates.iter().any(|u| matches!(
				u,
				RipUpdate::Progress(RipState { error: Some(_), .. }),
			)),
			"The failure should surface in a rip state.",
		);

		ripper.abort();
	}

	#[test]
	fn t_rip_timeout() {
		let (_dir, archive, disc) = fixture();

		let config = Config::default()
			.with_audio_rip_cmd(["sleep", "30"].into_iter().map(str::to_owned))
			.with_rip_timeout(Duration::from_millis(100));

		let (tx, rx) = mpsc::channel();
		let mut ripper = Ripper::spawn(&config, &archive, &disc, tx)
			.expect("Spawn failed.");

		let updates = drain(&rx);
		assert!(
			updates.iter().any(|u| matches!(
				u,
				RipUpdate::Progress(RipState { error: Some(_), .. }),
			)),
			"A timeout should surface as an error.",
		);
		assert!(
			updates.iter().any(|u| matches!(u, RipUpdate::Finished(_))),
			"Even a timeout finishes the rip.",
		);

		ripper.abort();
	}
}
