/*!
# Spindle: Player Supervisor

The one component that owns the published state. Commands, transport
position reports, and rip progress all funnel into a single queue; the
supervisor folds them into `PlayerState`/`RipState`, delegates playback to
the transport and ripping to the ripper, and hands every change to the
publisher.

Nothing throws across a thread boundary: workers deliver their complaints
as values, and this is where they get translated into the error strings
remote clients see.
*/

use crate::{
	Archive,
	Config,
	DiscId,
	DiscInfo,
	Drive,
	FullToc,
	KillSwitch,
	LogQueue,
	PcmOpen,
	PcmSink,
	PlayerPhase,
	PlayerState,
	RipState,
	Ripper,
	SpindleError,
	StatePublisher,
	Transport,
	reconcile,
	rip::RipUpdate,
};
use std::{
	sync::{
		Arc,
		mpsc::{
			Receiver,
			RecvTimeoutError,
			Sender,
			channel,
		},
	},
	time::Duration,
};



/// # Queue Poll Interval.
///
/// The main loop wakes this often even when idle, to drain worker logs
/// and check the kill switch.
const QUEUE_POLL: Duration = Duration::from_millis(250);



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Commands.
///
/// Everything a remote (or the test harness) can ask of the player. All
/// of these are safe to deliver at any time; the ones that don't apply to
/// the current state reply with the state unchanged.
pub enum Command {
	/// # Play (Resume Or Restart).
	Play,

	/// # Pause.
	Pause,

	/// # Stop, Keeping the Disc Loaded.
	Stop,

	/// # Next Track.
	Next,

	/// # Previous Track.
	Prev,

	/// # Jump To a Track.
	PlayTrack(u8),

	/// # Seek Within the Current Track.
	Seek(i32),

	/// # Eject.
	Eject,

	/// # Load a Disc: a Named Archive Entry, Or the Physical Drive.
	Disc(Option<DiscId>),

	/// # Query: Current State.
	State,

	/// # Query: Rip State.
	RipStateQuery,

	/// # Query: Source Disc.
	Source,

	/// # Shut the Daemon Down.
	Quit,
}

impl Command {
	/// # Parse From Wire Frames.
	///
	/// One command per message, each argument its own frame.
	///
	/// ## Errors
	///
	/// This will return an error for unknown commands or busted
	/// arguments, which the caller bounces back as `["error", …]`.
	pub fn parse(frames: &[String]) -> Result<Self, SpindleError> {
		let (cmd, args) = frames.split_first()
			.ok_or_else(|| SpindleError::UnknownCommand(String::new()))?;

		match cmd.as_str() {
			"play" => Ok(Self::Play),
			"pause" => Ok(Self::Pause),
			"stop" => Ok(Self::Stop),
			"next" => Ok(Self::Next),
			"prev" => Ok(Self::Prev),
			"play_track" => {
				let track = args.first()
					.and_then(|raw| raw.trim().parse::<u8>().ok())
					.ok_or(SpindleError::CommandArg("play_track"))?;
				Ok(Self::PlayTrack(track))
			},
			"seek" => {
				let seconds = args.first()
					.and_then(|raw| raw.trim().parse::<i32>().ok())
					.ok_or(SpindleError::CommandArg("seek"))?;
				Ok(Self::Seek(seconds))
			},
			"eject" => Ok(Self::Eject),
			"disc" => match args.first() {
				Some(raw) => Ok(Self::Disc(Some(DiscId::try_from(raw.as_str())?))),
				None => Ok(Self::Disc(None)),
			},
			"state" => Ok(Self::State),
			"rip_state" => Ok(Self::RipStateQuery),
			"source" => Ok(Self::Source),
			"quit" => Ok(Self::Quit),
			other => Err(SpindleError::UnknownCommand(other.to_owned())),
		}
	}
}



#[derive(Debug, Clone)]
/// # Command Replies.
///
/// Mirrors the wire response table: most commands answer with the state,
/// queries with their particular payloads, failures with a message.
pub enum Reply {
	/// # The (Resulting) State.
	State(PlayerState),

	/// # The Rip State.
	RipState(RipState),

	/// # A Disc Record (Or Not).
	Disc(Option<DiscInfo>),

	/// # Fine.
	Ok,

	/// # No.
	Error(String),
}



#[derive(Debug)]
/// # Queue Traffic.
pub(crate) enum PlayerMsg {
	/// # A Command, With Somewhere To Send the Answer.
	Cmd(Command, Sender<Reply>),

	/// # A Transport State Report.
	Transport(PlayerState),

	/// # Rip News.
	Rip(RipUpdate),
}

#[derive(Debug, Clone)]
/// # Command Handle.
///
/// The in-process way to drive the player: the remote command server uses
/// one per connection, and the tests use it directly.
pub struct CommandHandle(Sender<PlayerMsg>);

impl CommandHandle {
	#[cfg(test)]
	/// # A Handle To Anything That Answers.
	pub(crate) fn test_handle(tx: Sender<PlayerMsg>) -> Self { Self(tx) }

	/// # Send a Command, Wait For the Reply.
	pub fn request(&self, cmd: Command) -> Reply {
		let (tx, rx) = channel();
		if self.0.send(PlayerMsg::Cmd(cmd, tx)).is_err() {
			return Reply::Error(SpindleError::SinkDead.to_string());
		}
		rx.recv().unwrap_or_else(|_| Reply::Error(SpindleError::SinkDead.to_string()))
	}
}



/// # Player.
pub struct Player {
	/// # Configuration.
	config: Config,

	/// # The Archive.
	archive: Archive,

	/// # The Optical Drive, If There Is One.
	drive: Option<Drive>,

	/// # The Transport (Which Owns the Sink).
	transport: Transport,

	/// # The Active Rip, If Any.
	ripper: Option<Ripper>,

	/// # Worker Telemetry.
	log: LogQueue,

	/// # Where State Goes.
	publisher: Box<dyn StatePublisher>,

	/// # The Inbox.
	rx: Receiver<PlayerMsg>,

	/// # Inbox Handle (For Forwarders).
	tx: Sender<PlayerMsg>,

	/// # Authoritative Player State.
	state: PlayerState,

	/// # Authoritative Rip State.
	rip_state: RipState,
}

impl Player {
	/// # New.
	///
	/// Wire up the sink, transport, and queues. The publisher receives a
	/// `NO_DISC` state as soon as [`Player::run`] begins.
	///
	/// ## Errors
	///
	/// Unless configured to start without one, a missing audio device is
	/// caught here, before the daemon settles in.
	pub fn new(
		config: Config,
		archive: Archive,
		opener: Box<dyn PcmOpen>,
		drive: Option<Drive>,
		publisher: Box<dyn StatePublisher>,
	) -> Result<(Self, CommandHandle), SpindleError> {
		// Probe the device up front when failure is supposed to be fatal.
		if ! config.start_without_device() {
			let _probe = opener.open()
				.map_err(|e| SpindleError::Device(e.to_string()))?;
		}

		let log = LogQueue::default();
		let sink = PcmSink::new(opener, &log, config.open_backoff());

		let (tx, rx) = channel();

		// Transport reports arrive on their own channel; a forwarder
		// folds them into the main queue.
		let transport = {
			let (tx_state, rx_state) = channel();
			let tx = tx.clone();
			std::thread::Builder::new()
				.name("spindle-state".to_owned())
				.spawn(move || {
					while let Ok(state) = rx_state.recv() {
						if tx.send(PlayerMsg::Transport(state)).is_err() { break; }
					}
				})
				.map_err(|_| SpindleError::Bug("unable to spawn the state forwarder"))?;
			Transport::new(sink, tx_state, config.poll())
		};

		let handle = CommandHandle(tx.clone());
		Ok((
			Self {
				config,
				archive,
				drive,
				transport,
				ripper: None,
				log,
				publisher,
				rx,
				tx,
				state: PlayerState::default(),
				rip_state: RipState::default(),
			},
			handle,
		))
	}

	/// # Run.
	///
	/// The main loop: commands in, states out, until a `quit` lands or
	/// the kill switch flips.
	pub fn run(mut self, killed: &KillSwitch) {
		self.publisher.publish_state(&self.state);

		loop {
			match self.rx.recv_timeout(QUEUE_POLL) {
				Ok(PlayerMsg::Cmd(cmd, reply)) => {
					let quit = matches!(cmd, Command::Quit);
					let out = self.command(cmd);
					let _res = reply.send(out);
					if quit { break; }
				},
				Ok(PlayerMsg::Transport(state)) => { self.merge_transport(state); },
				Ok(PlayerMsg::Rip(update)) => { self.merge_rip(update); },
				Err(RecvTimeoutError::Timeout) => {},
				Err(RecvTimeoutError::Disconnected) => break,
			}

			// Pass worker telemetry along.
			for record in self.log.drain() { record.print(); }

			if killed.killed() { break; }
		}

		// Tidy up.
		if let Some(mut ripper) = self.ripper.take() { ripper.abort(); }
		self.transport.shutdown();
		self.state.state = PlayerPhase::Off;
		self.publisher.publish_state(&self.state);
	}

	/// # Handle One Command.
	fn command(&mut self, cmd: Command) -> Reply {
		let res = match cmd {
			Command::Play => { self.transport.play(); Ok(()) },
			Command::Pause => { self.transport.pause(); Ok(()) },
			Command::Stop => { self.transport.stop(); Ok(()) },
			Command::Next => { self.transport.skip(true); Ok(()) },
			Command::Prev => { self.transport.skip(false); Ok(()) },
			Command::PlayTrack(track) => self.transport.play_track(track),
			Command::Seek(seconds) => self.transport.seek(seconds),
			Command::Eject => self.eject(),
			Command::Disc(None) => self.load_physical(),
			Command::Disc(Some(id)) => self.load_archived(&id),
			Command::State => return Reply::State(self.state.clone()),
			Command::RipStateQuery => return Reply::RipState(self.rip_state.clone()),
			Command::Source => return self.source(),
			Command::Quit => return Reply::Ok,
		};

		match res {
			Ok(()) => {
				// A successful command clears any standing error.
				if self.state.error.is_some() {
					self.state.error = None;
					self.publisher.publish_state(&self.state);
				}

				// Transport commands update its own state synchronously;
				// the reply should reflect that rather than whatever the
				// queue has gotten around to. (The queued copy dedups.)
				if self.transport.source_id().is_some() {
					Reply::State(self.transport.last_state())
				}
				else { Reply::State(self.state.clone()) }
			},
			// Command errors go back to the sender; the state stays put.
			Err(e) => Reply::Error(e.to_string()),
		}
	}

	/// # Fold In a Transport Report.
	fn merge_transport(&mut self, state: PlayerState) {
		if self.state != state {
			self.state = state;
			self.publisher.publish_state(&self.state);
		}
	}

	/// # Fold In Rip News.
	fn merge_rip(&mut self, update: RipUpdate) {
		match update {
			RipUpdate::Progress(rip) => if self.rip_state != rip {
				self.rip_state = rip;
				self.publisher.publish_rip_state(&self.rip_state);
			},
			RipUpdate::TocReady(id) => {
				if let Err(e) = self.reconcile(&id) {
					// Logged and noted; the basic TOC still plays fine.
					self.log_warning(format!("TOC reconciliation failed: {e}"));
				}
			},
			RipUpdate::Finished(_) => {
				if self.ripper.as_ref().is_some_and(|r| ! r.running()) {
					if let Some(mut ripper) = self.ripper.take() { ripper.abort(); }
				}
			},
		}
	}

	/// # Merge the Subchannel TOC Into the Disc Record.
	fn reconcile(&mut self, id: &DiscId) -> Result<(), SpindleError> {
		let raw = self.archive.load_full_toc(id)?
			.ok_or_else(|| SpindleError::TocParse("the full TOC went missing".to_owned()))?;
		let full = FullToc::parse(&raw)?;

		let mut disc = self.archive.load(id)?
			.ok_or(SpindleError::NoDisc)?;
		reconcile(&mut disc, &full)?;
		self.archive.save(&disc)?;

		// Re-announce the richer record.
		if self.state.disc_id.as_ref() == Some(id) {
			self.publisher.publish_disc(Some(&disc));
		}
		Ok(())
	}

	/// # Eject.
	///
	/// Stop playback, kill any rip, pop the tray, forget the disc.
	fn eject(&mut self) -> Result<(), SpindleError> {
		if let Some(mut ripper) = self.ripper.take() { ripper.abort(); }
		self.transport.unload();

		let res = match &self.drive {
			Some(drive) => drive.eject(),
			None => Ok(()),
		};

		self.publisher.publish_disc(None);
		self.state = PlayerState::default();
		self.rip_state = RipState::default();
		self.publisher.publish_state(&self.state);
		self.publisher.publish_rip_state(&self.rip_state);
		res
	}

	/// # Load and Play the Physical Disc.
	///
	/// The insert flow: identify the disc, create or refresh its archive
	/// entry, and either play straight from the archive (seen it before,
	/// got it all) or start ripping and play the growing file.
	fn load_physical(&mut self) -> Result<(), SpindleError> {
		let drive = self.drive.as_ref().ok_or(SpindleError::NoDisc)?;

		let toc = match drive.read_toc() {
			Ok(toc) => toc,
			// An unreadable disc is a state change, not just a reply.
			Err(e) => {
				self.state = PlayerState::default();
				self.state.error = Some(e.to_string());
				self.publisher.publish_state(&self.state);
				return Err(e);
			},
		};

		let fresh = DiscInfo::from_toc(&toc);
		let stored = self.archive.create(&fresh, &toc)?;
		let complete = self.archive.complete(&stored);

		// Ripping starts (or restarts) for anything not fully archived.
		let watch = if complete { None }
		else {
			if let Some(mut old) = self.ripper.take() { old.abort(); }

			// The streamer needs something to open before the ripper's
			// first write lands.
			let pcm = self.archive.pcm_path(&stored.id);
			if ! pcm.exists() {
				std::fs::File::create(&pcm)
					.map_err(|_| SpindleError::Write(pcm.to_string_lossy().into_owned()))?;
			}

			let ripper = self.spawn_ripper(&stored)?;
			let watch = ripper.watch();
			self.ripper.replace(ripper);
			Some(watch)
		};

		// Follow an alias only when there's nothing to rip; a fresh disc
		// plays itself while the archive fills.
		let (disc, source_id) =
			if complete {
				self.archive.resolve(&stored.id)?.ok_or(SpindleError::NoDisc)?
			}
			else { (stored.clone(), stored.id.clone()) };

		self.announce_and_load(disc, source_id, watch);
		Ok(())
	}

	/// # Load and Play an Archived Disc.
	fn load_archived(&mut self, id: &DiscId) -> Result<(), SpindleError> {
		let (disc, source_id) = self.archive.resolve(id)?
			.ok_or_else(|| SpindleError::DiscId(id.as_str().to_owned()))?;
		self.announce_and_load(disc, source_id, None);
		Ok(())
	}

	/// # Announce a Disc, Then Start the Transport On It.
	///
	/// The `disc` event always goes out before the first state that
	/// mentions the disc's id; subscribers can rely on that order. The
	/// transport publishes `WORKING` itself (through the queue), so the
	/// announcement here is the only synchronous half.
	fn announce_and_load(
		&mut self,
		disc: DiscInfo,
		source_id: DiscId,
		watch: Option<Arc<crate::RipWatch>>,
	) {
		self.publisher.publish_disc(Some(&disc));
		let pcm = self.archive.pcm_path(&disc.id);
		self.transport.load(Arc::new(disc), source_id, pcm, watch);
	}

	/// # Spawn the Ripper.
	fn spawn_ripper(&mut self, disc: &DiscInfo) -> Result<Ripper, SpindleError> {
		// Rip updates get their own channel plus a forwarder into the
		// main queue.
		let (tx_rip, rx_rip) = channel();
		{
			let tx = self.tx.clone();
			std::thread::Builder::new()
				.name("spindle-ripfwd".to_owned())
				.spawn(move || {
					while let Ok(update) = rx_rip.recv() {
						if tx.send(PlayerMsg::Rip(update)).is_err() { break; }
					}
				})
				.map_err(|_| SpindleError::Bug("unable to spawn the rip forwarder"))?;
		}

		Ripper::spawn(&self.config, &self.archive, disc, tx_rip)
	}

	/// # Answer a Source Query.
	fn source(&self) -> Reply {
		let Some(id) = self.transport.source_id() else { return Reply::Disc(None); };
		match self.archive.load(&id) {
			Ok(disc) => Reply::Disc(disc),
			Err(e) => Reply::Error(e.to_string()),
		}
	}

	/// # Note a Warning.
	fn log_warning(&self, text: String) {
		self.log.sender().push(crate::LogLevel::Warning, text);
	}
}
