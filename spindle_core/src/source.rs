/*!
# Spindle: Source Streamer

Turns an archive PCM file — finished or still being appended to by the
ripper — into an ordered, restartable sequence of [`Packet`]s. Each
advance reads at most one packet's worth of audio; when streaming ahead of
a live rip, it waits (a poll interval at a time) for the file to grow.
*/

use crate::{
	BYTES_PER_SAMPLE,
	DiscInfo,
	PACKET_BYTES,
	PACKET_SAMPLES,
	Packet,
	SAMPLE_RATE,
	SpindleError,
	TrackInfo,
	packet::{
		FLAG_LAST_IN_STREAM,
		FLAG_LAST_IN_TRACK,
		FLAG_PAUSE_AFTER,
		FLAG_PAUSE_BEFORE,
	},
	rip::RipWatch,
};
use std::{
	fs::File,
	os::unix::fs::FileExt,
	path::Path,
	sync::{
		Arc,
		atomic::{
			AtomicBool,
			Ordering::Acquire,
		},
	},
	time::Duration,
};



#[derive(Debug)]
/// # Packet Stream.
///
/// A lazy cursor over one disc's audio. Tracks flagged `skip` are omitted
/// entirely; a track flagged `pause_after` stamps `pause_before` onto the
/// first packet of whatever non-skipped track follows, so the transport
/// can honor the pause exactly on the boundary.
pub struct PacketStream {
	/// # The Disc Being Played.
	disc: Arc<DiscInfo>,

	/// # The PCM File.
	pcm: File,

	/// # Position In the Track Table.
	track_idx: usize,

	/// # Absolute File Offset (Bytes).
	pos: u64,

	/// # Stamp Pause-Before On the Next Packet?
	pending_pause: bool,

	/// # Live-Rip Poll Interval.
	poll: Duration,

	/// # Rip Progress Watch, When Streaming a Live Rip.
	watch: Option<Arc<RipWatch>>,

	/// # External Abort Flag.
	///
	/// The transport trips this when it replaces or kills the stream, so a
	/// poll loop parked on a stalled rip lets go promptly.
	halt: Arc<AtomicBool>,

	/// # Finished?
	done: bool,
}

impl PacketStream {
	/// # New.
	///
	/// Open a stream at the given track and position. The position is in
	/// seconds relative to the track's index one — negative values land
	/// inside the pregap — and resolves at packet granularity. A skipped
	/// start track slides forward to the first playable one.
	///
	/// ## Errors
	///
	/// This will return an error if the track doesn't exist or the PCM
	/// file can't be opened.
	pub fn new<P>(
		disc: Arc<DiscInfo>,
		pcm: P,
		track: u8,
		position: Option<i32>,
		poll: Duration,
		watch: Option<Arc<RipWatch>>,
		halt: Arc<AtomicBool>,
	) -> Result<Self, SpindleError>
	where P: AsRef<Path> {
		let mut track_idx = disc.tracks.iter()
			.position(|t| t.number == track)
			.ok_or(SpindleError::NoTrack(track))?;

		// Slide past skips.
		while disc.tracks.get(track_idx).is_some_and(|t| t.skip) { track_idx += 1; }
		let done = track_idx >= disc.tracks.len();

		let pcm = pcm.as_ref();
		let pcm = File::open(pcm)
			.map_err(|_| SpindleError::Read(pcm.to_string_lossy().into_owned()))?;

		let pos = disc.tracks.get(track_idx).map_or(0, |t| seek_offset(t, position));

		Ok(Self {
			disc,
			pcm,
			track_idx,
			pos,
			pending_pause: false,
			poll,
			watch,
			halt,
			done,
		})
	}

	#[must_use]
	/// # Current Track Number.
	pub fn track(&self) -> Option<u8> {
		if self.done { None }
		else { self.disc.tracks.get(self.track_idx).map(|t| t.number) }
	}

	/// # Next Packet.
	///
	/// Read, tag, and return up to a tenth of a second of audio, `None`
	/// once the stream is spent (or externally halted). Packets never
	/// straddle track boundaries, so the one at a track's end may run
	/// short.
	///
	/// ## Errors
	///
	/// This will return an error if the file read itself fails; running
	/// out of bytes is not an error.
	pub fn next_packet(&mut self) -> Result<Option<Arc<Packet>>, SpindleError> {
		loop {
			if self.done || self.halt.load(Acquire) { return Ok(None); }

			let Some(track) = self.disc.tracks.get(self.track_idx) else {
				self.done = true;
				return Ok(None);
			};

			// Off the end of this track? Line up the next playable one.
			if self.pos >= track.end_offset() {
				self.pending_pause = self.pending_pause || track.pause_after;
				self.advance_track();
				continue;
			}

			let want = u64::from(PACKET_BYTES).min(track.end_offset() - self.pos);
			let got = self.read_available(want)?;
			let Some(data) = got else {
				// The rip died (or the archive ran short) mid-track.
				self.done = true;
				return Ok(None);
			};

			let track = &self.disc.tracks[self.track_idx];
			let packet = self.tag(track, data);
			self.pos += packet.data.len() as u64;
			self.pending_pause = false;
			return Ok(Some(Arc::new(packet)));
		}
	}

	/// # Advance To the Next Playable Track.
	fn advance_track(&mut self) {
		self.track_idx += 1;
		while self.disc.tracks.get(self.track_idx).is_some_and(|t| t.skip) {
			self.track_idx += 1;
		}
		match self.disc.tracks.get(self.track_idx) {
			Some(t) => { self.pos = t.pregap_offset; },
			None => { self.done = true; },
		}
	}

	/// # Read What's There, Waiting If the Rip Is Live.
	///
	/// Returns up to `want` bytes starting at the cursor, rounded down to
	/// whole samples. When nothing is available: a live rip means wait a
	/// poll and try again; a dead one means `None`, end of the line.
	fn read_available(&mut self, want: u64) -> Result<Option<Vec<u8>>, SpindleError> {
		let mut buf = vec![0_u8; usize::try_from(want).unwrap_or(PACKET_BYTES as usize)];
		loop {
			if self.halt.load(Acquire) { return Ok(None); }

			let got = self.pcm.read_at(&mut buf, self.pos)
				.map_err(|e| SpindleError::Read(e.to_string()))?;

			// Whole samples only.
			let got = got - (got % usize::from(BYTES_PER_SAMPLE));
			if got != 0 {
				buf.truncate(got);
				return Ok(Some(buf));
			}

			// Nothing yet. Is anybody still writing?
			if self.watch.as_ref().is_some_and(|w| w.audio_live()) {
				std::thread::sleep(self.poll);
			}
			else { return Ok(None); }
		}
	}

	/// # Tag a Packet.
	fn tag(&self, track: &TrackInfo, data: Vec<u8>) -> Packet {
		let end = self.pos + data.len() as u64;

		let mut flags = 0;
		if self.pending_pause { flags |= FLAG_PAUSE_BEFORE; }
		if end >= track.end_offset() {
			flags |= FLAG_LAST_IN_TRACK;
			if track.pause_after { flags |= FLAG_PAUSE_AFTER; }
			// Last of the last is last of all.
			if ! self.disc.tracks.iter().skip(self.track_idx + 1).any(|t| ! t.skip) {
				flags |= FLAG_LAST_IN_STREAM;
			}
		}

		let abs_pos =
			(i64::try_from(self.pos).unwrap_or(i64::MAX) -
			i64::try_from(track.file_offset).unwrap_or(0)) /
			i64::from(BYTES_PER_SAMPLE);

		// Index zero is pregap; the listed offsets begin at index two.
		let index =
			if self.pos < track.file_offset { 0 }
			else {
				1 + track.indices.iter().filter(|&&i| i <= self.pos).count() as u8
			};

		Packet {
			disc_id: self.disc.id.clone(),
			track: track.number,
			index,
			file_offset: self.pos,
			abs_pos,
			track_length: track.length_seconds(),
			flags,
			data,
		}
	}
}



/// # Resolve a Seek To a File Offset.
///
/// Seconds are measured from index one: zero or unset starts the track
/// proper, negatives back into the pregap (clamped to what pregap there
/// is), positives clamp to the track's length. The result snaps down to a
/// packet boundary so seeks resume on the same grid playback uses.
fn seek_offset(track: &TrackInfo, position: Option<i32>) -> u64 {
	let Some(secs) = position else { return track.file_offset; };

	let samples = i64::from(secs) * i64::from(SAMPLE_RATE);
	let samples = samples - samples.rem_euclid(i64::from(PACKET_SAMPLES));
	let offset = i64::try_from(track.file_offset).unwrap_or(0)
		+ samples * i64::from(BYTES_PER_SAMPLE);

	let lo = i64::try_from(track.pregap_offset).unwrap_or(0);
	let hi = i64::try_from(track.end_offset()).unwrap_or(i64::MAX);
	u64::try_from(offset.clamp(lo, hi)).unwrap_or(track.file_offset)
}
