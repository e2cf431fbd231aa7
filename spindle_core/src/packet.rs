/*!
# Spindle: Audio Packets
*/

use crate::{
	DiscId,
	SAMPLE_RATE,
};



/// # FLAG: Pause Before Playing This Packet.
///
/// Set on the first packet following a pause-after track boundary; the
/// transport drains and pauses the sink before submitting it.
pub(crate) const FLAG_PAUSE_BEFORE: u8 =  0b0001;

/// # FLAG: Pause After This Track.
pub(crate) const FLAG_PAUSE_AFTER: u8 =   0b0010;

/// # FLAG: Last Packet of Its Track.
pub(crate) const FLAG_LAST_IN_TRACK: u8 = 0b0100;

/// # FLAG: Last Packet of the Stream.
pub(crate) const FLAG_LAST_IN_STREAM: u8 = 0b1000;



#[derive(Debug, Clone)]
/// # Audio Packet.
///
/// Roughly a tenth of a second of PCM, tagged with where on the disc it
/// came from. Packets are the granularity of position reporting: the ring
/// buffer remembers which packet owns each period, so the transport can say
/// what's audible *now* rather than what was queued last.
pub struct Packet {
	/// # Disc.
	pub(crate) disc_id: DiscId,

	/// # Track Number.
	pub(crate) track: u8,

	/// # Index Within Track.
	///
	/// Zero while inside the pregap.
	pub(crate) index: u8,

	/// # Source File Offset (Bytes).
	pub(crate) file_offset: u64,

	/// # Position (Samples Since Track Index One).
	///
	/// Negative inside the pregap.
	pub(crate) abs_pos: i64,

	/// # Track Length (Whole Seconds).
	pub(crate) track_length: u32,

	/// # Flags.
	pub(crate) flags: u8,

	/// # PCM Bytes (Big-Endian Pairs).
	pub(crate) data: Vec<u8>,
}

impl Packet {
	#[must_use]
	/// # Track Number.
	pub const fn track(&self) -> u8 { self.track }

	#[must_use]
	/// # Index.
	pub const fn index(&self) -> u8 { self.index }

	#[expect(clippy::cast_possible_truncation, reason = "Disc positions fit with room to spare.")]
	#[must_use]
	/// # Position In Whole Seconds.
	///
	/// Floored, so the pregap counts `-2, -1` up to index one rather than
	/// rounding through zero early.
	pub fn position_seconds(&self) -> i32 {
		self.abs_pos.div_euclid(i64::from(SAMPLE_RATE)) as i32
	}

	#[must_use]
	/// # Track Length In Whole Seconds.
	pub const fn track_length(&self) -> u32 { self.track_length }

	#[must_use]
	/// # Pause Before?
	pub const fn pause_before(&self) -> bool {
		FLAG_PAUSE_BEFORE == self.flags & FLAG_PAUSE_BEFORE
	}

	#[must_use]
	/// # Pause After?
	pub const fn pause_after(&self) -> bool {
		FLAG_PAUSE_AFTER == self.flags & FLAG_PAUSE_AFTER
	}

	#[must_use]
	/// # Last In Track?
	pub const fn last_in_track(&self) -> bool {
		FLAG_LAST_IN_TRACK == self.flags & FLAG_LAST_IN_TRACK
	}

	#[must_use]
	/// # Last In Stream?
	pub const fn last_in_stream(&self) -> bool {
		FLAG_LAST_IN_STREAM == self.flags & FLAG_LAST_IN_STREAM
	}

	#[must_use]
	/// # PCM Bytes.
	pub fn data(&self) -> &[u8] { &self.data }

	#[must_use]
	/// # Disc.
	pub const fn disc_id(&self) -> &DiscId { &self.disc_id }
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_position_seconds() {
		let mut packet = Packet {
			disc_id: DiscId::default(),
			track: 1,
			index: 1,
			file_offset: 0,
			abs_pos: 0,
			track_length: 180,
			flags: 0,
			data: Vec::new(),
		};
		assert_eq!(packet.position_seconds(), 0, "Index one starts at zero.");

		packet.abs_pos = i64::from(SAMPLE_RATE) * 10;
		assert_eq!(packet.position_seconds(), 10, "Ten seconds in.");

		// One sample shy of the start should still read negative.
		packet.abs_pos = -1;
		assert_eq!(packet.position_seconds(), -1, "Pregap positions are negative.");

		packet.abs_pos = -(i64::from(SAMPLE_RATE) * 2);
		assert_eq!(packet.position_seconds(), -2, "Two seconds of pregap left.");
	}

	#[test]
	fn t_flags() {
		let packet = Packet {
			disc_id: DiscId::default(),
			track: 1,
			index: 1,
			file_offset: 0,
			abs_pos: 0,
			track_length: 0,
			flags: FLAG_PAUSE_BEFORE | FLAG_LAST_IN_TRACK,
			data: Vec::new(),
		};
		assert!(packet.pause_before(), "Pause-before should be set.");
		assert!(packet.last_in_track(), "Last-in-track should be set.");
		assert!(! packet.pause_after(), "Pause-after should be clear.");
		assert!(! packet.last_in_stream(), "Last-in-stream should be clear.");
	}
}
