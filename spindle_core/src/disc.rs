/*!
# Spindle: Disc Model
*/

use cdtoc::Toc;
use crate::{
	BYTES_PER_SECTOR,
	SpindleError,
};
use serde::{
	Deserialize,
	Serialize,
};
use std::fmt;



/// # Disc ID Length.
///
/// Twenty SHA-1 bytes base64-encode to twenty-eight characters, padding
/// included.
const DISC_ID_LEN: usize = 28;



#[derive(Debug, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
/// # Disc ID.
///
/// The stable identifier for a disc: the URL-safe base64 rendering of the
/// SHA-1 of the basic TOC, byte-encoded MusicBrainz-style. The digest is the
/// same one MusicBrainz uses; only the base64 alphabet differs, so the
/// conversion is a straight transliteration. Identifiers computed here must
/// match those of every other implementation bit-for-bit, as they name the
/// archive directories.
pub struct DiscId(String);

impl Default for DiscId {
	fn default() -> Self { Self(String::new()) }
}

impl fmt::Display for DiscId {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&Toc> for DiscId {
	/// # From Basic TOC.
	fn from(toc: &Toc) -> Self {
		// MusicBrainz base64 swaps (+ / =) for (. _ -); URL-safe base64
		// swaps them for (- _ =). Two characters differ.
		let out: String = toc.musicbrainz_id()
			.to_string()
			.chars()
			.map(|c| match c {
				'.' => '-',
				'-' => '=',
				c => c,
			})
			.collect();
		Self(out)
	}
}

impl TryFrom<&str> for DiscId {
	type Error = SpindleError;

	/// # From String.
	///
	/// ## Errors
	///
	/// This will return an error if the length or alphabet is wrong.
	fn try_from(src: &str) -> Result<Self, Self::Error> {
		let src = src.trim();
		if
			src.len() == DISC_ID_LEN &&
			src.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'='))
		{
			Ok(Self(src.to_owned()))
		}
		else { Err(SpindleError::DiscId(src.to_owned())) }
	}
}

impl Serialize for DiscId {
	#[inline]
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where S: serde::Serializer { serializer.serialize_str(&self.0) }
}

impl<'de> Deserialize<'de> for DiscId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where D: serde::Deserializer<'de> {
		let raw = String::deserialize(deserializer)?;
		Self::try_from(raw.as_str()).map_err(serde::de::Error::custom)
	}
}

impl DiscId {
	#[must_use]
	/// # As Str.
	pub fn as_str(&self) -> &str { &self.0 }
}



#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
/// # Track.
///
/// One track's slice of the archive PCM file plus its user-editable
/// metadata. All offsets are bytes into that file; `file_offset` marks
/// index 1, `pregap_offset` marks where the track's audio actually begins
/// (equal to `file_offset` when there is no pregap audio).
pub struct TrackInfo {
	/// # Track Number.
	///
	/// Zero is reserved for a "hidden" track squeezed in before the nominal
	/// first track.
	pub number: u8,

	/// # File Offset (Bytes) of Index 1.
	pub file_offset: u64,

	/// # Length (Bytes) From Index 1.
	pub length: u64,

	/// # File Offset (Bytes) of the Pregap.
	pub pregap_offset: u64,

	#[serde(default)]
	/// # Index Offsets.
	///
	/// File offsets for indices two and up, if the subchannel TOC reported
	/// any. Index one is `file_offset`; index zero is the pregap.
	pub indices: Vec<u64>,

	#[serde(default)]
	/// # ISRC.
	pub isrc: Option<String>,

	#[serde(default)]
	/// # Track Artist.
	pub artist: Option<String>,

	#[serde(default)]
	/// # Track Title.
	pub title: Option<String>,

	#[serde(default)]
	/// # Skip On Playback?
	pub skip: bool,

	#[serde(default)]
	/// # Pause After This Track?
	pub pause_after: bool,
}

impl TrackInfo {
	#[must_use]
	/// # Pregap Length (Bytes).
	pub const fn pregap_len(&self) -> u64 {
		self.file_offset - self.pregap_offset
	}

	#[must_use]
	/// # End Offset (Bytes, Exclusive).
	pub const fn end_offset(&self) -> u64 {
		self.file_offset + self.length
	}

	#[expect(clippy::cast_possible_truncation, reason = "A disc holds eighty minutes, tops.")]
	#[must_use]
	/// # Length In Whole Seconds.
	pub const fn length_seconds(&self) -> u32 {
		(self.length / crate::BYTES_PER_SECOND as u64) as u32
	}
}



#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
/// # Disc.
///
/// The archived description of one compact disc: identity, user-editable
/// metadata, and the track table. Created when an unknown disc is inserted,
/// refined when the subchannel TOC arrives, edited only by the
/// administration interface; never destroyed here.
pub struct DiscInfo {
	/// # Disc ID.
	pub id: DiscId,

	#[serde(default)]
	/// # Catalog Number.
	pub catalog: Option<String>,

	#[serde(default)]
	/// # Barcode.
	pub barcode: Option<String>,

	#[serde(default)]
	/// # Release Date.
	pub date: Option<String>,

	#[serde(default)]
	/// # Album Artist.
	pub artist: Option<String>,

	#[serde(default)]
	/// # Album Title.
	pub title: Option<String>,

	/// # Tracks, In Play Order.
	pub tracks: Vec<TrackInfo>,

	#[serde(default)]
	/// # Alias Link.
	///
	/// When set, playing this disc plays the linked disc instead.
	pub link: Option<DiscId>,
}

impl DiscInfo {
	#[must_use]
	/// # From Basic TOC.
	///
	/// Seed a new disc record from the offsets and lengths available at
	/// insertion time. Pregaps and indices are unknowable here; the
	/// subchannel TOC fills them in later, if it ever arrives.
	pub fn from_toc(toc: &Toc) -> Self {
		let mut tracks = Vec::with_capacity(toc.audio_len() + 1);

		// A gap between the lead-in and the first track means hidden audio.
		if let Some(t) = toc.htoa() {
			let rng = t.sector_range();
			let len = u64::from(rng.end - rng.start) * u64::from(BYTES_PER_SECTOR);
			tracks.push(TrackInfo {
				number: 0,
				file_offset: 0,
				length: len,
				pregap_offset: 0,
				..TrackInfo::default()
			});
		}

		for t in toc.audio_tracks() {
			let rng = t.sector_range_normalized();
			let start = u64::from(rng.start) * u64::from(BYTES_PER_SECTOR);
			let len = u64::from(rng.end - rng.start) * u64::from(BYTES_PER_SECTOR);
			tracks.push(TrackInfo {
				number: t.number(),
				file_offset: start,
				length: len,
				pregap_offset: start,
				..TrackInfo::default()
			});
		}

		Self {
			id: DiscId::from(toc),
			catalog: None,
			barcode: None,
			date: None,
			artist: None,
			title: None,
			tracks,
			link: None,
		}
	}

	#[must_use]
	/// # Track By Number.
	pub fn track(&self, number: u8) -> Option<&TrackInfo> {
		self.tracks.iter().find(|t| t.number == number)
	}

	#[expect(clippy::cast_possible_truncation, reason = "Track counts are single bytes.")]
	#[must_use]
	/// # Nominal Track Total.
	///
	/// The hidden track, if any, doesn't count toward the published total.
	pub fn no_tracks(&self) -> u8 {
		self.tracks.iter().filter(|t| 0 != t.number).count() as u8
	}

	#[must_use]
	/// # Expected PCM Byte Total.
	///
	/// The size the archive audio file should reach once fully ripped. The
	/// rip is judged complete by comparing the file against this.
	pub fn expected_pcm_bytes(&self) -> u64 {
		self.tracks.iter().map(TrackInfo::end_offset).max().unwrap_or(0)
	}

	#[must_use]
	/// # First Playable Track Number.
	pub fn first_track(&self) -> Option<u8> {
		self.tracks.iter().find(|t| ! t.skip).map(|t| t.number)
	}

	#[must_use]
	/// # Adjacent Playable Track Number.
	///
	/// Return the number of the nearest non-skipped track after (or, with
	/// `forward` unset, before) the given one.
	pub fn adjacent_track(&self, current: u8, forward: bool) -> Option<u8> {
		let pos = self.tracks.iter().position(|t| t.number == current)?;
		if forward {
			self.tracks.iter().skip(pos + 1).find(|t| ! t.skip).map(|t| t.number)
		}
		else {
			self.tracks.iter().take(pos).rev().find(|t| ! t.skip).map(|t| t.number)
		}
	}
}



#[cfg(test)]
mod test {
	use super::*;

	const CDTOC_PLAIN: &str = "4+96+2D2B+6256+B327+D84A";
	const CDTOC_HTOA: &str = "2+2712+6256+B327";

	#[test]
	fn t_disc_id() {
		let toc = Toc::from_cdtoc(CDTOC_PLAIN).expect("TOC failed to parse.");
		let id = DiscId::from(&toc);

		assert_eq!(id.as_str().len(), 28, "Disc ids are 28 characters.");
		assert!(
			id.as_str().bytes().all(|b|
				b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'=')
			),
			"Disc id alphabet must be URL-safe base64.",
		);

		// Twenty bytes of digest always leave one byte of padding.
		assert!(id.as_str().ends_with('='), "Disc ids end with base64 padding.");

		// Same TOC, same id.
		let id2 = DiscId::from(&toc);
		assert_eq!(id, id2, "Disc ids must be stable.");

		// Different TOC, different id.
		let toc3 = Toc::from_cdtoc(CDTOC_HTOA).expect("TOC failed to parse.");
		assert_ne!(id, DiscId::from(&toc3), "Different TOCs should yield different ids.");

		// And they should round-trip through their string form.
		let back = DiscId::try_from(id.as_str()).expect("Disc id failed to reparse.");
		assert_eq!(id, back, "Disc id did not survive the round trip.");
	}

	#[test]
	fn t_disc_id_bad() {
		assert!(DiscId::try_from("too-short").is_err(), "Short ids should fail.");
		assert!(
			DiscId::try_from("!!!!!!!!!!!!!!!!!!!!!!!!!!!!").is_err(),
			"Ids with a bad alphabet should fail.",
		);
	}

	#[test]
	fn t_from_toc() {
		let toc = Toc::from_cdtoc(CDTOC_PLAIN).expect("TOC failed to parse.");
		let disc = DiscInfo::from_toc(&toc);

		assert_eq!(disc.tracks.len(), 4, "Expected four tracks.");
		assert_eq!(disc.no_tracks(), 4, "Expected four nominal tracks.");
		assert_eq!(disc.tracks[0].number, 1, "First track should be #1.");
		assert_eq!(disc.tracks[0].file_offset, 0, "Track #1 should start at zero.");

		// Offsets must be non-decreasing, pregaps empty.
		let mut last = 0;
		for t in &disc.tracks {
			assert!(last <= t.file_offset, "Track offsets must not decrease.");
			assert_eq!(t.pregap_offset, t.file_offset, "Basic TOCs have no pregap info.");
			last = t.file_offset;
		}

		// The file total should match the final track's end.
		assert_eq!(
			disc.expected_pcm_bytes(),
			disc.tracks.last().map(TrackInfo::end_offset).unwrap_or_default(),
			"Expected bytes should end with the last track.",
		);
	}

	#[test]
	fn t_from_toc_htoa() {
		let toc = Toc::from_cdtoc(CDTOC_HTOA).expect("TOC failed to parse.");
		let disc = DiscInfo::from_toc(&toc);

		assert_eq!(disc.tracks.len(), 3, "Expected hidden track plus two.");
		assert_eq!(disc.no_tracks(), 2, "Hidden tracks don't count.");
		assert_eq!(disc.tracks[0].number, 0, "The hidden track is #0.");
		assert_eq!(disc.tracks[0].file_offset, 0, "Hidden audio starts the file.");
		assert_eq!(
			disc.tracks[0].end_offset(),
			disc.tracks[1].file_offset,
			"Hidden audio should run right up to track #1.",
		);
	}

	#[test]
	fn t_adjacent() {
		let toc = Toc::from_cdtoc(CDTOC_PLAIN).expect("TOC failed to parse.");
		let mut disc = DiscInfo::from_toc(&toc);
		disc.tracks[1].skip = true; // Skip #2.

		assert_eq!(disc.first_track(), Some(1), "First playable should be #1.");
		assert_eq!(disc.adjacent_track(1, true), Some(3), "Next should hop the skip.");
		assert_eq!(disc.adjacent_track(3, false), Some(1), "Prev should hop the skip.");
		assert_eq!(disc.adjacent_track(4, true), None, "No next after the last.");
	}

	#[test]
	fn t_json_round_trip() {
		let toc = Toc::from_cdtoc(CDTOC_PLAIN).expect("TOC failed to parse.");
		let mut disc = DiscInfo::from_toc(&toc);
		disc.artist.replace("Some Artist".to_owned());
		disc.tracks[2].pause_after = true;
		disc.tracks[3].isrc.replace("USRC17607839".to_owned());

		let raw = serde_json::to_string_pretty(&disc).expect("Disc failed to serialize.");
		let back: DiscInfo = serde_json::from_str(&raw).expect("Disc failed to parse.");
		assert_eq!(disc, back, "Disc info did not survive the round trip.");
	}
}
