/*!
# Spindle: Full TOC and Reconciliation

The subchannel reader leaves behind a cdrdao-format text file. That arrives
well after the basic TOC — often minutes after playback has already begun —
so its pregap, index, ISRC, and catalog details have to be merged into a
disc record that may have been edited in the meantime.
*/

use crate::{
	BYTES_PER_SECTOR,
	DiscInfo,
	SpindleError,
};
use trimothy::TrimMut;



#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// # Full TOC.
///
/// The interesting parts of a cdrdao-format table of contents: the catalog
/// number and, per track, the file region, pregap, extra indices, and ISRC.
/// All positions are in sectors relative to the start of the ripped file.
pub struct FullToc {
	/// # Catalog Number (UPC/EAN).
	pub catalog: Option<String>,

	/// # Tracks.
	pub tracks: Vec<FullTocTrack>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// # One Track of a Full TOC.
pub struct FullTocTrack {
	/// # File Region Start (Sectors).
	pub start: u32,

	/// # File Region Length (Sectors).
	pub length: u32,

	/// # Pregap (Sectors).
	///
	/// The gap sits at the head of the file region; index one lands at
	/// `start + pregap`.
	pub pregap: u32,

	/// # Extra Indices (Sectors Past Index One).
	pub indices: Vec<u32>,

	/// # ISRC.
	pub isrc: Option<String>,
}

impl FullToc {
	/// # Parse.
	///
	/// Read the cdrdao-format text into a [`FullToc`]. Only the directives
	/// that matter for playback are collected; copy flags, CD-TEXT blocks,
	/// and the like are skipped over.
	///
	/// ## Errors
	///
	/// This will return an error if the structure makes no sense: a track
	/// without a file region, an unparseable time, etc.
	pub fn parse(raw: &str) -> Result<Self, SpindleError> {
		let mut out = Self::default();
		let mut current: Option<FullTocTrack> = None;
		let mut braces = 0_usize;

		for line in raw.lines() {
			let mut line = line.to_owned();
			line.trim_mut();

			// Skip comments and noise.
			if line.is_empty() || line.starts_with("//") { continue; }

			// CD-TEXT blocks nest in braces; we don't want anything from
			// them here.
			braces += line.bytes().filter(|&b| b == b'{').count();
			let inside = braces != 0;
			braces = braces.saturating_sub(line.bytes().filter(|&b| b == b'}').count());
			if inside { continue; }

			let (word, rest) = split_word(&line);
			match word {
				"CATALOG" => if out.catalog.is_none() {
					out.catalog = unquote(rest);
				},
				"TRACK" => {
					if let Some(done) = current.take() { out.push_track(done)?; }
					// Non-audio tracks have no business in the player.
					if rest.trim() == "AUDIO" {
						current.replace(FullTocTrack::default());
					}
				},
				"ISRC" => if let Some(t) = &mut current {
					t.isrc = unquote(rest);
				},
				"FILE" | "AUDIOFILE" => if let Some(t) = &mut current {
					// FILE "name" <start> <length>
					let args = rest.rsplitn(3, ' ').collect::<Vec<&str>>();
					if args.len() < 2 {
						return Err(SpindleError::TocParse(format!("bad FILE line: {line}")));
					}
					t.length = parse_time(args[0])?;
					t.start = parse_time(args[1])?;
				},
				"START" => if let Some(t) = &mut current {
					t.pregap = parse_time(rest)?;
				},
				"SILENCE" | "PREGAP" => if let Some(t) = &mut current {
					// Silence isn't in the file, but still shifts index one.
					t.pregap += parse_time(rest)?;
				},
				"INDEX" => if let Some(t) = &mut current {
					t.indices.push(parse_time(rest)?);
				},
				_ => {},
			}
		}

		if let Some(done) = current.take() { out.push_track(done)?; }

		if out.tracks.is_empty() {
			Err(SpindleError::TocParse("no audio tracks".to_owned()))
		}
		else { Ok(out) }
	}

	/// # Record a Finished Track Block.
	fn push_track(&mut self, track: FullTocTrack) -> Result<(), SpindleError> {
		if track.length == 0 {
			return Err(SpindleError::TocParse(format!(
				"track #{} has no file region",
				self.tracks.len() + 1,
			)));
		}
		if track.pregap >= track.length {
			return Err(SpindleError::TocParse(format!(
				"track #{} is all pregap",
				self.tracks.len() + 1,
			)));
		}
		self.tracks.push(track);
		Ok(())
	}
}



/// # Reconcile.
///
/// Merge a freshly-read full TOC into the archived disc record:
///
/// * The nominal track count must match, or nothing happens.
/// * Pregap offsets and index lists replace the basic-TOC-derived values,
///   and audible lengths shrink so a track no longer swallows its
///   successor's pregap.
/// * User-visible metadata already present (ISRC, catalog, artist, title,
///   flags, link) is never overwritten.
/// * A hidden track before track one survives, even though the subchannel
///   TOC files track one's region from byte zero.
///
/// ## Errors
///
/// This will return [`SpindleError::TocMismatch`] if the track counts
/// disagree, in which case the disc record is untouched.
pub fn reconcile(disc: &mut DiscInfo, full: &FullToc) -> Result<(), SpindleError> {
	let nominal = usize::from(disc.no_tracks());
	if nominal != full.tracks.len() { return Err(SpindleError::TocMismatch); }

	if disc.catalog.is_none() { disc.catalog.clone_from(&full.catalog); }

	let sector = u64::from(BYTES_PER_SECTOR);
	let hidden_end = disc.tracks.iter()
		.find(|t| t.number == 0)
		.map(crate::TrackInfo::end_offset);

	// First pass: pregaps, indices, ISRCs.
	let mut iter = full.tracks.iter();
	for t in disc.tracks.iter_mut().filter(|t| 0 != t.number) {
		let Some(new) = iter.next() else { break; };

		// Index one stays where the basic TOC put it; the pregap backs up
		// from there.
		let pregap = u64::from(new.pregap) * sector;
		let mut pregap_offset = t.file_offset.saturating_sub(pregap);

		// The hidden track keeps its audio even when the subchannel TOC
		// would hand it all to track one's pregap.
		if t.number == 1 {
			if let Some(end) = hidden_end {
				if pregap_offset < end { pregap_offset = end; }
			}
		}
		t.pregap_offset = pregap_offset;

		t.indices.truncate(0);
		for &idx in &new.indices {
			let offset = t.file_offset + u64::from(idx) * sector;
			if offset < t.end_offset() { t.indices.push(offset); }
		}

		if t.isrc.is_none() { t.isrc.clone_from(&new.isrc); }
	}

	// Second pass: shrink each track so it ends where its successor's
	// pregap begins.
	for i in 0..disc.tracks.len() {
		let Some(next_pregap) = disc.tracks.get(i + 1).map(|t| t.pregap_offset) else { break; };
		let t = &mut disc.tracks[i];
		if t.file_offset <= next_pregap && next_pregap < t.end_offset() {
			t.length = next_pregap - t.file_offset;
		}
	}

	Ok(())
}



/// # Split Leading Word.
fn split_word(line: &str) -> (&str, &str) {
	match line.split_once(char::is_whitespace) {
		Some((a, b)) => (a, b.trim()),
		None => (line, ""),
	}
}

/// # Unquote.
///
/// Strip surrounding double quotes, returning `None` for empty values.
fn unquote(raw: &str) -> Option<String> {
	let raw = raw.trim().trim_matches('"').trim();
	if raw.is_empty() { None }
	else { Some(raw.to_owned()) }
}

/// # Parse a Time Value (Sectors).
///
/// Accept either an `MM:SS:FF` timecode or a bare sector count, as cdrdao
/// emits both depending on context.
fn parse_time(raw: &str) -> Result<u32, SpindleError> {
	let raw = raw.trim();
	let parts = raw.split(':').collect::<Vec<&str>>();
	match parts.len() {
		1 => parts[0].parse::<u32>()
			.map_err(|_| SpindleError::TocParse(format!("bad time: {raw}"))),
		3 => {
			let m = parts[0].parse::<u32>().ok();
			let s = parts[1].parse::<u32>().ok().filter(|&s| s < 60);
			let f = parts[2].parse::<u32>().ok().filter(|&f| f < 75);
			match (m, s, f) {
				(Some(m), Some(s), Some(f)) => Ok((m * 60 + s) * 75 + f),
				_ => Err(SpindleError::TocParse(format!("bad time: {raw}"))),
			}
		},
		_ => Err(SpindleError::TocParse(format!("bad time: {raw}"))),
	}
}



#[cfg(test)]
mod test {
	use super::*;
	use cdtoc::Toc;

	/// A four-track disc: index-one starts at normalized sectors
	/// 0, 11413, 25024, 45713; leadout at 55220.
	const CDTOC_PLAIN: &str = "4+96+2D2B+6256+B327+D84A";

	/// The same disc as cdrdao would describe it, with pregaps of 0, 150,
	/// 75, and 0 sectors, and one extra index on track three.
	const CDRDAO: &str = r#"CD_DA

CATALOG "0075678035524"

// Track 1
TRACK AUDIO
NO COPY
TWO_CHANNEL_AUDIO
ISRC "USRC17607839"
FILE "data.wav" 0 11263

// Track 2
TRACK AUDIO
TWO_CHANNEL_AUDIO
FILE "data.wav" 02:30:13 03:02:36
START 00:02:00

// Track 3
TRACK AUDIO
TWO_CHANNEL_AUDIO
FILE "data.wav" 24949 20764
START 00:01:00
INDEX 00:10:00

// Track 4
TRACK AUDIO
TWO_CHANNEL_AUDIO
FILE "data.wav" 45713 9507
"#;

	#[test]
	fn t_parse_time() {
		assert_eq!(parse_time("0").ok(), Some(0), "Bare zero should parse.");
		assert_eq!(parse_time("11263").ok(), Some(11_263), "Bare sectors should parse.");
		assert_eq!(parse_time("02:30:13").ok(), Some(11_263), "MSF should parse.");
		assert_eq!(parse_time("00:02:00").ok(), Some(150), "Two seconds is 150 sectors.");
		assert!(parse_time("00:99:00").is_err(), "Silly seconds should fail.");
		assert!(parse_time("a:b:c").is_err(), "Garbage should fail.");
	}

	#[test]
	fn t_parse() {
		let full = FullToc::parse(CDRDAO).expect("Full TOC failed to parse.");
		assert_eq!(full.catalog.as_deref(), Some("0075678035524"), "Catalog mismatch.");
		assert_eq!(full.tracks.len(), 4, "Expected four tracks.");

		assert_eq!(full.tracks[0].start, 0, "Track #1 starts the file.");
		assert_eq!(full.tracks[0].pregap, 0, "Track #1 has no pregap.");
		assert_eq!(full.tracks[0].isrc.as_deref(), Some("USRC17607839"), "ISRC mismatch.");

		assert_eq!(full.tracks[1].start, 11_263, "Track #2 region start mismatch.");
		assert_eq!(full.tracks[1].pregap, 150, "Track #2 pregap mismatch.");

		assert_eq!(full.tracks[2].indices, vec![750], "Track #3 index mismatch.");
	}

	#[test]
	fn t_parse_garbage() {
		assert!(FullToc::parse("CD_DA\n").is_err(), "Trackless TOCs should fail.");
		assert!(
			FullToc::parse("TRACK AUDIO\nSTART 00:02:00\n").is_err(),
			"Regionless tracks should fail.",
		);
	}

	#[test]
	fn t_reconcile() {
		let toc = Toc::from_cdtoc(CDTOC_PLAIN).expect("TOC failed to parse.");
		let mut disc = DiscInfo::from_toc(&toc);
		disc.tracks[1].title.replace("Keeper".to_owned());
		disc.tracks[1].skip = true;

		let full = FullToc::parse(CDRDAO).expect("Full TOC failed to parse.");
		reconcile(&mut disc, &full).expect("Reconciliation failed.");

		let sector = u64::from(BYTES_PER_SECTOR);

		// Pregaps moved; index-one offsets didn't.
		assert_eq!(disc.tracks[1].file_offset, 11_413 * sector, "Index one moved!");
		assert_eq!(disc.tracks[1].pregap_offset, 11_263 * sector, "Pregap not applied.");
		assert_eq!(disc.tracks[2].pregap_offset, 24_949 * sector, "Pregap not applied.");

		// Track one now ends where track two's pregap begins.
		assert_eq!(disc.tracks[0].end_offset(), disc.tracks[1].pregap_offset, "Length not trimmed.");

		// Indices landed as absolute file offsets.
		assert_eq!(
			disc.tracks[2].indices,
			vec![(25_024 + 750) * sector],
			"Index offsets mismatch.",
		);

		// User metadata survived; fresh fields filled in.
		assert_eq!(disc.tracks[1].title.as_deref(), Some("Keeper"), "Title clobbered!");
		assert!(disc.tracks[1].skip, "Skip flag clobbered!");
		assert_eq!(disc.catalog.as_deref(), Some("0075678035524"), "Catalog not filled.");
		assert_eq!(disc.tracks[0].isrc.as_deref(), Some("USRC17607839"), "ISRC not filled.");
	}

	#[test]
	fn t_reconcile_isrc_keeps() {
		let toc = Toc::from_cdtoc(CDTOC_PLAIN).expect("TOC failed to parse.");
		let mut disc = DiscInfo::from_toc(&toc);
		disc.tracks[0].isrc.replace("USRC17600000".to_owned());

		let full = FullToc::parse(CDRDAO).expect("Full TOC failed to parse.");
		reconcile(&mut disc, &full).expect("Reconciliation failed.");
		assert_eq!(
			disc.tracks[0].isrc.as_deref(),
			Some("USRC17600000"),
			"Existing ISRCs must not be overwritten.",
		);
	}

	#[test]
	fn t_reconcile_mismatch() {
		let toc = Toc::from_cdtoc("3+96+2D2B+6256+B327").expect("TOC failed to parse.");
		let mut disc = DiscInfo::from_toc(&toc);
		let before = disc.clone();

		let full = FullToc::parse(CDRDAO).expect("Full TOC failed to parse.");
		assert!(
			matches!(reconcile(&mut disc, &full), Err(SpindleError::TocMismatch)),
			"Mismatched track counts must be refused.",
		);
		assert_eq!(disc, before, "A refused merge must leave the disc alone.");
	}

	#[test]
	fn t_reconcile_hidden() {
		// First track at normalized sector 9852; everything shifts.
		let toc = Toc::from_cdtoc("2+2712+6256+B327").expect("TOC failed to parse.");
		let mut disc = DiscInfo::from_toc(&toc);
		assert_eq!(disc.tracks[0].number, 0, "Expected a hidden track.");

		// cdrdao files track one from byte zero, pregap swallowing the
		// hidden audio.
		let full = FullToc::parse(r#"CD_DA
TRACK AUDIO
FILE "data.wav" 0 25024
START 02:11:27
TRACK AUDIO
FILE "data.wav" 25024 20689
"#).expect("Full TOC failed to parse.");

		reconcile(&mut disc, &full).expect("Reconciliation failed.");

		let sector = u64::from(BYTES_PER_SECTOR);
		assert_eq!(disc.tracks[0].number, 0, "The hidden track must survive.");
		assert_eq!(
			disc.tracks[0].end_offset(), 9852 * sector,
			"The hidden track must keep its audio.",
		);
		assert_eq!(
			disc.tracks[1].pregap_offset, 9852 * sector,
			"Track one's pregap must stop at the hidden audio.",
		);
	}
}
