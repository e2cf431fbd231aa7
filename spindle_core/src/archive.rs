/*!
# Spindle: Archive

Every disc gets a directory named for its id, holding the raw PCM rip, the
basic TOC captured at insertion, the cdrdao-format subchannel TOC (if that
phase ever finished), and the user-editable JSON record. Files are always
replaced whole — temp file, then rename — so concurrent readers see either
the old version or the new one, never a half-written mess.
*/

use cdtoc::Toc;
use crate::{
	DiscId,
	DiscInfo,
	FILE_BASIC_TOC,
	FILE_FULL_TOC,
	FILE_INFO,
	FILE_PCM,
	SpindleError,
};
use std::{
	io::Write,
	path::{
		Path,
		PathBuf,
	},
};
use tempfile::NamedTempFile;



#[derive(Debug, Clone)]
/// # Archive.
///
/// The root of the on-disk disc collection. Only the ripper writes audio
/// here; everything else reads, or replaces whole metadata files.
pub struct Archive {
	/// # Root Directory.
	root: PathBuf,
}

impl Archive {
	/// # New.
	///
	/// Establish (and if necessary create) the archive root.
	///
	/// ## Errors
	///
	/// This will return an error if the directory cannot be created or
	/// canonicalized.
	pub fn new<P>(root: P) -> Result<Self, SpindleError>
	where P: AsRef<Path> {
		let root = root.as_ref();
		if ! root.is_dir() {
			std::fs::create_dir_all(root)
				.map_err(|_| SpindleError::Archive(root.to_string_lossy().into_owned()))?;
		}
		let root = std::fs::canonicalize(root)
			.map_err(|_| SpindleError::Archive(root.to_string_lossy().into_owned()))?;
		Ok(Self { root })
	}

	#[must_use]
	/// # Disc Directory.
	pub fn disc_dir(&self, id: &DiscId) -> PathBuf { self.root.join(id.as_str()) }

	#[must_use]
	/// # PCM Path.
	pub fn pcm_path(&self, id: &DiscId) -> PathBuf {
		self.disc_dir(id).join(FILE_PCM)
	}

	#[must_use]
	/// # Full TOC Path.
	pub fn full_toc_path(&self, id: &DiscId) -> PathBuf {
		self.disc_dir(id).join(FILE_FULL_TOC)
	}

	#[must_use]
	/// # Ripped Byte Count.
	///
	/// The current size of the PCM file, zero if it doesn't exist yet.
	pub fn pcm_len(&self, id: &DiscId) -> u64 {
		std::fs::metadata(self.pcm_path(id)).map_or(0, |m| m.len())
	}

	#[must_use]
	/// # Fully Ripped?
	///
	/// The rip is complete when the PCM file has reached the byte total the
	/// TOC promises. (No flag to go stale; the file speaks for itself.)
	pub fn complete(&self, disc: &DiscInfo) -> bool {
		let expected = disc.expected_pcm_bytes();
		expected != 0 && expected <= self.pcm_len(&disc.id)
	}
}

impl Archive {
	/// # Create a Disc Entry.
	///
	/// Write the basic TOC and initial JSON record for a newly-identified
	/// disc. Existing files are left alone: re-insertion of a half-ripped
	/// disc must not clobber edits already made.
	///
	/// ## Errors
	///
	/// This will return an error if the directory or files cannot be
	/// written.
	pub fn create(&self, disc: &DiscInfo, toc: &Toc) -> Result<DiscInfo, SpindleError> {
		let dir = self.disc_dir(&disc.id);
		if ! dir.is_dir() {
			std::fs::create_dir_all(&dir)
				.map_err(|_| SpindleError::Archive(dir.to_string_lossy().into_owned()))?;
		}

		// An existing record wins.
		if let Some(old) = self.load(&disc.id)? { return Ok(old); }

		write_atomic(&dir.join(FILE_BASIC_TOC), format!("{toc}\n").as_bytes())?;
		self.save(disc)?;
		Ok(disc.clone())
	}

	/// # Load a Disc Record.
	///
	/// ## Errors
	///
	/// Returns `Ok(None)` when the disc simply isn't archived; an error
	/// means the record exists but can't be read or parsed.
	pub fn load(&self, id: &DiscId) -> Result<Option<DiscInfo>, SpindleError> {
		let src = self.disc_dir(id).join(FILE_INFO);
		if ! src.is_file() { return Ok(None); }

		let raw = std::fs::read_to_string(&src)
			.map_err(|_| SpindleError::Read(src.to_string_lossy().into_owned()))?;
		let disc: DiscInfo = serde_json::from_str(&raw)?;
		Ok(Some(disc))
	}

	/// # Load, Following Alias Links.
	///
	/// Resolve one level of alias: if the requested disc links elsewhere,
	/// the target is returned along with the id actually loaded. The State
	/// reports both.
	///
	/// ## Errors
	///
	/// Same as [`Archive::load`], for either hop.
	pub fn resolve(&self, id: &DiscId) -> Result<Option<(DiscInfo, DiscId)>, SpindleError> {
		let Some(disc) = self.load(id)? else { return Ok(None); };
		if let Some(link) = disc.link.clone() {
			if let Some(target) = self.load(&link)? {
				return Ok(Some((target, link)));
			}
		}
		let source = disc.id.clone();
		Ok(Some((disc, source)))
	}

	/// # Save a Disc Record.
	///
	/// ## Errors
	///
	/// This will return an error if serialization or the write fails.
	pub fn save(&self, disc: &DiscInfo) -> Result<(), SpindleError> {
		let dst = self.disc_dir(&disc.id).join(FILE_INFO);
		let raw = serde_json::to_vec_pretty(disc)?;
		write_atomic(&dst, &raw)
	}

	/// # Read the Archived Full TOC.
	///
	/// ## Errors
	///
	/// Returns `Ok(None)` if the subchannel phase never produced one.
	pub fn load_full_toc(&self, id: &DiscId) -> Result<Option<String>, SpindleError> {
		let src = self.full_toc_path(id);
		if ! src.is_file() { return Ok(None); }
		std::fs::read_to_string(&src)
			.map(Some)
			.map_err(|_| SpindleError::Read(src.to_string_lossy().into_owned()))
	}
}



/// # Atomic Write.
///
/// Write to a temp file alongside the destination, then rename it into
/// place.
fn write_atomic(dst: &Path, data: &[u8]) -> Result<(), SpindleError> {
	let err = || SpindleError::Write(dst.to_string_lossy().into_owned());
	let dir = dst.parent().ok_or_else(err)?;
	let mut tmp = NamedTempFile::new_in(dir).map_err(|_| err())?;
	tmp.write_all(data).map_err(|_| err())?;
	tmp.flush().map_err(|_| err())?;
	tmp.persist(dst).map_err(|_| err())?;
	Ok(())
}



#[cfg(test)]
mod test {
	use super::*;
	use tempfile::TempDir;

	const CDTOC_PLAIN: &str = "4+96+2D2B+6256+B327+D84A";

	/// # Fixture.
	fn fixture() -> (TempDir, Archive, DiscInfo, Toc) {
		let dir = TempDir::new().expect("Tempdir failed.");
		let archive = Archive::new(dir.path()).expect("Archive failed.");
		let toc = Toc::from_cdtoc(CDTOC_PLAIN).expect("TOC failed to parse.");
		let disc = DiscInfo::from_toc(&toc);
		(dir, archive, disc, toc)
	}

	#[test]
	fn t_create_load() {
		let (_dir, archive, disc, toc) = fixture();

		assert!(
			archive.load(&disc.id).expect("Load failed.").is_none(),
			"The archive should start empty.",
		);

		archive.create(&disc, &toc).expect("Create failed.");
		let back = archive.load(&disc.id)
			.expect("Load failed.")
			.expect("The disc should exist now.");
		assert_eq!(disc, back, "The record did not survive the round trip.");

		// The basic TOC should be re-parseable.
		let raw = std::fs::read_to_string(archive.disc_dir(&disc.id).join(FILE_BASIC_TOC))
			.expect("Basic TOC missing.");
		let toc2 = Toc::from_cdtoc(raw.trim()).expect("Basic TOC failed to reparse.");
		assert_eq!(toc, toc2, "The basic TOC did not survive the round trip.");
	}

	#[test]
	fn t_create_keeps_edits() {
		let (_dir, archive, disc, toc) = fixture();
		archive.create(&disc, &toc).expect("Create failed.");

		// Simulate an admin edit.
		let mut edited = disc.clone();
		edited.title.replace("Edited".to_owned());
		archive.save(&edited).expect("Save failed.");

		// Re-inserting the disc must not clobber it.
		let kept = archive.create(&disc, &toc).expect("Create failed.");
		assert_eq!(kept.title.as_deref(), Some("Edited"), "Create clobbered an edit.");
	}

	#[test]
	fn t_resolve_link() {
		let (_dir, archive, disc, toc) = fixture();
		archive.create(&disc, &toc).expect("Create failed.");

		// A second disc linking to the first.
		let toc2 = Toc::from_cdtoc("2+2712+6256+B327").expect("TOC failed to parse.");
		let mut alias = DiscInfo::from_toc(&toc2);
		alias.link.replace(disc.id.clone());
		archive.create(&alias, &toc2).expect("Create failed.");

		let (loaded, source) = archive.resolve(&alias.id)
			.expect("Resolve failed.")
			.expect("The alias should resolve.");
		assert_eq!(loaded.id, disc.id, "The alias should load its target.");
		assert_eq!(source, disc.id, "The source id should be the target's.");

		// Unlinked discs resolve to themselves.
		let (loaded, source) = archive.resolve(&disc.id)
			.expect("Resolve failed.")
			.expect("The disc should resolve.");
		assert_eq!(loaded.id, disc.id, "Self-resolution loaded the wrong disc.");
		assert_eq!(source, disc.id, "Self-resolution source mismatch.");
	}

	#[test]
	fn t_complete() {
		let (_dir, archive, disc, toc) = fixture();
		archive.create(&disc, &toc).expect("Create failed.");
		assert!(! archive.complete(&disc), "No PCM means not complete.");

		// A short file isn't complete either.
		std::fs::write(archive.pcm_path(&disc.id), [0_u8; 1024]).expect("Write failed.");
		assert!(! archive.complete(&disc), "A partial PCM isn't complete.");
	}
}
