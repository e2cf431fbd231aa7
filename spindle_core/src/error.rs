/*!
# Spindle: Errors
*/

use cdtoc::TocError;
use fyi_msg::Msg;
use std::{
	error::Error,
	fmt,
};



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Errors.
pub enum SpindleError {
	/// # Archive trouble.
	Archive(String),

	/// # Bug!
	Bug(&'static str),

	/// # CDTOC passthrough.
	Cdtoc(TocError),

	/// # Child process failure.
	Child(String),

	/// # Invalid device.
	Device(String),

	/// # Unable to open the drive.
	DriveOpen(String),

	/// # Unsupported Disc.
	DiscMode,

	/// # Invalid disc id.
	DiscId(String),

	/// # Unable to eject.
	Eject,

	/// # Unable to get first track number.
	FirstTrackNum,

	/// # Operation not valid in the current state.
	InvalidState(&'static str),

	/// # JSON de/serialization.
	Json(String),

	/// # User Abort.
	Killed,

	/// # Unable to get leadout.
	Leadout,

	/// # No disc in the drive (or none loaded).
	NoDisc,

	/// # No Track.
	NoTrack(u8),

	/// # Unable to obtain the number of tracks.
	NumTracks,

	/// # Unworkable device period.
	PeriodSize(usize),

	/// # Reading from disk.
	Read(String),

	/// # Rip failure.
	Rip(String),

	/// # The sink worker died.
	SinkDead,

	/// # Full TOC parse failure.
	TocParse(String),

	/// # Full TOC doesn't match the basic one.
	TocMismatch,

	/// # Invalid track number.
	TrackNumber(u8),

	/// # Unknown command.
	UnknownCommand(String),

	/// # Bad command argument.
	CommandArg(&'static str),

	/// # Writing to disk.
	Write(String),

	#[cfg(feature = "bin")]
	/// # Argyle passthrough.
	Argue(argyle::ArgyleError),

	#[cfg(feature = "bin")]
	/// # Invalid CLI arg.
	CliArg(String),

	#[cfg(feature = "bin")]
	/// # CLI Parsing failure.
	CliParse(&'static str),
}

impl Error for SpindleError {}

#[cfg(feature = "bin")]
impl From<argyle::ArgyleError> for SpindleError {
	#[inline]
	fn from(err: argyle::ArgyleError) -> Self { Self::Argue(err) }
}

impl From<TocError> for SpindleError {
	#[inline]
	fn from(err: TocError) -> Self { Self::Cdtoc(err) }
}

impl From<serde_json::Error> for SpindleError {
	#[inline]
	fn from(err: serde_json::Error) -> Self { Self::Json(err.to_string()) }
}

impl From<SpindleError> for Msg {
	#[inline]
	fn from(src: SpindleError) -> Self { Self::error(src.to_string()) }
}

impl fmt::Display for SpindleError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Archive(s) => write!(f, "Archive trouble: {s}."),
			Self::Bug(s) => write!(f, "Bug: {s}."),
			Self::Cdtoc(s) => write!(f, "{s}"),
			Self::Child(s) => write!(f, "Child process failure: {s}."),
			Self::Device(s) => write!(f, "Invalid device path {s}."),
			Self::DriveOpen(s) => write!(f, "Unable to open connection with {s}."),
			Self::DiscMode => f.write_str("Missing or unsupported disc type."),
			Self::DiscId(s) => write!(f, "Invalid disc id {s}."),
			Self::Eject => f.write_str("Unable to eject the disc."),
			Self::FirstTrackNum => f.write_str("Unable to obtain the first track index."),
			Self::InvalidState(s) => write!(f, "Invalid state for {s}."),
			Self::Json(s) => write!(f, "JSON: {s}."),
			Self::Killed => f.write_str("User abort."),
			Self::Leadout => f.write_str("Unable to obtain leadout."),
			Self::NoDisc => f.write_str("No disc."),
			Self::NoTrack(n) =>
				if *n == 0 { f.write_str("There is no hidden track on this disc.") }
				else { write!(f, "There is no track #{n} on this disc.") },
			Self::NumTracks => f.write_str("Unable to obtain the track total."),
			Self::PeriodSize(n) => write!(f, "The device insists on an unworkable period size ({n} bytes)."),
			Self::Read(s) => write!(f, "Unable to read from {s}."),
			Self::Rip(s) => write!(f, "Rip failure: {s}."),
			Self::SinkDead => f.write_str("player thread died"),
			Self::TocParse(s) => write!(f, "Unreadable TOC: {s}."),
			Self::TocMismatch => f.write_str("The full TOC does not match the disc."),
			Self::TrackNumber(n) => write!(f, "Invalid track number ({n})."),
			Self::UnknownCommand(s) => write!(f, "Unknown command: {s}."),
			Self::CommandArg(s) => write!(f, "Invalid argument for {s}."),
			Self::Write(s) => write!(f, "Unable to write to {s}."),

			#[cfg(feature = "bin")]
			Self::Argue(e) => write!(f, "{e}"),

			#[cfg(feature = "bin")]
			Self::CliArg(s) => write!(f, "Invalid CLI option: {s}"),

			#[cfg(feature = "bin")]
			Self::CliParse(s) => write!(f, "Unable to parse {s}."),
		}
	}
}
