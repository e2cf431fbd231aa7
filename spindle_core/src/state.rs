/*!
# Spindle: Published State
*/

use crate::DiscId;
use serde::{
	Deserialize,
	Serialize,
};
use std::fmt;



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// # Player Phase.
///
/// The coarse player condition, as published on the wire.
pub enum PlayerPhase {
	/// # Shutting down (terminal).
	Off,

	#[default]
	/// # Empty drive, nothing loaded.
	NoDisc,

	/// # Disc identified; rip/stream starting up.
	Working,

	/// # Playing.
	Play,

	/// # Paused mid-stream.
	Pause,

	/// # Stopped with a disc still loaded.
	Stop,
}

impl fmt::Display for PlayerPhase {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl PlayerPhase {
	#[must_use]
	/// # As Str.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Off => "OFF",
			Self::NoDisc => "NO_DISC",
			Self::Working => "WORKING",
			Self::Play => "PLAY",
			Self::Pause => "PAUSE",
			Self::Stop => "STOP",
		}
	}
}



#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
/// # Player State.
///
/// The full published state: one of these goes out (as JSON) on every
/// change, including the once-a-second position ticks during playback.
pub struct PlayerState {
	/// # Phase.
	pub state: PlayerPhase,

	/// # Loaded Disc, If Any.
	pub disc_id: Option<DiscId>,

	/// # Source Disc.
	///
	/// Differs from `disc_id` when the loaded disc was an alias link to
	/// another entry in the archive.
	pub source_disc_id: Option<DiscId>,

	/// # Current Track Number.
	///
	/// Zero when nothing is playing, or when the hidden pregap track is.
	pub track: u8,

	/// # Track Total.
	pub no_tracks: u8,

	/// # Index Within Track.
	///
	/// Zero means pregap.
	pub index: u8,

	/// # Position (Seconds).
	///
	/// Measured from track index 1; negative during pregap.
	pub position: i32,

	/// # Track Length (Seconds).
	pub length: u32,

	/// # Last Error, If Any.
	pub error: Option<String>,
}



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// # Rip Phase.
pub enum RipPhase {
	#[default]
	/// # Not ripping.
	Inactive,

	/// # Pulling audio.
	Audio,

	/// # Pulling the subchannel TOC.
	Toc,
}

impl fmt::Display for RipPhase {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl RipPhase {
	#[must_use]
	/// # As Str.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Inactive => "INACTIVE",
			Self::Audio => "AUDIO",
			Self::Toc => "TOC",
		}
	}
}



#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
/// # Rip State.
///
/// Published whenever the rip phase or progress changes.
pub struct RipState {
	/// # Phase.
	pub state: RipPhase,

	/// # Disc Being Ripped.
	pub disc_id: Option<DiscId>,

	/// # Progress.
	///
	/// A percentage `0..=100`, or `None` when unknown.
	pub progress: Option<u8>,

	/// # Last Error, If Any.
	pub error: Option<String>,
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_phase_json() {
		for (phase, expected) in [
			(PlayerPhase::Off, "\"OFF\""),
			(PlayerPhase::NoDisc, "\"NO_DISC\""),
			(PlayerPhase::Working, "\"WORKING\""),
			(PlayerPhase::Play, "\"PLAY\""),
			(PlayerPhase::Pause, "\"PAUSE\""),
			(PlayerPhase::Stop, "\"STOP\""),
		] {
			assert_eq!(
				serde_json::to_string(&phase).expect("Phase failed to serialize."),
				expected,
			);
		}
	}

	#[test]
	fn t_state_keys() {
		let state = PlayerState {
			state: PlayerPhase::Play,
			disc_id: None,
			source_disc_id: None,
			track: 2,
			no_tracks: 9,
			index: 1,
			position: -1,
			length: 213,
			error: None,
		};
		let raw = serde_json::to_string(&state).expect("State failed to serialize.");
		for key in [
			"\"state\":", "\"disc_id\":", "\"source_disc_id\":", "\"track\":",
			"\"no_tracks\":", "\"index\":", "\"position\":", "\"length\":",
			"\"error\":",
		] {
			assert!(raw.contains(key), "State JSON is missing {key}");
		}

		let back: PlayerState = serde_json::from_str(&raw).expect("State failed to parse.");
		assert_eq!(state, back, "State did not survive the round trip.");
	}

	#[test]
	fn t_rip_state_json() {
		let rip = RipState {
			state: RipPhase::Audio,
			disc_id: None,
			progress: Some(42),
			error: None,
		};
		let raw = serde_json::to_string(&rip).expect("RipState failed to serialize.");
		assert!(raw.contains("\"AUDIO\""), "Rip phase should serialize SCREAMING.");
		assert!(raw.contains("\"progress\":42"), "Progress should be a bare number.");
	}
}
