/*!
# Spindle: Configuration
*/

use std::{
	path::PathBuf,
	time::Duration,
};



/// # Default Audio Rip Command.
///
/// `{device}`, `{file}`, and `{speed}` are substituted at launch;
/// arguments still containing `{speed}` after an unlimited-speed rip are
/// dropped.
const AUDIO_RIP_CMD: &[&str] = &[
	"cdparanoia",
	"--force-cdrom-device", "{device}",
	"--output-raw-big-endian",
	"--quiet",
	"-S", "{speed}",
	"1-",
	"{file}",
];

/// # Default TOC Rip Command.
const TOC_RIP_CMD: &[&str] = &[
	"cdrdao", "read-toc",
	"--device", "{device}",
	"{file}",
];



#[derive(Debug, Clone)]
/// # Daemon Configuration.
///
/// Everything is read once at startup and passed around by value; there is
/// no global to poke at runtime. Settings come with builder-style methods,
/// like:
///
/// ```
/// use spindle_core::Config;
///
/// let config = Config::default()
///     .with_drive("/dev/sr0")
///     .with_rip_speed(8);
///
/// assert_eq!(config.drive(), "/dev/sr0");
/// assert_eq!(config.rip_speed(), 8);
/// ```
pub struct Config {
	/// # Optical Drive Path.
	drive: String,

	/// # Archive Root.
	archive: PathBuf,

	/// # ALSA Device Name.
	audio_device: String,

	/// # Start Even If the Audio Device Is Missing?
	start_without_device: bool,

	/// # Audio Rip Command Template.
	audio_rip_cmd: Vec<String>,

	/// # TOC Rip Command Template.
	toc_rip_cmd: Vec<String>,

	/// # Rip Speed Cap (0 = Unlimited).
	rip_speed: u8,

	/// # Rip Wall-Clock Timeout.
	rip_timeout: Duration,

	/// # Live-Rip Poll Interval.
	poll: Duration,

	/// # Device Re-Open Backoff.
	open_backoff: Duration,

	/// # State-Channel Bind Address.
	state_addr: Option<String>,

	/// # Command-Channel Bind Address.
	command_addr: Option<String>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			drive: "/dev/cdrom".to_owned(),
			archive: PathBuf::from("/var/lib/spindle"),
			audio_device: "default".to_owned(),
			start_without_device: false,
			audio_rip_cmd: AUDIO_RIP_CMD.iter().map(|&s| s.to_owned()).collect(),
			toc_rip_cmd: TOC_RIP_CMD.iter().map(|&s| s.to_owned()).collect(),
			rip_speed: 0,
			rip_timeout: Duration::from_secs(60 * 30),
			poll: Duration::from_millis(500),
			open_backoff: Duration::from_secs(3),
			state_addr: None,
			command_addr: None,
		}
	}
}

impl Config {
	#[must_use]
	/// # With Drive Path.
	pub fn with_drive(mut self, drive: &str) -> Self {
		drive.clone_into(&mut self.drive);
		self
	}

	#[must_use]
	/// # With Archive Root.
	pub fn with_archive(mut self, archive: PathBuf) -> Self {
		self.archive = archive;
		self
	}

	#[must_use]
	/// # With Audio Device.
	pub fn with_audio_device(mut self, device: &str) -> Self {
		device.clone_into(&mut self.audio_device);
		self
	}

	#[must_use]
	/// # With Start-Without-Device.
	///
	/// When set, a missing or busy audio device at startup is reported
	/// through the published state rather than treated as fatal; the sink
	/// keeps retrying until it appears.
	pub const fn with_start_without_device(mut self, v: bool) -> Self {
		self.start_without_device = v;
		self
	}

	#[must_use]
	/// # With Audio Rip Command.
	pub fn with_audio_rip_cmd<I>(mut self, iter: I) -> Self
	where I: IntoIterator<Item=String> {
		self.audio_rip_cmd.truncate(0);
		self.audio_rip_cmd.extend(iter);
		self
	}

	#[must_use]
	/// # With TOC Rip Command.
	pub fn with_toc_rip_cmd<I>(mut self, iter: I) -> Self
	where I: IntoIterator<Item=String> {
		self.toc_rip_cmd.truncate(0);
		self.toc_rip_cmd.extend(iter);
		self
	}

	#[must_use]
	/// # With Rip Speed Cap.
	pub const fn with_rip_speed(mut self, speed: u8) -> Self {
		self.rip_speed = speed;
		self
	}

	#[must_use]
	/// # With Rip Timeout.
	pub const fn with_rip_timeout(mut self, timeout: Duration) -> Self {
		self.rip_timeout = timeout;
		self
	}

	#[must_use]
	/// # With Poll Interval.
	pub const fn with_poll(mut self, poll: Duration) -> Self {
		self.poll = poll;
		self
	}

	#[must_use]
	/// # With Device Re-Open Backoff.
	pub const fn with_open_backoff(mut self, backoff: Duration) -> Self {
		self.open_backoff = backoff;
		self
	}

	#[must_use]
	/// # With State-Channel Address.
	pub fn with_state_addr(mut self, addr: Option<String>) -> Self {
		self.state_addr = addr;
		self
	}

	#[must_use]
	/// # With Command-Channel Address.
	pub fn with_command_addr(mut self, addr: Option<String>) -> Self {
		self.command_addr = addr;
		self
	}
}

impl Config {
	#[must_use]
	/// # Drive Path.
	pub fn drive(&self) -> &str { &self.drive }

	#[must_use]
	/// # Archive Root.
	pub fn archive(&self) -> &std::path::Path { &self.archive }

	#[must_use]
	/// # Audio Device.
	pub fn audio_device(&self) -> &str { &self.audio_device }

	#[must_use]
	/// # Start Without Device?
	pub const fn start_without_device(&self) -> bool { self.start_without_device }

	#[must_use]
	/// # Rip Speed Cap.
	pub const fn rip_speed(&self) -> u8 { self.rip_speed }

	#[must_use]
	/// # Rip Timeout.
	pub const fn rip_timeout(&self) -> Duration { self.rip_timeout }

	#[must_use]
	/// # Poll Interval.
	pub const fn poll(&self) -> Duration { self.poll }

	#[must_use]
	/// # Device Re-Open Backoff.
	pub const fn open_backoff(&self) -> Duration { self.open_backoff }

	#[must_use]
	/// # State-Channel Address.
	pub fn state_addr(&self) -> Option<&str> { self.state_addr.as_deref() }

	#[must_use]
	/// # Command-Channel Address.
	pub fn command_addr(&self) -> Option<&str> { self.command_addr.as_deref() }

	#[must_use]
	/// # Audio Rip Command, Substituted.
	pub fn audio_rip_cmd(&self, file: &str) -> Vec<String> {
		substitute(&self.audio_rip_cmd, &self.drive, file, self.rip_speed)
	}

	#[must_use]
	/// # TOC Rip Command, Substituted.
	pub fn toc_rip_cmd(&self, file: &str) -> Vec<String> {
		substitute(&self.toc_rip_cmd, &self.drive, file, self.rip_speed)
	}
}



/// # Fill In a Command Template.
///
/// Swap `{device}`, `{file}`, and `{speed}` for their values. With no
/// speed cap, any argument still mentioning `{speed}` is dropped, along
/// with the flag immediately before it if there was one.
fn substitute(cmd: &[String], device: &str, file: &str, speed: u8) -> Vec<String> {
	let mut out = Vec::with_capacity(cmd.len());
	for arg in cmd {
		if arg.contains("{speed}") {
			if speed == 0 {
				// Drop the preceding flag too, if any.
				if out.last().is_some_and(|last: &String| last.starts_with('-')) {
					let _res = out.pop();
				}
				continue;
			}
			out.push(arg.replace("{speed}", &speed.to_string()));
		}
		else {
			out.push(
				arg.replace("{device}", device).replace("{file}", file)
			);
		}
	}
	out
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_substitute() {
		let config = Config::default().with_drive("/dev/sr0");

		// No speed cap: the -S pair vanishes.
		let cmd = config.audio_rip_cmd("/tmp/out.pcm");
		assert!(! cmd.iter().any(|a| a.contains("{speed}")), "Speed left behind.");
		assert!(! cmd.iter().any(|a| a == "-S"), "The -S flag should drop too.");
		assert!(cmd.contains(&"/dev/sr0".to_owned()), "Device not substituted.");
		assert!(cmd.contains(&"/tmp/out.pcm".to_owned()), "File not substituted.");

		// With a cap, it stays.
		let config = config.with_rip_speed(8);
		let cmd = config.audio_rip_cmd("/tmp/out.pcm");
		let pos = cmd.iter().position(|a| a == "-S").expect("The -S flag should stay.");
		assert_eq!(cmd.get(pos + 1).map(String::as_str), Some("8"), "Speed not substituted.");
	}
}
