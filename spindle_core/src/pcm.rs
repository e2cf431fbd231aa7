/*!
# Spindle: PCM Device

A thin seam between the sink worker and whatever is actually making noise.
The worker only ever talks to [`PcmDevice`]/[`PcmOpen`], so the tests can
substitute a scripted fake; the daemon hands it an [`AlsaOpen`].
*/

use alsa::{
	Direction,
	ValueOr,
	pcm::{
		Access,
		Format,
		HwParams,
		PCM,
	},
};
use crate::{
	BYTES_PER_SAMPLE,
	CHANNELS,
	SAMPLE_RATE,
};
use std::fmt;



/// # Requested Period (Samples).
///
/// The device is free to pick something else; whatever it picks is used
/// verbatim, within the ring buffer's period cap.
const PERIOD_SAMPLES: i64 = 4096;

/// # Requested Period Count.
const PERIODS: u32 = 4;



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Device Errors.
///
/// The worker only cares about one distinction: errors it should recover
/// and retry in place, and errors that warrant closing the device and
/// starting over.
pub enum DeviceError {
	/// # Interrupted Syscall.
	Interrupted,

	/// # Underrun.
	Underrun,

	/// # Suspended.
	Suspended,

	/// # Anything Else.
	Fatal(String),
}

impl fmt::Display for DeviceError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Interrupted => f.write_str("Interrupted system call"),
			Self::Underrun => f.write_str("Broken pipe"),
			Self::Suspended => f.write_str("Streams pipe error"),
			Self::Fatal(s) => f.write_str(s),
		}
	}
}

impl DeviceError {
	#[must_use]
	/// # Worth Recovering In Place?
	pub const fn recoverable(&self) -> bool {
		matches!(self, Self::Interrupted | Self::Underrun | Self::Suspended)
	}
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Negotiated Parameters.
pub struct Negotiated {
	/// # Hardware Period (Bytes).
	pub period_bytes: usize,

	/// # Byte-Swap Required?
	///
	/// Set when the device would only take little-endian samples; the swap
	/// happens on the producer's copy into the ring buffer.
	pub swap: bool,
}



/// # A Playback Device.
pub trait PcmDevice: Send {
	/// # Write One Period.
	///
	/// The slice is exactly one hardware period, already in the device's
	/// byte order.
	///
	/// ## Errors
	///
	/// Returns the device's complaint, recoverable or otherwise.
	fn write_period(&mut self, bytes: &[u8]) -> Result<(), DeviceError>;

	/// # Recover After a Recoverable Error.
	///
	/// ## Errors
	///
	/// Returns an error if the device couldn't be re-prepared.
	fn recover(&mut self) -> Result<(), DeviceError>;

	/// # Pause / Unpause.
	///
	/// ## Errors
	///
	/// Returns an error if the hardware refused; the caller's logical state
	/// advances regardless.
	fn pause(&mut self, pause: bool) -> Result<(), DeviceError>;

	/// # Drain Buffered Audio, Then Stop.
	///
	/// ## Errors
	///
	/// Returns an error if the drain failed.
	fn drain(&mut self) -> Result<(), DeviceError>;

	/// # Drop Buffered Audio Immediately.
	///
	/// ## Errors
	///
	/// Returns an error if even that failed.
	fn discard(&mut self) -> Result<(), DeviceError>;
}

/// # A Device Opener.
///
/// Opening includes hardware parameter negotiation, so a successful open
/// comes back with the period size and byte-order verdict.
pub trait PcmOpen: Send {
	/// # Open and Negotiate.
	///
	/// ## Errors
	///
	/// Returns an error if the device can't be opened or won't accept
	/// 16-bit stereo at the CD rate.
	fn open(&self) -> Result<(Box<dyn PcmDevice>, Negotiated), DeviceError>;
}



#[derive(Debug, Clone)]
/// # ALSA Opener.
pub struct AlsaOpen {
	/// # Device Name, e.g. `default` or `hw:0,0`.
	device: String,
}

impl AlsaOpen {
	#[must_use]
	/// # New.
	pub fn new(device: &str) -> Self {
		Self { device: device.to_owned() }
	}
}

impl PcmOpen for AlsaOpen {
	fn open(&self) -> Result<(Box<dyn PcmDevice>, Negotiated), DeviceError> {
		let pcm = PCM::new(&self.device, Direction::Playback, false)
			.map_err(map_err)?;

		let (period_bytes, swap) = {
			let hwp = HwParams::any(&pcm).map_err(map_err)?;
			hwp.set_access(Access::RWInterleaved).map_err(map_err)?;

			// The disc's byte order first; the other way means swapping on
			// the copy in.
			let swap = match hwp.set_format(Format::S16BE) {
				Ok(()) => false,
				Err(_) => {
					hwp.set_format(Format::S16LE).map_err(map_err)?;
					true
				},
			};

			// Channel or rate compromises are not acceptable.
			hwp.set_channels(u32::from(CHANNELS)).map_err(map_err)?;
			hwp.set_rate(SAMPLE_RATE, ValueOr::Nearest).map_err(map_err)?;
			if hwp.get_rate().map_err(map_err)? != SAMPLE_RATE {
				return Err(DeviceError::Fatal(format!(
					"device refused {SAMPLE_RATE} Hz",
				)));
			}

			hwp.set_period_size_near(PERIOD_SAMPLES, ValueOr::Nearest).map_err(map_err)?;
			hwp.set_periods(PERIODS, ValueOr::Nearest).map_err(map_err)?;
			pcm.hw_params(&hwp).map_err(map_err)?;

			let frames = hwp.get_period_size().map_err(map_err)?;
			let frames = usize::try_from(frames)
				.map_err(|_| DeviceError::Fatal("nonsense period size".to_owned()))?;
			(frames * usize::from(BYTES_PER_SAMPLE), swap)
		};

		pcm.prepare().map_err(map_err)?;

		let out = AlsaOut {
			pcm,
			scratch: Vec::new(),
		};
		Ok((Box::new(out), Negotiated { period_bytes, swap }))
	}
}



/// # An Open ALSA Device.
struct AlsaOut {
	/// # The Handle.
	pcm: PCM,

	/// # Sample Scratch Buffer.
	///
	/// `writei` wants `i16`s; the ring speaks bytes. The pairs are already
	/// in device order, so this is a reinterpretation, not a conversion.
	scratch: Vec<i16>,
}

impl PcmDevice for AlsaOut {
	fn write_period(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
		self.scratch.truncate(0);
		self.scratch.extend(
			bytes.chunks_exact(2).map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
		);

		let io = self.pcm.io_i16().map_err(map_err)?;
		let channels = usize::from(CHANNELS);
		let total = self.scratch.len() / channels;
		let mut written = 0;
		while written < total {
			match io.writei(&self.scratch[written * channels..]) {
				Ok(n) => { written += n; },
				Err(e) => return Err(map_err(e)),
			}
		}
		Ok(())
	}

	fn recover(&mut self) -> Result<(), DeviceError> {
		self.pcm.prepare().map_err(map_err)
	}

	fn pause(&mut self, pause: bool) -> Result<(), DeviceError> {
		self.pcm.pause(pause).map_err(map_err)
	}

	fn drain(&mut self) -> Result<(), DeviceError> {
		self.pcm.drain().map_err(map_err)
	}

	fn discard(&mut self) -> Result<(), DeviceError> {
		self.pcm.drop().map_err(map_err)
	}
}



/// # Classify an ALSA Error.
fn map_err(err: alsa::Error) -> DeviceError {
	match err.errno() {
		libc::EINTR => DeviceError::Interrupted,
		libc::EPIPE => DeviceError::Underrun,
		libc::ESTRPIPE => DeviceError::Suspended,
		_ => DeviceError::Fatal(err.to_string()),
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_recoverable() {
		assert!(DeviceError::Interrupted.recoverable(), "EINTR is recoverable.");
		assert!(DeviceError::Underrun.recoverable(), "EPIPE is recoverable.");
		assert!(DeviceError::Suspended.recoverable(), "ESTRPIPE is recoverable.");
		assert!(
			! DeviceError::Fatal("No such file or directory".to_owned()).recoverable(),
			"Everything else is not.",
		);
	}
}
