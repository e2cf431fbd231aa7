/*!
# Spindle: Optical Drive

Basic TOC, disc-present probes, and eject, straight over the kernel's
CDROM ioctl interface. The heavy reading — audio samples, subchannel — is
left to the external rip programs; the daemon itself only ever needs
enough of the TOC to identify the disc.

The device is always opened `O_NONBLOCK`: without it the kernel tries to
read the disc during `open()`, which blocks or fails while the tray is
out, the motor is spinning up, or the drive is simply empty.
*/

use cdtoc::Toc;
use crate::{
	CD_LEADIN,
	SpindleError,
};
use std::{
	fs::{
		File,
		OpenOptions,
	},
	os::unix::{
		fs::OpenOptionsExt,
		io::AsRawFd,
	},
	path::Path,
};



/// # Read TOC Header.
const CDROMREADTOCHDR: libc::c_ulong = 0x5305;

/// # Read a Single TOC Entry.
const CDROMREADTOCENTRY: libc::c_ulong = 0x5306;

/// # Eject the Tray.
const CDROMEJECT: libc::c_ulong = 0x5309;

/// # Lock/Unlock the Door.
const CDROM_LOCKDOOR: libc::c_ulong = 0x5329;

/// # Drive Status Query.
const CDROM_DRIVE_STATUS: libc::c_ulong = 0x5326;

/// # Address Format: Logical Block.
const CDROM_LBA: u8 = 0x01;

/// # The Lead-Out Pseudo-Track.
const CDROM_LEADOUT: u8 = 0xAA;

/// # Status: Disc Present, Tray Closed.
const CDS_DISC_OK: libc::c_int = 4;



#[repr(C)]
#[derive(Debug, Default)]
/// # TOC Header (First/Last Track Numbers).
struct CdromTocHdr {
	/// # First Track.
	cdth_trk0: u8,

	/// # Last Track.
	cdth_trk1: u8,
}

#[repr(C)]
#[derive(Debug, Default)]
/// # One TOC Entry.
///
/// The kernel packs `adr` and `ctrl` as nibbles into a single byte; the
/// union'd address is an `i32` LBA in the format we ask for.
struct CdromTocEntry {
	/// # Track Number (Input).
	cdte_track: u8,

	/// # Packed ADR (Low) / CTRL (High).
	cdte_adr_ctrl: u8,

	/// # Address Format (Input).
	cdte_format: u8,

	/// # Start Address (Output, LBA).
	cdte_addr_lba: i32,

	/// # Data Mode (Unused For Audio).
	cdte_datamode: u8,
}



#[derive(Debug, Clone)]
/// # Optical Drive.
///
/// A device path, mostly; the file handle is opened fresh per operation so
/// the drive is never held hostage between commands.
pub struct Drive {
	/// # Device Path.
	dev: String,
}

impl Drive {
	/// # New.
	///
	/// ## Errors
	///
	/// This will return an error if the path obviously isn't a device.
	pub fn new(dev: &str) -> Result<Self, SpindleError> {
		if Path::new(dev).exists() { Ok(Self { dev: dev.to_owned() }) }
		else { Err(SpindleError::Device(dev.to_owned())) }
	}

	#[allow(unsafe_code, reason = "ioctls are unsafe by nature.")]
	#[must_use]
	/// # Disc Present?
	pub fn disc_present(&self) -> bool {
		let Ok(file) = self.open() else { return false; };
		// SAFETY: a status query with no out-parameter.
		let status = unsafe {
			libc::ioctl(file.as_raw_fd(), CDROM_DRIVE_STATUS, 0 as libc::c_int)
		};
		status == CDS_DISC_OK
	}

	#[allow(unsafe_code, reason = "ioctls are unsafe by nature.")]
	/// # Read the Basic TOC.
	///
	/// Header, per-track entries, lead-out, assembled into a [`Toc`]. Data
	/// tracks are tolerated at either end of the disc (CD-Extra and its
	/// weirder cousin) but anywhere else is a deal-breaker.
	///
	/// ## Errors
	///
	/// This will return an error if the drive is empty or the layout is
	/// unsupported.
	pub fn read_toc(&self) -> Result<Toc, SpindleError> {
		let file = self.open()?;
		let fd = file.as_raw_fd();

		let mut hdr = CdromTocHdr::default();
		// SAFETY: the kernel fills the repr(C) header.
		let res = unsafe {
			libc::ioctl(fd, CDROMREADTOCHDR, std::ptr::from_mut(&mut hdr))
		};
		if res < 0 { return Err(SpindleError::NoDisc); }

		let from = hdr.cdth_trk0;
		let to = hdr.cdth_trk1;
		if from == 0 { return Err(SpindleError::FirstTrackNum); }
		if to < from { return Err(SpindleError::NumTracks); }

		// Grab the position and type for each track.
		let mut audio = Vec::with_capacity(usize::from(to - from) + 1);
		let mut data = None;
		for idx in from..=to {
			let entry = read_toc_entry(fd, idx)?;
			let ctrl = (entry.cdte_adr_ctrl >> 4) & 0x0F;
			let lba = u32::try_from(entry.cdte_addr_lba)
				.map_err(|_| SpindleError::TrackNumber(idx))?
				+ u32::from(CD_LEADIN);

			// Bit two of CTRL set means data.
			if ctrl & 0x04 == 0 { audio.push(lba); }
			else {
				if data.is_some() || (idx != 1 && idx != to) {
					return Err(SpindleError::DiscMode);
				}
				data.replace(lba);
			}
		}
		if audio.is_empty() { return Err(SpindleError::DiscMode); }

		// Grab the leadout, then build the ToC.
		let leadout = read_toc_entry(fd, CDROM_LEADOUT)
			.map_err(|_| SpindleError::Leadout)?;
		let leadout = u32::try_from(leadout.cdte_addr_lba)
			.map_err(|_| SpindleError::Leadout)?
			+ u32::from(CD_LEADIN);

		Toc::from_parts(audio, data, leadout).map_err(SpindleError::from)
	}

	#[allow(unsafe_code, reason = "ioctls are unsafe by nature.")]
	/// # Eject.
	///
	/// The OS usually locks the door while a disc is mounted, so unlock
	/// first, then pop the tray.
	///
	/// ## Errors
	///
	/// This will return an error if the tray refuses to budge.
	pub fn eject(&self) -> Result<(), SpindleError> {
		let file = self.open()?;
		let fd = file.as_raw_fd();

		// Unlock failure is non-fatal; the eject itself will tell us if it
		// mattered.
		// SAFETY: argument-only ioctls.
		unsafe {
			let _res = libc::ioctl(fd, CDROM_LOCKDOOR, 0 as libc::c_int);
			if libc::ioctl(fd, CDROMEJECT) < 0 { return Err(SpindleError::Eject); }
		}
		Ok(())
	}

	/// # Open the Device.
	fn open(&self) -> Result<File, SpindleError> {
		OpenOptions::new()
			.read(true)
			.custom_flags(libc::O_NONBLOCK)
			.open(&self.dev)
			.map_err(|_| SpindleError::DriveOpen(self.dev.clone()))
	}
}



#[allow(unsafe_code, reason = "ioctls are unsafe by nature.")]
/// # Read a Single TOC Entry.
fn read_toc_entry(fd: libc::c_int, track: u8) -> Result<CdromTocEntry, SpindleError> {
	let mut entry = CdromTocEntry {
		cdte_track: track,
		cdte_adr_ctrl: 0,
		cdte_format: CDROM_LBA,
		cdte_addr_lba: 0,
		cdte_datamode: 0,
	};

	// SAFETY: the kernel fills the repr(C) entry.
	let res = unsafe {
		libc::ioctl(fd, CDROMREADTOCENTRY, std::ptr::from_mut(&mut entry))
	};
	if res < 0 { Err(SpindleError::TrackNumber(track)) }
	else { Ok(entry) }
}
