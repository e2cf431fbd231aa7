/*!
# Spindle: Library
*/

#![deny(
	clippy::allow_attributes_without_reason,
	clippy::correctness,
	unreachable_pub,
	unsafe_code,
)]

#![warn(
	clippy::complexity,
	clippy::nursery,
	clippy::pedantic,
	clippy::perf,
	clippy::style,

	clippy::allow_attributes,
	clippy::clone_on_ref_ptr,
	clippy::create_dir,
	clippy::filetype_is_file,
	clippy::format_push_string,
	clippy::get_unwrap,
	clippy::impl_trait_in_params,
	clippy::lossy_float_literal,
	clippy::missing_assert_message,
	clippy::missing_docs_in_private_items,
	clippy::needless_raw_strings,
	clippy::panic_in_result_fn,
	clippy::pub_without_shorthand,
	clippy::rest_pat_in_fully_bound_structs,
	clippy::semicolon_inside_block,
	clippy::str_to_string,
	clippy::string_to_string,
	clippy::todo,
	clippy::undocumented_unsafe_blocks,
	clippy::unneeded_field_pattern,
	clippy::unseparated_literal_suffix,
	clippy::unwrap_in_result,

	macro_use_extern_crate,
	missing_copy_implementations,
	missing_docs,
	non_ascii_idents,
	trivial_casts,
	trivial_numeric_casts,
	unused_crate_dependencies,
	unused_extern_crates,
	unused_import_braces,
)]

#![expect(clippy::redundant_pub_crate, reason = "Unresolvable.")]

mod abort;
mod archive;
mod config;
mod disc;
mod drive;
mod error;
mod log;
mod packet;
mod pcm;
mod player;
mod remote;
mod ring;
mod rip;
mod sink;
mod source;
mod state;
mod toc;
mod transport;

pub use abort::KillSwitch;
pub use archive::Archive;
pub use config::Config;
pub use disc::{
	DiscId,
	DiscInfo,
	TrackInfo,
};
pub use drive::Drive;
pub use error::SpindleError;
pub use log::{
	LogLevel,
	LogQueue,
	LogRecord,
};
pub use packet::Packet;
pub use pcm::{
	AlsaOpen,
	DeviceError,
	Negotiated,
	PcmDevice,
	PcmOpen,
};
pub use player::{
	Command,
	CommandHandle,
	Player,
	Reply,
};
pub use remote::{
	StatePublisher,
	TcpCommandServer,
	TcpPublisher,
};
pub(crate) use ring::{
	Append,
	RingBuffer,
	Take,
};
pub use rip::{
	RipUpdate,
	RipWatch,
	Ripper,
};
pub use sink::{
	AddPacket,
	PcmSink,
};
pub use source::PacketStream;
pub use state::{
	PlayerPhase,
	PlayerState,
	RipPhase,
	RipState,
};
pub use toc::{
	FullToc,
	FullTocTrack,
	reconcile,
};
pub use transport::Transport;



// Audio Format
// ---------------

/// # Channels.
pub const CHANNELS: u16 = 2;

/// # Sample Rate.
pub const SAMPLE_RATE: u32 = 44_100;

/// # Bytes Per Sample.
///
/// A sample in CD contexts is one interleaved L+R pair of signed 16-bit
/// values, i.e. what audio APIs usually call a frame.
pub const BYTES_PER_SAMPLE: u16 = 4;

/// # Samples per sector.
pub const SAMPLES_PER_SECTOR: u16 = 588;

/// # Bytes Per Sector.
///
/// This is the number of bytes per sector of _audio_ data.
pub const BYTES_PER_SECTOR: u16 = SAMPLES_PER_SECTOR * BYTES_PER_SAMPLE;

/// # Bytes Per Second.
pub const BYTES_PER_SECOND: u32 = SAMPLE_RATE * BYTES_PER_SAMPLE as u32;

/// # Number of lead-in sectors.
///
/// All discs have a 2-second region at the start before any data. Different
/// contexts include or exclude this amount, so it's good to keep it handy.
pub const CD_LEADIN: u16 = 150;



// Playback
// ---------------

/// # Samples Per Packet.
///
/// Packets are the granularity of position reporting and seeking; 4410
/// samples is a tenth of a second, roughly matching the device period.
pub const PACKET_SAMPLES: u32 = SAMPLE_RATE / 10;

/// # Bytes Per Packet.
pub const PACKET_BYTES: u32 = PACKET_SAMPLES * BYTES_PER_SAMPLE as u32;

/// # Ring Buffer Span (Seconds).
pub(crate) const RING_SECONDS: u32 = 5;

/// # Ring Buffer Period Cap (Per Second).
///
/// The device chooses the period size; anything chattier than this is
/// refused.
pub(crate) const MAX_PERIODS_PER_SECOND: u32 = 40;



// Archive
// ---------------

/// # Archive: PCM File Name.
///
/// Headerless raw 16-bit stereo big-endian audio for the whole disc.
pub const FILE_PCM: &str = "disc.pcm";

/// # Archive: Basic TOC File Name.
///
/// A single CDTOC-format line, written at insertion time.
pub const FILE_BASIC_TOC: &str = "basic.toc";

/// # Archive: Full TOC File Name.
///
/// The cdrdao-format text produced by the subchannel reader, if that phase
/// ever completed.
pub const FILE_FULL_TOC: &str = "full.toc";

/// # Archive: Disc Info File Name.
pub const FILE_INFO: &str = "disc.json";
