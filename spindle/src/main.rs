/*!
# Spindle
*/

#![forbid(unsafe_code)]

#![deny(
	clippy::allow_attributes_without_reason,
	clippy::correctness,
	unreachable_pub,
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



use argyle::{
	Argue,
	ArgyleError,
	FLAG_HELP,
	FLAG_VERSION,
};
use dactyl::traits::BytesToUnsigned;
use fyi_msg::Msg;
use spindle_core::{
	AlsaOpen,
	Archive,
	Config,
	Drive,
	KillSwitch,
	Player,
	SpindleError,
	TcpCommandServer,
	TcpPublisher,
};
use std::{
	path::PathBuf,
	time::Duration,
};
use utc2k::FmtUtc2k;



/// # Default State-Channel Address.
const DEFAULT_STATE_ADDR: &str = "127.0.0.1:7661";

/// # Default Command-Channel Address.
const DEFAULT_COMMAND_ADDR: &str = "127.0.0.1:7662";



/// # Main.
///
/// This lets us bubble up startup errors so they can be pretty-printed.
fn main() {
	match _main() {
		Ok(()) => {},
		Err(SpindleError::Argue(ArgyleError::WantsVersion)) => {
			println!(concat!("Spindle v", env!("CARGO_PKG_VERSION")));
		},
		Err(SpindleError::Argue(ArgyleError::WantsHelp)) => {
			helper();
		},
		Err(e) => {
			Msg::from(e).eprint();
			std::process::exit(1);
		},
	}
}

#[inline]
/// # Actual Main.
///
/// Parse the options, wire the pieces together, and sit in the player
/// loop until a `quit` command or CTRL+C.
fn _main() -> Result<(), SpindleError> {
	// Load CLI arguments, if any.
	let args = Argue::new(FLAG_HELP | FLAG_VERSION)?;

	// Check for unknown args.
	if let Some(boo) = args.check_keys(
		&[
			b"--no-drive",
			b"--start-without-device",
		],
		&[
			b"--archive",
			b"--audio-device",
			b"--command-addr",
			b"--drive",
			b"--rip-timeout",
			b"--speed",
			b"--state-addr",
			b"-a",
			b"-d",
		],
	) {
		return Err(SpindleError::CliArg(String::from_utf8_lossy(boo).into_owned()));
	}

	let config = parse_config(&args)?;

	// The pieces.
	let archive = Archive::new(config.archive())?;
	let drive =
		if args.switch(b"--no-drive") { None }
		else { Some(Drive::new(config.drive())?) };

	let state_addr = config.state_addr().unwrap_or(DEFAULT_STATE_ADDR).to_owned();
	let command_addr = config.command_addr().unwrap_or(DEFAULT_COMMAND_ADDR).to_owned();
	let publisher = TcpPublisher::bind(&state_addr)?;

	let opener = AlsaOpen::new(config.audio_device());
	let (player, handle) = Player::new(
		config,
		archive,
		Box::new(opener),
		drive,
		Box::new(publisher),
	)?;

	let _commands = TcpCommandServer::bind(&command_addr, handle)?;

	// CTRL+C should wind things down, not leave rip children running.
	let killed = KillSwitch::default();
	sigint(&killed);

	Msg::custom("Spindle", 199, &format!(
		"up at {}; state on {state_addr}, commands on {command_addr}.",
		FmtUtc2k::now(),
	)).eprint();

	player.run(&killed);

	if killed.killed() { Err(SpindleError::Killed) }
	else { Ok(()) }
}

/// # Parse Config From Args.
fn parse_config(args: &Argue) -> Result<Config, SpindleError> {
	let mut config = Config::default()
		.with_start_without_device(args.switch(b"--start-without-device"));

	if let Some(v) = args.option2_os(b"-d", b"--drive") {
		config = config.with_drive(&v.to_string_lossy());
	}

	if let Some(v) = args.option2_os(b"-a", b"--archive") {
		config = config.with_archive(PathBuf::from(v));
	}

	if let Some(v) = args.option(b"--audio-device") {
		config = config.with_audio_device(&String::from_utf8_lossy(v));
	}

	if let Some(v) = args.option(b"--speed") {
		let speed = u8::btou(v).ok_or(SpindleError::CliParse("--speed"))?;
		config = config.with_rip_speed(speed);
	}

	if let Some(v) = args.option(b"--rip-timeout") {
		let secs = u32::btou(v).ok_or(SpindleError::CliParse("--rip-timeout"))?;
		config = config.with_rip_timeout(Duration::from_secs(u64::from(secs)));
	}

	if let Some(v) = args.option(b"--state-addr") {
		config = config.with_state_addr(Some(String::from_utf8_lossy(v).into_owned()));
	}

	if let Some(v) = args.option(b"--command-addr") {
		config = config.with_command_addr(Some(String::from_utf8_lossy(v).into_owned()));
	}

	Ok(config)
}

/// # Hook Up CTRL+C.
fn sigint(killed: &KillSwitch) {
	let killed = killed.clone();
	let _res = ctrlc::set_handler(move || killed.kill());
}

#[cold]
/// # Print Help.
fn helper() {
	println!(concat!(
		r"
      ______
    /        \    ", "\x1b[38;5;199mSpindle\x1b[0;38;5;69m v", env!("CARGO_PKG_VERSION"), "\x1b[0m", r#"
   /    __    \   A CD-player appliance daemon:
  |    (  )    |  insert a disc, it rips and plays;
   \    ``    /   insert it again, it just plays.
    \ ______ /

USAGE:
    spindle [OPTIONS]

OPTIONS:
    -d, --drive <PATH>    The optical drive, like /dev/cdrom.
                          [default: /dev/cdrom]
    -a, --archive <PATH>  Where ripped discs live.
                          [default: /var/lib/spindle]
        --audio-device <NAME>
                          The ALSA playback device. [default: default]
        --speed <NUM>     Cap the rip speed; 0 means flat out.
                          [default: 0]
        --rip-timeout <SECS>
                          Kill a rip program that runs longer than this.
                          [default: 1800]
        --state-addr <ADDR>
                          Bind the broadcast (state) channel here.
                          [default: 127.0.0.1:7661]
        --command-addr <ADDR>
                          Bind the command channel here.
                          [default: 127.0.0.1:7662]
        --start-without-device
                          Come up even if the audio device is missing;
                          keep retrying and report the error through the
                          published state.
        --no-drive        Run without an optical drive: archived discs
                          only.

MISCELLANEOUS:
    -h, --help            Print help information to STDOUT and exit.
    -V, --version         Print version information to STDOUT and exit.

Clients subscribe to the state channel and get one JSON array per line:
state changes (including per-second position ticks), rip progress, and
disc announcements. Commands go to the command channel the same way:
    ["play_track", "3"]
"#
	));
}
