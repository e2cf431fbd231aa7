/*!
# Spindle: Wire Surface

Two sockets face the world: a broadcast channel carrying state, rip
state, and disc announcements to whoever is listening, and a
request/reply channel accepting commands. Both speak newline-delimited
JSON arrays — one message per line, the first element naming the topic or
command, arguments and payloads as further elements:

```text
["state", {"state":"PLAY","track":3,…}]
["rip_state", {"state":"AUDIO","progress":41,…}]
["disc", {…}]            (or ["disc", null])
["play_track", "3"]      (request)
["state", {…}]           (reply)
["error", "Unknown command: jump."]
```

The player itself only ever sees the [`StatePublisher`] trait and
[`CommandHandle`], so the test harness can drive everything in-process
and never open a socket.
*/

use crate::{
	Command,
	CommandHandle,
	DiscInfo,
	PlayerState,
	Reply,
	RipState,
	SpindleError,
};
use serde_json::json;
use std::{
	io::{
		BufRead,
		BufReader,
		Write,
	},
	net::{
		SocketAddr,
		TcpListener,
		TcpStream,
	},
	sync::{
		Arc,
		Mutex,
	},
};



/// # A State Publisher.
///
/// Whoever holds the player's outbound megaphone. Publication must never
/// block playback; implementations drop slow or dead subscribers rather
/// than wait on them.
pub trait StatePublisher: Send {
	/// # Publish a Player State.
	fn publish_state(&mut self, state: &PlayerState);

	/// # Publish a Rip State.
	fn publish_rip_state(&mut self, rip: &RipState);

	/// # Publish a Disc (Un)Load.
	fn publish_disc(&mut self, disc: Option<&DiscInfo>);
}



#[derive(Debug)]
/// # TCP Broadcast Publisher.
///
/// Fans every event out to all connected subscribers. There is no
/// subscription handshake; connecting is subscribing.
pub struct TcpPublisher {
	/// # Connected Subscribers.
	subs: Arc<Mutex<Vec<TcpStream>>>,

	/// # Bound Address.
	addr: SocketAddr,
}

impl TcpPublisher {
	/// # Bind.
	///
	/// ## Errors
	///
	/// This will return an error if the address can't be bound.
	pub fn bind(addr: &str) -> Result<Self, SpindleError> {
		let listener = TcpListener::bind(addr)
			.map_err(|_| SpindleError::Write(addr.to_owned()))?;
		let addr = listener.local_addr()
			.map_err(|_| SpindleError::Write(addr.to_owned()))?;

		let subs: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
		{
			let subs = Arc::clone(&subs);
			std::thread::Builder::new()
				.name("spindle-pub".to_owned())
				.spawn(move || for stream in listener.incoming().flatten() {
					subs.lock()
						.unwrap_or_else(std::sync::PoisonError::into_inner)
						.push(stream);
				})
				.map_err(|_| SpindleError::Bug("unable to spawn the publisher"))?;
		}

		Ok(Self { subs, addr })
	}

	#[must_use]
	/// # Bound Address.
	pub const fn local_addr(&self) -> SocketAddr { self.addr }

	/// # Broadcast One Line.
	///
	/// Dead subscribers are quietly dropped along the way.
	fn broadcast(&self, line: &str) {
		let mut subs = self.subs.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner);
		subs.retain_mut(|stream|
			stream.write_all(line.as_bytes()).is_ok() &&
			stream.write_all(b"\n").is_ok()
		);
	}
}

impl StatePublisher for TcpPublisher {
	fn publish_state(&mut self, state: &PlayerState) {
		self.broadcast(&json!(["state", state]).to_string());
	}

	fn publish_rip_state(&mut self, rip: &RipState) {
		self.broadcast(&json!(["rip_state", rip]).to_string());
	}

	fn publish_disc(&mut self, disc: Option<&DiscInfo>) {
		self.broadcast(&json!(["disc", disc]).to_string());
	}
}



#[derive(Debug)]
/// # TCP Command Server.
///
/// One request line in, one reply line out, in order, per connection.
/// Connections are independent; there's no cross-connection ordering.
pub struct TcpCommandServer {
	/// # Bound Address.
	addr: SocketAddr,
}

impl TcpCommandServer {
	/// # Bind.
	///
	/// ## Errors
	///
	/// This will return an error if the address can't be bound.
	pub fn bind(addr: &str, handle: CommandHandle) -> Result<Self, SpindleError> {
		let listener = TcpListener::bind(addr)
			.map_err(|_| SpindleError::Write(addr.to_owned()))?;
		let addr = listener.local_addr()
			.map_err(|_| SpindleError::Write(addr.to_owned()))?;

		std::thread::Builder::new()
			.name("spindle-cmd".to_owned())
			.spawn(move || for stream in listener.incoming().flatten() {
				let handle = handle.clone();
				let _res = std::thread::Builder::new()
					.name("spindle-cmd-conn".to_owned())
					.spawn(move || serve(&stream, &handle));
			})
			.map_err(|_| SpindleError::Bug("unable to spawn the command server"))?;

		Ok(Self { addr })
	}

	#[must_use]
	/// # Bound Address.
	pub const fn local_addr(&self) -> SocketAddr { self.addr }
}

/// # Serve One Connection.
fn serve(stream: &TcpStream, handle: &CommandHandle) {
	let Ok(read) = stream.try_clone() else { return; };
	let mut write = stream;
	for line in BufReader::new(read).lines() {
		let Ok(line) = line else { break; };
		if line.trim().is_empty() { continue; }

		let reply = match decode_request(&line) {
			Ok(cmd) => handle.request(cmd),
			Err(e) => Reply::Error(e.to_string()),
		};

		let out = encode_reply(&reply);
		if write.write_all(out.as_bytes()).is_err() { break; }
		if write.write_all(b"\n").is_err() { break; }
	}
}

/// # Decode a Request Line.
///
/// ## Errors
///
/// This will return an error if the line isn't a JSON array of strings,
/// or names a command nobody's heard of.
fn decode_request(line: &str) -> Result<Command, SpindleError> {
	let frames: Vec<String> = serde_json::from_str(line)
		.map_err(|_| SpindleError::UnknownCommand(line.trim().to_owned()))?;
	Command::parse(&frames)
}

/// # Encode a Reply Line.
fn encode_reply(reply: &Reply) -> String {
	match reply {
		Reply::State(state) => json!(["state", state]).to_string(),
		Reply::RipState(rip) => json!(["rip_state", rip]).to_string(),
		Reply::Disc(disc) => json!(["disc", disc]).to_string(),
		Reply::Ok => json!(["ok"]).to_string(),
		Reply::Error(msg) => json!(["error", msg]).to_string(),
	}
}
