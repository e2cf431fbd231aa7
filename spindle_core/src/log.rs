/*!
# Spindle: Worker Telemetry

The realtime sink worker can't be printing to terminals or calling back
into arbitrary supervisor code, so it drops timestamped records into a
bounded queue instead. Somebody else — the player loop, ultimately the
daemon binary — drains and prints them at its leisure. A full queue drops
records rather than blocking the worker.
*/

use fyi_msg::Msg;
use std::{
	fmt,
	sync::mpsc::{
		Receiver,
		SyncSender,
		TryRecvError,
		TrySendError,
	},
};
use utc2k::FmtUtc2k;



/// # Queue Depth.
const LOG_DEPTH: usize = 64;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Severity.
pub enum LogLevel {
	/// # Informational.
	Info,

	/// # Something's Off.
	Warning,

	/// # Something's Broken.
	Error,
}

#[derive(Debug, Clone)]
/// # One Log Record.
pub struct LogRecord {
	/// # When.
	pub time: FmtUtc2k,

	/// # Severity.
	pub level: LogLevel,

	/// # What Happened.
	pub text: String,
}

impl fmt::Display for LogRecord {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}] {}", self.time, self.text)
	}
}

impl LogRecord {
	#[must_use]
	/// # New.
	pub fn new(level: LogLevel, text: String) -> Self {
		Self { time: FmtUtc2k::now(), level, text }
	}

	/// # Print (Operator-Facing).
	pub fn print(&self) {
		match self.level {
			LogLevel::Info => Msg::info(self.to_string()),
			LogLevel::Warning => Msg::warning(self.to_string()),
			LogLevel::Error => Msg::error(self.to_string()),
		}.eprint();
	}
}



#[derive(Debug)]
/// # Bounded Log Queue.
///
/// The sending half is cheap to clone and never blocks.
pub struct LogQueue {
	/// # Inbox.
	rx: Receiver<LogRecord>,

	/// # Outbox Prototype.
	tx: SyncSender<LogRecord>,
}

impl Default for LogQueue {
	fn default() -> Self {
		let (tx, rx) = std::sync::mpsc::sync_channel(LOG_DEPTH);
		Self { rx, tx }
	}
}

impl LogQueue {
	#[must_use]
	/// # A Sender.
	pub(crate) fn sender(&self) -> LogSender { LogSender(self.tx.clone()) }

	/// # Drain Whatever's Queued.
	pub fn drain(&self) -> Vec<LogRecord> {
		let mut out = Vec::new();
		loop {
			match self.rx.try_recv() {
				Ok(record) => { out.push(record); },
				Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
			}
		}
		out
	}
}

#[derive(Debug, Clone)]
/// # Log Sender.
pub(crate) struct LogSender(SyncSender<LogRecord>);

impl LogSender {
	/// # Push a Record (Best Effort).
	///
	/// Dropped on the floor if the queue is full; the worker has better
	/// things to do than wait on a logger.
	pub(crate) fn push(&self, level: LogLevel, text: String) {
		match self.0.try_send(LogRecord::new(level, text)) {
			Ok(()) |
			Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {},
		}
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_queue() {
		let queue = LogQueue::default();
		let tx = queue.sender();
		tx.push(LogLevel::Info, "one".to_owned());
		tx.push(LogLevel::Error, "two".to_owned());

		let got = queue.drain();
		assert_eq!(got.len(), 2, "Expected both records back.");
		assert_eq!(got[0].text, "one", "Records should come back in order.");
		assert_eq!(got[1].level, LogLevel::Error, "Severity should stick.");
		assert!(queue.drain().is_empty(), "The queue should now be empty.");
	}

	#[test]
	fn t_queue_overflow() {
		let queue = LogQueue::default();
		let tx = queue.sender();
		for i in 0..(LOG_DEPTH * 2) {
			tx.push(LogLevel::Info, i.to_string());
		}

		// The excess should have been dropped, not blocked on.
		assert_eq!(queue.drain().len(), LOG_DEPTH, "Overflow should drop records.");
	}
}
