/*!
# Spindle: Kill Switch
*/

use std::sync::{
	Arc,
	atomic::{
		AtomicBool,
		Ordering::{
			Acquire,
			Release,
		},
	},
};



#[derive(Debug, Clone)]
/// # Kill Switch.
///
/// This is a short-circuit shared by the daemon's long-running workers: the
/// player loop, the sink's device-open backoff, and the rip supervisor all
/// check it between blocking operations.
///
/// The main program's CTRL-C intercept sets the value, allowing Spindle to
/// tidy up — stop the sink, kill the rip children — before dying.
pub struct KillSwitch(Arc<AtomicBool>);

impl Default for KillSwitch {
	fn default() -> Self { Self(Arc::from(AtomicBool::new(false))) }
}

impl KillSwitch {
	#[must_use]
	/// # Dead?
	pub fn killed(&self) -> bool { self.0.load(Acquire) }

	/// # Pull the Plug.
	pub fn kill(&self) { self.0.store(true, Release); }

	#[must_use]
	/// # Inner Clone.
	pub fn inner(&self) -> Arc<AtomicBool> { Arc::clone(&self.0) }
}
