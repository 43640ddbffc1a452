//! Errors raised by the NMT master.

/// Errors that the NMT master can report to its caller.
///
/// The listener task itself never surfaces errors: a malformed or
/// unrecognized heartbeat byte is tolerated silently (see
/// [`crate::nmt::master`]).
#[derive(Debug, thiserror::Error)]
pub enum NmtError {
	/// No sender/multiplexer was configured for this master.
	#[error("no network configured for this NMT master")]
	NoNetwork,

	/// `stop_listening` was called while no listener was active.
	#[error("not currently listening for heartbeats")]
	NotListening,

	/// `set_state` was given a command name outside the closed enumeration.
	#[error(transparent)]
	UnknownNmtCommand(#[from] UnknownNmtCommand),

	/// `unsubscribe_changes` was given an id that does not (or no longer) exists.
	#[error("no subscription exists with this id")]
	NoSuchSubscription,

	/// `wait_for_bootup` reached its deadline before observing the operational state.
	#[error("timed out waiting for the node to report the operational state")]
	Timeout,

	/// Transmitting the command frame failed at the transport level.
	#[error("failed to send CAN frame: {0}")]
	SendFailed(std::io::Error),
}

/// The given name is not one of the closed set of NMT command names.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown NMT command name: {name:?}")]
pub struct UnknownNmtCommand {
	/// The name that was looked up.
	pub name: String,
}
