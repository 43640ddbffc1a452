//! Pure encoding/decoding between symbolic NMT names and wire bytes.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::error::UnknownNmtCommand;

/// The NMT lifecycle state of a CANopen device, as carried in byte 0 of a
/// heartbeat frame.
#[repr(u8)]
#[derive(IntoPrimitive, TryFromPrimitive)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NmtState {
	/// The node has just booted and will move to `PreOperational` on its own.
	Initialising = 0x00,

	/// The node is stopped: it answers NMT and heartbeats only.
	Stopped = 0x04,

	/// The node is fully operational.
	Operational = 0x05,

	/// The node is in the low-power sleep state.
	Sleep = 0x50,

	/// The node is in the low-power standby state.
	Standby = 0x60,

	/// The node has finished booting and is waiting for a start command.
	PreOperational = 0x7F,
}

impl NmtState {
	/// The symbolic name used in the NMT command/state tables.
	pub fn name(self) -> &'static str {
		match self {
			Self::Initialising => "INITIALISING",
			Self::Stopped => "STOPPED",
			Self::Operational => "OPERATIONAL",
			Self::Sleep => "SLEEP",
			Self::Standby => "STANDBY",
			Self::PreOperational => "PRE-OPERATIONAL",
		}
	}
}

impl std::fmt::Display for NmtState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// Resolve a raw state byte (as received in a heartbeat) to its symbolic
/// name, if it is one of the six defined lifecycle states.
pub fn state_byte_to_name(byte: u8) -> Option<&'static str> {
	NmtState::try_from(byte).ok().map(NmtState::name)
}

/// Resolve a symbolic NMT command name to its wire command byte.
///
/// `"INITIALISING"` and `"RESET"` both resolve to the same byte: CiA-301
/// tooling uses both names for the application reset command, but there is
/// only one wire representation.
pub fn command_name_to_byte(name: &str) -> Result<u8, UnknownNmtCommand> {
	let byte = match name {
		"OPERATIONAL" => 1,
		"STOPPED" => 2,
		"SLEEP" => 80,
		"STANDBY" => 96,
		"PRE-OPERATIONAL" => 128,
		"INITIALISING" | "RESET" => 129,
		"RESET COMMUNICATION" => 130,
		_ => {
			return Err(UnknownNmtCommand { name: name.to_string() });
		}
	};
	Ok(byte)
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn known_commands_resolve() {
		assert!(command_name_to_byte("OPERATIONAL") == Ok(1));
		assert!(command_name_to_byte("STOPPED") == Ok(2));
		assert!(command_name_to_byte("SLEEP") == Ok(80));
		assert!(command_name_to_byte("STANDBY") == Ok(96));
		assert!(command_name_to_byte("PRE-OPERATIONAL") == Ok(128));
		assert!(command_name_to_byte("INITIALISING") == Ok(129));
		assert!(command_name_to_byte("RESET") == Ok(129));
		assert!(command_name_to_byte("RESET COMMUNICATION") == Ok(130));
	}

	#[test]
	fn unknown_command_is_rejected() {
		assert!(command_name_to_byte("FROBNICATE").is_err());
	}

	#[test]
	fn state_round_trip_over_defined_bytes() {
		for &(byte, name) in &[
			(0x00, "INITIALISING"),
			(0x04, "STOPPED"),
			(0x05, "OPERATIONAL"),
			(0x50, "SLEEP"),
			(0x60, "STANDBY"),
			(0x7F, "PRE-OPERATIONAL"),
		] {
			assert!(state_byte_to_name(byte) == Some(name));
		}
	}

	#[test]
	fn unrecognized_state_byte_yields_none() {
		assert!(state_byte_to_name(200).is_none());
	}
}
