//! Network Management (NMT): node lifecycle tracking and command issuance.

mod codec;
mod error;
mod master;

pub use codec::{command_name_to_byte, state_byte_to_name, NmtState};
pub use error::{NmtError, UnknownNmtCommand};
pub use master::{ChangeSubscriptionId, NmtMaster, NmtStateChange};
