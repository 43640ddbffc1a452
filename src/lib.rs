//! CANopen master-side protocol core: NMT lifecycle supervision and SDO
//! download (write).
//!
//! This crate implements the master end of two CiA-301 services:
//!
//! - [`nmt`]: tracks a remote node's NMT state from its heartbeat frames and
//!   issues lifecycle commands to it.
//! - [`sdo`]: performs expedited and segmented SDO downloads (object
//!   dictionary writes).
//!
//! Neither module talks to a physical CAN adapter. Both are built against
//! the [`transport`] traits, which a host application implements against
//! its own driver and frame multiplexer; [`transport::InProcessBus`] is a
//! small reference transport used by this crate's own tests.
//!
//! SDO upload (read), PDO mapping, EDS parsing, object-dictionary browsing,
//! block transfer, and any transport other than classic CAN are out of
//! scope for this crate.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod frame;
pub mod nmt;
pub mod sdo;
pub mod transport;
