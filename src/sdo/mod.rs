//! Service Data Object (SDO) download: expedited and segmented writes to a
//! remote node's object dictionary.

mod client;
mod codec;
mod error;
mod writer;

pub use client::{DefaultSdoClient, SdoClient, DEFAULT_RETRIES, DEFAULT_TIMEOUT, SDO_REQUEST_FUNCTION, SDO_RESPONSE_FUNCTION};
pub use error::SdoError;
pub use writer::{write, SdoWriter};
