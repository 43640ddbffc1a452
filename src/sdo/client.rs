//! The SDO client: turns a request/expected-response pair into a single
//! confirmed exchange with a remote node, with timeout and retry.
//!
//! [`SdoWriter`](super::writer::SdoWriter) is generic over [`SdoClient`] so
//! that its state machine can be tested against a mock client; production
//! code uses [`DefaultSdoClient`], which talks to a real node through a
//! [`FrameSender`]/[`FrameMultiplexer`] pair.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::error::SdoError;
use crate::frame::{CanFrame, StandardId};
use crate::transport::{FrameMultiplexer, FrameSender, SubscriptionId};

/// Base arbitration id for the "receive SDO" (client-to-server) function,
/// combined with the node id to get `0x600 + node_id`.
pub const SDO_REQUEST_FUNCTION: u16 = 0x600;

/// Base arbitration id for the "transmit SDO" (server-to-client) function,
/// combined with the node id to get `0x580 + node_id`.
pub const SDO_RESPONSE_FUNCTION: u16 = 0x580;

/// Default time to wait for a matching response before giving up an attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of retries after the first attempt (so two sends total).
pub const DEFAULT_RETRIES: u32 = 1;

/// Sends one SDO request and waits for the first response that matches a
/// caller-supplied predicate.
///
/// Implementations own the transport details (timeout, retry, which frames
/// to discard) and report failure as [`SdoError`]; [`SdoWriter`] never
/// inspects a frame itself except through the predicate it hands to
/// [`send`](Self::send).
#[allow(async_fn_in_trait)]
pub trait SdoClient {
	/// Transmit `frame`, then wait for an inbound frame matching `expect`,
	/// discarding any that don't, up to this client's timeout and retry
	/// budget.
	async fn send(&mut self, frame: [u8; 8], expect: Box<dyn Fn(&[u8; 8]) -> bool + Send>) -> Result<[u8; 8], SdoError>;
}

/// The reference [`SdoClient`]: talks to a single node over a
/// [`FrameSender`]/[`FrameMultiplexer`] pair, filtering on that node's SDO
/// response id for its whole lifetime.
pub struct DefaultSdoClient<S: FrameSender, M: FrameMultiplexer> {
	node_id: u8,
	sender: Arc<S>,
	multiplexer: Arc<M>,
	subscription: SubscriptionId,
	responses: mpsc::Receiver<CanFrame>,
	timeout: Duration,
	retries: u32,
}

impl<S: FrameSender, M: FrameMultiplexer> DefaultSdoClient<S, M> {
	/// Create a client for `node_id` using this crate's default timeout and
	/// retry budget.
	pub fn new(node_id: u8, sender: Arc<S>, multiplexer: Arc<M>) -> Self {
		Self::with_timeout(node_id, sender, multiplexer, DEFAULT_TIMEOUT, DEFAULT_RETRIES)
	}

	/// Create a client for `node_id` with an explicit timeout and retry
	/// budget (number of retries *after* the first attempt).
	pub fn with_timeout(node_id: u8, sender: Arc<S>, multiplexer: Arc<M>, timeout: Duration, retries: u32) -> Self {
		let response_id = StandardId::new_unchecked(SDO_RESPONSE_FUNCTION | u16::from(node_id));
		let (subscription, responses) = multiplexer.acquire(Box::new(move |frame: &CanFrame| frame.id() == response_id));
		Self { node_id, sender, multiplexer, subscription, responses, timeout, retries }
	}
}

impl<S: FrameSender, M: FrameMultiplexer> Drop for DefaultSdoClient<S, M> {
	fn drop(&mut self) {
		self.multiplexer.release(self.subscription);
	}
}

impl<S: FrameSender, M: FrameMultiplexer> std::fmt::Debug for DefaultSdoClient<S, M> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DefaultSdoClient")
			.field("node_id", &self.node_id)
			.field("timeout", &self.timeout)
			.field("retries", &self.retries)
			.finish()
	}
}

impl<S: FrameSender, M: FrameMultiplexer> SdoClient for DefaultSdoClient<S, M> {
	async fn send(&mut self, frame: [u8; 8], expect: Box<dyn Fn(&[u8; 8]) -> bool + Send>) -> Result<[u8; 8], SdoError> {
		let request_id = StandardId::new_unchecked(SDO_REQUEST_FUNCTION | u16::from(self.node_id));
		let attempts = self.retries + 1;

		for attempt in 0..attempts {
			self.sender.send(request_id, frame).map_err(SdoError::SendFailed)?;
			log::debug!("sent SDO request to node {:#04x}: {frame:02X?}", self.node_id);

			let deadline = tokio::time::Instant::now() + self.timeout;
			loop {
				let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
				if remaining.is_zero() {
					break;
				}
				match tokio::time::timeout(remaining, self.responses.recv()).await {
					Ok(Some(response)) if expect(response.data()) => {
						log::debug!("received matching SDO response from node {:#04x}: {:02X?}", self.node_id, response.data());
						return Ok(*response.data());
					}
					Ok(Some(response)) => {
						log::debug!("discarding unmatched SDO response from node {:#04x}: {:02X?}", self.node_id, response.data());
					}
					Ok(None) => return Err(SdoError::Timeout),
					Err(_elapsed) => break,
				}
			}

			log::debug!("SDO request to node {:#04x} timed out (attempt {}/{attempts})", self.node_id, attempt + 1);
		}

		Err(SdoError::Timeout)
	}
}
