//! Transport-facing contracts consumed by the protocol core.
//!
//! Everything in this module describes what the NMT master and SDO writer
//! need from the world outside: a way to transmit a frame ([`FrameSender`])
//! and a way to subscribe to a filtered, ordered stream of inbound frames
//! ([`FrameMultiplexer`]). The physical CAN adapter and the process that
//! demultiplexes its frames to subscribers both live outside this crate;
//! [`InProcessBus`] is a small reference transport used by this crate's own
//! tests and suitable for wiring two in-process peers together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::frame::{CanFrame, StandardId};

/// Default channel capacity used by [`InProcessBus`] subscriptions.
const SUBSCRIPTION_CAPACITY: usize = 64;

/// The identifier returned by [`FrameMultiplexer::acquire`], used later to
/// release the subscription.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

/// Transmits CAN frames to the bus.
///
/// NMT commands are sent with arbitration id 0 (the NMT command object, see
/// [`crate::nmt`]); SDO requests use `0x600 + node_id` (see
/// [`crate::sdo`]).
pub trait FrameSender: Send + Sync {
	/// Transmit a single frame with the given arbitration id and payload.
	fn send(&self, id: StandardId, data: [u8; 8]) -> std::io::Result<()>;
}

/// Hands out filtered, ordered subscriptions to inbound CAN frames.
///
/// Implementations must deliver frames to a subscription in arrival order
/// and must not deliver any frame after [`release`](Self::release) has
/// returned for that subscription's id.
pub trait FrameMultiplexer: Send + Sync {
	/// Acquire a subscription for frames matching `filter`.
	///
	/// The predicate is evaluated once per inbound frame, on the delivery
	/// side; it must not block.
	fn acquire(
		&self,
		filter: Box<dyn Fn(&CanFrame) -> bool + Send + Sync>,
	) -> (SubscriptionId, mpsc::Receiver<CanFrame>);

	/// Release a previously acquired subscription.
	fn release(&self, id: SubscriptionId);
}

struct Subscriber {
	filter: Box<dyn Fn(&CanFrame) -> bool + Send + Sync>,
	sender: mpsc::Sender<CanFrame>,
}

/// A small in-process CAN bus: frames sent through [`FrameSender::send`] are
/// fanned out to every subscription whose filter predicate matches.
///
/// This is not a physical transport. It exists so the NMT master and SDO
/// writer in this crate can be exercised end to end (including by their own
/// test suites) without a real CAN adapter; a production integration
/// implements [`FrameSender`] and [`FrameMultiplexer`] against the actual
/// network multiplexer instead.
#[derive(Default)]
pub struct InProcessBus {
	subscribers: Mutex<HashMap<u64, Subscriber>>,
	next_id: AtomicU64,
}

impl InProcessBus {
	/// Create an empty bus with no subscribers.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inject a frame onto the bus as though it had just arrived from the
	/// physical network, fanning it out to every matching subscription.
	///
	/// Delivery is best-effort: a subscription whose channel is full has
	/// this frame dropped for it rather than blocking the other
	/// subscribers (or the caller).
	pub fn deliver(&self, frame: CanFrame) {
		let subscribers = self.subscribers.lock().unwrap();
		for (id, subscriber) in subscribers.iter() {
			if (subscriber.filter)(&frame) {
				if subscriber.sender.try_send(frame).is_err() {
					log::warn!("dropping frame for subscription {id}: queue full or closed");
				}
			}
		}
	}
}

impl std::fmt::Debug for InProcessBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let count = self.subscribers.lock().unwrap().len();
		f.debug_struct("InProcessBus").field("subscribers", &count).finish()
	}
}

impl std::fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FrameSender for InProcessBus {
	fn send(&self, id: StandardId, data: [u8; 8]) -> std::io::Result<()> {
		self.deliver(CanFrame::new(id, data));
		Ok(())
	}
}

impl FrameMultiplexer for InProcessBus {
	fn acquire(
		&self,
		filter: Box<dyn Fn(&CanFrame) -> bool + Send + Sync>,
	) -> (SubscriptionId, mpsc::Receiver<CanFrame>) {
		let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CAPACITY);
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.subscribers.lock().unwrap().insert(id, Subscriber { filter, sender });
		(SubscriptionId(id), receiver)
	}

	fn release(&self, id: SubscriptionId) {
		self.subscribers.lock().unwrap().remove(&id.0);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[tokio::test]
	async fn delivers_only_matching_frames() {
		let bus = InProcessBus::new();
		let id_a = StandardId::new(0x700).unwrap();
		let id_b = StandardId::new(0x701).unwrap();

		let (_sub, mut rx) = bus.acquire(Box::new(move |frame| frame.id() == id_a));
		bus.deliver(CanFrame::new(id_b, [0; 8]));
		bus.deliver(CanFrame::new(id_a, [1; 8]));

		let received = rx.recv().await.unwrap();
		assert!(received.id() == id_a);
		assert!(received.data()[0] == 1);
	}

	#[tokio::test]
	async fn no_frames_after_release() {
		let bus = InProcessBus::new();
		let id = StandardId::new(0x700).unwrap();
		let (sub, mut rx) = bus.acquire(Box::new(move |frame| frame.id() == id));
		bus.release(sub);
		bus.deliver(CanFrame::new(id, [0; 8]));
		assert!(rx.recv().await.is_none());
	}
}
