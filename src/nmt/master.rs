//! Per-node heartbeat listener, change-event fan-out, and command issuance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot};

use crate::frame::{CanFrame, StandardId};
use crate::transport::{FrameMultiplexer, FrameSender, SubscriptionId};

use super::codec;
use super::error::NmtError;

/// The arbitration id used for NMT commands (master to all nodes).
const NMT_COMMAND_FUNCTION: u16 = 0x000;

/// The function code part of a heartbeat's arbitration id (`0x700 + node_id`).
const HEARTBEAT_FUNCTION: u16 = 0x700;

/// Default timeout for [`NmtMaster::wait_for_bootup`].
const DEFAULT_BOOTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Polling cadence for [`NmtMaster::wait_for_bootup`].
const BOOTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of each change-event subscription queue.
///
/// Heartbeats typically arrive at 1-10 Hz per node; this comfortably
/// buffers a burst of state changes without ever blocking the listener.
const CHANGE_QUEUE_CAPACITY: usize = 16;

fn nmt_command_id() -> StandardId {
	StandardId::new_unchecked(NMT_COMMAND_FUNCTION)
}

fn heartbeat_id(node_id: u8) -> StandardId {
	StandardId::new_unchecked(HEARTBEAT_FUNCTION | u16::from(node_id))
}

/// An NMT lifecycle state-change event, published when a node's current
/// state differs from the state observed on the previous heartbeat.
#[derive(Debug, Copy, Clone)]
pub struct NmtStateChange {
	/// The node whose state changed.
	pub node_id: u8,

	/// The new current state byte (see [`codec::state_byte_to_name`] to resolve a name).
	pub state: u8,

	/// When the heartbeat that caused this change was processed.
	pub timestamp: SystemTime,
}

/// Identifies a change-event subscription created by [`NmtMaster::subscribe_changes`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ChangeSubscriptionId(u64);

struct Network {
	sender: Arc<dyn FrameSender>,
	multiplexer: Arc<dyn FrameMultiplexer>,
}

struct Inner {
	/// The current lifecycle state: always one of the six defined NMT state
	/// bytes, unless an unrecognized heartbeat byte was tolerated through.
	current: u8,

	/// The raw byte from the most recent heartbeat, distinct from `current`.
	received: Option<u8>,

	timestamp: Option<SystemTime>,
	subscribers: HashMap<u64, mpsc::Sender<NmtStateChange>>,
	next_subscription_id: u64,
}

impl Default for Inner {
	fn default() -> Self {
		Self {
			current: u8::from(codec::NmtState::Initialising),
			received: None,
			timestamp: None,
			subscribers: HashMap::new(),
			next_subscription_id: 0,
		}
	}
}

struct ListenerHandle {
	stop: oneshot::Sender<()>,
	task: tokio::task::JoinHandle<()>,
	subscription: SubscriptionId,
}

/// Tracks a single supervised node's lifecycle via its heartbeat frames and
/// issues NMT commands to it.
///
/// One master is created per supervised node (see [`NmtMaster::new`] and
/// [`NmtMaster::with_network`]). `send_command`, `set_state`, and the
/// subscription operations are legal whether or not a heartbeat listener is
/// currently running.
pub struct NmtMaster {
	node_id: u8,
	network: Option<Network>,
	inner: Arc<Mutex<Inner>>,
	listener: Mutex<Option<ListenerHandle>>,
}

impl std::fmt::Debug for NmtMaster {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NmtMaster")
			.field("node_id", &self.node_id)
			.field("has_network", &self.network.is_some())
			.field("listening", &self.listener.lock().unwrap().is_some())
			.finish()
	}
}

impl NmtMaster {
	/// Create a master for `node_id` with no network configured.
	///
	/// `send_command`, `listen_for_heartbeat` and the other network-facing
	/// operations fail with [`NmtError::NoNetwork`] until
	/// [`NmtMaster::with_network`] is used instead, or the master is
	/// reconstructed with a network.
	///
	/// # Panics
	/// Panics if `node_id` is not in `1..=127`.
	pub fn new(node_id: u8) -> Self {
		assert!((1..=127).contains(&node_id), "NMT node id must be in 1..=127, got {node_id}");
		Self {
			node_id,
			network: None,
			inner: Arc::new(Mutex::new(Inner::default())),
			listener: Mutex::new(None),
		}
	}

	/// Create a master for `node_id` backed by a sender and multiplexer.
	///
	/// # Panics
	/// Panics if `node_id` is not in `1..=127`.
	pub fn with_network(
		node_id: u8,
		sender: Arc<dyn FrameSender>,
		multiplexer: Arc<dyn FrameMultiplexer>,
	) -> Self {
		let mut master = Self::new(node_id);
		master.network = Some(Network { sender, multiplexer });
		master
	}

	/// The supervised node's id.
	pub fn node_id(&self) -> u8 {
		self.node_id
	}

	/// Whether a heartbeat listener is currently running.
	pub fn is_listening(&self) -> bool {
		self.listener.lock().unwrap().is_some()
	}

	/// Begin tracking heartbeats for this node.
	///
	/// Idempotent: calling this while already listening is a no-op.
	pub fn listen_for_heartbeat(&self) -> Result<(), NmtError> {
		let network = self.network.as_ref().ok_or(NmtError::NoNetwork)?;

		let mut listener = self.listener.lock().unwrap();
		if listener.is_some() {
			return Ok(());
		}

		let node_id = self.node_id;
		let expected = heartbeat_id(node_id);
		let (subscription, mut frames) = network.multiplexer.acquire(Box::new(move |frame: &CanFrame| frame.id() == expected));
		let (stop_tx, mut stop_rx) = oneshot::channel();
		let inner = self.inner.clone();

		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					biased;
					_ = &mut stop_rx => {
						break;
					}
					frame = frames.recv() => {
						match frame {
							Some(frame) => handle_heartbeat_frame(&inner, node_id, &frame),
							None => break,
						}
					}
				}
			}
		});

		*listener = Some(ListenerHandle { stop: stop_tx, task, subscription });
		log::debug!("node {node_id}: started heartbeat listener");
		Ok(())
	}

	/// Stop tracking heartbeats for this node.
	///
	/// The listener task is guaranteed to have terminated by the time this
	/// returns, and the multiplexer subscription has been released.
	pub async fn stop_listening(&self) -> Result<(), NmtError> {
		if self.network.is_none() {
			return Err(NmtError::NoNetwork);
		}

		let handle = self.listener.lock().unwrap().take().ok_or(NmtError::NotListening)?;
		// The receiving end may already be gone if the task exited on its own
		// (e.g. the multiplexer closed the channel); that's fine, the task is
		// about to observe `recv` returning `None` and exit regardless.
		let _ = handle.stop.send(());
		let _ = handle.task.await;

		if let Some(network) = &self.network {
			network.multiplexer.release(handle.subscription);
		}
		log::debug!("node {}: stopped heartbeat listener", self.node_id);
		Ok(())
	}

	/// Send a raw NMT command byte to this node.
	pub fn send_command(&self, command: u8) -> Result<(), NmtError> {
		let network = self.network.as_ref().ok_or(NmtError::NoNetwork)?;
		let data = [command, self.node_id, 0, 0, 0, 0, 0, 0];
		network.sender.send(nmt_command_id(), data).map_err(NmtError::SendFailed)
	}

	/// Resolve `name` to a command byte and send it.
	///
	/// Clears the last-received heartbeat byte first, so a subsequent
	/// [`NmtMaster::wait_for_bootup`] only observes heartbeats emitted after
	/// this command.
	pub fn set_state(&self, name: &str) -> Result<(), NmtError> {
		let command = codec::command_name_to_byte(name)?;
		self.inner.lock().unwrap().received = None;
		self.send_command(command)
	}

	/// The current lifecycle state as a symbolic name, or an empty string if
	/// the current state byte is not one of the six defined states.
	pub fn state_name(&self) -> String {
		let current = self.inner.lock().unwrap().current;
		codec::state_byte_to_name(current).unwrap_or("").to_string()
	}

	/// Block until the last received heartbeat byte is `OPERATIONAL` (5), or
	/// `timeout` elapses (default 10 s).
	pub async fn wait_for_bootup(&self, timeout: Option<Duration>) -> Result<(), NmtError> {
		let timeout = timeout.unwrap_or(DEFAULT_BOOTUP_TIMEOUT);
		let deadline = tokio::time::Instant::now() + timeout;
		let operational = u8::from(codec::NmtState::Operational);

		loop {
			if self.inner.lock().unwrap().received == Some(operational) {
				return Ok(());
			}

			let now = tokio::time::Instant::now();
			if now >= deadline {
				return Err(NmtError::Timeout);
			}
			tokio::time::sleep(BOOTUP_POLL_INTERVAL.min(deadline - now)).await;
		}
	}

	/// Create a new change-event subscription.
	pub fn subscribe_changes(&self) -> (ChangeSubscriptionId, mpsc::Receiver<NmtStateChange>) {
		let mut inner = self.inner.lock().unwrap();
		let id = inner.next_subscription_id;
		inner.next_subscription_id += 1;
		let (sender, receiver) = mpsc::channel(CHANGE_QUEUE_CAPACITY);
		inner.subscribers.insert(id, sender);
		(ChangeSubscriptionId(id), receiver)
	}

	/// Destroy a change-event subscription.
	pub fn unsubscribe_changes(&self, id: ChangeSubscriptionId) -> Result<(), NmtError> {
		let mut inner = self.inner.lock().unwrap();
		inner.subscribers.remove(&id.0).ok_or(NmtError::NoSuchSubscription).map(drop)
	}
}

impl Drop for NmtMaster {
	fn drop(&mut self) {
		// Best-effort: a graceful shutdown should call `stop_listening` first,
		// which releases the multiplexer subscription too. If the caller
		// dropped the master while still listening, at least stop the task.
		if let Some(handle) = self.listener.lock().unwrap().take() {
			handle.task.abort();
		}
	}
}

fn handle_heartbeat_frame(inner: &Mutex<Inner>, node_id: u8, frame: &CanFrame) {
	let received_byte = frame.data()[0];
	let new_current = if received_byte == 0 {
		u8::from(codec::NmtState::PreOperational)
	} else {
		received_byte
	};
	let timestamp = SystemTime::now();

	let mut inner = inner.lock().unwrap();
	let changed = inner.current != new_current;
	inner.received = Some(received_byte);
	inner.current = new_current;
	inner.timestamp = Some(timestamp);

	if changed {
		log::debug!("node {node_id}: state changed to {:?} ({new_current:#04x})", codec::state_byte_to_name(new_current));
		let event = NmtStateChange { node_id, state: new_current, timestamp };
		inner.subscribers.retain(|_, sender| match sender.try_send(event) {
			Ok(()) => true,
			Err(mpsc::error::TrySendError::Full(_)) => {
				log::warn!("node {node_id}: dropping state-change event, subscriber queue is full");
				true
			}
			Err(mpsc::error::TrySendError::Closed(_)) => false,
		});
	}
}
