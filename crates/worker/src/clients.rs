//! Connected-client bookkeeping and notification fan-out.

use std::collections::BTreeMap;

use switchboard_proto::{ClientId, Notification, ServerFrame};
use tokio::sync::mpsc;

use crate::error::WorkerError;

/// Lifecycle of one client connection.
///
/// `Connecting -> Connected` on a completed handshake, and any state moves to
/// `Disconnected` on close or delivery failure. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
	/// Registered, welcome not yet delivered.
	Connecting,
	/// Handshake complete; receives notifications.
	Connected,
	/// Gone; never receives anything again.
	Disconnected,
}

impl ClientState {
	fn can_move_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Connecting, Self::Connected) | (Self::Connecting | Self::Connected, Self::Disconnected)
		)
	}
}

/// Outbound frame channel of one client.
///
/// Unbounded so the service never blocks on a slow reader; the connection
/// writer task drains it onto the socket.
#[derive(Debug, Clone)]
pub struct ClientSink {
	tx: mpsc::UnboundedSender<ServerFrame>,
}

impl ClientSink {
	/// Creates a sink and the receiver its connection writer drains.
	#[must_use]
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerFrame>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}

	/// Queues a frame. Fails once the receiving side is gone.
	pub fn send(&self, frame: ServerFrame) -> Result<(), ServerFrame> {
		self.tx.send(frame).map_err(|err| err.0)
	}

	/// Returns true once the receiving side has been dropped.
	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

struct ClientEntry {
	label: Option<String>,
	state: ClientState,
	sink: ClientSink,
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
	/// Clients the notification was queued for.
	pub delivered: Vec<ClientId>,
	/// Clients whose channel was closed; they are now disconnected.
	pub failed: Vec<ClientId>,
}

/// Every client known to the worker, keyed by id.
///
/// Owned by the service task; all access is serialized through its mailbox.
#[derive(Default)]
pub struct ClientRegistry {
	next_id: u64,
	clients: BTreeMap<ClientId, ClientEntry>,
}

impl ClientRegistry {
	/// Empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a new client in `Connecting` state.
	pub fn register(&mut self, label: Option<String>, sink: ClientSink) -> ClientId {
		self.next_id += 1;
		let id = ClientId(self.next_id);
		tracing::debug!(client = %id, label = label.as_deref().unwrap_or(""), "worker.client.connecting");
		self.clients.insert(
			id,
			ClientEntry {
				label,
				state: ClientState::Connecting,
				sink,
			},
		);
		id
	}

	/// Delivers the welcome frame and moves the client to `Connected`.
	///
	/// # Errors
	///
	/// [`WorkerError::UnknownClient`], [`WorkerError::InvalidTransition`] if the
	/// handshake already completed, or [`WorkerError::ChannelDelivery`] if the
	/// welcome could not be queued (the client is then disconnected).
	pub fn complete_handshake(&mut self, id: ClientId) -> Result<(), WorkerError> {
		let entry = self.clients.get_mut(&id).ok_or(WorkerError::UnknownClient(id))?;
		if !entry.state.can_move_to(ClientState::Connected) {
			return Err(WorkerError::InvalidTransition {
				client: id,
				from: entry.state,
				to: ClientState::Connected,
			});
		}
		if entry.sink.send(ServerFrame::Welcome { client_id: id }).is_err() {
			self.handle_delivery_failure(id);
			return Err(WorkerError::ChannelDelivery { client: id });
		}
		entry.state = ClientState::Connected;
		tracing::info!(client = %id, label = entry.label.as_deref().unwrap_or(""), "worker.client.connected");
		Ok(())
	}

	/// Moves a client to `Disconnected` and forgets it. Returns false if unknown.
	pub fn disconnect(&mut self, id: ClientId) -> bool {
		match self.clients.remove(&id) {
			Some(entry) => {
				tracing::info!(client = %id, from = ?entry.state, "worker.client.disconnected");
				true
			}
			None => false,
		}
	}

	/// Current state, or `Disconnected` for ids no longer registered.
	#[must_use]
	pub fn state(&self, id: ClientId) -> ClientState {
		self.clients
			.get(&id)
			.map_or(ClientState::Disconnected, |e| e.state)
	}

	/// Ids of every client currently `Connected`.
	#[must_use]
	pub fn connected(&self) -> Vec<ClientId> {
		self.clients
			.iter()
			.filter(|(_, e)| e.state == ClientState::Connected)
			.map(|(id, _)| *id)
			.collect()
	}

	/// Queues a frame for one client, disconnecting it if the channel is closed.
	///
	/// # Errors
	///
	/// [`WorkerError::UnknownClient`] or [`WorkerError::ChannelDelivery`].
	pub fn send_to(&mut self, id: ClientId, frame: ServerFrame) -> Result<(), WorkerError> {
		let entry = self.clients.get(&id).ok_or(WorkerError::UnknownClient(id))?;
		if entry.sink.send(frame).is_err() {
			self.handle_delivery_failure(id);
			return Err(WorkerError::ChannelDelivery { client: id });
		}
		Ok(())
	}

	/// Sends `notification` to every connected client, the originator included.
	///
	/// Recipients are the `Connected` set at call time. A closed channel never
	/// aborts the broadcast; that client is disconnected and the rest still
	/// receive the notification.
	pub fn broadcast(&mut self, notification: &Notification) -> FanOut {
		let mut out = FanOut::default();
		for id in self.connected() {
			let Some(entry) = self.clients.get(&id) else {
				continue;
			};
			match entry.sink.send(ServerFrame::Notification(notification.clone())) {
				Ok(()) => out.delivered.push(id),
				Err(_) => out.failed.push(id),
			}
		}
		for id in &out.failed {
			self.handle_delivery_failure(*id);
		}
		tracing::trace!(
			topic = %notification.topic,
			delivered = out.delivered.len(),
			failed = out.failed.len(),
			"worker.fanout"
		);
		out
	}

	fn handle_delivery_failure(&mut self, id: ClientId) {
		tracing::warn!(client = %id, error = %WorkerError::ChannelDelivery { client: id }, "worker.client.delivery_failed");
		self.disconnect(id);
	}
}
