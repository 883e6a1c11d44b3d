//! Client side of the worker protocol.
//!
//! A [`WorkerClient`] owns one connection. Requests are registered in a
//! correlation map and written synchronously, so the caller holds a pending
//! future before any I/O completes. Responses resolve their futures,
//! notifications are republished on a broadcast channel.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use switchboard_proto::{
	ClientFrame, ClientId, CorrelationId, Notification, ServerFrame, WorkerRequest, WorkerResponse, read_frame,
	write_frame,
};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::connection::spawn_connection;
use crate::error::WorkerError;
use crate::service::WorkerHandle;

/// Notifications a subscriber may fall behind by before it starts missing them.
pub const NOTIFICATION_BUFFER: usize = 256;

#[derive(Default)]
struct Pending {
	closed: bool,
	waiters: HashMap<CorrelationId, oneshot::Sender<WorkerResponse>>,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &SharedPending) -> std::sync::MutexGuard<'_, Pending> {
	pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One connection to the worker.
///
/// Dropping the client closes the connection.
pub struct WorkerClient {
	client_id: ClientId,
	outbound: mpsc::UnboundedSender<ClientFrame>,
	pending: SharedPending,
	notifications: broadcast::Sender<Notification>,
	closed: CancellationToken,
}

impl std::fmt::Debug for WorkerClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WorkerClient")
			.field("client_id", &self.client_id)
			.field("closed", &self.closed.is_cancelled())
			.finish_non_exhaustive()
	}
}

impl WorkerClient {
	/// Connects to a worker daemon listening on `path`.
	///
	/// # Errors
	///
	/// [`WorkerError::Io`] if the socket cannot be reached, or the handshake error.
	pub async fn connect_unix(path: impl AsRef<Path>, label: Option<String>) -> Result<Self, WorkerError> {
		let stream = tokio::net::UnixStream::connect(path.as_ref()).await?;
		let (reader, writer) = stream.into_split();
		Self::handshake(BufReader::new(reader), writer, label).await
	}

	/// Connects to a worker service running in this process over an in-memory pipe.
	///
	/// # Errors
	///
	/// Returns the handshake error.
	pub async fn connect_in_process(handle: &WorkerHandle, label: Option<String>) -> Result<Self, WorkerError> {
		let (client_io, server_io) = tokio::io::duplex(64 * 1024);
		let (server_read, server_write) = tokio::io::split(server_io);
		spawn_connection(handle.clone(), BufReader::new(server_read), server_write);
		let (read, write) = tokio::io::split(client_io);
		Self::handshake(BufReader::new(read), write, label).await
	}

	/// Performs the hello/welcome exchange over an established transport.
	///
	/// # Errors
	///
	/// [`WorkerError::Handshake`] if the worker does not answer with `welcome`.
	pub async fn handshake<R, W>(mut reader: R, mut writer: W, label: Option<String>) -> Result<Self, WorkerError>
	where
		R: AsyncBufRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		write_frame(&mut writer, &ClientFrame::Hello { label }).await?;
		let client_id = match read_frame::<ServerFrame>(&mut reader).await? {
			Some(ServerFrame::Welcome { client_id }) => client_id,
			Some(other) => return Err(WorkerError::Handshake(format!("expected welcome, got {other:?}"))),
			None => return Err(WorkerError::Handshake("connection closed before welcome".into())),
		};
		tracing::debug!(client = %client_id, "worker.client.welcomed");

		let (outbound, outbound_rx) = mpsc::unbounded_channel();
		let pending = SharedPending::default();
		let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
		let closed = CancellationToken::new();

		tokio::spawn(write_loop(writer, outbound_rx));
		tokio::spawn(read_loop(
			reader,
			pending.clone(),
			notifications.clone(),
			closed.clone(),
		));

		Ok(Self {
			client_id,
			outbound,
			pending,
			notifications,
			closed,
		})
	}

	/// Identity the worker assigned to this connection.
	#[must_use]
	pub fn client_id(&self) -> ClientId {
		self.client_id
	}

	/// Sends a request and returns a future resolving to its result.
	///
	/// The request is registered and queued before this returns; awaiting the
	/// future only waits for the response. If the connection closes first the
	/// future resolves to [`WorkerError::Disconnected`].
	pub fn request(
		&self,
		operation: &str,
		args: Value,
	) -> impl Future<Output = Result<Value, WorkerError>> + Send + use<> {
		let registered = self.send_request(WorkerRequest::new(operation, args));
		async move {
			let rx = registered?;
			let response = rx.await.map_err(|_| WorkerError::Disconnected)?;
			response.into_result().map_err(WorkerError::Operation)
		}
	}

	/// Subscribes to notifications received after this call.
	///
	/// A receiver more than [`NOTIFICATION_BUFFER`] notifications behind
	/// skips the oldest ones and its next `recv` returns
	/// [`broadcast::error::RecvError::Lagged`] with the number missed. Treat
	/// that as a signal to re-read the affected state from the worker.
	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
		self.notifications.subscribe()
	}

	/// Returns true until the connection closes.
	#[must_use]
	pub fn is_connected(&self) -> bool {
		!self.closed.is_cancelled()
	}

	/// Resolves once the connection has closed.
	pub async fn closed(&self) {
		self.closed.cancelled().await;
	}

	/// Sends `bye`; the worker unregisters this client and closes the connection.
	pub fn close(&self) {
		let _ = self.outbound.send(ClientFrame::Bye);
	}

	fn send_request(&self, request: WorkerRequest) -> Result<oneshot::Receiver<WorkerResponse>, WorkerError> {
		let correlation_id = request.correlation_id.clone();
		let (tx, rx) = oneshot::channel();
		{
			let mut pending = lock(&self.pending);
			if pending.closed {
				return Err(WorkerError::Disconnected);
			}
			pending.waiters.insert(correlation_id.clone(), tx);
		}
		if self.outbound.send(ClientFrame::Request(request)).is_err() {
			lock(&self.pending).waiters.remove(&correlation_id);
			return Err(WorkerError::Disconnected);
		}
		Ok(rx)
	}
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<ClientFrame>)
where
	W: AsyncWrite + Unpin,
{
	while let Some(frame) = rx.recv().await {
		let bye = matches!(frame, ClientFrame::Bye);
		if let Err(err) = write_frame(&mut writer, &frame).await {
			tracing::debug!(error = %err, "worker.client.write_failed");
			return;
		}
		if bye {
			break;
		}
	}
	let _ = writer.shutdown().await;
}

async fn read_loop<R>(
	mut reader: R,
	pending: SharedPending,
	notifications: broadcast::Sender<Notification>,
	closed: CancellationToken,
) where
	R: AsyncBufRead + Unpin,
{
	loop {
		match read_frame::<ServerFrame>(&mut reader).await {
			Ok(Some(ServerFrame::Response(response))) => {
				let waiter = lock(&pending).waiters.remove(&response.correlation_id);
				match waiter {
					Some(tx) => {
						let _ = tx.send(response);
					}
					None => {
						tracing::debug!(correlation_id = %response.correlation_id, "worker.client.orphan_response");
					}
				}
			}
			Ok(Some(ServerFrame::Notification(notification))) => {
				// No subscribers is not an error; slow ones observe `Lagged`.
				let _ = notifications.send(notification);
			}
			Ok(Some(ServerFrame::Welcome { .. })) => {
				tracing::warn!("worker.client.unexpected_welcome");
			}
			Ok(None) => break,
			Err(err) => {
				tracing::debug!(error = %err, "worker.client.read_failed");
				break;
			}
		}
	}

	// Dropping the senders fails every outstanding request with Disconnected.
	let failed = {
		let mut pending = lock(&pending);
		pending.closed = true;
		std::mem::take(&mut pending.waiters).len()
	};
	if failed > 0 {
		tracing::warn!(failed, "worker.client.disconnected_with_pending");
	}
	closed.cancel();
}
