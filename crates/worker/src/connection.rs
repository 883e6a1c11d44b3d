//! Server side of one client connection.

use switchboard_proto::{ClientFrame, ClientId, ProtoError, ServerFrame, read_frame, write_frame};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::clients::ClientSink;
use crate::error::WorkerError;
use crate::service::WorkerHandle;

/// Spawns [`drive_connection`] and logs how it ended.
pub fn spawn_connection<R, W>(handle: WorkerHandle, reader: R, writer: W)
where
	R: AsyncBufRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		match drive_connection(handle, reader, writer).await {
			Ok(()) => tracing::debug!("worker.connection.closed"),
			Err(err) => tracing::warn!(error = %err, "worker.connection.failed"),
		}
	});
}

/// Runs one connection to completion.
///
/// The first frame must be `hello`; the client is registered and welcomed,
/// then requests are forwarded to the service until `bye`, end of stream or a
/// transport error. The client is always unregistered on exit.
///
/// # Errors
///
/// [`WorkerError::Handshake`] if the connection opens with anything but
/// `hello`, or the transport error that ended the connection.
pub async fn drive_connection<R, W>(handle: WorkerHandle, mut reader: R, writer: W) -> Result<(), WorkerError>
where
	R: AsyncBufRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static,
{
	let label = match read_frame::<ClientFrame>(&mut reader).await? {
		Some(ClientFrame::Hello { label }) => label,
		Some(ClientFrame::Request(req)) => {
			return Err(WorkerError::Handshake(format!(
				"request `{}` sent before hello",
				req.operation
			)));
		}
		Some(ClientFrame::Bye) | None => return Ok(()),
	};

	let (sink, rx) = ClientSink::channel();
	let writer_task = tokio::spawn(write_loop(writer, rx));
	let client = handle.connect(label, sink).await?;

	let result = read_loop(&handle, client, &mut reader).await;
	handle.disconnect(client).await;

	// The registry dropped the sink, so the writer drains what is queued and exits.
	match writer_task.await {
		Ok(Err(err)) if !err.is_disconnect() => tracing::debug!(%client, error = %err, "worker.connection.write_failed"),
		_ => {}
	}
	result
}

async fn read_loop<R>(handle: &WorkerHandle, client: ClientId, reader: &mut R) -> Result<(), WorkerError>
where
	R: AsyncBufRead + Unpin,
{
	loop {
		match read_frame::<ClientFrame>(reader).await {
			Ok(Some(ClientFrame::Request(request))) => handle.submit(client, request).await?,
			Ok(Some(ClientFrame::Bye)) => {
				tracing::debug!(%client, "worker.connection.bye");
				return Ok(());
			}
			Ok(None) => return Ok(()),
			Ok(Some(ClientFrame::Hello { .. })) => {
				tracing::warn!(%client, "worker.connection.duplicate_hello");
			}
			// The malformed line was consumed whole, so the stream stays in sync.
			Err(ProtoError::Decode(err)) => {
				tracing::warn!(%client, error = %err, "worker.connection.malformed_frame");
			}
			Err(err) if err.is_disconnect() => return Ok(()),
			Err(err) => return Err(err.into()),
		}
	}
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<ServerFrame>) -> Result<(), ProtoError>
where
	W: AsyncWrite + Unpin,
{
	while let Some(frame) = rx.recv().await {
		write_frame(&mut writer, &frame).await?;
	}
	writer.shutdown().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use pretty_assertions::assert_eq;
	use serde_json::json;
	use switchboard_proto::{WorkerRequest, op};
	use tokio::io::{BufReader, DuplexStream, ReadHalf, WriteHalf};

	use super::*;
	use crate::config::WorkerConfig;
	use crate::service::WorkerService;
	use crate::store::MemoryStore;

	struct RawPeer {
		reader: BufReader<ReadHalf<DuplexStream>>,
		writer: WriteHalf<DuplexStream>,
	}

	impl RawPeer {
		async fn send(&mut self, frame: &ClientFrame) {
			write_frame(&mut self.writer, frame).await.unwrap();
		}

		async fn recv(&mut self) -> Option<ServerFrame> {
			read_frame(&mut self.reader).await.unwrap()
		}
	}

	async fn open() -> (WorkerHandle, RawPeer) {
		let handle = WorkerService::start(&WorkerConfig::default(), Arc::new(MemoryStore::new()))
			.await
			.unwrap();
		let (client_io, server_io) = tokio::io::duplex(16 * 1024);
		let (server_read, server_write) = tokio::io::split(server_io);
		spawn_connection(handle.clone(), BufReader::new(server_read), server_write);
		let (read, writer) = tokio::io::split(client_io);
		(
			handle,
			RawPeer {
				reader: BufReader::new(read),
				writer,
			},
		)
	}

	#[tokio::test(flavor = "current_thread")]
	async fn hello_is_welcomed_and_requests_answered() {
		let (_handle, mut peer) = open().await;
		peer.send(&ClientFrame::Hello { label: Some("test".into()) }).await;
		assert!(matches!(peer.recv().await, Some(ServerFrame::Welcome { .. })));

		let request = WorkerRequest::new(op::PING, json!({}));
		let correlation = request.correlation_id.clone();
		peer.send(&ClientFrame::Request(request)).await;
		let Some(ServerFrame::Response(resp)) = peer.recv().await else {
			panic!("expected response");
		};
		assert_eq!(resp.correlation_id, correlation);
		assert_eq!(resp.value, Some(json!("pong")));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn request_before_hello_closes_connection() {
		let (handle, mut peer) = open().await;
		peer.send(&ClientFrame::Request(WorkerRequest::new(op::PING, json!({}))))
			.await;
		assert_eq!(peer.recv().await, None);
		assert!(handle.clients().await.unwrap().is_empty());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn bye_unregisters_client() {
		let (handle, mut peer) = open().await;
		peer.send(&ClientFrame::Hello { label: None }).await;
		assert!(matches!(peer.recv().await, Some(ServerFrame::Welcome { .. })));
		assert_eq!(handle.clients().await.unwrap().len(), 1);

		peer.send(&ClientFrame::Bye).await;
		assert_eq!(peer.recv().await, None);
		assert!(handle.clients().await.unwrap().is_empty());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn malformed_line_is_skipped() {
		let (_handle, mut peer) = open().await;
		peer.send(&ClientFrame::Hello { label: None }).await;
		assert!(matches!(peer.recv().await, Some(ServerFrame::Welcome { .. })));

		peer.writer.write_all(b"{ nope\n").await.unwrap();
		peer.send(&ClientFrame::Request(WorkerRequest::new(op::PING, json!({}))))
			.await;
		assert!(matches!(peer.recv().await, Some(ServerFrame::Response(r)) if r.ok));
	}
}
