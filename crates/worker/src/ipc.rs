//! Unix socket listener for out-of-process clients.

use std::path::Path;

use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

use crate::connection::spawn_connection;
use crate::service::WorkerHandle;

/// Accepts client connections on `socket_path` until `shutdown` fires.
///
/// A stale socket file left by a previous run is replaced. The socket file is
/// removed again on shutdown.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn serve(
	socket_path: impl AsRef<Path>,
	handle: WorkerHandle,
	shutdown: CancellationToken,
) -> std::io::Result<()> {
	let path = socket_path.as_ref();
	if path.exists() {
		tokio::fs::remove_file(path).await?;
	}
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}

	let listener = UnixListener::bind(path)?;
	tracing::info!(path = %path.display(), "worker.ipc.listening");

	loop {
		tokio::select! {
			() = shutdown.cancelled() => {
				tracing::info!("worker.ipc.shutdown");
				break;
			}
			res = listener.accept() => {
				match res {
					Ok((stream, _addr)) => {
						let (reader, writer) = stream.into_split();
						spawn_connection(handle.clone(), BufReader::new(reader), writer);
					}
					Err(err) => tracing::error!(error = %err, "worker.ipc.accept_failed"),
				}
			}
		}
	}

	if let Err(err) = tokio::fs::remove_file(path).await {
		tracing::debug!(error = %err, "worker.ipc.cleanup_failed");
	}
	Ok(())
}
