//! Switchboard worker daemon.
//!
//! Owns the durable state (URL history, configuration, projects) and serves
//! every connected UI context over a Unix socket. Mutations are persisted
//! before they are acknowledged and fanned out to all connected clients.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use switchboard_worker::{FileStore, WorkerConfig, WorkerService};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Worker command line arguments.
#[derive(Parser, Debug)]
#[command(name = "switchboard-worker")]
#[command(about = "Shared-state worker for switchboard UI contexts")]
struct Args {
	/// Socket path for IPC
	#[arg(short, long, value_name = "PATH")]
	socket: Option<PathBuf>,

	/// Config file (defaults to <config_dir>/switchboard/worker.toml)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Directory holding the state file
	#[arg(long, value_name = "DIR")]
	data_dir: Option<PathBuf>,

	/// Maximum number of URL history entries kept
	#[arg(long, value_name = "N")]
	history_limit: Option<usize>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

impl Args {
	fn worker_config(&self) -> Result<WorkerConfig, switchboard_worker::ConfigError> {
		let mut config = match self.config.clone().or_else(WorkerConfig::default_path) {
			Some(path) => WorkerConfig::load(&path)?,
			None => WorkerConfig::default(),
		};
		if let Some(socket) = &self.socket {
			config.socket = Some(socket.clone());
		}
		if let Some(dir) = &self.data_dir {
			config.data_dir = Some(dir.clone());
		}
		if let Some(limit) = self.history_limit {
			config.history_limit = limit;
		}
		config.validate()?;
		Ok(config)
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	info!("starting switchboard-worker");

	let config = args.worker_config()?;
	let socket_path = config.socket_path();
	let state_path = config.state_path();
	info!(socket = %socket_path.display(), state = %state_path.display(), "worker paths");

	let handle = WorkerService::start(&config, Arc::new(FileStore::new(state_path))).await?;

	let shutdown = CancellationToken::new();
	let on_signal = shutdown.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!("interrupt received");
			on_signal.cancel();
		}
	});

	info!("starting IPC server");
	switchboard_worker::serve(&socket_path, handle, shutdown).await?;

	Ok(())
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::fmt::format::FmtSpan;
	use tracing_subscriber::prelude::*;

	let default_filter = || {
		if verbose {
			EnvFilter::new("switchboard_worker=trace,debug")
		} else {
			EnvFilter::new("switchboard_worker=debug,info")
		}
	};

	if let Some(log_dir) = std::env::var("SWITCHBOARD_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("switchboard-worker.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let filter = EnvFilter::try_from_env("SWITCHBOARD_LOG").unwrap_or_else(|_| default_filter());

			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_span_events(FmtSpan::CLOSE)
				.with_target(true);

			tracing_subscriber::registry()
				.with(filter)
				.with(file_layer)
				.init();

			tracing::info!(path = ?log_path, "worker tracing initialized");
			return;
		}
	}

	let filter = EnvFilter::try_from_env("SWITCHBOARD_LOG").unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("debug")
		} else {
			EnvFilter::new("info")
		}
	});
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}
