//! Capabilities every binding fulfils in the UI context, and shared handler helpers.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use switchboard_bus::{BusError, CapabilityRegistry, Envelope, EventName, answering};
use switchboard_worker::WorkerError;

use crate::capability::{HttpRequest, HttpTransport, NavigateApp, NavigateExternal, Navigated, Navigator};

pub(crate) fn capability_error(name: EventName, message: impl Into<String>) -> BusError {
	BusError::Capability {
		name: name.as_str().to_string(),
		message: message.into(),
	}
}

/// Rehydrates a worker-side failure at the bus call site.
pub(crate) fn from_worker(err: WorkerError) -> BusError {
	match err {
		WorkerError::Operation(body) => BusError::WorkerOperation { message: body.message },
		WorkerError::Disconnected | WorkerError::Unavailable => BusError::Disconnected,
		other => BusError::WorkerOperation {
			message: other.to_string(),
		},
	}
}

pub(crate) fn register_navigation(registry: &mut CapabilityRegistry, owner: &'static str, navigator: &Arc<dyn Navigator>) {
	let nav = navigator.clone();
	registry.on(
		EventName::NavigateApp,
		owner,
		answering(move |env| {
			with_detail(env, |env, req: NavigateApp| match nav.open_screen(&req.screen, &req.params) {
				Ok(()) => env.respond(&Navigated { opened: true }),
				Err(message) => env.set_failed(capability_error(EventName::NavigateApp, message)),
			});
		}),
	);

	let nav = navigator.clone();
	registry.on(
		EventName::NavigateExternal,
		owner,
		answering(move |env| {
			with_detail(env, |env, req: NavigateExternal| match nav.open_external(&req.url) {
				Ok(()) => env.respond(&Navigated { opened: true }),
				Err(message) => env.set_failed(capability_error(EventName::NavigateExternal, message)),
			});
		}),
	);
}

pub(crate) fn register_http(registry: &mut CapabilityRegistry, owner: &'static str, transport: &Arc<dyn HttpTransport>) {
	let transport = transport.clone();
	registry.on(
		EventName::TransportHttp,
		owner,
		answering(move |env| {
			with_detail(env, |env, req: HttpRequest| {
				let transport = transport.clone();
				env.set_pending(async move {
					let response = transport
						.send(req)
						.await
						.map_err(|message| capability_error(EventName::TransportHttp, message))?;
					serde_json::to_value(response).map_err(|err| BusError::Decode(err.to_string()))
				});
			});
		}),
	);
}

/// Decodes the envelope detail as `T`, or fails the envelope.
pub(crate) fn with_detail<T, F>(env: &mut Envelope, f: F)
where
	T: serde::de::DeserializeOwned,
	F: FnOnce(&mut Envelope, T),
{
	match env.detail_as::<T>() {
		Ok(detail) => f(env, detail),
		Err(err) => env.set_failed(err),
	}
}

/// Navigator that only records what it was asked to open.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
	opened: Mutex<Vec<String>>,
}

impl RecordingNavigator {
	/// Targets opened so far: screen names, or URLs for external targets.
	#[must_use]
	pub fn opened(&self) -> Vec<String> {
		self.opened
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	fn record(&self, target: &str) {
		self.opened
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(target.to_string());
	}
}

impl Navigator for RecordingNavigator {
	fn open_screen(&self, screen: &str, _params: &Map<String, Value>) -> Result<(), String> {
		tracing::debug!(screen, "platform.navigate.app");
		self.record(screen);
		Ok(())
	}

	fn open_external(&self, url: &str) -> Result<(), String> {
		tracing::debug!(url, "platform.navigate.external");
		self.record(url);
		Ok(())
	}
}

/// HTTP transport for builds without network access; every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

#[async_trait::async_trait]
impl HttpTransport for OfflineTransport {
	async fn send(&self, request: HttpRequest) -> Result<crate::capability::HttpResponse, String> {
		Err(format!("no network transport for {} {}", request.method, request.url))
	}
}
