//! Startup sequence and binding behavior through the public bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use switchboard_bus::{BusError, CapabilityRegistry, Dispatched, EventName, NameTable, ScopeId, answering};
use switchboard_platform::capability::{
	HttpRequest, HttpResponse, HttpTransport, NavigateApp, Navigated, UrlHistoryEntry, UrlRequest,
};
use switchboard_platform::{
	BindingInitError, DesktopBinding, PlatformBinding, RecordingNavigator, Startup, WebBinding, WorkerEndpoint,
};
use switchboard_proto::topic;
use switchboard_worker::{MemoryStore, StateSnapshot, StateStore, StoreError, WorkerConfig, WorkerService};

/// Binding that records lifecycle calls and optionally fails `initialize`.
struct Recording {
	name: &'static str,
	fail: bool,
	log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PlatformBinding for Recording {
	fn name(&self) -> &'static str {
		self.name
	}

	async fn initialize(&mut self) -> Result<(), BindingInitError> {
		self.log.lock().unwrap().push(format!("init:{}", self.name));
		if self.fail {
			return Err(BindingInitError::Failed {
				binding: self.name,
				reason: "keychain locked".into(),
			});
		}
		Ok(())
	}

	fn register(&self, _registry: &mut CapabilityRegistry) -> Result<(), BindingInitError> {
		self.log.lock().unwrap().push(format!("register:{}", self.name));
		Ok(())
	}
}

fn recording(name: &'static str, fail: bool, log: &Arc<Mutex<Vec<String>>>) -> Recording {
	Recording {
		name,
		fail,
		log: log.clone(),
	}
}

/// Store that loads empty state and refuses every save.
struct BrokenStore;

#[async_trait]
impl StateStore for BrokenStore {
	async fn load(&self) -> Result<StateSnapshot, StoreError> {
		Ok(StateSnapshot::default())
	}

	async fn save(&self, _snapshot: &StateSnapshot) -> Result<(), StoreError> {
		Err(StoreError::Backend("quota exceeded".into()))
	}
}

struct EchoTransport;

#[async_trait]
impl HttpTransport for EchoTransport {
	async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
		Ok(HttpResponse {
			status: 200,
			headers: Default::default(),
			body: format!("{} {}", request.method, request.url),
		})
	}
}

#[tokio::test(flavor = "current_thread")]
async fn bindings_initialize_then_register_in_order() {
	let log = Arc::new(Mutex::new(Vec::new()));
	let ready = Startup::new()
		.binding(recording("first", false, &log))
		.binding(recording("second", false, &log))
		.run()
		.await
		.unwrap();

	assert_eq!(
		*log.lock().unwrap(),
		vec!["init:first", "init:second", "register:first", "register:second"]
	);
	assert_eq!(ready.binding_names(), vec!["first", "second"]);
}

#[tokio::test(flavor = "current_thread")]
async fn failed_initialize_is_fatal() {
	let log = Arc::new(Mutex::new(Vec::new()));
	let result = Startup::new()
		.binding(recording("first", true, &log))
		.binding(recording("second", false, &log))
		.run()
		.await;

	assert!(matches!(result, Err(BindingInitError::Failed { binding: "first", .. })));
	assert_eq!(*log.lock().unwrap(), vec!["init:first"]);
}

#[tokio::test(flavor = "current_thread")]
async fn colliding_extension_names_abort_startup() {
	static PLUGIN: NameTable = NameTable::new("plugin", &["configread"]);
	let result = Startup::new().names(PLUGIN).run().await;
	let Err(BindingInitError::Bus(BusError::DuplicateName { name, .. })) = result else {
		panic!("expected duplicate name error");
	};
	assert_eq!(name, "configread");
}

#[tokio::test(flavor = "current_thread")]
async fn capability_without_binding_is_no_handler() {
	let ready = Startup::new().run().await.unwrap();
	let err = ready
		.bus()
		.dispatch(EventName::StoreGet, json!({ "key": "k" }))
		.unwrap_err();
	assert_eq!(err, BusError::NoHandler { name: "storekvget".into() });
	assert!(ready.notifications().is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn web_binding_reads_synchronously_after_a_write() {
	let ready = Startup::new().binding(WebBinding::new()).run().await.unwrap();
	let bus = ready.bus();

	let created = bus
		.dispatch(EventName::HistoryCreate, json!({ "url": "https://x" }))
		.unwrap();
	assert!(created.is_pending());

	let hits = bus
		.dispatch(EventName::HistoryQuery, json!({ "q": "X" }))
		.unwrap();
	let Dispatched::Ready(hits) = hits else {
		panic!("reads answer synchronously");
	};
	let hits: Vec<UrlHistoryEntry> = serde_json::from_value(hits).unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].url, "https://x");
	created.resolve().await.unwrap();

	bus.request::<Value, _>(EventName::StoreSet, &json!({ "key": "draft", "value": [1] }))
		.await
		.unwrap();
	let stored: Value = bus
		.request(EventName::StoreGet, &json!({ "key": "draft" }))
		.await
		.unwrap();
	assert_eq!(stored, json!([1]));
}

#[tokio::test(flavor = "current_thread")]
async fn web_binding_saves_changes_to_its_store() {
	let store = Arc::new(MemoryStore::new());
	let ready = Startup::new()
		.binding(WebBinding::new().with_seed(store.clone()))
		.run()
		.await
		.unwrap();
	let bus = ready.bus();

	bus.request::<Value, _>(EventName::HistoryCreate, &json!({ "url": "https://x" }))
		.await
		.unwrap();
	bus.request::<Value, _>(EventName::StoreSet, &json!({ "key": "draft", "value": "hi" }))
		.await
		.unwrap();

	let saved = store.snapshot();
	assert_eq!(saved.history.len(), 1);
	assert_eq!(saved.kv.get("draft"), Some(&json!("hi")));

	let reloaded = Startup::new()
		.binding(WebBinding::new().with_seed(store))
		.run()
		.await
		.unwrap();
	let draft: Value = reloaded
		.bus()
		.request(EventName::StoreGet, &json!({ "key": "draft" }))
		.await
		.unwrap();
	assert_eq!(draft, json!("hi"));
}

#[tokio::test(flavor = "current_thread")]
async fn web_binding_reports_failed_save() {
	let store = Arc::new(BrokenStore);
	let ready = Startup::new()
		.binding(WebBinding::new().with_seed(store))
		.run()
		.await
		.unwrap();

	let err = ready
		.bus()
		.request::<Value, _>(EventName::ConfigUpdate, &json!({ "key": "theme", "value": "dark" }))
		.await
		.unwrap_err();
	assert!(matches!(err, BusError::Capability { .. }), "{err:?}");

	let unchanged: Value = ready
		.bus()
		.request(EventName::ConfigUpdate, &json!({ "key": "theme", "value": "dark" }))
		.await
		.unwrap();
	assert_eq!(unchanged, json!("dark"));
}

#[tokio::test(flavor = "current_thread")]
async fn web_binding_rejects_malformed_detail() {
	let ready = Startup::new().binding(WebBinding::new()).run().await.unwrap();
	let err = ready
		.bus()
		.dispatch(EventName::HistoryCreate, json!({ "link": "https://x" }))
		.unwrap_err();
	assert!(matches!(err, BusError::InvalidDetail { .. }), "{err:?}");
}

#[tokio::test(flavor = "current_thread")]
async fn navigation_and_http_use_injected_collaborators() {
	let navigator = Arc::new(RecordingNavigator::default());
	let ready = Startup::new()
		.binding(
			WebBinding::new()
				.with_navigator(navigator.clone())
				.with_http(Arc::new(EchoTransport)),
		)
		.run()
		.await
		.unwrap();
	let bus = ready.bus();

	let navigated: Navigated = bus
		.request(
			EventName::NavigateApp,
			&NavigateApp {
				screen: "settings".into(),
				params: Default::default(),
			},
		)
		.await
		.unwrap();
	assert!(navigated.opened);
	assert_eq!(navigator.opened(), vec!["settings"]);

	let dispatched = bus
		.dispatch(EventName::TransportHttp, json!({ "url": "https://api/v1" }))
		.unwrap();
	assert!(dispatched.is_pending());
	let response: HttpResponse = serde_json::from_value(dispatched.resolve().await.unwrap()).unwrap();
	assert_eq!(response.status, 200);
	assert_eq!(response.body, "GET https://api/v1");
}

#[tokio::test(flavor = "current_thread")]
async fn offline_transport_fails_http() {
	let ready = Startup::new().binding(WebBinding::new()).run().await.unwrap();
	let err = ready
		.bus()
		.dispatch(EventName::TransportHttp, json!({ "url": "https://api" }))
		.unwrap()
		.resolve()
		.await
		.unwrap_err();
	assert!(matches!(err, BusError::Capability { .. }));
}

#[tokio::test(flavor = "current_thread")]
async fn scoped_override_shadows_binding() {
	let scope = Arc::new(Mutex::new(None));
	let captured = scope.clone();
	let ready = Startup::new()
		.binding(WebBinding::new())
		.configure(move |registry| {
			let panel = registry.create_scope(ScopeId::ROOT, "panel")?;
			registry.on_scope(
				panel,
				EventName::ConfigRead,
				"panel",
				answering(|env| env.set_result(json!("panel-theme"))),
			)?;
			*captured.lock().unwrap() = Some(panel);
			Ok(())
		})
		.run()
		.await
		.unwrap();
	let panel = scope.lock().unwrap().expect("scope created");

	let inner = ready
		.bus()
		.dispatch_on(panel, EventName::ConfigRead, json!({ "key": "theme" }))
		.unwrap()
		.resolve()
		.await
		.unwrap();
	assert_eq!(inner, json!("panel-theme"));

	let outer = ready
		.bus()
		.dispatch(EventName::ConfigRead, json!({ "key": "theme" }))
		.unwrap()
		.resolve()
		.await
		.unwrap();
	assert_eq!(outer, Value::Null);
}

#[tokio::test(flavor = "current_thread")]
async fn desktop_forwards_to_worker_and_fans_out() {
	let worker = WorkerService::start(&WorkerConfig::default(), Arc::new(MemoryStore::new()))
		.await
		.unwrap();

	let a = Startup::new()
		.binding(DesktopBinding::new(WorkerEndpoint::InProcess(worker.clone())).with_label("a"))
		.run()
		.await
		.unwrap();
	let b = Startup::new()
		.binding(DesktopBinding::new(WorkerEndpoint::InProcess(worker.clone())).with_label("b"))
		.run()
		.await
		.unwrap();
	let mut a_rx = a.notifications().unwrap();
	let mut b_rx = b.notifications().unwrap();

	let dispatched = a
		.bus()
		.dispatch(EventName::HistoryCreate, json!({ "url": "https://x" }))
		.unwrap();
	assert!(dispatched.is_pending());
	let entry: UrlHistoryEntry = serde_json::from_value(dispatched.resolve().await.unwrap()).unwrap();
	assert_eq!(entry.count, 1);

	for rx in [&mut a_rx, &mut b_rx] {
		let n = tokio::time::timeout(Duration::from_millis(500), rx.recv())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(n.topic, topic::URL_HISTORY);
		assert_eq!(n.kind(), Some("create"));
	}

	let hits: Vec<UrlHistoryEntry> = b
		.bus()
		.request(EventName::HistoryQuery, &json!({ "q": "x" }))
		.await
		.unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(worker.clients().await.unwrap().len(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn desktop_kv_is_shared_through_the_worker() {
	let store = Arc::new(MemoryStore::new());
	let worker = WorkerService::start(&WorkerConfig::default(), store.clone())
		.await
		.unwrap();
	let a = Startup::new()
		.binding(DesktopBinding::new(WorkerEndpoint::InProcess(worker.clone())).with_label("a"))
		.run()
		.await
		.unwrap();
	let b = Startup::new()
		.binding(DesktopBinding::new(WorkerEndpoint::InProcess(worker)).with_label("b"))
		.run()
		.await
		.unwrap();
	let mut b_rx = b.notifications().unwrap();

	let set = a
		.bus()
		.dispatch(EventName::StoreSet, json!({ "key": "draft", "value": 1 }))
		.unwrap();
	assert!(set.is_pending());
	assert_eq!(set.resolve().await.unwrap(), json!(1));

	let n = tokio::time::timeout(Duration::from_millis(500), b_rx.recv())
		.await
		.unwrap()
		.unwrap();
	assert_eq!((n.topic.as_str(), n.kind()), (topic::KV, Some("update")));

	let seen: Value = b
		.bus()
		.request(EventName::StoreGet, &json!({ "key": "draft" }))
		.await
		.unwrap();
	assert_eq!(seen, json!(1));
	assert_eq!(store.snapshot().kv.get("draft"), Some(&json!(1)));
}

#[tokio::test(flavor = "current_thread")]
async fn desktop_rehydrates_worker_errors() {
	let worker = WorkerService::start(&WorkerConfig::default(), Arc::new(MemoryStore::new()))
		.await
		.unwrap();
	let ready = Startup::new()
		.binding(DesktopBinding::new(WorkerEndpoint::InProcess(worker)))
		.run()
		.await
		.unwrap();

	let err = ready
		.bus()
		.request::<Value, _>(EventName::HistoryCreate, &UrlRequest { url: String::new() })
		.await
		.unwrap_err();
	let BusError::WorkerOperation { message } = err else {
		panic!("expected worker operation error, got {err:?}");
	};
	assert!(message.contains("url"), "{message}");
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_worker_aborts_startup() {
	let missing = std::env::temp_dir().join("switchboard-no-such-worker.sock");
	let result = Startup::new()
		.binding(DesktopBinding::new(WorkerEndpoint::Socket(missing)))
		.run()
		.await;
	assert!(matches!(
		result,
		Err(BindingInitError::Worker { binding: "desktop", .. })
	));
}
