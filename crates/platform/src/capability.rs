//! Request and response shapes of the platform capability set.
//!
//! Each capability is one [`EventName`]. UI code serializes the request type
//! as the envelope detail and decodes the documented response type from the
//! result.
//!
//! | Event | Request | Response |
//! |---|---|---|
//! | `configread` | [`ConfigRead`] | JSON value, or the whole map |
//! | `configupdate` | [`ConfigUpdate`] | the written value |
//! | `configdelete` | [`KeyRequest`] | [`Deleted`] |
//! | `storekvget` | [`KeyRequest`] | JSON value or `null` |
//! | `storekvset` | [`KvSet`] | the written value |
//! | `storekvdelete` | [`KeyRequest`] | [`Deleted`] |
//! | `navigateapp` | [`NavigateApp`] | [`Navigated`] |
//! | `navigateexternal` | [`NavigateExternal`] | [`Navigated`] |
//! | `storehistorycreate` | [`UrlRequest`] | [`UrlHistoryEntry`] |
//! | `storehistoryquery` | [`HistoryQuery`] | `Vec<UrlHistoryEntry>` |
//! | `storehistorylist` | [`HistoryList`] | `Vec<UrlHistoryEntry>` |
//! | `storehistorydelete` | [`UrlRequest`] | [`Deleted`] |
//! | `storehistoryclear` | none | [`Cleared`] |
//! | `storeprojectread` | [`IdRequest`] | `Option<Project>` |
//! | `storeprojectlist` | none | `Vec<Project>` |
//! | `storeprojectupdate` | [`ProjectUpdate`] | [`Project`] |
//! | `storeprojectdelete` | [`IdRequest`] | [`Deleted`] |
//! | `storeprojectclear` | none | [`Cleared`] |
//! | `transporthttp` | [`HttpRequest`] | [`HttpResponse`] |

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use switchboard_bus::EventName;
use switchboard_proto::op;
pub use switchboard_worker::{Project, UrlHistoryEntry};

/// `configread` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRead {
	/// Key to read; absent reads the whole map.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
}

/// `configupdate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
	/// Key to write.
	pub key: String,
	/// New value.
	pub value: Value,
}

/// Request addressing one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
	/// Key.
	pub key: String,
}

/// `storekvset` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvSet {
	/// Key to write.
	pub key: String,
	/// Stored value.
	pub value: Value,
}

/// `navigateapp` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateApp {
	/// Screen or window name.
	pub screen: String,
	/// Screen parameters.
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub params: Map<String, Value>,
}

/// `navigateexternal` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateExternal {
	/// URL to open outside the application.
	pub url: String,
}

/// Navigation acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigated {
	/// Whether the target was opened.
	pub opened: bool,
}

/// Request addressing one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRequest {
	/// URL.
	pub url: String,
}

/// `storehistoryquery` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
	/// Case-insensitive substring.
	#[serde(default)]
	pub q: String,
}

/// `storehistorylist` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryList {
	/// Maximum number of entries.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<usize>,
}

/// Request addressing one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRequest {
	/// Project id.
	pub id: String,
}

/// `storeprojectupdate` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUpdate {
	/// Project to store.
	pub project: Project,
}

/// Deletion outcome; `false` when nothing was there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
	/// Whether anything was removed.
	pub deleted: bool,
}

/// Clear outcome; `false` when the collection was already empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cleared {
	/// Whether anything was removed.
	pub cleared: bool,
}

/// `transporthttp` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
	/// HTTP method, e.g. `GET`.
	#[serde(default = "default_method")]
	pub method: String,
	/// Absolute URL.
	pub url: String,
	/// Request headers.
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
	/// Request body.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<String>,
}

fn default_method() -> String {
	"GET".to_string()
}

/// `transporthttp` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
	/// Status code.
	pub status: u16,
	/// Response headers.
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
	/// Response body.
	#[serde(default)]
	pub body: String,
}

/// Outbound HTTP client used by the `transporthttp` capability.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
	/// Performs the request. The error string is reported to the caller.
	async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// Opens screens, windows and external URLs.
pub trait Navigator: Send + Sync + 'static {
	/// Opens an application screen.
	fn open_screen(&self, screen: &str, params: &Map<String, Value>) -> Result<(), String>;
	/// Opens a URL outside the application.
	fn open_external(&self, url: &str) -> Result<(), String>;
}

/// Worker operation that fulfils `name`, for capabilities backed by durable state.
///
/// The request shapes above use the worker's argument names, so the envelope
/// detail is forwarded unchanged.
#[must_use]
pub const fn worker_operation(name: EventName) -> Option<&'static str> {
	Some(match name {
		EventName::ConfigRead => op::READ_CONFIG,
		EventName::ConfigUpdate => op::UPDATE_CONFIG,
		EventName::ConfigDelete => op::DELETE_CONFIG,
		EventName::HistoryCreate => op::ADD_URL_HISTORY,
		EventName::HistoryQuery => op::QUERY_URL_HISTORY,
		EventName::HistoryList => op::LIST_URL_HISTORY,
		EventName::HistoryDelete => op::DELETE_URL_HISTORY,
		EventName::HistoryClear => op::CLEAR_URL_HISTORY,
		EventName::ProjectRead => op::READ_PROJECT,
		EventName::ProjectList => op::LIST_PROJECTS,
		EventName::ProjectUpdate => op::UPDATE_PROJECT,
		EventName::ProjectDelete => op::DELETE_PROJECT,
		EventName::ProjectClear => op::CLEAR_PROJECTS,
		EventName::StoreGet => op::READ_KV,
		EventName::StoreSet => op::UPDATE_KV,
		EventName::StoreDelete => op::DELETE_KV,
		EventName::NavigateApp
		| EventName::NavigateExternal
		| EventName::TransportHttp => return None,
	})
}

/// Event names served from worker-owned state.
#[must_use]
pub fn worker_backed() -> Vec<EventName> {
	EventName::ALL
		.iter()
		.copied()
		.filter(|name| worker_operation(*name).is_some())
		.collect()
}
