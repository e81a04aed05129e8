//! Request and response envelopes exchanged with the server.
//!
//! Envelope keys are PascalCase (`TransactionId`, `ViewModelDeltas`); nested
//! records (errors, deltas, message boxes) use camelCase keys.

use indexmap::IndexMap;
use pagesync_binding::DeltaRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What an outgoing request asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestMode {
    AppDefinition,
    Page,
    Update,
    Command,
    Back,
    ViewUpdate,
    Resync,
}

/// A client edit reported to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModelDelta {
    pub path: String,
    pub value: Value,
}

/// Outgoing request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    pub mode: RequestMode,
    #[serde(default)]
    pub transaction_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_model_deltas: Option<Vec<ViewModelDelta>>,
}

impl Request {
    #[must_use]
    pub fn new(mode: RequestMode) -> Self {
        Self {
            mode,
            transaction_id: 0,
            path: None,
            instance_id: None,
            instance_version: None,
            device_metrics: None,
            view_metrics: None,
            command: None,
            parameters: None,
            view_model_deltas: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_instance(mut self, id: u64, version: u64) -> Self {
        self.instance_id = Some(id);
        self.instance_version = Some(version);
        self
    }

    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>, parameters: Map<String, Value>) -> Self {
        self.command = Some(command.into());
        self.parameters = (!parameters.is_empty()).then_some(parameters);
        self
    }

    /// Append dirty view-model values. Nothing is attached when `deltas` is
    /// empty.
    pub fn attach_deltas(&mut self, deltas: IndexMap<String, Value>) {
        if deltas.is_empty() {
            return;
        }
        self.view_model_deltas
            .get_or_insert_with(Vec::new)
            .extend(deltas.into_iter().map(|(path, value)| ViewModelDelta { path, value }));
    }

    #[must_use]
    pub fn with_deltas(mut self, deltas: IndexMap<String, Value>) -> Self {
        self.attach_deltas(deltas);
        self
    }
}

/// `Error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_caption: Option<String>,
}

impl ResponseError {
    pub const SYNC_ERROR: &'static str = "SyncError";

    #[must_use]
    pub fn is_sync_error(&self) -> bool {
        self.name == Self::SYNC_ERROR
    }
}

/// One button of a server message box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBoxOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

/// A modal message the server asks the client to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBox {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub options: Vec<MessageBoxOption>,
}

/// Ask the platform to open a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchUrl {
    pub primary_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_url: Option<String>,
}

/// Incoming response envelope. Any subset of members may be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_model_deltas: Option<Vec<DeltaRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_box: Option<MessageBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_url: Option<LaunchUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choose_photo: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_request: Option<Request>,
}

/// Entry path declared by an app definition (`mainPage`).
#[must_use]
pub fn app_main_page(app: &Value) -> Option<&str> {
    app.get("mainPage").and_then(Value::as_str)
}
