//! Server change records and the notifications they produce.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of change carried by a [`DeltaRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The container's contents changed shape; nothing to apply.
    Object,
    /// Replace the value at an existing path.
    Update,
    /// Insert a value where none exists.
    Add,
    /// Remove the node at the path.
    Remove,
}

/// One entry of a server `ViewModelDeltas` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub path: String,
    pub change: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl DeltaRecord {
    #[must_use]
    pub fn new(path: impl Into<String>, change: ChangeKind, value: Option<Value>) -> Self {
        Self {
            path: path.into(),
            change,
            value,
        }
    }

    #[must_use]
    pub fn object(path: impl Into<String>) -> Self {
        Self::new(path, ChangeKind::Object, None)
    }

    #[must_use]
    pub fn update(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, ChangeKind::Update, Some(value))
    }

    #[must_use]
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, ChangeKind::Add, Some(value))
    }

    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self::new(path, ChangeKind::Remove, None)
    }
}

/// A path whose bindings need refreshing, and whether node identity at that
/// path changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingUpdate {
    pub path: String,
    pub rebind: bool,
}

impl BindingUpdate {
    #[must_use]
    pub fn new(path: impl Into<String>, rebind: bool) -> Self {
        Self {
            path: path.into(),
            rebind,
        }
    }
}
