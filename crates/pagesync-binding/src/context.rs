#![forbid(unsafe_code)]

//! Path cursors into the view-model document.
//!
//! A [`BindingContext`] is a resolved path plus a lazily cached node handle.
//! Contexts are cheap to clone and never hold a reference to the document;
//! every read or write takes the [`Document`] explicitly.
//!
//! # Path directives
//!
//! | Directive | Effect |
//! |-----------|--------|
//! | `$root` | Reset to the document root |
//! | `$parent` | Drop one trailing segment (no-op at the root) |
//! | `$data` | The current context itself |
//! | `$index` | Resolve to the position within the nearest enclosing array |
//!
//! # Invariants
//!
//! 1. Two contexts with the same resolved path (and index flag) are
//!    equivalent, however they were created.
//! 2. A context never writes through an `$index` resolution.

use std::cell::Cell;

use pagesync_json::{Document, NodeId, normalize_path};
use serde_json::Value;

/// A resolvable location in the view-model document.
#[derive(Debug, Clone)]
pub struct BindingContext {
    path: String,
    is_index: bool,
    bound: Cell<Option<NodeId>>,
}

impl PartialEq for BindingContext {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.is_index == other.is_index
    }
}

impl Eq for BindingContext {}

impl Default for BindingContext {
    fn default() -> Self {
        Self::root()
    }
}

impl BindingContext {
    /// Context for the document root.
    #[must_use]
    pub fn root() -> Self {
        Self::at("")
    }

    /// Context for an absolute, already resolved path.
    #[must_use]
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_index: false,
            bound: Cell::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    #[must_use]
    pub const fn is_index(&self) -> bool {
        self.is_index
    }

    /// Derive a child context from a relative path expression.
    #[must_use]
    pub fn select(&self, path: &str) -> Self {
        let (path, is_index) = resolve_path(&self.path, path);
        Self {
            path,
            is_index,
            bound: Cell::new(None),
        }
    }

    /// One context per element when `path` resolves to an array; empty
    /// otherwise.
    #[must_use]
    pub fn select_each(&self, doc: &Document, path: &str) -> Vec<Self> {
        let list = self.select(path);
        let Some(items) = list.get_token(doc).and_then(|id| doc.array_items(id)) else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let child = Self::at(format!("{}[{index}]", list.path));
                child.bound.set(Some(*item));
                child
            })
            .collect()
    }

    /// The bound node, resolving (and caching) it if not yet bound.
    #[must_use]
    pub fn get_token(&self, doc: &Document) -> Option<NodeId> {
        if let Some(id) = self.bound.get() {
            if doc.contains(id) {
                return Some(id);
            }
        }
        let id = doc.get(&self.path);
        self.bound.set(id);
        id
    }

    /// Snapshot of the bound value. `$index` contexts yield the integer
    /// position within the nearest enclosing array.
    #[must_use]
    pub fn get_value(&self, doc: &Document) -> Option<Value> {
        let token = self.get_token(doc)?;
        if self.is_index {
            return index_within_array(doc, token).map(|index| Value::from(index as u64));
        }
        doc.value(token)
    }

    /// Write `value` at this context. Returns whether the bound node's
    /// identity changed, in which case dependent contexts must rebind.
    ///
    /// A missing node is created at the context's path.
    pub fn set_value(&self, doc: &mut Document, value: &Value) -> bool {
        if self.is_index {
            tracing::warn!(path = %self.path, "ignoring write through an $index binding");
            return false;
        }
        match self.get_token(doc) {
            Some(token) => {
                let new = doc.import(value);
                let rebind = doc.update_token_value(token, new);
                if rebind {
                    self.bound.set(Some(new));
                }
                rebind
            }
            None => match doc.set_path(&self.path, value) {
                Ok(created) => {
                    tracing::debug!(path = %self.path, "created missing view-model node");
                    self.bound.set(Some(created));
                    true
                }
                Err(err) => {
                    tracing::warn!(path = %self.path, %err, "cannot write view-model value");
                    false
                }
            },
        }
    }

    /// Whether a change reported at `changed_path` affects this context.
    ///
    /// Container-level changes affect this context and everything beneath
    /// the changed path; scalar changes only affect the exact path.
    #[must_use]
    pub fn is_binding_updated(&self, changed_path: &str, is_object_change: bool) -> bool {
        let mine = normalize_path(&self.path);
        let changed = normalize_path(changed_path);
        if is_object_change {
            is_path_prefix(&changed, &mine)
        } else {
            mine == changed
        }
    }

    /// Re-resolve the bound node against the current document.
    pub fn rebind(&self, doc: &Document) {
        self.bound.set(doc.get(&self.path));
    }
}

/// `prefix` equals `path` or names one of its ancestors (normalized form).
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() || prefix == path {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn index_within_array(doc: &Document, mut current: NodeId) -> Option<usize> {
    loop {
        let parent = doc.parent(current)?;
        if doc.array_items(parent).is_some() {
            return doc.index_in_parent(current);
        }
        current = parent;
    }
}

/// Drop the last segment of a resolved path (`a.b[2]` -> `a.b`).
fn pop_segment(path: &mut String) {
    if path.ends_with(']') {
        if let Some(open) = path.rfind('[') {
            path.truncate(open);
            return;
        }
    }
    match path.rfind('.') {
        Some(dot) => path.truncate(dot),
        None => path.clear(),
    }
}

fn push_segment(path: &mut String, segment: &str) {
    if !path.is_empty() && !segment.starts_with('[') {
        path.push('.');
    }
    path.push_str(segment);
}

/// Apply `raw` to `parent`, processing `$root`, `$parent`, `$data` and
/// `$index` directives.
fn resolve_path(parent: &str, raw: &str) -> (String, bool) {
    let mut path = parent.to_owned();
    let mut is_index = false;
    for segment in raw.trim().split('.') {
        match segment {
            "" | "$data" => {}
            "$root" => path.clear(),
            "$parent" => pop_segment(&mut path),
            "$index" => is_index = true,
            other => push_segment(&mut path, other),
        }
    }
    (path, is_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Document {
        Document::from_value(&json!({
            "a": {"b": 1, "foo": "x"},
            "x": 7,
            "items": [
                {"name": "apple", "tags": ["red", "green"]},
                {"name": "pear", "tags": []}
            ],
            "flag": true
        }))
    }

    #[test]
    fn parent_directive_pops_one_segment() {
        let ctx = BindingContext::at("a.b");
        assert_eq!(ctx.select("$parent.foo").path(), "a.foo");
        assert_eq!(ctx.select("$parent.$parent.x").path(), "x");
        assert_eq!(ctx.select("$parent.$parent.$parent").path(), "");
    }

    #[test]
    fn root_directive_resets() {
        let ctx = BindingContext::at("items[1].tags");
        assert_eq!(ctx.select("$root.x").path(), "x");
    }

    #[test]
    fn parent_pops_index_segments() {
        let ctx = BindingContext::at("items[1].name");
        assert_eq!(ctx.select("$parent").path(), "items[1]");
        assert_eq!(ctx.select("$parent.$parent").path(), "items");
    }

    #[test]
    fn data_is_inert() {
        let ctx = BindingContext::at("items[0]");
        assert_eq!(ctx.select("$data").path(), "items[0]");
        assert_eq!(ctx.select("$data.name").path(), "items[0].name");
        assert_eq!(ctx.select("").path(), "items[0]");
    }

    #[test]
    fn index_segments_attach_without_dot() {
        let ctx = BindingContext::at("items");
        assert_eq!(ctx.select("[1].name").path(), "items[1].name");
        assert_eq!(BindingContext::root().select("items[0]").path(), "items[0]");
    }

    #[test]
    fn equivalent_contexts_compare_equal() {
        let a = BindingContext::root().select("items[0].name");
        let b = BindingContext::at("items[0].tags").select("$parent.name");
        assert_eq!(a, b);
    }

    #[test]
    fn get_value_is_lazy() {
        let mut doc = Document::new();
        let ctx = BindingContext::root().select("later");
        assert_eq!(ctx.get_value(&doc), None);
        doc.set_path("later", &json!(3)).unwrap();
        assert_eq!(ctx.get_value(&doc), Some(json!(3)));
    }

    #[test]
    fn index_resolves_to_enclosing_array_position() {
        let doc = doc();
        let item = BindingContext::at("items[1]");
        let index = item.select("$index");
        assert!(index.is_index());
        assert_eq!(index.get_value(&doc), Some(json!(1)));

        let nested = BindingContext::at("items[1].name").select("$index");
        assert_eq!(nested.get_value(&doc), Some(json!(1)));
    }

    #[test]
    fn index_without_array_ancestor_is_absent() {
        let doc = doc();
        assert_eq!(BindingContext::at("a.b").select("$index").get_value(&doc), None);
    }

    #[test]
    fn select_each_yields_element_contexts() {
        let doc = doc();
        let each = BindingContext::root().select_each(&doc, "items");
        assert_eq!(each.len(), 2);
        assert_eq!(each[1].path(), "items[1]");
        assert_eq!(
            each[0].select("name").get_value(&doc),
            Some(json!("apple"))
        );
        assert!(BindingContext::root().select_each(&doc, "x").is_empty());
        assert!(BindingContext::root().select_each(&doc, "nope").is_empty());
    }

    #[test]
    fn set_scalar_keeps_binding() {
        let mut doc = doc();
        let ctx = BindingContext::root().select("a.b");
        let before = ctx.get_token(&doc);
        assert!(!ctx.set_value(&mut doc, &json!(5)));
        assert_eq!(ctx.get_token(&doc), before);
        assert_eq!(doc.to_value()["a"]["b"], json!(5));
    }

    #[test]
    fn set_container_reports_rebind_and_tracks_new_node() {
        let mut doc = doc();
        let ctx = BindingContext::root().select("x");
        assert!(ctx.set_value(&mut doc, &json!({"deep": 1})));
        assert_eq!(ctx.get_value(&doc), Some(json!({"deep": 1})));
    }

    #[test]
    fn set_missing_creates_node() {
        let mut doc = doc();
        let ctx = BindingContext::root().select("a.created");
        assert!(ctx.set_value(&mut doc, &json!("new")));
        assert_eq!(doc.to_value()["a"]["created"], json!("new"));
    }

    #[test]
    fn index_contexts_are_read_only() {
        let mut doc = doc();
        let ctx = BindingContext::at("items[0]").select("$index");
        assert!(!ctx.set_value(&mut doc, &json!(4)));
        assert_eq!(ctx.get_value(&doc), Some(json!(0)));
    }

    #[test]
    fn object_change_affects_descendants() {
        let ctx = BindingContext::at("items[2].name");
        assert!(ctx.is_binding_updated("items", true));
        assert!(ctx.is_binding_updated("items[2]", true));
        assert!(ctx.is_binding_updated("items.2.name", true));
        assert!(ctx.is_binding_updated("", true));
        assert!(!ctx.is_binding_updated("items[1]", true));
        assert!(!ctx.is_binding_updated("item", true));
    }

    #[test]
    fn scalar_change_affects_exact_path_only() {
        let ctx = BindingContext::at("items[2].name");
        assert!(ctx.is_binding_updated("items[2].name", false));
        assert!(ctx.is_binding_updated("items.2.name", false));
        assert!(!ctx.is_binding_updated("items[2]", false));
        assert!(!ctx.is_binding_updated("items", false));
    }

    #[test]
    fn rebind_follows_replaced_node() {
        let mut doc = doc();
        let ctx = BindingContext::root().select("a.b");
        let old = ctx.get_token(&doc).unwrap();
        let parent = doc.get("a").unwrap();
        let replacement = doc.import(&json!(99));
        doc.set_property(parent, "b", replacement).unwrap();
        assert!(!doc.contains(old));
        ctx.rebind(&doc);
        assert_eq!(ctx.get_token(&doc), Some(replacement));
    }
}
