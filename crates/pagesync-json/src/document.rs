//! Arena-backed document.
//!
//! # Ownership
//!
//! The arena owns every node. Containers hold child handles; children hold
//! their parent handle. Structural edits go through [`Document`] methods so
//! both directions stay in sync. Nodes built with [`Document::import`] or
//! [`Document::deep_clone`] start detached and live until attached and later
//! removed, or until passed to [`Document::remove`] directly.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::node::{Node, NodeId, NodeKind, Scalar};
use crate::path::{InsertTarget, insert_target, normalize_path, segments};

/// Errors from path-addressed edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// No node exists at the path.
    NotFound(String),
    /// The node at the path cannot hold children under the requested key.
    NotAContainer(String),
    /// Array index beyond the append position.
    IndexOutOfRange { path: String, index: usize },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(p) => write!(f, "no node at path '{p}'"),
            Self::NotAContainer(p) => write!(f, "node at path '{p}' is not a container"),
            Self::IndexOutOfRange { path, index } => {
                write!(f, "index {index} out of range for array at '{path}'")
            }
        }
    }
}

impl std::error::Error for PathError {}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

enum PathPart<'a> {
    Key(&'a str),
    Index(usize),
}

/// A JSON value tree with parent links.
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document whose root is an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::from_value(&Value::Object(Map::new()))
    }

    /// Build a document from a JSON value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        doc.root = doc.import(value);
        doc
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Whether `id` refers to a live node.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    #[inline]
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(Node::kind)
    }

    #[inline]
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    #[must_use]
    pub fn scalar(&self, id: NodeId) -> Option<&Scalar> {
        self.node(id).and_then(Node::as_scalar)
    }

    /// Child handles of an array node.
    #[must_use]
    pub fn array_items(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.kind(id)? {
            NodeKind::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Keyed children of an object node.
    #[must_use]
    pub fn object_entries(&self, id: NodeId) -> Option<&IndexMap<String, NodeId>> {
        match self.kind(id)? {
            NodeKind::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Number of children (0 for scalars and stale handles).
    #[must_use]
    pub fn len(&self, id: NodeId) -> usize {
        match self.kind(id) {
            Some(NodeKind::Object(map)) => map.len(),
            Some(NodeKind::Array(items)) => items.len(),
            _ => 0,
        }
    }

    /// Number of live nodes in the arena, attached or not.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    // -----------------------------------------------------------------------
    // Arena plumbing
    // -----------------------------------------------------------------------

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let node = Node { parent: None, kind };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Allocate a container and point its children back at it.
    fn alloc_with_children(&mut self, kind: NodeKind) -> NodeId {
        let children: Vec<NodeId> = match &kind {
            NodeKind::Object(map) => map.values().copied().collect(),
            NodeKind::Array(items) => items.clone(),
            NodeKind::Scalar(_) => Vec::new(),
        };
        let id = self.alloc(kind);
        for child in children {
            self.set_parent(child, Some(id));
        }
        id
    }

    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(node) = self.node_mut(id) {
            node.parent = parent;
        }
    }

    /// Free a detached subtree.
    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation {
                continue;
            }
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                match node.kind {
                    NodeKind::Object(map) => stack.extend(map.into_values()),
                    NodeKind::Array(items) => stack.extend(items),
                    NodeKind::Scalar(_) => {}
                }
            }
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.parent(id) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// Unlink `id` from its container. The node stays alive.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        if let Some(container) = self.node_mut(parent) {
            match &mut container.kind {
                NodeKind::Object(map) => map.retain(|_, child| *child != id),
                NodeKind::Array(items) => items.retain(|child| *child != id),
                NodeKind::Scalar(_) => {}
            }
        }
        self.set_parent(id, None);
        true
    }

    /// Prepare `child` to be owned by `parent`, detaching it from any
    /// previous owner so it never has two.
    fn adopt(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(child != self.root, "the document root cannot be re-parented");
        debug_assert!(
            !self.is_ancestor_or_self(child, parent),
            "attaching a node beneath itself would form a cycle"
        );
        if self.parent(child).is_some() {
            tracing::debug!(node = child.index, "re-parenting attached node");
            self.detach(child);
        }
        self.set_parent(child, Some(parent));
    }

    // -----------------------------------------------------------------------
    // Conversion
    // -----------------------------------------------------------------------

    /// Build a detached subtree from a JSON value.
    pub fn import(&mut self, value: &Value) -> NodeId {
        match value {
            Value::Array(items) => {
                let children: Vec<NodeId> = items.iter().map(|item| self.import(item)).collect();
                self.alloc_with_children(NodeKind::Array(children))
            }
            Value::Object(map) => {
                let children: IndexMap<String, NodeId> = map
                    .iter()
                    .map(|(key, item)| (key.clone(), self.import(item)))
                    .collect();
                self.alloc_with_children(NodeKind::Object(children))
            }
            scalar => self.alloc(NodeKind::Scalar(
                Scalar::from_value(scalar).unwrap_or(Scalar::Null),
            )),
        }
    }

    /// Snapshot a subtree as a JSON value.
    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<Value> {
        Some(match self.kind(id)? {
            NodeKind::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.value(*child).unwrap_or(Value::Null));
                }
                Value::Object(out)
            }
            NodeKind::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|child| self.value(*child).unwrap_or(Value::Null))
                    .collect(),
            ),
            NodeKind::Scalar(s) => s.to_value(),
        })
    }

    /// Snapshot the whole document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        self.value(self.root).unwrap_or(Value::Null)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Direct child by key (objects) or numeric index (arrays).
    #[must_use]
    pub fn child(&self, id: NodeId, segment: &str) -> Option<NodeId> {
        match self.kind(id)? {
            NodeKind::Object(map) => map.get(segment).copied(),
            NodeKind::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index).copied()),
            NodeKind::Scalar(_) => None,
        }
    }

    /// Resolve `path` relative to `from`. The empty path selects `from`.
    #[must_use]
    pub fn select(&self, from: NodeId, path: &str) -> Option<NodeId> {
        if !self.contains(from) {
            return None;
        }
        let normalized = normalize_path(path);
        let mut current = from;
        for segment in segments(&normalized) {
            current = self.child(current, segment)?;
        }
        Some(current)
    }

    /// Resolve `path` from the root.
    #[inline]
    #[must_use]
    pub fn get(&self, path: &str) -> Option<NodeId> {
        self.select(self.root, path)
    }

    /// Position of `id` inside its parent array.
    #[must_use]
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.array_items(parent)?
            .iter()
            .position(|child| *child == id)
    }

    /// Path from the top of this node's tree: keys dot-separated, array
    /// positions bracketed (`items[2].name`).
    #[must_use]
    pub fn path(&self, id: NodeId) -> String {
        let mut parts: Vec<PathPart<'_>> = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            match self.kind(parent) {
                Some(NodeKind::Object(map)) => {
                    if let Some((key, _)) = map.iter().find(|(_, child)| **child == current) {
                        parts.push(PathPart::Key(key));
                    }
                }
                Some(NodeKind::Array(items)) => {
                    if let Some(index) = items.iter().position(|child| *child == current) {
                        parts.push(PathPart::Index(index));
                    }
                }
                _ => {}
            }
            current = parent;
        }

        let mut out = String::new();
        for part in parts.iter().rev() {
            match part {
                PathPart::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathPart::Index(index) => {
                    out.push('[');
                    out.push_str(&index.to_string());
                    out.push(']');
                }
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Set `key` on an object node. A previous value under `key` is freed.
    pub fn set_property(&mut self, object: NodeId, key: &str, child: NodeId) -> Result<(), PathError> {
        if !matches!(self.kind(object), Some(NodeKind::Object(_))) {
            return Err(PathError::NotAContainer(self.path(object)));
        }
        if !self.contains(child) {
            return Err(PathError::NotFound(format!("{}.{key}", self.path(object))));
        }
        self.adopt(object, child);
        let previous = match self.node_mut(object).map(|node| &mut node.kind) {
            Some(NodeKind::Object(map)) => map.insert(key.to_owned(), child),
            _ => None,
        };
        if let Some(previous) = previous.filter(|previous| *previous != child) {
            self.set_parent(previous, None);
            self.release(previous);
        }
        Ok(())
    }

    /// Append to an array node.
    pub fn push(&mut self, array: NodeId, child: NodeId) -> Result<(), PathError> {
        let len = self.len(array);
        self.insert_at(array, len, child)
    }

    /// Insert into an array node at `index` (`index == len` appends).
    pub fn insert_at(&mut self, array: NodeId, index: usize, child: NodeId) -> Result<(), PathError> {
        if !matches!(self.kind(array), Some(NodeKind::Array(_))) {
            return Err(PathError::NotAContainer(self.path(array)));
        }
        if index > self.len(array) {
            return Err(PathError::IndexOutOfRange {
                path: self.path(array),
                index,
            });
        }
        self.adopt(array, child);
        if let Some(NodeKind::Array(items)) = self.node_mut(array).map(|node| &mut node.kind) {
            let index = index.min(items.len());
            items.insert(index, child);
        }
        Ok(())
    }

    /// Detach and free a node and its subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) {
            return false;
        }
        self.detach(id);
        self.release(id);
        true
    }

    /// Put `new` where `old` is (or make it the root) and free `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> bool {
        if old == new || !self.contains(old) || !self.contains(new) {
            return false;
        }
        debug_assert!(
            !self.is_ancestor_or_self(new, old),
            "cannot replace a node with one of its ancestors"
        );
        if self.parent(new).is_some() {
            self.detach(new);
        }
        match self.parent(old) {
            Some(parent) => {
                if let Some(container) = self.node_mut(parent) {
                    match &mut container.kind {
                        NodeKind::Object(map) => {
                            for child in map.values_mut() {
                                if *child == old {
                                    *child = new;
                                }
                            }
                        }
                        NodeKind::Array(items) => {
                            for child in items.iter_mut() {
                                if *child == old {
                                    *child = new;
                                }
                            }
                        }
                        NodeKind::Scalar(_) => {}
                    }
                }
                self.set_parent(new, Some(parent));
            }
            None if old == self.root => self.root = new,
            None => {}
        }
        self.set_parent(old, None);
        self.release(old);
        true
    }

    /// Copy a subtree. The copy is detached.
    pub fn deep_clone(&mut self, id: NodeId) -> Option<NodeId> {
        let kind = self.kind(id)?.clone();
        Some(match kind {
            NodeKind::Object(map) => {
                let mut children = IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    if let Some(copy) = self.deep_clone(child) {
                        children.insert(key, copy);
                    }
                }
                self.alloc_with_children(NodeKind::Object(children))
            }
            NodeKind::Array(items) => {
                let children: Vec<NodeId> = items
                    .into_iter()
                    .filter_map(|child| self.deep_clone(child))
                    .collect();
                self.alloc_with_children(NodeKind::Array(children))
            }
            NodeKind::Scalar(scalar) => self.alloc(NodeKind::Scalar(scalar)),
        })
    }

    /// Structural equality. Scalars compare by tag and value, containers by
    /// count and then child by child.
    #[must_use]
    pub fn deep_equals(&self, a: NodeId, b: NodeId) -> bool {
        match (self.kind(a), self.kind(b)) {
            (Some(NodeKind::Scalar(x)), Some(NodeKind::Scalar(y))) => x == y,
            (Some(NodeKind::Array(x)), Some(NodeKind::Array(y))) => {
                x.len() == y.len() && x.iter().zip(y).all(|(p, q)| self.deep_equals(*p, *q))
            }
            (Some(NodeKind::Object(x)), Some(NodeKind::Object(y))) => {
                x.len() == y.len()
                    && x.iter()
                        .all(|(key, p)| y.get(key).is_some_and(|q| self.deep_equals(*p, *q)))
            }
            _ => false,
        }
    }

    /// Structural equality against a detached JSON value.
    #[must_use]
    pub fn equals_value(&self, id: NodeId, value: &Value) -> bool {
        match (self.kind(id), value) {
            (Some(NodeKind::Scalar(s)), other) => {
                Scalar::from_value(other).is_some_and(|o| *s == o)
            }
            (Some(NodeKind::Array(items)), Value::Array(values)) => {
                items.len() == values.len()
                    && items
                        .iter()
                        .zip(values)
                        .all(|(child, v)| self.equals_value(*child, v))
            }
            (Some(NodeKind::Object(map)), Value::Object(values)) => {
                map.len() == values.len()
                    && map.iter().all(|(key, child)| {
                        values.get(key).is_some_and(|v| self.equals_value(*child, v))
                    })
            }
            _ => false,
        }
    }

    /// Move the content of detached node `new` into the slot occupied by
    /// `current`.
    ///
    /// Two scalars: the value is copied in place and `current` keeps its
    /// identity (returns `false`). Anything else: `current` is replaced
    /// wholesale, so contexts bound to it must rebind (returns `true`).
    pub fn update_token_value(&mut self, current: NodeId, new: NodeId) -> bool {
        let incoming = match self.kind(new) {
            Some(NodeKind::Scalar(scalar)) => Some(scalar.clone()),
            Some(_) => None,
            None => return false,
        };
        if let Some(scalar) = incoming {
            if let Some(NodeKind::Scalar(slot)) = self.node_mut(current).map(|node| &mut node.kind) {
                *slot = scalar;
                if self.parent(new).is_none() && new != self.root {
                    self.release(new);
                }
                return false;
            }
        }
        if !self.replace(current, new) {
            tracing::warn!(node = current.index, "update target is no longer in the document");
            return false;
        }
        true
    }

    /// [`update_token_value`](Self::update_token_value) from a JSON value.
    pub fn update_value(&mut self, current: NodeId, value: &Value) -> bool {
        if !self.contains(current) {
            return false;
        }
        let new = self.import(value);
        self.update_token_value(current, new)
    }

    /// Insert `value` at `path`, creating the final segment.
    ///
    /// Paths ending in an index marker append to the array; a dotted path
    /// sets a property (or an array slot) on its parent; a bare key sets a
    /// root property.
    pub fn set_path(&mut self, path: &str, value: &Value) -> Result<NodeId, PathError> {
        let (parent, key) = match insert_target(path) {
            InsertTarget::ArrayAppend { array_path } => {
                let array = self
                    .get(array_path)
                    .ok_or_else(|| PathError::NotFound(array_path.to_owned()))?;
                if !matches!(self.kind(array), Some(NodeKind::Array(_))) {
                    return Err(PathError::NotAContainer(array_path.to_owned()));
                }
                let child = self.import(value);
                self.push(array, child)?;
                return Ok(child);
            }
            InsertTarget::Property { parent_path, key } => {
                let parent = self
                    .get(parent_path)
                    .ok_or_else(|| PathError::NotFound(parent_path.to_owned()))?;
                (parent, key)
            }
            InsertTarget::RootProperty { key } => (self.root, key),
        };

        match self.kind(parent) {
            Some(NodeKind::Object(_)) => {
                let child = self.import(value);
                self.set_property(parent, key, child)?;
                Ok(child)
            }
            Some(NodeKind::Array(items)) => {
                let len = items.len();
                let index = key
                    .parse::<usize>()
                    .map_err(|_| PathError::NotAContainer(self.path(parent)))?;
                if index > len {
                    return Err(PathError::IndexOutOfRange {
                        path: self.path(parent),
                        index,
                    });
                }
                let child = self.import(value);
                if index == len {
                    self.push(parent, child)?;
                } else if let Some(old) = self.child(parent, key) {
                    self.replace(old, child);
                }
                Ok(child)
            }
            _ => Err(PathError::NotAContainer(self.path(parent))),
        }
    }
}
