#![forbid(unsafe_code)]

//! The page view-model: one document plus the bindings that mirror it.
//!
//! [`ViewModel`] is a cheap, cloneable, single-threaded handle. Controls keep
//! a clone and call back into it from their change handlers.
//!
//! # Update passes
//!
//! Every programmatic push into controls runs inside an [`UpdatePass`].
//! Change events a control raises while a pass is active are not user
//! edits, so [`ViewModel::push_view_to_document`] ignores them. Platforms
//! that deliver change events asynchronously can capture
//! [`ViewModel::pass_stamp`] when the event is raised and hand it to
//! [`ViewModel::push_stamped_view_to_document`] on delivery.
//!
//! # Invariants
//!
//! 1. Setters are never invoked while the document is borrowed, so a setter
//!    may call any `ViewModel` method.
//! 2. A binding is dirty only after a user-driven write changed the
//!    document.
//! 3. Removals in a delta batch are applied after every other record, so
//!    paths later in the batch still address the pre-removal shape.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `update` for a missing path | Client and server disagree on shape | Logged at warn, record skipped |
//! | `add` where a node exists | Client and server disagree on shape | Logged at warn, notification kept |
//! | `remove` for a missing path | Client and server disagree on shape | Logged at warn, record skipped |
//! | Unknown binding id | Control outlived its registration | Logged at warn, no-op |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use pagesync_json::{Document, NodeId};
use serde_json::Value;

use crate::binding::{
    BindingRef, PropertyBinding, PropertyBindingId, ValueBinding, ValueBindingId, ViewWrite,
};
use crate::context::BindingContext;
use crate::delta::{BindingUpdate, ChangeKind, DeltaRecord};
use crate::property::PropertyValue;

type Registry<K, V> = IndexMap<K, V, ahash::RandomState>;

/// Identifies the update pass during which a control event was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassStamp(u64);

struct State {
    document: Document,
    root: BindingContext,
    value_bindings: Registry<ValueBindingId, ValueBinding>,
    property_bindings: Registry<PropertyBindingId, PropertyBinding>,
    next_id: u64,
}

impl State {
    fn new(document: Document) -> Self {
        Self {
            document,
            root: BindingContext::root(),
            value_bindings: Registry::default(),
            property_bindings: Registry::default(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

struct Inner {
    state: RefCell<State>,
    pass: Cell<u64>,
    updating: Cell<bool>,
}

/// RAII guard marking a programmatic view update.
///
/// Passes nest; the outermost guard ends the pass on drop.
#[must_use = "the update pass ends when the guard is dropped"]
pub struct UpdatePass {
    inner: Rc<Inner>,
    previous: bool,
}

impl UpdatePass {
    fn begin(inner: &Rc<Inner>) -> Self {
        let previous = inner.updating.replace(true);
        if !previous {
            inner.pass.set(inner.pass.get() + 1);
        }
        Self {
            inner: Rc::clone(inner),
            previous,
        }
    }
}

impl Drop for UpdatePass {
    fn drop(&mut self) {
        self.inner.updating.set(self.previous);
    }
}

/// Shared handle to a page view-model.
#[derive(Clone)]
pub struct ViewModel {
    inner: Rc<Inner>,
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ViewModel");
        if let Ok(state) = self.inner.state.try_borrow() {
            s.field("nodes", &state.document.live_nodes())
                .field("value_bindings", &state.value_bindings.len())
                .field("property_bindings", &state.property_bindings.len());
        }
        s.field("pass", &self.inner.pass.get())
            .field("updating", &self.inner.updating.get())
            .finish()
    }
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewModel {
    /// An empty view-model (`{}`) with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::from_document(Document::new())
    }

    #[must_use]
    pub fn from_document(document: Document) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(State::new(document)),
                pass: Cell::new(0),
                updating: Cell::new(false),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Document lifecycle
    // -----------------------------------------------------------------------

    /// Install a new page document, dropping every registered binding.
    pub fn initialize(&self, document: &Value) {
        let mut state = self.inner.state.borrow_mut();
        let dropped = state.value_bindings.len() + state.property_bindings.len();
        let next_id = state.next_id;
        *state = State {
            next_id,
            ..State::new(Document::from_value(document))
        };
        tracing::debug!(dropped, "view model initialized");
    }

    /// Swap in a resynced document, keeping bindings and rebinding them to
    /// the new nodes. The caller is expected to refresh afterwards.
    pub fn replace_document(&self, document: &Value) {
        let mut state = self.inner.state.borrow_mut();
        state.document = Document::from_value(document);
        state.root = BindingContext::root();
        let State {
            document,
            value_bindings,
            property_bindings,
            ..
        } = &*state;
        for binding in value_bindings.values() {
            binding.rebind(document);
        }
        for binding in property_bindings.values() {
            binding.rebind(document);
        }
        tracing::debug!(
            value_bindings = value_bindings.len(),
            property_bindings = property_bindings.len(),
            "view model document replaced"
        );
    }

    /// Apply a server delta batch and return the resulting notifications.
    /// When `refresh` is set, affected bindings are refreshed before
    /// returning.
    pub fn apply_server_deltas(&self, deltas: &[DeltaRecord], refresh: bool) -> Vec<BindingUpdate> {
        let updates = {
            let _span = tracing::debug_span!("apply_server_deltas", count = deltas.len()).entered();
            let mut state = self.inner.state.borrow_mut();
            apply_deltas(&mut state.document, deltas)
        };
        if refresh {
            self.refresh_bindings(Some(&updates), None);
        }
        updates
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub fn register_value_binding(&self, binding: ValueBinding) -> ValueBindingId {
        let mut state = self.inner.state.borrow_mut();
        let id = ValueBindingId(state.allocate_id());
        state.value_bindings.insert(id, binding);
        id
    }

    pub fn register_property_binding(&self, binding: PropertyBinding) -> PropertyBindingId {
        let mut state = self.inner.state.borrow_mut();
        let id = PropertyBindingId(state.allocate_id());
        state.property_bindings.insert(id, binding);
        id
    }

    /// Remove a binding when its control is torn down.
    pub fn unregister_value_binding(&self, id: ValueBindingId) -> Option<ValueBinding> {
        self.inner.state.borrow_mut().value_bindings.shift_remove(&id)
    }

    pub fn unregister_property_binding(&self, id: PropertyBindingId) -> Option<PropertyBinding> {
        self.inner
            .state
            .borrow_mut()
            .property_bindings
            .shift_remove(&id)
    }

    #[must_use]
    pub fn value_binding_count(&self) -> usize {
        self.inner.state.borrow().value_bindings.len()
    }

    #[must_use]
    pub fn property_binding_count(&self) -> usize {
        self.inner.state.borrow().property_bindings.len()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn root_context(&self) -> BindingContext {
        self.inner.state.borrow().root.clone()
    }

    #[must_use]
    pub fn value_at(&self, context: &BindingContext) -> Option<Value> {
        context.get_value(&self.inner.state.borrow().document)
    }

    /// Snapshot of the whole document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        self.inner.state.borrow().document.to_value()
    }

    /// Run `f` against the document. `f` must not call back into this
    /// view-model mutably.
    pub fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.inner.state.borrow().document)
    }

    /// Parse a template against the current document.
    #[must_use]
    pub fn parse_property(&self, template: &str, context: &BindingContext) -> PropertyValue {
        self.with_document(|doc| PropertyValue::parse(template, context, doc))
    }

    /// Resolve a template once without registering anything.
    #[must_use]
    pub fn resolve_property(&self, template: &str, context: &BindingContext) -> Option<Value> {
        self.with_document(|doc| {
            PropertyBinding::new(PropertyValue::parse(template, context, doc))
                .update_view_from_view_model(doc)
        })
    }

    /// Node currently bound by the value binding `id`.
    #[must_use]
    pub fn bound_node(&self, id: ValueBindingId) -> Option<NodeId> {
        let state = self.inner.state.borrow();
        let binding = state.value_bindings.get(&id)?;
        binding.context().get_token(&state.document)
    }

    // -----------------------------------------------------------------------
    // View -> document
    // -----------------------------------------------------------------------

    /// Whether a programmatic update pass is running.
    #[inline]
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.inner.updating.get()
    }

    /// Stamp for an event raised right now, or `None` outside a pass.
    #[must_use]
    pub fn pass_stamp(&self) -> Option<PassStamp> {
        self.is_updating().then(|| PassStamp(self.inner.pass.get()))
    }

    /// Start an update pass explicitly. Useful when a platform layer
    /// rebuilds controls and wants their initial change events ignored.
    pub fn begin_update_pass(&self) -> UpdatePass {
        UpdatePass::begin(&self.inner)
    }

    /// Read the control behind `id` and write its value into the document.
    pub fn update_view_model_from_view(&self, id: ValueBindingId) -> bool {
        let getter = match self.inner.state.borrow().value_bindings.get(&id) {
            Some(binding) => binding.getter(),
            None => {
                tracing::warn!(?id, "update from unknown value binding");
                return false;
            }
        };
        let value = getter.get();
        self.push_view_to_document(id, value)
    }

    /// Write a control value into the document and mark the binding dirty.
    ///
    /// No-op during an update pass or when the value already matches the
    /// document. Otherwise every other binding affected by the change is
    /// refreshed. Returns whether the document changed.
    pub fn push_view_to_document(&self, id: ValueBindingId, value: Value) -> bool {
        if self.is_updating() {
            tracing::trace!(?id, "ignoring view change raised by an update pass");
            return false;
        }
        let update = {
            let mut state = self.inner.state.borrow_mut();
            let State {
                document,
                value_bindings,
                ..
            } = &mut *state;
            let Some(binding) = value_bindings.get_mut(&id) else {
                tracing::warn!(?id, "view change from unknown value binding");
                return false;
            };
            let context = binding.context();
            if context.is_index() {
                tracing::warn!(path = %context.path(), "ignoring view change bound to $index");
                return false;
            }
            if context
                .get_token(document)
                .is_some_and(|token| document.equals_value(token, &value))
            {
                return false;
            }
            let rebind = context.set_value(document, &value);
            let update = BindingUpdate::new(context.path(), rebind);
            binding.set_dirty(true);
            update
        };
        self.refresh_bindings(Some(std::slice::from_ref(&update)), Some(BindingRef::Value(id)));
        true
    }

    /// [`push_view_to_document`](Self::push_view_to_document) for an event
    /// stamped when it was raised. Events raised during any update pass are
    /// dropped, however late they arrive.
    pub fn push_stamped_view_to_document(
        &self,
        id: ValueBindingId,
        value: Value,
        stamp: Option<PassStamp>,
    ) -> bool {
        if let Some(PassStamp(pass)) = stamp {
            tracing::trace!(?id, pass, "dropping view change stamped by an update pass");
            return false;
        }
        self.push_view_to_document(id, value)
    }

    // -----------------------------------------------------------------------
    // Document -> view
    // -----------------------------------------------------------------------

    /// Push document values into controls.
    ///
    /// With `updates == None` every binding is refreshed. Otherwise only
    /// bindings matching at least one update are refreshed, rebinding first
    /// when a matching update changed node identity. `exclude` is skipped.
    pub fn refresh_bindings(&self, updates: Option<&[BindingUpdate]>, exclude: Option<BindingRef>) {
        let writes = {
            let state = self.inner.state.borrow();
            let _span = tracing::debug_span!(
                "refresh_bindings",
                scoped = updates.is_some(),
                value_bindings = state.value_bindings.len(),
                property_bindings = state.property_bindings.len()
            )
            .entered();
            let doc = &state.document;
            let mut writes = Vec::new();

            for (id, binding) in &state.value_bindings {
                if exclude == Some(BindingRef::Value(*id)) {
                    continue;
                }
                if let Some(updates) = updates {
                    match match_updates(updates, |u| binding.is_affected_by(u)) {
                        Match::None => continue,
                        Match::Rebind => binding.rebind(doc),
                        Match::Refresh => {}
                    }
                }
                writes.extend(binding.prepare_view_update(doc));
            }

            for (id, binding) in &state.property_bindings {
                if exclude == Some(BindingRef::Property(*id)) {
                    continue;
                }
                if let Some(updates) = updates {
                    match match_updates(updates, |u| binding.is_affected_by(u)) {
                        Match::None => continue,
                        Match::Rebind => binding.rebind(doc),
                        Match::Refresh => {}
                    }
                }
                writes.extend(binding.prepare_view_update(doc));
            }
            writes
        };
        self.apply_writes(writes);
    }

    /// Refresh one binding, typically right after registering it.
    pub fn refresh_binding(&self, binding: impl Into<BindingRef>) {
        let binding = binding.into();
        let write = {
            let state = self.inner.state.borrow();
            match binding {
                BindingRef::Value(id) => state
                    .value_bindings
                    .get(&id)
                    .and_then(|b| b.prepare_view_update(&state.document)),
                BindingRef::Property(id) => state
                    .property_bindings
                    .get(&id)
                    .and_then(|b| b.prepare_view_update(&state.document)),
            }
        };
        self.apply_writes(write.into_iter().collect());
    }

    fn apply_writes(&self, writes: Vec<ViewWrite>) {
        if writes.is_empty() {
            return;
        }
        let _pass = UpdatePass::begin(&self.inner);
        for write in writes {
            write.apply();
        }
    }

    // -----------------------------------------------------------------------
    // Dirty tracking
    // -----------------------------------------------------------------------

    /// Whether any value binding holds an unsent user edit.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner
            .state
            .borrow()
            .value_bindings
            .values()
            .any(ValueBinding::is_dirty)
    }

    /// Current document values for every dirty binding, keyed by path.
    /// Clears the dirty flags.
    pub fn collect_dirty_deltas(&self) -> IndexMap<String, Value> {
        let mut state = self.inner.state.borrow_mut();
        let State {
            document,
            value_bindings,
            ..
        } = &mut *state;
        let mut deltas = IndexMap::new();
        for binding in value_bindings.values_mut().filter(|b| b.is_dirty()) {
            let value = binding.context().get_value(document).unwrap_or(Value::Null);
            deltas.insert(binding.context().path().to_owned(), value);
            binding.set_dirty(false);
        }
        if !deltas.is_empty() {
            tracing::debug!(count = deltas.len(), "collected dirty view-model deltas");
        }
        deltas
    }
}

enum Match {
    None,
    Refresh,
    Rebind,
}

fn match_updates(updates: &[BindingUpdate], affected: impl Fn(&BindingUpdate) -> bool) -> Match {
    let mut result = Match::None;
    for update in updates.iter().filter(|u| affected(u)) {
        if update.rebind {
            return Match::Rebind;
        }
        result = Match::Refresh;
    }
    result
}

fn apply_deltas(doc: &mut Document, deltas: &[DeltaRecord]) -> Vec<BindingUpdate> {
    let mut updates = Vec::with_capacity(deltas.len());
    let mut removals = Vec::new();

    for delta in deltas {
        let path = delta.path.as_str();
        match delta.change {
            ChangeKind::Object => updates.push(BindingUpdate::new(path, false)),
            ChangeKind::Update => match doc.get(path) {
                Some(node) => {
                    let value = delta.value.clone().unwrap_or(Value::Null);
                    let rebind = doc.update_value(node, &value);
                    updates.push(BindingUpdate::new(path, rebind));
                }
                None => tracing::warn!(path, "update delta for a path not in the view model"),
            },
            ChangeKind::Add => {
                updates.push(BindingUpdate::new(path, true));
                if doc.get(path).is_some() {
                    tracing::warn!(path, "add delta for a path that already exists");
                    continue;
                }
                let value = delta.value.clone().unwrap_or(Value::Null);
                if let Err(err) = doc.set_path(path, &value) {
                    tracing::warn!(path, %err, "cannot apply add delta");
                }
            }
            ChangeKind::Remove => {
                updates.push(BindingUpdate::new(path, true));
                match doc.get(path) {
                    Some(node) => removals.push(node),
                    None => tracing::warn!(path, "remove delta for a path not in the view model"),
                }
            }
        }
    }

    for node in removals {
        if !doc.remove(node) {
            tracing::warn!(node = node.index(), "removal target already gone");
        }
    }
    updates
}
