#![forbid(unsafe_code)]

//! Binding records registered against a [`ViewModel`](crate::ViewModel).
//!
//! A binding is data: a context or template plus the getter/setter pair a
//! platform control exposes. Controls implement [`ViewGetter`] and
//! [`ViewSetter`] directly, or pass closures.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Setter receives `None` | Bound path missing from the document | Control decides (usually clears) |
//! | Binding never refreshes | Control dropped without unregistering | Stale setter keeps being called |

use std::fmt;
use std::rc::Rc;

use pagesync_json::Document;
use serde_json::Value;

use crate::context::BindingContext;
use crate::delta::BindingUpdate;
use crate::property::PropertyValue;

/// Reads the current value out of a platform control.
pub trait ViewGetter {
    fn get(&self) -> Value;
}

impl<F> ViewGetter for F
where
    F: Fn() -> Value,
{
    fn get(&self) -> Value {
        self()
    }
}

/// Pushes a document value into a platform control.
pub trait ViewSetter {
    fn set(&self, value: Option<&Value>);
}

impl<F> ViewSetter for F
where
    F: Fn(Option<&Value>),
{
    fn set(&self, value: Option<&Value>) {
        self(value);
    }
}

/// Handle for a registered [`ValueBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueBindingId(pub(crate) u64);

/// Handle for a registered [`PropertyBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyBindingId(pub(crate) u64);

/// Either kind of registered binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingRef {
    Value(ValueBindingId),
    Property(PropertyBindingId),
}

impl From<ValueBindingId> for BindingRef {
    fn from(id: ValueBindingId) -> Self {
        Self::Value(id)
    }
}

impl From<PropertyBindingId> for BindingRef {
    fn from(id: PropertyBindingId) -> Self {
        Self::Property(id)
    }
}

/// A resolved setter call, applied once the document is no longer borrowed.
pub(crate) struct ViewWrite {
    setter: Rc<dyn ViewSetter>,
    value: Option<Value>,
}

impl ViewWrite {
    pub(crate) fn apply(self) {
        self.setter.set(self.value.as_ref());
    }
}

/// Two-way binding between one control value and one document path.
pub struct ValueBinding {
    context: BindingContext,
    getter: Rc<dyn ViewGetter>,
    setter: Option<Rc<dyn ViewSetter>>,
    dirty: bool,
}

impl fmt::Debug for ValueBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueBinding")
            .field("path", &self.context.path())
            .field("has_setter", &self.setter.is_some())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl ValueBinding {
    #[must_use]
    pub fn new(context: BindingContext, getter: impl ViewGetter + 'static) -> Self {
        Self {
            context,
            getter: Rc::new(getter),
            setter: None,
            dirty: false,
        }
    }

    #[must_use]
    pub fn with_setter(mut self, setter: impl ViewSetter + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &BindingContext {
        &self.context
    }

    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Current value of the control.
    #[must_use]
    pub fn read_view(&self) -> Value {
        self.getter.get()
    }

    pub(crate) fn getter(&self) -> Rc<dyn ViewGetter> {
        Rc::clone(&self.getter)
    }

    /// Invoke the setter with the bound document value.
    pub fn update_view_from_view_model(&self, doc: &Document) {
        if let Some(write) = self.prepare_view_update(doc) {
            write.apply();
        }
    }

    pub(crate) fn prepare_view_update(&self, doc: &Document) -> Option<ViewWrite> {
        let setter = self.setter.clone()?;
        Some(ViewWrite {
            setter,
            value: self.context.get_value(doc),
        })
    }

    pub(crate) fn is_affected_by(&self, update: &BindingUpdate) -> bool {
        self.context.is_binding_updated(&update.path, update.rebind)
    }

    pub(crate) fn rebind(&self, doc: &Document) {
        self.context.rebind(doc);
    }
}

/// One-way binding from a token template to a control property.
pub struct PropertyBinding {
    value: PropertyValue,
    setter: Option<Rc<dyn ViewSetter>>,
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("template", &self.value.source())
            .field("has_setter", &self.setter.is_some())
            .finish()
    }
}

impl PropertyBinding {
    #[must_use]
    pub fn new(value: PropertyValue) -> Self {
        Self {
            value,
            setter: None,
        }
    }

    #[must_use]
    pub fn with_setter(mut self, setter: impl ViewSetter + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    #[must_use]
    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    /// Re-expand the template, hand the result to the setter (if any) and
    /// return it.
    pub fn update_view_from_view_model(&self, doc: &Document) -> Option<Value> {
        let resolved = self.value.expand(doc);
        if let Some(setter) = &self.setter {
            setter.set(resolved.as_ref());
        }
        resolved
    }

    pub(crate) fn prepare_view_update(&self, doc: &Document) -> Option<ViewWrite> {
        let setter = self.setter.clone()?;
        Some(ViewWrite {
            setter,
            value: self.value.expand(doc),
        })
    }

    /// Only live tokens can be affected; one-time tokens never re-read.
    pub(crate) fn is_affected_by(&self, update: &BindingUpdate) -> bool {
        self.value
            .tokens()
            .iter()
            .filter(|t| !t.is_one_time())
            .any(|t| t.context().is_binding_updated(&update.path, update.rebind))
    }

    pub(crate) fn rebind(&self, doc: &Document) {
        self.value.rebind(doc);
    }
}
