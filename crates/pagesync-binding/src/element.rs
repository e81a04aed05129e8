#![forbid(unsafe_code)]

//! Glue between view element JSON and the [`ViewModel`].
//!
//! Platform control adapters use [`ElementBinder`] while constructing a
//! control from its element description:
//!
//! ```json
//! {
//!   "control": "edit",
//!   "caption": "Hello {user.name}",
//!   "binding": { "with": "user", "value": "email", "onChange": "validate" }
//! }
//! ```
//!
//! - `binding.with` shifts the element's context.
//! - `binding.<attr>` names the path a two-way value binds to.
//! - `binding.foreach` repeats the element once per array item.
//! - Any other attribute may be a literal or a token template.

use serde_json::Value;

use crate::binding::{
    PropertyBinding, PropertyBindingId, ValueBinding, ValueBindingId, ViewGetter, ViewSetter,
};
use crate::command::CommandSpec;
use crate::context::BindingContext;
use crate::property::PropertyValue;
use crate::view_model::ViewModel;

/// Binds element attributes for one page.
#[derive(Debug, Clone)]
pub struct ElementBinder {
    view_model: ViewModel,
}

fn binding_attribute<'a>(element: &'a Value, name: &str) -> Option<&'a Value> {
    element.get("binding")?.get(name)
}

impl ElementBinder {
    #[must_use]
    pub fn new(view_model: ViewModel) -> Self {
        Self { view_model }
    }

    #[inline]
    #[must_use]
    pub fn view_model(&self) -> &ViewModel {
        &self.view_model
    }

    /// The context an element binds against: `parent`, shifted by
    /// `binding.with` when present.
    #[must_use]
    pub fn binding_context_for(&self, element: &Value, parent: &BindingContext) -> BindingContext {
        match binding_attribute(element, "with").and_then(Value::as_str) {
            Some(with) => parent.select(with),
            None => parent.clone(),
        }
    }

    /// Apply `element[attribute]` to a control property.
    ///
    /// Literals and templates with only one-time tokens are applied once and
    /// nothing is registered. Live templates register a [`PropertyBinding`]
    /// whose id the control must unregister on teardown.
    pub fn process_element_property(
        &self,
        element: &Value,
        attribute: &str,
        context: &BindingContext,
        setter: impl ViewSetter + 'static,
    ) -> Option<PropertyBindingId> {
        let value = element.get(attribute)?;
        let Some(template) = value
            .as_str()
            .filter(|s| PropertyValue::contains_binding_tokens(s))
        else {
            let _pass = self.view_model.begin_update_pass();
            setter.set(Some(value));
            return None;
        };

        let property = self.view_model.parse_property(template, context);
        if !property.has_live_tokens() {
            let resolved = self.view_model.with_document(|doc| property.expand(doc));
            let _pass = self.view_model.begin_update_pass();
            setter.set(resolved.as_ref());
            return None;
        }
        let id = self
            .view_model
            .register_property_binding(PropertyBinding::new(property).with_setter(setter));
        self.view_model.refresh_binding(id);
        Some(id)
    }

    /// Register a two-way binding for the path named by
    /// `binding.<attribute>`, then push the current document value into the
    /// control.
    pub fn process_element_bound_value(
        &self,
        element: &Value,
        attribute: &str,
        context: &BindingContext,
        getter: impl ViewGetter + 'static,
        setter: impl ViewSetter + 'static,
    ) -> Option<ValueBindingId> {
        let path = binding_attribute(element, attribute).and_then(Value::as_str)?;
        let binding = ValueBinding::new(context.select(path), getter).with_setter(setter);
        let id = self.view_model.register_value_binding(binding);
        self.view_model.refresh_binding(id);
        Some(id)
    }

    /// One context per item of the array named by `binding.foreach`.
    #[must_use]
    pub fn foreach_contexts(&self, element: &Value, context: &BindingContext) -> Vec<BindingContext> {
        let Some(path) = binding_attribute(element, "foreach").and_then(Value::as_str) else {
            return Vec::new();
        };
        self.view_model
            .with_document(|doc| context.select_each(doc, path))
    }

    /// Command declared under `binding.<event>`.
    #[must_use]
    pub fn command_for(&self, element: &Value, event: &str) -> Option<CommandSpec> {
        binding_attribute(element, event).and_then(CommandSpec::from_element_value)
    }
}
