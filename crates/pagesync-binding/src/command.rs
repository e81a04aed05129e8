//! Command declarations attached to view elements.
//!
//! An element declares a command either as a bare name or as an object
//! with a `command` key plus parameters:
//!
//! ```json
//! "onClick": "refresh"
//! "onClick": { "command": "select", "item": "{$data}", "note": "Row {$index}" }
//! ```
//!
//! Parameter strings are token templates resolved against the element's
//! binding context when the command fires.

use serde_json::{Map, Value};

use crate::context::BindingContext;
use crate::property::PropertyValue;
use crate::view_model::ViewModel;

/// A command as declared on an element.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    command: String,
    parameters: Map<String, Value>,
}

/// A command with its parameters resolved, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommand {
    pub command: String,
    pub parameters: Map<String, Value>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameters: Map::new(),
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Parse either declaration form. Anything else (or an object without
    /// a string `command`) is not a command.
    #[must_use]
    pub fn from_element_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(command) if !command.is_empty() => Some(Self::new(command.as_str())),
            Value::Object(map) => {
                let command = map.get("command").and_then(Value::as_str)?;
                let parameters = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != "command")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Some(Self {
                    command: command.to_owned(),
                    parameters,
                })
            }
            _ => {
                tracing::debug!(%value, "element value is not a command declaration");
                None
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Expand parameter templates against `context`. Tokens that resolve to
    /// nothing become `null`.
    #[must_use]
    pub fn resolve(&self, view_model: &ViewModel, context: &BindingContext) -> ResolvedCommand {
        let parameters = self
            .parameters
            .iter()
            .map(|(name, value)| {
                let resolved = match value {
                    Value::String(template) if PropertyValue::contains_binding_tokens(template) => {
                        view_model
                            .resolve_property(template, context)
                            .unwrap_or(Value::Null)
                    }
                    other => other.clone(),
                };
                (name.clone(), resolved)
            })
            .collect();
        ResolvedCommand {
            command: self.command.clone(),
            parameters,
        }
    }
}
