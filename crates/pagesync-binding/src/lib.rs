#![forbid(unsafe_code)]

//! Data binding between a JSON view-model and platform controls.
//!
//! # Role in pagesync
//! `pagesync-binding` sits between the document tree (`pagesync-json`) and
//! whatever draws controls. It resolves binding paths, expands token
//! templates, tracks user edits as dirty bindings, and applies server
//! delta batches.
//!
//! # Primary responsibilities
//! - **BindingContext**: path cursors with `$root`/`$parent`/`$data`/`$index`.
//! - **PropertyValue**: `{token}` templates with format specs and `eval(...)`.
//! - **ViewModel**: binding registry, dirty tracking and delta application.
//! - **ElementBinder**: helpers for control adapters reading element JSON.
//!
//! # How it fits in the system
//! The runtime (`pagesync-runtime`) owns a [`ViewModel`] per page and feeds
//! it server responses; control adapters register bindings through
//! [`ElementBinder`] and report edits back through the same handle.

pub mod binding;
pub mod coerce;
pub mod command;
pub mod context;
pub mod delta;
pub mod element;
pub mod expr;
pub mod format;
pub mod property;
pub mod view_model;

pub use binding::{
    BindingRef, PropertyBinding, PropertyBindingId, ValueBinding, ValueBindingId, ViewGetter,
    ViewSetter,
};
pub use command::{CommandSpec, ResolvedCommand};
pub use context::BindingContext;
pub use delta::{BindingUpdate, ChangeKind, DeltaRecord};
pub use element::ElementBinder;
pub use expr::{ExprError, ExprValue, Expression};
pub use property::{BoundToken, PropertyValue};
pub use view_model::{PassStamp, UpdatePass, ViewModel};

pub use pagesync_json::{Document, NodeId};
