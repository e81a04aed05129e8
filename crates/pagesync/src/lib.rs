#![forbid(unsafe_code)]

//! pagesync public facade.
//!
//! Re-exports the document tree, the binding layer and (with the default
//! `runtime` feature) the session runtime, plus a [`prelude`] for adapters.
//!
//! ```
//! use pagesync::prelude::*;
//! use serde_json::json;
//!
//! let vm = ViewModel::new();
//! vm.initialize(&json!({"user": {"name": "Ada"}}));
//! let greeting = vm.resolve_property("Hello, {user.name}!", &vm.root_context());
//! assert_eq!(greeting, Some(json!("Hello, Ada!")));
//! ```

pub use pagesync_binding as binding;
pub use pagesync_json as json;
#[cfg(feature = "runtime")]
pub use pagesync_runtime as runtime;

pub use pagesync_binding::{
    BindingContext, BindingRef, CommandSpec, DeltaRecord, ElementBinder, PropertyBinding,
    PropertyValue, ValueBinding, ViewModel,
};
pub use pagesync_json::{Document, NodeId};
#[cfg(feature = "runtime")]
pub use pagesync_runtime::{ClientConfig, ClientError, ClientHost, StateManager};

/// Common imports for control adapters and hosts.
pub mod prelude {
    pub use pagesync_binding::{
        BindingContext, BindingRef, ChangeKind, CommandSpec, DeltaRecord, ElementBinder,
        PropertyBinding, PropertyBindingId, PropertyValue, ResolvedCommand, ValueBinding,
        ValueBindingId, ViewGetter, ViewModel, ViewSetter,
    };
    pub use pagesync_json::Document;

    #[cfg(feature = "runtime")]
    pub use pagesync_runtime::{
        ClientConfig, ClientError, ClientHost, Request, RequestMode, Response, SessionState,
        StateManager,
    };
}
