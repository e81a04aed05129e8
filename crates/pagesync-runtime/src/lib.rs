#![forbid(unsafe_code)]

//! Client session runtime for pagesync.
//!
//! # Role in pagesync
//! `pagesync-runtime` speaks the request/response protocol. It tracks which
//! page instance is showing and at which version, decides whether a server
//! response can be applied, and asks the server to resync when it cannot.
//!
//! # Primary responsibilities
//! - **StateManager**: composes requests and interprets responses.
//! - **ClientHost**: transport, renderer and prompts supplied by the platform.
//! - **Protocol**: serde envelopes for requests and responses.
//! - **Config**: TOML/JSON client settings and optional logging setup.
//!
//! # How it fits in the system
//! The runtime owns the page [`ViewModel`](pagesync_binding::ViewModel).
//! Rendering happens in the host, which binds controls through
//! `pagesync-binding`; edits flow back out as `ViewModelDeltas` on the next
//! request.

pub mod config;
pub mod error;
pub mod host;
#[cfg(feature = "logging")]
pub mod logging;
pub mod manager;
pub mod protocol;
pub mod state;

pub use config::{ClientConfig, LoggingConfig, UserMessages};
pub use error::{ClientError, ConfigError};
pub use host::ClientHost;
#[cfg(feature = "logging")]
pub use logging::init_logging;
pub use manager::StateManager;
pub use protocol::{
    LaunchUrl, MessageBox, MessageBoxOption, Request, RequestMode, Response, ResponseError,
    ViewModelDelta, app_main_page,
};
pub use state::{Instance, SessionState};
