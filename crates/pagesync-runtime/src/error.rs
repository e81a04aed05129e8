//! Errors surfaced by the session API.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// A session operation that could not be carried out.
#[derive(Debug)]
pub enum ClientError {
    /// The operation needs an active page instance.
    NoActiveInstance,
    /// `retry_failed_request` with nothing to retry.
    NoFailedRequest,
    /// `choose_message_box_option` with no message box showing.
    NoMessageBox,
    /// The chosen option index does not exist.
    InvalidOption { index: usize, available: usize },
    /// No page path to (re)start from.
    NoStartPage,
    /// A response body was not a valid envelope.
    Decode(serde_json::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveInstance => write!(f, "no active page instance"),
            Self::NoFailedRequest => write!(f, "no failed request to retry"),
            Self::NoMessageBox => write!(f, "no message box is showing"),
            Self::InvalidOption { index, available } => {
                write!(f, "message box option {index} out of range ({available} options)")
            }
            Self::NoStartPage => write!(f, "no start page is known"),
            Self::Decode(err) => write!(f, "malformed response: {err}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err)
    }
}

/// Configuration could not be loaded or applied.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Toml(toml::de::Error),
    Json(serde_json::Error),
    /// The logging subscriber could not be installed.
    Logging(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            Self::Toml(err) => write!(f, "invalid TOML config: {err}"),
            Self::Json(err) => write!(f, "invalid JSON config: {err}"),
            Self::Logging(msg) => write!(f, "cannot initialize logging: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Toml(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Logging(_) => None,
        }
    }
}
