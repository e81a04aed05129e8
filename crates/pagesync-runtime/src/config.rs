//! Client configuration.
//!
//! Loaded from TOML (or JSON) at startup. Every field has a default, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! app_path = "/app/demo"
//!
//! [device_metrics]
//! os = "linux"
//! screen_width = 1280
//!
//! [messages]
//! generic_error = "Something went wrong."
//!
//! [logging]
//! filter = "pagesync=debug"
//! json = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Text shown to the user for client-side failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserMessages {
    pub generic_error: String,
    pub session_lost: String,
    pub connection_failed: String,
}

impl Default for UserMessages {
    fn default() -> Self {
        Self {
            generic_error: "The application encountered an error and could not complete the request."
                .to_owned(),
            session_lost: "Your session has expired. The application will restart.".to_owned(),
            connection_failed: "Unable to reach the server. Try again?".to_owned(),
        }
    }
}

/// Subscriber settings used by `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives. `RUST_LOG` takes precedence when set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Sent as `Path` on the app-definition request.
    pub app_path: Option<String>,
    /// Opaque device description sent with page requests.
    pub device_metrics: Option<Value>,
    /// Opaque view description sent with page and view-update requests.
    pub view_metrics: Option<Value>,
    pub messages: UserMessages,
    pub logging: LoggingConfig,
}

impl ClientConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Toml)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Json)
    }

    /// Load from a file. `.json` files are parsed as JSON, anything else as
    /// TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&text)?
        } else {
            Self::from_toml_str(&text)?
        };
        tracing::debug!(path = %path.display(), "loaded client config");
        Ok(config)
    }
}
