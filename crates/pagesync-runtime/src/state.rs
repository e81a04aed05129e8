//! Session states.

/// The server-side page incarnation the client is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: u64,
    pub version: u64,
    pub path: String,
    pub back_supported: bool,
}

/// Where the client is in the protocol.
///
/// ```text
/// Uninitialized -> AwaitingAppDefinition -> AwaitingPage -> Active
///                                                           |   ^
///                                                           v   |
///                                                      AwaitingResync
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    AwaitingAppDefinition,
    AwaitingPage {
        path: String,
    },
    Active(Instance),
    /// Waiting for the server to resend state. `full` asks for the whole
    /// session; `instance` is the last instance shown, if any.
    AwaitingResync {
        instance: Option<Instance>,
        full: bool,
    },
}

impl SessionState {
    /// The instance responses are checked against, if any.
    #[must_use]
    pub fn instance(&self) -> Option<&Instance> {
        match self {
            Self::Active(instance) => Some(instance),
            Self::AwaitingResync { instance, .. } => instance.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn instance_mut(&mut self) -> Option<&mut Instance> {
        match self {
            Self::Active(instance) => Some(instance),
            Self::AwaitingResync { instance, .. } => instance.as_mut(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    #[must_use]
    pub fn is_full_resync(&self) -> bool {
        matches!(self, Self::AwaitingResync { full: true, .. })
    }
}
