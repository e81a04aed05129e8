//! The platform side of a client session.

use pagesync_binding::ViewModel;
use serde_json::Value;

use crate::protocol::{LaunchUrl, MessageBox, Request};

/// Everything the session needs from the platform: a transport, a page
/// renderer and a few modal prompts.
///
/// Calls are fire-and-forget. Results come back through the
/// [`StateManager`](crate::StateManager) methods named in each doc comment.
pub trait ClientHost {
    /// Send a request. Report failure through
    /// [`StateManager::on_transport_failure`](crate::StateManager::on_transport_failure)
    /// and responses through
    /// [`StateManager::process_response`](crate::StateManager::process_response).
    fn send(&mut self, request: &Request);

    /// Rebuild the control tree for `view`, binding controls to
    /// `view_model`. Controls may write initial values while rendering.
    fn render_page(&mut self, view: &Value, view_model: &ViewModel);

    /// Show a server message box. The chosen option is reported through
    /// [`StateManager::choose_message_box_option`](crate::StateManager::choose_message_box_option).
    fn show_message_box(&mut self, message_box: &MessageBox);

    /// Show a non-fatal error.
    fn show_error(&mut self, caption: Option<&str>, message: &str);

    /// Ask whether to resend a request that failed in transport. Confirmation
    /// is reported through
    /// [`StateManager::retry_failed_request`](crate::StateManager::retry_failed_request).
    fn prompt_retry(&mut self, message: &str);

    /// Tell the user the server lost the session. Confirmation is reported
    /// through [`StateManager::confirm_restart`](crate::StateManager::confirm_restart).
    fn prompt_restart(&mut self, message: &str);

    /// Persist a session id the server assigned.
    fn save_session_id(&mut self, session_id: &str);

    fn launch_url(&mut self, launch: &LaunchUrl);

    fn choose_photo(&mut self, request: &Value);
}
