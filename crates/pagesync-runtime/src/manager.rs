#![forbid(unsafe_code)]

//! Protocol state machine for one client session.
//!
//! [`StateManager`] owns the page [`ViewModel`], composes outgoing requests
//! and interprets server responses. All I/O goes through a [`ClientHost`].
//!
//! # Response handling
//!
//! Members of a response are handled in a fixed order; the first matching
//! step among 2 to 6 decides how the page is updated.
//!
//! 1. `NewSessionId`: persisted.
//! 2. `Error`: reported or recovered (`SyncError`), then stop.
//! 3. `App`: stored, main page requested, then stop.
//! 4. `ViewModel` + `View`: new page.
//! 5. `ViewModel` only: resync result.
//! 6. Otherwise: deltas and/or a new `View` for the current instance.
//! 7. `MessageBox`, `LaunchUrl`, `ChoosePhoto`: handed to the host.
//! 8. `NextRequest` is sent, or else an `Update` if a render dirtied the
//!    view-model.
//!
//! Responses for an older instance are dropped at steps 5 and 6. Responses
//! for a newer, unknown instance trigger a full resync. Both stop
//! processing.
//!
//! # Invariants
//!
//! 1. Transaction ids strictly increase per manager.
//! 2. A delta batch is applied only when it advances the instance version
//!    by exactly one.
//! 3. Transport failures are never retried without the host confirming.
//! 4. The newest instance id ever shown never decreases. Responses below it
//!    are stale in every state; while a page is loading, responses for it
//!    are stale as well.
//!
//! # Failure Modes
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Stale instance id | Dropped, nothing sent |
//! | Unknown newer id | One full resync; later answers are accepted |
//! | Delta version gap | Instance resync |
//! | Updates while a full resync is pending | Dropped |

use pagesync_binding::{ResolvedCommand, ViewModel};
use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::host::ClientHost;
use crate::protocol::{MessageBox, Request, RequestMode, Response, ResponseError, app_main_page};
use crate::state::{Instance, SessionState};

/// Drives one client session against a server.
#[derive(Debug)]
pub struct StateManager<H: ClientHost> {
    host: H,
    config: ClientConfig,
    view_model: ViewModel,
    state: SessionState,
    app: Option<Value>,
    session_id: Option<String>,
    newest_instance_id: Option<u64>,
    last_transaction_id: u64,
    failed_request: Option<Request>,
    message_box: Option<MessageBox>,
    restart_pending: bool,
}

impl<H: ClientHost> StateManager<H> {
    #[must_use]
    pub fn new(host: H, config: ClientConfig) -> Self {
        Self {
            host,
            config,
            view_model: ViewModel::new(),
            state: SessionState::Uninitialized,
            app: None,
            session_id: None,
            newest_instance_id: None,
            last_transaction_id: 0,
            failed_request: None,
            message_box: None,
            restart_pending: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn instance(&self) -> Option<&Instance> {
        self.state.instance()
    }

    /// Handle to the page view-model; clones share state.
    #[inline]
    #[must_use]
    pub fn view_model(&self) -> &ViewModel {
        &self.view_model
    }

    #[must_use]
    pub fn app(&self) -> Option<&Value> {
        self.app.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[inline]
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn pending_message_box(&self) -> Option<&MessageBox> {
        self.message_box.as_ref()
    }

    #[must_use]
    pub fn failed_request(&self) -> Option<&Request> {
        self.failed_request.as_ref()
    }

    #[must_use]
    pub fn is_restart_pending(&self) -> bool {
        self.restart_pending
    }

    /// Highest instance id the client has shown.
    #[must_use]
    pub fn newest_instance_id(&self) -> Option<u64> {
        self.newest_instance_id
    }

    fn note_instance(&mut self, id: u64) {
        self.newest_instance_id = Some(self.newest_instance_id.map_or(id, |newest| newest.max(id)));
    }

    // -----------------------------------------------------------------------
    // Outgoing requests
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, mut request: Request) {
        self.last_transaction_id += 1;
        request.transaction_id = self.last_transaction_id;
        tracing::debug!(
            mode = ?request.mode,
            transaction_id = request.transaction_id,
            instance_id = ?request.instance_id,
            instance_version = ?request.instance_version,
            deltas = request.view_model_deltas.as_ref().map_or(0, Vec::len),
            "sending request"
        );
        self.host.send(&request);
    }

    fn active_instance(&self) -> Result<(u64, u64), ClientError> {
        self.state
            .instance()
            .map(|instance| (instance.id, instance.version))
            .ok_or(ClientError::NoActiveInstance)
    }

    /// Ask for the app definition.
    pub fn start_app(&mut self) {
        self.state = SessionState::AwaitingAppDefinition;
        let mut request = Request::new(RequestMode::AppDefinition);
        request.path = self.config.app_path.clone();
        self.dispatch(request);
    }

    /// Ask for the page at `path`, abandoning the current instance.
    pub fn start_page(&mut self, path: &str) {
        self.state = SessionState::AwaitingPage {
            path: path.to_owned(),
        };
        let mut request = Request::new(RequestMode::Page).with_path(path);
        request.device_metrics = self.config.device_metrics.clone();
        request.view_metrics = self.config.view_metrics.clone();
        self.dispatch(request);
    }

    /// Send pending edits for the current instance.
    pub fn send_update(&mut self) -> Result<(), ClientError> {
        let (id, version) = self.active_instance()?;
        let request = Request::new(RequestMode::Update)
            .with_instance(id, version)
            .with_deltas(self.view_model.collect_dirty_deltas());
        self.dispatch(request);
        Ok(())
    }

    /// Send a command, carrying pending edits along with it.
    pub fn send_command(
        &mut self,
        command: &str,
        parameters: Map<String, Value>,
    ) -> Result<(), ClientError> {
        let (id, version) = self.active_instance()?;
        let request = Request::new(RequestMode::Command)
            .with_instance(id, version)
            .with_command(command, parameters)
            .with_deltas(self.view_model.collect_dirty_deltas());
        self.dispatch(request);
        Ok(())
    }

    pub fn send_resolved_command(&mut self, command: ResolvedCommand) -> Result<(), ClientError> {
        self.send_command(&command.command, command.parameters)
    }

    pub fn send_back(&mut self) -> Result<(), ClientError> {
        let (id, version) = self.active_instance()?;
        self.dispatch(Request::new(RequestMode::Back).with_instance(id, version));
        Ok(())
    }

    /// Report new view metrics (rotation, resize). The metrics are also
    /// used for later page requests.
    pub fn send_view_update(&mut self, view_metrics: Value) -> Result<(), ClientError> {
        let (id, version) = self.active_instance()?;
        self.config.view_metrics = Some(view_metrics.clone());
        let mut request = Request::new(RequestMode::ViewUpdate).with_instance(id, version);
        request.view_metrics = Some(view_metrics);
        self.dispatch(request);
        Ok(())
    }

    /// Ask the server to resend the whole session state. The last known
    /// instance is kept until the answer arrives.
    pub fn send_resync(&mut self) {
        tracing::warn!("requesting full resync");
        self.state = SessionState::AwaitingResync {
            instance: self.state.instance().cloned(),
            full: true,
        };
        self.dispatch(Request::new(RequestMode::Resync));
    }

    /// Ask the server to resend the current instance's view-model. Falls
    /// back to a full resync when no instance is known.
    pub fn send_instance_resync(&mut self) {
        let Some(instance) = self.state.instance().cloned() else {
            self.send_resync();
            return;
        };
        tracing::warn!(
            instance_id = instance.id,
            instance_version = instance.version,
            "requesting instance resync"
        );
        let request = Request::new(RequestMode::Resync).with_instance(instance.id, instance.version);
        self.state = SessionState::AwaitingResync {
            instance: Some(instance),
            full: false,
        };
        self.dispatch(request);
    }

    /// Send a server-provided request with a fresh transaction id and any
    /// pending edits attached.
    fn send_next_request(&mut self, mut request: Request) {
        request.attach_deltas(self.view_model.collect_dirty_deltas());
        self.dispatch(request);
    }

    // -----------------------------------------------------------------------
    // Failure recovery
    // -----------------------------------------------------------------------

    /// The transport could not deliver `request`. The host is asked whether
    /// to retry.
    pub fn on_transport_failure(&mut self, request: Request) {
        tracing::warn!(
            mode = ?request.mode,
            transaction_id = request.transaction_id,
            "request failed in transport"
        );
        self.failed_request = Some(request);
        let message = self.config.messages.connection_failed.clone();
        self.host.prompt_retry(&message);
    }

    /// Resend the failed request exactly as it was.
    pub fn retry_failed_request(&mut self) -> Result<(), ClientError> {
        let request = self.failed_request.take().ok_or(ClientError::NoFailedRequest)?;
        tracing::debug!(transaction_id = request.transaction_id, "retrying request");
        self.host.send(&request);
        Ok(())
    }

    /// After the lost-session prompt: start over from the main page.
    pub fn confirm_restart(&mut self) -> Result<(), ClientError> {
        let path = self
            .app
            .as_ref()
            .and_then(app_main_page)
            .map(str::to_owned)
            .or_else(|| self.state.instance().map(|i| i.path.clone()))
            .ok_or(ClientError::NoStartPage)?;
        self.restart_pending = false;
        self.start_page(&path);
        Ok(())
    }

    /// The user picked option `index` of the showing message box. Options
    /// with a command send it.
    pub fn choose_message_box_option(&mut self, index: usize) -> Result<(), ClientError> {
        let message_box = self.message_box.take().ok_or(ClientError::NoMessageBox)?;
        let Some(option) = message_box.options.get(index) else {
            let available = message_box.options.len();
            self.message_box = Some(message_box);
            return Err(ClientError::InvalidOption { index, available });
        };
        match &option.command {
            Some(command) => self.send_command(command, option.parameters.clone()),
            None => Ok(()),
        }
    }

    pub fn dismiss_message_box(&mut self) {
        self.message_box = None;
    }

    // -----------------------------------------------------------------------
    // Responses
    // -----------------------------------------------------------------------

    /// Decode and process a response body.
    pub fn process_response_json(&mut self, body: &str) -> Result<(), ClientError> {
        let response: Response = serde_json::from_str(body)?;
        self.process_response(response);
        Ok(())
    }

    pub fn process_response(&mut self, mut response: Response) {
        let _span = tracing::debug_span!(
            "process_response",
            instance_id = ?response.instance_id,
            instance_version = ?response.instance_version
        )
        .entered();

        if let Some(session_id) = &response.new_session_id {
            tracing::debug!("server assigned a new session id");
            self.session_id = Some(session_id.clone());
            self.host.save_session_id(session_id);
        }

        if let Some(error) = &response.error {
            self.handle_error(error, response.instance_id);
            return;
        }

        if let Some(app) = response.app.take() {
            let main_page = app_main_page(&app).map(str::to_owned);
            self.app = Some(app);
            match main_page {
                Some(path) => self.start_page(&path),
                None => tracing::warn!("app definition has no mainPage"),
            }
            return;
        }

        let mut update_required = false;
        let outcome = match (&response.view_model, &response.view) {
            (Some(view_model), Some(view)) => {
                self.load_page(&response, view_model, view, &mut update_required)
            }
            (Some(view_model), None) => self.apply_resync(&response, view_model),
            (None, _) => self.apply_update(&response, &mut update_required),
        };
        if outcome == Flow::Stop {
            return;
        }

        if let Some(message_box) = response.message_box.take() {
            self.host.show_message_box(&message_box);
            self.message_box = Some(message_box);
        }
        if let Some(launch) = &response.launch_url {
            self.host.launch_url(launch);
        }
        if let Some(request) = &response.choose_photo {
            self.host.choose_photo(request);
        }

        if let Some(next) = response.next_request.take() {
            self.send_next_request(next);
        } else if update_required {
            if let Err(err) = self.send_update() {
                tracing::warn!(%err, "cannot send update after render");
            }
        }
    }

    fn handle_error(&mut self, error: &ResponseError, instance_id: Option<u64>) {
        if error.is_sync_error() {
            let current = self.state.instance().map(|i| i.id);
            match instance_id {
                None => {
                    tracing::warn!(message = %error.message, "server lost the session");
                    self.restart_pending = true;
                    let message = self.config.messages.session_lost.clone();
                    self.host.prompt_restart(&message);
                }
                Some(id) if Some(id) == current => {
                    tracing::debug!(instance_id = id, "sync error for a stale request; ignoring");
                }
                Some(id) => {
                    tracing::warn!(instance_id = id, ?current, "sync error for another instance");
                    self.send_instance_resync();
                }
            }
            return;
        }

        tracing::warn!(name = %error.name, message = %error.message, "server reported an error");
        match &error.user_message {
            Some(message) => self
                .host
                .show_error(error.user_message_caption.as_deref(), message),
            None => {
                let message = self.config.messages.generic_error.clone();
                self.host.show_error(None, &message);
            }
        }
    }

    fn render(&mut self, view: &Value, update_required: &mut bool) {
        self.host.render_page(view, &self.view_model);
        if self.view_model.is_dirty() {
            tracing::debug!("render wrote initial values; update required");
            *update_required = true;
        }
    }

    fn load_page(
        &mut self,
        response: &Response,
        view_model: &Value,
        view: &Value,
        update_required: &mut bool,
    ) -> Flow {
        let (Some(id), Some(version)) = (response.instance_id, response.instance_version) else {
            tracing::warn!("page response without instance id/version");
            return Flow::Stop;
        };
        let path = response
            .path
            .clone()
            .or_else(|| match &self.state {
                SessionState::AwaitingPage { path } => Some(path.clone()),
                _ => self.state.instance().map(|i| i.path.clone()),
            })
            .unwrap_or_default();
        tracing::debug!(instance_id = id, instance_version = version, %path, "loading page");
        self.note_instance(id);
        self.state = SessionState::Active(Instance {
            id,
            version,
            path,
            back_supported: response.back.unwrap_or(false),
        });
        self.view_model.initialize(view_model);
        self.render(view, update_required);
        Flow::Continue
    }

    /// Decide whether a response for `response_id` may touch the page.
    /// Stale responses are dropped; an unknown newer instance forces a full
    /// resync unless one is already pending.
    fn check_instance(&mut self, response_id: u64) -> Flow {
        let newest = self.newest_instance_id;
        if newest.is_some_and(|newest| response_id < newest) {
            tracing::debug!(response_id, ?newest, "dropping response for a stale instance");
            return Flow::Stop;
        }
        match &self.state {
            SessionState::Active(instance)
            | SessionState::AwaitingResync {
                instance: Some(instance),
                full: false,
            } if instance.id == response_id => Flow::Continue,
            SessionState::AwaitingResync { full: true, .. } => Flow::Continue,
            SessionState::AwaitingPage { .. } if newest == Some(response_id) => {
                tracing::debug!(response_id, "dropping response for the page being left");
                Flow::Stop
            }
            _ => {
                let current = self.state.instance().map(|i| i.id);
                tracing::warn!(response_id, ?current, "response for an unexpected instance");
                self.send_resync();
                Flow::Stop
            }
        }
    }

    fn apply_resync(&mut self, response: &Response, view_model: &Value) -> Flow {
        let Some(response_id) = response.instance_id else {
            tracing::warn!("resync response without instance id");
            if !self.state.is_full_resync() {
                self.send_resync();
            }
            return Flow::Stop;
        };
        if self.check_instance(response_id) == Flow::Stop {
            return Flow::Stop;
        }
        let known = self.state.instance().cloned();
        let mut instance = match known {
            Some(instance) if instance.id == response_id => instance,
            known => Instance {
                id: response_id,
                version: 0,
                path: response
                    .path
                    .clone()
                    .or_else(|| known.as_ref().map(|i| i.path.clone()))
                    .unwrap_or_default(),
                back_supported: response
                    .back
                    .or_else(|| known.as_ref().map(|i| i.back_supported))
                    .unwrap_or(false),
            },
        };
        if let Some(version) = response.instance_version {
            instance.version = version;
        }
        tracing::debug!(instance_id = instance.id, instance_version = instance.version, "applying resync");
        self.note_instance(instance.id);
        self.state = SessionState::Active(instance);
        self.view_model.replace_document(view_model);
        self.view_model.refresh_bindings(None, None);
        Flow::Continue
    }

    fn apply_update(&mut self, response: &Response, update_required: &mut bool) -> Flow {
        let Some(response_id) = response.instance_id else {
            return Flow::Continue;
        };
        if self.check_instance(response_id) == Flow::Stop {
            return Flow::Stop;
        }
        if self.state.is_full_resync() {
            tracing::debug!(response_id, "dropping update while a full resync is pending");
            return Flow::Stop;
        }

        if let Some(deltas) = &response.view_model_deltas {
            let current = self.state.instance().map_or(0, |i| i.version);
            let Some(version) = response.instance_version.filter(|v| *v == current + 1) else {
                tracing::warn!(
                    current,
                    response_version = ?response.instance_version,
                    "delta batch does not follow the current version"
                );
                self.send_instance_resync();
                return Flow::Stop;
            };
            let updates = self
                .view_model
                .apply_server_deltas(deltas, response.view.is_none());
            tracing::debug!(deltas = deltas.len(), updates = updates.len(), version, "applied deltas");
            if let Some(instance) = self.state.instance_mut() {
                instance.version = version;
            }
            if !self.state.is_active() {
                if let Some(instance) = self.state.instance().cloned() {
                    self.state = SessionState::Active(instance);
                }
            }
        }

        if let Some(view) = &response.view {
            let current = self.state.instance().map(|i| i.version);
            if response.instance_version != current {
                tracing::warn!(
                    ?current,
                    response_version = ?response.instance_version,
                    "view does not match the current version"
                );
                self.send_instance_resync();
                return Flow::Stop;
            }
            self.render(view, update_required);
        }
        Flow::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LaunchUrl, MessageBoxOption};
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Recorder {
        sent: Vec<Request>,
        rendered: Vec<Value>,
        errors: Vec<(Option<String>, String)>,
        retries: usize,
        restarts: usize,
        sessions: Vec<String>,
        message_boxes: usize,
        launched: Vec<String>,
        photos: usize,
    }

    impl ClientHost for Recorder {
        fn send(&mut self, request: &Request) {
            self.sent.push(request.clone());
        }
        fn render_page(&mut self, view: &Value, _view_model: &ViewModel) {
            self.rendered.push(view.clone());
        }
        fn show_message_box(&mut self, _message_box: &MessageBox) {
            self.message_boxes += 1;
        }
        fn show_error(&mut self, caption: Option<&str>, message: &str) {
            self.errors.push((caption.map(str::to_owned), message.to_owned()));
        }
        fn prompt_retry(&mut self, _message: &str) {
            self.retries += 1;
        }
        fn prompt_restart(&mut self, _message: &str) {
            self.restarts += 1;
        }
        fn save_session_id(&mut self, session_id: &str) {
            self.sessions.push(session_id.to_owned());
        }
        fn launch_url(&mut self, launch: &LaunchUrl) {
            self.launched.push(launch.primary_url.clone());
        }
        fn choose_photo(&mut self, _request: &Value) {
            self.photos += 1;
        }
    }

    fn active(id: u64, version: u64) -> StateManager<Recorder> {
        let mut manager = StateManager::new(Recorder::default(), ClientConfig::default());
        manager.process_response(Response {
            instance_id: Some(id),
            instance_version: Some(version),
            path: Some("menu".into()),
            view_model: Some(json!({"count": 0})),
            view: Some(json!({"elements": []})),
            ..Response::default()
        });
        manager.host_mut().sent.clear();
        manager
    }

    #[test]
    fn transaction_ids_strictly_increase() {
        let mut manager = active(1, 1);
        manager.send_update().unwrap();
        manager.send_back().unwrap();
        manager.send_resync();
        let ids: Vec<u64> = manager.host().sent.iter().map(|r| r.transaction_id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{ids:?}");
    }

    #[test]
    fn app_definition_requests_main_page() {
        let mut manager = StateManager::new(Recorder::default(), ClientConfig::default());
        manager.start_app();
        assert_eq!(manager.state(), &SessionState::AwaitingAppDefinition);
        manager.process_response(Response {
            app: Some(json!({"name": "demo", "mainPage": "menu"})),
            ..Response::default()
        });
        let last = manager.host().sent.last().unwrap();
        assert_eq!(last.mode, RequestMode::Page);
        assert_eq!(last.path.as_deref(), Some("menu"));
        assert_eq!(
            manager.state(),
            &SessionState::AwaitingPage {
                path: "menu".into()
            }
        );
    }

    #[test]
    fn page_load_activates_instance() {
        let manager = active(5, 3);
        let instance = manager.instance().unwrap();
        assert_eq!((instance.id, instance.version), (5, 3));
        assert_eq!(instance.path, "menu");
        assert_eq!(manager.host().rendered.len(), 1);
        assert_eq!(manager.view_model().to_value(), json!({"count": 0}));
    }

    #[test]
    fn session_id_is_persisted_even_with_error() {
        let mut manager = active(1, 1);
        manager.process_response(Response {
            new_session_id: Some("abc".into()),
            error: Some(ResponseError {
                name: "AppError".into(),
                message: "boom".into(),
                user_message: Some("Try later".into()),
                user_message_caption: Some("Sorry".into()),
            }),
            ..Response::default()
        });
        assert_eq!(manager.session_id(), Some("abc"));
        assert_eq!(manager.host().sessions, vec!["abc".to_owned()]);
        assert_eq!(
            manager.host().errors,
            vec![(Some("Sorry".to_owned()), "Try later".to_owned())]
        );
    }

    #[test]
    fn error_without_user_message_shows_generic_text() {
        let mut manager = active(1, 1);
        manager.process_response(Response {
            error: Some(ResponseError {
                name: "AppError".into(),
                message: "internal".into(),
                user_message: None,
                user_message_caption: None,
            }),
            ..Response::default()
        });
        assert_eq!(
            manager.host().errors[0].1,
            crate::config::UserMessages::default().generic_error
        );
    }

    fn sync_error(instance_id: Option<u64>) -> Response {
        Response {
            error: Some(ResponseError {
                name: ResponseError::SYNC_ERROR.into(),
                message: "sync".into(),
                user_message: None,
                user_message_caption: None,
            }),
            instance_id,
            ..Response::default()
        }
    }

    #[test]
    fn sync_error_branches() {
        let mut manager = active(5, 3);
        manager.process_response(sync_error(Some(5)));
        assert!(manager.host().sent.is_empty());

        manager.process_response(sync_error(Some(7)));
        let last = manager.host().sent.last().unwrap();
        assert_eq!(last.mode, RequestMode::Resync);
        assert_eq!(last.instance_id, Some(5));

        manager.process_response(sync_error(None));
        assert_eq!(manager.host().restarts, 1);
        assert!(manager.is_restart_pending());
        manager.confirm_restart().unwrap();
        assert_eq!(manager.host().sent.last().unwrap().mode, RequestMode::Page);
    }

    #[test]
    fn version_gap_triggers_instance_resync() {
        let mut manager = active(5, 3);
        manager.process_response(Response {
            instance_id: Some(5),
            instance_version: Some(5),
            view_model_deltas: Some(vec![pagesync_binding::DeltaRecord::update("count", json!(9))]),
            ..Response::default()
        });
        assert_eq!(manager.view_model().to_value(), json!({"count": 0}));
        let last = manager.host().sent.last().unwrap();
        assert_eq!(last.mode, RequestMode::Resync);
        assert_eq!((last.instance_id, last.instance_version), (Some(5), Some(3)));
        assert!(matches!(
            manager.state(),
            SessionState::AwaitingResync {
                instance: Some(_),
                full: false
            }
        ));
    }

    #[test]
    fn next_version_applies_deltas() {
        let mut manager = active(5, 3);
        manager.process_response(Response {
            instance_id: Some(5),
            instance_version: Some(4),
            view_model_deltas: Some(vec![pagesync_binding::DeltaRecord::update("count", json!(9))]),
            ..Response::default()
        });
        assert_eq!(manager.view_model().to_value(), json!({"count": 9}));
        assert_eq!(manager.instance().unwrap().version, 4);
        assert!(manager.host().sent.is_empty());
    }

    #[test]
    fn stale_and_newer_instances() {
        let mut manager = active(5, 3);
        manager.process_response(Response {
            instance_id: Some(4),
            instance_version: Some(9),
            view_model: Some(json!({"old": true})),
            ..Response::default()
        });
        assert!(manager.host().sent.is_empty());
        assert_eq!(manager.view_model().to_value(), json!({"count": 0}));

        manager.process_response(Response {
            instance_id: Some(6),
            instance_version: Some(1),
            view_model_deltas: Some(vec![]),
            ..Response::default()
        });
        let last = manager.host().sent.last().unwrap();
        assert_eq!(last.mode, RequestMode::Resync);
        assert_eq!(last.instance_id, None);
    }

    #[test]
    fn resync_response_replaces_document() {
        let mut manager = active(5, 3);
        manager.send_instance_resync();
        manager.process_response(Response {
            instance_id: Some(5),
            instance_version: Some(8),
            view_model: Some(json!({"count": 42})),
            ..Response::default()
        });
        assert!(manager.state().is_active());
        assert_eq!(manager.instance().unwrap().version, 8);
        assert_eq!(manager.view_model().to_value(), json!({"count": 42}));
        assert_eq!(manager.host().rendered.len(), 1);
    }

    #[test]
    fn transport_failure_retries_identical_request() {
        let mut manager = active(1, 1);
        manager.send_back().unwrap();
        let sent = manager.host().sent[0].clone();
        manager.on_transport_failure(sent.clone());
        assert_eq!(manager.host().retries, 1);
        manager.retry_failed_request().unwrap();
        assert_eq!(manager.host().sent.last(), Some(&sent));
        assert!(matches!(
            manager.retry_failed_request(),
            Err(ClientError::NoFailedRequest)
        ));
    }

    #[test]
    fn message_box_option_sends_command() {
        let mut manager = active(2, 1);
        manager.process_response(Response {
            instance_id: Some(2),
            message_box: Some(MessageBox {
                title: None,
                message: "Delete?".into(),
                options: vec![
                    MessageBoxOption {
                        label: "Cancel".into(),
                        command: None,
                        parameters: Map::new(),
                    },
                    MessageBoxOption {
                        label: "Delete".into(),
                        command: Some("delete".into()),
                        parameters: Map::new(),
                    },
                ],
            }),
            ..Response::default()
        });
        assert_eq!(manager.host().message_boxes, 1);
        assert!(matches!(
            manager.choose_message_box_option(5),
            Err(ClientError::InvalidOption { index: 5, available: 2 })
        ));
        manager.choose_message_box_option(1).unwrap();
        let last = manager.host().sent.last().unwrap();
        assert_eq!(last.mode, RequestMode::Command);
        assert_eq!(last.command.as_deref(), Some("delete"));
        assert!(manager.pending_message_box().is_none());
    }

    #[test]
    fn launch_url_and_photo_are_delegated() {
        let mut manager = active(2, 1);
        manager.process_response(Response {
            instance_id: Some(2),
            launch_url: Some(LaunchUrl {
                primary_url: "https://example.com".into(),
                secondary_url: None,
            }),
            choose_photo: Some(json!({})),
            ..Response::default()
        });
        assert_eq!(manager.host().launched, vec!["https://example.com".to_owned()]);
        assert_eq!(manager.host().photos, 1);
    }

    #[test]
    fn next_request_gets_fresh_id_and_pending_edits() {
        let mut manager = active(2, 1);
        let mut next = Request::new(RequestMode::Command).with_instance(2, 1);
        next.command = Some("poll".into());
        next.transaction_id = 999;
        manager.process_response(Response {
            instance_id: Some(2),
            next_request: Some(next),
            ..Response::default()
        });
        let last = manager.host().sent.last().unwrap();
        assert_eq!(last.command.as_deref(), Some("poll"));
        assert_ne!(last.transaction_id, 999);
        assert_eq!(last.view_model_deltas, None);
    }

    #[test]
    fn instance_scoped_sends_require_an_instance() {
        let mut manager = StateManager::new(Recorder::default(), ClientConfig::default());
        assert!(matches!(manager.send_update(), Err(ClientError::NoActiveInstance)));
        assert!(matches!(
            manager.send_command("x", Map::new()),
            Err(ClientError::NoActiveInstance)
        ));
        assert!(matches!(
            manager.send_view_update(json!({})),
            Err(ClientError::NoActiveInstance)
        ));
    }
}
