//! Session scenarios driven through a recording host.

use std::cell::RefCell;
use std::rc::Rc;

use pagesync_binding::{DeltaRecord, ElementBinder, ValueBindingId, ViewModel};
use pagesync_runtime::{
    ClientConfig, ClientError, ClientHost, LaunchUrl, MessageBox, Request, RequestMode, Response,
    SessionState, StateManager,
};
use serde_json::{Map, Value, json};
use tracing_test::traced_test;

/// One text control per bound element in the rendered view.
#[derive(Default)]
struct Page {
    controls: Vec<(ValueBindingId, Rc<RefCell<Value>>)>,
}

#[derive(Default)]
struct MockHost {
    sent: Vec<Request>,
    renders: usize,
    page: Page,
    errors: Vec<String>,
    restarts: Vec<String>,
    retries: Vec<String>,
    message_boxes: Vec<MessageBox>,
    /// Value a control reports right after binding, as a picker selecting a
    /// default item would.
    initial_edit: Option<Value>,
}

impl MockHost {
    fn last_sent(&self) -> &Request {
        self.sent.last().expect("nothing sent")
    }

    fn control_text(&self, index: usize) -> Value {
        self.page.controls[index].1.borrow().clone()
    }
}

impl ClientHost for MockHost {
    fn send(&mut self, request: &Request) {
        self.sent.push(request.clone());
    }

    fn render_page(&mut self, view: &Value, view_model: &ViewModel) {
        self.renders += 1;
        self.page = Page::default();
        let binder = ElementBinder::new(view_model.clone());
        let root = view_model.root_context();
        let elements = view
            .get("elements")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for element in &elements {
            let text = Rc::new(RefCell::new(Value::Null));
            let read = Rc::clone(&text);
            let write = Rc::clone(&text);
            let Some(id) = binder.process_element_bound_value(
                element,
                "value",
                &root,
                move || read.borrow().clone(),
                move |v: Option<&Value>| *write.borrow_mut() = v.cloned().unwrap_or(Value::Null),
            ) else {
                continue;
            };
            if let Some(initial) = &self.initial_edit {
                *text.borrow_mut() = initial.clone();
                view_model.update_view_model_from_view(id);
            }
            self.page.controls.push((id, text));
        }
    }

    fn show_message_box(&mut self, message_box: &MessageBox) {
        self.message_boxes.push(message_box.clone());
    }

    fn show_error(&mut self, _caption: Option<&str>, message: &str) {
        self.errors.push(message.to_owned());
    }

    fn prompt_retry(&mut self, message: &str) {
        self.retries.push(message.to_owned());
    }

    fn prompt_restart(&mut self, message: &str) {
        self.restarts.push(message.to_owned());
    }

    fn save_session_id(&mut self, _session_id: &str) {}

    fn launch_url(&mut self, _launch: &LaunchUrl) {}

    fn choose_photo(&mut self, _request: &Value) {}
}

fn type_into(manager: &StateManager<MockHost>, index: usize, text: &str) {
    let (id, cell) = &manager.host().page.controls[index];
    *cell.borrow_mut() = json!(text);
    manager.view_model().update_view_model_from_view(*id);
}

fn form_page(id: u64, version: u64) -> Response {
    Response {
        instance_id: Some(id),
        instance_version: Some(version),
        path: Some("form".into()),
        view_model: Some(json!({"form": {"name": "", "email": ""}})),
        view: Some(json!({"elements": [
            {"control": "edit", "binding": {"value": "form.name"}},
            {"control": "edit", "binding": {"value": "form.email"}}
        ]})),
        ..Response::default()
    }
}

fn session_on_form(id: u64, version: u64) -> StateManager<MockHost> {
    let mut manager = StateManager::new(MockHost::default(), ClientConfig::default());
    manager.start_page("form");
    manager.process_response(form_page(id, version));
    manager
}

#[test]
fn startup_from_app_definition_to_page() {
    let config = ClientConfig {
        app_path: Some("/demo".into()),
        device_metrics: Some(json!({"os": "test"})),
        ..ClientConfig::default()
    };
    let mut manager = StateManager::new(MockHost::default(), config);
    manager.start_app();
    assert_eq!(manager.host().last_sent().mode, RequestMode::AppDefinition);
    assert_eq!(manager.host().last_sent().path.as_deref(), Some("/demo"));

    manager
        .process_response_json(r#"{"NewSessionId": "s1", "App": {"mainPage": "form"}}"#)
        .unwrap();
    assert_eq!(manager.session_id(), Some("s1"));
    let page_request = manager.host().last_sent();
    assert_eq!(page_request.mode, RequestMode::Page);
    assert_eq!(page_request.path.as_deref(), Some("form"));
    assert_eq!(page_request.device_metrics, Some(json!({"os": "test"})));

    manager.process_response(form_page(1, 1));
    assert!(manager.state().is_active());
    assert_eq!(manager.host().renders, 1);
    assert_eq!(manager.host().page.controls.len(), 2);
    assert_eq!(manager.host().control_text(0), json!(""));
}

#[test]
fn edit_is_sent_as_a_single_delta() {
    let mut manager = session_on_form(5, 3);
    type_into(&manager, 0, "hello");
    manager.send_update().unwrap();

    let update = manager.host().last_sent();
    assert_eq!(update.mode, RequestMode::Update);
    assert_eq!((update.instance_id, update.instance_version), (Some(5), Some(3)));
    let deltas = update.view_model_deltas.as_ref().unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].path, "form.name");
    assert_eq!(deltas[0].value, json!("hello"));

    // Nothing left to send.
    manager.send_update().unwrap();
    assert_eq!(manager.host().last_sent().view_model_deltas, None);
}

#[test]
fn server_deltas_reach_controls() {
    let mut manager = session_on_form(5, 3);
    manager.process_response(Response {
        instance_id: Some(5),
        instance_version: Some(4),
        view_model_deltas: Some(vec![DeltaRecord::update("form.email", json!("a@b.c"))]),
        ..Response::default()
    });
    assert_eq!(manager.host().control_text(1), json!("a@b.c"));
    assert_eq!(manager.state().instance().unwrap().version, 4);
    assert!(!manager.view_model().is_dirty());
}

#[test]
fn out_of_order_deltas_request_instance_resync() {
    let mut manager = session_on_form(5, 3);
    let sent_before = manager.host().sent.len();
    manager.process_response(Response {
        instance_id: Some(5),
        instance_version: Some(5),
        view_model_deltas: Some(vec![DeltaRecord::update("form.email", json!("x"))]),
        ..Response::default()
    });
    assert_eq!(manager.host().control_text(1), json!(""));
    assert_eq!(manager.host().sent.len(), sent_before + 1);
    let resync = manager.host().last_sent();
    assert_eq!(resync.mode, RequestMode::Resync);
    assert_eq!((resync.instance_id, resync.instance_version), (Some(5), Some(3)));

    manager.process_response(Response {
        instance_id: Some(5),
        instance_version: Some(5),
        view_model: Some(json!({"form": {"name": "n", "email": "x"}})),
        ..Response::default()
    });
    assert!(manager.state().is_active());
    assert_eq!(manager.host().control_text(0), json!("n"));
    assert_eq!(manager.host().control_text(1), json!("x"));
}

#[test]
fn delta_and_view_in_one_response_render_once() {
    let mut manager = session_on_form(2, 1);
    manager.process_response(Response {
        instance_id: Some(2),
        instance_version: Some(2),
        view_model_deltas: Some(vec![DeltaRecord::add("form.phone", json!("555"))]),
        view: Some(json!({"elements": [{"binding": {"value": "form.phone"}}]})),
        ..Response::default()
    });
    assert_eq!(manager.host().renders, 2);
    assert_eq!(manager.host().page.controls.len(), 1);
    assert_eq!(manager.host().control_text(0), json!("555"));
}

#[test]
fn render_time_edits_trigger_an_update() {
    let host = MockHost {
        initial_edit: Some(json!("default")),
        ..MockHost::default()
    };
    let mut manager = StateManager::new(host, ClientConfig::default());
    manager.start_page("form");
    manager.process_response(form_page(3, 1));

    let update = manager.host().last_sent();
    assert_eq!(update.mode, RequestMode::Update);
    assert_eq!(update.view_model_deltas.as_ref().map(Vec::len), Some(2));
    assert!(!manager.view_model().is_dirty());
}

#[test]
fn next_request_carries_pending_edits() {
    let mut manager = session_on_form(4, 1);
    type_into(&manager, 1, "me@x.y");
    let mut next = Request::new(RequestMode::Command).with_instance(4, 1);
    next.command = Some("validate".into());
    manager.process_response(Response {
        instance_id: Some(4),
        next_request: Some(next),
        ..Response::default()
    });

    let sent = manager.host().last_sent();
    assert_eq!(sent.command.as_deref(), Some("validate"));
    let deltas = sent.view_model_deltas.as_ref().unwrap();
    assert_eq!(deltas[0].path, "form.email");
    let ids: Vec<u64> = manager.host().sent.iter().map(|r| r.transaction_id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "{ids:?}");
}

#[test]
fn message_box_option_runs_its_command() {
    let mut manager = session_on_form(6, 1);
    manager
        .process_response_json(
            r#"{
                "InstanceId": 6,
                "MessageBox": {
                    "message": "Discard changes?",
                    "options": [
                        {"label": "Keep"},
                        {"label": "Discard", "command": "discard", "parameters": {"all": true}}
                    ]
                }
            }"#,
        )
        .unwrap();
    assert_eq!(manager.host().message_boxes.len(), 1);

    manager.choose_message_box_option(1).unwrap();
    let sent = manager.host().last_sent();
    assert_eq!(sent.mode, RequestMode::Command);
    assert_eq!(sent.command.as_deref(), Some("discard"));
    let mut expected = Map::new();
    expected.insert("all".into(), json!(true));
    assert_eq!(sent.parameters.as_ref(), Some(&expected));

    assert!(matches!(
        manager.choose_message_box_option(0),
        Err(ClientError::NoMessageBox)
    ));
}

#[test]
fn lost_session_restarts_from_main_page() {
    let mut manager = StateManager::new(MockHost::default(), ClientConfig::default());
    manager.start_app();
    manager.process_response(Response {
        app: Some(json!({"mainPage": "home"})),
        ..Response::default()
    });
    manager
        .process_response_json(r#"{"Error": {"name": "SyncError", "message": "gone"}}"#)
        .unwrap();
    assert_eq!(manager.host().restarts.len(), 1);

    manager.confirm_restart().unwrap();
    let sent = manager.host().last_sent();
    assert_eq!(sent.mode, RequestMode::Page);
    assert_eq!(sent.path.as_deref(), Some("home"));
    assert_eq!(
        manager.state(),
        &SessionState::AwaitingPage {
            path: "home".into()
        }
    );
}

#[test]
fn transport_failure_prompts_then_resends_same_transaction() {
    let mut manager = session_on_form(1, 1);
    manager.send_command("save", Map::new()).unwrap();
    let failed = manager.host().last_sent().clone();
    manager.on_transport_failure(failed.clone());
    assert_eq!(manager.host().retries.len(), 1);

    manager.retry_failed_request().unwrap();
    assert_eq!(manager.host().last_sent(), &failed);
    assert_eq!(manager.host().last_sent().transaction_id, failed.transaction_id);
}

#[test]
fn malformed_response_is_a_decode_error() {
    let mut manager = session_on_form(1, 1);
    let err = manager.process_response_json("{not json").unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
    assert!(manager.state().is_active());
}

#[test]
#[traced_test]
fn stale_responses_are_logged_and_dropped() {
    let mut manager = session_on_form(9, 2);
    let sent_before = manager.host().sent.len();
    manager.process_response(Response {
        instance_id: Some(8),
        instance_version: Some(7),
        view_model_deltas: Some(vec![DeltaRecord::update("form.name", json!("old"))]),
        ..Response::default()
    });
    assert_eq!(manager.host().sent.len(), sent_before);
    assert_eq!(manager.host().control_text(0), json!(""));
    assert!(logs_contain("dropping response for a stale instance"));
}

#[test]
#[traced_test]
fn unknown_instance_forces_full_resync() {
    let mut manager = session_on_form(9, 2);
    manager.process_response(Response {
        instance_id: Some(12),
        instance_version: Some(1),
        view: Some(json!({"elements": []})),
        ..Response::default()
    });
    let sent = manager.host().last_sent();
    assert_eq!(sent.mode, RequestMode::Resync);
    assert_eq!(sent.instance_id, None);
    assert!(manager.state().is_full_resync());
    assert_eq!(manager.state().instance().map(|i| i.id), Some(9));
    assert!(logs_contain("requesting full resync"));
}

#[test]
fn late_response_for_the_page_being_left_is_dropped() {
    let mut manager = session_on_form(5, 3);
    manager.start_page("other");
    let sent_before = manager.host().sent.len();

    for (id, version) in [(5, 4), (4, 9)] {
        manager.process_response(Response {
            instance_id: Some(id),
            instance_version: Some(version),
            view_model_deltas: Some(vec![DeltaRecord::update("form.name", json!("late"))]),
            ..Response::default()
        });
    }

    assert_eq!(manager.host().sent.len(), sent_before);
    assert_eq!(
        manager.state(),
        &SessionState::AwaitingPage {
            path: "other".into()
        }
    );
    assert_eq!(manager.host().control_text(0), json!(""));

    manager.process_response(Response {
        path: Some("other".into()),
        ..form_page(6, 1)
    });
    assert_eq!(manager.state().instance().map(|i| i.id), Some(6));
    assert_eq!(manager.newest_instance_id(), Some(6));
}

#[test]
fn full_resync_survives_stale_traffic_and_adopts_the_answer() {
    let mut manager = session_on_form(5, 3);
    manager.process_response(Response {
        instance_id: Some(6),
        instance_version: Some(1),
        view_model_deltas: Some(vec![]),
        ..Response::default()
    });
    let resyncs_sent = |manager: &StateManager<MockHost>| {
        manager
            .host()
            .sent
            .iter()
            .filter(|r| r.mode == RequestMode::Resync)
            .count()
    };
    assert_eq!(resyncs_sent(&manager), 1);
    assert!(manager.state().is_full_resync());
    assert_eq!(manager.state().instance().map(|i| i.id), Some(5));

    // Stale, then an update racing the resync: neither sends anything.
    manager.process_response(Response {
        instance_id: Some(4),
        instance_version: Some(2),
        view_model: Some(json!({"stale": true})),
        ..Response::default()
    });
    manager.process_response(Response {
        instance_id: Some(6),
        instance_version: Some(2),
        view_model_deltas: Some(vec![DeltaRecord::update("form.name", json!("racing"))]),
        ..Response::default()
    });
    assert_eq!(resyncs_sent(&manager), 1);
    assert_eq!(manager.host().control_text(0), json!(""));

    manager.process_response(Response {
        instance_id: Some(6),
        instance_version: Some(2),
        view_model: Some(json!({"form": {"name": "z", "email": ""}})),
        ..Response::default()
    });
    assert_eq!(resyncs_sent(&manager), 1);
    let instance = manager.state().instance().cloned().unwrap();
    assert!(manager.state().is_active());
    assert_eq!((instance.id, instance.version), (6, 2));
    assert_eq!(instance.path, "form");
    assert_eq!(manager.host().control_text(0), json!("z"));

    // The old instance is now stale.
    manager.process_response(Response {
        instance_id: Some(5),
        instance_version: Some(4),
        view_model_deltas: Some(vec![]),
        ..Response::default()
    });
    assert_eq!(resyncs_sent(&manager), 1);
    assert_eq!(manager.state().instance().map(|i| i.id), Some(6));
}

#[test]
fn server_error_shows_user_message() {
    let mut manager = session_on_form(1, 1);
    manager
        .process_response_json(
            r#"{"Error": {"name": "ValidationError", "message": "x", "userMessage": "Name is required"}}"#,
        )
        .unwrap();
    assert_eq!(manager.host().errors, vec!["Name is required".to_owned()]);
    assert!(manager.state().is_active());
}
