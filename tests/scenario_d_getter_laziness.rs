//! A property backed by a getter is presented lazily: listing a scope's
//! variables must not invoke the getter, only expanding the lazy child it
//! produced does.

use std::cell::RefCell;

use jsdap_core::dp;
use jsdap_core::ids::TargetId;
use jsdap_core::rp::runtime::{self, GetPropertiesResult, PropertyDescriptor, RemoteObject, RemoteObjectType};
use jsdap_core::rp::{debugger, target, Call, CallResult, Event, RuntimeAgent, SessionEvent};
use jsdap_core::Adapter;

struct FakeAgent {
    get_properties_calls: RefCell<usize>,
    call_function_on_calls: RefCell<usize>,
}

impl FakeAgent {
    fn new() -> Self {
        Self { get_properties_calls: RefCell::new(0), call_function_on_calls: RefCell::new(0) }
    }
}

fn remote_object(type_: RemoteObjectType, object_id: Option<&str>) -> RemoteObject {
    RemoteObject {
        type_,
        subtype: None,
        class_name: None,
        value: None,
        unserializable_value: None,
        description: None,
        object_id: object_id.map(str::to_string),
        preview: None,
    }
}

impl RuntimeAgent for FakeAgent {
    fn call(&mut self, _session_id: &str, call: Call) -> jsdap_core::AdapterResult<CallResult> {
        match call {
            Call::GetProperties(params) => {
                *self.get_properties_calls.borrow_mut() += 1;
                if params.object_id == "scope-obj-1" {
                    Ok(CallResult::GetProperties(GetPropertiesResult {
                        result: vec![PropertyDescriptor {
                            name: "answer".to_string(),
                            value: None,
                            writable: false,
                            get: Some(remote_object(RemoteObjectType::Function, Some("getter-obj-1"))),
                            set: None,
                            configurable: true,
                            enumerable: true,
                            was_thrown: false,
                        }],
                        internal_properties: Vec::new(),
                        private_properties: Vec::new(),
                        exception_details: None,
                    }))
                } else {
                    Ok(CallResult::GetProperties(GetPropertiesResult {
                        result: Vec::new(),
                        internal_properties: Vec::new(),
                        private_properties: Vec::new(),
                        exception_details: None,
                    }))
                }
            }
            Call::CallFunctionOn(params) => {
                *self.call_function_on_calls.borrow_mut() += 1;
                assert_eq!(params.object_id.as_deref(), Some("getter-obj-1"));
                Ok(CallResult::CallFunctionOn(runtime::CallFunctionOnResult {
                    result: {
                        let mut object = remote_object(RemoteObjectType::Number, None);
                        object.value = Some(serde_json::json!(42));
                        object
                    },
                    exception_details: None,
                }))
            }
            _ => Ok(CallResult::Empty),
        }
    }
}

fn minimal_remote_object() -> RemoteObject {
    remote_object(RemoteObjectType::Undefined, None)
}

#[test]
fn getter_backed_property_is_not_invoked_until_its_lazy_child_is_expanded() {
    let mut adapter = Adapter::new();
    let mut agent = FakeAgent::new();

    let attach_events = adapter.handle_runtime_event(
        SessionEvent {
            session_id: "session-1".to_string(),
            body: Event::AttachedToTarget(target::AttachedToTargetEvent {
                session_id: "session-1".to_string(),
                target_info: target::TargetInfo {
                    target_id: TargetId::from_raw(1),
                    type_: target::TargetType::Page,
                    title: "a.html".to_string(),
                    url: "http://x/a.html".to_string(),
                    attached: true,
                    opener_id: None,
                    browser_context_id: None,
                },
                waiting_for_debugger: false,
            }),
        },
        &mut agent,
    );
    let thread_id = match attach_events.as_slice() {
        [dp::OutgoingEvent::Thread(body)] => body.thread_id,
        other => panic!("expected a single thread event, got {other:?}"),
    };

    let paused_event = SessionEvent {
        session_id: "session-1".to_string(),
        body: Event::Paused(debugger::PausedEvent {
            call_frames: vec![debugger::CallFrame {
                call_frame_id: "frame-1".to_string(),
                function_name: "onClick".to_string(),
                location: debugger::Location { script_id: "script-1".to_string(), line_number: 9, column_number: Some(0) },
                url: "http://x/a.js".to_string(),
                scope_chain: vec![debugger::Scope {
                    type_: debugger::ScopeType::Local,
                    object: remote_object(RemoteObjectType::Object, Some("scope-obj-1")),
                    name: None,
                    start_location: None,
                    end_location: None,
                }],
                this_: minimal_remote_object(),
                return_value: None,
            }],
            reason: debugger::PausedReason::Other,
            data: serde_json::Value::Null,
            hit_breakpoints: Vec::new(),
            async_stack_trace: None,
        }),
    };
    adapter.handle_runtime_event(paused_event, &mut agent);

    let (stack_trace_response, _) = adapter.handle_request(
        dp::IncomingRequest { seq: 1, command: dp::RequestCommand::StackTrace(dp::StackTraceArguments { thread_id, start_frame: None, levels: None }) },
        &mut agent,
    );
    let frame_id = match stack_trace_response.body {
        Some(dp::ResponseBody::StackTrace(body)) => body.stack_frames[0].id,
        _ => panic!("expected a stackTrace response"),
    };

    let (scopes_response, _) =
        adapter.handle_request(dp::IncomingRequest { seq: 2, command: dp::RequestCommand::Scopes(dp::ScopesArguments { frame_id }) }, &mut agent);
    let scope_reference = match scopes_response.body {
        Some(dp::ResponseBody::Scopes(body)) => {
            assert_eq!(body.scopes.len(), 1);
            body.scopes[0].variables_reference
        }
        _ => panic!("expected a scopes response"),
    };

    let (variables_response, _) = adapter.handle_request(
        dp::IncomingRequest {
            seq: 3,
            command: dp::RequestCommand::Variables(dp::VariablesArguments { variables_reference: scope_reference, filter: None, start: None, count: None }),
        },
        &mut agent,
    );
    assert_eq!(*agent.call_function_on_calls.borrow(), 0, "listing a scope must not invoke its getters");
    let getter_child = match variables_response.body {
        Some(dp::ResponseBody::Variables(body)) => {
            assert_eq!(body.variables.len(), 1);
            let variable = body.variables[0].clone();
            assert_eq!(variable.name, "answer");
            assert!(variable.presentation_hint.as_ref().is_some_and(|hint| hint.lazy));
            variable.variables_reference
        }
        _ => panic!("expected a variables response"),
    };

    let (expanded_response, _) = adapter.handle_request(
        dp::IncomingRequest {
            seq: 4,
            command: dp::RequestCommand::Variables(dp::VariablesArguments { variables_reference: getter_child, filter: None, start: None, count: None }),
        },
        &mut agent,
    );
    assert_eq!(*agent.call_function_on_calls.borrow(), 1, "expanding the lazy child must invoke the getter exactly once");
    match expanded_response.body {
        Some(dp::ResponseBody::Variables(body)) => {
            assert_eq!(body.variables.len(), 1);
            assert_eq!(body.variables[0].name, "answer");
        }
        _ => panic!("expected a variables response"),
    }
}
