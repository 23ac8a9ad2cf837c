//! A pause inside a `setTimeout` callback reports a synchronous stack
//! ending with a label frame, and the deferred async parent only expands
//! once the client actually asks for those frames.

use jsdap_core::dp;
use jsdap_core::ids::TargetId;
use jsdap_core::rp::{debugger, target, Call, CallResult, Event, RuntimeAgent, SessionEvent};
use jsdap_core::Adapter;

struct FakeAgent;

impl RuntimeAgent for FakeAgent {
    fn call(&mut self, _session_id: &str, _call: Call) -> jsdap_core::AdapterResult<CallResult> {
        Ok(CallResult::Empty)
    }
}

fn minimal_remote_object() -> debugger::CallFrame {
    debugger::CallFrame {
        call_frame_id: "frame-1".to_string(),
        function_name: "onTimeout".to_string(),
        location: debugger::Location { script_id: "script-app".to_string(), line_number: 5, column_number: Some(2) },
        url: "app.js".to_string(),
        scope_chain: Vec::new(),
        this_: jsdap_core::rp::runtime::RemoteObject {
            type_: jsdap_core::rp::runtime::RemoteObjectType::Undefined,
            subtype: None,
            class_name: None,
            value: None,
            unserializable_value: None,
            description: None,
            object_id: None,
            preview: None,
        },
        return_value: None,
    }
}

#[test]
fn paused_inside_a_timer_callback_reports_a_label_frame_with_a_lazy_async_parent() {
    let mut adapter = Adapter::new();
    let mut agent = FakeAgent;

    adapter.handle_runtime_event(
        SessionEvent {
            session_id: "session-1".to_string(),
            body: Event::ScriptParsed(debugger::ScriptParsedEvent {
                script_id: "script-app".to_string(),
                url: "app.js".to_string(),
                start_line: 0,
                start_column: 0,
                end_line: 100,
                end_column: 0,
                source_map_url: None,
                has_source_url: false,
                is_module: false,
            }),
        },
        &mut agent,
    );

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

    adapter.handle_runtime_event(
        SessionEvent {
            session_id: "session-1".to_string(),
            body: Event::Paused(debugger::PausedEvent {
                call_frames: vec![minimal_remote_object()],
                reason: debugger::PausedReason::Other,
                data: serde_json::Value::Null,
                hit_breakpoints: Vec::new(),
                async_stack_trace: Some(debugger::StackTrace {
                    description: Some("setTimeout".to_string()),
                    call_frames: vec![debugger::RuntimeCallFrame {
                        function_name: "scheduleTimeout".to_string(),
                        script_id: "script-app".to_string(),
                        url: "app.js".to_string(),
                        line_number: 20,
                        column_number: 2,
                    }],
                    parent: None,
                }),
            }),
        },
        &mut agent,
    );

    let (first_response, _) = adapter.handle_request(
        dp::IncomingRequest {
            seq: 1,
            command: dp::RequestCommand::StackTrace(dp::StackTraceArguments { thread_id, start_frame: None, levels: Some(1) }),
        },
        &mut agent,
    );
    match first_response.body {
        Some(dp::ResponseBody::StackTrace(body)) => {
            assert_eq!(body.stack_frames.len(), 1);
            assert_eq!(body.stack_frames[0].name, "onTimeout");
            assert_eq!(body.total_frames, 2, "the unexpanded async parent still counts as one more frame");
        }
        _ => panic!("expected a stackTrace response"),
    }

    let (second_response, _) = adapter.handle_request(
        dp::IncomingRequest {
            seq: 2,
            command: dp::RequestCommand::StackTrace(dp::StackTraceArguments { thread_id, start_frame: Some(1), levels: Some(2) }),
        },
        &mut agent,
    );
    match second_response.body {
        Some(dp::ResponseBody::StackTrace(body)) => {
            assert_eq!(body.stack_frames.len(), 2);
            assert_eq!(body.stack_frames[0].presentation_hint, Some(dp::StackFramePresentationHint::Label));
            assert_eq!(body.stack_frames[0].name, "setTimeout");
            assert_eq!(body.stack_frames[1].name, "scheduleTimeout");
            assert_eq!(body.total_frames, 3, "totalFrames rises once the async chain is fully drained");
        }
        _ => panic!("expected a stackTrace response"),
    }
}
