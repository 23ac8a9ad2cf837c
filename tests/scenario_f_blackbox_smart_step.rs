//! With `skipFiles` covering a compiled script, stepping into a frame that
//! resolves under it is reported as blackboxed and silently stepped past --
//! no `stopped` event reaches the client until a real frame is hit.

use std::cell::RefCell;

use jsdap_core::dp;
use jsdap_core::ids::TargetId;
use jsdap_core::rp::{debugger, target, Call, CallResult, Event, RuntimeAgent, SessionEvent};
use jsdap_core::sourcemap::{FlatSourceMap, MappingRow, Position, SourceMap, SourceMapMetadata};
use jsdap_core::Adapter;

struct FakeAgent {
    step_into_calls: RefCell<u32>,
}

impl FakeAgent {
    fn new() -> Self {
        Self { step_into_calls: RefCell::new(0) }
    }
}

impl RuntimeAgent for FakeAgent {
    fn call(&mut self, _session_id: &str, call: Call) -> jsdap_core::AdapterResult<CallResult> {
        if matches!(call, Call::StepInto) {
            *self.step_into_calls.borrow_mut() += 1;
        }
        Ok(CallResult::Empty)
    }
}

fn node_modules_map() -> SourceMap {
    SourceMap::Flat(FlatSourceMap::new(
        SourceMapMetadata {
            source_map_url: "index.js.map".to_string(),
            compiled_path: "/w/node_modules/foo/index.js".to_string(),
            cache_key: "k".to_string(),
        },
        None,
        vec!["foo.ts".to_string()],
        vec![None],
        vec![],
        vec![MappingRow {
            generated: Position::new(10, 0),
            source_index: Some(0),
            original: Some(Position::new(0, 0)),
            name_index: None,
        }],
    ))
}

fn minimal_call_frame(script_id: &str, line: u32) -> debugger::CallFrame {
    let object = debugger::CallFrame {
        call_frame_id: format!("frame-{script_id}-{line}"),
        function_name: "f".to_string(),
        location: debugger::Location { script_id: script_id.to_string(), line_number: line, column_number: Some(0) },
        url: String::new(),
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
    };
    object
}

#[test]
fn stepping_into_a_blackboxed_frame_reissues_the_step_instead_of_stopping() {
    let mut adapter = Adapter::new();
    let mut agent = FakeAgent::new();

    let (_, _) = adapter.handle_request(
        dp::IncomingRequest {
            seq: 1,
            command: dp::RequestCommand::Launch(dp::LaunchArguments {
                no_debug: false,
                config: jsdap_core::config::LaunchConfig { skip_files: vec!["**/node_modules/**".to_string()], ..Default::default() },
            }),
        },
        &mut agent,
    );

    adapter.handle_runtime_event(
        SessionEvent {
            session_id: "session-1".to_string(),
            body: Event::ScriptParsed(debugger::ScriptParsedEvent {
                script_id: "script-lib".to_string(),
                url: "/w/node_modules/foo/index.js".to_string(),
                start_line: 0,
                start_column: 0,
                end_line: 100,
                end_column: 0,
                source_map_url: Some("index.js.map".to_string()),
                has_source_url: false,
                is_module: false,
            }),
        },
        &mut agent,
    );
    let (loaded_sources_response, _) =
        adapter.handle_request(dp::IncomingRequest { seq: 2, command: dp::RequestCommand::LoadedSources }, &mut agent);
    let compiled_reference = match loaded_sources_response.body {
        Some(dp::ResponseBody::LoadedSources(body)) => {
            let compiled = body.sources.iter().find(|s| s.name.as_deref() == Some("/w/node_modules/foo/index.js")).expect("compiled source");
            jsdap_core::ids::SourceReference::from_raw(compiled.source_reference)
        }
        _ => panic!("expected a loadedSources response"),
    };
    adapter.attach_source_map(compiled_reference, node_modules_map());

    adapter.handle_runtime_event(
        SessionEvent {
            session_id: "session-1".to_string(),
            body: Event::ScriptParsed(debugger::ScriptParsedEvent {
                script_id: "script-app".to_string(),
                url: "/w/app.js".to_string(),
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

    adapter.handle_request(
        dp::IncomingRequest { seq: 3, command: dp::RequestCommand::StepIn(dp::StepInArguments { thread_id }) },
        &mut agent,
    );
    assert_eq!(*agent.step_into_calls.borrow(), 1);

    let blackboxed_pause = SessionEvent {
        session_id: "session-1".to_string(),
        body: Event::Paused(debugger::PausedEvent {
            call_frames: vec![minimal_call_frame("script-lib", 10)],
            reason: debugger::PausedReason::Other,
            data: serde_json::Value::Null,
            hit_breakpoints: Vec::new(),
            async_stack_trace: None,
        }),
    };
    let events = adapter.handle_runtime_event(blackboxed_pause, &mut agent);
    assert!(events.is_empty(), "a blackboxed frame must not surface a stopped event");
    assert_eq!(*agent.step_into_calls.borrow(), 2, "the step must be reissued exactly once");

    let real_pause = SessionEvent {
        session_id: "session-1".to_string(),
        body: Event::Paused(debugger::PausedEvent {
            call_frames: vec![minimal_call_frame("script-app", 3)],
            reason: debugger::PausedReason::Other,
            data: serde_json::Value::Null,
            hit_breakpoints: Vec::new(),
            async_stack_trace: None,
        }),
    };
    let events = adapter.handle_runtime_event(real_pause, &mut agent);
    match events.as_slice() {
        [dp::OutgoingEvent::Stopped(body)] => assert_eq!(body.reason, dp::StoppedReason::Step),
        other => panic!("expected a single stopped event, got {other:?}"),
    }
    assert_eq!(*agent.step_into_calls.borrow(), 2, "no further step should be issued once a real frame is hit");
}
