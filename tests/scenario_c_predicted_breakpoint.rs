//! Breakpoints set on an authored source before the runtime ever attaches
//! are unverified immediately, resolvable through the breakpoint predictor
//! once it has scanned build output, and verified for real once the target
//! attaches and the compiled script's breakpoint resolves.

use std::cell::RefCell;

use jsdap_core::breakpoint_predictor::{CompiledFileMetadata, MapLoader, PathResolver};
use jsdap_core::dp;
use jsdap_core::ids::TargetId;
use jsdap_core::rp::{debugger, target, Call, CallResult, Event, RuntimeAgent, SessionEvent};
use jsdap_core::sourcemap::{FlatSourceMap, MappingRow, Position, SourceMap, SourceMapMetadata};
use jsdap_core::Adapter;

struct FakeAgent {
    set_breakpoint_calls: RefCell<Vec<String>>,
}

impl FakeAgent {
    fn new() -> Self {
        Self { set_breakpoint_calls: RefCell::new(Vec::new()) }
    }
}

impl RuntimeAgent for FakeAgent {
    fn call(&mut self, _session_id: &str, call: Call) -> jsdap_core::AdapterResult<CallResult> {
        match call {
            Call::SetBreakpointByUrl(params) => {
                self.set_breakpoint_calls.borrow_mut().push(params.url.clone().unwrap_or_default());
                // The target has not parsed the script yet: CDP accepts the
                // binding for future matches but reports no location yet.
                Ok(CallResult::SetBreakpointByUrl(debugger::SetBreakpointByUrlResult {
                    breakpoint_id: "rp-bp-1".to_string(),
                    locations: Vec::new(),
                }))
            }
            _ => Ok(CallResult::Empty),
        }
    }
}

fn sample_map() -> SourceMap {
    SourceMap::Flat(FlatSourceMap::new(
        SourceMapMetadata {
            source_map_url: "a.js.map".to_string(),
            compiled_path: "/w/out/a.js".to_string(),
            cache_key: "k".to_string(),
        },
        None,
        vec!["a.ts".to_string()],
        vec![None],
        vec![],
        vec![MappingRow {
            generated: Position::new(41, 9),
            source_index: Some(0),
            original: Some(Position::new(4, 0)),
            name_index: None,
        }],
    ))
}

struct FixedLoader(SourceMap);
impl MapLoader for FixedLoader {
    fn load(&self, _metadata: &CompiledFileMetadata) -> Option<SourceMap> {
        Some(self.0.clone())
    }
}

struct IdentityResolver;
impl PathResolver for IdentityResolver {
    fn resolve(&self, _compiled_path: &str, source_url: &str) -> Option<String> {
        Some(format!("/w/src/{source_url}"))
    }
}

#[test]
fn predicted_breakpoint_resolves_ahead_of_attach_then_verifies_on_attach() {
    let mut adapter = Adapter::new();
    let mut agent = FakeAgent::new();

    let (set_breakpoints_response, _) = adapter.handle_request(
        dp::IncomingRequest {
            seq: 1,
            command: dp::RequestCommand::SetBreakpoints(dp::SetBreakpointsArguments {
                source: dp::Source { name: Some("a.ts".to_string()), ..Default::default() },
                breakpoints: vec![dp::SourceBreakpoint { line: 5, column: Some(1), condition: None, hit_condition: None, log_message: None }],
            }),
        },
        &mut agent,
    );
    match set_breakpoints_response.body {
        Some(dp::ResponseBody::SetBreakpoints(body)) => {
            assert_eq!(body.breakpoints.len(), 1);
            assert!(!body.breakpoints[0].verified);
        }
        _ => panic!("expected a setBreakpoints response"),
    }

    let _ = adapter.prepare_breakpoint_predictions(
        vec![CompiledFileMetadata { compiled_path: "/w/out/a.js".to_string(), source_map_url: "a.js.map".to_string(), mtime: 1 }],
        &FixedLoader(sample_map()),
        &IdentityResolver,
    );
    let predicted = adapter.predicted_breakpoints("/w/src/a.ts", 5, 1, &FixedLoader(sample_map()));
    assert_eq!(predicted.len(), 1);
    assert_eq!(predicted[0].compiled_path, "/w/out/a.js");
    assert_eq!(predicted[0].position, Position::new(41, 9));

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
    assert!(matches!(attach_events.as_slice(), [dp::OutgoingEvent::Thread(_)]));
    assert!(agent.set_breakpoint_calls.borrow().contains(&"a.ts".to_string()));

    let resolved_events = adapter.handle_runtime_event(
        SessionEvent {
            session_id: "session-1".to_string(),
            body: Event::BreakpointResolved(debugger::BreakpointResolvedEvent {
                breakpoint_id: "rp-bp-1".to_string(),
                location: debugger::Location { script_id: "script-1".to_string(), line_number: 41, column_number: Some(9) },
            }),
        },
        &mut agent,
    );
    match resolved_events.as_slice() {
        [dp::OutgoingEvent::Breakpoint(body)] => {
            assert!(body.breakpoint.verified);
        }
        other => panic!("expected a single breakpoint event, got {other:?}"),
    }
}
