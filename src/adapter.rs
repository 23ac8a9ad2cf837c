//! C10: the session façade DP transports and RP transports both talk to --
//! `dispatch` turns one decoded DP request into a response plus whatever
//! events fall out of handling it, `handle_runtime_event` does the same for
//! one RP event.
//!
//! Grounded on `albertleigh-boa`'s `dap::session.rs` request-routing shape
//! (one big command match owning every piece of per-session state), with
//! the RP event side added from `atl-lang-atlas`'s debugger event dispatch,
//! since the teacher has no separate out-of-process event stream of its
//! own. Field-disjoint borrows (`self.threads.get_mut(..)` alongside
//! `&mut self.variables`) are used throughout rather than routing through
//! helpers that would re-borrow all of `self`.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

use crate::breakpoint_manager::BreakpointManager;
use crate::breakpoint_predictor::{
    BreakpointPredictor, CompiledFileMetadata, LongPredictionEvent, MapLoader, PathResolver, PredictedLocation,
    PredictorCacheWriter,
};
use crate::config::LaunchConfig;
use crate::dp;
use crate::error::{AdapterError, AdapterResult};
use crate::exception_breakpoints::{self, CustomBreakpointState};
use crate::ids::{self, BreakpointId, FrameId, SourceReference, ThreadId, VariablesReference};
use crate::managers::{TargetManager, ThreadManager};
use crate::rp::runtime::RemoteObject;
use crate::rp::{debugger, page, runtime, target, Call, CallResult, Event, RuntimeAgent, SessionEvent};
use crate::source_container::{CompiledSourceDescriptor, InlineSourceRange, RawLocation, ResolvedPath, SourceContainer};
use crate::source_path_resolver::SourcePathResolver;
use crate::sourcemap::{Position, SourceMap};
use crate::variables::VariableStore;

/// Reserved thread used for `revealLocation`, never a real RP target.
const REVEAL_FRAME_ID: i64 = i64::MAX;

/// JS snippets `readMemory`/`writeMemory` evaluate against the object a
/// `memoryReference` names, since RP has no direct byte-addressed memory
/// access of its own -- just `Runtime.callFunctionOn`.
const READ_MEMORY_TEMPLATE: &str = "function(offset, count) { \
    const view = new Uint8Array(this.buffer ?? this); \
    const out = []; \
    for (let i = offset; i < offset + count && i < view.length; i++) out.push(view[i]); \
    return out; \
}";

const WRITE_MEMORY_TEMPLATE: &str = "function(offset, bytes) { \
    const view = new Uint8Array(this.buffer ?? this); \
    for (let i = 0; i < bytes.length; i++) view[offset + i] = bytes[i]; \
    return bytes.length; \
}";

/// A synthetic pause location the client asked to be shown, independent of
/// any real runtime stop. Lives only as long as the client hasn't resumed
/// the reserved reveal thread.
struct RevealState {
    source: dp::Source,
    line: i64,
    column: i64,
}

/// Everything one debug session owns. Deliberately a plain struct rather
/// than a collection of globals: a host embedding multiple sessions just
/// keeps one `SessionContext` per session.
struct SessionContext {
    source_container: SourceContainer,
    resolver: SourcePathResolver,
    breakpoints: BreakpointManager,
    targets: TargetManager,
    threads: ThreadManager,
    variables: VariableStore,
    custom_breakpoints: CustomBreakpointState,
    exception_filters: Vec<String>,
    predictor: BreakpointPredictor,
    cache_writer: Option<PredictorCacheWriter>,
    config: LaunchConfig,
    /// RP `scriptId` -> the source it was registered under.
    script_sources: HashMap<String, SourceReference>,
    /// Inverse of `script_sources`, plus which session owns the script, for
    /// `source` requests that need to fall back to `Debugger.getScriptSource`.
    rp_script_ids: HashMap<SourceReference, (String, String)>,
    cancelled: HashSet<i64>,
    reveal: Option<RevealState>,
}

/// The session used to issue launch-time calls (`Target.setDiscoverTargets`,
/// `Page.navigate`) before any real target has attached.
const ROOT_SESSION: &str = "";

impl SessionContext {
    fn new() -> Self {
        Self {
            source_container: SourceContainer::new(&[]),
            resolver: SourcePathResolver::default(),
            breakpoints: BreakpointManager::new(SourcePathResolver::default()),
            targets: TargetManager::new(),
            threads: ThreadManager::new(),
            variables: VariableStore::new(),
            custom_breakpoints: CustomBreakpointState::new(),
            exception_filters: Vec::new(),
            predictor: BreakpointPredictor::new(&[]),
            cache_writer: None,
            config: LaunchConfig::default(),
            script_sources: HashMap::new(),
            rp_script_ids: HashMap::new(),
            cancelled: HashSet::new(),
            reveal: None,
        }
    }

    fn attached_sessions(&self) -> Vec<String> {
        self.threads.all().map(|t| t.session_id.clone()).collect()
    }

    fn thread_owning_frame(&self, frame_id: FrameId) -> AdapterResult<ThreadId> {
        self.threads
            .all()
            .find(|t| {
                t.paused_details()
                    .map(|p| p.stack_trace.cached_frames().iter().any(|f| f.id == frame_id))
                    .unwrap_or(false)
            })
            .map(|t| t.id)
            .ok_or_else(|| AdapterError::silent("Thread not found"))
    }

    fn frame_session_and_call_id(&self, frame_id: FrameId) -> AdapterResult<(String, Option<String>)> {
        for thread in self.threads.all() {
            if let Some(paused) = thread.paused_details() {
                if let Some(frame) = paused.stack_trace.cached_frames().iter().find(|f| f.id == frame_id) {
                    return Ok((thread.session_id.clone(), frame.call_frame_id.clone()));
                }
            }
        }
        Err(AdapterError::silent("Thread not found"))
    }

    fn first_session(&self) -> AdapterResult<String> {
        self.threads
            .all()
            .next()
            .map(|t| t.session_id.clone())
            .ok_or_else(|| AdapterError::silent("Thread not found"))
    }

    fn on_launch(&mut self, args: dp::LaunchArguments, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        let config = args.config;
        self.resolver = SourcePathResolver::from_config(&config);
        self.source_container = SourceContainer::new(&config.skip_files);
        self.breakpoints = BreakpointManager::new(self.resolver.clone());
        self.predictor = BreakpointPredictor::new(&config.out_files);
        self.cache_writer = config.workspace_cache_path.clone().map(PredictorCacheWriter::new);
        self.script_sources.clear();
        self.rp_script_ids.clear();

        self.targets.enable(agent, ROOT_SESSION)?;
        if let Some(url) = &config.url {
            agent.call(ROOT_SESSION, Call::PageEnable)?;
            agent.call(ROOT_SESSION, Call::Navigate(page::NavigateParams { url: url.clone() }))?;
        }

        self.config = config;
        Ok(())
    }

    fn on_source(&mut self, args: dp::SourceArguments, agent: &mut dyn RuntimeAgent) -> AdapterResult<dp::SourceResponseBody> {
        let reference = self.resolve_source_reference(&args)?;
        if let Some(content) = self.source_container.get(reference).and_then(|s| s.content()) {
            return Ok(dp::SourceResponseBody {
                content: content.to_string(),
                mime_type: None,
            });
        }

        let (session_id, script_id) = self
            .rp_script_ids
            .get(&reference)
            .cloned()
            .ok_or_else(|| AdapterError::user("Source content is not available"))?;
        match agent.call(&session_id, Call::GetScriptSource(debugger::GetScriptSourceParams { script_id }))? {
            CallResult::GetScriptSource(result) => Ok(dp::SourceResponseBody {
                content: result.script_source,
                mime_type: None,
            }),
            _ => Err(AdapterError::silent("unexpected runtime response")),
        }
    }

    fn resolve_source_reference(&self, args: &dp::SourceArguments) -> AdapterResult<SourceReference> {
        if let Some(reference) = args.source_reference.filter(|r| r.get() != 0) {
            return Ok(reference);
        }
        if let Some(source) = &args.source {
            if source.source_reference != 0 {
                return Ok(SourceReference::from_raw(source.source_reference));
            }
            if let Some(path) = &source.path {
                if let Some(url) = self.resolver.absolute_path_to_url(path) {
                    if let Some(reference) = self.source_container.find_by_url(&url) {
                        return Ok(reference);
                    }
                }
            }
        }
        Err(AdapterError::user("Unknown source"))
    }

    /// `setBreakpoints` accepts a source in *authored* coordinates --
    /// possibly an original source behind a map rather than the compiled
    /// script RP binds breakpoints on. Breakpoints on an original source are
    /// translated to the generated location before being handed to
    /// `BreakpointManager`, then the response is translated back so the
    /// client sees exactly the location it asked about, per the mapped
    /// breakpoint walkthrough this crate is tested against.
    fn on_set_breakpoints(
        &mut self,
        args: dp::SetBreakpointsArguments,
        sessions: &[String],
        agent: &mut dyn RuntimeAgent,
    ) -> AdapterResult<dp::SetBreakpointsResponseBody> {
        let mut is_mapped = false;
        let mut translated_source = args.source.clone();
        let mut translated_breakpoints = Vec::with_capacity(args.breakpoints.len());

        for bp in &args.breakpoints {
            match self.resolve_mapped_breakpoint(&args.source, bp.line, bp.column) {
                Some((compiled_url, generated_line, generated_column)) => {
                    is_mapped = true;
                    translated_source = dp::Source { name: Some(compiled_url), ..dp::Source::default() };
                    translated_breakpoints.push(dp::SourceBreakpoint {
                        line: generated_line,
                        column: Some(generated_column),
                        ..bp.clone()
                    });
                }
                None => translated_breakpoints.push(bp.clone()),
            }
        }

        let translated_args = dp::SetBreakpointsArguments { source: translated_source, breakpoints: translated_breakpoints };
        let mut body = self.breakpoints.set_breakpoints(&translated_args, sessions, agent)?;

        if is_mapped {
            for (resolved, requested) in body.breakpoints.iter_mut().zip(&args.breakpoints) {
                resolved.source = Some(args.source.clone());
                resolved.line = Some(requested.line);
                resolved.column = requested.column;
            }
        }
        Ok(body)
    }

    /// Resolves `source` (if it names a source produced from some compiled
    /// source's map) plus a one-based `(line, column)` on it to the compiled
    /// script's url and the generated one-based position on that script.
    /// `None` means `source` is already the compiled script, or isn't known
    /// yet -- the caller falls back to treating the request as unmapped.
    fn resolve_mapped_breakpoint(&self, source: &dp::Source, line: i64, column: Option<i64>) -> Option<(String, i64, i64)> {
        let url = self.dp_source_url(source)?;
        let reference = self.source_container.find_by_url(&url)?;
        let original = self.source_container.get(reference)?;
        if original.is_compiled() {
            return None;
        }
        let line = u32::try_from(line).ok()?;
        let column = column.map_or(1, |c| u32::try_from(c).unwrap_or(1));
        let raw = self.source_container.raw_location(reference, line, column).into_iter().next()?;
        let compiled = self.source_container.get(raw.source)?;
        Some((compiled.url.clone(), i64::from(raw.position.line) + 1, i64::from(raw.position.column) + 1))
    }

    /// The url a `dp::Source` names, following the same path/name resolution
    /// `BreakpointManager` uses so both land on the same `SourceContainer`
    /// key.
    fn dp_source_url(&self, source: &dp::Source) -> Option<String> {
        if let Some(path) = &source.path {
            if let Some(url) = self.resolver.absolute_path_to_url(path) {
                return Some(url);
            }
            return Some(path.clone());
        }
        source.name.clone()
    }

    /// Translates a resolved-by-RP breakpoint location back to an authored
    /// UI location and source, when the compiled script it resolved on maps
    /// to one.
    fn ui_location_for_compiled(&self, compiled_url: &str, line: i64, column: Option<i64>) -> Option<(dp::Source, i64, i64)> {
        let compiled_ref = self.source_container.find_by_url(compiled_url)?;
        let line = u32::try_from(line).ok()?;
        let column = column.map_or(1, |c| u32::try_from(c).unwrap_or(1));
        let raw = RawLocation { source: compiled_ref, position: Position::new(line.saturating_sub(1), column.saturating_sub(1)) };
        let ui = self.source_container.ui_location(raw)?;
        let source = self.source_container.get(ui.source)?;
        Some((source_to_dp(source), i64::from(ui.line), i64::from(ui.column)))
    }

    fn on_exception_info(&self, thread_id: ThreadId) -> AdapterResult<dp::ExceptionInfoResponseBody> {
        let thread = self.threads.get(thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
        let paused = thread.paused_details().ok_or_else(|| AdapterError::user("No thread is paused"))?;
        let exception = paused.exception.as_ref();

        let exception_id = exception
            .and_then(|e| e.class_name.clone())
            .unwrap_or_else(|| "Error".to_string());
        let description = exception.and_then(|e| e.description.clone());
        let stack_trace = if paused.stack_trace.cached_frames().is_empty() {
            None
        } else {
            Some(
                paused
                    .stack_trace
                    .cached_frames()
                    .iter()
                    .map(|f| format!("    at {}", f.name))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        };

        Ok(dp::ExceptionInfoResponseBody {
            exception_id,
            description,
            break_mode: dp::ExceptionBreakMode::Always,
            details: exception.map(|e| dp::ExceptionDetails {
                message: e.description.clone(),
                full_type_name: e.class_name.clone(),
                stack_trace: stack_trace.clone(),
            }),
        })
    }

    /// `memoryReference` is the decimal `VariablesReference` of the
    /// memory-backed container `describe_remote_object` registered for it,
    /// not an RP object id -- resolved back to the session/object pair the
    /// call actually needs.
    fn resolve_memory_reference(&self, memory_reference: &str) -> AdapterResult<(String, String)> {
        let reference = memory_reference
            .parse::<i64>()
            .map(VariablesReference::from_raw)
            .map_err(|_| AdapterError::user("Invalid memory reference"))?;
        self.variables
            .resolve_memory_reference(reference)
            .ok_or_else(|| AdapterError::user("Invalid memory reference"))
    }

    fn on_read_memory(&mut self, args: dp::ReadMemoryArguments, agent: &mut dyn RuntimeAgent) -> AdapterResult<dp::ReadMemoryResponseBody> {
        let (session_id, object_id) = self.resolve_memory_reference(&args.memory_reference)?;
        let call = Call::CallFunctionOn(runtime::CallFunctionOnParams {
            function_declaration: READ_MEMORY_TEMPLATE.to_string(),
            object_id: Some(object_id),
            arguments: vec![
                runtime::CallArgument {
                    value: Some(serde_json::json!(args.offset)),
                    object_id: None,
                },
                runtime::CallArgument {
                    value: Some(serde_json::json!(args.count)),
                    object_id: None,
                },
            ],
            silent: true,
            generate_preview: false,
            execution_context_id: None,
            throw_on_side_effect: false,
        });
        match agent.call(&session_id, call)? {
            CallResult::CallFunctionOn(result) if result.exception_details.is_none() => {
                let bytes: Vec<u8> = result
                    .result
                    .value
                    .as_ref()
                    .and_then(|v| v.as_array())
                    .map(|values| values.iter().filter_map(|b| b.as_u64()).map(|b| b as u8).collect())
                    .unwrap_or_default();
                let unreadable = args.count - bytes.len() as i64;
                Ok(dp::ReadMemoryResponseBody {
                    address: args.memory_reference,
                    unreadable_bytes: (unreadable > 0).then_some(unreadable),
                    data: Some(BASE64_STANDARD.encode(&bytes)),
                })
            }
            CallResult::CallFunctionOn(result) => Err(AdapterError::user(
                result.exception_details.map(|d| d.text).unwrap_or_else(|| "read failed".to_string()),
            )),
            _ => Err(AdapterError::silent("unexpected runtime response")),
        }
    }

    fn on_write_memory(&mut self, args: dp::WriteMemoryArguments, agent: &mut dyn RuntimeAgent) -> AdapterResult<dp::WriteMemoryResponseBody> {
        let (session_id, object_id) = self.resolve_memory_reference(&args.memory_reference)?;
        let bytes = BASE64_STANDARD
            .decode(&args.data)
            .map_err(|e| AdapterError::user(format!("invalid base64 memory data: {e}")))?;

        let call = Call::CallFunctionOn(runtime::CallFunctionOnParams {
            function_declaration: WRITE_MEMORY_TEMPLATE.to_string(),
            object_id: Some(object_id),
            arguments: vec![
                runtime::CallArgument {
                    value: Some(serde_json::json!(args.offset)),
                    object_id: None,
                },
                runtime::CallArgument {
                    value: Some(serde_json::json!(bytes)),
                    object_id: None,
                },
            ],
            silent: true,
            generate_preview: false,
            execution_context_id: None,
            throw_on_side_effect: false,
        });
        match agent.call(&session_id, call)? {
            CallResult::CallFunctionOn(result) if result.exception_details.is_none() => Ok(dp::WriteMemoryResponseBody {
                bytes_written: result.result.value.as_ref().and_then(|v| v.as_i64()),
            }),
            CallResult::CallFunctionOn(result) => Err(AdapterError::user(
                result.exception_details.map(|d| d.text).unwrap_or_else(|| "write failed".to_string()),
            )),
            _ => Err(AdapterError::silent("unexpected runtime response")),
        }
    }

    /// One DP request in, one response body plus whatever events fell out
    /// of handling it.
    #[allow(clippy::too_many_lines)]
    fn dispatch(
        &mut self,
        command: dp::RequestCommand,
        agent: &mut dyn RuntimeAgent,
    ) -> AdapterResult<(Option<dp::ResponseBody>, Vec<dp::OutgoingEvent>)> {
        let result = match command {
            dp::RequestCommand::Initialize(_) => (
                Some(dp::ResponseBody::Initialize(dp::Capabilities::default())),
                vec![dp::OutgoingEvent::Initialized],
            ),

            dp::RequestCommand::Launch(args) => {
                self.on_launch(args, agent)?;
                (None, Vec::new())
            }

            dp::RequestCommand::ConfigurationDone => (None, Vec::new()),

            dp::RequestCommand::Terminate => (None, vec![dp::OutgoingEvent::Terminated(dp::TerminatedEventBody::default())]),

            dp::RequestCommand::Disconnect(args) => (
                None,
                vec![dp::OutgoingEvent::Terminated(dp::TerminatedEventBody { restart: args.restart })],
            ),

            dp::RequestCommand::Restart => (
                None,
                vec![dp::OutgoingEvent::Terminated(dp::TerminatedEventBody { restart: true })],
            ),

            dp::RequestCommand::Threads => {
                let mut threads = self.threads.to_dp_list();
                if let Some(reveal) = &self.reveal {
                    let _ = reveal;
                    threads.push(dp::Thread {
                        id: ThreadId::from_raw(ids::REVEAL_THREAD_ID),
                        name: "Reveal".to_string(),
                    });
                }
                (Some(dp::ResponseBody::Threads(dp::ThreadsResponseBody { threads })), Vec::new())
            }

            dp::RequestCommand::Continue(args) => {
                if args.thread_id.get() == ids::REVEAL_THREAD_ID {
                    self.reveal = None;
                    let continued = dp::ContinuedEventBody {
                        thread_id: args.thread_id,
                        all_threads_continued: false,
                    };
                    let exited = dp::ThreadEventBody {
                        reason: dp::ThreadEventReason::Exited,
                        thread_id: args.thread_id,
                    };
                    (
                        Some(dp::ResponseBody::Continue(dp::ContinueResponseBody::default())),
                        vec![dp::OutgoingEvent::Continued(continued), dp::OutgoingEvent::Thread(exited)],
                    )
                } else {
                    let thread = self.threads.get_mut(args.thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
                    let body = thread.continue_(&mut self.variables, agent)?;
                    (
                        Some(dp::ResponseBody::Continue(dp::ContinueResponseBody {
                            all_threads_continued: body.all_threads_continued,
                        })),
                        vec![dp::OutgoingEvent::Continued(body)],
                    )
                }
            }

            dp::RequestCommand::Pause(args) => {
                let thread = self.threads.get_mut(args.thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
                thread.pause(agent)?;
                (None, Vec::new())
            }

            dp::RequestCommand::Next(args) => {
                let thread = self.threads.get_mut(args.thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
                thread.step_over(&mut self.variables, agent)?;
                (None, Vec::new())
            }

            dp::RequestCommand::StepIn(args) => {
                let thread = self.threads.get_mut(args.thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
                thread.step_into(&mut self.variables, agent)?;
                (None, Vec::new())
            }

            dp::RequestCommand::StepOut(args) => {
                let thread = self.threads.get_mut(args.thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
                thread.step_out(&mut self.variables, agent)?;
                (None, Vec::new())
            }

            dp::RequestCommand::RestartFrame(args) => {
                let thread_id = self.thread_owning_frame(args.frame_id)?;
                let thread = self.threads.get_mut(thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
                thread.restart_frame(args.frame_id, agent)?;
                (None, Vec::new())
            }

            dp::RequestCommand::StackTrace(args) => {
                if args.thread_id.get() == ids::REVEAL_THREAD_ID {
                    let reveal = self.reveal.as_ref().ok_or_else(|| AdapterError::silent("Thread not found"))?;
                    let frame = dp::StackFrame {
                        id: FrameId::from_raw(REVEAL_FRAME_ID),
                        name: "reveal".to_string(),
                        source: Some(reveal.source.clone()),
                        line: reveal.line,
                        column: reveal.column,
                        can_restart: false,
                        presentation_hint: None,
                    };
                    (
                        Some(dp::ResponseBody::StackTrace(dp::StackTraceResponseBody {
                            stack_frames: vec![frame],
                            total_frames: 1,
                        })),
                        Vec::new(),
                    )
                } else {
                    let script_sources = &self.script_sources;
                    let resolve_script = move |script_id: &str| script_sources.get(script_id).copied();
                    let start_frame = args.start_frame.unwrap_or(0);

                    let thread = self.threads.get_mut(args.thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
                    let total_frames = thread.total_frames()?;
                    let frames = thread.stack_trace_window(start_frame, args.levels, resolve_script)?;
                    let stack_frames: Vec<dp::StackFrame> = frames.iter().map(|f| f.to_dp(&self.source_container)).collect();

                    (
                        Some(dp::ResponseBody::StackTrace(dp::StackTraceResponseBody { stack_frames, total_frames })),
                        Vec::new(),
                    )
                }
            }

            dp::RequestCommand::Scopes(args) => {
                let thread_id = self.thread_owning_frame(args.frame_id)?;
                let thread = self.threads.get_mut(thread_id).ok_or_else(|| AdapterError::silent("Thread not found"))?;
                let scopes = thread.scopes(args.frame_id, &mut self.variables)?;
                (Some(dp::ResponseBody::Scopes(dp::ScopesResponseBody { scopes })), Vec::new())
            }

            dp::RequestCommand::Variables(args) => {
                let variables = self
                    .variables
                    .get_children(args.variables_reference, args.filter, args.start, args.count, agent);
                (Some(dp::ResponseBody::Variables(dp::VariablesResponseBody { variables })), Vec::new())
            }

            dp::RequestCommand::SetVariable(args) => {
                let variable = self.variables.set_variable(args.variables_reference, &args.name, &args.value, agent)?;
                (
                    Some(dp::ResponseBody::SetVariable(dp::SetVariableResponseBody {
                        value: variable.value,
                        variables_reference: variable.variables_reference,
                    })),
                    Vec::new(),
                )
            }

            dp::RequestCommand::Evaluate(args) => {
                let (session_id, call_frame_id) = match args.frame_id {
                    Some(frame_id) => self.frame_session_and_call_id(frame_id)?,
                    None => (self.first_session()?, None),
                };
                let silent = matches!(args.context, dp::EvaluateContext::Hover);
                let object = evaluate_expression(&session_id, call_frame_id, args.expression, silent, silent, agent)?;
                let (value, type_, variables_reference) = self.variables.register_evaluation_result(&session_id, object);
                (
                    Some(dp::ResponseBody::Evaluate(dp::EvaluateResponseBody {
                        result: value,
                        type_,
                        variables_reference,
                    })),
                    Vec::new(),
                )
            }

            dp::RequestCommand::Completions(args) => {
                let targets = self.on_completions(args, agent);
                (Some(dp::ResponseBody::Completions(dp::CompletionsResponseBody { targets })), Vec::new())
            }

            dp::RequestCommand::LoadedSources => {
                let sources = self.source_container.all().map(source_to_dp).collect();
                (Some(dp::ResponseBody::LoadedSources(dp::LoadedSourcesResponseBody { sources })), Vec::new())
            }

            dp::RequestCommand::Source(args) => {
                let body = self.on_source(args, agent)?;
                (Some(dp::ResponseBody::Source(body)), Vec::new())
            }

            dp::RequestCommand::SetBreakpoints(args) => {
                let sessions = self.attached_sessions();
                let body = self.on_set_breakpoints(args, &sessions, agent)?;
                (Some(dp::ResponseBody::SetBreakpoints(body)), Vec::new())
            }

            dp::RequestCommand::SetExceptionBreakpoints(args) => {
                self.exception_filters = args.filters;
                for session_id in self.attached_sessions() {
                    exception_breakpoints::apply_exception_filters(&self.exception_filters, agent, &session_id)?;
                }
                (None, Vec::new())
            }

            dp::RequestCommand::ExceptionInfo(args) => {
                let body = self.on_exception_info(args.thread_id)?;
                (Some(dp::ResponseBody::ExceptionInfo(body)), Vec::new())
            }

            dp::RequestCommand::UpdateCustomBreakpoints(args) => {
                self.custom_breakpoints.update(&args.breakpoints);
                let sessions = self.attached_sessions();
                for update in &args.breakpoints {
                    let Some(descriptor) = exception_breakpoints::find(&update.id) else {
                        continue;
                    };
                    for session_id in &sessions {
                        if let Err(err) = descriptor.apply(update.enabled, agent, session_id) {
                            log::warn!("custom breakpoint {} failed to apply on {session_id}: {err}", update.id);
                        }
                    }
                }
                (None, Vec::new())
            }

            dp::RequestCommand::ReadMemory(args) => {
                let body = self.on_read_memory(args, agent)?;
                (Some(dp::ResponseBody::ReadMemory(body)), Vec::new())
            }

            dp::RequestCommand::WriteMemory(args) => {
                let body = self.on_write_memory(args, agent)?;
                (Some(dp::ResponseBody::WriteMemory(body)), Vec::new())
            }

            dp::RequestCommand::Cancel(args) => {
                if let Some(request_id) = args.request_id {
                    self.cancelled.insert(request_id);
                }
                (None, Vec::new())
            }
        };
        Ok(result)
    }

    /// `text` is split at its last `.`; everything before it is evaluated as
    /// the base expression and its own properties become the candidates,
    /// filtered by what follows the `.`. No base expression (no `.` at all)
    /// means there is nothing to complete against yet.
    fn on_completions(&mut self, args: dp::CompletionsArguments, agent: &mut dyn RuntimeAgent) -> Vec<dp::CompletionItem> {
        let Some((base_expr, prefix)) = args.text.rsplit_once('.') else {
            return Vec::new();
        };
        if base_expr.is_empty() {
            return Vec::new();
        }

        let (session_id, call_frame_id) = match args.frame_id.map(|id| self.frame_session_and_call_id(id)) {
            Some(Ok(resolved)) => resolved,
            Some(Err(_)) => return Vec::new(),
            None => match self.first_session() {
                Ok(session_id) => (session_id, None),
                Err(_) => return Vec::new(),
            },
        };

        let Ok(object) = evaluate_expression(&session_id, call_frame_id, base_expr.to_string(), true, true, agent) else {
            return Vec::new();
        };
        let Some(object_id) = object.object_id else {
            return Vec::new();
        };

        let call = Call::GetProperties(runtime::GetPropertiesParams {
            object_id,
            own_properties: true,
            accessor_properties_only: false,
            generate_preview: false,
        });
        match agent.call(&session_id, call) {
            Ok(CallResult::GetProperties(result)) => result
                .result
                .into_iter()
                .filter(|p| p.name.starts_with(prefix))
                .map(|p| dp::CompletionItem { label: p.name, type_: None })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn handle_runtime_event(&mut self, event: SessionEvent, agent: &mut dyn RuntimeAgent) -> Vec<dp::OutgoingEvent> {
        let SessionEvent { session_id, body } = event;
        match body {
            Event::ScriptParsed(e) => self.on_script_parsed(&session_id, e),
            Event::Paused(e) => self.on_paused(&session_id, e, agent),
            Event::Resumed => self.on_resumed(&session_id),
            Event::ConsoleApiCalled(e) => self.on_console_api_called(&session_id, e),
            Event::ExceptionThrown(e) => self.on_exception_thrown(&session_id, e),
            Event::ExecutionContextsCleared => {
                if let Some(thread) = self.threads.thread_for_session_mut(&session_id) {
                    thread.on_execution_contexts_cleared();
                }
                Vec::new()
            }
            Event::ExecutionContextCreated(_) | Event::ExecutionContextDestroyed(_) => Vec::new(),
            Event::BreakpointResolved(e) => match self.breakpoints.on_breakpoint_resolved(e) {
                Some((compiled_url, mut body)) => {
                    let ui = body
                        .breakpoint
                        .line
                        .and_then(|line| self.ui_location_for_compiled(&compiled_url, line, body.breakpoint.column));
                    if let Some((source, ui_line, ui_column)) = ui {
                        body.breakpoint.source = Some(source);
                        body.breakpoint.line = Some(ui_line);
                        body.breakpoint.column = Some(ui_column);
                    }
                    vec![dp::OutgoingEvent::Breakpoint(body)]
                }
                None => Vec::new(),
            },
            Event::TargetCreated(e) => {
                self.targets.on_target_created(e);
                Vec::new()
            }
            Event::TargetInfoChanged(e) => {
                self.targets.on_target_info_changed(e);
                Vec::new()
            }
            Event::AttachedToTarget(e) => self.on_attached_to_target(e, agent),
            Event::DetachedFromTarget(e) => self
                .threads
                .on_detached_from_target(e)
                .map(dp::OutgoingEvent::Thread)
                .into_iter()
                .collect(),
        }
    }

    fn on_script_parsed(&mut self, session_id: &str, event: debugger::ScriptParsedEvent) -> Vec<dp::OutgoingEvent> {
        let resolved_path = self.resolver.url_to_absolute_path(&event.url).map(|absolute_path| ResolvedPath {
            absolute_path: Some(absolute_path),
            name: event.url.clone(),
        });
        let reference = self.source_container.add_compiled_source(
            CompiledSourceDescriptor {
                url: event.url.clone(),
                resolved_path,
                inline_source_range: Some(InlineSourceRange {
                    start_line: event.start_line.max(0) as u32,
                    start_column: event.start_column.max(0) as u32,
                    end_line: event.end_line.max(0) as u32,
                    end_column: event.end_column.max(0) as u32,
                }),
                content: None,
            },
            None,
        );

        self.script_sources.insert(event.script_id.clone(), reference);
        self.rp_script_ids.insert(reference, (session_id.to_string(), event.script_id));
        if let Some(thread) = self.threads.thread_for_session_mut(session_id) {
            thread.note_script(reference);
        }

        self.source_container
            .drain_events()
            .into_iter()
            .map(|e| {
                let reason = match e.reason {
                    crate::source_container::LoadedSourceReason::New => dp::LoadedSourceReason::New,
                    crate::source_container::LoadedSourceReason::Removed => dp::LoadedSourceReason::Removed,
                };
                let source = self.source_container.get(e.source).map(source_to_dp).unwrap_or_default();
                dp::OutgoingEvent::LoadedSource(dp::LoadedSourceEventBody { reason, source })
            })
            .collect()
    }

    fn on_paused(&mut self, session_id: &str, event: debugger::PausedEvent, agent: &mut dyn RuntimeAgent) -> Vec<dp::OutgoingEvent> {
        let Some(thread_id) = self.threads.thread_for_session(session_id) else {
            return Vec::new();
        };

        let script_sources = &self.script_sources;
        let resolve_script = move |script_id: &str| script_sources.get(script_id).copied();
        let breakpoints = &self.breakpoints;
        let resolve_breakpoint_id = move |rp_id: &str| breakpoints.resolve_rp_id(rp_id);
        let source_container = &self.source_container;

        let Some(thread) = self.threads.get_mut(thread_id) else {
            return Vec::new();
        };

        match thread.on_paused(event, source_container, resolve_script, resolve_breakpoint_id, agent) {
            Ok(Some(body)) => vec![dp::OutgoingEvent::Stopped(body)],
            Ok(None) => Vec::new(),
            Err(err) => {
                log::warn!("failed to process paused event on {session_id}: {err}");
                Vec::new()
            }
        }
    }

    fn on_resumed(&mut self, session_id: &str) -> Vec<dp::OutgoingEvent> {
        let Some(thread) = self.threads.thread_for_session_mut(session_id) else {
            return Vec::new();
        };
        let body = thread.on_resumed(&mut self.variables);
        vec![dp::OutgoingEvent::Continued(body)]
    }

    fn on_console_api_called(&mut self, session_id: &str, event: runtime::ConsoleApiCalledEvent) -> Vec<dp::OutgoingEvent> {
        let Some(thread) = self.threads.thread_for_session_mut(session_id) else {
            return Vec::new();
        };
        thread
            .on_console_api_called(event, &mut self.variables)
            .map(dp::OutgoingEvent::Output)
            .into_iter()
            .collect()
    }

    fn on_exception_thrown(&mut self, session_id: &str, event: runtime::ExceptionThrownEvent) -> Vec<dp::OutgoingEvent> {
        let Some(thread) = self.threads.thread_for_session_mut(session_id) else {
            return Vec::new();
        };
        let body = thread.on_exception_thrown(event, &mut self.variables);
        vec![dp::OutgoingEvent::Output(body)]
    }

    fn on_attached_to_target(&mut self, event: target::AttachedToTargetEvent, agent: &mut dyn RuntimeAgent) -> Vec<dp::OutgoingEvent> {
        let session_id = event.session_id.clone();
        let body = match self.threads.on_attached_to_target(event, agent) {
            Ok(body) => body,
            Err(err) => {
                log::warn!("failed to attach thread for session {session_id}: {err}");
                return Vec::new();
            }
        };

        if let Err(err) = self.breakpoints.attach_session(&session_id, agent) {
            log::warn!("failed to reissue breakpoints on session {session_id}: {err}");
        }
        self.custom_breakpoints.apply_all(agent, &session_id);
        if let Err(err) = exception_breakpoints::apply_exception_filters(&self.exception_filters, agent, &session_id) {
            log::warn!("failed to apply exception filters on session {session_id}: {err}");
        }

        vec![dp::OutgoingEvent::Thread(body)]
    }
}

fn evaluate_expression(
    session_id: &str,
    call_frame_id: Option<String>,
    expression: String,
    silent: bool,
    throw_on_side_effect: bool,
    agent: &mut dyn RuntimeAgent,
) -> AdapterResult<RemoteObject> {
    match call_frame_id {
        Some(call_frame_id) => {
            let call = Call::EvaluateOnCallFrame(debugger::EvaluateOnCallFrameParams {
                call_frame_id,
                expression,
                silent,
                throw_on_side_effect,
                generate_preview: false,
            });
            match agent.call(session_id, call)? {
                CallResult::EvaluateOnCallFrame(r) if r.exception_details.is_none() => Ok(r.result),
                CallResult::EvaluateOnCallFrame(r) => Err(AdapterError::user(
                    r.exception_details.map(|d| d.text).unwrap_or_else(|| "evaluation failed".to_string()),
                )),
                _ => Err(AdapterError::silent("unexpected runtime response")),
            }
        }
        None => {
            let call = Call::Evaluate(runtime::EvaluateParams {
                expression,
                context_id: None,
                silent,
                throw_on_side_effect,
                generate_preview: false,
            });
            match agent.call(session_id, call)? {
                CallResult::Evaluate(r) if r.exception_details.is_none() => Ok(r.result),
                CallResult::Evaluate(r) => Err(AdapterError::user(
                    r.exception_details.map(|d| d.text).unwrap_or_else(|| "evaluation failed".to_string()),
                )),
                _ => Err(AdapterError::silent("unexpected runtime response")),
            }
        }
    }
}

fn source_to_dp(source: &crate::source_container::Source) -> dp::Source {
    let absolute_path = source.resolved_path.as_ref().and_then(|p| p.absolute_path.clone());
    dp::Source {
        name: Some(source.url.clone()),
        source_reference: if absolute_path.is_some() { 0 } else { source.source_reference.get() },
        path: absolute_path,
        origin: None,
        sources: Vec::new(),
    }
}

/// The per-session façade a DP transport drives and an RP transport feeds
/// events into.
pub struct Adapter {
    ctx: SessionContext,
}

impl Adapter {
    pub fn new() -> Self {
        Self { ctx: SessionContext::new() }
    }

    /// Handles one decoded DP request, producing its response and any
    /// events the handling triggered. Every [`AdapterError`] becomes a
    /// failure response carrying its message -- `Silent` variants already
    /// hold generic, non-alarming text, so no special-casing is needed here.
    pub fn handle_request(&mut self, request: dp::IncomingRequest, agent: &mut dyn RuntimeAgent) -> (dp::OutgoingResponse, Vec<dp::OutgoingEvent>) {
        match self.ctx.dispatch(request.command, agent) {
            Ok((body, events)) => (dp::OutgoingResponse::ok(request.seq, body), events),
            Err(err) => (dp::OutgoingResponse::failure(request.seq, err.to_string()), Vec::new()),
        }
    }

    /// Handles one RP event, producing whatever DP events it implies.
    pub fn handle_runtime_event(&mut self, event: SessionEvent, agent: &mut dyn RuntimeAgent) -> Vec<dp::OutgoingEvent> {
        self.ctx.handle_runtime_event(event, agent)
    }

    /// Synthesizes a pause at `source`/`line`/`column` without a real
    /// runtime stop, for "reveal in editor" navigation. The reserved reveal
    /// thread stays alive (and visible in `threads`) until the client
    /// issues `continue` against it.
    pub fn reveal_location(&mut self, source: dp::Source, line: i64, column: i64) -> Vec<dp::OutgoingEvent> {
        self.ctx.reveal = Some(RevealState { source, line, column });
        let thread_id = ThreadId::from_raw(ids::REVEAL_THREAD_ID);
        vec![
            dp::OutgoingEvent::Thread(dp::ThreadEventBody {
                reason: dp::ThreadEventReason::Started,
                thread_id,
            }),
            dp::OutgoingEvent::Stopped(dp::StoppedEventBody {
                reason: dp::StoppedReason::Goto,
                description: None,
                thread_id: Some(thread_id),
                text: None,
                all_threads_stopped: false,
                hit_breakpoint_ids: None,
            }),
        ]
    }

    /// Whether `cancel` named `request_id`. Cancellation is just bookkeeping
    /// here: `RuntimeAgent::call` is synchronous from this crate's point of
    /// view, so there is no in-flight call of ours to abort -- the transport
    /// consults this at whatever suspension points it owns.
    pub fn is_cancelled(&self, request_id: i64) -> bool {
        self.ctx.cancelled.contains(&request_id)
    }

    pub fn prepare_breakpoint_predictions(
        &mut self,
        files: Vec<CompiledFileMetadata>,
        loader: &dyn MapLoader,
        resolver: &dyn PathResolver,
    ) -> Option<LongPredictionEvent> {
        self.ctx.predictor.prepare_to_predict(files, loader, resolver)
    }

    pub fn predicted_breakpoints(&self, absolute_path: &str, line: u32, column: u32, loader: &dyn MapLoader) -> Vec<PredictedLocation> {
        self.ctx.predictor.predict_breakpoints(absolute_path, line, column, loader)
    }

    pub fn flush_predictor_cache(&mut self, now: std::time::Instant) {
        if let Some(writer) = &mut self.ctx.cache_writer {
            writer.flush_if_due(now);
        }
    }

    /// Attaches a parsed map to a compiled source once the host has fetched
    /// and parsed its bytes; `scriptParsed` itself only names the map's url.
    pub fn attach_source_map(&mut self, reference: SourceReference, map: SourceMap) {
        self.ctx.source_container.attach_source_map(reference, map);
    }
}

impl Default for Adapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAgent;
    impl RuntimeAgent for NoopAgent {
        fn call(&mut self, _session_id: &str, _call: Call) -> AdapterResult<CallResult> {
            Ok(CallResult::Empty)
        }
    }

    #[test]
    fn initialize_reports_default_capabilities_and_sends_initialized() {
        let mut adapter = Adapter::new();
        let mut agent = NoopAgent;
        let (response, events) = adapter.handle_request(
            dp::IncomingRequest {
                seq: 1,
                command: dp::RequestCommand::Initialize(dp::InitializeArguments::default()),
            },
            &mut agent,
        );
        assert!(response.success);
        assert!(matches!(response.body, Some(dp::ResponseBody::Initialize(_))));
        assert!(matches!(events.as_slice(), [dp::OutgoingEvent::Initialized]));
    }

    #[test]
    fn threads_is_empty_before_any_target_attaches() {
        let mut adapter = Adapter::new();
        let mut agent = NoopAgent;
        let (response, _) = adapter.handle_request(dp::IncomingRequest { seq: 2, command: dp::RequestCommand::Threads }, &mut agent);
        match response.body {
            Some(dp::ResponseBody::Threads(body)) => assert!(body.threads.is_empty()),
            _ => panic!("expected a threads response"),
        }
    }

    #[test]
    fn stack_trace_on_an_unknown_thread_fails_silently() {
        let mut adapter = Adapter::new();
        let mut agent = NoopAgent;
        let (response, _) = adapter.handle_request(
            dp::IncomingRequest {
                seq: 3,
                command: dp::RequestCommand::StackTrace(dp::StackTraceArguments {
                    thread_id: ThreadId::from_raw(999),
                    start_frame: None,
                    levels: None,
                }),
            },
            &mut agent,
        );
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Thread not found"));
    }

    #[test]
    fn cancel_is_recorded_and_queryable() {
        let mut adapter = Adapter::new();
        let mut agent = NoopAgent;
        adapter.handle_request(
            dp::IncomingRequest {
                seq: 4,
                command: dp::RequestCommand::Cancel(dp::CancelArguments { request_id: Some(7) }),
            },
            &mut agent,
        );
        assert!(adapter.is_cancelled(7));
        assert!(!adapter.is_cancelled(8));
    }

    #[test]
    fn reveal_location_synthesizes_a_stopped_thread_that_continue_clears() {
        let mut adapter = Adapter::new();
        let mut agent = NoopAgent;
        let source = dp::Source {
            name: Some("a.js".into()),
            ..Default::default()
        };
        let events = adapter.reveal_location(source, 10, 1);
        assert!(matches!(events[0], dp::OutgoingEvent::Thread(_)));
        assert!(matches!(events[1], dp::OutgoingEvent::Stopped(_)));

        let (threads_response, _) = adapter.handle_request(dp::IncomingRequest { seq: 5, command: dp::RequestCommand::Threads }, &mut agent);
        match threads_response.body {
            Some(dp::ResponseBody::Threads(body)) => assert_eq!(body.threads.len(), 1),
            _ => panic!("expected a threads response"),
        }

        let (continue_response, continue_events) = adapter.handle_request(
            dp::IncomingRequest {
                seq: 6,
                command: dp::RequestCommand::Continue(dp::ContinueArguments {
                    thread_id: ThreadId::from_raw(ids::REVEAL_THREAD_ID),
                }),
            },
            &mut agent,
        );
        assert!(continue_response.success);
        assert!(matches!(continue_events[0], dp::OutgoingEvent::Continued(_)));
        assert!(matches!(continue_events[1], dp::OutgoingEvent::Thread(_)));

        let (threads_after, _) = adapter.handle_request(dp::IncomingRequest { seq: 7, command: dp::RequestCommand::Threads }, &mut agent);
        match threads_after.body {
            Some(dp::ResponseBody::Threads(body)) => assert!(body.threads.is_empty()),
            _ => panic!("expected a threads response"),
        }
    }
}
