//! C7: the `Init -> Normal -> Disposed` state machine a single RP target
//! session is tracked under, including pause/resume bookkeeping and the
//! stepping operations a paused thread exposes.
//!
//! Grounded on `albertleigh-boa`'s pause/resume bookkeeping in
//! `core/engine/src/debugger/mod.rs`, reshaped from a `Condvar`-blocked
//! in-process design into an event-driven one: RP is a separate process, so
//! "the thread is paused" is a fact recorded from an incoming event, not a
//! a blocked call this crate is sitting inside.

use std::collections::HashSet;

use crate::dp;
use crate::error::{AdapterError, AdapterResult};
use crate::ids::{BreakpointId, FrameId, IdGenerator, SourceReference, ThreadId};
use crate::preview;
use crate::rp::debugger::{self, PausedReason};
use crate::rp::runtime::{self, RemoteObject};
use crate::rp::{Call, RuntimeAgent};
use crate::smart_stepper::{SmartStepper, StepClassification};
use crate::source_container::SourceContainer;
use crate::stack_trace::{StackFrame, StackTrace};
use crate::variables::{ScopeVariable, VariableContainer, VariableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Init,
    Normal,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Over,
    Into,
    Out,
}

pub struct PausedDetails {
    pub reason: dp::StoppedReason,
    pub description: Option<String>,
    pub stack_trace: StackTrace,
    pub text: Option<String>,
    pub exception: Option<RemoteObject>,
    pub hit_breakpoint_ids: Vec<BreakpointId>,
}

pub struct Thread {
    pub id: ThreadId,
    pub session_id: String,
    name: String,
    lifecycle: Lifecycle,
    frame_ids: IdGenerator,
    paused: Option<PausedDetails>,
    /// Scripts seen on this thread; cleared on `executionContextsCleared` so
    /// a subsequent reload doesn't accumulate stale source references.
    scripts: HashSet<SourceReference>,
    pending_step: Option<StepKind>,
    smart_stepper: SmartStepper,
}

impl Thread {
    pub fn new(id: ThreadId, session_id: String, name: String) -> Self {
        Self {
            id,
            session_id,
            name,
            lifecycle: Lifecycle::Init,
            frame_ids: IdGenerator::new(),
            paused: None,
            scripts: HashSet::new(),
            pending_step: None,
            smart_stepper: SmartStepper::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    pub fn paused_details(&self) -> Option<&PausedDetails> {
        self.paused.as_ref()
    }

    pub fn paused_details_mut(&mut self) -> Option<&mut PausedDetails> {
        self.paused.as_mut()
    }

    pub fn to_dp(&self) -> dp::Thread {
        dp::Thread {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn note_script(&mut self, source: SourceReference) {
        self.lifecycle = Lifecycle::Normal;
        self.scripts.insert(source);
    }

    pub fn on_execution_contexts_cleared(&mut self) {
        self.scripts.clear();
    }

    pub fn dispose(&mut self) {
        self.lifecycle = Lifecycle::Disposed;
        self.paused = None;
    }

    /// Handles an RP `paused` event, building the DP `stopped` body the
    /// adapter should emit -- or `None` if this pause was swallowed by a
    /// smart-step continuation and the thread is effectively still running.
    #[allow(clippy::too_many_arguments)]
    pub fn on_paused(
        &mut self,
        event: debugger::PausedEvent,
        source_container: &SourceContainer,
        resolve_script: impl Fn(&str) -> Option<SourceReference> + Copy,
        resolve_breakpoint_id: impl Fn(&str) -> Option<BreakpointId>,
        agent: &mut dyn RuntimeAgent,
    ) -> AdapterResult<Option<dp::StoppedEventBody>> {
        let was_step = self.pending_step.take();
        let stack_trace = StackTrace::from_paused(
            &event.call_frames,
            event.async_stack_trace.clone(),
            &mut self.frame_ids,
            resolve_script,
        );

        if let (Some(step), PausedReason::Other) = (was_step, event.reason) {
            if let Some(top) = stack_trace.cached_frames().first() {
                match self.smart_stepper.classify(top, source_container) {
                    StepClassification::Continue => {}
                    StepClassification::SmartStep => {
                        self.pending_step = Some(step);
                        self.reissue_step(step, agent)?;
                        return Ok(None);
                    }
                    StepClassification::ForceStepOut => {
                        self.pending_step = Some(StepKind::Out);
                        agent.call(&self.session_id, Call::StepOut)?;
                        return Ok(None);
                    }
                }
            }
        }
        self.smart_stepper.reset();

        let hit_breakpoint_ids: Vec<BreakpointId> = event
            .hit_breakpoints
            .iter()
            .filter_map(|id| resolve_breakpoint_id(id))
            .collect();
        let reason = classify_reason(event.reason, was_step, !hit_breakpoint_ids.is_empty());

        let exception = extract_exception(&event);
        let (description, text) = if matches!(event.reason, PausedReason::EventListener) {
            let (title, text) = crate::exception_breakpoints::describe_event_listener_pause(&event.data);
            (Some(title), Some(text))
        } else {
            (
                describe_pause(reason, exception.as_ref()),
                exception.as_ref().and_then(|e| e.description.clone()),
            )
        };

        let body = dp::StoppedEventBody {
            reason,
            description: description.clone(),
            thread_id: Some(self.id),
            text,
            all_threads_stopped: false,
            hit_breakpoint_ids: if hit_breakpoint_ids.is_empty() {
                None
            } else {
                Some(hit_breakpoint_ids.clone())
            },
        };

        self.paused = Some(PausedDetails {
            reason,
            description,
            stack_trace,
            text: body.text.clone(),
            exception,
            hit_breakpoint_ids,
        });

        Ok(Some(body))
    }

    /// Clears pause state on an RP `resumed` event (or right before issuing
    /// a continue/step ourselves). Variable references from the ending
    /// pause must resolve to nothing afterwards.
    pub fn on_resumed(&mut self, variables: &mut VariableStore) -> dp::ContinuedEventBody {
        self.paused = None;
        variables.clear();
        dp::ContinuedEventBody {
            thread_id: self.id,
            all_threads_continued: false,
        }
    }

    pub fn continue_(&mut self, variables: &mut VariableStore, agent: &mut dyn RuntimeAgent) -> AdapterResult<dp::ContinuedEventBody> {
        let body = self.on_resumed(variables);
        agent.call(&self.session_id, Call::Resume)?;
        Ok(body)
    }

    pub fn pause(&mut self, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        agent.call(&self.session_id, Call::Pause)?;
        Ok(())
    }

    pub fn step_over(&mut self, variables: &mut VariableStore, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        self.step(StepKind::Over, variables, agent)
    }

    pub fn step_into(&mut self, variables: &mut VariableStore, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        self.step(StepKind::Into, variables, agent)
    }

    pub fn step_out(&mut self, variables: &mut VariableStore, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        self.step(StepKind::Out, variables, agent)
    }

    fn step(&mut self, kind: StepKind, variables: &mut VariableStore, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        self.on_resumed(variables);
        self.pending_step = Some(kind);
        self.reissue_step(kind, agent)
    }

    fn reissue_step(&mut self, kind: StepKind, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        let call = match kind {
            StepKind::Over => Call::StepOver,
            StepKind::Into => Call::StepInto,
            StepKind::Out => Call::StepOut,
        };
        agent.call(&self.session_id, call)?;
        Ok(())
    }

    /// Restarts execution at the named frame. User error if the frame is
    /// unknown, an async separator, or otherwise not directly restartable.
    pub fn restart_frame(&mut self, frame_id: FrameId, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        let call_frame_id = self
            .paused
            .as_ref()
            .and_then(|p| p.stack_trace.cached_frames().iter().find(|f| f.id == frame_id))
            .and_then(|f| f.call_frame_id.clone())
            .ok_or_else(|| AdapterError::user("Cannot restart this frame"))?;

        agent.call(
            &self.session_id,
            Call::RestartFrame(debugger::RestartFrameParams { call_frame_id }),
        )?;
        Ok(())
    }

    /// Total frame count the client's `stackTrace` response should report,
    /// including not-yet-expanded async parents.
    pub fn total_frames(&self) -> AdapterResult<i64> {
        let paused = self.paused.as_ref().ok_or_else(|| AdapterError::user("No thread is paused"))?;
        Ok(paused.stack_trace.total_frames())
    }

    /// Expands and returns the requested frame window, per `stackTrace`'s
    /// `startFrame`/`levels` (`None` levels means "to the end").
    pub fn stack_trace_window(
        &mut self,
        start_frame: i64,
        levels: Option<i64>,
        resolve_script: impl Fn(&str) -> Option<SourceReference> + Copy,
    ) -> AdapterResult<&[StackFrame]> {
        let frame_ids = &mut self.frame_ids;
        let paused = self.paused.as_mut().ok_or_else(|| AdapterError::user("No thread is paused"))?;
        Ok(paused.stack_trace.window(start_frame, levels, frame_ids, resolve_script))
    }

    pub fn scopes(&mut self, frame_id: FrameId, variables: &mut VariableStore) -> AdapterResult<Vec<dp::Scope>> {
        let paused = self
            .paused
            .as_ref()
            .ok_or_else(|| AdapterError::user("No thread is paused"))?;
        let frame = paused
            .stack_trace
            .cached_frames()
            .iter()
            .find(|f| f.id == frame_id)
            .ok_or_else(|| AdapterError::user("Unknown stack frame"))?;

        Ok(frame
            .scope_chain
            .iter()
            .map(|scope| {
                let reference = variables.register(VariableContainer::Scope(ScopeVariable {
                    session_id: self.session_id.clone(),
                    object_id: scope.object.object_id.clone().unwrap_or_default(),
                    extra_properties: Vec::new(),
                }));
                dp::Scope {
                    name: scope.name.clone().unwrap_or_else(|| scope.type_.to_string()),
                    kind: scope_kind(scope.type_),
                    variables_reference: reference,
                    expensive: matches!(scope.type_, debugger::ScopeType::Global),
                    source: None,
                    line: scope.start_location.as_ref().map(|l| l.line_number + 1),
                    column: scope.start_location.as_ref().and_then(|l| l.column_number).map(|c| c + 1),
                }
            })
            .collect())
    }

    /// Formats a `Runtime.consoleAPICalled` event into an output event.
    /// `clear`/`endGroup` carry no user-visible text and are swallowed.
    pub fn on_console_api_called(
        &mut self,
        event: runtime::ConsoleApiCalledEvent,
        variables: &mut VariableStore,
    ) -> Option<dp::OutputEventBody> {
        use runtime::ConsoleApiType;
        if matches!(event.type_, ConsoleApiType::Clear | ConsoleApiType::EndGroup) {
            return None;
        }

        let category = match event.type_ {
            ConsoleApiType::Error | ConsoleApiType::Assert => dp::OutputCategory::Stderr,
            _ => dp::OutputCategory::Stdout,
        };
        let output = preview::format_console_message(&event.args);
        let reference = variables.register(VariableContainer::Output(crate::variables::OutputVariable {
            args: event.args,
            stack_trace_entry: None,
        }));

        Some(dp::OutputEventBody {
            category: Some(category),
            output,
            variables_reference: Some(reference),
        })
    }

    pub fn on_exception_thrown(
        &mut self,
        event: runtime::ExceptionThrownEvent,
        variables: &mut VariableStore,
    ) -> dp::OutputEventBody {
        let reference = variables.register(VariableContainer::Error(crate::variables::ErrorVariable {
            message: event.exception_details.text.clone(),
        }));
        dp::OutputEventBody {
            category: Some(dp::OutputCategory::Stderr),
            output: format!("Uncaught {}\n", event.exception_details.text),
            variables_reference: Some(reference),
        }
    }
}

fn classify_reason(rp_reason: PausedReason, was_step: Option<StepKind>, hit_a_breakpoint: bool) -> dp::StoppedReason {
    if was_step.is_some() && matches!(rp_reason, PausedReason::Other | PausedReason::DebugCommand) {
        return dp::StoppedReason::Step;
    }
    if hit_a_breakpoint {
        return dp::StoppedReason::Breakpoint;
    }
    match rp_reason {
        PausedReason::Exception | PausedReason::Promise => dp::StoppedReason::Exception,
        PausedReason::DebugCommand => dp::StoppedReason::Pause,
        PausedReason::XHR | PausedReason::DOM | PausedReason::EventListener => dp::StoppedReason::Breakpoint,
        _ => dp::StoppedReason::Pause,
    }
}

fn extract_exception(event: &debugger::PausedEvent) -> Option<RemoteObject> {
    if !matches!(event.reason, PausedReason::Exception | PausedReason::Promise) {
        return None;
    }
    serde_json::from_value(event.data.clone()).ok()
}

fn describe_pause(reason: dp::StoppedReason, exception: Option<&RemoteObject>) -> Option<String> {
    match reason {
        dp::StoppedReason::Exception => Some(
            exception
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| "Paused on exception".to_string()),
        ),
        dp::StoppedReason::Breakpoint => Some("Paused on breakpoint".to_string()),
        dp::StoppedReason::Step => Some("Paused on step".to_string()),
        dp::StoppedReason::Pause => Some("Paused".to_string()),
        _ => None,
    }
}

fn scope_kind(type_: debugger::ScopeType) -> dp::ScopeKind {
    use debugger::ScopeType as R;
    use dp::ScopeKind as D;
    match type_ {
        R::Global => D::Global,
        R::Local => D::Local,
        R::With => D::With,
        R::Closure => D::Closure,
        R::Catch => D::Catch,
        R::Block => D::Block,
        R::Script => D::Script,
        R::Eval => D::Eval,
        R::Module => D::Module,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_thread_starts_in_init_and_unpaused() {
        let thread = Thread::new(ThreadId::from_raw(1), "s1".into(), "main".into());
        assert_eq!(thread.lifecycle(), Lifecycle::Init);
        assert!(!thread.is_paused());
    }

    #[test]
    fn noting_a_script_moves_the_thread_to_normal() {
        let mut thread = Thread::new(ThreadId::from_raw(1), "s1".into(), "main".into());
        thread.note_script(SourceReference::from_raw(1));
        assert_eq!(thread.lifecycle(), Lifecycle::Normal);
    }

    #[test]
    fn dispose_clears_pause_state() {
        let mut thread = Thread::new(ThreadId::from_raw(1), "s1".into(), "main".into());
        thread.dispose();
        assert_eq!(thread.lifecycle(), Lifecycle::Disposed);
        assert!(!thread.is_paused());
    }

    struct NoopAgent;
    impl RuntimeAgent for NoopAgent {
        fn call(&mut self, _session_id: &str, _call: Call) -> AdapterResult<crate::rp::CallResult> {
            Ok(crate::rp::CallResult::Empty)
        }
    }

    fn call_frame() -> debugger::CallFrame {
        debugger::CallFrame {
            call_frame_id: "f1".into(),
            function_name: "onClick".into(),
            location: debugger::Location { script_id: "s1".into(), line_number: 1, column_number: None },
            url: "app.js".into(),
            scope_chain: Vec::new(),
            this_: RemoteObject {
                type_: runtime::RemoteObjectType::Object,
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
    fn an_event_listener_pause_is_described_via_the_custom_breakpoint_catalog() {
        let mut thread = Thread::new(ThreadId::from_raw(1), "s1".into(), "main".into());
        let container = SourceContainer::new(&[]);
        let event = debugger::PausedEvent {
            call_frames: vec![call_frame()],
            reason: PausedReason::EventListener,
            data: serde_json::json!({ "eventName": "click" }),
            hit_breakpoints: Vec::new(),
            async_stack_trace: None,
        };
        let body = thread
            .on_paused(event, &container, |_| Some(SourceReference::from_raw(1)), |_| None, &mut NoopAgent)
            .unwrap()
            .unwrap();
        assert_eq!(body.description.as_deref(), Some("Click"));
        assert_eq!(body.reason, dp::StoppedReason::Breakpoint);
    }
}
