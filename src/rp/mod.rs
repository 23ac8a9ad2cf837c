//! RuntimeProtocol (RP): the out-of-process remote-debugging surface the
//! adapter talks to, modelled on Chrome DevTools Protocol's
//! domain/method/params split. Not a component of its own in the original
//! component table, but C7/C8/C9 all consume it, so it gets a typed home
//! here rather than being inlined ad hoc into each consumer.
//!
//! As with `dp`, sending/receiving the actual bytes on a session
//! (WebSocket, pipe) is an external collaborator's job; a `Call` is handed
//! to that collaborator and its `CallResult` (or a transport error) comes
//! back asynchronously.

pub mod debugger;
pub mod dom_debugger;
pub mod page;
pub mod runtime;
pub mod target;

use crate::ids::ContextId;

/// A per-target-session RP request, tagged by domain/method.
#[derive(Debug, Clone)]
pub enum Call {
    RuntimeEnable,
    Evaluate(runtime::EvaluateParams),
    CallFunctionOn(runtime::CallFunctionOnParams),
    GetProperties(runtime::GetPropertiesParams),
    ReleaseObject(runtime::ReleaseObjectParams),
    ReleaseObjectGroup(runtime::ReleaseObjectGroupParams),

    DebuggerEnable,
    Pause,
    Resume,
    StepOver,
    StepInto,
    StepOut,
    SetAsyncCallStackDepth(debugger::SetAsyncCallStackDepthParams),
    SetPauseOnExceptions(debugger::SetPauseOnExceptionsParams),
    SetBreakpointByUrl(debugger::SetBreakpointByUrlParams),
    RemoveBreakpoint(debugger::RemoveBreakpointParams),
    EvaluateOnCallFrame(debugger::EvaluateOnCallFrameParams),
    RestartFrame(debugger::RestartFrameParams),
    GetScriptSource(debugger::GetScriptSourceParams),

    SetDiscoverTargets(target::SetDiscoverTargetsParams),
    SetAutoAttach(target::SetAutoAttachParams),
    AttachToTarget(target::AttachToTargetParams),

    SetInstrumentationBreakpoint(dom_debugger::SetInstrumentationBreakpointParams),
    RemoveInstrumentationBreakpoint(dom_debugger::RemoveInstrumentationBreakpointParams),
    SetEventListenerBreakpoint(dom_debugger::SetEventListenerBreakpointParams),
    RemoveEventListenerBreakpoint(dom_debugger::RemoveEventListenerBreakpointParams),

    PageEnable,
    GetResourceTree,
    Navigate(page::NavigateParams),
}

#[derive(Debug, Clone)]
pub enum CallResult {
    Evaluate(runtime::EvaluateResult),
    CallFunctionOn(runtime::CallFunctionOnResult),
    GetProperties(runtime::GetPropertiesResult),
    SetBreakpointByUrl(debugger::SetBreakpointByUrlResult),
    EvaluateOnCallFrame(debugger::EvaluateOnCallFrameResult),
    RestartFrame(debugger::RestartFrameResult),
    GetScriptSource(debugger::GetScriptSourceResult),
    AttachToTarget(target::AttachToTargetResult),
    GetResourceTree(page::GetResourceTreeResult),
    /// Calls with no meaningful result payload (`enable`, `pause`, ...).
    Empty,
}

/// An RP event delivered on a target session, tagged by the session it
/// arrived on so `ThreadManager` can route it to the right `Thread`.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub session_id: String,
    pub body: Event,
}

#[derive(Debug, Clone)]
pub enum Event {
    ConsoleApiCalled(runtime::ConsoleApiCalledEvent),
    ExceptionThrown(runtime::ExceptionThrownEvent),
    ExecutionContextCreated(runtime::ExecutionContextCreatedEvent),
    ExecutionContextDestroyed(runtime::ExecutionContextDestroyedEvent),
    ExecutionContextsCleared,

    ScriptParsed(debugger::ScriptParsedEvent),
    Paused(debugger::PausedEvent),
    Resumed,
    BreakpointResolved(debugger::BreakpointResolvedEvent),

    TargetCreated(target::TargetCreatedEvent),
    TargetInfoChanged(target::TargetInfoChangedEvent),
    AttachedToTarget(target::AttachedToTargetEvent),
    DetachedFromTarget(target::DetachedFromTargetEvent),
}

/// A context an evaluate/callFunctionOn call can be scoped to: either the
/// thread's default context or one the caller has selected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSelector {
    Default,
    Explicit(ContextId),
}

/// The session-side handle every component that issues RP calls is given.
///
/// The transport (sending bytes, multiplexing sessions, waiting for the
/// matching reply) is an external collaborator; the reactor design in the
/// crate's design notes asks for suspension points around RP round-trips,
/// but a bare library crate has no executor of its own to suspend onto, so
/// a `RuntimeAgent` performs its round-trip synchronously from the core's
/// point of view — whatever blocking, polling, or async bridging that
/// requires lives in the caller's transport, not here.
pub trait RuntimeAgent {
    fn call(&mut self, session_id: &str, call: Call) -> crate::error::AdapterResult<CallResult>;
}
