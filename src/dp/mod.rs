//! DebugProtocol (DP): the IDE-facing surface.
//!
//! The wire envelope (sequence numbers, JSON framing) belongs to an
//! external transport the crate never touches directly; what lives here is
//! the typed request/response/event vocabulary a transport decodes into
//! and encodes out of. Grounded on the teacher's `dap::mod::ProtocolMessage`
//! triad (`Request`/`Response`/`Event`), elaborated from an untyped
//! `serde_json::Value` body into one enum variant per command.

pub mod messages;

pub use messages::*;

/// A decoded DP request, already split into its command and typed
/// arguments by the transport.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub seq: i64,
    pub command: RequestCommand,
}

#[derive(Debug, Clone)]
pub enum RequestCommand {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    ConfigurationDone,
    Terminate,
    Disconnect(DisconnectArguments),
    Restart,
    Threads,
    Continue(ContinueArguments),
    Pause(PauseArguments),
    Next(NextArguments),
    StepIn(StepInArguments),
    StepOut(StepOutArguments),
    RestartFrame(RestartFrameArguments),
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    SetVariable(SetVariableArguments),
    Evaluate(EvaluateArguments),
    Completions(CompletionsArguments),
    LoadedSources,
    Source(SourceArguments),
    SetBreakpoints(SetBreakpointsArguments),
    SetExceptionBreakpoints(SetExceptionBreakpointsArguments),
    ExceptionInfo(ExceptionInfoArguments),
    UpdateCustomBreakpoints(UpdateCustomBreakpointsArguments),
    ReadMemory(ReadMemoryArguments),
    WriteMemory(WriteMemoryArguments),
    Cancel(CancelArguments),
}

/// A response to an [`IncomingRequest`], produced exactly once per request.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub request_seq: i64,
    pub success: bool,
    pub message: Option<String>,
    pub body: Option<ResponseBody>,
}

impl OutgoingResponse {
    pub fn ok(request_seq: i64, body: impl Into<Option<ResponseBody>>) -> Self {
        Self {
            request_seq,
            success: true,
            message: None,
            body: body.into(),
        }
    }

    pub fn failure(request_seq: i64, message: impl Into<String>) -> Self {
        Self {
            request_seq,
            success: false,
            message: Some(message.into()),
            body: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResponseBody {
    Initialize(Capabilities),
    SetBreakpoints(SetBreakpointsResponseBody),
    Continue(ContinueResponseBody),
    StackTrace(StackTraceResponseBody),
    Scopes(ScopesResponseBody),
    Variables(VariablesResponseBody),
    SetVariable(SetVariableResponseBody),
    Evaluate(EvaluateResponseBody),
    Completions(CompletionsResponseBody),
    Threads(ThreadsResponseBody),
    LoadedSources(LoadedSourcesResponseBody),
    Source(SourceResponseBody),
    ExceptionInfo(ExceptionInfoResponseBody),
    ReadMemory(ReadMemoryResponseBody),
    WriteMemory(WriteMemoryResponseBody),
}

/// A DP event, emitted by the adapter without being solicited by a request.
#[derive(Debug, Clone)]
pub enum OutgoingEvent {
    Initialized,
    Thread(ThreadEventBody),
    Stopped(StoppedEventBody),
    Continued(ContinuedEventBody),
    Output(OutputEventBody),
    LoadedSource(LoadedSourceEventBody),
    Breakpoint(BreakpointEventBody),
    Exited(ExitedEventBody),
    Terminated(TerminatedEventBody),
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatedEventBody {
    #[serde(default)]
    pub restart: bool,
}
