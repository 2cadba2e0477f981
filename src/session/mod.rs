//! Debug session state machine
//!
//! Bridges the editor's DAP requests and the engine's push messages. All
//! state lives in [`DebugSession`] and is only touched from its run loop;
//! requests that wait on a correlated engine reply run as separate tasks
//! so the loop keeps processing engine messages while they are suspended.

pub mod breakpoints;
pub mod evaluate;
pub mod scopes;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::common::config::{Config, UnknownHaltPolicy};
use crate::common::{strip_resource_marker, Error, Result};
use crate::dap::server::DapOutput;
use crate::dap::types::{
    AttachArguments, Breakpoint as DapBreakpoint, Capabilities, ContinueResponseBody,
    DisconnectArguments, EvaluateArguments, EvaluateResponseBody, Event, LaunchArguments,
    RequestMessage, Scope, ScopesArguments, ScopesResponseBody, SetBreakpointsArguments,
    SetBreakpointsResponseBody, SetVariableArguments, SetVariableResponseBody, Source, StackFrame,
    StackTraceResponseBody, TerminatedEventBody, Thread, ThreadsResponseBody, Variable,
    VariablesArguments, VariablesResponseBody, THREAD_ID,
};
use crate::engine::snippets::LUA_HELPERS;
use crate::engine::{
    Connector, Correlator, DebuggerEvent, Endpoint, EngineClient, EngineConnection, EngineMessage,
    EngineQueries, RawFrame, ScopeKind, Subscription,
};
use crate::launcher::{EngineProcess, LaunchRequest, Launcher};

use self::breakpoints::{Breakpoint, BreakpointStore, HaltMatch};
use self::evaluate::{EvaluateContext, Evaluator};
use self::scopes::{ScopeCache, ScopeNode};

/// Debug session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No engine requested yet
    Uninitialized,
    /// Engine channel opening
    Connecting,
    /// Channel open, waiting for the first debugger status
    Initializing,
    /// Engine is executing scripts
    Running,
    /// Engine is stopped; callstack and scopes are valid
    Halted,
    /// Engine connection is gone
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Halted => write!(f, "halted"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Something the engine connection reported, tagged with the connection it
/// came from so a restarted session ignores its predecessor
#[derive(Debug)]
enum Notice {
    Opened { generation: u64 },
    Message { generation: u64, message: EngineMessage },
    Closed { generation: u64 },
    Failed { generation: u64, reason: String },
    /// Launch delay elapsed; connect to the started engine
    ConnectLaunched { endpoint: Endpoint },
}

/// What the run loop does after a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// The live engine connection and the listeners bound to it
struct EngineLink {
    generation: u64,
    connection: EngineConnection,
    client: Arc<EngineClient>,
    _subscriptions: Vec<Subscription>,
}

/// Debug session bridging one editor and one engine
pub struct DebugSession {
    config: Config,
    connector: Arc<dyn Connector>,
    launcher: Arc<dyn Launcher>,
    output: Arc<DapOutput>,
    state: SessionState,
    /// Engine waits for breakpoints; continue once configuration is done
    waiting_for_breakpoints: bool,
    configuration_done: bool,
    link: Option<EngineLink>,
    generation: u64,
    correlator: Arc<Correlator>,
    cache: Arc<ScopeCache>,
    breakpoints: BreakpointStore,
    callstack: Option<Vec<RawFrame>>,
    /// launch/attach/restart answered once the engine reports its status
    deferred_start: Option<RequestMessage>,
    process: Option<EngineProcess>,
    terminated_sent: bool,
    notices_tx: mpsc::UnboundedSender<Notice>,
    notices_rx: Option<mpsc::UnboundedReceiver<Notice>>,
}

impl DebugSession {
    pub fn new(
        config: Config,
        connector: Arc<dyn Connector>,
        launcher: Arc<dyn Launcher>,
        output: Arc<DapOutput>,
    ) -> Self {
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let breakpoints = BreakpointStore::new(&config.breakpoints);

        Self {
            config,
            connector,
            launcher,
            output,
            state: SessionState::Uninitialized,
            waiting_for_breakpoints: false,
            configuration_done: false,
            link: None,
            generation: 0,
            correlator: Arc::new(Correlator::new()),
            cache: Arc::new(ScopeCache::new()),
            breakpoints,
            callstack: None,
            deferred_start: None,
            process: None,
            terminated_sent: false,
            notices_tx,
            notices_rx: Some(notices_rx),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process requests and engine notices until the editor disconnects
    pub async fn run(mut self, mut requests: mpsc::UnboundedReceiver<RequestMessage>) -> Result<()> {
        let mut notices = self
            .notices_rx
            .take()
            .ok_or_else(|| Error::invalid_state("run", "already running"))?;

        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else {
                        tracing::debug!("Request stream ended");
                        break;
                    };
                    if self.handle_request(request).await == Flow::Exit {
                        break;
                    }
                }
                Some(notice) = notices.recv() => self.handle_notice(notice),
            }
        }

        self.shutdown(false).await;
        Ok(())
    }

    // === Requests ===

    async fn handle_request(&mut self, request: RequestMessage) -> Flow {
        tracing::debug!(command = %request.command, seq = request.seq, state = %self.state, "DAP request");

        let command = request.command.clone();
        match command.as_str() {
            "initialize" => {
                self.output.respond_with(&request, Ok(Capabilities::adapter()));
            }
            "launch" => {
                if let Err(e) = self.launch(&request) {
                    self.output.respond(&request, Err(e));
                }
            }
            "attach" => {
                if let Err(e) = self.attach(&request) {
                    self.output.respond(&request, Err(e));
                }
            }
            "restart" => {
                if let Err(e) = self.restart(&request) {
                    self.output.respond(&request, Err(e));
                }
            }
            "disconnect" => {
                let result = self.disconnect(&request).await;
                self.output.respond(&request, result);
                return Flow::Exit;
            }
            "configurationDone" => {
                let result = self.configuration_done();
                self.output.respond(&request, result);
            }
            "setBreakpoints" => {
                let result = self.set_breakpoints(&request);
                self.output.respond_with(&request, result);
            }
            "threads" => {
                let body = ThreadsResponseBody {
                    threads: vec![Thread {
                        id: THREAD_ID,
                        name: "Lua".to_string(),
                    }],
                };
                self.output.respond_with(&request, Ok(body));
            }
            "stackTrace" => {
                let result = self.stack_trace();
                self.output.respond_with(&request, result);
            }
            "scopes" => {
                let result = self.scopes(&request);
                self.output.respond_with(&request, result);
            }
            "variables" => self.variables(request),
            "setVariable" => self.set_variable(request),
            "evaluate" => self.evaluate(request),
            "continue" => {
                let result = self.resume("continue").map(|()| ContinueResponseBody {
                    all_threads_continued: true,
                });
                self.output.respond_with(&request, result);
            }
            "next" => {
                let result = self.resume("step_over");
                self.output.respond(&request, result.map(|()| None));
            }
            "stepIn" => {
                let result = self.resume("step_into");
                self.output.respond(&request, result.map(|()| None));
            }
            "stepOut" => {
                let result = self.resume("step_out");
                self.output.respond(&request, result.map(|()| None));
            }
            "pause" => {
                let result = self.debugger_command("break", None);
                self.output.respond(&request, result.map(|()| None));
            }
            other => {
                self.output
                    .respond(&request, Err(Error::UnsupportedRequest(other.to_string())));
            }
        }
        Flow::Continue
    }

    fn ensure_startable(&self, action: &str) -> Result<()> {
        match self.state {
            SessionState::Uninitialized | SessionState::Terminated => Ok(()),
            state => Err(Error::invalid_state(action, state)),
        }
    }

    fn launch(&mut self, request: &RequestMessage) -> Result<()> {
        self.ensure_startable("launch")?;
        let args: LaunchArguments = request.parse_arguments()?;

        let launch = LaunchRequest {
            toolchain: args
                .toolchain
                .map(PathBuf::from)
                .ok_or_else(|| Error::LaunchFailed("no toolchain given".to_string()))?,
            project_file: args
                .project_file
                .map(PathBuf::from)
                .ok_or_else(|| Error::LaunchFailed("no project file given".to_string()))?,
            command_line_args: args.command_line_args,
        };

        let process = self.launcher.launch(&launch)?;
        self.output
            .event(Event::console(format!("Launching {}\n", process.command_line)));

        let endpoint = process.endpoint.clone();
        self.process = Some(process);
        self.state = SessionState::Connecting;
        self.deferred_start = Some(request.clone());

        let delay = Duration::from_millis(self.config.engine.launch_connect_delay_ms);
        let notices = self.notices_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = notices.send(Notice::ConnectLaunched { endpoint });
        });
        Ok(())
    }

    fn attach(&mut self, request: &RequestMessage) -> Result<()> {
        self.ensure_startable("attach")?;
        let args: AttachArguments = request.parse_arguments()?;

        let endpoint = Endpoint::new(
            args.ip.unwrap_or_else(|| self.config.engine.ip.clone()),
            args.port.unwrap_or(self.config.engine.port),
        );
        self.deferred_start = Some(request.clone());
        self.connect(endpoint);
        Ok(())
    }

    fn restart(&mut self, request: &RequestMessage) -> Result<()> {
        let endpoint = self
            .link
            .as_ref()
            .map(|link| link.connection.endpoint().clone())
            .ok_or(Error::NotConnected)?;

        tracing::info!(%endpoint, "Restarting engine connection");
        self.drop_link();
        self.enter_new_halt(None);
        self.waiting_for_breakpoints = false;
        self.deferred_start = Some(request.clone());
        self.connect(endpoint);
        Ok(())
    }

    async fn disconnect(&mut self, request: &RequestMessage) -> Result<Option<Value>> {
        let args: DisconnectArguments = request.parse_arguments()?;
        self.shutdown(args.terminate_debuggee.unwrap_or(false)).await;
        Ok(None)
    }

    fn configuration_done(&mut self) -> Result<Option<Value>> {
        self.configuration_done = true;
        if self.waiting_for_breakpoints {
            self.waiting_for_breakpoints = false;
            tracing::debug!("Breakpoints configured, releasing the engine");
            self.debugger_command("continue", None)?;
            self.state = SessionState::Running;
        }
        Ok(None)
    }

    fn set_breakpoints(&mut self, request: &RequestMessage) -> Result<SetBreakpointsResponseBody> {
        let args: SetBreakpointsArguments = request.parse_arguments()?;
        let path = args
            .source
            .path
            .as_deref()
            .map(PathBuf::from)
            .ok_or_else(|| Error::DapProtocol("setBreakpoints without a source path".to_string()))?;

        let placed = self.breakpoints.set_breakpoints(&path, &args.requested_lines());

        match &self.link {
            Some(link) => link
                .connection
                .send_debugger_command("set_breakpoints", Some(self.breakpoints.engine_snapshot())),
            None => tracing::debug!("No engine yet, breakpoints are sent on the next change"),
        }

        Ok(SetBreakpointsResponseBody {
            breakpoints: placed.iter().map(to_dap_breakpoint).collect(),
        })
    }

    fn stack_trace(&self) -> Result<StackTraceResponseBody> {
        if self.state == SessionState::Initializing {
            return Ok(StackTraceResponseBody {
                stack_frames: Vec::new(),
                total_frames: Some(0),
            });
        }

        let stack = self.callstack.as_ref().ok_or(Error::NoCallstack)?;
        let roots = self.breakpoints.roots();
        let frames: Vec<StackFrame> = stack
            .iter()
            .enumerate()
            .map(|(index, frame)| {
                let resource = strip_resource_marker(&frame.source);
                let name = match &frame.function {
                    Some(function) if !function.is_empty() => {
                        format!("{} @ {}:{}", function, resource, frame.line)
                    }
                    _ => format!("{}:{}", resource, frame.line),
                };
                StackFrame {
                    id: index as i64,
                    name,
                    source: Some(Source {
                        name: Some(frame.source.clone()),
                        path: Some(roots.file_for(&frame.source).display().to_string()),
                    }),
                    line: i64::from(frame.line),
                    column: 0,
                }
            })
            .collect();

        Ok(StackTraceResponseBody {
            total_frames: Some(frames.len() as i64),
            stack_frames: frames,
        })
    }

    /// Local and upvalue scope nodes of a frame
    fn frame_scopes(&self, frame_id: i64) -> Result<Vec<Arc<ScopeNode>>> {
        let stack = self.callstack.as_ref().ok_or(Error::NoCallstack)?;
        let index = usize::try_from(frame_id).map_err(|_| Error::FrameNotFound(frame_id))?;
        let frame = stack.get(index).ok_or(Error::FrameNotFound(frame_id))?;

        Ok(vec![
            self.cache.frame_scope(index, ScopeKind::Local, &frame.local)?,
            self.cache.frame_scope(index, ScopeKind::Upvalue, &frame.up_values)?,
        ])
    }

    fn scopes(&self, request: &RequestMessage) -> Result<ScopesResponseBody> {
        let args: ScopesArguments = request.parse_arguments()?;
        let scopes = self
            .frame_scopes(args.frame_id)?
            .into_iter()
            .map(|node| Scope {
                name: node.scope.display_name().to_string(),
                variables_reference: node.reference,
                expensive: false,
            })
            .collect();
        Ok(ScopesResponseBody { scopes })
    }

    fn client(&self) -> Result<Arc<EngineClient>> {
        self.link
            .as_ref()
            .map(|link| link.client.clone())
            .ok_or(Error::NotConnected)
    }

    fn variables(&self, request: RequestMessage) {
        let prepared = request
            .parse_arguments::<VariablesArguments>()
            .and_then(|args| Ok((self.cache.get(args.variables_reference)?, self.client()?)));
        let (node, client) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return self.output.respond(&request, Err(e)),
        };

        let cache = self.cache.clone();
        let output = self.output.clone();
        tokio::spawn(async move {
            let result = cache.fetch(&node, client.as_ref()).await.map(|variables| {
                VariablesResponseBody {
                    variables: variables
                        .into_iter()
                        .map(|v| Variable {
                            name: v.name,
                            value: v.value,
                            type_name: Some(v.type_name),
                            variables_reference: v.variables_reference,
                        })
                        .collect(),
                }
            });
            output.respond_with(&request, result);
        });
    }

    fn set_variable(&self, request: RequestMessage) {
        let prepared = request.parse_arguments::<SetVariableArguments>().and_then(|args| {
            Ok((args.clone(), self.cache.get(args.variables_reference)?, self.client()?))
        });
        let (args, node, client) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return self.output.respond(&request, Err(e)),
        };

        let cache = self.cache.clone();
        let output = self.output.clone();
        tokio::spawn(async move {
            let result = async move {
                let variables = cache.fetch(&node, client.as_ref()).await?;
                let variable = variables
                    .iter()
                    .find(|v| v.name == args.name)
                    .ok_or_else(|| Error::variable_not_found(&args.name))?;

                let value = typed_value(&variable.type_name, &args.value)?;
                let target = node.address_of(variable);
                tracing::debug!(?target, %value, "Modifying variable");
                let reported = client.modify_variable(&target, value).await?;

                Ok::<_, Error>(SetVariableResponseBody {
                    value: reported.unwrap_or(args.value),
                    type_name: Some(variable.type_name.clone()),
                    variables_reference: 0,
                })
            }
            .await;
            output.respond_with(&request, result);
        });
    }

    fn evaluate(&self, request: RequestMessage) {
        let prepared = request.parse_arguments::<EvaluateArguments>().and_then(|args| {
            // Without a halt only snippets can be evaluated
            let scopes = match &self.callstack {
                Some(_) => self.frame_scopes(args.frame_id.unwrap_or(0))?,
                None => Vec::new(),
            };
            Ok((args, scopes, self.client()?))
        });
        let (args, scopes, client) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return self.output.respond(&request, Err(e)),
        };

        let cache = self.cache.clone();
        let output = self.output.clone();
        tokio::spawn(async move {
            let context = EvaluateContext::from_dap(args.context.as_deref());
            let evaluator = Evaluator::new(&cache, client.as_ref(), scopes);
            let result = evaluator
                .evaluate(&args.expression, context)
                .await
                .map(|r| EvaluateResponseBody {
                    result: r.result,
                    type_name: r.type_name,
                    variables_reference: r.variables_reference,
                });
            output.respond_with(&request, result);
        });
    }

    fn debugger_command(&self, command: &str, extra: Option<Value>) -> Result<()> {
        let link = self.link.as_ref().ok_or(Error::NotConnected)?;
        link.connection.send_debugger_command(command, extra);
        Ok(())
    }

    /// Send a command that lets the engine run; the current halt ends
    fn resume(&mut self, command: &str) -> Result<()> {
        self.debugger_command(command, None)?;
        self.enter_new_halt(None);
        Ok(())
    }

    /// Replace the callstack and invalidate every scope reference
    fn enter_new_halt(&mut self, callstack: Option<Vec<RawFrame>>) {
        self.callstack = callstack;
        self.cache.reset();
    }

    // === Engine connection ===

    fn connect(&mut self, endpoint: Endpoint) {
        self.generation += 1;
        let generation = self.generation;
        tracing::info!(%endpoint, generation, "Connecting to engine");

        let connection = EngineConnection::open(self.connector.as_ref(), endpoint);
        let mut subscriptions = Vec::with_capacity(4);

        let tx = self.notices_tx.clone();
        subscriptions.push(connection.on_open(move |_| {
            let _ = tx.send(Notice::Opened { generation });
        }));

        // Replies are resolved right here so waiters wake even while the
        // run loop is busy
        let tx = self.notices_tx.clone();
        let correlator = self.correlator.clone();
        subscriptions.push(connection.on_message(move |inbound| {
            match EngineMessage::parse(inbound) {
                Ok(EngineMessage::Reply { id, body }) => {
                    if !correlator.resolve(id, body) {
                        tracing::debug!(%id, "Reply for a request nobody waits on");
                    }
                }
                Ok(message) => {
                    let _ = tx.send(Notice::Message { generation, message });
                }
                Err(e) => tracing::warn!(error = %e, "Dropping malformed engine message"),
            }
        }));

        let tx = self.notices_tx.clone();
        let correlator = self.correlator.clone();
        subscriptions.push(connection.on_close(move |_| {
            correlator.reject_all();
            let _ = tx.send(Notice::Closed { generation });
        }));

        let tx = self.notices_tx.clone();
        let correlator = self.correlator.clone();
        subscriptions.push(connection.on_error(move |reason| {
            correlator.reject_all();
            let _ = tx.send(Notice::Failed {
                generation,
                reason: reason.clone(),
            });
        }));

        // Listeners are in place; let the transport events flow
        connection.start();

        let client = Arc::new(EngineClient::new(
            connection.clone(),
            self.correlator.clone(),
            self.config.timeouts.clone(),
        ));

        self.link = Some(EngineLink {
            generation,
            connection,
            client,
            _subscriptions: subscriptions,
        });
        self.state = SessionState::Connecting;
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.connection.close();
        }
        self.correlator.reject_all();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link.as_ref().is_some_and(|link| link.generation == generation)
    }

    fn handle_notice(&mut self, notice: Notice) {
        match notice {
            Notice::ConnectLaunched { endpoint } => {
                if self.state == SessionState::Connecting && self.link.is_none() {
                    self.connect(endpoint);
                }
            }
            Notice::Opened { generation } if self.is_current(generation) => {
                self.state = SessionState::Initializing;
                self.terminated_sent = false;
                if let Err(e) = self.debugger_command("report_status", None) {
                    tracing::warn!(error = %e, "Failed to request engine status");
                }
            }
            Notice::Message {
                generation,
                message,
            } if self.is_current(generation) => self.handle_engine_message(message),
            Notice::Closed { generation } if self.is_current(generation) => {
                self.connection_lost(None);
            }
            Notice::Failed { generation, reason } if self.is_current(generation) => {
                self.connection_lost(Some(reason));
            }
            stale => tracing::trace!(?stale, "Ignoring notice from a previous connection"),
        }
    }

    fn connection_lost(&mut self, failure: Option<String>) {
        let endpoint = self.link.as_ref().map(|link| link.connection.endpoint().to_string());
        self.drop_link();
        self.enter_new_halt(None);

        if let Some(request) = self.deferred_start.take() {
            let reason = failure.clone().unwrap_or_else(|| "closed".to_string());
            self.output.respond(
                &request,
                Err(Error::connection_failed(&endpoint.unwrap_or_default(), reason)),
            );
        }

        match failure {
            Some(reason) => tracing::warn!(%reason, "Engine connection failed"),
            None => tracing::info!("Engine connection closed"),
        }
        self.state = SessionState::Terminated;
        self.emit_terminated();
    }

    fn emit_terminated(&mut self) {
        if !self.terminated_sent {
            self.terminated_sent = true;
            self.output
                .event(Event::Terminated(Some(TerminatedEventBody { restart: false })));
        }
    }

    fn handle_engine_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Debugger(event) => self.handle_debugger_event(event),
            EngineMessage::Log(log) => self.output.event(Event::console(log.render())),
            EngineMessage::Output(text) => {
                let text = if text.ends_with('\n') { text } else { text + "\n" };
                self.output.event(Event::console(text));
            }
            EngineMessage::Reply { id, .. } => {
                tracing::debug!(%id, "Reply reached the session loop");
            }
            EngineMessage::Other { message_type } => {
                tracing::trace!(%message_type, "Ignoring engine message");
            }
        }
    }

    /// First status after connecting completes the handshake
    fn finish_initializing(&mut self) {
        tracing::info!("Engine debugger ready");
        self.output.event(Event::Initialized);

        if let Some(request) = self.deferred_start.take() {
            self.output.respond(&request, Ok(None));
        }

        if let Some(link) = &self.link {
            for helper in LUA_HELPERS {
                link.connection.send_script(helper);
            }
        }
        self.state = SessionState::Running;
    }

    fn handle_debugger_event(&mut self, event: DebuggerEvent) {
        tracing::debug!(?event, "Debugger status");
        self.output
            .event(Event::console(format!("Debugger status: {}\n", event.status())));
        if self.state == SessionState::Initializing {
            self.finish_initializing();
        }

        match event {
            DebuggerEvent::Running => {
                // The engine resumed on its own; the last halt is over
                self.enter_new_halt(None);
                self.state = SessionState::Running;
            }
            DebuggerEvent::Waiting => {
                if self.configuration_done {
                    if let Err(e) = self.debugger_command("continue", None) {
                        tracing::warn!(error = %e, "Failed to release the engine");
                    }
                    self.state = SessionState::Running;
                } else {
                    self.waiting_for_breakpoints = true;
                }
            }
            DebuggerEvent::Halted { source, line } => self.handle_halt(&source, i64::from(line)),
            DebuggerEvent::Callstack(frames) => {
                tracing::debug!(frames = frames.len(), "Callstack received");
                self.enter_new_halt(Some(frames));
                self.state = SessionState::Halted;
                self.output.event(Event::stopped("breakpoint"));
            }
            DebuggerEvent::Status(status) => {
                tracing::info!(%status, "Engine debugger status");
            }
        }
    }

    fn handle_halt(&mut self, source: &str, line: i64) {
        match self.breakpoints.verify_halt(source, line) {
            HaltMatch::Verified(breakpoint) => {
                self.output.event(Event::Breakpoint {
                    reason: "changed".to_string(),
                    breakpoint: to_dap_breakpoint(&breakpoint),
                });
            }
            HaltMatch::UnknownLine => {
                tracing::debug!(source, line, "Halted on a line without breakpoint");
            }
            HaltMatch::UnknownSource => match self.config.breakpoints.unknown_halt_policy {
                UnknownHaltPolicy::Ignore => {
                    tracing::debug!(source, line, "Halted in an untracked source");
                }
                UnknownHaltPolicy::ResetAndContinue => {
                    tracing::info!(source, line, "Halted in an untracked source, resetting engine breakpoints");
                    let reset = self
                        .debugger_command("set_breakpoints", Some(json!({ "breakpoints": {} })))
                        .and_then(|()| self.debugger_command("continue", None));
                    if let Err(e) = reset {
                        tracing::warn!(error = %e, "Failed to reset engine breakpoints");
                        return;
                    }
                    self.state = SessionState::Running;
                    self.output.event(Event::Continued {
                        thread_id: THREAD_ID,
                        all_threads_continued: true,
                    });
                    return;
                }
            },
        }
        self.state = SessionState::Halted;
    }

    async fn shutdown(&mut self, terminate_debuggee: bool) {
        self.drop_link();
        self.enter_new_halt(None);
        if self.state != SessionState::Uninitialized {
            self.state = SessionState::Terminated;
        }

        if let Some(mut process) = self.process.take() {
            if terminate_debuggee {
                tracing::info!("Terminating launched engine");
                process.kill().await;
            }
        }
    }
}

fn to_dap_breakpoint(breakpoint: &Breakpoint) -> DapBreakpoint {
    DapBreakpoint {
        id: Some(breakpoint.id),
        verified: breakpoint.verified,
        message: breakpoint.message.clone(),
        source: Some(Source {
            name: Some(breakpoint.resource_path.clone()),
            path: Some(breakpoint.source_path.display().to_string()),
        }),
        line: Some(breakpoint.line),
    }
}

/// Convert editor input to a value of the variable's Lua type
pub fn typed_value(lua_type: &str, text: &str) -> Result<Value> {
    let unsupported = || Error::UnsupportedValue {
        lua_type: lua_type.to_string(),
        value: text.to_string(),
    };

    match lua_type {
        "string" => Ok(Value::String(text.to_string())),
        "boolean" => Ok(Value::Bool(text.trim() == "true")),
        "number" => {
            let text = text.trim();
            if let Ok(integer) = text.parse::<i64>() {
                return Ok(json!(integer));
            }
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(unsupported)
        }
        "table" => Ok(json!([])),
        _ => Err(unsupported()),
    }
}
