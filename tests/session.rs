//! End-to-end session tests
//!
//! These drive a [`DebugSession`] the way an editor would, with an
//! in-memory engine on the other side of the connector:
//! 1. Requests go in through the session's request channel
//! 2. The fake engine answers the frames the adapter writes
//! 3. Responses and events are read back from the DAP output

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engine_dap::common::config::{Config, UnknownHaltPolicy};
use engine_dap::dap::{DapOutput, EventMessage, ProtocolMessage, RequestMessage, ResponseMessage};
use engine_dap::engine::transport::EngineEnd;
use engine_dap::engine::{Endpoint, MemoryConnector, TransportEvent};
use engine_dap::launcher::{EngineProcess, LaunchRequest, Launcher};
use engine_dap::{DebugSession, Result};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

/// Launcher that starts nothing and points at a fixed endpoint
struct FakeLauncher;

impl Launcher for FakeLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<EngineProcess> {
        Ok(EngineProcess::new(
            Endpoint::new("127.0.0.1", 14031),
            format!("engine --port 14031 {}", request.command_line_args.join(" ")),
            None,
        ))
    }
}

/// Editor side of a running session
struct Harness {
    requests: mpsc::UnboundedSender<RequestMessage>,
    output: mpsc::UnboundedReceiver<ProtocolMessage>,
    engines: mpsc::UnboundedReceiver<EngineEnd>,
    seq: i64,
    events: Vec<EventMessage>,
    responses: Vec<ResponseMessage>,
}

impl Harness {
    fn start(config: Config) -> Self {
        let (output, messages) = DapOutput::new();
        let (connector, engines) = MemoryConnector::new();
        let (requests, requests_rx) = mpsc::unbounded_channel();

        let session = DebugSession::new(config, Arc::new(connector), Arc::new(FakeLauncher), output);
        tokio::spawn(session.run(requests_rx));

        Self {
            requests,
            output: messages,
            engines,
            seq: 0,
            events: Vec::new(),
            responses: Vec::new(),
        }
    }

    fn request(&mut self, command: &str, arguments: Value) -> i64 {
        self.seq += 1;
        self.requests
            .send(RequestMessage {
                seq: self.seq,
                command: command.to_string(),
                arguments: Some(arguments),
            })
            .expect("session stopped");
        self.seq
    }

    async fn next(&mut self) -> ProtocolMessage {
        timeout(WAIT, self.output.recv())
            .await
            .expect("timed out waiting for adapter output")
            .expect("adapter output closed")
    }

    async fn response(&mut self, seq: i64) -> ResponseMessage {
        if let Some(pos) = self.responses.iter().position(|r| r.request_seq == seq) {
            return self.responses.remove(pos);
        }
        loop {
            match self.next().await {
                ProtocolMessage::Response(r) if r.request_seq == seq => return r,
                ProtocolMessage::Response(r) => self.responses.push(r),
                ProtocolMessage::Event(e) => self.events.push(e),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    async fn event(&mut self, name: &str) -> EventMessage {
        if let Some(pos) = self.events.iter().position(|e| e.event == name) {
            return self.events.remove(pos);
        }
        loop {
            match self.next().await {
                ProtocolMessage::Event(e) if e.event == name => return e,
                ProtocolMessage::Event(e) => self.events.push(e),
                ProtocolMessage::Response(r) => self.responses.push(r),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    /// Wait for a console output event with exactly this text
    async fn console(&mut self, text: &str) -> EventMessage {
        if let Some(pos) = self
            .events
            .iter()
            .position(|e| e.event == "output" && output_text(e) == Some(text))
        {
            return self.events.remove(pos);
        }
        loop {
            match self.next().await {
                ProtocolMessage::Event(e) if e.event == "output" && output_text(&e) == Some(text) => {
                    return e
                }
                ProtocolMessage::Event(e) => self.events.push(e),
                ProtocolMessage::Response(r) => self.responses.push(r),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    async fn engine(&mut self) -> EngineEnd {
        timeout(WAIT, self.engines.recv())
            .await
            .expect("timed out waiting for an engine connection")
            .expect("connector dropped")
    }
}

fn output_text(event: &EventMessage) -> Option<&str> {
    event.body.as_ref()?.get("output")?.as_str()
}

fn is_helper(frame: &Value) -> bool {
    frame["type"] == "script"
        && frame["script"]
            .as_str()
            .is_some_and(|s| s.trim_start().starts_with("if not"))
}

/// Next frame the adapter wrote, skipping injected helper definitions
async fn next_frame(engine: &mut EngineEnd) -> Value {
    loop {
        let frame = timeout(WAIT, engine.next_json())
            .await
            .expect("timed out waiting for an engine frame")
            .expect("adapter closed the engine channel");
        if !is_helper(&frame) {
            return frame;
        }
    }
}

/// Attach and complete the status handshake
async fn attach(h: &mut Harness) -> EngineEnd {
    let seq = h.request("attach", json!({ "ip": "127.0.0.1", "port": 14000 }));
    let mut engine = h.engine().await;
    assert_eq!(engine.endpoint, Endpoint::new("127.0.0.1", 14000));

    engine.open();
    let status = next_frame(&mut engine).await;
    assert_eq!(status["type"], "lua_debugger");
    assert_eq!(status["command"], "report_status");

    engine.push(&json!({ "type": "lua_debugger", "message": "running" }));
    h.event("initialized").await;
    assert!(h.response(seq).await.success);
    h.console("Debugger status: running\n").await;
    engine
}

fn callstack(frames: Value) -> Value {
    json!({ "type": "lua_debugger", "message": "callstack", "stack": frames })
}

fn player_frame() -> Value {
    json!([{
        "source": "@scripts/player.lua",
        "line": 12,
        "function": "update",
        "local": [
            {"var_name": "dt", "type": "number", "value": "0.016"},
            {"var_name": "player", "type": "table", "value": "table: 0x01"}
        ],
        "up_values": [{"var_name": "count", "type": "number", "value": 3}]
    }, {
        "source": "main.lua",
        "line": 3,
        "local": [],
        "up_values": []
    }])
}

/// Project directory with one script, as the engine's tooling lays it out
fn project() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("game.stingray_project"), "").unwrap();
    fs::create_dir_all(dir.path().join("scripts")).unwrap();
    let script = dir.path().join("scripts").join("player.lua");
    fs::write(&script, "").unwrap();
    (dir, script)
}

#[tokio::test]
async fn test_attach_defers_response_until_engine_status() {
    let mut h = Harness::start(Config::default());

    let seq = h.request("initialize", json!({ "adapterID": "lua" }));
    let init = h.response(seq).await;
    assert!(init.success);
    assert_eq!(init.body.unwrap()["supportsConfigurationDoneRequest"], true);

    let seq = h.request("attach", json!({ "port": 14002 }));
    let mut engine = h.engine().await;
    assert_eq!(engine.endpoint.port, 14002);
    assert_eq!(engine.endpoint.ip, "127.0.0.1");

    engine.open();
    assert_eq!(next_frame(&mut engine).await["command"], "report_status");

    engine.push(&json!({ "type": "lua_debugger", "message": "waiting" }));

    // status output, then initialized, then the attach response
    match h.next().await {
        ProtocolMessage::Event(e) => assert_eq!(output_text(&e), Some("Debugger status: waiting\n")),
        other => panic!("expected the status output, got {:?}", other),
    }
    match h.next().await {
        ProtocolMessage::Event(e) => assert_eq!(e.event, "initialized"),
        other => panic!("expected initialized, got {:?}", other),
    }
    match h.next().await {
        ProtocolMessage::Response(r) => {
            assert_eq!(r.request_seq, seq);
            assert!(r.success);
        }
        other => panic!("expected the attach response, got {:?}", other),
    }

    for _ in 0..3 {
        let frame = timeout(WAIT, engine.next_json()).await.unwrap().unwrap();
        assert!(is_helper(&frame), "expected a helper script, got {}", frame);
    }

    // The engine waits for breakpoints until configuration is done
    let seq = h.request("configurationDone", json!({}));
    assert!(h.response(seq).await.success);
    let release = next_frame(&mut engine).await;
    assert_eq!(release, json!({ "type": "lua_debugger", "command": "continue" }));
}

#[tokio::test]
async fn test_waiting_after_configuration_continues_immediately() {
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    let seq = h.request("configurationDone", json!({}));
    assert!(h.response(seq).await.success);

    engine.push(&json!({ "type": "lua_debugger", "message": "waiting" }));
    assert_eq!(next_frame(&mut engine).await["command"], "continue");
}

#[tokio::test]
async fn test_halt_verifies_breakpoint_once() {
    let (_dir, script) = project();
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    let seq = h.request(
        "setBreakpoints",
        json!({
            "source": { "path": script.display().to_string() },
            "breakpoints": [{ "line": 10 }, { "line": 20 }]
        }),
    );
    let body = h.response(seq).await.body.unwrap();
    let placed = body["breakpoints"].as_array().unwrap();
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0]["id"], 1000);
    assert_eq!(placed[1]["id"], 1001);
    assert!(placed.iter().all(|bp| bp["verified"] == false));

    let sent = next_frame(&mut engine).await;
    assert_eq!(sent["command"], "set_breakpoints");
    assert_eq!(sent["breakpoints"], json!({ "scripts/player.lua": [10, 20] }));

    engine.push(&json!({
        "type": "lua_debugger", "message": "halted", "source": "@scripts/player.lua", "line": 10
    }));
    engine.push(&callstack(player_frame()));
    h.event("stopped").await;

    let changed: Vec<&EventMessage> = h.events.iter().filter(|e| e.event == "breakpoint").collect();
    assert_eq!(changed.len(), 1);
    let body = changed[0].body.as_ref().unwrap();
    assert_eq!(body["reason"], "changed");
    assert_eq!(body["breakpoint"]["id"], 1000);
    assert_eq!(body["breakpoint"]["verified"], true);
}

#[tokio::test]
async fn test_breakpoints_outside_project_are_not_forwarded() {
    let dir = TempDir::new().unwrap();
    let loose = dir.path().join("loose.lua");
    fs::write(&loose, "").unwrap();

    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    let seq = h.request(
        "setBreakpoints",
        json!({ "source": { "path": loose.display().to_string() }, "lines": [4] }),
    );
    let body = h.response(seq).await.body.unwrap();
    assert_eq!(body["breakpoints"][0]["verified"], false);
    assert_eq!(body["breakpoints"][0]["message"], "Script is not part of a project");

    let sent = next_frame(&mut engine).await;
    assert_eq!(sent["breakpoints"], json!({}));
}

#[tokio::test]
async fn test_stack_trace_and_resume_invalidates_references() {
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    engine.push(&callstack(player_frame()));
    let stopped = h.event("stopped").await;
    assert_eq!(stopped.body.unwrap()["reason"], "breakpoint");

    let seq = h.request("stackTrace", json!({ "threadId": 1 }));
    let body = h.response(seq).await.body.unwrap();
    assert_eq!(body["totalFrames"], 2);
    assert_eq!(body["stackFrames"][0]["name"], "update @ scripts/player.lua:12");
    assert_eq!(body["stackFrames"][0]["line"], 12);
    assert_eq!(body["stackFrames"][1]["name"], "main.lua:3");

    let seq = h.request("scopes", json!({ "frameId": 0 }));
    let body = h.response(seq).await.body.unwrap();
    assert_eq!(body["scopes"][0]["name"], "Local");
    assert_eq!(body["scopes"][1]["name"], "Upvalues");
    let local = body["scopes"][0]["variablesReference"].as_i64().unwrap();

    let seq = h.request("variables", json!({ "variablesReference": local }));
    let body = h.response(seq).await.body.unwrap();
    assert_eq!(body["variables"][0]["name"], "dt");
    assert_eq!(body["variables"][0]["value"], "0.016");
    assert_eq!(body["variables"][1]["name"], "player");
    assert_ne!(body["variables"][1]["variablesReference"], 0);

    let seq = h.request("continue", json!({ "threadId": 1 }));
    let resumed = h.response(seq).await;
    assert!(resumed.success);
    assert_eq!(resumed.body.unwrap()["allThreadsContinued"], true);
    assert_eq!(next_frame(&mut engine).await["command"], "continue");

    let seq = h.request("variables", json!({ "variablesReference": local }));
    let stale = h.response(seq).await;
    assert!(!stale.success);
    assert_eq!(stale.body.unwrap()["error"]["id"], 1001);

    let seq = h.request("stackTrace", json!({ "threadId": 1 }));
    assert!(!h.response(seq).await.success);
}

#[tokio::test]
async fn test_evaluate_identifier_path() {
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    engine.push(&callstack(player_frame()));
    h.event("stopped").await;

    let seq = h.request(
        "evaluate",
        json!({ "expression": "player.health", "frameId": 0, "context": "watch" }),
    );

    let info = next_frame(&mut engine).await;
    assert_eq!(info["command"], "get_identifier_info");
    assert_eq!(info["identifier"], "player");
    engine.push(&json!({
        "type": "lua_debugger",
        "requestId": info["requestId"],
        "identifier_info": { "type": "table", "value": "table: 0x01" }
    }));

    let expand = next_frame(&mut engine).await;
    assert_eq!(expand["command"], "expand_table");
    assert_eq!(
        expand["table_path"],
        json!({ "level": 0, "local": "player", "path": [] })
    );
    engine.push(&json!({
        "type": "lua_debugger",
        "message": "expand_table",
        "node_index": expand["node_index"],
        "table": [
            {"var_name": "name", "type": "string", "value": "hero"},
            {"var_name": "health", "type": "number", "value": "100"}
        ]
    }));

    let response = h.response(seq).await;
    assert!(response.success);
    let body = response.body.unwrap();
    assert_eq!(body["result"], "100");
    assert_eq!(body["type"], "number");
    assert_eq!(body["variablesReference"], 0);

    // The expansion was memoized; a second lookup needs no expand_table
    let seq = h.request(
        "evaluate",
        json!({ "expression": "player.name", "frameId": 0, "context": "hover" }),
    );
    let info = next_frame(&mut engine).await;
    assert_eq!(info["command"], "get_identifier_info");
    engine.push(&json!({
        "type": "lua_debugger",
        "requestId": info["requestId"],
        "identifier_info": { "type": "table", "value": "table: 0x01" }
    }));
    assert_eq!(h.response(seq).await.body.unwrap()["result"], "hero");
}

#[tokio::test]
async fn test_engine_messages_flow_while_evaluation_waits() {
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    let seq = h.request("evaluate", json!({ "expression": "1 + 2", "context": "repl" }));
    let script = next_frame(&mut engine).await;
    assert_eq!(script["type"], "script");
    let call = script["script"].as_str().unwrap();
    assert!(call.contains("evaluate_script_expression"));

    engine.push(&json!({ "type": "message", "system": "Lua", "level": "info", "message": "tick" }));
    h.console("[INFO] Lua / tick\n").await;

    let id: u64 = call
        .rsplit(',')
        .next()
        .and_then(|tail| tail.trim().trim_end_matches(')').trim().parse().ok())
        .expect("correlation id in snippet call");
    engine.push(&json!({
        "type": "script_output", "requestId": id, "result": "3", "result_type": "number"
    }));

    let body = h.response(seq).await.body.unwrap();
    assert_eq!(body["result"], "3");
    assert_eq!(body["type"], "number");
}

#[tokio::test(start_paused = true)]
async fn test_snippet_evaluation_times_out() {
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    let seq = h.request("evaluate", json!({ "expression": "while true do end", "context": "repl" }));
    assert_eq!(next_frame(&mut engine).await["type"], "script");

    let response = h.response(seq).await;
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Evaluation timed out after 3000 ms"));

    // The session keeps serving requests afterwards
    let seq = h.request("threads", json!({}));
    let body = h.response(seq).await.body.unwrap();
    assert_eq!(body["threads"], json!([{ "id": 1, "name": "Lua" }]));
}

#[tokio::test]
async fn test_engine_close_terminates_once() {
    let mut h = Harness::start(Config::default());
    let engine = attach(&mut h).await;

    engine.push_event(TransportEvent::Closed);
    let terminated = h.event("terminated").await;
    assert_eq!(terminated.body.unwrap()["restart"], false);

    let seq = h.request("continue", json!({ "threadId": 1 }));
    let failed = h.response(seq).await;
    assert!(!failed.success);
    assert_eq!(failed.body.unwrap()["error"]["id"], 5656);

    engine.push_event(TransportEvent::Closed);
    let seq = h.request("threads", json!({}));
    h.response(seq).await;
    assert!(h.events.iter().all(|e| e.event != "terminated"));
}

#[tokio::test]
async fn test_connection_failure_fails_attach() {
    let mut h = Harness::start(Config::default());

    let seq = h.request("attach", json!({}));
    let engine = h.engine().await;
    engine.push_event(TransportEvent::Error("connection refused".to_string()));

    let response = h.response(seq).await;
    assert!(!response.success);
    assert!(response.message.unwrap().contains("connection refused"));
    h.event("terminated").await;

    // A terminated session can attach again
    let seq = h.request("attach", json!({}));
    let engine = h.engine().await;
    engine.open();
    engine.push(&json!({ "type": "lua_debugger", "message": "running" }));
    assert!(h.response(seq).await.success);
}

#[tokio::test]
async fn test_unknown_halt_resets_and_continues() {
    let mut config = Config::default();
    config.breakpoints.unknown_halt_policy = UnknownHaltPolicy::ResetAndContinue;
    let mut h = Harness::start(config);
    let mut engine = attach(&mut h).await;

    engine.push(&json!({
        "type": "lua_debugger", "message": "halted", "source": "@core/boot.lua", "line": 1
    }));

    let reset = next_frame(&mut engine).await;
    assert_eq!(reset["command"], "set_breakpoints");
    assert_eq!(reset["breakpoints"], json!({}));
    assert_eq!(next_frame(&mut engine).await["command"], "continue");

    let continued = h.event("continued").await;
    assert_eq!(continued.body.unwrap()["threadId"], 1);
}

#[tokio::test]
async fn test_launch_connects_after_delay() {
    let mut config = Config::default();
    config.engine.launch_connect_delay_ms = 0;
    let mut h = Harness::start(config);

    let seq = h.request(
        "launch",
        json!({
            "toolchain": "/opt/toolchain",
            "project_file": "/work/game/game.stingray_project",
            "command_line_args": ["--lua-discard-bytecode"]
        }),
    );

    h.console("Launching engine --port 14031 --lua-discard-bytecode\n").await;

    let mut engine = h.engine().await;
    assert_eq!(engine.endpoint.port, 14031);
    engine.open();
    assert_eq!(next_frame(&mut engine).await["command"], "report_status");
    engine.push(&json!({ "type": "lua_debugger", "message": "running" }));
    assert!(h.response(seq).await.success);

    // A second launch is refused while the first one is live
    let seq = h.request("launch", json!({ "toolchain": "/t", "project_file": "/p" }));
    let refused = h.response(seq).await;
    assert!(!refused.success);
    assert_eq!(refused.body.unwrap()["error"]["id"], 4001);

    let seq = h.request("disconnect", json!({ "terminateDebuggee": true }));
    assert!(h.response(seq).await.success);
}

#[tokio::test]
async fn test_unsupported_request() {
    let mut h = Harness::start(Config::default());

    let seq = h.request("readMemory", json!({}));
    let response = h.response(seq).await;
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Unsupported request 'readMemory'"));
}

#[tokio::test]
async fn test_engine_running_invalidates_halt() {
    let mut h = Harness::start(Config::default());
    let engine = attach(&mut h).await;

    engine.push(&callstack(player_frame()));
    h.event("stopped").await;

    let seq = h.request("scopes", json!({ "frameId": 0 }));
    let body = h.response(seq).await.body.unwrap();
    let local = body["scopes"][0]["variablesReference"].as_i64().unwrap();

    // The engine resumes without a continue request from the editor
    engine.push(&json!({ "type": "lua_debugger", "message": "running" }));
    h.console("Debugger status: running\n").await;

    let seq = h.request("variables", json!({ "variablesReference": local }));
    let stale = h.response(seq).await;
    assert!(!stale.success);
    assert_eq!(stale.body.unwrap()["error"]["id"], 1001);

    let seq = h.request("stackTrace", json!({ "threadId": 1 }));
    let stack = h.response(seq).await;
    assert!(!stack.success);
    assert_eq!(stack.message.as_deref(), Some("No callstack available"));
}

#[tokio::test]
async fn test_set_variable_sends_typed_value() {
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    engine.push(&callstack(player_frame()));
    h.event("stopped").await;

    let seq = h.request("scopes", json!({ "frameId": 0 }));
    let body = h.response(seq).await.body.unwrap();
    let local = body["scopes"][0]["variablesReference"].as_i64().unwrap();

    // Frame local, value reported back by the engine
    let seq = h.request(
        "setVariable",
        json!({ "variablesReference": local, "name": "dt", "value": "0.5" }),
    );
    let modify = next_frame(&mut engine).await;
    assert_eq!(modify["type"], "lua_debugger");
    assert_eq!(modify["command"], "modify_variable");
    assert_eq!(modify["variable"], json!({ "level": 0, "local": "dt", "path": [] }));
    assert_eq!(modify["value"], json!(0.5));
    engine.push(&json!({
        "type": "lua_debugger", "requestId": modify["requestId"], "value": "0.5"
    }));

    let body = h.response(seq).await.body.unwrap();
    assert_eq!(body["value"], "0.5");
    assert_eq!(body["type"], "number");

    // Entry of a local table, addressed by its position
    let seq = h.request("variables", json!({ "variablesReference": local }));
    let body = h.response(seq).await.body.unwrap();
    let player = body["variables"][1]["variablesReference"].as_i64().unwrap();

    let seq = h.request("variables", json!({ "variablesReference": player }));
    let expand = next_frame(&mut engine).await;
    assert_eq!(expand["command"], "expand_table");
    engine.push(&json!({
        "type": "lua_debugger",
        "message": "expand_table",
        "node_index": expand["node_index"],
        "table": [
            {"var_name": "name", "type": "string", "value": "hero"},
            {"var_name": "health", "type": "number", "value": "100"}
        ]
    }));
    assert!(h.response(seq).await.success);

    let seq = h.request(
        "setVariable",
        json!({ "variablesReference": player, "name": "health", "value": "80" }),
    );
    let modify = next_frame(&mut engine).await;
    assert_eq!(modify["variable"], json!({ "level": 0, "local": "player", "path": [2] }));
    assert_eq!(modify["value"], json!(80));
    engine.push(&json!({ "type": "lua_debugger", "requestId": modify["requestId"] }));
    assert_eq!(h.response(seq).await.body.unwrap()["value"], "80");

    // Unknown names fail without reaching the engine
    let seq = h.request(
        "setVariable",
        json!({ "variablesReference": player, "name": "mana", "value": "1" }),
    );
    let missing = h.response(seq).await;
    assert!(!missing.success);
    assert_eq!(missing.body.unwrap()["error"]["id"], 1001);
}

#[tokio::test]
async fn test_restart_reconnects_and_defers_response() {
    let mut h = Harness::start(Config::default());
    let first = attach(&mut h).await;

    let seq = h.request("restart", json!({}));
    let mut engine = h.engine().await;
    assert_eq!(engine.endpoint, Endpoint::new("127.0.0.1", 14000));

    // The previous connection is gone; its close is not a termination
    first.push_event(TransportEvent::Closed);

    engine.open();
    assert_eq!(next_frame(&mut engine).await["command"], "report_status");
    engine.push(&json!({ "type": "lua_debugger", "message": "running" }));

    h.event("initialized").await;
    assert!(h.response(seq).await.success);

    let seq = h.request("threads", json!({}));
    assert!(h.response(seq).await.success);
    assert!(h.events.iter().all(|e| e.event != "terminated"));
}

#[tokio::test]
async fn test_restart_without_engine_fails() {
    let mut h = Harness::start(Config::default());

    let seq = h.request("restart", json!({}));
    let response = h.response(seq).await;
    assert!(!response.success);
    assert_eq!(response.body.unwrap()["error"]["id"], 5656);
}

#[tokio::test]
async fn test_step_and_pause_commands() {
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    for (request, command) in [
        ("next", "step_over"),
        ("stepIn", "step_into"),
        ("stepOut", "step_out"),
        ("pause", "break"),
    ] {
        let seq = h.request(request, json!({ "threadId": 1 }));
        let response = h.response(seq).await;
        assert!(response.success, "{} failed", request);
        assert_eq!(response.command, request);
        assert_eq!(
            next_frame(&mut engine).await,
            json!({ "type": "lua_debugger", "command": command })
        );
    }
}

#[tokio::test]
async fn test_unknown_halt_is_ignored_by_default() {
    let mut h = Harness::start(Config::default());
    let mut engine = attach(&mut h).await;

    engine.push(&json!({
        "type": "lua_debugger", "message": "halted", "source": "@core/boot.lua", "line": 1
    }));
    engine.push(&callstack(player_frame()));
    h.event("stopped").await;

    // Nothing was sent to the engine before this pause
    let seq = h.request("pause", json!({ "threadId": 1 }));
    assert!(h.response(seq).await.success);
    assert_eq!(next_frame(&mut engine).await["command"], "break");

    assert!(h.events.iter().all(|e| e.event != "continued" && e.event != "breakpoint"));
}
