// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use core_config::McpProviderSpec;
use core_protocol::{RequestId, StructuredCall, StructuredError, StructuredResponse};

use crate::error::McpError;

const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);
const STDERR_CAPTURE_LIMIT: usize = 4096;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a spawned tool-provider subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Connecting,
    Ready,
    Failed,
    Closed,
}

type Waiter = oneshot::Sender<Result<Value, StructuredError>>;

/// One spawned tool-provider subprocess, with its own monotonic call-id
/// counter and pending-waiter map.
///
/// A single reader task owns `pending` for the lifetime of the process: it
/// is the only task that ever removes entries from the map, matching
/// responses to callers by id. `call` only ever inserts.
pub struct ToolProvider {
    name: String,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Arc<Mutex<HashMap<u64, Waiter>>>,
    next_id: AtomicU64,
    state: Arc<RwLock<ProviderState>>,
    stderr_tail: Arc<Mutex<String>>,
    child: tokio::sync::Mutex<Child>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl ToolProvider {
    pub async fn spawn(spec: &McpProviderSpec) -> Result<Self, McpError> {
        Self::spawn_with_timeout(spec, DEFAULT_INIT_TIMEOUT).await
    }

    pub async fn spawn_with_timeout(
        spec: &McpProviderSpec,
        init_timeout: Duration,
    ) -> Result<Self, McpError> {
        let provider = Self::spawn_unchecked(spec).await?;

        match timeout(init_timeout, provider.call_with_id(0, "initialize", json!({}))).await {
            Ok(Ok(_)) => {
                *provider.state.write().unwrap() = ProviderState::Ready;
                Ok(provider)
            }
            Ok(Err(e)) => {
                *provider.state.write().unwrap() = ProviderState::Failed;
                Err(e)
            }
            Err(_elapsed) => {
                *provider.state.write().unwrap() = ProviderState::Failed;
                Err(McpError::InitTimeout {
                    stderr: provider.stderr_tail.lock().unwrap().clone(),
                })
            }
        }
    }

    /// Spawn the subprocess without performing the `initialize` handshake.
    /// Used by `spawn_with_timeout` and, directly, by tests that only need
    /// a live process to exercise shutdown against.
    async fn spawn_unchecked(spec: &McpProviderSpec) -> Result<Self, McpError> {
        let mut cmd = tokio::process::Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(McpError::Spawn)?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let pending: Arc<Mutex<HashMap<u64, Waiter>>> = Arc::new(Mutex::new(HashMap::new()));
        let state = Arc::new(RwLock::new(ProviderState::Connecting));
        let stderr_tail = Arc::new(Mutex::new(String::new()));

        tokio::spawn(drain_stderr(stderr, stderr_tail.clone()));

        let reader_task = tokio::spawn(reader_loop(
            spec.name.clone(),
            stdout,
            pending.clone(),
            state.clone(),
        ));

        Ok(Self {
            name: spec.name.clone(),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            state,
            stderr_tail,
            child: tokio::sync::Mutex::new(child),
            reader_task,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProviderState {
        *self.state.read().unwrap()
    }

    pub async fn list_tools(&self) -> Result<Value, McpError> {
        self.call("tools/list", json!({})).await
    }

    pub async fn call_tool(&self, tool: &str, args: Value) -> Result<Value, McpError> {
        self.call("tools/call", json!({ "name": tool, "arguments": args }))
            .await
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.call_with_id(id, method, params).await
    }

    async fn call_with_id(&self, id: u64, method: &str, params: Value) -> Result<Value, McpError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let call = StructuredCall {
            version: "2.0".into(),
            id: Some(RequestId::Number(id as i64)),
            method: method.to_string(),
            params: Some(params),
        };
        let mut line = serde_json::to_string(&call).map_err(McpError::Encode)?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await.map_err(McpError::Write)?;
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(McpError::CallFailed {
                code: e.code,
                message: e.message,
            }),
            Err(_recv_error) => Err(McpError::ProviderClosed),
        }
    }

    /// Closes stdin, gives the process `shutdown_timeout` to exit on its
    /// own, and only then falls back to killing it.
    pub async fn close(&self) {
        self.close_with_timeout(SHUTDOWN_TIMEOUT).await
    }

    async fn close_with_timeout(&self, shutdown_timeout: Duration) {
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }

        let mut child = self.child.lock().await;
        if timeout(shutdown_timeout, child.wait()).await.is_err() {
            warn!(provider = %self.name, "tool provider did not exit after stdin close, killing");
            let _ = child.start_kill();
        }

        self.reader_task.abort();
        *self.state.write().unwrap() = ProviderState::Closed;
    }
}

async fn reader_loop(
    name: String,
    stdout: tokio::process::ChildStdout,
    pending: Arc<Mutex<HashMap<u64, Waiter>>>,
    state: Arc<RwLock<ProviderState>>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => route_response_line(&name, &line, &pending),
            Ok(None) => break,
            Err(e) => {
                warn!(provider = %name, error = %e, "tool provider stdout read error");
                break;
            }
        }
    }

    let mut guard = pending.lock().unwrap();
    for (_, tx) in guard.drain() {
        let _ = tx.send(Err(StructuredError::internal_error("provider closed")));
    }
    *state.write().unwrap() = ProviderState::Closed;
}

fn route_response_line(name: &str, line: &str, pending: &Arc<Mutex<HashMap<u64, Waiter>>>) {
    let response: StructuredResponse = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            debug!(provider = %name, error = %e, line = %line, "unparseable provider response, skipping");
            return;
        }
    };

    let Some(RequestId::Number(id)) = response.id else {
        debug!(provider = %name, "provider response missing a numeric id, skipping");
        return;
    };

    let Some(tx) = pending.lock().unwrap().remove(&(id as u64)) else {
        debug!(provider = %name, id, "no waiter registered for response id");
        return;
    };

    let outcome = match (response.result, response.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(error),
        (None, None) => Err(StructuredError::internal_error("empty provider response")),
    };
    let _ = tx.send(outcome);
}

async fn drain_stderr(stderr: tokio::process::ChildStderr, tail: Arc<Mutex<String>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut buf = tail.lock().unwrap();
        buf.push_str(&line);
        buf.push('\n');
        if buf.len() > STDERR_CAPTURE_LIMIT {
            let excess = buf.len() - STDERR_CAPTURE_LIMIT;
            buf.drain(..excess);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
//
// These exercise the spawn/write/read pipeline against real (but trivial)
// subprocesses rather than a live MCP server: `cat` echoes whatever is
// written to its stdin back out, which is enough to drive the full
// write-then-route path end to end.

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(command: &str, args: &[&str]) -> McpProviderSpec {
        McpProviderSpec {
            name: "fixture".into(),
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn spawning_a_nonexistent_command_is_a_spawn_error() {
        let spec = spec("/nonexistent/tool-provider-binary", &[]);
        let err = ToolProvider::spawn(&spec).await.unwrap_err();
        assert!(matches!(err, McpError::Spawn(_)));
    }

    #[tokio::test]
    async fn process_exiting_before_responding_fails_init() {
        let spec = spec("true", &[]);
        let err = ToolProvider::spawn(&spec).await.unwrap_err();
        assert!(matches!(err, McpError::ProviderClosed));
    }

    #[tokio::test]
    async fn echo_fixture_round_trips_a_frame_back_through_the_reader() {
        // `cat` echoes our init request back verbatim; it has no `result`/
        // `error` field so it decodes as an empty response, which the
        // provider classifies as an internal error rather than hanging.
        let spec = spec("cat", &[]);
        let err = ToolProvider::spawn_with_timeout(&spec, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::CallFailed { code, .. } if code == StructuredError::INTERNAL_ERROR));
    }

    #[tokio::test]
    async fn init_timeout_is_reported_with_captured_stderr() {
        // `sleep` never writes to stdout, so init always times out.
        let spec = spec("sleep", &["5"]);
        let err = ToolProvider::spawn_with_timeout(&spec, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InitTimeout { .. }));
    }

    #[tokio::test]
    async fn close_exits_via_stdin_shutdown_without_killing() {
        // `cat` exits on its own once stdin is closed, so a generous
        // shutdown timeout should never reach the kill fallback.
        let provider = ToolProvider::spawn_unchecked(&spec("cat", &[])).await.unwrap();
        provider.close_with_timeout(Duration::from_secs(2)).await;
        assert_eq!(provider.state(), ProviderState::Closed);
    }

    #[tokio::test]
    async fn close_falls_back_to_kill_when_the_process_ignores_stdin_shutdown() {
        // `sleep` keeps running after stdin closes, so close() must fall
        // back to killing it rather than waiting forever.
        let provider = ToolProvider::spawn_unchecked(&spec("sleep", &["30"])).await.unwrap();
        provider.close_with_timeout(Duration::from_millis(50)).await;
        assert_eq!(provider.state(), ProviderState::Closed);
    }
}
