//! Line-delimited JSON channel to the automation bridge.
//!
//! One request per line on the bridge's stdin, one response per line on its
//! stdout, strictly alternating.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub op: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeFailure {
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<BridgeFailure>,
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result,
            error: None,
        }
    }

    pub fn failure(id: u64, kind: &str, message: &str) -> Self {
        Self {
            id,
            ok: false,
            result: Value::Null,
            error: Some(BridgeFailure {
                kind: kind.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

pub trait Transport: Send {
    /// Send one request and wait for its response.
    fn exchange(&mut self, request: &Request) -> Result<Response, EngineError>;

    /// Ask the bridge to exit, killing it after `grace`. Idempotent.
    fn shutdown(&mut self, quit: &Request, grace: Duration);
}

/// Bridge running as a child process.
pub struct ProcessTransport {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ProcessTransport {
    #[instrument(skip_all, fields(program = command.first().map(String::as_str).unwrap_or("")))]
    pub fn spawn(command: &[String]) -> Result<Self, EngineError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EngineError::Unavailable("bridge command is empty".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| EngineError::Unavailable(format!("spawn {program}: {err}")))?;
        debug!(pid = child.id(), "spawned automation bridge");

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("bridge stdout was not piped".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(target: "bridge", "{line}");
                }
            });
        }
        Ok(Self {
            child: Some(child),
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

impl Transport for ProcessTransport {
    fn exchange(&mut self, request: &Request) -> Result<Response, EngineError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EngineError::Bridge("bridge is shut down".to_string()))?;
        let mut line = serde_json::to_string(request)
            .map_err(|err| EngineError::Bridge(format!("encode request: {err}")))?;
        line.push('\n');
        stdin.write_all(line.as_bytes())?;
        stdin.flush()?;

        let mut reply = String::new();
        if self.stdout.read_line(&mut reply)? == 0 {
            return Err(EngineError::Bridge("bridge closed its output".to_string()));
        }
        let response: Response = serde_json::from_str(reply.trim_end())
            .map_err(|err| EngineError::Bridge(format!("malformed response: {err}")))?;
        if response.id != request.id {
            return Err(EngineError::Bridge(format!(
                "response id {} does not match request {}",
                response.id, request.id
            )));
        }
        Ok(response)
    }

    fn shutdown(&mut self, quit: &Request, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Some(mut stdin) = self.stdin.take()
            && let Ok(line) = serde_json::to_string(quit)
            && let Err(err) = writeln!(stdin, "{line}").and_then(|()| stdin.flush())
        {
            debug!(err = %err, "bridge did not accept quit");
        }
        match child.wait_timeout(grace) {
            Ok(Some(status)) => debug!(exit_code = ?status.code(), "bridge exited"),
            Ok(None) => {
                warn!(grace_secs = grace.as_secs(), "bridge did not exit in time, killing");
                if let Err(err) = child.kill() {
                    warn!(err = %err, "failed to kill bridge");
                }
                let _ = child.wait();
            }
            Err(err) => {
                warn!(err = %err, "failed to wait for bridge, killing");
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
