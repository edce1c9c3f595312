// src/exec/command.rs

//! Subprocess-backed [`Backend`] implementation.
//!
//! `CommandBackend` bridges to an external program over a one-shot JSON
//! protocol: a single request frame is written to the child's stdin, and the
//! child answers with a single response frame on stdout before exiting.
//!
//! Request frame:  `{"id": "...", "prompt": "...", "timeout_ms": 120000}`
//! Response frame: `{"ok": true, "text": "...", "usage": 123}` or
//!                 `{"ok": false, "error_kind": "rate_limited", "message": "..."}`
//!
//! Stdout lines that do not parse as a response frame are treated as chatter
//! and logged at debug, so bridge scripts are free to print progress. Stderr
//! is always drained and logged at debug.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::exec::backend::{
    Backend, BackendError, BackendErrorKind, BackendRequest, BackendResponse,
};

/// One request as the bridge program sees it on stdin.
#[derive(Debug, Serialize)]
struct RequestFrame<'a> {
    id: &'a str,
    prompt: &'a str,
    timeout_ms: u64,
}

/// One response line from the bridge program's stdout.
#[derive(Debug, Deserialize)]
struct ResponseFrame {
    ok: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    usage: Option<u32>,
    #[serde(default)]
    error_kind: Option<BackendErrorKind>,
    #[serde(default)]
    message: Option<String>,
}

impl ResponseFrame {
    fn into_result(self) -> std::result::Result<BackendResponse, BackendError> {
        if self.ok {
            Ok(BackendResponse {
                text: self.text.unwrap_or_default(),
                usage: self.usage,
            })
        } else {
            Err(BackendError::new(
                self.error_kind.unwrap_or(BackendErrorKind::Unknown),
                self.message
                    .unwrap_or_else(|| "bridge reported failure without a message".to_string()),
            ))
        }
    }
}

/// Backend that shells out to a configured command for every invocation.
pub struct CommandBackend {
    id: String,
    cmd: String,
}

impl CommandBackend {
    pub fn new(id: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cmd: cmd.into(),
        }
    }

    async fn invoke_inner(
        &self,
        request: BackendRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> std::result::Result<BackendResponse, BackendError> {
        info!(
            backend = %self.id,
            subtask = %request.subtask_id,
            cmd = %self.cmd,
            "starting bridge process"
        );

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            BackendError::new(
                BackendErrorKind::NotFound,
                format!("spawning '{}': {}", self.cmd, err),
            )
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Always consume stderr so buffers don't fill; log at debug.
        if let Some(stderr) = stderr {
            let backend_id = self.id.clone();
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(backend = %backend_id, "stderr: {}", line);
                }
            });
        }

        let frame = serde_json::to_string(&RequestFrame {
            id: &request.subtask_id,
            prompt: &request.prompt,
            timeout_ms: request.deadline.as_millis() as u64,
        })
        .map_err(|err| {
            BackendError::new(
                BackendErrorKind::Unknown,
                format!("encoding request frame: {}", err),
            )
        })?;

        // Either the bridge answers and exits (normal case), or cancellation
        // tears the process down.
        tokio::select! {
            result = drive_bridge(&mut child, stdin, stdout, frame, &self.id) => result,
            changed = cancel.changed() => {
                if changed.is_ok() {
                    info!(
                        backend = %self.id,
                        subtask = %request.subtask_id,
                        "cancellation requested; killing bridge process"
                    );
                    if let Err(err) = child.kill().await {
                        warn!(
                            backend = %self.id,
                            error = %err,
                            "failed to kill bridge process on cancellation"
                        );
                    }
                } else {
                    // Sender dropped; the run is being torn down and
                    // kill_on_drop(true) reaps the child.
                    debug!(
                        backend = %self.id,
                        "cancel channel closed while bridge process was running"
                    );
                }
                Err(BackendError::new(
                    BackendErrorKind::Unknown,
                    "cancelled while the bridge process was running",
                ))
            }
        }
    }
}

impl Backend for CommandBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn invoke(
        &self,
        request: BackendRequest,
        cancel: watch::Receiver<bool>,
    ) -> Pin<
        Box<
            dyn Future<Output = std::result::Result<BackendResponse, BackendError>> + Send + '_,
        >,
    > {
        Box::pin(async move { self.invoke_inner(request, cancel).await })
    }
}

/// Feed the request frame to the child, scan stdout for a response frame and
/// wait for the process to exit.
///
/// Stdout is drained to EOF even after a frame parses, so a chatty bridge can
/// never deadlock on a full pipe. The first parseable frame wins.
async fn drive_bridge(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    frame: String,
    backend_id: &str,
) -> std::result::Result<BackendResponse, BackendError> {
    if let Some(mut stdin) = stdin {
        let write_result = async {
            stdin.write_all(frame.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await
        }
        .await;
        if let Err(err) = write_result {
            return Err(BackendError::new(
                BackendErrorKind::ServerError,
                format!("writing request frame to bridge: {}", err),
            ));
        }
    }

    let mut parsed: Option<ResponseFrame> = None;
    if let Some(stdout) = stdout {
        let reader = BufReader::new(stdout);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if parsed.is_none() {
                match serde_json::from_str::<ResponseFrame>(&line) {
                    Ok(frame) => {
                        parsed = Some(frame);
                        continue;
                    }
                    Err(_) => {}
                }
            }
            debug!(backend = %backend_id, "bridge chatter: {}", line);
        }
    }

    let status = child.wait().await.map_err(|err| {
        BackendError::new(
            BackendErrorKind::Unknown,
            format!("waiting for bridge process: {}", err),
        )
    })?;

    debug!(
        backend = %backend_id,
        exit_code = status.code().unwrap_or(-1),
        got_frame = parsed.is_some(),
        "bridge process exited"
    );

    match parsed {
        Some(frame) => frame.into_result(),
        None if status.success() => Err(BackendError::new(
            BackendErrorKind::Unknown,
            "bridge exited without a response frame",
        )),
        None => Err(BackendError::new(
            BackendErrorKind::ServerError,
            format!(
                "bridge exited with status {} and no response frame",
                status.code().unwrap_or(-1)
            ),
        )),
    }
}
