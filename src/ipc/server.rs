//! Local control server for `desktop-session-ctl` commands.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands
//! and routes them to the session controller.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "status"}
//! {"command": "attach", "session_id": 7}
//! {"command": "detach"}
//! {"command": "capture"}
//! {"command": "control", "action": "lock_screen"}
//! {"command": "configure", "desktop": {"wallpaper": false, "font_smoothing": true, "effects": false}}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unauthorized"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::models::desktop::{ControlAction, DesktopConfig};
use crate::models::session::SessionId;
use crate::orchestrator::controller::SessionControllerHandle;
use crate::{AppError, Result};

/// Shared state for IPC connections.
#[derive(Debug)]
pub struct IpcState {
    /// Namespaced socket name to listen on.
    pub ipc_name: String,
    /// Controller commands are forwarded to.
    pub controller: SessionControllerHandle,
    /// Shared secret every request must carry, when set.
    pub auth_token: Option<String>,
}

/// Inbound request from `desktop-session-ctl`.
#[derive(Debug, Deserialize)]
pub struct IpcRequest {
    /// Command verb.
    pub command: String,
    /// Target interactive session (for `attach`).
    pub session_id: Option<u32>,
    /// Control verb (for `control`).
    pub action: Option<ControlAction>,
    /// Appearance flags (for `configure`).
    pub desktop: Option<DesktopConfig>,
    /// Shared-secret authentication token.
    pub auth_token: Option<String>,
}

/// Outbound response to `desktop-session-ctl`.
#[derive(Debug, Serialize, PartialEq)]
pub struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    state: Arc<IpcState>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = state.ipc_name.clone();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let state = Arc::clone(&state);
                                tokio::spawn(handle_connection(stream, state));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Handle a single IPC client connection.
async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, state: Arc<IpcState>) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                        Ok(request) => dispatch_command(&request, &state),
                        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Route a command to the controller.
#[must_use]
pub fn dispatch_command(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);
    let _guard = span.enter();

    if let Some(ref expected) = state.auth_token {
        match request.auth_token {
            Some(ref provided) if provided == expected => {}
            _ => {
                warn!(command = %request.command, "IPC request rejected: invalid auth token");
                return IpcResponse::error("unauthorized");
            }
        }
    }

    match request.command.as_str() {
        "status" => handle_status(state),
        "attach" => handle_attach(request, state),
        "detach" => respond(state.controller.detach_session(), "detach requested"),
        "capture" => {
            state.controller.proxy().capture_screen();
            IpcResponse::success(serde_json::json!({ "status": "capture requested" }))
        }
        "control" => handle_control(request, state),
        "configure" => handle_configure(request, state),
        other => IpcResponse::error(format!("unknown command: {other}")),
    }
}

fn respond(result: Result<()>, status: &str) -> IpcResponse {
    match result {
        Ok(()) => IpcResponse::success(serde_json::json!({ "status": status })),
        Err(err) => IpcResponse::error(err.to_string()),
    }
}

fn handle_status(state: &IpcState) -> IpcResponse {
    match serde_json::to_value(state.controller.status()) {
        Ok(value) => IpcResponse::success(value),
        Err(err) => IpcResponse::error(format!("failed to serialize status: {err}")),
    }
}

fn handle_attach(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let Some(session_id) = request.session_id else {
        return IpcResponse::error("missing required 'session_id' field");
    };

    info!(session_id, "attach requested via IPC");
    respond(
        state.controller.attach_session(SessionId(session_id)),
        "attach requested",
    )
}

fn handle_control(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let Some(action) = request.action else {
        return IpcResponse::error("missing required 'action' field");
    };

    state.controller.proxy().control(action);
    IpcResponse::success(serde_json::json!({ "action": action }))
}

fn handle_configure(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let Some(desktop) = request.desktop else {
        return IpcResponse::error("missing required 'desktop' field");
    };

    respond(state.controller.configure(desktop), "configuration queued")
}
