/*!
 * IPC Bridge for headsetd
 * Method-channel calls as JSON lines over a Unix socket
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};

use crate::channel::{ChannelRegistry, MethodCall, MethodResponse};

/// One line on the wire: a method call addressed to a channel.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub channel: String,
    pub method: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Bind the socket, clearing a stale file left by a previous run.
pub fn bind_socket(path: &str) -> Result<UnixListener> {
    let socket = Path::new(path);
    if let Some(parent) = socket.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating socket directory {}", parent.display()))?;
    }
    if socket.exists() {
        tracing::debug!("Removing stale socket {}", path);
        fs::remove_file(socket).with_context(|| format!("removing stale socket {}", path))?;
    }
    UnixListener::bind(socket).with_context(|| format!("binding socket {}", path))
}

pub struct IpcServer {
    listener: UnixListener,
    registry: Arc<ChannelRegistry>,
}

impl IpcServer {
    pub fn new(listener: UnixListener, registry: ChannelRegistry) -> Self {
        Self {
            listener,
            registry: Arc::new(registry),
        }
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("IPC server listening for connections...");

        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    tracing::debug!("New client connected");
                    let registry = Arc::clone(&self.registry);

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, registry).await {
                            tracing::error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Longest request line accepted, newline included.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

async fn handle_client(stream: UnixStream, registry: Arc<ChannelRegistry>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_REQUEST_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            break;
        }

        // No newline within the limit: the stream can't be resynchronized.
        if buf.len() >= MAX_REQUEST_BYTES && buf.last() != Some(&b'\n') {
            tracing::warn!("Request exceeds {} bytes, closing connection", MAX_REQUEST_BYTES);
            let response = MethodResponse::error(
                "bad_request",
                format!("Request exceeds {} bytes", MAX_REQUEST_BYTES),
            );
            write_response(&mut writer, &response).await?;
            break;
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(request) => {
                let request = request.trim();
                if request.is_empty() {
                    continue;
                }
                tracing::debug!("Received request: {}", request);
                dispatch(&registry, request).await
            }
            Err(e) => MethodResponse::error("bad_request", format!("Request is not UTF-8: {}", e)),
        };
        write_response(&mut writer, &response).await?;
    }

    tracing::debug!("Client disconnected");
    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &MethodResponse) -> Result<()> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    Ok(())
}

/// Route one request line to its channel handler.
pub async fn dispatch(registry: &ChannelRegistry, request: &str) -> MethodResponse {
    let request: ChannelRequest = match serde_json::from_str(request) {
        Ok(request) => request,
        Err(e) => return MethodResponse::error("bad_request", format!("Malformed request: {}", e)),
    };

    let Some(handler) = registry.handler(&request.channel) else {
        tracing::warn!("Call on unknown channel: {}", request.channel);
        return MethodResponse::error(
            "unknown_channel",
            format!("No handler registered for {}", request.channel),
        );
    };

    let call = MethodCall {
        method: request.method,
        arguments: request.arguments,
    };

    // Backends may block on the system bus.
    match tokio::task::spawn_blocking(move || handler.on_method_call(&call)).await {
        Ok(response) => response,
        Err(e) => MethodResponse::error("handler_failed", e.to_string()),
    }
}
