/*!
 * headsetd Client
 * Method-channel calls to headsetd over its Unix socket
 */

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub const GET_HEADSET_STATUS: &str = "getHeadsetStatus";

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub channel: &'a str,
    pub method: &'a str,
    pub arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Success {
        result: Value,
    },
    Error {
        code: String,
        message: String,
        #[serde(default)]
        details: Option<Value>,
    },
    NotImplemented,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadsetStatus {
    pub connected: bool,
    pub name: Option<String>,
    pub devices: Vec<String>,
    pub bluetooth_enabled: bool,
    pub routed_to_bluetooth: bool,
    pub reason: String,
}

pub struct HeadsetClient {
    socket_path: String,
    channel: String,
}

impl HeadsetClient {
    pub fn new(socket_path: String, channel: String) -> Self {
        Self {
            socket_path,
            channel,
        }
    }

    pub async fn invoke(&self, method: &str) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("connecting to headsetd at {}", self.socket_path))?;
        let (reader, mut writer) = stream.into_split();

        let request = Request {
            channel: &self.channel,
            method,
            arguments: None,
        };
        let mut payload = serde_json::to_vec(&request)?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;

        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await?;
        if line.is_empty() {
            bail!("headsetd closed the connection without answering");
        }
        tracing::debug!("Response: {}", line.trim());

        Ok(serde_json::from_str(line.trim())?)
    }

    pub async fn headset_status(&self) -> Result<HeadsetStatus> {
        match self.invoke(GET_HEADSET_STATUS).await? {
            Response::Success { result } => Ok(serde_json::from_value(result)?),
            Response::NotImplemented => bail!("{} is not implemented on {}", GET_HEADSET_STATUS, self.channel),
            Response::Error { code, message, .. } => bail!("{}: {}", code, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    async fn serve_once(path: &str, reply: &'static str) -> tokio::task::JoinHandle<String> {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            writer.write_all(reply.as_bytes()).await.unwrap();
            line
        })
    }

    #[tokio::test]
    async fn parses_status_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headsetd.sock").to_str().unwrap().to_string();
        let server = serve_once(
            &path,
            "{\"type\":\"Success\",\"result\":{\"connected\":true,\"name\":\"MyBuds\",\"devices\":[\"MyBuds\"],\"bluetoothEnabled\":true,\"routedToBluetooth\":false,\"reason\":\"ok\"}}\n",
        )
        .await;

        let client = HeadsetClient::new(path, "test/headset".to_string());
        let status = client.headset_status().await.unwrap();
        assert!(status.connected);
        assert_eq!(status.name.as_deref(), Some("MyBuds"));
        assert_eq!(status.reason, "ok");

        let sent: Value = serde_json::from_str(server.await.unwrap().trim()).unwrap();
        assert_eq!(sent["channel"], "test/headset");
        assert_eq!(sent["method"], GET_HEADSET_STATUS);
    }

    #[tokio::test]
    async fn not_implemented_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headsetd.sock").to_str().unwrap().to_string();
        let _server = serve_once(&path, "{\"type\":\"NotImplemented\"}\n").await;

        let client = HeadsetClient::new(path, "test/headset".to_string());
        let err = client.headset_status().await.unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }

    #[tokio::test]
    async fn missing_daemon_reports_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock").to_str().unwrap().to_string();
        let client = HeadsetClient::new(path.clone(), "test/headset".to_string());
        let err = client.invoke(GET_HEADSET_STATUS).await.unwrap_err();
        assert!(err.to_string().contains(&path));
    }
}
