use anyhow::Result;
use serde::{Deserialize, Serialize};
use siteblock_storage::BlockedSite;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::{mpsc, oneshot},
};

/// IPC request from CLI to daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum IpcRequest {
    /// Block `website` for `duration` minutes
    BlockWebsite { website: String, duration: i64 },
    UnblockWebsite { website: String },
    GetBlockedWebsites,
    Status,
    /// Would a top-level navigation to `url` be blocked right now
    CheckUrl { url: String },
    Shutdown,
}

/// IPC response from daemon to CLI
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum IpcResponse {
    Success {
        success: bool,
    },
    Websites {
        websites: Vec<BlockedSite>,
    },
    Status {
        running: bool,
        blocked: usize,
        #[serde(rename = "nextExpiry")]
        next_expiry: Option<i64>,
    },
    Check {
        blocked: bool,
        #[serde(rename = "ruleId")]
        rule_id: Option<u32>,
    },
    ShuttingDown {
        #[serde(rename = "shuttingDown")]
        shutting_down: bool,
    },
}

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Daemon closed the connection without responding")]
    NoResponse,
    #[error("Unexpected response from daemon: {0:?}")]
    Unexpected(IpcResponse),
}

/// A decoded request waiting for the daemon loop to answer it
#[derive(Debug)]
pub struct IpcEnvelope {
    pub request: IpcRequest,
    pub reply: oneshot::Sender<IpcResponse>,
}

#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    /// Send one request and wait for its response
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable, the exchange fails, or
    /// the daemon closes the connection without answering
    pub async fn send_command(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.sock_path).await?;

        let encoded = serde_json::to_vec(request)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        if buffer.is_empty() {
            return Err(IpcError::NoResponse.into());
        }
        let response: IpcResponse = serde_json::from_slice(&buffer)?;

        Ok(response)
    }

    /// Block `website` for `duration` minutes
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the daemon does not confirm
    pub async fn block(&self, website: &str, duration: i64) -> Result<()> {
        let request = IpcRequest::BlockWebsite {
            website: website.to_string(),
            duration,
        };
        Self::expect_success(self.send_command(&request).await?)
    }

    /// Remove every block for `website`
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the daemon does not confirm
    pub async fn unblock(&self, website: &str) -> Result<()> {
        let request = IpcRequest::UnblockWebsite {
            website: website.to_string(),
        };
        Self::expect_success(self.send_command(&request).await?)
    }

    /// Fetch the current block list
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the reply is not a list
    pub async fn blocked_websites(&self) -> Result<Vec<BlockedSite>> {
        match self.send_command(&IpcRequest::GetBlockedWebsites).await? {
            IpcResponse::Websites { websites } => Ok(websites),
            other => Err(IpcError::Unexpected(other).into()),
        }
    }

    fn expect_success(response: IpcResponse) -> Result<()> {
        match response {
            IpcResponse::Success { success: true } => Ok(()),
            other => Err(IpcError::Unexpected(other).into()),
        }
    }
}

/// Accept connections on `sock_path` and hand each request to the daemon loop.
///
/// Requests are answered in the order the daemon processes them; a request
/// that fails to decode (including an unknown `action`) gets no response.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound
pub async fn listen(requests: mpsc::Sender<IpcEnvelope>, sock_path: &Path) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    let listener = UnixListener::bind(sock_path)?;

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let requests = requests.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, requests).await {
                        log::error!("IPC connection error: {e:#}");
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
}

async fn serve_connection(
    mut stream: UnixStream,
    requests: mpsc::Sender<IpcEnvelope>,
) -> Result<()> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    if buf.is_empty() {
        return Ok(()); // Connection closed
    }

    let request = match serde_json::from_slice::<IpcRequest>(&buf) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("Ignoring unrecognized IPC message: {e}");
            return Ok(());
        }
    };
    log::debug!("IPC request: {request:?}");

    let (reply, response) = oneshot::channel();
    requests
        .send(IpcEnvelope { request, reply })
        .await
        .map_err(|_| anyhow::anyhow!("Daemon loop is no longer accepting requests"))?;
    let response = response.await?;

    let encoded = serde_json::to_vec(&response)?;
    stream.write_all(&encoded).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = IpcRequest::BlockWebsite {
            website: "example.com".to_string(),
            duration: 30,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "action": "blockWebsite", "website": "example.com", "duration": 30 })
        );

        let request: IpcRequest =
            serde_json::from_value(json!({ "action": "getBlockedWebsites" })).unwrap();
        assert_eq!(request, IpcRequest::GetBlockedWebsites);

        let request: IpcRequest =
            serde_json::from_value(json!({ "action": "unblockWebsite", "website": "a.com" }))
                .unwrap();
        assert_eq!(
            request,
            IpcRequest::UnblockWebsite {
                website: "a.com".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_action_does_not_decode() {
        let result = serde_json::from_value::<IpcRequest>(json!({ "action": "updateBlockedList" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(
            serde_json::to_value(IpcResponse::Success { success: true }).unwrap(),
            json!({ "success": true })
        );

        let websites: IpcResponse = serde_json::from_value(
            json!({ "websites": [{ "site": "a.com", "finishTime": 5 }] }),
        )
        .unwrap();
        assert_eq!(
            websites,
            IpcResponse::Websites {
                websites: vec![BlockedSite::new("a.com", 5)]
            }
        );

        let status: IpcResponse =
            serde_json::from_value(json!({ "running": true, "blocked": 2, "nextExpiry": 9 }))
                .unwrap();
        assert!(matches!(status, IpcResponse::Status { blocked: 2, .. }));

        let check: IpcResponse =
            serde_json::from_value(json!({ "blocked": true, "ruleId": 1 })).unwrap();
        assert_eq!(
            check,
            IpcResponse::Check {
                blocked: true,
                rule_id: Some(1)
            }
        );
    }

    /// Answers every request with a fixed list, like a daemon with one block
    fn spawn_responder(mut rx: mpsc::Receiver<IpcEnvelope>) {
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let response = match envelope.request {
                    IpcRequest::GetBlockedWebsites => IpcResponse::Websites {
                        websites: vec![BlockedSite::new("a.com", 5)],
                    },
                    _ => IpcResponse::Success { success: true },
                };
                let _ = envelope.reply.send(response);
            }
        });
    }

    #[tokio::test]
    async fn test_client_roundtrip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("siteblock.sock");

        let (tx, rx) = mpsc::channel(8);
        spawn_responder(rx);
        let listen_path = sock_path.clone();
        tokio::spawn(async move { listen(tx, &listen_path).await });

        while !sock_path.exists() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let client = IpcClient::new(&sock_path);
        client.block("a.com", 30).await.unwrap();
        client.unblock("a.com").await.unwrap();
        assert_eq!(
            client.blocked_websites().await.unwrap(),
            vec![BlockedSite::new("a.com", 5)]
        );
    }

    #[tokio::test]
    async fn test_unknown_action_gets_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("siteblock.sock");

        let (tx, rx) = mpsc::channel(8);
        spawn_responder(rx);
        let listen_path = sock_path.clone();
        tokio::spawn(async move { listen(tx, &listen_path).await });

        while !sock_path.exists() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let mut stream = UnixStream::connect(&sock_path).await.unwrap();
        stream
            .write_all(br#"{"action":"updateBlockedList"}"#)
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await.unwrap();
        assert!(buffer.is_empty());
    }
}
