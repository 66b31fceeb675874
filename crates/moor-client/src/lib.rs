//! Daemon client: implements the session [`Backend`] over per-container
//! Unix sockets.
//!
//! Control calls are one newline-delimited JSON request/response exchange
//! per connection; `Attach` upgrades its connection to a raw byte stream
//! after the confirming response (the hijack).

use moor_protocol::{ContainerState, Request, Response, WaitResult, socket_path};
use moor_session::{AttachRequest, Backend, BoxedConnection, Error, Result};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::UnixStream;

/// Client for one moor daemon.
#[derive(Debug, Clone, Default)]
pub struct Client {
    /// Override for the socket directory; defaults to the shared location.
    pub socket_dir: Option<std::path::PathBuf>,
}

impl Client {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn socket_for(&self, container_id: &str) -> std::path::PathBuf {
        match &self.socket_dir {
            Some(dir) => dir.join(format!("{container_id}.sock")),
            None => socket_path(container_id),
        }
    }

    /// One request/response exchange. Returns the connection alongside the
    /// response so `Attach` can keep using it.
    async fn exchange(
        &self,
        container_id: &str,
        request: &Request,
    ) -> Result<(Response, BufReader<UnixStream>)> {
        let path = self.socket_for(container_id);
        let stream = UnixStream::connect(&path).await.map_err(|e| {
            Error::Daemon(format!(
                "cannot connect to daemon at {}: {e}",
                path.display()
            ))
        })?;
        let mut stream = BufReader::new(stream);

        let mut request_bytes = serde_json::to_vec(request)
            .map_err(|e| Error::Daemon(format!("failed to encode request: {e}")))?;
        request_bytes.push(b'\n');
        stream.get_mut().write_all(&request_bytes).await?;

        let mut line = String::new();
        stream.read_line(&mut line).await?;
        let response: Response = serde_json::from_str(&line)
            .map_err(|e| Error::Daemon(format!("invalid response: {e}")))?;
        match response {
            Response::Error { message } => Err(Error::Daemon(message)),
            response => Ok((response, stream)),
        }
    }
}

#[async_trait::async_trait]
impl Backend for Client {
    async fn inspect(&self, container_id: &str) -> Result<ContainerState> {
        match self.exchange(container_id, &Request::Inspect).await? {
            (Response::State { state }, _) => Ok(state),
            _ => Err(Error::Daemon("unexpected response".to_string())),
        }
    }

    async fn attach(
        &self,
        container_id: &str,
        request: AttachRequest,
    ) -> Result<BoxedConnection> {
        let request = Request::Attach {
            stdin: request.stdin,
            stdout: request.stdout,
            stderr: request.stderr,
        };
        match self.exchange(container_id, &request).await? {
            // Keep the BufReader: bytes the daemon sent right after the
            // response may already sit in its buffer.
            (Response::Attached, stream) => Ok(Box::new(stream)),
            _ => Err(Error::Daemon("unexpected response".to_string())),
        }
    }

    fn wait(
        &self,
        container_id: &str,
    ) -> (
        tokio::sync::oneshot::Receiver<WaitResult>,
        tokio::sync::oneshot::Receiver<Error>,
    ) {
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        let (err_tx, err_rx) = tokio::sync::oneshot::channel();
        let client = self.clone();
        let container_id = container_id.to_string();
        tokio::spawn(async move {
            match client.exchange(&container_id, &Request::Wait).await {
                Ok((Response::Exit { result }, _)) => {
                    let _ = result_tx.send(result);
                }
                Ok(_) => {
                    let _ = err_tx.send(Error::Daemon("unexpected response".to_string()));
                }
                Err(e) => {
                    if err_tx.send(e).is_err() {
                        tracing::debug!("wait for {container_id} ended after the session");
                    }
                }
            }
        });
        (result_rx, err_rx)
    }

    async fn resize(&self, container_id: &str, height: u16, width: u16) -> Result<()> {
        match self
            .exchange(container_id, &Request::Resize { height, width })
            .await?
        {
            (Response::Ok, _) => Ok(()),
            _ => Err(Error::Daemon("unexpected response".to_string())),
        }
    }

    async fn signal(&self, container_id: &str, name: &str) -> Result<()> {
        let request = Request::Signal {
            name: name.to_string(),
        };
        match self.exchange(container_id, &request).await? {
            (Response::Ok, _) => Ok(()),
            _ => Err(Error::Daemon("unexpected response".to_string())),
        }
    }
}
