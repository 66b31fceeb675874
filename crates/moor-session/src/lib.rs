//! Session core for attaching local terminal streams to a running container.
//!
//! The caller hands over local byte streams, an already-authenticated
//! [`Backend`], and a cancellation token; [`run_attach`] owns everything from
//! pre-flight validation through stream teardown and final exit status.

pub mod detach;
pub mod hijack;
pub mod resize;
pub mod session;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;

pub use moor_protocol::{ContainerState, WaitResult};
pub use session::{AttachConfig, SessionOutcome, SessionStreams, run_attach};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("You cannot attach to a stopped container, start it first")]
    NotRunning,
    #[error("You cannot attach to a paused container, unpause it first")]
    Paused,
    #[error("You cannot attach to a restarting container, wait until it is running")]
    Restarting,
    #[error("the input device is not a TTY")]
    NotATty,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("daemon error: {0}")]
    Daemon(String),
    /// Process-level failure reported by the remote side.
    #[error("{0}")]
    Remote(String),
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The hijacked connection: a raw full-duplex byte stream obtained by
/// upgrading the attach request.
pub trait Connection: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {}

impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin> Connection for T {}

pub type BoxedConnection = Box<dyn Connection>;

/// Which streams to attach on the remote side.
#[derive(Debug, Clone, Copy)]
pub struct AttachRequest {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

/// Local-side contract for talking to the daemon. Establishing and
/// authenticating the underlying transport is the implementor's business;
/// the session core only cares about these five operations.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Current state of the container.
    async fn inspect(&self, container_id: &str) -> Result<ContainerState>;

    /// Attach the requested streams, upgrading to a raw byte stream.
    async fn attach(
        &self,
        container_id: &str,
        request: AttachRequest,
    ) -> Result<BoxedConnection>;

    /// Start waiting for the container's process to exit. Returns the result
    /// channel and an error channel for wait-establishment failures; at most
    /// one of them ever resolves. Must not block: the wait races the whole
    /// session, including setup.
    fn wait(
        &self,
        container_id: &str,
    ) -> (
        tokio::sync::oneshot::Receiver<WaitResult>,
        tokio::sync::oneshot::Receiver<Error>,
    );

    /// Resize the container's terminal.
    async fn resize(&self, container_id: &str, height: u16, width: u16) -> Result<()>;

    /// Deliver a signal to the container's process by name (e.g. "INT").
    async fn signal(&self, container_id: &str, name: &str) -> Result<()>;
}
