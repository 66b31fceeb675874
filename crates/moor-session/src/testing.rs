//! Test doubles shared by the module tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::Poll;

use tokio::io::DuplexStream;
use tokio::sync::{mpsc, oneshot};

use crate::{AttachRequest, Backend, BoxedConnection, ContainerState, Error, Result, WaitResult};

/// Recording in-memory backend. `attach` hands the test the peer end of an
/// in-memory duplex connection through [`connections`](Self::connections).
#[derive(Default)]
pub(crate) struct MockBackend {
    state: Mutex<ContainerState>,
    state_after_attach: Mutex<Option<ContainerState>>,
    attached: AtomicBool,
    conn_tx: Mutex<Option<mpsc::UnboundedSender<DuplexStream>>>,
    resizes: Mutex<Vec<(u16, u16)>>,
    fail_resizes: AtomicUsize,
    signals: Mutex<Vec<String>>,
    fail_signals: AtomicUsize,
    wait_result: Mutex<Option<WaitResult>>,
    wait_error: Mutex<Option<String>>,
}

impl MockBackend {
    pub fn with_state(state: ContainerState) -> Self {
        let backend = Self::default();
        *backend.state.lock().unwrap() = state;
        backend
    }

    pub fn running() -> Self {
        Self::with_state(ContainerState {
            running: true,
            open_stdin: true,
            ..Default::default()
        })
    }

    pub fn running_tty() -> Self {
        Self::with_state(ContainerState {
            running: true,
            open_stdin: true,
            tty: true,
            ..Default::default()
        })
    }

    /// State to report once `attach` has happened, for exercising the
    /// validate/attach race recheck.
    pub fn set_state_after_attach(&self, state: ContainerState) {
        *self.state_after_attach.lock().unwrap() = Some(state);
    }

    /// Receiver yielding the peer end of each attached connection.
    pub fn connections(&self) -> mpsc::UnboundedReceiver<DuplexStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.conn_tx.lock().unwrap() = Some(tx);
        rx
    }

    pub fn set_wait_result(&self, result: WaitResult) {
        *self.wait_result.lock().unwrap() = Some(result);
    }

    pub fn set_wait_error(&self, message: &str) {
        *self.wait_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_next_resizes(&self, n: usize) {
        self.fail_resizes.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_signals(&self, n: usize) {
        self.fail_signals.store(n, Ordering::SeqCst);
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn signals(&self) -> Vec<String> {
        self.signals.lock().unwrap().clone()
    }

    pub fn attach_happened(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn inspect(&self, _container_id: &str) -> Result<ContainerState> {
        if self.attached.load(Ordering::SeqCst)
            && let Some(state) = self.state_after_attach.lock().unwrap().clone()
        {
            return Ok(state);
        }
        Ok(self.state.lock().unwrap().clone())
    }

    async fn attach(
        &self,
        _container_id: &str,
        _request: AttachRequest,
    ) -> Result<BoxedConnection> {
        self.attached.store(true, Ordering::SeqCst);
        let (conn, peer) = tokio::io::duplex(4096);
        if let Some(tx) = self.conn_tx.lock().unwrap().as_ref() {
            let _ = tx.send(peer);
        }
        Ok(Box::new(conn))
    }

    fn wait(
        &self,
        _container_id: &str,
    ) -> (oneshot::Receiver<WaitResult>, oneshot::Receiver<Error>) {
        let (result_tx, result_rx) = oneshot::channel();
        let (err_tx, err_rx) = oneshot::channel();
        if let Some(result) = self.wait_result.lock().unwrap().clone() {
            let _ = result_tx.send(result);
        }
        if let Some(message) = self.wait_error.lock().unwrap().clone() {
            let _ = err_tx.send(Error::Daemon(message));
        }
        (result_rx, err_rx)
    }

    async fn resize(&self, _container_id: &str, height: u16, width: u16) -> Result<()> {
        self.resizes.lock().unwrap().push((height, width));
        if Self::take_failure(&self.fail_resizes) {
            return Err(Error::Daemon("no such exec".to_string()));
        }
        Ok(())
    }

    async fn signal(&self, _container_id: &str, name: &str) -> Result<()> {
        self.signals.lock().unwrap().push(name.to_string());
        if Self::take_failure(&self.fail_signals) {
            return Err(Error::Daemon("cannot kill".to_string()));
        }
        Ok(())
    }
}

/// AsyncWrite sink the test can inspect after the session consumed it.
#[derive(Clone, Default)]
pub(crate) struct RecordingWriter(std::sync::Arc<Mutex<Vec<u8>>>);

impl RecordingWriter {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl tokio::io::AsyncWrite for RecordingWriter {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
