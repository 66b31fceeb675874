//! Forwarding locally received signals to the container's process.
//!
//! Only runs for non-TTY sessions with proxying enabled: with a remote
//! pseudo-terminal attached, control characters travel as bytes and a second
//! delivery path would misbehave.

use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Backend, Result};

/// The asynchronous signals we catch and relay. SIGKILL and SIGSTOP cannot
/// be intercepted; SIGWINCH belongs to the resize monitor.
pub const FORWARDED_SIGNALS: &[&str] = &["HUP", "INT", "QUIT", "TERM", "USR1", "USR2"];

/// Scoped subscription to local process signals, relaying each one to the
/// remote process best-effort.
///
/// The proxy owns its own stop token rather than the session's cancellation
/// token: a forward already in flight finishes before the loop observes the
/// stop, so a delivered signal is never silently dropped by session
/// teardown. [`shutdown`](Self::shutdown) releases the OS registration
/// deterministically at session end.
pub struct SignalProxy {
    stop: CancellationToken,
    listener: Option<JoinHandle<()>>,
    forwarder: Option<JoinHandle<()>>,
}

impl SignalProxy {
    pub fn spawn<B: Backend + ?Sized + 'static>(
        backend: Arc<B>,
        container_id: &str,
    ) -> Result<Self> {
        let stop = CancellationToken::new();

        // Register everything up front so registration failures surface here
        // instead of inside the task.
        let mut hup = signal(SignalKind::hangup())?;
        let mut int = signal(SignalKind::interrupt())?;
        let mut quit = signal(SignalKind::quit())?;
        let mut term = signal(SignalKind::terminate())?;
        let mut usr1 = signal(SignalKind::user_defined1())?;
        let mut usr2 = signal(SignalKind::user_defined2())?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let listener_stop = stop.clone();
        let listener = tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    _ = listener_stop.cancelled() => break,
                    r = hup.recv() => { if r.is_none() { break } "HUP" }
                    r = int.recv() => { if r.is_none() { break } "INT" }
                    r = quit.recv() => { if r.is_none() { break } "QUIT" }
                    r = term.recv() => { if r.is_none() { break } "TERM" }
                    r = usr1.recv() => { if r.is_none() { break } "USR1" }
                    r = usr2.recv() => { if r.is_none() { break } "USR2" }
                };
                if tx.send(name).is_err() {
                    break;
                }
            }
            // tx drops here; the forwarder drains what was already queued.
        });

        let forwarder = tokio::spawn(forward_signals(rx, backend, container_id.to_string()));

        Ok(Self {
            stop,
            listener: Some(listener),
            forwarder: Some(forwarder),
        })
    }

    /// Unsubscribe and wait for any forward in flight to finish.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }
    }
}

impl Drop for SignalProxy {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// Relay loop: one delivery request per received signal. Delivery failures
/// are logged and never stop the subscription.
async fn forward_signals<B: Backend + ?Sized>(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<&'static str>,
    backend: Arc<B>,
    container_id: String,
) {
    while let Some(name) = rx.recv().await {
        if let Err(e) = backend.signal(&container_id, name).await {
            tracing::debug!("failed to forward signal {name} to {container_id}: {e}");
        }
    }
}
