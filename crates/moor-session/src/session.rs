//! Session coordinator: validate, attach, stream, drain, report.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::hijack::{HijackStreamer, StreamOutcome};
use crate::resize::{self, ResizeMonitor};
use crate::signal::SignalProxy;
use crate::{AttachRequest, Backend, ContainerState, Error, Result, WaitResult};

/// Session parameters assembled by the caller.
#[derive(Debug, Clone, Default)]
pub struct AttachConfig {
    /// Do not attach local stdin.
    pub no_stdin: bool,
    /// Forward locally received signals to the container (non-TTY only).
    pub proxy: bool,
    /// Detach key sequence; empty disables keystroke detach.
    pub detach_keys: Vec<u8>,
}

/// The local byte streams for one session, with the caller's knowledge of
/// whether they are interactive terminals.
pub struct SessionStreams {
    pub input: Option<Box<dyn AsyncRead + Send + Unpin>>,
    pub input_is_terminal: bool,
    pub output: Box<dyn AsyncWrite + Send + Unpin>,
    pub output_is_terminal: bool,
    pub error: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Terminal result of a session. Detach and cancellation are clean ends,
/// not errors; a remote-reported failure surfaces as [`Error::Remote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The remote process exited with this status code.
    Exited(i64),
    /// The user typed the detach sequence; the remote process keeps running.
    Detached,
    /// The external cancellation signal ended the session.
    Cancelled,
}

/// Attach the local streams to the container and run the session to
/// completion.
///
/// Proceeds through validation, attach (with a state recheck to close the
/// race where the container stops in between), streaming, and teardown; the
/// exit wait is started before any of that so a process that dies during
/// setup is still reported instead of hanging the session.
pub async fn run_attach<B: Backend + ?Sized + 'static>(
    backend: Arc<B>,
    container_id: &str,
    config: AttachConfig,
    streams: SessionStreams,
    cancel: CancellationToken,
) -> Result<SessionOutcome> {
    let (result_rx, err_rx) = backend.wait(container_id);

    let state = inspect_attachable(backend.as_ref(), container_id).await?;

    let attach_stdin = !config.no_stdin && state.open_stdin && streams.input.is_some();
    if !config.no_stdin && state.tty && streams.input.is_some() && !streams.input_is_terminal {
        return Err(Error::NotATty);
    }

    // Keystroke detach needs a resettable raw terminal to tell control bytes
    // from user intent; without a TTY it is not offered.
    let detach_keys = if state.tty {
        config.detach_keys
    } else {
        Vec::new()
    };

    let proxy = if config.proxy && !state.tty {
        Some(SignalProxy::spawn(backend.clone(), container_id)?)
    } else {
        None
    };

    let conn = backend
        .attach(
            container_id,
            AttachRequest {
                stdin: attach_stdin,
                stdout: true,
                stderr: true,
            },
        )
        .await?;

    // The daemon does not guard against the container reaching a terminal
    // state between the inspect above and the attach; recheck so we fail
    // fast instead of blocking on a dead connection.
    inspect_attachable(backend.as_ref(), container_id).await?;

    let monitor = if state.tty && streams.output_is_terminal {
        resize::init_tty_size(&backend, container_id, resize::local_terminal_size()).await;
        match ResizeMonitor::spawn(backend.clone(), container_id) {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                tracing::debug!("error monitoring tty size: {e}");
                None
            }
        }
    } else {
        None
    };

    let streamer = HijackStreamer {
        input: if attach_stdin { streams.input } else { None },
        input_is_terminal: streams.input_is_terminal,
        output: streams.output,
        error: streams.error,
        conn,
        tty: state.tty,
        detach_keys,
    };
    let outcome = streamer.stream(&cancel).await;

    if let Some(monitor) = monitor {
        monitor.shutdown().await;
    }
    if let Some(proxy) = proxy {
        proxy.shutdown().await;
    }

    match outcome? {
        StreamOutcome::Detached => Ok(SessionOutcome::Detached),
        StreamOutcome::Cancelled => Ok(SessionOutcome::Cancelled),
        StreamOutcome::Closed => reconcile_exit(result_rx, err_rx)
            .await
            .map(SessionOutcome::Exited),
    }
}

async fn inspect_attachable<B: Backend + ?Sized>(
    backend: &B,
    container_id: &str,
) -> Result<ContainerState> {
    let state = backend.inspect(container_id).await?;
    if !state.running {
        return Err(Error::NotRunning);
    }
    if state.paused {
        return Err(Error::Paused);
    }
    if state.restarting {
        return Err(Error::Restarting);
    }
    Ok(state)
}

/// Race the wait result against the wait-establishment error; whichever
/// resolves first decides the reported outcome. A recorded error message
/// wins over the status code; a dropped channel defers to the other side.
async fn reconcile_exit(
    mut result_rx: oneshot::Receiver<WaitResult>,
    mut err_rx: oneshot::Receiver<Error>,
) -> Result<i64> {
    tokio::select! {
        result = &mut result_rx => match result {
            Ok(wait) => wait_status(wait),
            Err(_) => match err_rx.await {
                Ok(e) => Err(e),
                Err(_) => Ok(0),
            },
        },
        err = &mut err_rx => match err {
            Ok(e) => Err(e),
            Err(_) => match result_rx.await {
                Ok(wait) => wait_status(wait),
                Err(_) => Ok(0),
            },
        },
    }
}

fn wait_status(wait: WaitResult) -> Result<i64> {
    if let Some(message) = wait.error {
        return Err(Error::Remote(message));
    }
    Ok(wait.status_code)
}
