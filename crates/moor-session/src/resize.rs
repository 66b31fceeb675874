//! Keeping the remote terminal size in sync with the local one.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Backend, Result};

const RESIZE_RETRIES: usize = 5;
const RESIZE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Current size of the controlling terminal on local stdout, as
/// (height, width).
#[must_use]
pub fn local_terminal_size() -> (u16, u16) {
    let mut ws: nix::pty::Winsize = unsafe { std::mem::zeroed() };
    unsafe {
        nix::libc::ioctl(nix::libc::STDOUT_FILENO, nix::libc::TIOCGWINSZ, &mut ws);
    }
    (ws.ws_row, ws.ws_col)
}

/// Startup size correction. The remote terminal driver only redraws a
/// displaced prompt after observing an actual change, so a reattach at an
/// unchanged size would leave the prompt hidden; nudge the size off by one
/// first, then set the real one.
///
/// A failing real resize is retried in the background before giving up with
/// a warning; the session continues either way.
pub async fn init_tty_size<B: Backend + ?Sized + 'static>(
    backend: &Arc<B>,
    container_id: &str,
    size: (u16, u16),
) {
    let (height, width) = size;
    let _ = backend
        .resize(container_id, height + 1, width + 1)
        .await;

    if backend.resize(container_id, height, width).await.is_ok() {
        return;
    }

    let backend = backend.clone();
    let container_id = container_id.to_string();
    tokio::spawn(async move {
        for _ in 0..RESIZE_RETRIES {
            tokio::time::sleep(RESIZE_RETRY_DELAY).await;
            if backend.resize(&container_id, height, width).await.is_ok() {
                return;
            }
        }
        tracing::warn!("failed to resize tty, using default size");
    });
}

/// Watches SIGWINCH on the controlling terminal and pushes each new size to
/// the remote process, best-effort.
pub struct ResizeMonitor {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ResizeMonitor {
    pub fn spawn<B: Backend + ?Sized + 'static>(
        backend: Arc<B>,
        container_id: &str,
    ) -> Result<Self> {
        let stop = CancellationToken::new();
        let mut winch = signal(SignalKind::window_change())?;
        let container_id = container_id.to_string();
        let task_stop = stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_stop.cancelled() => break,
                    r = winch.recv() => {
                        if r.is_none() {
                            break;
                        }
                        let (height, width) = local_terminal_size();
                        if height == 0 && width == 0 {
                            continue;
                        }
                        if let Err(e) = backend.resize(&container_id, height, width).await {
                            tracing::debug!("failed to resize {container_id}: {e}");
                        }
                    }
                }
            }
        });
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop observing size changes.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ResizeMonitor {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
