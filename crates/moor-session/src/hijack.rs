//! Byte pumps between the local streams and the hijacked connection.
//!
//! One task per direction. remote→local either passes bytes through raw (TTY
//! sessions interleave stdout and stderr on one terminal) or demultiplexes
//! the framed stream onto the local output and error streams. local→remote
//! runs every byte through the detach scanner first when one is configured.

use std::os::fd::BorrowedFd;

use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::detach::DetachScanner;
use crate::{BoxedConnection, Error, Result};

const IO_BUFFER_SIZE: usize = 4096;

/// Why streaming stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The remote side closed the connection (usually: the process exited).
    Closed,
    /// The detach sequence was typed.
    Detached,
    /// The external cancellation signal fired.
    Cancelled,
}

/// How the local→remote pump finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputStatus {
    /// Local input hit end-of-stream; close-stdin was signalled to the
    /// remote side.
    Eof,
    Detached,
}

pub struct HijackStreamer {
    pub input: Option<Box<dyn AsyncRead + Send + Unpin>>,
    pub input_is_terminal: bool,
    pub output: Box<dyn AsyncWrite + Send + Unpin>,
    pub error: Box<dyn AsyncWrite + Send + Unpin>,
    pub conn: BoxedConnection,
    pub tty: bool,
    pub detach_keys: Vec<u8>,
}

impl HijackStreamer {
    /// Pump until the first of: remote close, detach, cancellation. Local
    /// input EOF alone does not end the session; the remote side may still
    /// be producing output.
    pub async fn stream(self, cancel: &CancellationToken) -> Result<StreamOutcome> {
        let _raw = if self.tty && self.input.is_some() && self.input_is_terminal {
            RawTerminalGuard::enter()
        } else {
            None
        };

        let (read_half, write_half) = tokio::io::split(self.conn);

        let tty = self.tty;
        let mut output = self.output;
        let mut error = self.error;
        let mut output_task: Option<JoinHandle<std::io::Result<()>>> =
            Some(tokio::spawn(async move {
                if tty {
                    pump_raw(read_half, &mut output).await
                } else {
                    demux(read_half, &mut output, &mut error).await
                }
            }));

        let scanner = if tty {
            DetachScanner::new(&self.detach_keys)
        } else {
            None
        };
        let mut input_task: Option<JoinHandle<std::io::Result<InputStatus>>> = self
            .input
            .map(|input| tokio::spawn(pump_input(input, write_half, scanner)));

        let outcome = loop {
            tokio::select! {
                res = async { output_task.as_mut().unwrap().await }, if output_task.is_some() => {
                    output_task = None;
                    break match res {
                        Ok(Ok(())) => Ok(StreamOutcome::Closed),
                        Ok(Err(e)) => Err(Error::Io(e)),
                        Err(e) => Err(Error::Task(e)),
                    };
                }
                res = async { input_task.as_mut().unwrap().await }, if input_task.is_some() => {
                    input_task = None;
                    match res {
                        Ok(Ok(InputStatus::Detached)) => break Ok(StreamOutcome::Detached),
                        // Local stdin closed (e.g. redirected EOF): keep
                        // streaming remote output.
                        Ok(Ok(InputStatus::Eof)) => {}
                        Ok(Err(e)) => break Err(Error::Io(e)),
                        Err(e) => break Err(Error::Task(e)),
                    }
                }
                _ = cancel.cancelled() => break Ok(StreamOutcome::Cancelled),
            }
        };

        // Unwind the remaining pump(s). Aborting drops the connection halves,
        // which closes the connection and bounds the teardown.
        if let Some(task) = output_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(task) = input_task.take() {
            task.abort();
            let _ = task.await;
        }

        outcome
    }
}

/// TTY pass-through: remote bytes go to the single local output unmodified.
async fn pump_raw<R>(
    mut src: R,
    dst: &mut (dyn AsyncWrite + Send + Unpin),
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = bytes::BytesMut::with_capacity(IO_BUFFER_SIZE);
    loop {
        buf.clear();
        let n = src.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        dst.write_all(&buf).await?;
        dst.flush().await?;
    }
}

/// Demultiplex the framed remote stream onto stdout and stderr, preserving
/// arrival order. EOF on a frame boundary is a normal close; EOF inside a
/// frame is an error.
async fn demux<'a, R>(
    mut src: R,
    out: &'a mut (dyn AsyncWrite + Send + Unpin),
    err: &'a mut (dyn AsyncWrite + Send + Unpin),
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; moor_protocol::FRAME_HEADER_LEN];
    loop {
        match src.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
        let (kind, len) = moor_protocol::decode_frame_header(&header)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut payload = vec![0u8; len as usize];
        src.read_exact(&mut payload).await?;

        // Stdin-tagged frames fold into stdout, matching the daemon's mux.
        let sink = match kind {
            moor_protocol::StreamKind::Stderr => &mut *err,
            _ => &mut *out,
        };
        sink.write_all(&payload).await?;
        sink.flush().await?;
    }
}

/// local→remote pump with detach scanning. Local EOF shuts down the write
/// half so the remote process sees end-of-input.
async fn pump_input<R, W>(
    mut src: R,
    mut dst: W,
    mut scanner: Option<DetachScanner>,
) -> std::io::Result<InputStatus>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = bytes::BytesMut::with_capacity(IO_BUFFER_SIZE);
    let mut forward = Vec::with_capacity(IO_BUFFER_SIZE);
    loop {
        buf.clear();
        let n = src.read_buf(&mut buf).await?;
        if n == 0 {
            dst.shutdown().await?;
            return Ok(InputStatus::Eof);
        }
        match scanner.as_mut() {
            Some(scanner) => {
                forward.clear();
                let detached = scanner.scan(&buf, &mut forward);
                if !forward.is_empty() {
                    dst.write_all(&forward).await?;
                    dst.flush().await?;
                }
                if detached {
                    return Ok(InputStatus::Detached);
                }
            }
            None => {
                dst.write_all(&buf).await?;
                dst.flush().await?;
            }
        }
    }
}

/// Puts the local stdin into raw mode for the lifetime of a TTY session,
/// restoring the saved termios on drop.
struct RawTerminalGuard {
    orig: nix::sys::termios::Termios,
}

impl RawTerminalGuard {
    fn enter() -> Option<Self> {
        let fd = unsafe { BorrowedFd::borrow_raw(nix::libc::STDIN_FILENO) };
        let orig = match nix::sys::termios::tcgetattr(fd) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("not a terminal or failed to query termios: {e}");
                return None;
            }
        };
        let mut raw = orig.clone();
        nix::sys::termios::cfmakeraw(&mut raw);
        if let Err(e) = nix::sys::termios::tcsetattr(fd, nix::sys::termios::SetArg::TCSANOW, &raw)
        {
            tracing::debug!("failed to set raw mode: {e}");
            return None;
        }
        Some(Self { orig })
    }
}

impl Drop for RawTerminalGuard {
    fn drop(&mut self) {
        let fd = unsafe { BorrowedFd::borrow_raw(nix::libc::STDIN_FILENO) };
        let _ =
            nix::sys::termios::tcsetattr(fd, nix::sys::termios::SetArg::TCSANOW, &self.orig);
    }
}
