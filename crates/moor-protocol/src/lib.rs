//! Shared protocol types for moor attach sessions.
//!
//! Two layers live here: the JSON control protocol spoken over the daemon
//! socket (inspect, wait, resize, signal, attach), and the binary frame
//! header used to multiplex stdout/stderr onto one connection for non-TTY
//! sessions.

/// Byte length of a multiplexed frame header: stream id, three zero bytes,
/// big-endian u32 payload length.
pub const FRAME_HEADER_LEN: usize = 8;

/// Which logical stream a multiplexed frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }

    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unknown stream id {0}")]
    UnknownStream(u8),
}

/// Encode a frame header for `len` payload bytes on `kind`.
#[must_use]
pub fn encode_frame_header(kind: StreamKind, len: u32) -> [u8; FRAME_HEADER_LEN] {
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0] = kind.id();
    header[4..8].copy_from_slice(&len.to_be_bytes());
    header
}

/// Decode a frame header into its stream kind and payload length.
pub fn decode_frame_header(
    header: &[u8; FRAME_HEADER_LEN],
) -> Result<(StreamKind, u32), FrameError> {
    let kind = StreamKind::from_id(header[0]).ok_or(FrameError::UnknownStream(header[0]))?;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Ok((kind, len))
}

/// Encode a full frame (header plus payload) for tests and daemon-side use.
#[must_use]
pub fn encode_frame(kind: StreamKind, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&encode_frame_header(kind, payload.len() as u32));
    frame.extend_from_slice(payload);
    frame
}

/// Runtime state of a container as reported by the daemon.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ContainerState {
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    /// Whether the container was started with a pseudo-terminal.
    pub tty: bool,
    /// Whether the container keeps stdin open for attach.
    pub open_stdin: bool,
}

/// Outcome of waiting for the container's process to finish.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WaitResult {
    pub status_code: i64,
    /// Process-level failure recorded by the daemon, if any.
    #[serde(default)]
    pub error: Option<String>,
}

/// Client requests to the daemon. One request per connection; `Attach`
/// upgrades the connection to a raw byte stream after the response.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Get the container's current state.
    Inspect,
    /// Block until the container's process exits.
    Wait,
    /// Resize the container's terminal.
    Resize { height: u16, width: u16 },
    /// Deliver a signal to the container's process.
    Signal { name: String },
    /// Attach the requested streams and upgrade to raw byte streaming.
    Attach {
        stdin: bool,
        stdout: bool,
        stderr: bool,
    },
}

/// Daemon responses.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Container state for `Inspect`.
    State { state: ContainerState },
    /// Process exit for `Wait`.
    Exit { result: WaitResult },
    /// Attach confirmed; raw bytes follow on this connection.
    Attached,
    /// Success.
    Ok,
    /// Error.
    Error { message: String },
}

/// Get the daemon socket directory.
#[must_use]
pub fn socket_dir() -> std::path::PathBuf {
    dirs::runtime_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".moor")))
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp/moor"))
}

/// Get the daemon socket path for a container.
#[must_use]
pub fn socket_path(container_id: &str) -> std::path::PathBuf {
    socket_dir().join(format!("{container_id}.sock"))
}
