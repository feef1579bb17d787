use thiserror::Error;

/// Errors surfaced by the DLT link.
#[derive(Debug, Error)]
pub enum DltError {
    /// Connect/read/write failure at the transport boundary that may clear on retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport is gone (device unplugged, peer hung up). The worker stops on this.
    #[error("transport lost: {0}")]
    TransportLost(String),

    /// Backend name not known at construction time.
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Payload does not fit the single-byte length field.
    #[error("payload too large: {0} bytes (max 255)")]
    PayloadTooLarge(usize),

    /// The backend worker has stopped; nothing more can be written.
    #[error("link is disconnected")]
    Disconnected,

    /// Wrapper around IO errors that are not transport traffic (thread spawn, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DltError {
    /// Classify an IO error raised by a transport.
    ///
    /// Returns `None` for the "no data this cycle" kinds (timeouts, would-block,
    /// interrupted). Errors meaning the device is gone map to `TransportLost`,
    /// everything else to `Transport`.
    pub fn from_transport_io(context: &str, err: std::io::Error) -> Option<Self> {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => None,
            ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotFound => {
                Some(DltError::TransportLost(format!("{}: {}", context, err)))
            }
            _ if is_device_gone(&err) => {
                Some(DltError::TransportLost(format!("{}: {}", context, err)))
            }
            _ => Some(DltError::Transport(format!("{}: {}", context, err))),
        }
    }

    /// True when the worker must stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DltError::TransportLost(_) | DltError::Disconnected)
    }
}

/// Errno descriptions for EIO, ENXIO and ENODEV as `serialport` reports them;
/// it rebuilds the io::Error from the description and drops the raw code.
#[cfg(unix)]
const DEVICE_GONE_MESSAGES: [&str; 3] = [
    "I/O error",
    "No such device or address",
    "No such device",
];

#[cfg(unix)]
fn is_device_gone(err: &std::io::Error) -> bool {
    // EIO, ENXIO, ENODEV: what a tty reports after the USB device disappears
    match err.raw_os_error() {
        Some(code) => matches!(code, 5 | 6 | 19),
        None => {
            let text = err.to_string();
            DEVICE_GONE_MESSAGES.iter().any(|m| text == *m)
        }
    }
}

#[cfg(not(unix))]
fn is_device_gone(_err: &std::io::Error) -> bool {
    false
}

/// Result type alias using DltError.
pub type Result<T> = std::result::Result<T, DltError>;
