//! # DLT Link Module
//!
//! Request/response messaging over a framed point-to-point byte link.
//!
//! ## Features
//!
//! - **Framing**: preamble + kind + length framing with resynchronization after noise
//! - **Background IO**: a dedicated worker thread frames, deframes and buffers traffic
//! - **Non-blocking API**: `request`, `respond` and `read` never wait on the transport
//! - **Pluggable transports**: serial out of the box, in-memory loopback for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dltlink::dlt::DltInterface;
//!
//! # fn main() -> Result<(), dltlink::DltError> {
//! let mut link = DltInterface::new("serial", "/dev/ttyACM0")?;
//! link.request(b"ping")?;
//! loop {
//!     if let Some((kind, payload)) = link.read() {
//!         println!("{:?}: {:?}", kind, payload);
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! link.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! [link]
//! backend = "serial"
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//! read_timeout_ms = 250
//! deliver_empty_frames = false
//! ```

use bytes::Bytes;
use log::{error, info};
use tokio::sync::mpsc;

pub mod backend;
pub mod codec;
pub mod transport;

pub use backend::{BackendHandle, BackendTuning, InboundMessage, LinkState};
pub use codec::{encode, Decoded, Frame, FrameDecoder, MessageKind};
pub use transport::{BackendKind, LoopbackPeer, LoopbackTransport, SerialSettings, Transport};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::metrics::LinkStatsSnapshot;
use backend::Backend;

/// Public face of a DLT link.
///
/// Owns the inbound queue and a handle to the backend worker. Dropping the
/// interface closes it.
pub struct DltInterface {
    inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
    backend: BackendHandle,
}

impl DltInterface {
    /// Open a link on `address` using the backend called `backend_name`
    /// with default serial settings and worker tuning.
    pub fn new(backend_name: &str, address: &str) -> Result<Self> {
        Self::with_settings(
            backend_name,
            address,
            &SerialSettings::default(),
            BackendTuning::default(),
        )
    }

    pub fn with_settings(
        backend_name: &str,
        address: &str,
        settings: &SerialSettings,
        tuning: BackendTuning,
    ) -> Result<Self> {
        let kind: BackendKind = backend_name.parse()?;
        let transport = kind.build_transport(address, settings)?;
        Self::from_transport(transport, tuning)
    }

    pub fn from_config(config: &LinkConfig) -> Result<Self> {
        Self::with_settings(
            &config.backend,
            &config.port,
            &config.serial_settings(),
            config.tuning(),
        )
    }

    /// Start a link over an already built transport.
    pub fn from_transport(transport: Box<dyn Transport>, tuning: BackendTuning) -> Result<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();
        let backend = Backend::spawn(transport, tuning, inbound_tx).map_err(|e| {
            error!("Backend failed to connect: {}", e);
            e
        })?;
        Ok(Self {
            inbound_rx,
            backend,
        })
    }

    /// Queue `payload` as a request frame.
    pub fn request(&self, payload: &[u8]) -> Result<()> {
        self.send(payload, MessageKind::Request)
    }

    /// Queue `payload` as a response frame.
    pub fn respond(&self, payload: &[u8]) -> Result<()> {
        self.send(payload, MessageKind::Response)
    }

    /// Queue `payload` with an explicit kind. Fails before anything is queued
    /// if the payload is too large or the link has stopped.
    pub fn send(&self, payload: &[u8], kind: MessageKind) -> Result<()> {
        let packet = encode(payload, kind)?;
        self.backend.submit_write(packet)
    }

    /// Next received frame, or `None` right away if nothing is waiting.
    pub fn read(&mut self) -> Option<(MessageKind, Bytes)> {
        self.inbound_rx.try_recv().ok()
    }

    /// Stop the worker and wait until it has released the transport.
    /// Calling this again is a no-op.
    pub fn close(&mut self) {
        if !self.backend.is_running() {
            return;
        }
        info!("Closing DLT interface");
        self.backend.stop();
        self.backend.join();
    }

    pub fn state(&self) -> LinkState {
        self.backend.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.backend.stats().snapshot()
    }
}

impl Drop for DltInterface {
    fn drop(&mut self) {
        self.close();
    }
}
