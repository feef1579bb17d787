//! # dltlink - framed request/response link over serial transports
//!
//! dltlink implements DLT, a minimal point-to-point protocol that carries
//! request and response payloads of up to 255 bytes over a byte stream such as
//! a USB/UART serial line, together with a background worker that frames,
//! deframes and buffers traffic so the caller never blocks on raw IO.
//!
//! ## Wire Format
//!
//! ```text
//! byte 0        preamble 0x77
//! byte 1        message kind (0x01 request, 0x02 response)
//! byte 2        payload length L (0..=255)
//! bytes 3..3+L  payload
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dltlink::DltInterface;
//!
//! # fn main() -> Result<(), dltlink::DltError> {
//! let mut link = DltInterface::new("serial", "/dev/ttyACM0")?;
//! link.respond(b"resp")?;
//! if let Some((kind, payload)) = link.read() {
//!     println!("{:?} {:?}", kind, payload);
//! }
//! link.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`dlt`] - codec, backend worker, transports and the [`DltInterface`] facade
//! - [`config`] - TOML configuration
//! - [`error`] - error type shared by the link layers
//! - [`metrics`] - per-link traffic counters
//! - [`logutil`] - helpers for single-line log output
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  DltInterface   │ ← request / respond / read / close
//! └─────────────────┘
//!     │ outbound ▲ inbound   (channels)
//! ┌─────────────────┐
//! │ Backend worker  │ ← framing state machine, own thread
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Transport     │ ← serial port / loopback
//! └─────────────────┘
//! ```

pub mod config;
pub mod dlt;
pub mod error;
pub mod logutil;
pub mod metrics;

pub use dlt::{DltInterface, LinkState, MessageKind};
pub use error::DltError;
