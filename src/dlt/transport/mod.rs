//! Byte transports the backend worker can drive.
//!
//! A transport is a raw byte source/sink. It is owned by exactly one backend
//! worker after construction. Reads are bounded by a timeout and return an
//! empty buffer when nothing arrived, which the worker treats as "no data this
//! cycle".
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DltError, Result};

pub mod loopback;
#[cfg(feature = "serial")]
pub mod serial;

pub use loopback::{LoopbackPeer, LoopbackTransport};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// Capability interface consumed by the backend worker.
pub trait Transport: Send {
    /// Acquire the underlying device.
    fn connect(&mut self) -> Result<()>;

    /// Read up to `max_bytes`, waiting at most `timeout`. An empty result means
    /// the timeout expired with nothing received.
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>>;

    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Release the device. Called once by the worker on its way out.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Human readable address for logs.
    fn describe(&self) -> String;
}

/// Serial line parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Timeout the port is opened with.
    pub timeout: Duration,
    /// Discard whatever the device buffered before we connected.
    pub clear_input_on_connect: bool,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            timeout: Duration::from_millis(250),
            clear_input_on_connect: true,
        }
    }
}

/// Concrete transport bindings selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Serial,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Serial => "serial",
        }
    }

    /// Build an unconnected transport for `address`.
    pub fn build_transport(
        self,
        address: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn Transport>> {
        match self {
            #[cfg(feature = "serial")]
            BackendKind::Serial => Ok(Box::new(SerialTransport::new(address, settings.clone()))),
            #[cfg(not(feature = "serial"))]
            BackendKind::Serial => {
                let _ = (address, settings);
                Err(DltError::UnsupportedBackend(
                    "serial (support not compiled in)".to_string(),
                ))
            }
        }
    }
}

impl FromStr for BackendKind {
    type Err = DltError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "serial" => Ok(BackendKind::Serial),
            other => Err(DltError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_serial_is_selectable() {
        assert_eq!("serial".parse::<BackendKind>().unwrap(), BackendKind::Serial);
        let err = "ble".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, DltError::UnsupportedBackend(ref name) if name == "ble"));
        assert!("Serial".parse::<BackendKind>().is_err());
    }
}
