//! Serial port transport (USB CDC / UART) built on `serialport`.
use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, info, warn};
use serialport::{ClearBuffer, SerialPort};

use super::{SerialSettings, Transport};
use crate::error::{DltError, Result};

pub struct SerialTransport {
    port_name: String,
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
    current_timeout: Duration,
}

impl SerialTransport {
    pub fn new(port_name: &str, settings: SerialSettings) -> Self {
        let current_timeout = settings.timeout;
        Self {
            port_name: port_name.to_string(),
            settings,
            port: None,
            current_timeout,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> Result<()> {
        info!(
            "Opening serial port {} at {} baud",
            self.port_name, self.settings.baud_rate
        );
        let mut builder = serialport::new(&self.port_name, self.settings.baud_rate)
            .timeout(self.settings.timeout);
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let port = builder.open().map_err(|e| {
            DltError::Transport(format!(
                "failed to open serial port {}: {}",
                self.port_name, e
            ))
        })?;
        if self.settings.clear_input_on_connect {
            if let Err(e) = port.clear(ClearBuffer::Input) {
                warn!("Could not clear input buffer on {}: {}", self.port_name, e);
            }
        }
        self.current_timeout = self.settings.timeout;
        self.port = Some(port);
        debug!("Serial port {} initialized", self.port_name);
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| DltError::TransportLost(format!("{} is not open", self.port_name)))?;
        if timeout != self.current_timeout {
            port.set_timeout(timeout).map_err(|e| {
                DltError::Transport(format!("set timeout on {}: {}", self.port_name, e))
            })?;
            self.current_timeout = timeout;
        }
        let mut buf = vec![0u8; max_bytes.max(1)];
        match port.read(&mut buf) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => match DltError::from_transport_io(&self.port_name, e) {
                None => Ok(Vec::new()),
                Some(err) => Err(err),
            },
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| DltError::TransportLost(format!("{} is not open", self.port_name)))?;
        let context = &self.port_name;
        port.write_all(bytes)
            .and_then(|_| port.flush())
            .map_err(|e| {
                DltError::from_transport_io(context, e).unwrap_or_else(|| {
                    DltError::Transport(format!("{}: write timed out", context))
                })
            })
    }

    fn disconnect(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.port_name);
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!("serial:{}@{}", self.port_name, self.settings.baud_rate)
    }
}
