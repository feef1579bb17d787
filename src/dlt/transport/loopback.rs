//! In-memory virtual serial link.
//!
//! [`LoopbackTransport::pair`] returns the transport half (handed to a backend
//! worker) and a [`LoopbackPeer`] that plays the device on the other end of the
//! wire. Bytes written by one side are read by the other, in order.
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::Transport;
use crate::error::{DltError, Result};

#[derive(Debug, Default)]
struct Wire {
    /// Peer -> transport.
    to_transport: VecDeque<u8>,
    /// Transport -> peer.
    to_peer: VecDeque<u8>,
    connected: bool,
    hung_up: bool,
    refuse_connect: bool,
    disconnects: usize,
}

#[derive(Debug, Default)]
struct Shared {
    wire: Mutex<Wire>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until `ready` holds or `timeout` passes; returns the guard either way.
    fn wait_for<'a, F>(&'a self, timeout: Duration, mut ready: F) -> MutexGuard<'a, Wire>
    where
        F: FnMut(&Wire) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        while !ready(&*guard) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            guard = match self.changed.wait_timeout(guard, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        guard
    }
}

/// Transport half of a loopback pair.
#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Shared>,
}

/// Device half of a loopback pair.
#[derive(Debug, Clone)]
pub struct LoopbackPeer {
    shared: Arc<Shared>,
}

impl LoopbackTransport {
    pub fn pair() -> (LoopbackTransport, LoopbackPeer) {
        let shared = Arc::new(Shared::default());
        (
            LoopbackTransport {
                shared: shared.clone(),
            },
            LoopbackPeer { shared },
        )
    }
}

impl Transport for LoopbackTransport {
    fn connect(&mut self) -> Result<()> {
        let mut wire = self.shared.lock();
        if wire.refuse_connect || wire.hung_up {
            return Err(DltError::Transport(
                "loopback peer refused connection".to_string(),
            ));
        }
        wire.connected = true;
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut wire = self
            .shared
            .wait_for(timeout, |w| !w.to_transport.is_empty() || w.hung_up);
        if !wire.to_transport.is_empty() {
            let n = max_bytes.min(wire.to_transport.len());
            return Ok(wire.to_transport.drain(..n).collect());
        }
        if wire.hung_up {
            wire.connected = false;
            return Err(DltError::TransportLost("loopback peer hung up".to_string()));
        }
        Ok(Vec::new())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut wire = self.shared.lock();
        if wire.hung_up || !wire.connected {
            return Err(DltError::TransportLost("loopback peer hung up".to_string()));
        }
        wire.to_peer.extend(bytes.iter().copied());
        drop(wire);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut wire = self.shared.lock();
        wire.connected = false;
        wire.disconnects += 1;
        drop(wire);
        self.shared.changed.notify_all();
    }

    fn is_connected(&self) -> bool {
        let wire = self.shared.lock();
        wire.connected && !wire.hung_up
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}

impl LoopbackPeer {
    /// Make the next `connect` on the transport half fail.
    pub fn refuse_connections(&self) {
        self.shared.lock().refuse_connect = true;
    }

    /// Send bytes toward the transport half.
    pub fn write(&self, bytes: &[u8]) {
        self.shared.lock().to_transport.extend(bytes.iter().copied());
        self.shared.changed.notify_all();
    }

    /// Read exactly `n` bytes written by the transport half, or whatever
    /// arrived before `timeout` passed.
    pub fn read_exact_timeout(&self, n: usize, timeout: Duration) -> Vec<u8> {
        let mut wire = self.shared.wait_for(timeout, |w| w.to_peer.len() >= n);
        let take = n.min(wire.to_peer.len());
        wire.to_peer.drain(..take).collect()
    }

    /// Everything written by the transport half so far.
    pub fn take_written(&self) -> Vec<u8> {
        self.shared.lock().to_peer.drain(..).collect()
    }

    /// Simulate the device disappearing.
    pub fn hang_up(&self) {
        self.shared.lock().hung_up = true;
        self.shared.changed.notify_all();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// How many times the transport half has been released.
    pub fn disconnect_count(&self) -> usize {
        self.shared.lock().disconnects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_flow_both_ways() {
        let (mut transport, peer) = LoopbackTransport::pair();
        transport.connect().unwrap();

        transport.write(&[1, 2, 3]).unwrap();
        assert_eq!(peer.read_exact_timeout(3, Duration::from_millis(50)), vec![1, 2, 3]);

        peer.write(&[9, 8, 7, 6]);
        let got = transport.read(2, Duration::from_millis(50)).unwrap();
        assert_eq!(got, vec![9, 8]);
        let got = transport.read(16, Duration::from_millis(50)).unwrap();
        assert_eq!(got, vec![7, 6]);
    }

    #[test]
    fn read_times_out_empty() {
        let (mut transport, _peer) = LoopbackTransport::pair();
        transport.connect().unwrap();
        let start = Instant::now();
        let got = transport.read(8, Duration::from_millis(20)).unwrap();
        assert!(got.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn hang_up_is_fatal_after_buffered_bytes() {
        let (mut transport, peer) = LoopbackTransport::pair();
        transport.connect().unwrap();
        peer.write(&[0x55]);
        peer.hang_up();
        assert_eq!(transport.read(8, Duration::from_millis(10)).unwrap(), vec![0x55]);
        let err = transport.read(8, Duration::from_millis(10)).unwrap_err();
        assert!(err.is_fatal());
        assert!(!transport.is_connected());
    }

    #[test]
    fn refused_connect() {
        let (mut transport, peer) = LoopbackTransport::pair();
        peer.refuse_connections();
        assert!(matches!(transport.connect(), Err(DltError::Transport(_))));
    }
}
