//! Backend worker: the only code that touches transport IO.
//!
//! The worker runs on a dedicated thread and talks to the foreground only
//! through channels:
//!
//! - inbound: `(MessageKind, Bytes)` pairs for every complete frame, in arrival order
//! - outbound: pre-encoded frames, written one per loop iteration in submission order
//! - control: the stop signal
//!
//! Every transport read is bounded by [`BackendTuning::read_timeout`], so a stop
//! request is observed within one timeout interval plus one write.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc::{self, error::TryRecvError};

use super::codec::{Decoded, Frame, FrameDecoder, MessageKind};
use super::transport::Transport;
use crate::error::{DltError, Result};
use crate::logutil::hex_snippet;
use crate::metrics::LinkStats;

/// A frame delivered to the foreground.
pub type InboundMessage = (MessageKind, Bytes);

/// Worker timing and delivery knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTuning {
    /// Upper bound on a single transport read.
    pub read_timeout: Duration,
    /// Sleep between loop iterations.
    pub poll_interval: Duration,
    /// Max bytes requested per transport read.
    pub read_chunk: usize,
    /// Deliver frames with an empty payload instead of dropping them.
    pub deliver_empty_frames: bool,
}

impl Default for BackendTuning {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(250),
            poll_interval: Duration::from_millis(1),
            read_chunk: 64,
            deliver_empty_frames: false,
        }
    }
}

/// Control messages for the worker thread
#[derive(Debug)]
pub enum ControlMessage {
    Shutdown,
}

/// Backend lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Connecting = 0,
    Connected = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LinkState::Connecting,
            1 => LinkState::Connected,
            2 => LinkState::Stopping,
            _ => LinkState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new(state: LinkState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    StopRequested,
    TransportLost,
}

pub struct Backend {
    transport: Box<dyn Transport>,
    decoder: FrameDecoder,
    tuning: BackendTuning,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<Bytes>,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    state: SharedState,
    stats: Arc<LinkStats>,
    released: bool,
}

/// Foreground side of a running backend.
pub struct BackendHandle {
    outbound_tx: mpsc::UnboundedSender<Bytes>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    state: SharedState,
    stats: Arc<LinkStats>,
    thread: Option<JoinHandle<()>>,
}

impl Backend {
    /// Acquire the transport and start the worker thread.
    ///
    /// If the transport cannot be acquired no thread is started and the
    /// transport error is returned.
    pub fn spawn(
        mut transport: Box<dyn Transport>,
        tuning: BackendTuning,
        inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    ) -> Result<BackendHandle> {
        let state = SharedState::new(LinkState::Connecting);
        info!("Connecting DLT backend on {}", transport.describe());
        transport.connect()?;
        state.set(LinkState::Connected);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Bytes>();
        let (control_tx, control_rx) = mpsc::unbounded_channel::<ControlMessage>();
        let stats = Arc::new(LinkStats::new());

        let backend = Backend {
            transport,
            decoder: FrameDecoder::new(),
            tuning,
            inbound_tx,
            outbound_rx,
            control_rx,
            state: state.clone(),
            stats: stats.clone(),
            released: false,
        };
        // on spawn failure the closure is dropped and Backend::drop releases the transport
        let thread = thread::Builder::new()
            .name("dlt-backend".to_string())
            .spawn(move || backend.run())?;

        Ok(BackendHandle {
            outbound_tx,
            control_tx,
            state,
            stats,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        info!("DLT backend running on {}", self.transport.describe());

        let exit = loop {
            if self.stop_requested() {
                break Exit::StopRequested;
            }

            if let Err(e) = self.read_step() {
                if e.is_fatal() {
                    error!("DLT read failed, stopping backend: {}", e);
                    break Exit::TransportLost;
                }
                self.stats.inc_read_errors();
                warn!("DLT read error (continuing): {}", e);
            }

            if let Ok(packet) = self.outbound_rx.try_recv() {
                if let Err(e) = self.write_packet(&packet) {
                    if e.is_fatal() {
                        error!("DLT write failed, stopping backend: {}", e);
                        break Exit::TransportLost;
                    }
                }
            }

            if !self.transport.is_connected() {
                error!("DLT transport {} disconnected", self.transport.describe());
                break Exit::TransportLost;
            }

            thread::sleep(self.tuning.poll_interval);
        };

        // refuse new writes before the transport goes away; already queued ones stay readable
        self.outbound_rx.close();
        if exit == Exit::StopRequested {
            self.state.set(LinkState::Stopping);
            self.flush_pending();
        }
        self.release();
        self.state.set(LinkState::Stopped);
        info!("DLT backend stopped");
    }

    fn stop_requested(&mut self) -> bool {
        match self.control_rx.try_recv() {
            Ok(ControlMessage::Shutdown) => {
                debug!("DLT backend received shutdown signal");
                true
            }
            Err(TryRecvError::Disconnected) => {
                warn!("Control channel closed, stopping DLT backend");
                true
            }
            Err(TryRecvError::Empty) => false,
        }
    }

    /// One bounded read, then decode everything it returned. A partial frame
    /// stays in the decoder for the next call.
    fn read_step(&mut self) -> Result<()> {
        let chunk = self
            .transport
            .read(self.tuning.read_chunk, self.tuning.read_timeout)?;
        if chunk.is_empty() {
            return Ok(());
        }
        trace!("RAW {} bytes: {}", chunk.len(), hex_snippet(&chunk, 64));
        self.stats.add_bytes_received(chunk.len());

        let mut bytes = chunk.into_iter();
        loop {
            match self.decoder.decode_stream(&mut bytes) {
                Decoded::Frame(frame) => self.deliver(frame),
                Decoded::Desync(byte) => {
                    self.stats.inc_desync_bytes();
                    trace!("Discarding 0x{:02X} while hunting for preamble", byte);
                }
                Decoded::NeedMoreData => break,
            }
        }
        Ok(())
    }

    fn deliver(&mut self, frame: Frame) {
        self.stats.inc_frames_received();
        debug!("DLT frame received: {}", frame);
        if !frame.kind.is_known() {
            self.stats.inc_unknown_kind_frames();
            warn!(
                "DLT frame with unknown message kind 0x{:02X}",
                frame.kind.code()
            );
        }
        if frame.payload.is_empty() && !self.tuning.deliver_empty_frames {
            self.stats.inc_empty_frames_dropped();
            debug!("Dropping DLT frame with empty payload");
            return;
        }
        if self.inbound_tx.send(frame.into_parts()).is_err() {
            debug!("Inbound queue closed, frame discarded");
        }
    }

    fn write_packet(&mut self, packet: &Bytes) -> Result<()> {
        match self.transport.write(packet) {
            Ok(()) => {
                self.stats.inc_frames_sent();
                self.stats.add_bytes_sent(packet.len());
                debug!("Wrote {} bytes: {}", packet.len(), hex_snippet(packet, 16));
                Ok(())
            }
            Err(e) => {
                self.stats.inc_write_errors();
                warn!("DLT write of {} bytes failed: {}", packet.len(), e);
                Err(e)
            }
        }
    }

    /// Write out frames queued before the stop signal.
    fn flush_pending(&mut self) {
        let mut flushed = 0usize;
        while let Ok(packet) = self.outbound_rx.try_recv() {
            if self.write_packet(&packet).is_err() {
                break;
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!("Flushed {} queued frames before stopping", flushed);
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.transport.disconnect();
        debug!("Released transport {}", self.transport.describe());
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        // normal exits already released; this covers a panic inside the loop
        self.release();
        self.state.set(LinkState::Stopped);
    }
}

impl BackendHandle {
    /// Queue an encoded frame for writing. Never blocks.
    pub fn submit_write(&self, packet: Bytes) -> Result<()> {
        if self.state.get() == LinkState::Stopped {
            return Err(DltError::Disconnected);
        }
        self.outbound_tx
            .send(packet)
            .map_err(|_| DltError::Disconnected)
    }

    pub fn state(&self) -> LinkState {
        self.state.get()
    }

    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.stats
    }

    /// Ask the worker to stop. Does not wait.
    pub fn stop(&self) {
        let _ = self.control_tx.send(ControlMessage::Shutdown);
    }

    /// Wait for the worker thread to exit. No-op once joined.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("DLT backend thread panicked");
            }
        }
    }

    /// True until the worker thread has been joined.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}
