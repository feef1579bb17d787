//! Per-link traffic counters.
//! Written by the backend worker, read from the foreground through a snapshot.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LinkStats {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    desync_bytes: AtomicU64,
    empty_frames_dropped: AtomicU64,
    unknown_kind_frames: AtomicU64,
    read_errors: AtomicU64,
    write_errors: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_frames_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_bytes_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }
    pub fn add_bytes_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }
    pub fn inc_desync_bytes(&self) {
        self.desync_bytes.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_empty_frames_dropped(&self) {
        self.empty_frames_dropped.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_unknown_kind_frames(&self) {
        self.unknown_kind_frames.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_read_errors(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_write_errors(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            desync_bytes: self.desync_bytes.load(Ordering::Relaxed),
            empty_frames_dropped: self.empty_frames_dropped.load(Ordering::Relaxed),
            unknown_kind_frames: self.unknown_kind_frames.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    /// Complete frames recognized, delivered or not.
    pub frames_received: u64,
    pub frames_sent: u64,
    /// Raw bytes read from the transport, garbage included.
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub desync_bytes: u64,
    pub empty_frames_dropped: u64,
    pub unknown_kind_frames: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}
