//! Observability and Metrics
//!
//! Link counters shared by every connection of a node.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for link operations
#[derive(Debug)]
pub struct Metrics {
    /// Links that completed the handshake
    pub links_total: AtomicU64,
    /// Links currently connected
    pub links_active: AtomicU64,
    /// Handshakes sent
    pub handshakes_sent: AtomicU64,
    /// Valid handshakes received
    pub handshakes_received: AtomicU64,
    /// Total frames sent
    pub frames_sent: AtomicU64,
    /// Frames sent as a back-reference instead of a full name
    pub frames_referenced: AtomicU64,
    /// Total frames received
    pub frames_received: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Inbound references that matched no known handler
    pub unresolved_references: AtomicU64,
    /// Frames lost to assembly or transport failures
    pub send_failures: AtomicU64,
    /// Failed connect attempts
    pub connect_failures: AtomicU64,
    /// Malformed frames or handshakes
    pub decode_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            links_total: AtomicU64::new(0),
            links_active: AtomicU64::new(0),
            handshakes_sent: AtomicU64::new(0),
            handshakes_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_referenced: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            unresolved_references: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a link reaching the connected state
    pub fn link_established(&self) {
        self.links_total.fetch_add(1, Ordering::Relaxed);
        self.links_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connected link going away
    pub fn link_closed(&self) {
        self.links_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn handshake_sent(&self) {
        self.handshakes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_received(&self) {
        self.handshakes_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame handed to the transport
    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_referenced(&self) {
        self.frames_referenced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a complete frame pulled off the wire
    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn unresolved_reference(&self) {
        self.unresolved_references.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            links_total: self.links_total.load(Ordering::Relaxed),
            links_active: self.links_active.load(Ordering::Relaxed),
            handshakes_sent: self.handshakes_sent.load(Ordering::Relaxed),
            handshakes_received: self.handshakes_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_referenced: self.frames_referenced.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            unresolved_references: self.unresolved_references.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            links_total = snapshot.links_total,
            links_active = snapshot.links_active,
            handshakes_sent = snapshot.handshakes_sent,
            handshakes_received = snapshot.handshakes_received,
            frames_sent = snapshot.frames_sent,
            frames_referenced = snapshot.frames_referenced,
            frames_received = snapshot.frames_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            unresolved_references = snapshot.unresolved_references,
            send_failures = snapshot.send_failures,
            connect_failures = snapshot.connect_failures,
            decode_errors = snapshot.decode_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Link metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub links_total: u64,
    pub links_active: u64,
    pub handshakes_sent: u64,
    pub handshakes_received: u64,
    pub frames_sent: u64,
    pub frames_referenced: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub unresolved_references: u64,
    pub send_failures: u64,
    pub connect_failures: u64,
    pub decode_errors: u64,
    pub uptime_seconds: u64,
}
