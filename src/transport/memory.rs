//! In-process transport that records what the connection sends.
//!
//! Clones share the same state, so a test can keep one handle for inspection
//! while the connection owns another.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};

use super::Transport;
use crate::error::{constants, ProtocolError, Result};

#[derive(Debug, Default)]
struct State {
    open: bool,
    refuse_connect: bool,
    fail_sends: bool,
    connects: Vec<SocketAddr>,
    sent: Vec<Bytes>,
}

/// Capturing transport; frames sent while open are kept in order
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    /// A transport that still has to connect
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that is already open, as for an accepted socket
    pub fn open() -> Self {
        let transport = Self::default();
        transport.lock().open = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // state stays consistent even if a test panicked mid-assertion
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Make subsequent connect attempts fail
    pub fn refuse_connect(&self, refuse: bool) {
        self.lock().refuse_connect = refuse;
    }

    /// Make subsequent sends fail
    pub fn fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Addresses passed to connect, in call order
    pub fn connects(&self) -> Vec<SocketAddr> {
        self.lock().connects.clone()
    }

    /// Frames sent so far, without draining them
    pub fn sent(&self) -> Vec<Bytes> {
        self.lock().sent.clone()
    }

    /// Remove and return every frame sent so far
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Remove every sent frame as one contiguous byte stream
    pub fn take_stream(&self) -> BytesMut {
        let mut stream = BytesMut::new();
        for frame in self.take_sent() {
            stream.extend_from_slice(&frame);
        }
        stream
    }
}

impl Transport for MemoryTransport {
    async fn connect(&mut self, address: SocketAddr) -> Result<()> {
        let mut state = self.lock();
        state.connects.push(address);
        if state.refuse_connect {
            state.open = false;
            return Err(ProtocolError::TransportError(format!(
                "connection to {address} refused"
            )));
        }
        state.open = true;
        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        let mut state = self.lock();
        if !state.open {
            return Err(ProtocolError::TransportError(
                constants::ERR_NOT_CONNECTED.into(),
            ));
        }
        if state.fail_sends {
            return Err(ProtocolError::ConnectionClosed);
        }
        state.sent.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.lock().open = false;
    }
}
