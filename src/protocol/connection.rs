//! Link lifecycle between two cluster nodes.
//!
//! # State Machine
//!
//! ```text
//!  target()                     accepted()
//!     │                              │ handshake sent
//!     ▼        connect()             ▼
//! ┌─────────────┐  ok   ┌────────────┐  peer handshake  ┌───────────┐
//! │ Unconnected │──────>│ Connecting │─────────────────>│ Connected │
//! └─────────────┘       └────────────┘                  └───────────┘
//!     ▲   ▲  connect() failed  │                              │
//!     │   └────────────────────┘                              │
//!     │ connect() (targets)  ┌──────────────┐  disconnection   │
//!     └──────────────────────│ Disconnected │<─────────────────┘
//!                            └──────────────┘   (from any state)
//! ```
//!
//! A [`ServerConnection`] does no I/O of its own. Whoever owns the socket feeds it
//! inbound bytes through [`ServerConnection::on_reception`] and reports the end
//! of the stream through [`ServerConnection::on_disconnection`], whose
//! [`Disposition`] tells the owner whether to keep the connection (targets, which
//! the membership manager reconnects later) or drop it (accepted peers).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, instrument, trace, warn};

use super::handshake::Handshake;
use crate::config::{NodeConfig, MAX_FRAME_SIZE};
use crate::core::binary::PayloadReader;
use crate::core::codec::LinkCodec;
use crate::core::frame::InboundFrame;
use crate::core::message::OutgoingMessage;
use crate::error::Result;
use crate::transport::Transport;
use crate::utils::metrics::Metrics;

/// Notified when a peer becomes protocol-ready and when it goes away
pub trait MembershipObserver: Send + Sync {
    fn on_connected(&self, peer: &Peer);
    fn on_disconnected(&self, peer: &Peer);
}

/// Consumes application frames (every frame with a non-empty tag)
pub trait MessageHandler: Send + Sync {
    /// Handle one message; a returned message is sent back under the same tag
    fn on_message(
        &self,
        peer: &Peer,
        tag: &str,
        payload: &mut PayloadReader,
    ) -> Result<Option<OutgoingMessage>>;
}

/// Shared collaborators handed to every connection of a node
#[derive(Clone)]
pub struct LinkContext {
    pub node: Arc<NodeConfig>,
    pub observer: Arc<dyn MembershipObserver>,
    pub handler: Arc<dyn MessageHandler>,
    pub metrics: Arc<Metrics>,
    pub max_frame_size: usize,
}

impl LinkContext {
    pub fn new(
        node: NodeConfig,
        observer: Arc<dyn MembershipObserver>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            node: Arc::new(node),
            observer,
            handler,
            metrics: Arc::new(Metrics::new()),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Target not attempted yet, or last attempt failed
    Unconnected,
    /// Transport open, waiting for the peer's handshake
    Connecting,
    /// Peer handshake received, membership notified
    Connected,
    /// Session over; targets may connect again
    Disconnected,
}

/// What the owner should do with a connection after it disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Outbound target: keep it for a later `connect()`
    Retain,
    /// Accepted peer: drop it
    Drop,
}

/// What is known about the node on the other end
#[derive(Debug, Clone)]
pub struct Peer {
    address: SocketAddr,
    is_target: bool,
    host: String,
    ports: BTreeMap<String, u16>,
    attributes: BTreeMap<String, String>,
}

impl Peer {
    fn new(address: SocketAddr, is_target: bool) -> Self {
        Self {
            address,
            is_target,
            host: String::new(),
            ports: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn is_target(&self) -> bool {
        self.is_target
    }

    /// Host name from the peer's handshake; empty until one arrives
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Listening port the peer advertised for `protocol`
    pub fn port(&self, protocol: &str) -> Option<u16> {
        self.ports.get(protocol).copied()
    }

    pub fn ports(&self) -> &BTreeMap<String, u16> {
        &self.ports
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    fn apply(&mut self, handshake: Handshake) {
        self.host = if handshake.host.is_empty() {
            self.address.ip().to_string()
        } else {
            handshake.host
        };
        self.ports.extend(handshake.ports);
        self.attributes.extend(handshake.attributes);
    }

    fn clear_advertised(&mut self) {
        self.host.clear();
        self.ports.clear();
    }
}

/// One link to another server of the cluster
pub struct ServerConnection<T: Transport> {
    peer: Peer,
    state: ConnectionState,
    last_error: Option<String>,
    local_attributes: BTreeMap<String, String>,
    codec: LinkCodec,
    transport: T,
    ctx: LinkContext,
}

impl<T: Transport> ServerConnection<T> {
    fn with_role(address: SocketAddr, is_target: bool, transport: T, ctx: LinkContext) -> Self {
        Self {
            peer: Peer::new(address, is_target),
            state: ConnectionState::Unconnected,
            last_error: None,
            local_attributes: ctx.node.attributes.clone(),
            codec: LinkCodec::new(ctx.max_frame_size),
            transport,
            ctx,
        }
    }

    /// Outbound link to a configured server; nothing happens until `connect()`
    pub fn target(address: SocketAddr, transport: T, ctx: LinkContext) -> Self {
        Self::with_role(address, true, transport, ctx)
    }

    /// Inbound link over an already open transport; sends our handshake at once
    pub fn accepted(address: SocketAddr, transport: T, ctx: LinkContext) -> Self {
        let mut connection = Self::with_role(address, false, transport, ctx);
        connection.state = ConnectionState::Connecting;
        connection.send_public_address();
        connection
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn address(&self) -> SocketAddr {
        self.peer.address
    }

    pub fn is_target(&self) -> bool {
        self.peer.is_target
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record why the link is failing; reported when it disconnects
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn codec(&self) -> &LinkCodec {
        &self.codec
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Metadata announced in our next handshake
    pub fn set_local_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.local_attributes.insert(key.into(), value.into());
    }

    pub fn local_attribute(&self, key: &str) -> Option<&str> {
        self.local_attributes.get(key).map(String::as_str)
    }

    pub fn local_attributes(&self) -> &BTreeMap<String, String> {
        &self.local_attributes
    }

    /// Open the transport of a target and announce ourselves
    ///
    /// Failures are logged and leave the connection `Unconnected`; retrying is up
    /// to the owner.
    #[instrument(skip_all, fields(peer = %self.peer.address))]
    pub async fn connect(&mut self) {
        if !self.peer.is_target {
            warn!("Accepted connections cannot be reconnected");
            return;
        }
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = ?self.state, "Connect ignored");
            return;
        }

        info!("Attempt to join server");
        self.state = ConnectionState::Connecting;
        match self.transport.connect(self.peer.address).await {
            Ok(()) => {
                // a new session starts from empty dictionaries on both ends
                self.codec.reset();
                self.send_public_address();
            }
            Err(e) => {
                error!(error = %e, "Failed to join server");
                self.ctx.metrics.connect_failed();
                self.state = ConnectionState::Unconnected;
            }
        }
    }

    /// Frame `message` under `tag` and hand it to the transport
    ///
    /// Never fails from the caller's point of view: errors are logged and the
    /// frame is lost, the transport's own disconnection being the signal. A link
    /// that is not open drops the frame before the tag is registered, so the
    /// dictionaries of the next session start out in step.
    #[instrument(level = "debug", skip_all, fields(peer = %self.peer.address, handler = tag))]
    pub fn send(&mut self, tag: &str, message: OutgoingMessage) {
        if matches!(
            self.state,
            ConnectionState::Unconnected | ConnectionState::Disconnected
        ) {
            warn!(state = ?self.state, "Link is not open, frame dropped");
            self.ctx.metrics.send_failed();
            return;
        }

        let referenced = self.codec.referenced_frames();
        let frame = match self.codec.assemble(tag, message) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to assemble frame");
                self.ctx.metrics.send_failed();
                return;
            }
        };
        if self.codec.referenced_frames() > referenced {
            self.ctx.metrics.frame_referenced();
        }

        let len = frame.len() as u64;
        trace!(bytes = len, "To server");
        match self.transport.send(frame) {
            Ok(()) => self.ctx.metrics.frame_sent(len),
            Err(e) => {
                warn!(error = %e, "Failed to send frame");
                self.ctx.metrics.send_failed();
            }
        }
    }

    /// Send our handshake: host, listening ports, local attributes
    pub fn send_public_address(&mut self) {
        let handshake = Handshake {
            host: self.ctx.node.host.clone(),
            ports: self.ctx.node.ports.clone(),
            attributes: self.local_attributes.clone(),
        };
        debug!(peer = %self.peer.address, "Sending public address");
        self.ctx.metrics.handshake_sent();
        self.send("", handshake.to_message());
    }

    /// Process every complete frame in `buf`
    ///
    /// Consumed frames are removed from the front of `buf`; the returned count is
    /// what is left over (a partial frame, possibly empty).
    ///
    /// # Errors
    /// Inconsistent input from the peer. The error is also recorded as the last
    /// error; the caller is expected to close the link.
    #[instrument(level = "debug", skip_all, fields(peer = %self.peer.address))]
    pub fn on_reception(&mut self, buf: &mut BytesMut) -> Result<usize> {
        loop {
            let before = buf.len();
            let unresolved = self.codec.unresolved_references();
            match self.codec.decode(buf) {
                Ok(Some(frame)) => {
                    self.ctx.metrics.frame_received((before - buf.len()) as u64);
                    if self.codec.unresolved_references() > unresolved {
                        self.ctx.metrics.unresolved_reference();
                    }
                    self.dispatch(frame);
                }
                Ok(None) => return Ok(buf.len()),
                Err(e) => {
                    error!(error = %e, "Malformed frame from server");
                    self.ctx.metrics.decode_error();
                    self.last_error = Some(e.to_string());
                    return Err(e);
                }
            }
        }
    }

    fn dispatch(&mut self, frame: InboundFrame) {
        trace!(handler = %frame.tag, bytes = frame.payload.len(), "From server");
        let mut reader = frame.reader();
        if frame.is_system() {
            self.on_handshake(&mut reader);
            return;
        }

        match self.ctx.handler.on_message(&self.peer, &frame.tag, &mut reader) {
            Ok(Some(reply)) => self.send(&frame.tag, reply),
            Ok(None) => {}
            Err(e) => warn!(handler = %frame.tag, error = %e, "Server message handling failed"),
        }
    }

    fn on_handshake(&mut self, reader: &mut PayloadReader) {
        let handshake = match Handshake::read_from(reader) {
            Ok(handshake) => handshake,
            Err(e) => {
                error!(error = %e, "Ignoring malformed system frame");
                self.ctx.metrics.decode_error();
                return;
            }
        };

        self.ctx.metrics.handshake_received();
        self.peer.apply(handshake);
        if self.state != ConnectionState::Connected {
            self.state = ConnectionState::Connected;
            self.ctx.metrics.link_established();
            self.ctx.observer.on_connected(&self.peer);
            info!(host = %self.peer.host, "Connection established with server");
        }
    }

    /// The transport is gone: end the session
    ///
    /// Clears both dictionaries and any partial frame. A connected peer is
    /// reported to the membership observer and loses its advertised host and
    /// ports. The last error is consumed by the log line.
    #[instrument(skip_all, fields(peer = %self.peer.address))]
    pub fn on_disconnection(&mut self) -> Disposition {
        self.codec.reset();
        if self.state == ConnectionState::Connected {
            self.ctx.metrics.link_closed();
            self.ctx.observer.on_disconnected(&self.peer);
            match &self.last_error {
                None => info!("Disconnection from server"),
                Some(e) => error!(error = %e, "Disconnection from server"),
            }
            self.peer.clear_advertised();
        }
        self.last_error = None;
        self.transport.close();
        self.state = ConnectionState::Disconnected;

        if self.peer.is_target {
            Disposition::Retain
        } else {
            Disposition::Drop
        }
    }
}

impl<T: Transport> Drop for ServerConnection<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}
