//! # TCP Transport
//!
//! Tokio TCP for server links.
//!
//! Each open stream is split: the write half belongs to a writer task draining an
//! unbounded queue through a `FramedWrite<_, BytesCodec>`, so
//! [`Transport::send`] never waits; the read half is handed to [`drive`], which
//! feeds the connection and reports disconnection.
//!
//! ## Ownership
//! - Targets are owned by the caller (the membership manager), run with
//!   [`run_target`] and kept after disconnection for a later attempt.
//! - Accepted links are owned by the per-link task spawned in [`serve`] and
//!   dropped when [`ServerConnection::on_disconnection`] says so. Their
//!   [`LinkHandle`]s are published as [`AcceptedLink`]s.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::codec::{BytesCodec, FramedWrite};
use tracing::{debug, error, info, instrument, warn};

use super::Transport;
use crate::config::{NetworkConfig, DEFAULT_READ_BUFFER};
use crate::core::message::OutgoingMessage;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::connection::{Disposition, LinkContext, ServerConnection};

/// Transport over one tokio TCP stream
#[derive(Debug, Default)]
pub struct TcpTransport {
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    reader: Option<OwnedReadHalf>,
}

impl TcpTransport {
    /// Closed transport, for a target that still has to connect
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an accepted stream; must be called inside a tokio runtime
    pub fn from_stream(stream: TcpStream) -> Self {
        let mut transport = Self::new();
        transport.attach(stream);
        transport
    }

    fn attach(&mut self, stream: TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to disable Nagle's algorithm");
        }
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel::<Bytes>();

        tokio::spawn(async move {
            let mut sink = FramedWrite::new(write_half, BytesCodec::new());
            let mut frames = UnboundedReceiverStream::new(rx).map(Ok::<Bytes, std::io::Error>);
            if let Err(e) = sink.send_all(&mut frames).await {
                warn!(error = %e, "Server link write failed");
                return;
            }
            // queue closed: flush and shut the write half down
            if let Err(e) = SinkExt::<Bytes>::close(&mut sink).await {
                debug!(error = %e, "Server link shutdown failed");
            }
        });

        self.outbound = Some(tx);
        self.reader = Some(read_half);
    }

    /// Hand the read half to the driver; `None` once taken or when closed
    pub fn take_reader(&mut self) -> Option<OwnedReadHalf> {
        self.reader.take()
    }

    pub fn is_open(&self) -> bool {
        self.outbound.is_some()
    }
}

impl Transport for TcpTransport {
    async fn connect(&mut self, address: SocketAddr) -> Result<()> {
        self.close();
        let stream = TcpStream::connect(address).await?;
        self.attach(stream);
        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or_else(|| {
            ProtocolError::TransportError(constants::ERR_NOT_CONNECTED.into())
        })?;
        outbound
            .send(frame)
            .map_err(|_| ProtocolError::TransportError(constants::ERR_WRITER_GONE.into()))
    }

    fn close(&mut self) {
        self.outbound = None;
        self.reader = None;
    }
}

/// Requests from other tasks to a link being driven
#[derive(Debug)]
pub enum LinkCommand {
    Send {
        tag: String,
        message: OutgoingMessage,
    },
    Close,
}

/// Cloneable sender of [`LinkCommand`]s to one driven link
#[derive(Debug, Clone)]
pub struct LinkHandle {
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl LinkHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LinkCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    /// Queue a message for the link's task to frame and send
    pub fn send(&self, tag: impl Into<String>, message: OutgoingMessage) -> Result<()> {
        self.commands
            .send(LinkCommand::Send {
                tag: tag.into(),
                message,
            })
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Ask the link's task to end the session
    pub fn close(&self) -> Result<()> {
        self.commands
            .send(LinkCommand::Close)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

/// An inbound link accepted by [`serve`], as seen from outside its task
#[derive(Debug, Clone)]
pub struct AcceptedLink {
    pub address: SocketAddr,
    pub handle: LinkHandle,
}

/// Sizing for driven links
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    pub max_connections: usize,
    pub read_buffer_capacity: usize,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            max_connections: 256,
            read_buffer_capacity: DEFAULT_READ_BUFFER,
        }
    }
}

impl From<&NetworkConfig> for LinkOptions {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            max_connections: config.server.max_connections,
            read_buffer_capacity: config.transport.read_buffer_capacity,
        }
    }
}

/// Feed `connection` from `reader` until the stream ends
///
/// Commands from a [`LinkHandle`] are served in between reads. Read errors and
/// malformed input are recorded as the connection's last error. Always ends with
/// [`ServerConnection::on_disconnection`], whose verdict is returned.
#[instrument(skip_all, fields(peer = %connection.address()))]
pub async fn drive(
    connection: &mut ServerConnection<TcpTransport>,
    mut reader: OwnedReadHalf,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    read_buffer_capacity: usize,
) -> Disposition {
    let mut buf = BytesMut::with_capacity(read_buffer_capacity);
    let mut commands_open = true;

    loop {
        tokio::select! {
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    if !buf.is_empty() {
                        connection.set_error(format!(
                            "{}, {} bytes of an incomplete frame dropped",
                            constants::ERR_PEER_CLOSED,
                            buf.len()
                        ));
                    }
                    break;
                }
                Ok(_) => {
                    // the error is already recorded on the connection
                    if connection.on_reception(&mut buf).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    connection.set_error(e.to_string());
                    break;
                }
            },
            command = commands.recv(), if commands_open => match command {
                Some(LinkCommand::Send { tag, message }) => connection.send(&tag, message),
                Some(LinkCommand::Close) => {
                    debug!("Close requested");
                    break;
                }
                None => commands_open = false,
            },
        }
    }

    connection.on_disconnection()
}

/// Connect a target and drive it until it disconnects
///
/// Returns right away with [`Disposition::Retain`] when the connect attempt
/// fails; the connection is then `Unconnected` and can be retried.
pub async fn run_target(
    connection: &mut ServerConnection<TcpTransport>,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
    read_buffer_capacity: usize,
) -> Disposition {
    connection.connect().await;
    match connection.transport_mut().take_reader() {
        Some(reader) => drive(connection, reader, commands, read_buffer_capacity).await,
        None => Disposition::Retain,
    }
}

/// Accept server links until `shutdown_rx` fires
///
/// Every accepted socket becomes an inbound [`ServerConnection`] (which sends its
/// handshake immediately) owned by its own task; the task drops it once the link
/// disconnects. A handle to each link goes out on `accepted`, so the owner can
/// push messages to the peer or close the link. On shutdown the remaining link
/// tasks are aborted, which drops and closes their connections.
#[instrument(skip_all, fields(address = ?listener.local_addr().ok()))]
pub async fn serve(
    listener: TcpListener,
    ctx: LinkContext,
    options: LinkOptions,
    accepted: mpsc::UnboundedSender<AcceptedLink>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let mut links = JoinSet::new();
    info!("Accepting server links");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(links = links.len(), "Shutting down server link listener");
                links.shutdown().await;
                return Ok(());
            }

            incoming = listener.accept() => {
                match incoming {
                    Ok((stream, address)) => {
                        if links.len() >= options.max_connections {
                            warn!(peer = %address, max = options.max_connections, "Too many server links, refusing");
                            continue;
                        }
                        let ctx = ctx.clone();
                        let accepted = accepted.clone();
                        links.spawn(async move {
                            let mut transport = TcpTransport::from_stream(stream);
                            let Some(reader) = transport.take_reader() else {
                                return;
                            };
                            let mut connection = ServerConnection::accepted(address, transport, ctx);
                            let (handle, commands) = LinkHandle::channel();
                            if accepted.send(AcceptedLink { address, handle }).is_err() {
                                debug!(peer = %address, "No owner for accepted link handles");
                            }
                            let disposition =
                                drive(&mut connection, reader, commands, options.read_buffer_capacity).await;
                            debug!(peer = %address, ?disposition, "Server link task finished");
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }

            Some(finished) = links.join_next(), if !links.is_empty() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!(error = %e, "Server link task panicked");
                    }
                }
            }
        }
    }
}

/// Bind the configured address and serve until CTRL+C
#[instrument(skip_all, fields(address = %config.server.address))]
pub async fn start_server(
    config: &NetworkConfig,
    ctx: LinkContext,
    accepted: mpsc::UnboundedSender<AcceptedLink>,
) -> Result<()> {
    let listener = TcpListener::bind(&config.server.address).await?;
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    serve(listener, ctx, LinkOptions::from(config), accepted, shutdown_rx).await
}
