//! # Cluster Link
//!
//! Point-to-point links between the servers of a cluster.
//!
//! Every frame on the wire is a 32-bit big-endian body length followed by the
//! body: the name of the handler it is addressed to, then an opaque payload.
//! Handler names are interned per link, so a name crosses the wire in full once
//! and as a small back-reference afterwards. The first frame in each direction
//! is a handshake announcing the sender's host name, listening ports and
//! attributes.
//!
//! ## Layers
//! - [`core`]: binary primitives, frame layout and the stateful [`LinkCodec`]
//! - [`protocol`]: handler dictionaries, handshake, [`ServerConnection`] lifecycle
//!   and message dispatch
//! - [`transport`]: the [`Transport`](transport::Transport) seam with tokio TCP and
//!   in-memory implementations
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use cluster_link::config::NodeConfig;
//! use cluster_link::protocol::connection::{LinkContext, ServerConnection};
//! use cluster_link::protocol::dispatcher::Dispatcher;
//! use cluster_link::protocol::membership::ChannelObserver;
//! use cluster_link::transport::memory::MemoryTransport;
//!
//! let (observer, _events) = ChannelObserver::channel();
//! let ctx = LinkContext::new(NodeConfig::default(), Arc::new(observer), Arc::new(Dispatcher::new()));
//!
//! let transport = MemoryTransport::open();
//! let connection = ServerConnection::accepted("10.0.0.2:1936".parse().unwrap(), transport.clone(), ctx);
//! assert_eq!(transport.sent().len(), 1); // handshake
//! assert!(!connection.is_connected());
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::NetworkConfig;
pub use crate::core::binary::{PayloadReader, WireBufMut};
pub use crate::core::codec::LinkCodec;
pub use crate::core::frame::InboundFrame;
pub use crate::core::message::OutgoingMessage;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::connection::{
    ConnectionState, Disposition, LinkContext, MembershipObserver, MessageHandler, Peer,
    ServerConnection,
};
pub use crate::protocol::handshake::Handshake;
