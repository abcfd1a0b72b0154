// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::config::NodeConfig;
use crate::core::codec::LinkCodec;
use crate::core::frame::InboundFrame;
use crate::core::message::OutgoingMessage;
use crate::error::ProtocolError;
use crate::protocol::connection::*;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake::Handshake;
use crate::transport::memory::MemoryTransport;
use crate::utils::metrics::Metrics;

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<(&'static str, Peer)>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<(&'static str, Peer)> {
        self.events.lock().unwrap().clone()
    }

    fn kinds(&self) -> Vec<&'static str> {
        self.events().into_iter().map(|(kind, _)| kind).collect()
    }
}

impl MembershipObserver for RecordingObserver {
    fn on_connected(&self, peer: &Peer) {
        self.events.lock().unwrap().push(("connected", peer.clone()));
    }

    fn on_disconnected(&self, peer: &Peer) {
        self.events.lock().unwrap().push(("disconnected", peer.clone()));
    }
}

struct Harness {
    observer: Arc<RecordingObserver>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    ctx: LinkContext,
}

fn harness(node: NodeConfig) -> Harness {
    let observer = Arc::new(RecordingObserver::default());
    let dispatcher = Arc::new(Dispatcher::new());
    let metrics = Arc::new(Metrics::new());
    let ctx = LinkContext::new(node, observer.clone(), dispatcher.clone())
        .with_metrics(metrics.clone());
    Harness {
        observer,
        dispatcher,
        metrics,
        ctx,
    }
}

fn local_node() -> NodeConfig {
    NodeConfig {
        host: "node-b".into(),
        ports: BTreeMap::from([("rtmp".to_string(), 1936)]),
        attributes: BTreeMap::from([("role".to_string(), "edge".to_string())]),
    }
}

fn peer_address() -> SocketAddr {
    "10.0.0.7:1936".parse().unwrap()
}

fn node_a_handshake() -> Handshake {
    Handshake {
        host: "node-a".into(),
        ports: BTreeMap::from([("rtmp".to_string(), 1935)]),
        attributes: BTreeMap::from([("version".to_string(), "3".to_string())]),
    }
}

/// Frames written by the connection, decoded the way the peer would
fn drain(remote: &mut LinkCodec, transport: &MemoryTransport) -> Vec<InboundFrame> {
    let mut stream = transport.take_stream();
    let mut frames = Vec::new();
    while let Some(frame) = remote.decode(&mut stream).unwrap() {
        frames.push(frame);
    }
    assert!(stream.is_empty(), "connection sent a partial frame");
    frames
}

fn deliver<T: crate::transport::Transport>(connection: &mut ServerConnection<T>, bytes: &[u8]) {
    let mut buf = BytesMut::from(bytes);
    connection.on_reception(&mut buf).unwrap();
    assert!(buf.is_empty());
}

#[test]
fn test_accepted_link_sends_handshake_first() {
    let h = harness(local_node());
    let transport = MemoryTransport::open();
    let connection = ServerConnection::accepted(peer_address(), transport.clone(), h.ctx.clone());

    assert_eq!(connection.state(), ConnectionState::Connecting);
    assert!(!connection.is_target());

    let mut remote = LinkCodec::default();
    let frames = drain(&mut remote, &transport);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_system());

    let handshake = Handshake::read_from(&mut frames[0].reader()).unwrap();
    assert_eq!(handshake.host, "node-b");
    assert_eq!(handshake.ports.get("rtmp"), Some(&1936));
    assert_eq!(handshake.attributes.get("role").map(String::as_str), Some("edge"));
    assert_eq!(h.metrics.snapshot().handshakes_sent, 1);
}

#[test]
fn test_peer_handshake_connects_and_notifies() {
    let h = harness(local_node());
    let transport = MemoryTransport::open();
    let mut connection = ServerConnection::accepted(peer_address(), transport, h.ctx.clone());

    let mut remote = LinkCodec::default();
    let frame = remote.assemble("", node_a_handshake().to_message()).unwrap();
    deliver(&mut connection, &frame);

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.is_connected());
    let peer = connection.peer();
    assert_eq!(peer.host(), "node-a");
    assert_eq!(peer.port("rtmp"), Some(1935));
    assert_eq!(peer.port("http"), None);
    assert_eq!(peer.attribute("version"), Some("3"));

    let events = h.observer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "connected");
    assert_eq!(events[0].1.host(), "node-a");

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.handshakes_received, 1);
    assert_eq!(snapshot.links_active, 1);
}

#[test]
fn test_repeated_handshake_updates_without_second_notification() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    let mut remote = LinkCodec::default();
    let first = remote.assemble("", node_a_handshake().to_message()).unwrap();
    let mut update = node_a_handshake();
    update.attributes.insert("load".into(), "12".into());
    let second = remote.assemble("", update.to_message()).unwrap();

    deliver(&mut connection, &first);
    deliver(&mut connection, &second);

    assert_eq!(h.observer.kinds(), vec!["connected"]);
    assert_eq!(connection.peer().attribute("load"), Some("12"));
    assert_eq!(connection.peer().attribute("version"), Some("3"));
}

#[test]
fn test_empty_host_falls_back_to_peer_ip() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    let mut remote = LinkCodec::default();
    let frame = remote.assemble("", Handshake::default().to_message()).unwrap();
    deliver(&mut connection, &frame);

    assert!(connection.is_connected());
    assert_eq!(connection.peer().host(), "10.0.0.7");
}

#[test]
fn test_handshake_split_at_every_byte() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    let mut remote = LinkCodec::default();
    let frame = remote.assemble("", node_a_handshake().to_message()).unwrap();

    let mut buf = BytesMut::new();
    for (i, byte) in frame.iter().enumerate() {
        buf.put_u8(*byte);
        let left = connection.on_reception(&mut buf).unwrap();
        if i + 1 < frame.len() {
            assert_eq!(left, i + 1, "partial input must stay buffered");
            assert_eq!(connection.state(), ConnectionState::Connecting);
        }
    }
    assert!(connection.is_connected());
    assert!(buf.is_empty());
}

#[test]
fn test_unresolved_reference_is_handled_as_handshake() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    let payload = node_a_handshake().to_message();
    let mut body = BytesMut::new();
    body.put_u8(0);
    body.put_u8(5); // nothing registered yet
    body.put_slice(payload.payload());
    let mut frame = BytesMut::new();
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);

    deliver(&mut connection, &frame);

    assert!(connection.is_connected());
    assert_eq!(connection.peer().host(), "node-a");
    assert_eq!(h.metrics.snapshot().unresolved_references, 1);
}

#[test]
fn test_malformed_handshake_is_ignored() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    // host claims 9 bytes, only 2 follow
    let frame: &[u8] = &[0, 0, 0, 5, 0, 0, 9, b'n', b'o'];
    deliver(&mut connection, frame);

    assert_eq!(connection.state(), ConnectionState::Connecting);
    assert!(h.observer.events().is_empty());
    assert_eq!(connection.peer().host(), "");
    assert_eq!(h.metrics.snapshot().decode_errors, 1);
}

#[test]
fn test_inconsistent_frame_is_reported() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    // tag claims 200 bytes in a 3-byte body
    let mut buf = BytesMut::from(&[0u8, 0, 0, 3, 200, b'a', b'b'][..]);
    let result = connection.on_reception(&mut buf);

    assert!(matches!(result, Err(ProtocolError::InvalidHeader(_))));
    assert!(connection.last_error().is_some());
    assert_eq!(connection.on_disconnection(), Disposition::Drop);
    assert!(connection.last_error().is_none());
}

#[test]
fn test_messages_reach_handler_and_replies_use_same_tag() {
    let h = harness(local_node());
    h.dispatcher
        .register("ping", |peer, payload| {
            let value = payload.read_u32()?;
            let mut reply = OutgoingMessage::new();
            reply.put_string8(peer.host());
            reply.put_u32(value + 1);
            Ok(Some(reply))
        })
        .unwrap();

    let transport = MemoryTransport::open();
    let mut connection = ServerConnection::accepted(peer_address(), transport.clone(), h.ctx.clone());
    let mut remote = LinkCodec::default();
    drain(&mut remote, &transport);

    let handshake = remote.assemble("", node_a_handshake().to_message()).unwrap();
    let mut ping = OutgoingMessage::new();
    ping.put_u32(41);
    let ping = remote.assemble("ping", ping).unwrap();
    let mut stream = BytesMut::new();
    stream.extend_from_slice(&handshake);
    stream.extend_from_slice(&ping);
    deliver(&mut connection, &stream);

    let replies = drain(&mut remote, &transport);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].tag, "ping");
    let mut reader = replies[0].reader();
    assert_eq!(reader.read_string8().unwrap(), "node-a");
    assert_eq!(reader.read_u32().unwrap(), 42);
}

#[test]
fn test_unknown_tag_does_not_break_the_link() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    let mut remote = LinkCodec::default();
    let frame = remote.assemble("nobody-home", OutgoingMessage::from_payload(b"x")).unwrap();
    deliver(&mut connection, &frame);

    assert_eq!(connection.state(), ConnectionState::Connecting);
    assert_eq!(connection.codec().receiving().lookup(1), Some("nobody-home"));
}

#[test]
fn test_repeated_sends_use_back_references() {
    let h = harness(local_node());
    let transport = MemoryTransport::open();
    let mut connection = ServerConnection::accepted(peer_address(), transport.clone(), h.ctx.clone());
    transport.take_sent();

    connection.send("publish", OutgoingMessage::from_payload(b"1"));
    connection.send("publish", OutgoingMessage::from_payload(b"2"));
    let sent = transport.take_sent();

    assert_eq!(&sent[0][4..12], &[7, b'p', b'u', b'b', b'l', b'i', b's', b'h']);
    assert_eq!(&sent[1][..], &[0, 0, 0, 3, 0, 1, b'2']);
    assert_eq!(h.metrics.snapshot().frames_referenced, 1);
}

#[test]
fn test_send_failure_is_swallowed() {
    let h = harness(local_node());
    let transport = MemoryTransport::open();
    let mut connection = ServerConnection::accepted(peer_address(), transport.clone(), h.ctx.clone());

    transport.fail_sends(true);
    connection.send("publish", OutgoingMessage::from_payload(b"lost"));

    assert_eq!(h.metrics.snapshot().send_failures, 1);
    assert_eq!(connection.state(), ConnectionState::Connecting);
}

#[tokio::test]
async fn test_local_attributes_go_into_the_next_handshake() {
    let h = harness(local_node());
    let transport = MemoryTransport::new();
    let mut connection = ServerConnection::target(peer_address(), transport.clone(), h.ctx.clone());
    connection.set_local_attribute("load", "7");
    assert_eq!(connection.local_attribute("role"), Some("edge"));

    connection.send_public_address();
    // not connected yet: nothing reaches the wire
    assert!(transport.sent().is_empty());
    assert_eq!(h.metrics.snapshot().send_failures, 1);

    connection.connect().await;

    let mut remote = LinkCodec::default();
    let frames = drain(&mut remote, &transport);
    assert_eq!(frames.len(), 1);
    let handshake = Handshake::read_from(&mut frames[0].reader()).unwrap();
    assert_eq!(handshake.attributes.get("load").map(String::as_str), Some("7"));
    assert_eq!(handshake.attributes.get("role").map(String::as_str), Some("edge"));
}

#[tokio::test]
async fn test_send_before_connect_leaves_dictionaries_in_step() {
    let h = harness(local_node());
    let transport = MemoryTransport::new();
    let mut connection = ServerConnection::target(peer_address(), transport.clone(), h.ctx.clone());

    connection.send("publish", OutgoingMessage::from_payload(b"lost"));
    assert!(transport.sent().is_empty());
    assert!(connection.codec().sending().is_empty());
    assert_eq!(h.metrics.snapshot().send_failures, 1);

    connection.connect().await;
    connection.send("publish", OutgoingMessage::from_payload(b"real"));

    // the peer starts the session with an empty dictionary
    let mut remote = LinkCodec::default();
    let frames = drain(&mut remote, &transport);
    assert_eq!(frames.len(), 2);
    assert!(frames[0].is_system());
    assert_eq!(frames[1].tag, "publish");
    assert_eq!(&frames[1].payload[..], b"real");
    assert_eq!(remote.unresolved_references(), 0);
}

#[tokio::test]
async fn test_send_after_disconnect_is_dropped() {
    let h = harness(local_node());
    let transport = MemoryTransport::new();
    let mut connection = ServerConnection::target(peer_address(), transport.clone(), h.ctx.clone());
    connection.connect().await;
    connection.on_disconnection();
    transport.take_sent();

    connection.send("publish", OutgoingMessage::from_payload(b"late"));

    assert!(transport.sent().is_empty());
    assert!(connection.codec().sending().is_empty());
    assert_eq!(h.metrics.snapshot().send_failures, 1);
}

#[tokio::test]
async fn test_target_connects_and_announces() {
    let h = harness(local_node());
    let transport = MemoryTransport::new();
    let mut connection = ServerConnection::target(peer_address(), transport.clone(), h.ctx.clone());
    assert_eq!(connection.state(), ConnectionState::Unconnected);
    assert!(transport.sent().is_empty());

    connection.connect().await;

    assert_eq!(connection.state(), ConnectionState::Connecting);
    assert_eq!(transport.connects(), vec![peer_address()]);
    let mut remote = LinkCodec::default();
    let frames = drain(&mut remote, &transport);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_system());
}

#[tokio::test]
async fn test_connect_is_idempotent_while_active() {
    let h = harness(local_node());
    let transport = MemoryTransport::new();
    let mut connection = ServerConnection::target(peer_address(), transport.clone(), h.ctx.clone());

    connection.connect().await;
    connection.connect().await;
    assert_eq!(transport.connects().len(), 1);
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_accepted_link_never_reconnects() {
    let h = harness(local_node());
    let transport = MemoryTransport::open();
    let mut connection = ServerConnection::accepted(peer_address(), transport.clone(), h.ctx.clone());
    connection.on_disconnection();

    connection.connect().await;
    assert!(transport.connects().is_empty());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_failed_connect_returns_to_unconnected() {
    let h = harness(local_node());
    let transport = MemoryTransport::new();
    transport.refuse_connect(true);
    let mut connection = ServerConnection::target(peer_address(), transport.clone(), h.ctx.clone());

    connection.connect().await;

    assert_eq!(connection.state(), ConnectionState::Unconnected);
    assert!(transport.sent().is_empty());
    assert!(h.observer.events().is_empty());
    assert_eq!(h.metrics.snapshot().connect_failures, 1);

    transport.refuse_connect(false);
    connection.connect().await;
    assert_eq!(connection.state(), ConnectionState::Connecting);
    assert_eq!(transport.connects().len(), 2);
}

#[tokio::test]
async fn test_target_disconnect_resets_session_and_reconnects_clean() {
    let h = harness(local_node());
    let transport = MemoryTransport::new();
    let mut connection = ServerConnection::target(peer_address(), transport.clone(), h.ctx.clone());
    connection.connect().await;

    let mut remote = LinkCodec::default();
    let handshake = remote.assemble("", node_a_handshake().to_message()).unwrap();
    let publish = remote.assemble("publish", OutgoingMessage::from_payload(b"in")).unwrap();
    let mut stream = BytesMut::new();
    stream.extend_from_slice(&handshake);
    stream.extend_from_slice(&publish);
    deliver(&mut connection, &stream);
    connection.send("publish", OutgoingMessage::from_payload(b"out"));
    assert!(connection.is_connected());
    assert_eq!(connection.codec().sending().len(), 1);
    assert_eq!(connection.codec().receiving().len(), 1);

    assert_eq!(connection.on_disconnection(), Disposition::Retain);

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(!transport.is_open());
    assert!(connection.codec().sending().is_empty());
    assert!(connection.codec().receiving().is_empty());
    assert_eq!(connection.peer().host(), "");
    assert!(connection.peer().ports().is_empty());
    // attributes survive until the next handshake overwrites them
    assert_eq!(connection.peer().attribute("version"), Some("3"));
    assert_eq!(h.observer.kinds(), vec!["connected", "disconnected"]);
    assert_eq!(h.metrics.snapshot().links_active, 0);

    transport.take_sent();
    connection.connect().await;
    connection.send("publish", OutgoingMessage::from_payload(b"again"));

    let mut fresh_remote = LinkCodec::default();
    let frames = drain(&mut fresh_remote, &transport);
    assert_eq!(frames.len(), 2);
    assert!(frames[0].is_system());
    assert_eq!(frames[1].tag, "publish");
    assert!(!frames[1].payload.is_empty());
}

#[test]
fn test_disconnect_before_handshake_is_silent() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    assert_eq!(connection.on_disconnection(), Disposition::Drop);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(h.observer.events().is_empty());
}

#[test]
fn test_partial_frame_discarded_on_disconnect() {
    let h = harness(local_node());
    let mut connection =
        ServerConnection::accepted(peer_address(), MemoryTransport::open(), h.ctx.clone());

    let mut buf = BytesMut::from(&[0u8, 0, 0, 10, 0][..]);
    assert_eq!(connection.on_reception(&mut buf).unwrap(), 5);
    assert_eq!(connection.codec().pending_len(), Some(10));

    connection.on_disconnection();
    assert_eq!(connection.codec().pending_len(), None);
}

#[test]
fn test_dropping_connection_closes_transport() {
    let h = harness(local_node());
    let transport = MemoryTransport::open();
    let connection = ServerConnection::accepted(peer_address(), transport.clone(), h.ctx.clone());
    assert!(transport.is_open());

    drop(connection);
    assert!(!transport.is_open());
}

#[test]
fn test_frame_size_limit_comes_from_context() {
    let h = harness(local_node());
    let ctx = h.ctx.clone().with_max_frame_size(16);
    let mut connection = ServerConnection::accepted(peer_address(), MemoryTransport::open(), ctx);

    let mut buf = BytesMut::new();
    buf.put_u32(17);
    buf.put_slice(&Bytes::from_static(&[0; 17]));
    assert!(matches!(
        connection.on_reception(&mut buf),
        Err(ProtocolError::OversizedFrame(17))
    ));
}
