//! Channel bridge between connections and a membership manager.
//!
//! Connections report peers becoming ready or going away synchronously, from
//! inside their receive path. [`ChannelObserver`] turns those calls into
//! [`MembershipEvent`]s on an unbounded tokio channel so the manager can react
//! (for instance schedule a reconnect) on its own task.

use tokio::sync::mpsc;
use tracing::debug;

use super::connection::{MembershipObserver, Peer};

/// Peer readiness change
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    Connected(Peer),
    Disconnected(Peer),
}

impl MembershipEvent {
    pub fn peer(&self) -> &Peer {
        match self {
            MembershipEvent::Connected(peer) | MembershipEvent::Disconnected(peer) => peer,
        }
    }
}

/// Forwards membership notifications to a channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    events: mpsc::UnboundedSender<MembershipEvent>,
}

impl ChannelObserver {
    /// Observer plus the receiving end the manager listens on
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MembershipEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }

    fn publish(&self, event: MembershipEvent) {
        if self.events.send(event).is_err() {
            debug!("Membership listener gone, event dropped");
        }
    }
}

impl MembershipObserver for ChannelObserver {
    fn on_connected(&self, peer: &Peer) {
        self.publish(MembershipEvent::Connected(peer.clone()));
    }

    fn on_disconnected(&self, peer: &Peer) {
        self.publish(MembershipEvent::Disconnected(peer.clone()));
    }
}
