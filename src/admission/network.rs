//! Transport contract and an in-process channel mesh.
//!
//! The coordinator only needs two things from a transport: a send that
//! eventually delivers to a live peer, and a non-blocking poll. Per-sender
//! FIFO is required; nothing is assumed across senders.

use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::clock::PeerId;

use super::error::CoordinatorError;
use super::message::{Envelope, Message};

/// Point-to-point channel consumed by the coordinator.
pub trait Transport {
    /// This peer's id.
    fn peer_id(&self) -> PeerId;

    /// Cluster size `N`.
    fn peer_count(&self) -> u32;

    /// Send a message to one peer.
    fn send(&self, to: PeerId, message: Message) -> Result<(), CoordinatorError>;

    /// Take the next available message from any sender, if one is ready.
    fn try_recv(&self) -> Result<Option<Envelope>, CoordinatorError>;

    /// Send `message` to every peer except self.
    ///
    /// Returns the number of peers the message was sent to.
    fn broadcast(&self, message: Message) -> Result<usize, CoordinatorError> {
        let me = self.peer_id();
        let mut count = 0;
        for peer in (0..self.peer_count()).filter(|&p| p != me) {
            self.send(peer, message)?;
            count += 1;
        }
        Ok(count)
    }
}

/// A network endpoint for a single peer.
///
/// Messages travel as encoded frames, so every receive goes through
/// [`Message::decode`].
pub struct NetworkEndpoint {
    /// This peer's ID.
    peer_id: PeerId,
    /// Cluster size.
    peer_count: u32,
    /// Receiver for incoming frames.
    rx: Receiver<(PeerId, Vec<u8>)>,
    /// Senders to other peers (keyed by peer id).
    tx_map: HashMap<PeerId, Sender<(PeerId, Vec<u8>)>>,
}

impl NetworkEndpoint {
    /// Push a raw frame to `target` as if it came from this peer.
    ///
    /// Bypasses encoding; used to exercise the decoder with bad input.
    pub fn send_frame(&self, target: PeerId, frame: Vec<u8>) -> Result<(), CoordinatorError> {
        let tx = self.tx_map.get(&target).ok_or(CoordinatorError::PeerOutOfRange {
            peer: target,
            peers: self.peer_count,
        })?;
        tx.send((self.peer_id, frame))
            .map_err(|_| CoordinatorError::Disconnected { peer: target })
    }

    /// Number of frames waiting in this peer's inbox.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for NetworkEndpoint {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn peer_count(&self) -> u32 {
        self.peer_count
    }

    fn send(&self, to: PeerId, message: Message) -> Result<(), CoordinatorError> {
        self.send_frame(to, message.encode()?)
    }

    fn try_recv(&self) -> Result<Option<Envelope>, CoordinatorError> {
        match self.rx.try_recv() {
            Ok((from, frame)) => {
                if from >= self.peer_count || from == self.peer_id {
                    return Err(CoordinatorError::PeerOutOfRange {
                        peer: from,
                        peers: self.peer_count,
                    });
                }
                let message = Message::decode(from, &frame)?;
                Ok(Some(Envelope { from, message }))
            }
            Err(TryRecvError::Empty) => Ok(None),
            // Every other endpoint is gone; nothing more will ever arrive.
            Err(TryRecvError::Disconnected) => Ok(None),
        }
    }
}

/// Fully-connected in-process network for `N` peers.
///
/// One unbounded channel per peer; every peer holds a sender to every other
/// peer's inbox. Crossbeam channels are FIFO per sender.
pub struct MockNetwork {
    /// Number of peers in the network.
    peer_count: u32,
    /// Senders for each peer's inbox.
    senders: HashMap<PeerId, Sender<(PeerId, Vec<u8>)>>,
    /// Receivers for each peer's inbox (taken when the endpoint is created).
    receivers: HashMap<PeerId, Receiver<(PeerId, Vec<u8>)>>,
}

impl MockNetwork {
    /// Create a new mock network with the specified number of peers.
    pub fn new(peer_count: u32) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();

        for peer_id in 0..peer_count {
            let (tx, rx) = unbounded();
            senders.insert(peer_id, tx);
            receivers.insert(peer_id, rx);
        }

        MockNetwork {
            peer_count,
            senders,
            receivers,
        }
    }

    /// Cluster size.
    pub fn peer_count(&self) -> u32 {
        self.peer_count
    }

    /// Create the endpoint for a specific peer.
    ///
    /// This consumes the receiver for that peer, so it can only be called once per peer.
    pub fn create_endpoint(&mut self, peer_id: PeerId) -> Option<NetworkEndpoint> {
        let rx = self.receivers.remove(&peer_id)?;

        let tx_map = self
            .senders
            .iter()
            .filter(|(&id, _)| id != peer_id)
            .map(|(&id, tx)| (id, tx.clone()))
            .collect();

        Some(NetworkEndpoint {
            peer_id,
            peer_count: self.peer_count,
            rx,
            tx_map,
        })
    }

    /// Create every endpoint, in peer id order.
    pub fn into_endpoints(mut self) -> Vec<NetworkEndpoint> {
        (0..self.peer_count)
            .filter_map(|id| self.create_endpoint(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::message::MessageKind;
    use crate::clock::LogicalTimestamp;

    #[test]
    fn test_mock_network_basic() {
        let mut network = MockNetwork::new(3);

        let ep0 = network.create_endpoint(0).unwrap();
        let ep1 = network.create_endpoint(1).unwrap();
        let _ep2 = network.create_endpoint(2).unwrap();

        ep0.send(1, Message::request(LogicalTimestamp::new(4), 2)).unwrap();

        let envelope = ep1.try_recv().unwrap().unwrap();
        assert_eq!(envelope.from, 0);
        assert_eq!(envelope.message.kind, MessageKind::Request);
        assert_eq!(envelope.message.resource, 2);
        assert!(ep1.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_endpoint_created_once() {
        let mut network = MockNetwork::new(2);
        assert!(network.create_endpoint(1).is_some());
        assert!(network.create_endpoint(1).is_none());
    }

    #[test]
    fn test_broadcast_skips_self() {
        let endpoints = MockNetwork::new(4).into_endpoints();

        let sent = endpoints[2].broadcast(Message::terminate(LogicalTimestamp::new(1))).unwrap();
        assert_eq!(sent, 3);
        assert_eq!(endpoints[2].pending(), 0);
        for peer in [0, 1, 3] {
            assert_eq!(endpoints[peer].pending(), 1);
        }
    }

    #[test]
    fn test_per_sender_fifo() {
        let endpoints = MockNetwork::new(2).into_endpoints();

        for ts in 1..=5 {
            endpoints[0].send(1, Message::approve(LogicalTimestamp::new(ts), 0)).unwrap();
        }
        for ts in 1..=5 {
            let envelope = endpoints[1].try_recv().unwrap().unwrap();
            assert_eq!(envelope.message.timestamp, LogicalTimestamp::new(ts));
        }
    }

    #[test]
    fn test_send_to_self_rejected() {
        let endpoints = MockNetwork::new(2).into_endpoints();
        let result = endpoints[0].send(0, Message::terminate(LogicalTimestamp::ZERO));
        assert!(matches!(result, Err(CoordinatorError::PeerOutOfRange { peer: 0, peers: 2 })));
    }

    #[test]
    fn test_dropped_peer_is_disconnected() {
        let mut endpoints = MockNetwork::new(2).into_endpoints();
        let ep1 = endpoints.pop().unwrap();
        let ep0 = endpoints.pop().unwrap();
        drop(ep1);

        let result = ep0.send(1, Message::terminate(LogicalTimestamp::ZERO));
        assert!(matches!(result, Err(CoordinatorError::Disconnected { peer: 1 })));
    }
}
