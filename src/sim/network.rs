//! Deterministic simulated network.
//!
//! Sent messages sit on a per-link queue until the scheduler delivers them.
//! Delivery picks a random non-empty link, so messages from different senders
//! interleave arbitrarily while each link stays FIFO. Every send is appended
//! to a log the checker replays afterwards.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;

use crate::admission::{CoordinatorError, Envelope, Message, Transport};
use crate::clock::PeerId;

/// One message as it was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentRecord {
    /// Position in the global send log.
    pub seq: usize,
    pub from: PeerId,
    pub to: PeerId,
    pub message: Message,
}

#[derive(Debug, Default)]
struct SimInner {
    /// In-flight messages per (from, to) link. Ordered map keeps delivery deterministic.
    links: BTreeMap<(PeerId, PeerId), VecDeque<Message>>,
    /// Delivered messages waiting to be polled, per recipient.
    inboxes: Vec<VecDeque<Envelope>>,
    /// Every send, in order.
    sent: Vec<SentRecord>,
}

/// Simulated network shared by all peers of one simulation.
#[derive(Clone)]
pub struct SimNetwork {
    peer_count: u32,
    inner: Arc<Mutex<SimInner>>,
}

impl SimNetwork {
    pub fn new(peer_count: u32) -> Self {
        let inner = SimInner {
            inboxes: (0..peer_count).map(|_| VecDeque::new()).collect(),
            ..Default::default()
        };
        SimNetwork {
            peer_count,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Endpoint for `peer_id`.
    pub fn endpoint(&self, peer_id: PeerId) -> SimEndpoint {
        SimEndpoint {
            peer_id,
            network: self.clone(),
        }
    }

    /// Messages sent but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.lock().links.values().map(VecDeque::len).sum()
    }

    /// Deliver the head of a randomly chosen non-empty link.
    ///
    /// Returns the link that was served, or `None` if nothing is in flight.
    pub fn deliver_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(PeerId, PeerId)> {
        let mut inner = self.lock();
        let ready: Vec<(PeerId, PeerId)> = inner
            .links
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(&link, _)| link)
            .collect();
        if ready.is_empty() {
            return None;
        }

        let (from, to) = ready[rng.gen_range(0..ready.len())];
        let message = inner.links.get_mut(&(from, to))?.pop_front()?;
        inner.inboxes[to as usize].push_back(Envelope { from, message });
        Some((from, to))
    }

    /// Deliver everything in flight, link by link.
    pub fn deliver_all(&self) -> usize {
        let mut inner = self.lock();
        let SimInner { links, inboxes, .. } = &mut *inner;
        let mut delivered = 0;
        for (&(from, to), queue) in links.iter_mut() {
            for message in queue.drain(..) {
                inboxes[to as usize].push_back(Envelope { from, message });
                delivered += 1;
            }
        }
        delivered
    }

    /// Length of the send log.
    pub fn sent_len(&self) -> usize {
        self.lock().sent.len()
    }

    /// Copy of the send log.
    pub fn sent_log(&self) -> Vec<SentRecord> {
        self.lock().sent.clone()
    }
}

/// One peer's view of a [`SimNetwork`].
pub struct SimEndpoint {
    peer_id: PeerId,
    network: SimNetwork,
}

impl Transport for SimEndpoint {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn peer_count(&self) -> u32 {
        self.network.peer_count
    }

    fn send(&self, to: PeerId, message: Message) -> Result<(), CoordinatorError> {
        if to >= self.network.peer_count || to == self.peer_id {
            return Err(CoordinatorError::PeerOutOfRange {
                peer: to,
                peers: self.network.peer_count,
            });
        }

        let mut inner = self.network.lock();
        let seq = inner.sent.len();
        inner.sent.push(SentRecord {
            seq,
            from: self.peer_id,
            to,
            message,
        });
        inner
            .links
            .entry((self.peer_id, to))
            .or_default()
            .push_back(message);
        Ok(())
    }

    fn try_recv(&self) -> Result<Option<Envelope>, CoordinatorError> {
        Ok(self.network.lock().inboxes[self.peer_id as usize].pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::LogicalTimestamp;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_nothing_visible_until_delivered() {
        let network = SimNetwork::new(2);
        let ep0 = network.endpoint(0);
        let ep1 = network.endpoint(1);

        ep0.send(1, Message::request(LogicalTimestamp::new(1), 0)).unwrap();
        assert_eq!(network.in_flight(), 1);
        assert!(ep1.try_recv().unwrap().is_none());

        assert_eq!(network.deliver_all(), 1);
        let envelope = ep1.try_recv().unwrap().unwrap();
        assert_eq!(envelope.from, 0);
        assert_eq!(network.sent_len(), 1);
    }

    #[test]
    fn test_random_delivery_keeps_link_order() {
        let network = SimNetwork::new(3);
        let ep0 = network.endpoint(0);
        let ep1 = network.endpoint(1);
        let ep2 = network.endpoint(2);

        for ts in 1..=10 {
            ep0.send(2, Message::approve(LogicalTimestamp::new(ts), 0)).unwrap();
            ep1.send(2, Message::approve(LogicalTimestamp::new(100 + ts), 0)).unwrap();
        }

        let mut rng = StdRng::seed_from_u64(7);
        while network.deliver_random(&mut rng).is_some() {}

        let mut last = [0u64; 2];
        while let Some(envelope) = ep2.try_recv().unwrap() {
            let ts = envelope.message.timestamp.as_u64();
            assert!(ts > last[envelope.from as usize]);
            last[envelope.from as usize] = ts;
        }
        assert_eq!(last, [10, 110]);
    }

    #[test]
    fn test_send_log_records_every_send() {
        let network = SimNetwork::new(3);
        let ep1 = network.endpoint(1);
        let sent = ep1.broadcast(Message::terminate(LogicalTimestamp::new(3))).unwrap();
        assert_eq!(sent, 2);

        let log = network.sent_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].seq, 0);
        assert_eq!((log[0].from, log[0].to), (1, 0));
        assert_eq!((log[1].from, log[1].to), (1, 2));
    }
}
