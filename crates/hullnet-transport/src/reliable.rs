//! Reliable channels on top of unreliable datagrams.
//!
//! Each link has two reliable channels, one per reliable
//! [`DeliveryMethod`], with independent 16-bit sequence numbers. The
//! sender keeps every frame until it is acknowledged and re-sends it on a
//! fixed interval. The receiver acknowledges every frame it accepts,
//! drops duplicates, and on the ordered channel holds frames back until
//! the gap before them is filled.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::DeliveryMethod;

/// Most unacknowledged frames per channel. Also how far ahead of the next
/// expected sequence a receiver will buffer.
pub(crate) const WINDOW: u16 = 1024;

/// `a` is newer than `b`, allowing for wraparound.
pub(crate) fn sequence_greater_than(a: u16, b: u16) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000
}

#[derive(Debug)]
struct Unacked {
    sequence: u16,
    payload: Bytes,
    last_sent: Instant,
}

/// Outgoing half of one reliable channel.
#[derive(Debug, Default)]
pub(crate) struct SendChannel {
    next_sequence: u16,
    unacked: Vec<Unacked>,
}

impl SendChannel {
    pub(crate) fn is_full(&self) -> bool {
        self.unacked.len() >= usize::from(WINDOW)
    }

    /// Assigns the next sequence number and keeps a copy for re-sending.
    pub(crate) fn push(&mut self, payload: Bytes, now: Instant) -> u16 {
        let sequence = self.next_sequence;
        self.next_sequence = sequence.wrapping_add(1);
        self.unacked.push(Unacked {
            sequence,
            payload,
            last_sent: now,
        });
        sequence
    }

    pub(crate) fn ack(&mut self, sequence: u16) {
        self.unacked.retain(|frame| frame.sequence != sequence);
    }

    /// Frames that have waited `interval` without an ack, marked as sent
    /// again at `now`.
    pub(crate) fn due(&mut self, now: Instant, interval: Duration) -> Vec<(u16, Bytes)> {
        self.unacked
            .iter_mut()
            .filter(|frame| now.saturating_duration_since(frame.last_sent) >= interval)
            .map(|frame| {
                frame.last_sent = now;
                (frame.sequence, frame.payload.clone())
            })
            .collect()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.unacked.len()
    }
}

/// What the receiver does with one reliable frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Received {
    /// Too far ahead to buffer. Not acknowledged, so the sender retries.
    OutOfWindow,
    /// Acknowledge it and hand these frames up, in order.
    Accepted(Vec<(u16, Bytes)>),
}

/// Incoming half of one reliable channel.
#[derive(Debug)]
pub(crate) struct ReceiveChannel {
    ordered: bool,
    /// Lowest sequence not yet received.
    next: u16,
    /// Sequences received past `next`. The ordered channel holds their
    /// payloads back; the unordered one only remembers them.
    ahead: HashMap<u16, Option<Bytes>>,
}

impl ReceiveChannel {
    pub(crate) fn new(ordered: bool) -> Self {
        Self {
            ordered,
            next: 0,
            ahead: HashMap::new(),
        }
    }

    pub(crate) fn receive(&mut self, sequence: u16, payload: Bytes) -> Received {
        let duplicate =
            sequence_greater_than(self.next, sequence) || self.ahead.contains_key(&sequence);
        if duplicate {
            return Received::Accepted(Vec::new());
        }
        if sequence.wrapping_sub(self.next) >= WINDOW {
            return Received::OutOfWindow;
        }

        let mut delivered = Vec::new();
        if sequence == self.next {
            delivered.push((sequence, payload));
            self.next = self.next.wrapping_add(1);
            while let Some(held) = self.ahead.remove(&self.next) {
                delivered.extend(held.map(|payload| (self.next, payload)));
                self.next = self.next.wrapping_add(1);
            }
        } else if self.ordered {
            self.ahead.insert(sequence, Some(payload));
        } else {
            delivered.push((sequence, payload));
            self.ahead.insert(sequence, None);
        }
        Received::Accepted(delivered)
    }
}

/// Both reliable channels of one link, in both directions.
#[derive(Debug)]
pub(crate) struct Channels {
    reliable_out: SendChannel,
    ordered_out: SendChannel,
    reliable_in: ReceiveChannel,
    ordered_in: ReceiveChannel,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            reliable_out: SendChannel::default(),
            ordered_out: SendChannel::default(),
            reliable_in: ReceiveChannel::new(false),
            ordered_in: ReceiveChannel::new(true),
        }
    }
}

impl Channels {
    /// The outgoing channel for `method`; `None` for unreliable.
    pub(crate) fn outgoing(&mut self, method: DeliveryMethod) -> Option<&mut SendChannel> {
        match method {
            DeliveryMethod::Unreliable => None,
            DeliveryMethod::Reliable => Some(&mut self.reliable_out),
            DeliveryMethod::ReliableOrdered => Some(&mut self.ordered_out),
        }
    }

    /// The incoming channel for `method`; `None` for unreliable.
    pub(crate) fn incoming(&mut self, method: DeliveryMethod) -> Option<&mut ReceiveChannel> {
        match method {
            DeliveryMethod::Unreliable => None,
            DeliveryMethod::Reliable => Some(&mut self.reliable_in),
            DeliveryMethod::ReliableOrdered => Some(&mut self.ordered_in),
        }
    }

    /// Every frame due for a re-send, across both channels.
    pub(crate) fn due(
        &mut self,
        now: Instant,
        interval: Duration,
    ) -> Vec<(DeliveryMethod, u16, Bytes)> {
        let reliable = self
            .reliable_out
            .due(now, interval)
            .into_iter()
            .map(|(sequence, payload)| (DeliveryMethod::Reliable, sequence, payload));
        let ordered = self
            .ordered_out
            .due(now, interval)
            .into_iter()
            .map(|(sequence, payload)| (DeliveryMethod::ReliableOrdered, sequence, payload));
        reliable.chain(ordered).collect()
    }
}
