//! Link bookkeeping shared by every transport implementation.
//!
//! The table is sans-IO: implementations feed it incoming datagrams and
//! take back the frames it wants sent plus the events to surface.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::reliable::{Channels, Received};
use crate::{
    DeliveryMethod, Endpoint, Frame, LinkStatus, TransportError, TransportEvent,
    MAX_FRAME_PAYLOAD,
};

/// Reason attached to links that go silent.
pub(crate) const TIMED_OUT_REASON: &[u8] = b"link timed out";
/// Reason sent to endpoints that send data without a link.
pub(crate) const NOT_CONNECTED_REASON: &[u8] = b"not connected";

#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkConfig {
    /// Links silent for longer than this are dropped.
    pub timeout: Duration,
    /// How often connected links are sent a keepalive.
    pub keepalive_interval: Duration,
    /// How long a reliable frame waits for its ack before going out again.
    pub resend_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(2),
            resend_interval: Duration::from_millis(200),
        }
    }
}

#[derive(Debug)]
struct Link {
    status: LinkStatus,
    last_heard: Instant,
    channels: Channels,
}

impl Link {
    fn new(now: Instant) -> Self {
        Self {
            status: LinkStatus::AwaitingApproval,
            last_heard: now,
            channels: Channels::default(),
        }
    }
}

pub(crate) struct LinkTable {
    links: HashMap<Endpoint, Link>,
    config: LinkConfig,
    last_keepalive: Instant,
    outbox: Vec<(Endpoint, Frame)>,
    events: Vec<TransportEvent>,
}

impl LinkTable {
    pub(crate) fn new(config: LinkConfig, now: Instant) -> Self {
        Self {
            links: HashMap::new(),
            config,
            last_keepalive: now,
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Processes one incoming datagram.
    pub(crate) fn receive(&mut self, from: Endpoint, datagram: Bytes, now: Instant) {
        let Some(frame) = Frame::decode(datagram) else {
            tracing::trace!(%from, "dropping unrecognized datagram");
            return;
        };

        match frame {
            Frame::Connect(hail) => match self.links.get_mut(&from) {
                None => {
                    self.links.insert(from, Link::new(now));
                    self.events.push(TransportEvent::ConnectionRequested {
                        endpoint: from,
                        hail,
                    });
                }
                Some(link) => {
                    link.last_heard = now;
                    // Our Accept was lost; the remote is still knocking.
                    if link.status == LinkStatus::Connected {
                        self.outbox.push((from, Frame::Accept));
                    }
                }
            },
            Frame::Data {
                method,
                sequence,
                payload,
            } => self.receive_data(from, method, sequence, payload, now),
            Frame::Ack { method, sequence } => {
                if let Some(link) = self.links.get_mut(&from) {
                    link.last_heard = now;
                    if let Some(channel) = link.channels.outgoing(method) {
                        channel.ack(sequence);
                    }
                }
            }
            Frame::Disconnect(reason) => {
                if self.links.remove(&from).is_some() {
                    self.events.push(TransportEvent::Disconnected {
                        endpoint: from,
                        reason,
                    });
                }
            }
            Frame::Keepalive => {
                if let Some(link) = self.links.get_mut(&from) {
                    link.last_heard = now;
                }
            }
            Frame::Accept | Frame::Deny(_) => {
                tracing::trace!(%from, "ignoring client-side frame");
            }
        }
    }

    fn receive_data(
        &mut self,
        from: Endpoint,
        method: DeliveryMethod,
        sequence: u16,
        payload: Bytes,
        now: Instant,
    ) {
        let link = match self.links.get_mut(&from) {
            Some(link) if link.status == LinkStatus::Connected => link,
            Some(_) => {
                tracing::trace!(%from, "data before approval, dropping");
                return;
            }
            None => {
                self.outbox.push((
                    from,
                    Frame::Disconnect(Bytes::from_static(NOT_CONNECTED_REASON)),
                ));
                return;
            }
        };
        link.last_heard = now;

        let delivered = match link.channels.incoming(method) {
            None => vec![(sequence, payload)],
            Some(channel) => match channel.receive(sequence, payload) {
                Received::Accepted(delivered) => {
                    self.outbox.push((from, Frame::Ack { method, sequence }));
                    delivered
                }
                Received::OutOfWindow => {
                    tracing::trace!(%from, %method, sequence, "frame beyond receive window");
                    return;
                }
            },
        };

        self.events
            .extend(delivered.into_iter().map(|(_, payload)| TransportEvent::Data {
                from,
                method,
                payload,
            }));
    }

    /// Expires silent links, re-sends unacknowledged frames and schedules
    /// keepalives.
    pub(crate) fn tick(&mut self, now: Instant) {
        let timeout = self.config.timeout;
        let expired: Vec<Endpoint> = self
            .links
            .iter()
            .filter(|(_, link)| now.saturating_duration_since(link.last_heard) > timeout)
            .map(|(endpoint, _)| *endpoint)
            .collect();

        for endpoint in expired {
            self.links.remove(&endpoint);
            tracing::debug!(%endpoint, "link timed out");
            self.events.push(TransportEvent::Disconnected {
                endpoint,
                reason: Bytes::from_static(TIMED_OUT_REASON),
            });
        }

        for (endpoint, link) in &mut self.links {
            for (method, sequence, payload) in link.channels.due(now, self.config.resend_interval)
            {
                tracing::trace!(%endpoint, %method, sequence, "resending unacked frame");
                self.outbox.push((
                    *endpoint,
                    Frame::Data {
                        method,
                        sequence,
                        payload,
                    },
                ));
            }
        }

        if now.saturating_duration_since(self.last_keepalive) >= self.config.keepalive_interval {
            self.last_keepalive = now;
            for (endpoint, link) in &self.links {
                if link.status == LinkStatus::Connected {
                    self.outbox.push((*endpoint, Frame::Keepalive));
                }
            }
        }
    }

    pub(crate) fn approve(&mut self, endpoint: Endpoint) {
        if let Some(link) = self.links.get_mut(&endpoint) {
            if link.status == LinkStatus::AwaitingApproval {
                link.status = LinkStatus::Connected;
                self.outbox.push((endpoint, Frame::Accept));
            }
        }
    }

    pub(crate) fn deny(&mut self, endpoint: Endpoint, reason: &[u8]) {
        if self.links.remove(&endpoint).is_some() {
            self.outbox
                .push((endpoint, Frame::Deny(Bytes::copy_from_slice(reason))));
        }
    }

    /// Builds the data frame for a connected endpoint. Reliable frames are
    /// kept until acknowledged and re-sent from [`tick`](Self::tick).
    pub(crate) fn send(
        &mut self,
        endpoint: Endpoint,
        data: &[u8],
        method: DeliveryMethod,
        now: Instant,
    ) -> Result<Frame, TransportError> {
        let link = match self.links.get_mut(&endpoint) {
            Some(link) if link.status == LinkStatus::Connected => link,
            _ => return Err(TransportError::NotConnected(endpoint)),
        };
        if data.len() > MAX_FRAME_PAYLOAD {
            return Err(TransportError::TooLarge {
                len: data.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        let payload = Bytes::copy_from_slice(data);
        let sequence = match link.channels.outgoing(method) {
            None => 0,
            Some(channel) if channel.is_full() => {
                return Err(TransportError::Congested(endpoint));
            }
            Some(channel) => channel.push(payload.clone(), now),
        };
        Ok(Frame::Data {
            method,
            sequence,
            payload,
        })
    }

    pub(crate) fn disconnect(&mut self, endpoint: Endpoint, reason: &[u8]) {
        if self.links.remove(&endpoint).is_some() {
            self.outbox
                .push((endpoint, Frame::Disconnect(Bytes::copy_from_slice(reason))));
        }
    }

    pub(crate) fn shutdown(&mut self, reason: &[u8]) {
        let reason = Bytes::copy_from_slice(reason);
        for (endpoint, _) in self.links.drain() {
            self.outbox.push((endpoint, Frame::Disconnect(reason.clone())));
        }
    }

    pub(crate) fn status(&self, endpoint: Endpoint) -> LinkStatus {
        self.links
            .get(&endpoint)
            .map_or(LinkStatus::Disconnected, |link| link.status)
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<(Endpoint, Frame)> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn take_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }
}
