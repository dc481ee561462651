//! In-process fabric where each rank is a thread
//!
//! Ranks are connected by a fully connected set of crossbeam channels, one
//! channel per ordered pair of ranks, which gives per-pair FIFO ordering like
//! MPI does. Messages are packed into a payload on the sending side and
//! unpacked on the receiving side. A send completes once the receiver has
//! unpacked the message.
//!
//! This lets tests run a whole grid of ranks inside of a single test process.

mod launch;

pub use launch::{launch, World};

use crate::{check_distinct_peers, check_rank, Error, Fabric, Message, Rank, Status, Tag};
use crossbeam_channel::{Receiver, Select, Sender};
use data::{strided::StridedLayout, Precision};
use log::trace;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

/// Message in flight between two ranks
#[derive(Debug)]
struct Envelope {
    /// Tag that the receiver matches on
    tag: Tag,

    /// Elements of the message, in layout order
    payload: Vec<Precision>,

    /// Notifies the sender that the message was delivered
    ack: Sender<()>,
}

/// Number of messages that went through an endpoint
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Traffic {
    /// Messages sent by this rank
    pub sent: usize,

    /// Messages received by this rank
    pub received: usize,
}

/// Endpoint of one rank in the in-process fabric
#[derive(Debug)]
pub struct LocalFabric {
    /// Rank of this endpoint
    rank: Rank,

    /// Channels to every rank, indexed by destination
    outboxes: Box<[Sender<Envelope>]>,

    /// Channels from every rank, indexed by source
    inboxes: Box<[Receiver<Envelope>]>,

    /// Messages that arrived while a different tag was being waited for,
    /// indexed by source
    stash: RefCell<Box<[VecDeque<Envelope>]>>,

    /// Messages that went through this endpoint so far
    traffic: Cell<Traffic>,
}
//
impl LocalFabric {
    /// Messages that went through this endpoint so far
    pub fn traffic(&self) -> Traffic {
        self.traffic.get()
    }

    /// Hand over a message to the fabric, returns the acknowledgement channel
    fn post(
        &self,
        buffer: &[Precision],
        layout: &StridedLayout,
        dest: Rank,
        tag: Tag,
    ) -> Result<Receiver<()>, Error> {
        check_rank(dest, self.size())?;
        let payload = layout.read(buffer)?;
        trace!(
            "Rank {} sends {} elements to rank {dest} with tag {tag}",
            self.rank,
            payload.len()
        );
        let (ack, acked) = crossbeam_channel::bounded(1);
        self.outboxes[dest]
            .send(Envelope { tag, payload, ack })
            .map_err(|_| Error::Disconnected { peer: dest })?;
        self.count(|traffic| traffic.sent += 1);
        Ok(acked)
    }

    /// Take the oldest stashed message from `source` with a given tag
    fn take_stashed(&self, source: Rank, tag: Tag) -> Option<Envelope> {
        let mut stash = self.stash.borrow_mut();
        let queue = &mut stash[source];
        let position = queue.iter().position(|envelope| envelope.tag == tag)?;
        queue.remove(position)
    }

    /// Keep a message around for a later receive
    fn stash(&self, source: Rank, envelope: Envelope) {
        trace!(
            "Rank {} stashes a message from rank {source} with tag {}",
            self.rank,
            envelope.tag
        );
        self.stash.borrow_mut()[source].push_back(envelope);
    }

    /// Unpack a matched message into its destination and acknowledge it
    fn deliver(
        &self,
        envelope: Envelope,
        buffer: &mut [Precision],
        layout: &StridedLayout,
        source: Rank,
    ) -> Result<Status, Error> {
        let Envelope { tag, payload, ack } = envelope;
        layout.write(buffer, &payload)?;
        trace!(
            "Rank {} received {} elements from rank {source} with tag {tag}",
            self.rank,
            payload.len()
        );
        // The sender may have given up on the message, which is fine
        let _ = ack.send(());
        self.count(|traffic| traffic.received += 1);
        Ok(Status {
            source,
            tag,
            len: payload.len(),
        })
    }

    /// Update the traffic counters
    fn count(&self, update: impl FnOnce(&mut Traffic)) {
        let mut traffic = self.traffic.get();
        update(&mut traffic);
        self.traffic.set(traffic);
    }
}
//
impl Fabric for LocalFabric {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn send_while<R>(
        &self,
        buffer: &[Precision],
        tag: Tag,
        messages: &[Message],
        work: impl FnOnce() -> R,
    ) -> Result<R, Error> {
        let mut acks = Vec::with_capacity(messages.len());
        for message in messages {
            acks.push((
                message.peer,
                self.post(buffer, &message.layout, message.peer, tag)?,
            ));
        }
        let result = work();
        for (peer, acked) in acks {
            acked
                .recv()
                .map_err(|_| Error::Unacknowledged { peer, tag })?;
        }
        Ok(result)
    }

    fn recv(
        &self,
        buffer: &mut [Precision],
        layout: &StridedLayout,
        source: Rank,
        tag: Tag,
    ) -> Result<Status, Error> {
        check_rank(source, self.size())?;
        layout.check_bounds(buffer.len())?;
        let envelope = match self.take_stashed(source, tag) {
            Some(envelope) => envelope,
            None => loop {
                let envelope = self.inboxes[source]
                    .recv()
                    .map_err(|_| Error::Disconnected { peer: source })?;
                if envelope.tag == tag {
                    break envelope;
                }
                self.stash(source, envelope);
            },
        };
        self.deliver(envelope, buffer, layout, source)
    }

    fn recv_all(
        &self,
        buffer: &mut [Precision],
        tag: Tag,
        messages: &[Message],
    ) -> Result<Vec<Status>, Error> {
        check_distinct_peers(messages, self.size())?;
        for message in messages {
            message.layout.check_bounds(buffer.len())?;
        }
        let mut pending = messages.iter().collect::<Vec<_>>();
        let mut statuses = Vec::with_capacity(pending.len());

        // Some messages may have arrived during earlier receives
        let mut idx = 0;
        while idx < pending.len() {
            let message = pending[idx];
            if let Some(envelope) = self.take_stashed(message.peer, tag) {
                pending.swap_remove(idx);
                statuses.push(self.deliver(envelope, buffer, &message.layout, message.peer)?);
            } else {
                idx += 1;
            }
        }

        // Complete the other receives as their messages come in
        while !pending.is_empty() {
            let mut select = Select::new();
            for message in &pending {
                select.recv(&self.inboxes[message.peer]);
            }
            let operation = select.select();
            let message = pending[operation.index()];
            let envelope = operation
                .recv(&self.inboxes[message.peer])
                .map_err(|_| Error::Disconnected { peer: message.peer })?;
            if envelope.tag != tag {
                self.stash(message.peer, envelope);
                continue;
            }
            pending.swap_remove(operation.index());
            statuses.push(self.deliver(envelope, buffer, &message.layout, message.peer)?);
            trace!(
                "Rank {} has {} receives left in its batch",
                self.rank,
                pending.len()
            );
        }
        Ok(statuses)
    }
}
