//! Message passing between the ranks of a transpose
//!
//! Ranks share no data: they only exchange tagged messages. The [`Fabric`]
//! trait is the interface that the distributed algorithm is written against.
//! In a real run, every rank is an OS process of an MPI job and talks through
//! [`MpiFabric`]. With the `local` feature, the [`local`] module also provides
//! an in-process fabric where ranks are threads, which tests use to run a
//! whole grid of ranks inside of `cargo test`.
//!
//! Sends and receives take a [`StridedLayout`] that says which elements of
//! the user's buffer travel, so that blocks of a larger matrix can be moved
//! without the caller packing them first.

pub mod datatype;
#[cfg(any(test, feature = "local"))]
pub mod local;
mod runtime;

pub use runtime::MpiFabric;

use data::{
    strided::{DescriptorError, StridedLayout},
    Precision,
};
use std::ops::Range;
use thiserror::Error;

/// Identifier of a rank
pub type Rank = usize;

/// Message tag, used to tell apart the phases of a computation
pub type Tag = mpi::Tag;

/// Tag reserved for the internal messages of [`Fabric::reduce_max()`]
///
/// This is the smallest upper bound on tags that MPI guarantees.
pub const REDUCE_TAG: Tag = 32767;

/// Region of a buffer that is sent to, or received from, another rank
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    /// Rank on the other end
    pub peer: Rank,

    /// Elements of the buffer that travel, in payload order
    pub layout: StridedLayout,
}

/// Outcome of a completed receive
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Status {
    /// Rank that sent the message
    pub source: Rank,

    /// Tag of the message
    pub tag: Tag,

    /// Number of elements that were received
    pub len: usize,
}

/// Endpoint of one rank in a message-passing fabric
pub trait Fabric {
    /// Rank of this endpoint
    fn rank(&self) -> Rank;

    /// Number of ranks in the fabric
    fn size(&self) -> usize;

    /// Start sending the region of `buffer` described by each message to its
    /// peer, run `work` while the sends are in flight, then wait for all sends
    /// to complete
    ///
    /// The sends are waited for even if `work` fails, whose result is passed
    /// through. Sending to self is allowed, as long as `work` receives the
    /// message.
    fn send_while<R>(
        &self,
        buffer: &[Precision],
        tag: Tag,
        messages: &[Message],
        work: impl FnOnce() -> R,
    ) -> Result<R, Error>;

    /// Wait for a message from `source` and write it into the elements of
    /// `buffer` covered by `layout`
    ///
    /// The message must have exactly as many elements as `layout` covers.
    fn recv(
        &self,
        buffer: &mut [Precision],
        layout: &StridedLayout,
        source: Rank,
        tag: Tag,
    ) -> Result<Status, Error>;

    /// Receive one message from the peer of each entry of `messages` into the
    /// matching disjoint region of `buffer`
    ///
    /// Messages are received in whatever order they arrive, and this only
    /// returns once all of them are in. Statuses come out in arrival order.
    /// Each peer may only appear once.
    fn recv_all(
        &self,
        buffer: &mut [Precision],
        tag: Tag,
        messages: &[Message],
    ) -> Result<Vec<Status>, Error>;

    /// Send the elements of `buffer` covered by `layout` to `dest`, and wait
    /// for the send to complete
    fn send(
        &self,
        buffer: &[Precision],
        layout: &StridedLayout,
        dest: Rank,
        tag: Tag,
    ) -> Result<(), Error> {
        let message = Message {
            peer: dest,
            layout: layout.clone(),
        };
        self.send_while(buffer, tag, std::slice::from_ref(&message), || ())
    }

    /// Compute the maximum of a value over the ranks of `group`
    ///
    /// Every rank of `group`, which must include `root`, must call this. The
    /// result is only returned on `root`.
    fn reduce_max(
        &self,
        value: Precision,
        root: Rank,
        group: Range<Rank>,
    ) -> Result<Option<Precision>, Error> {
        check_rank(root, self.size())?;
        if group.end > self.size() {
            return Err(Error::InvalidRank {
                rank: group.end - 1,
                size: self.size(),
            });
        }
        debug_assert!(group.contains(&root) && group.contains(&self.rank()));
        let scalar = StridedLayout::contiguous(1)?;
        if self.rank() != root {
            self.send(&[value], &scalar, root, REDUCE_TAG)?;
            return Ok(None);
        }
        let mut max = value;
        for source in group.filter(|&source| source != root) {
            let mut other = [0.0];
            self.recv(&mut other, &scalar, source, REDUCE_TAG)?;
            max = max.max(other[0]);
        }
        Ok(Some(max))
    }
}

/// Check that a rank exists in a fabric of `size` ranks
pub(crate) fn check_rank(rank: Rank, size: usize) -> Result<(), Error> {
    if rank >= size {
        return Err(Error::InvalidRank { rank, size });
    }
    Ok(())
}

/// Check that a batch of receives names each peer at most once
pub(crate) fn check_distinct_peers(messages: &[Message], size: usize) -> Result<(), Error> {
    let mut seen = vec![false; size];
    for message in messages {
        check_rank(message.peer, size)?;
        if std::mem::replace(&mut seen[message.peer], true) {
            return Err(Error::DuplicatePeer { peer: message.peer });
        }
    }
    Ok(())
}

/// Things that can go wrong while exchanging messages
#[derive(Debug, Error)]
pub enum Error {
    /// The message-passing runtime could not be brought up
    #[error("MPI is already initialized in this process")]
    AlreadyInitialized,

    /// A fabric needs at least one rank
    #[error("cannot build a fabric with no rank")]
    EmptyWorld,

    /// Attempted to talk to a rank that does not exist
    #[error("rank {rank} does not exist in a fabric of {size} ranks")]
    InvalidRank { rank: Rank, size: usize },

    /// A batch of receives expected two messages from the same rank
    #[error("rank {peer} appears twice in a batch of receives")]
    DuplicatePeer { peer: Rank },

    /// A message came from a rank that no pending receive expected
    #[error("unexpected message from rank {peer} with tag {tag}")]
    UnexpectedSource { peer: Rank, tag: Tag },

    /// A quantity does not fit in the integer types of the MPI interface
    #[error("{value} is too large for the MPI interface")]
    Unrepresentable { value: usize },

    /// The peer rank is gone
    #[error("rank {peer} has disconnected")]
    Disconnected { peer: Rank },

    /// The destination of a message went away without receiving it
    #[error("message to rank {peer} with tag {tag} was never received")]
    Unacknowledged { peer: Rank, tag: Tag },

    /// A strided layout did not fit the buffer or message
    #[error("invalid message layout")]
    Descriptor(#[from] DescriptorError),

    /// Failed to start the thread of a rank
    #[error("failed to start rank {rank}")]
    Spawn {
        rank: Rank,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(peer: Rank) -> Message {
        Message {
            peer,
            layout: StridedLayout::contiguous(1).unwrap(),
        }
    }

    #[test]
    fn ranks_are_checked() {
        assert!(check_rank(2, 3).is_ok());
        assert!(matches!(
            check_rank(3, 3),
            Err(Error::InvalidRank { rank: 3, size: 3 })
        ));
    }

    #[test]
    fn batches_name_each_peer_once() {
        assert!(check_distinct_peers(&[message(0), message(2), message(1)], 3).is_ok());
        assert!(matches!(
            check_distinct_peers(&[message(1), message(0), message(1)], 3),
            Err(Error::DuplicatePeer { peer: 1 })
        ));
        assert!(matches!(
            check_distinct_peers(&[message(4)], 3),
            Err(Error::InvalidRank { rank: 4, size: 3 })
        ));
    }
}
