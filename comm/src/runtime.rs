//! Fabric of an MPI job, one rank per OS process

use crate::{
    check_distinct_peers, check_rank, datatype, Error, Fabric, Message, Rank, Status, Tag,
};
use data::{
    strided::{DescriptorError, StridedLayout},
    Precision,
};
use log::{debug, trace};
use mpi::{
    datatype::{MutView, View},
    environment::Universe,
    point_to_point,
    topology::SimpleCommunicator,
    traits::*,
};

/// Endpoint of this process in the MPI world
///
/// MPI is finalized when this is dropped, so it should live until the end of
/// `main()`.
pub struct MpiFabric {
    /// World communicator, dropped before the universe
    world: SimpleCommunicator,

    /// MPI environment
    _universe: Universe,
}
//
impl MpiFabric {
    /// Initialize MPI and join the world communicator
    ///
    /// This can only be done once per process.
    pub fn initialize() -> Result<Self, Error> {
        let universe = mpi::initialize().ok_or(Error::AlreadyInitialized)?;
        let world = universe.world();
        debug!(
            "Process {} joined an MPI world of {} ranks",
            std::process::id(),
            world.size()
        );
        Ok(Self {
            world,
            _universe: universe,
        })
    }

    /// Terminate every process of the job with the given exit code
    ///
    /// Used when a rank fails, as its peers may otherwise wait forever for
    /// messages that will never come.
    pub fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }

    /// Check that `peer` exists and convert it to an MPI rank
    fn mpi_rank(&self, peer: Rank) -> Result<mpi::Rank, Error> {
        check_rank(peer, self.size())?;
        mpi::Rank::try_from(peer).map_err(|_| Error::Unrepresentable { value: peer })
    }

    /// Turn the MPI status of a receive through `layout` into a [`Status`]
    fn status(
        &self,
        status: point_to_point::Status,
        layout: &StridedLayout,
    ) -> Result<Status, Error> {
        // Negative (MPI_UNDEFINED) if the message holds a partial element
        let len = usize::try_from(status.count(Precision::equivalent_datatype()))
            .unwrap_or(usize::MAX);
        let status = Status {
            source: status.source_rank() as Rank,
            tag: status.tag(),
            len,
        };
        if status.len != layout.len() {
            return Err(DescriptorError::LengthMismatch {
                expected: layout.len(),
                actual: status.len,
            }
            .into());
        }
        trace!(
            "Rank {} received {} elements from rank {} with tag {}",
            self.rank(),
            status.len,
            status.source,
            status.tag
        );
        Ok(status)
    }
}
//
impl Fabric for MpiFabric {
    fn rank(&self) -> Rank {
        self.world.rank() as Rank
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn send_while<R>(
        &self,
        buffer: &[Precision],
        tag: Tag,
        messages: &[Message],
        work: impl FnOnce() -> R,
    ) -> Result<R, Error> {
        // Everything that can fail is done before the first send starts
        let mut sends = Vec::with_capacity(messages.len());
        for message in messages {
            message.layout.check_bounds(buffer.len())?;
            let datatype = datatype::lower(&message.layout)?;
            sends.push((self.mpi_rank(message.peer)?, message, datatype));
        }
        let views = sends
            .iter()
            .map(|(_, message, datatype)| {
                let region = &buffer[message.layout.offset()..message.layout.end()];
                // SAFETY: The datatype only reaches elements of the layout,
                //         which all lie within region as checked above.
                unsafe { View::with_count_and_datatype(region, 1, datatype) }
            })
            .collect::<Vec<_>>();

        let result = mpi::request::multiple_scope(views.len(), |scope, coll| {
            for ((dest, message, _), view) in sends.iter().zip(&views) {
                trace!(
                    "Rank {} sends {} elements to rank {} with tag {tag}",
                    self.rank(),
                    message.layout.len(),
                    message.peer
                );
                let request = self
                    .world
                    .process_at_rank(*dest)
                    .immediate_send_with_tag(scope, view, tag);
                coll.add(request);
            }
            let result = work();
            while coll.incomplete() > 0 {
                coll.wait_any();
            }
            result
        });
        Ok(result)
    }

    fn recv(
        &self,
        buffer: &mut [Precision],
        layout: &StridedLayout,
        source: Rank,
        tag: Tag,
    ) -> Result<Status, Error> {
        let source = self.mpi_rank(source)?;
        layout.check_bounds(buffer.len())?;
        let datatype = datatype::lower(layout)?;
        let region = &mut buffer[layout.offset()..layout.end()];
        // SAFETY: The datatype only reaches elements of the layout, which all
        //         lie within region as checked above.
        let mut view = unsafe { MutView::with_count_and_datatype(region, 1, &datatype) };
        let status = self
            .world
            .process_at_rank(source)
            .receive_into_with_tag(&mut view, tag);
        self.status(status, layout)
    }

    fn recv_all(
        &self,
        buffer: &mut [Precision],
        tag: Tag,
        messages: &[Message],
    ) -> Result<Vec<Status>, Error> {
        check_distinct_peers(messages, self.size())?;
        let mut pending = Vec::with_capacity(messages.len());
        for message in messages {
            message.layout.check_bounds(buffer.len())?;
            pending.push((message, datatype::lower(&message.layout)?));
        }

        // Only one region of the buffer is borrowed at a time: each message is
        // matched as it arrives, then received where its source's data goes
        let mut statuses = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let (incoming, probed) = self.world.any_process().matched_probe_with_tag(tag);
            let source = probed.source_rank() as Rank;
            let Some(idx) = pending
                .iter()
                .position(|(message, _)| message.peer == source)
            else {
                return Err(Error::UnexpectedSource { peer: source, tag });
            };
            let (message, datatype) = pending.swap_remove(idx);
            let region = &mut buffer[message.layout.offset()..message.layout.end()];
            // SAFETY: The datatype only reaches elements of the layout, which
            //         all lie within region as checked above.
            let mut view = unsafe { MutView::with_count_and_datatype(region, 1, &datatype) };
            let status = incoming.matched_receive_into(&mut view);
            statuses.push(self.status(status, &message.layout)?);
        }
        Ok(statuses)
    }
}
//
impl std::fmt::Debug for MpiFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpiFabric")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}
