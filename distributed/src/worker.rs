//! Work done by every participating rank

use crate::{Error, TileExchange, GATHER_TAG, SCATTER_TAG};
use comm::{Fabric, Message};
use compute::Transpose;
use data::{
    block::LocalBlock,
    grid::{GridCell, GridTopology, COORDINATOR},
    layout::BlockLayout,
};
use log::{debug, trace};
use std::time::{Duration, Instant};

/// Rank that owns a grid cell
#[derive(Debug)]
pub struct Worker<'comm, C: Fabric> {
    /// Fabric endpoint
    comm: &'comm C,

    /// Process grid
    topology: GridTopology,

    /// Block decomposition of the global matrix
    layout: BlockLayout,

    /// Grid cell owned by this rank
    cell: GridCell,
}
//
impl<'comm, C: Fabric> Worker<'comm, C> {
    /// Set up a participating rank
    pub(crate) fn new(
        comm: &'comm C,
        topology: GridTopology,
        layout: BlockLayout,
        cell: GridCell,
    ) -> Self {
        Self {
            comm,
            topology,
            layout,
            cell,
        }
    }

    /// Fabric endpoint
    pub fn comm(&self) -> &'comm C {
        self.comm
    }

    /// Process grid
    pub fn topology(&self) -> &GridTopology {
        &self.topology
    }

    /// Block decomposition of the global matrix
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Grid cell owned by this rank
    pub fn cell(&self) -> GridCell {
        self.cell
    }

    /// Take part in a transpose as a non-coordinator rank
    pub fn run(&self, backend: &impl Transpose, exchange: TileExchange) -> Result<(), Error> {
        let start = Instant::now();
        let block = self.process_block(backend, exchange)?;
        let message = self.send_back(exchange)?;
        self.comm
            .send(&block, &message.layout, message.peer, GATHER_TAG)?;
        trace!("Rank {} sent its block back", self.comm.rank());
        self.reduce_elapsed(start.elapsed())?;
        Ok(())
    }

    /// Receive this rank's block and transpose it, leaving it ready to be
    /// sent as described by [`send_back()`](Self::send_back)
    pub fn process_block(
        &self,
        backend: &impl Transpose,
        exchange: TileExchange,
    ) -> Result<LocalBlock, Error> {
        let mut block = self.receive_block()?;
        self.transpose_block(backend, exchange, &mut block)?;
        Ok(block)
    }

    /// Wait for the coordinator to send this rank's block
    pub fn receive_block(&self) -> Result<LocalBlock, Error> {
        let mut block = LocalBlock::zeroed(self.layout.block_size())?;
        let status = self.comm.recv(
            &mut block,
            &self.layout.contiguous_block()?,
            COORDINATOR,
            SCATTER_TAG,
        )?;
        debug!(
            "Rank {} received the {} elements of block {:?}",
            self.comm.rank(),
            status.len,
            self.cell
        );
        Ok(block)
    }

    /// Transpose a block in place
    ///
    /// With [`TileExchange::InTransit`], only the inside of each cache tile
    /// is transposed, and the message that carries the block back to the
    /// coordinator takes care of the rest.
    pub fn transpose_block(
        &self,
        backend: &impl Transpose,
        exchange: TileExchange,
        block: &mut LocalBlock,
    ) -> Result<(), Error> {
        let side = block.side();
        match exchange {
            TileExchange::Local => backend.transpose_in_place(block, side),
            TileExchange::InTransit => backend.transpose_tiles_in_place(block, side),
        }
        .map_err(Error::compute)?;
        trace!("Rank {} transposed its block", self.comm.rank());
        Ok(())
    }

    /// Message that carries a transposed block back to the coordinator
    pub fn send_back(&self, exchange: TileExchange) -> Result<Message, Error> {
        let layout = match exchange {
            TileExchange::Local => self.layout.contiguous_block()?,
            TileExchange::InTransit => self.layout.tile_mirror()?,
        };
        Ok(Message {
            peer: COORDINATOR,
            layout,
        })
    }

    /// Report the time this rank spent in the transpose, and get the maximum
    /// over all participating ranks on the coordinator
    pub(crate) fn reduce_elapsed(&self, elapsed: Duration) -> Result<Duration, Error> {
        let max = self.comm.reduce_max(
            elapsed.as_secs_f64(),
            COORDINATOR,
            0..self.topology.num_participants(),
        )?;
        Ok(max.map_or(elapsed, Duration::from_secs_f64))
    }
}
