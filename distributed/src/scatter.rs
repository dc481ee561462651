//! Distribution of the global matrix's blocks to the grid

use crate::{Error, SCATTER_TAG};
use comm::{Fabric, Message};
use data::{grid::GridTopology, layout::BlockLayout, matrix::GlobalMatrix};
use log::debug;

/// Messages that carry the block of each grid cell, from the padded global
/// matrix to the rank that owns the cell
pub fn messages(topology: &GridTopology, layout: &BlockLayout) -> Result<Vec<Message>, Error> {
    topology
        .cells()
        .map(|cell| {
            Ok(Message {
                peer: topology.rank_of(cell),
                layout: layout.row_block_at(cell)?,
            })
        })
        .collect()
}

/// Send every block of `input` to the rank that owns the matching grid cell,
/// running `work` while the blocks are in flight
///
/// Returns once every block has been sent, with the result of `work`.
pub fn scatter<C: Fabric, R>(
    comm: &C,
    topology: &GridTopology,
    layout: &BlockLayout,
    input: &GlobalMatrix,
    work: impl FnOnce() -> R,
) -> Result<R, Error> {
    let messages = messages(topology, layout)?;
    let result = comm.send_while(input.as_slice(), SCATTER_TAG, &messages, work)?;
    debug!("Scattered {} blocks", messages.len());
    Ok(result)
}
