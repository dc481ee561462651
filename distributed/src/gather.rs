//! Assembly of the transposed global matrix from the ranks' blocks

use crate::{Error, GATHER_TAG};
use comm::{Fabric, Message};
use data::{grid::GridTopology, layout::BlockLayout, matrix::GlobalMatrix};
use log::debug;

/// Messages that carry the transposed block of every grid cell `(i, j)` to
/// the block at mirrored position `(j, i)` of the padded global matrix
pub fn messages(topology: &GridTopology, layout: &BlockLayout) -> Result<Vec<Message>, Error> {
    topology
        .cells()
        .map(|cell| {
            Ok(Message {
                peer: topology.rank_of(cell),
                layout: layout.row_block_at(cell.mirrored())?,
            })
        })
        .collect()
}

/// Receive the transposed block of every grid cell `(i, j)` into the block
/// at mirrored position `(j, i)` of `output`
///
/// Returns once every block has been received. Blocks are received in
/// whatever order they arrive.
pub fn gather<C: Fabric>(
    comm: &C,
    topology: &GridTopology,
    layout: &BlockLayout,
    output: &mut GlobalMatrix,
) -> Result<(), Error> {
    let messages = messages(topology, layout)?;
    let statuses = comm.recv_all(output.as_mut_slice(), GATHER_TAG, &messages)?;
    debug!(
        "Gathered {} blocks, last one from rank {}",
        statuses.len(),
        statuses.last().map_or(comm.rank(), |status| status.source)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;
    use data::{
        grid::{GridCell, COORDINATOR},
        strided::StridedLayout,
        Precision,
    };

    #[test]
    fn cells_are_sent_to_their_mirror() -> Result<(), Error> {
        let topology = GridTopology::new(4)?;
        let layout = BlockLayout::new(64, topology.side())?;
        let messages = messages(&topology, &layout)?;
        let offsets = messages
            .iter()
            .map(|message| (message.peer, message.layout.offset()))
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec![(0, 0), (1, 32 * 64), (2, 32), (3, 32 * 64 + 32)]);
        assert_eq!(
            messages[1].layout,
            layout.row_block_at(GridCell { row: 1, col: 0 })?
        );
        Ok(())
    }

    #[test]
    fn blocks_land_at_mirrored_positions() -> Result<(), Error> {
        init_logger();
        let results = comm::local::launch(9, |comm| -> Result<Option<GlobalMatrix>, Error> {
            let topology = GridTopology::new(comm.size())?;
            let layout = BlockLayout::new(96, topology.side())?;
            let block = vec![comm.rank() as Precision; layout.block_len()];
            let to_coordinator = Message {
                peer: COORDINATOR,
                layout: StridedLayout::contiguous(layout.block_len())?,
            };
            let output = comm.send_while(&block, GATHER_TAG, &[to_coordinator], || -> Result<_, Error> {
                if comm.rank() != COORDINATOR {
                    return Ok(None);
                }
                let mut matrix = GlobalMatrix::zeros(&layout)?;
                gather(&comm, &topology, &layout, &mut matrix)?;
                Ok(Some(matrix))
            })??;
            Ok(output)
        })?;
        let mut results = results.into_iter();
        let output = results.next().unwrap()?.unwrap();
        for ((row, col), &value) in output.meaningful().indexed_iter() {
            // Block (i, j) holds what the rank of cell (j, i) sent
            let (i, j) = (row / 32, col / 32);
            assert_eq!(value, (j * 3 + i) as Precision);
        }
        for result in results {
            assert!(result?.is_none());
        }
        Ok(())
    }
}
