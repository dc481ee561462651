//! Work done by the rank that owns the global matrix

use crate::{gather::gather, scatter::scatter, worker::Worker, Error, TileExchange, GATHER_TAG};
use comm::Fabric;
use compute::Transpose;
use data::{layout::BlockLayout, matrix::GlobalMatrix};
use log::info;
use std::time::{Duration, Instant};

/// Outcome of a distributed transpose
#[derive(Clone, Debug, PartialEq)]
pub struct Transposed {
    /// Transposed matrix
    ///
    /// Only its meaningful region is specified, padding is left unspecified.
    pub matrix: GlobalMatrix,

    /// Longest time that a participating rank spent in the transpose
    pub elapsed: Duration,
}

/// Rank that owns the global matrix, and also processes grid cell (0, 0)
#[derive(Debug)]
pub struct Coordinator<'comm, C: Fabric> {
    /// Worker side of this rank
    worker: Worker<'comm, C>,
}
//
impl<'comm, C: Fabric> Coordinator<'comm, C> {
    /// Promote a worker to the coordinator role
    pub(crate) fn new(worker: Worker<'comm, C>) -> Self {
        Self { worker }
    }

    /// Worker side of this rank
    pub fn worker(&self) -> &Worker<'comm, C> {
        &self.worker
    }

    /// Block decomposition of the global matrix
    pub fn layout(&self) -> &BlockLayout {
        self.worker.layout()
    }

    /// Transpose `input`, which must have been allocated for
    /// [`layout()`](Self::layout)
    ///
    /// Every other participating rank must be running [`Worker::run()`]
    /// concurrently.
    pub fn run(
        &self,
        backend: &impl Transpose,
        exchange: TileExchange,
        input: &GlobalMatrix,
    ) -> Result<Transposed, Error> {
        let worker = &self.worker;
        let (comm, topology, layout) = (worker.comm(), worker.topology(), worker.layout());
        if input.size() != layout.size_matrix() {
            return Err(Error::InputShape {
                expected: layout.size_matrix(),
                actual: input.size(),
            });
        }
        if input.padded_size() != layout.padded_size() {
            return Err(Error::InputShape {
                expected: layout.padded_size(),
                actual: input.padded_size(),
            });
        }
        let mut output = GlobalMatrix::zeros(layout)?;

        let start = Instant::now();
        scatter(comm, topology, layout, input, || -> Result<(), Error> {
            let block = worker.process_block(backend, exchange)?;
            let back = worker.send_back(exchange)?;
            comm.send_while(&block, GATHER_TAG, &[back], || {
                gather(comm, topology, layout, &mut output)
            })??;
            Ok(())
        })??;
        let elapsed = worker.reduce_elapsed(start.elapsed())?;
        info!("Transposed the matrix in {}s", elapsed.as_secs_f64());

        Ok(Transposed {
            matrix: output,
            elapsed,
        })
    }
}
