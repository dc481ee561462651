//! Blocked matrix transpose over a square grid of ranks
//!
//! The coordinator rank owns the global matrix. It scatters one block to each
//! cell of the grid, every participating rank (coordinator included)
//! transposes its block locally, and the coordinator gathers the transposed
//! blocks back at mirrored grid positions, which yields the transpose of the
//! whole matrix.
//!
//! Ranks that do not fit in the square grid take no part in the computation.
//! This is decided once by [`join()`], before anything else happens.

pub mod coordinator;
pub mod gather;
pub mod scatter;
pub mod worker;

pub use coordinator::{Coordinator, Transposed};
pub use worker::Worker;

use clap::ValueEnum;
use comm::{Fabric, Tag};
use data::{
    grid::{GridTopology, Role, COORDINATOR},
    layout::BlockLayout,
    strided::DescriptorError,
    AllocError, ConfigError,
};
use log::info;
use thiserror::Error;

/// Tag of the messages that carry blocks from the coordinator to the ranks
pub const SCATTER_TAG: Tag = 0;

/// Tag of the messages that carry transposed blocks back to the coordinator
pub const GATHER_TAG: Tag = 1;

/// Where the off-diagonal cache tiles of a block get swapped
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, ValueEnum)]
pub enum TileExchange {
    /// Each rank fully transposes its block before sending it back
    #[default]
    Local,

    /// Each rank only transposes the inside of its cache tiles, and the tiles
    /// are moved to their mirrored position by the layout of the message that
    /// carries the block back to the coordinator
    InTransit,
}

/// Part that a rank plays in a transpose
#[derive(Debug)]
pub enum Participation<'comm, C: Fabric> {
    /// The rank owns grid cell (0, 0) and the global matrix
    Coordinator(Coordinator<'comm, C>),

    /// The rank owns another grid cell
    Worker(Worker<'comm, C>),

    /// The rank does not fit in the grid and has nothing to do
    Surplus,
}

/// Figure out what a rank should do in the transpose of a `size_matrix²`
/// matrix
///
/// Every rank reaches the same conclusions on its own, no communication is
/// involved. Surplus ranks should exit successfully right away.
pub fn join<C: Fabric>(comm: &C, size_matrix: usize) -> Result<Participation<'_, C>, Error> {
    let topology = GridTopology::new(comm.size())?;
    let cell = match topology.role(comm.rank()) {
        Role::Participant(cell) => cell,
        Role::Surplus => {
            info!(
                "Rank {} is not needed by a {side}x{side} grid, shutting down",
                comm.rank(),
                side = topology.side()
            );
            return Ok(Participation::Surplus);
        }
    };
    let layout = BlockLayout::new(size_matrix, topology.side())?;
    let worker = Worker::new(comm, topology, layout, cell);
    if comm.rank() == COORDINATOR {
        info!(
            "Transposing a {size_matrix}x{size_matrix} matrix as {0}x{0} blocks of {1}x{1} elements",
            topology.side(),
            layout.block_size()
        );
        Ok(Participation::Coordinator(Coordinator::new(worker)))
    } else {
        Ok(Participation::Worker(worker))
    }
}

/// Things that can go wrong during a distributed transpose
#[derive(Debug, Error)]
pub enum Error {
    /// The grid or matrix configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to allocate a matrix or block
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// Failed to exchange messages with another rank
    #[error("failed to communicate with another rank")]
    Transport(#[from] comm::Error),

    /// Failed to describe the layout of a block
    #[error("failed to describe a block layout")]
    Descriptor(#[from] DescriptorError),

    /// The local transpose backend failed
    #[error("local transpose failed")]
    Compute(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The global matrix does not match the block layout
    #[error("expected a {expected}x{expected} padded matrix, got a {actual}x{actual} one")]
    InputShape { expected: usize, actual: usize },

}
//
impl Error {
    /// Wrap an error from the local transpose backend
    pub(crate) fn compute(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Compute(Box::new(error))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use comm::local::{LocalFabric, Traffic};
    use compute::{NoArgs, Transpose, TransposeCreate};
    use data::{matrix::GlobalMatrix, Precision};
    use ndarray::{array, Array2, ArrayView2};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::sync::Once;

    pub(crate) fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    pub(crate) fn random_matrix(size: usize, seed: u64) -> Array2<Precision> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_simple_fn((size, size), || rng.gen_range(1.0..100.0))
    }

    fn block_backend() -> compute_block::Transposer {
        compute_block::Transposer::new(NoArgs).unwrap()
    }

    /// Everything that one rank of an in-process transpose did
    struct RankOutcome {
        /// Transposed matrix, only on the coordinator
        output: Option<Array2<Precision>>,

        /// Messages that went through the rank
        traffic: Traffic,
    }

    /// What a rank does in a whole transpose, surplus ranks included
    fn run_rank(
        comm: &LocalFabric,
        input: ArrayView2<'_, Precision>,
        backend: &impl Transpose,
        exchange: TileExchange,
    ) -> Result<Option<Array2<Precision>>, Error> {
        match join(comm, input.nrows())? {
            Participation::Surplus => Ok(None),
            Participation::Worker(worker) => {
                worker.run(backend, exchange)?;
                Ok(None)
            }
            Participation::Coordinator(coordinator) => {
                let matrix = GlobalMatrix::from_fn(coordinator.layout(), |idx| input[idx])?;
                let transposed = coordinator.run(backend, exchange, &matrix)?;
                Ok(Some(transposed.matrix.meaningful().to_owned()))
            }
        }
    }

    /// Transpose a square matrix over `num_tasks` in-process ranks
    fn launch_transpose(
        input: ArrayView2<'_, Precision>,
        num_tasks: usize,
        backend: &impl Transpose,
        exchange: TileExchange,
    ) -> Result<Vec<RankOutcome>, Error> {
        let outcomes = comm::local::launch(num_tasks, |comm| -> Result<RankOutcome, Error> {
            let output = run_rank(&comm, input, backend, exchange)?;
            Ok(RankOutcome {
                output,
                traffic: comm.traffic(),
            })
        })?;
        outcomes.into_iter().collect()
    }

    /// Transposed matrix of an in-process transpose
    fn transpose(
        input: ArrayView2<'_, Precision>,
        num_tasks: usize,
        backend: &impl Transpose,
        exchange: TileExchange,
    ) -> Result<Array2<Precision>, Error> {
        let mut outcomes = launch_transpose(input, num_tasks, backend, exchange)?;
        Ok(outcomes[COORDINATOR]
            .output
            .take()
            .expect("The coordinator produces the result"))
    }

    #[test]
    fn two_by_two_on_one_rank() {
        init_logger();
        let input = array![[1.0, 2.0], [3.0, 4.0]];
        for exchange in [TileExchange::Local, TileExchange::InTransit] {
            let output = transpose(input.view(), 1, &block_backend(), exchange).unwrap();
            assert_eq!(output, array![[1.0, 3.0], [2.0, 4.0]]);
        }
    }

    #[test]
    fn element_mapping() {
        init_logger();
        for (seed, (size, num_tasks)) in [(5, 1), (10, 4), (33, 4), (70, 9), (40, 10)]
            .into_iter()
            .enumerate()
        {
            let input = random_matrix(size, seed as u64);
            for exchange in [TileExchange::Local, TileExchange::InTransit] {
                let output = transpose(input.view(), num_tasks, &block_backend(), exchange)
                    .unwrap();
                assert_eq!(output.dim(), (size, size));
                for ((a, b), &value) in output.indexed_iter() {
                    assert_eq!(value, input[[b, a]]);
                }
            }
        }
    }

    #[test]
    fn round_trip() {
        init_logger();
        let input = random_matrix(45, 42);
        let backend = block_backend();
        let once = transpose(input.view(), 4, &backend, TileExchange::InTransit).unwrap();
        let twice = transpose(once.view(), 4, &backend, TileExchange::Local).unwrap();
        assert_eq!(twice, input);
    }

    #[test]
    fn every_backend_agrees() {
        init_logger();
        let input = random_matrix(50, 7);
        let expected = input.t().to_owned();
        let naive = compute_naive::Transposer::new(NoArgs).unwrap();
        let parallel = compute_parallel::Transposer::new(Default::default()).unwrap();
        for exchange in [TileExchange::Local, TileExchange::InTransit] {
            assert_eq!(
                transpose(input.view(), 4, &naive, exchange).unwrap(),
                expected
            );
            assert_eq!(
                transpose(input.view(), 4, &block_backend(), exchange).unwrap(),
                expected
            );
            assert_eq!(
                transpose(input.view(), 4, &parallel, exchange).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn invalid_inputs() {
        let backend = block_backend();
        let input = Array2::<Precision>::zeros((0, 0));
        assert!(matches!(
            transpose(input.view(), 1, &backend, TileExchange::Local),
            Err(Error::Config(ConfigError::EmptyMatrix))
        ));
        let input = Array2::<Precision>::zeros((2, 2));
        assert!(matches!(
            transpose(input.view(), 0, &backend, TileExchange::Local),
            Err(Error::Transport(comm::Error::EmptyWorld))
        ));
    }

    #[test]
    fn surplus_ranks_stay_out() {
        init_logger();
        let roles = comm::local::launch(10, |comm| match join(&comm, 10) {
            Ok(Participation::Coordinator(_)) => "coordinator",
            Ok(Participation::Worker(_)) => "worker",
            Ok(Participation::Surplus) => "surplus",
            Err(_) => "error",
        })
        .unwrap();
        let mut expected = vec!["worker"; 10];
        expected[0] = "coordinator";
        expected[9] = "surplus";
        assert_eq!(roles, expected);
    }

    #[test]
    fn surplus_ranks_succeed_without_touching_data() {
        init_logger();
        let input = random_matrix(40, 9);
        let outcomes =
            launch_transpose(input.view(), 10, &block_backend(), TileExchange::Local).unwrap();
        assert_eq!(outcomes.len(), 10);

        // The coordinator's own block goes to itself and back, and it gets
        // the elapsed time of the 8 other participants
        assert_eq!(outcomes[0].output.as_ref().unwrap(), &input.t());
        assert_eq!(
            outcomes[0].traffic,
            Traffic {
                sent: 9 + 1,
                received: 1 + 9 + 8
            }
        );
        for outcome in &outcomes[1..9] {
            assert!(outcome.output.is_none());
            assert_eq!(
                outcome.traffic,
                Traffic {
                    sent: 2,
                    received: 1
                }
            );
        }

        // Rank 9 never received a block, so it never allocated one either
        assert!(outcomes[9].output.is_none());
        assert_eq!(outcomes[9].traffic, Traffic::default());
    }
}
