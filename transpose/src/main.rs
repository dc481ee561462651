//! Transpose a random square matrix over a grid of MPI processes
//!
//! Run it with one process per rank, e.g. `mpirun -n 4 transpose 1000`.

mod report;

use clap::Parser;
use comm::{Fabric, MpiFabric};
use compute::{Transpose, TransposeBase, TransposeCreate};
use compute_selector::Transposer;
use data::{matrix::GlobalMatrix, Precision};
use distributed::{Participation, TileExchange, Transposed};
use log::{error, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{io::Write, num::NonZeroUsize};

/// Lower bound of the randomly generated matrix elements
const MIN: Precision = 1.0;

/// Upper bound of the randomly generated matrix elements (excluded)
const MAX: Precision = 100.0;

/// Exit code of the whole job when a rank fails
const FAILURE: i32 = 1;

/// Perform a distributed blocked matrix transpose
///
/// Ranks are laid out as a square grid, so only the largest square number of
/// MPI processes that fits takes part in the computation.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of rows and columns of the matrix
    size_matrix: NonZeroUsize,

    /// Seed of the matrix element generator, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Do not print the input and output matrices
    #[arg(short, long)]
    quiet: bool,

    /// Where the off-diagonal cache tiles of each block get swapped
    #[arg(long, value_enum, default_value_t)]
    tile_exchange: TileExchange,

    /// Print the longest time that a rank spent in the transpose
    #[arg(long)]
    timing: bool,

    /// Local transpose backend parameters
    #[command(flatten)]
    backend: <Transposer as TransposeBase>::CliArgs,
}

fn main() -> eyre::Result<()> {
    // Enable logging to stderr
    env_logger::init();

    // Parse CLI arguments and join the MPI job
    let args = Args::parse();
    let fabric = MpiFabric::initialize()?;
    info!(
        "Rank {} of {} transposes a {2}x{2} matrix",
        fabric.rank(),
        fabric.size(),
        args.size_matrix
    );

    // Set up the local transpose backend
    let backend = Transposer::new(args.backend)?;

    // Do this rank's share of the work, only the coordinator gets matrices
    let outcome = run_rank(
        &fabric,
        args.size_matrix.get(),
        args.seed,
        &backend,
        args.tile_exchange,
    );
    let (input, transposed) = match outcome {
        Ok(Some(matrices)) => matrices,
        Ok(None) => return Ok(()),
        Err(e) => {
            error!("Rank {} failed: {:?}", fabric.rank(), eyre::Report::new(e));
            fabric.abort(FAILURE)
        }
    };

    // Report results
    let mut stdout = std::io::stdout().lock();
    if !args.quiet {
        report::print_matrix(&mut stdout, "matrix in:", input.meaningful())?;
        report::print_matrix(&mut stdout, "matrix out:", transposed.matrix.meaningful())?;
    }
    if args.timing {
        writeln!(
            stdout,
            "Resulted time: {}",
            transposed.elapsed.as_secs_f64()
        )?;
    }
    Ok(())
}

/// Work done by one rank, only the coordinator returns matrices
fn run_rank<C: Fabric>(
    comm: &C,
    size_matrix: usize,
    seed: Option<u64>,
    backend: &impl Transpose,
    exchange: TileExchange,
) -> Result<Option<(GlobalMatrix, Transposed)>, distributed::Error> {
    match distributed::join(comm, size_matrix)? {
        Participation::Surplus => Ok(None),
        Participation::Worker(worker) => {
            worker.run(backend, exchange)?;
            Ok(None)
        }
        Participation::Coordinator(coordinator) => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let input = GlobalMatrix::from_fn(coordinator.layout(), |_| rng.gen_range(MIN..MAX))?;
            let transposed = coordinator.run(backend, exchange, &input)?;
            Ok(Some((input, transposed)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comm::local::Traffic;
    use compute::NoArgs;

    #[test]
    fn only_the_coordinator_reports() {
        let backend = compute_naive::Transposer::new(NoArgs).unwrap();
        let outcomes = comm::local::launch(5, |comm| {
            let outcome = run_rank(&comm, 6, Some(42), &backend, TileExchange::InTransit);
            (outcome, comm.traffic())
        })
        .unwrap();
        let mut outcomes = outcomes.into_iter();

        let (coordinator, _) = outcomes.next().unwrap();
        let (input, transposed) = coordinator.unwrap().unwrap();
        assert_eq!(transposed.matrix.meaningful(), input.meaningful().t());
        assert!(input
            .meaningful()
            .iter()
            .all(|elem| (MIN..MAX).contains(elem)));

        // Rank 4 does not fit in a 2x2 grid: it exits successfully at once
        let (surplus, traffic) = outcomes.next_back().unwrap();
        assert!(surplus.unwrap().is_none());
        assert_eq!(traffic, Traffic::default());
        for (worker, traffic) in outcomes {
            assert!(worker.unwrap().is_none());
            assert_ne!(traffic, Traffic::default());
        }
    }

    #[test]
    fn seeds_make_runs_reproducible() {
        let backend = compute_naive::Transposer::new(NoArgs).unwrap();
        let inputs = (0..2)
            .map(|_| {
                let outcomes = comm::local::launch(1, |comm| {
                    run_rank(&comm, 9, Some(7), &backend, TileExchange::Local)
                })
                .unwrap();
                let (input, _) = outcomes.into_iter().next().unwrap().unwrap().unwrap();
                input
            })
            .collect::<Vec<_>>();
        assert_eq!(inputs[0], inputs[1]);
    }
}
