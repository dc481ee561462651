//! Parallel implementation of the local block transpose
//!
//! This crates distributes the tile pairs of the cache blocking version across
//! threads using fork-join parallelism. Tile pairs are independent from each
//! other, so the only question is how many of them each task should get.

use clap::Args;
use compute::{
    tile::{self, TilePair, TileError, TILE},
    Transpose, TransposeBase, TransposeCreate,
};
use data::Precision;
use log::debug;
use rayon::{prelude::*, ThreadPoolBuildError, ThreadPoolBuilder};
use std::num::NonZeroUsize;
use thiserror::Error;

/// Number of tile pairs below which parallelism is not considered worthwhile,
/// unless configured otherwise
pub const DEFAULT_SEQ_TILE_PAIRS: usize = 32;

/// Parameters are tunable via CLI args and environment variables
#[derive(Args, Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CliArgs {
    /// Number of processing threads
    #[arg(short = 'j', long, env)]
    num_threads: Option<NonZeroUsize>,

    /// Number of tile pairs per parallel task
    ///
    /// Each tile pair is two 8x8 tiles of doubles, or 1 KiB of data. Small
    /// values expose more parallelism, large values reduce the task
    /// scheduling overhead.
    #[arg(long, env)]
    seq_tile_pairs: Option<NonZeroUsize>,
}

/// Multi-threaded tiled local transpose
#[derive(Debug)]
pub struct Transposer {
    /// Number of tile pairs below which a task is processed sequentially
    seq_tile_pairs: usize,
}
//
impl TransposeBase for Transposer {
    type CliArgs = CliArgs;

    type Error = Error;
}
//
impl TransposeCreate for Transposer {
    fn new(args: CliArgs) -> Result<Self, Error> {
        if let Some(num_threads) = args.num_threads {
            ThreadPoolBuilder::new()
                .num_threads(num_threads.into())
                .build_global()
                .map_err(Error::ThreadPool)?;
            debug!("Configured a global pool of {num_threads} threads");
        }
        Ok(Self {
            seq_tile_pairs: args
                .seq_tile_pairs
                .map_or(DEFAULT_SEQ_TILE_PAIRS, usize::from),
        })
    }
}
//
impl Transpose for Transposer {
    fn transpose_in_place(&self, block: &mut [Precision], side: usize) -> Result<(), Error> {
        let num_tiles = tile::check_tiled(block, side)?;
        let pairs = tile::tile_pairs(num_tiles).collect::<Vec<_>>();
        let base = BlockPtr(block.as_mut_ptr());
        rayon::iter::split(&pairs[..], |pairs| {
            if pairs.len() <= self.seq_tile_pairs {
                (pairs, None)
            } else {
                let (half1, half2) = pairs.split_at(pairs.len() / 2);
                (half1, Some(half2))
            }
        })
        .for_each(|pairs: &[TilePair]| {
            for &pair in pairs {
                // SAFETY: The block was checked to be side² so every pair is
                //         in bounds, it stays borrowed for the whole
                //         computation, and each pair appears in exactly one
                //         task so no element is accessed by two threads.
                unsafe { tile::exchange_tile_pair_raw(base.get(), side, pair) }
            }
        });
        Ok(())
    }

    fn transpose_tiles_in_place(&self, block: &mut [Precision], side: usize) -> Result<(), Error> {
        tile::check_tiled(block, side)?;
        block
            .par_chunks_mut(TILE * side)
            .for_each(|band| tile::transpose_tiles_of_band(band, side));
        Ok(())
    }
}

/// Pointer to a block that is shared between the tasks of a transpose
#[derive(Clone, Copy)]
struct BlockPtr(*mut Precision);
//
impl BlockPtr {
    /// Access the pointer
    ///
    /// Going through a method makes closures capture the whole `BlockPtr`,
    /// rather than the raw pointer field which is neither `Send` nor `Sync`.
    fn get(self) -> *mut Precision {
        self.0
    }
}
//
// SAFETY: Tasks only access disjoint tile pairs of the block
unsafe impl Send for BlockPtr {}
unsafe impl Sync for BlockPtr {}

/// Things that can go wrong when performing a parallel transpose
#[derive(Debug, Error)]
pub enum Error {
    /// The block cannot be processed tile by tile
    #[error(transparent)]
    Tiles(#[from] TileError),

    /// Failed to configure thread pool
    #[error("failed to configure thread pool")]
    ThreadPool(#[source] ThreadPoolBuildError),
}
