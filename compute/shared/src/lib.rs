//! Common facilities shared by all local transpose backends

#[cfg(feature = "criterion")]
pub mod benchmark;
pub mod tile;

use clap::Args;
use data::Precision;
use tile::TileError;

/// Commonalities between all local transpose backends
pub trait TransposeBase: Sized {
    /// Tuning parameters of this backend
    type CliArgs: Args;

    /// Errors that can occur while setting up or running this backend
    ///
    /// Every backend must be able to report blocks of the wrong shape.
    type Error: std::error::Error + From<TileError> + Send + Sync + 'static;
}

/// Local transpose backend setup
pub trait TransposeCreate: TransposeBase {
    /// Set up the backend
    fn new(args: Self::CliArgs) -> Result<Self, Self::Error>;
}

/// Local transpose backend interface expected by the distributed transpose
///
/// Blocks are square, row-major and contiguous. Every rank of a computation
/// shares the same backend, hence the `Sync` bound.
pub trait Transpose: TransposeBase + TransposeCreate + Sync {
    /// Transpose a `side²` block in place
    fn transpose_in_place(&self, block: &mut [Precision], side: usize) -> Result<(), Self::Error>;

    /// Transpose each [`tile::TILE`]-sized tile of a `side²` block in place,
    /// leaving the tiles themselves where they are
    ///
    /// Sending the result through [`data::strided::StridedLayout::tile_mirror()`]
    /// completes the transpose. The default implementation is sequential.
    fn transpose_tiles_in_place(
        &self,
        block: &mut [Precision],
        side: usize,
    ) -> Result<(), Self::Error> {
        tile::transpose_within_tiles(block, side)?;
        Ok(())
    }
}

/// Dummy struct for backends that have no tuning parameter
#[derive(Args, Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct NoArgs;

/// Macro that generates a complete criterion benchmark harness for you
#[macro_export]
#[cfg(feature = "criterion")]
macro_rules! criterion_benchmark {
    ($backend:ident) => {
        fn criterion_benchmark(c: &mut $crate::benchmark::criterion::Criterion) {
            $crate::benchmark::criterion_benchmark::<$backend::Transposer>(
                c,
                stringify!($backend),
            )
        }
        $crate::benchmark::criterion::criterion_group!(benches, criterion_benchmark);
        $crate::benchmark::criterion::criterion_main!(benches);
    };
}
