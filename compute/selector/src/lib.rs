//! Pick the best local transpose backend allowed by enabled crate features,
//! expose it as a Transposer typedef.

cfg_if::cfg_if! {
    if #[cfg(feature = "compute_parallel")] {
        pub type Transposer = compute_parallel::Transposer;
    } else if #[cfg(feature = "compute_block")] {
        pub type Transposer = compute_block::Transposer;
    } else if #[cfg(any(feature = "compute_naive", test))] {
        pub type Transposer = compute_naive::Transposer;
    } else {
        // If no backend was specified, use a backend skeleton that throws a
        // minimal number of compiler errors.
        use compute::{tile::TileError, NoArgs, Transpose, TransposeBase, TransposeCreate};
        use data::Precision;
        //
        pub struct Transposer;
        //
        impl TransposeBase for Transposer {
            type CliArgs = NoArgs;

            type Error = TileError;
        }
        //
        impl TransposeCreate for Transposer {
            fn new(_args: NoArgs) -> Result<Self, TileError> {
                std::compile_error!("Please enable at least one compute backend via crate features")
            }
        }
        //
        impl Transpose for Transposer {
            fn transpose_in_place(
                &self,
                _block: &mut [Precision],
                _side: usize
            ) -> Result<(), TileError> {
                Ok(())
            }
        }
    }
}
