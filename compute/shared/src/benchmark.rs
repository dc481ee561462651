//! Benchmarking utilities
//!
//! Please consider using the macros provided by this crate instead of calling
//! these implementation details directly.

use crate::Transpose;
use clap::{Args, Command, FromArgMatches};
use criterion::{BenchmarkId, Criterion, Throughput};
use data::Precision;
use std::{hint::black_box, sync::Once};

/// Re-export criterion for the criterion_benchmark macro
pub use criterion;

// Make sure env_logger is only initialized once
fn init_logger() {
    static INIT_LOGGER: Once = Once::new();
    INIT_LOGGER.call_once(env_logger::init);
}

/// Common criterion benchmark for all local transpose backends
/// Use via the criterion_benchmark macro
pub fn criterion_benchmark<Transposer: Transpose>(c: &mut Criterion, backend_name: &str) {
    init_logger();

    let args = Transposer::CliArgs::from_arg_matches(
        &Transposer::CliArgs::augment_args(Command::default().no_binary_name(true))
            .get_matches_from(None::<&str>),
    )
    .expect("Failed to parse arguments from defaults & environment");
    let transposer = Transposer::new(black_box(args)).unwrap();

    let mut group = c.benchmark_group(backend_name.to_owned());
    for side_pow2 in 5..=11 {
        let side = 2usize.pow(side_pow2);
        let mut block = (0..side * side)
            .map(|idx| idx as Precision)
            .collect::<Vec<_>>();

        group.throughput(Throughput::Elements((side * side) as u64));
        group.bench_function(
            BenchmarkId::from_parameter(format!("{side}x{side}elems,full")),
            |b| {
                b.iter(|| transposer.transpose_in_place(&mut block, side).unwrap());
            },
        );
        group.bench_function(
            BenchmarkId::from_parameter(format!("{side}x{side}elems,tiles")),
            |b| {
                b.iter(|| transposer.transpose_tiles_in_place(&mut block, side).unwrap());
            },
        );
        black_box(block);
    }
    group.finish();
}
