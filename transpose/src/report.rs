//! Console output

use data::Precision;
use ndarray::ArrayView2;
use std::io::{self, Write};

/// Print a titled matrix, one row per line
pub fn print_matrix(
    out: &mut impl Write,
    title: &str,
    matrix: ArrayView2<'_, Precision>,
) -> io::Result<()> {
    writeln!(out, "{title}")?;
    for row in matrix.rows() {
        for elem in row {
            write!(out, "{elem:5.3} ")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
