//! Whitespace-delimited numeric column export.
//!
//! The format the solver reads pulse files in and the CLI dumps grids in:
//! one row per line, columns separated by a single space, fixed precision
//! scientific notation.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Write equal-length float columns to `path`.
///
/// All columns are truncated to the shortest one.
pub fn write_columns(path: &Path, columns: &[&[f64]], precision: usize) -> io::Result<()> {
    let rows = columns.iter().map(|c| c.len()).min().unwrap_or(0);
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    for i in 0..rows {
        for (k, col) in columns.iter().enumerate() {
            if k > 0 {
                write!(w, " ")?;
            }
            write!(w, "{:.*e}", precision, col[i])?;
        }
        writeln!(w)?;
    }
    w.flush()
}
