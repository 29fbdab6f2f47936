//! Generic series loader
//!
//! Reads comma-separated data of the form `([time series,] amplitude)`.
//! Only the amplitude is kept; the x-axis is the synthetic sample index.

use std::io::Read;

use thiserror::Error;

/// Generic series load errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read rows: {0}")]
    Read(#[from] csv::Error),

    #[error("could not scan row {row}: invalid value {value:?}")]
    Value { row: usize, value: String },

    #[error("row {row} has no value")]
    Empty { row: usize },
}

/// Loads a one- or two-column series.
///
/// Returns `(xs, ys)` where `xs` is `0..n` and `ys` the amplitudes (the only
/// column, or the second one when there are two or more).
pub fn load_series<R: Read>(reader: R) -> Result<(Vec<f64>, Vec<f64>), LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let field = match record.len() {
            0 => return Err(LoadError::Empty { row }),
            1 => &record[0],
            _ => &record[1],
        };
        if field.is_empty() && record.len() == 1 {
            continue;
        }
        let value: f64 = field.parse().map_err(|_| LoadError::Value {
            row,
            value: field.to_string(),
        })?;
        xs.push(xs.len() as f64);
        ys.push(value);
    }

    Ok((xs, ys))
}
