//! MSR sectioned sensor-log files
//!
//! MSR acceleration sensors export their recordings as text files made of
//! `*SECTION` blocks of semicolon-delimited fields. [`parse`] turns such a
//! stream into an [`MsrFile`]: a start instant plus typed columns, column 0
//! always being the time axis.

mod parser;

use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;

pub use parser::{parse, ParseError, Section, SyntaxError};

/// Channel name of the x acceleration axis
pub const ACC_X: &str = "ACC x";
/// Channel name of the y acceleration axis
pub const ACC_Y: &str = "ACC y";
/// Channel name of the z acceleration axis
pub const ACC_Z: &str = "ACC z";

/// Name given to the time column (`TIME` in the file is normalized to this)
pub const TIME_COLUMN: &str = "Time";

/// A parsed MSR recording
#[derive(Debug, Clone, PartialEq)]
pub struct MsrFile {
    /// Reference instant from `*STARTTIME`
    pub start: NaiveDateTime,
    /// Columns in file order; column 0 holds timestamps
    pub columns: Vec<Column>,
}

/// One column of an MSR recording with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Display name from `*CHANNEL`
    pub name: String,
    /// Unit from `*UNIT` (empty for the time column)
    pub unit: String,
    /// Sensor name from `*MODUL`
    pub sensor: String,
    /// Acquisition delay from `*TIMEDELAY`
    pub time_delay: Duration,
    pub data: ColumnData,
}

impl Column {
    pub(crate) fn new(sensor: &str, data: ColumnData) -> Self {
        Self {
            name: String::new(),
            unit: String::new(),
            sensor: sensor.to_string(),
            time_delay: Duration::ZERO,
            data,
        }
    }
}

/// Kind of values a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Timestamps,
    Numeric,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Timestamps => f.write_str("timestamps"),
            ColumnKind::Numeric => f.write_str("numeric values"),
        }
    }
}

/// Column values; the variant is fixed when `*MODUL` declares the column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Timestamps(Vec<NaiveDateTime>),
    Numeric(Vec<f64>),
}

/// Returned when a column is accessed as the wrong kind
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("column {name:?} holds {actual}, not {expected}")]
pub struct ColumnKindError {
    pub name: String,
    pub expected: ColumnKind,
    pub actual: ColumnKind,
}

impl ColumnData {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Timestamps(_) => ColumnKind::Timestamps,
            ColumnData::Numeric(_) => ColumnKind::Numeric,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Timestamps(ts) => ts.len(),
            ColumnData::Numeric(vs) => vs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Column {
    /// Timestamps of this column, or a kind error for numeric columns
    pub fn timestamps(&self) -> Result<&[NaiveDateTime], ColumnKindError> {
        match &self.data {
            ColumnData::Timestamps(ts) => Ok(ts),
            other => Err(self.kind_error(ColumnKind::Timestamps, other.kind())),
        }
    }

    /// Numeric values of this column, or a kind error for the time column
    pub fn values(&self) -> Result<&[f64], ColumnKindError> {
        match &self.data {
            ColumnData::Numeric(vs) => Ok(vs),
            other => Err(self.kind_error(ColumnKind::Numeric, other.kind())),
        }
    }

    fn kind_error(&self, expected: ColumnKind, actual: ColumnKind) -> ColumnKindError {
        ColumnKindError {
            name: self.name.clone(),
            expected,
            actual,
        }
    }
}

impl MsrFile {
    /// Number of samples (rows of the `*DATA` section)
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |col| col.data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample timestamps (column 0)
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        self.columns
            .first()
            .and_then(|col| col.timestamps().ok())
            .unwrap_or(&[])
    }

    /// Estimated sampling frequency in Hz.
    ///
    /// `(n - 1) / (last - first)`; `None` with fewer than two samples or a
    /// zero-length recording.
    pub fn sampling_frequency(&self) -> Option<f64> {
        let ts = self.timestamps();
        let (first, last) = (ts.first()?, ts.last()?);
        let nanos = (*last - *first).num_nanoseconds()?;
        if ts.len() < 2 || nanos <= 0 {
            return None;
        }
        let seconds = nanos as f64 * 1e-9;
        Some((ts.len() - 1) as f64 / seconds)
    }

    /// Synthetic sample index axis `0..n`
    pub fn index_axis(&self) -> Vec<f64> {
        (0..self.len()).map(|i| i as f64).collect()
    }

    /// Milliseconds elapsed since [`MsrFile::start`] for every sample.
    ///
    /// Only available when column 0 is the `Time` column.
    pub fn elapsed_axis(&self) -> Option<Vec<f64>> {
        let col = self.columns.first()?;
        if col.name != TIME_COLUMN {
            return None;
        }
        let ts = col.timestamps().ok()?;
        Some(
            ts.iter()
                .map(|t| (*t - self.start).num_milliseconds() as f64)
                .collect(),
        )
    }

    /// Column by display name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Numeric series of the named channel, `None` when absent
    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.column(name).and_then(|col| col.values().ok())
    }

    pub fn acc_x(&self) -> Option<&[f64]> {
        self.channel(ACC_X)
    }

    pub fn acc_y(&self) -> Option<&[f64]> {
        self.channel(ACC_Y)
    }

    pub fn acc_z(&self) -> Option<&[f64]> {
        self.channel(ACC_Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 5, 3)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    fn sample_file(times: Vec<NaiveDateTime>) -> MsrFile {
        let n = times.len();
        let mut time = Column::new("MSR145", ColumnData::Timestamps(times));
        time.name = TIME_COLUMN.to_string();
        let mut x = Column::new("ACC", ColumnData::Numeric(vec![1.0; n]));
        x.name = ACC_X.to_string();
        MsrFile {
            start: at(10, 0, 0, 0),
            columns: vec![time, x],
        }
    }

    #[test]
    fn test_sampling_frequency_from_first_and_last() {
        let file = sample_file((0..5).map(|i| at(10, 0, 0, i * 250)).collect());
        let freq = file.sampling_frequency().unwrap();
        assert!((freq - 4.0).abs() < 1e-9, "got {}", freq);
    }

    #[test]
    fn test_sampling_frequency_unknown_for_single_sample() {
        let file = sample_file(vec![at(10, 0, 0, 0)]);
        assert_eq!(file.sampling_frequency(), None);
    }

    #[test]
    fn test_elapsed_axis_in_milliseconds() {
        let file = sample_file(vec![at(10, 0, 0, 500), at(10, 0, 1, 0)]);
        assert_eq!(file.elapsed_axis(), Some(vec![500.0, 1000.0]));
        assert_eq!(file.index_axis(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_missing_channel_is_none() {
        let file = sample_file(vec![at(10, 0, 0, 0)]);
        assert!(file.acc_x().is_some());
        assert!(file.acc_y().is_none());
        assert!(file.acc_z().is_none());
    }

    #[test]
    fn test_wrong_kind_access() {
        let file = sample_file(vec![at(10, 0, 0, 0)]);
        let err = file.columns[0].values().unwrap_err();
        assert_eq!(err.expected, ColumnKind::Numeric);
        assert_eq!(err.actual, ColumnKind::Timestamps);
        assert!(file.channel(TIME_COLUMN).is_none());
    }
}
