//! Uploaded recordings: generic series or MSR sectioned logs

use crate::load::load_series;
use crate::msr::{self, MsrFile};
use crate::Result;

/// Bytes sniffed to detect the input format
pub const HEADER_LEN: usize = 64;

const MSR_MAGIC: &[u8] = b"*CREATOR";

/// Single-channel recording with a synthetic index axis
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

/// A fully buffered input recording
#[derive(Debug, Clone, PartialEq)]
pub enum Recording {
    Series(Series),
    Sectioned(MsrFile),
}

/// Whether the stream starts like an MSR file
pub fn is_sectioned(data: &[u8]) -> bool {
    let head = &data[..data.len().min(HEADER_LEN)];
    head.starts_with(MSR_MAGIC)
}

impl Recording {
    /// Parses `data`, choosing the MSR parser when the header says so.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if is_sectioned(data) {
            let file = msr::parse(data)?;
            tracing::debug!(samples = file.len(), "loaded MSR recording");
            return Ok(Recording::Sectioned(file));
        }
        let (xs, ys) = load_series(data)?;
        tracing::debug!(samples = ys.len(), "loaded generic series");
        Ok(Recording::Series(Series { xs, ys }))
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        match self {
            Recording::Series(series) => series.ys.len(),
            Recording::Sectioned(file) => file.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_msr_header() {
        assert!(is_sectioned(b"*CREATOR\nMSR\n"));
        assert!(!is_sectioned(b"1.0\n2.0\n"));
        assert!(!is_sectioned(b""));
    }

    #[test]
    fn test_generic_series_from_bytes() {
        let rec = Recording::from_bytes(b"0\n1\n2\n").unwrap();
        assert_eq!(rec.len(), 3);
        assert!(matches!(rec, Recording::Series(_)));
    }

    #[test]
    fn test_malformed_msr_is_error() {
        let err = Recording::from_bytes(b"*CREATOR\nx\n*STARTTIME\nnot a date\n").unwrap_err();
        assert!(matches!(err, crate::Error::Parse(_)));
    }
}
