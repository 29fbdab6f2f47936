//! Chunked frequency decomposition
//!
//! A series is cut into consecutive chunks of a fixed size and each chunk is
//! turned into a magnitude spectrum, giving a time × frequency grid.
//!
//! Grid layout for a series of length `L` and chunk size `c`:
//! - `⌈L/c⌉` rows, one per chunk
//! - `⌊c/2⌋` columns: magnitudes of bins `1..=⌊c/2⌋` (the DC bin is dropped)
//! - a short final chunk of length `m` fills its first `⌊m/2⌋` columns and
//!   the rest is NaN

use num_complex::Complex;
use rustfft::FftPlanner;
use thiserror::Error;

/// Decomposition errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpectrumError {
    #[error("chunk size must be positive")]
    ZeroChunkSize,

    #[error("empty series")]
    EmptySeries,

    #[error("axis length mismatch (x={xs}, y={ys})")]
    LengthMismatch { xs: usize, ys: usize },
}

/// Result of the chunked decomposition of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Display name (file name, with the axis when relevant)
    pub name: String,
    /// Original x-axis
    pub xs: Vec<f64>,
    /// Original samples
    pub ys: Vec<f64>,
    /// x-value of the first sample of every chunk
    pub chunk_axis: Vec<f64>,
    /// Frequency of bins `0..⌊c/2⌋`, in Hz when the sampling frequency is
    /// known, in cycles per sample otherwise
    pub freqs: Vec<f64>,
    /// Magnitudes, one row per chunk
    pub coeffs: Vec<Vec<f64>>,
    pub chunk_size: usize,
    /// Sampling frequency used to scale `freqs`
    pub scale: Option<f64>,
}

impl Spectrum {
    /// (chunks, frequency bins)
    pub fn dims(&self) -> (usize, usize) {
        (self.coeffs.len(), self.chunk_size / 2)
    }

    pub fn z(&self, chunk: usize, bin: usize) -> f64 {
        self.coeffs[chunk][bin]
    }
}

/// Frequency axis for a chunk size, independent of the series it is used on
pub fn frequency_axis(chunk_size: usize, scale: f64) -> Vec<f64> {
    let n = chunk_size as f64;
    (0..chunk_size / 2).map(|k| k as f64 / n * scale).collect()
}

/// Decomposes `ys` in chunks of `chunk_size` samples.
///
/// `freq` is the sampling frequency in Hz; `None` (or a non-positive value)
/// reports frequencies in cycles per sample.
pub fn chunked_fft(
    name: &str,
    chunk_size: usize,
    xs: &[f64],
    ys: &[f64],
    freq: Option<f64>,
) -> Result<Spectrum, SpectrumError> {
    if chunk_size == 0 {
        return Err(SpectrumError::ZeroChunkSize);
    }
    if ys.is_empty() {
        return Err(SpectrumError::EmptySeries);
    }
    if xs.len() != ys.len() {
        return Err(SpectrumError::LengthMismatch {
            xs: xs.len(),
            ys: ys.len(),
        });
    }

    let scale = freq.filter(|f| f.is_finite() && *f > 0.0);
    let width = chunk_size / 2;
    let rows = ys.len().div_ceil(chunk_size);

    let mut planner = FftPlanner::<f64>::new();
    let mut buf: Vec<Complex<f64>> = Vec::with_capacity(chunk_size);
    let mut chunk_axis = Vec::with_capacity(rows);
    let mut coeffs = Vec::with_capacity(rows);

    for (i, chunk) in ys.chunks(chunk_size).enumerate() {
        let fft = planner.plan_fft_forward(chunk.len());
        buf.clear();
        buf.extend(chunk.iter().map(|&v| Complex::new(v, 0.0)));
        fft.process(&mut buf);

        let bins = chunk.len() / 2;
        let mut row = Vec::with_capacity(width);
        row.extend(buf[1..=bins].iter().map(|c| c.norm()));
        row.resize(width, f64::NAN);

        chunk_axis.push(xs[i * chunk_size]);
        coeffs.push(row);
    }

    Ok(Spectrum {
        name: name.to_string(),
        xs: xs.to_vec(),
        ys: ys.to_vec(),
        chunk_axis,
        freqs: frequency_axis(chunk_size, scale.unwrap_or(1.0)),
        coeffs,
        chunk_size,
        scale,
    })
}
