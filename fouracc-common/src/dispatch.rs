//! Concurrent per-axis processing
//!
//! A recording is narrowed to the requested sample range, then every present
//! channel is decomposed, rendered and persisted as an independent blocking
//! task. All tasks are joined; the first failure observed is reported and
//! siblings already running are left to finish, so a failed call may still
//! leave artifacts of other axes on disk.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::persist::{base_name, Artifacts, DirectorySink, PersistError, ResultSink};
use crate::plot::{PlotRenderer, PngRenderer, RenderError};
use crate::recording::Recording;
use crate::spectrum::{chunked_fft, SpectrumError};

/// Axis labels of a sectioned log, in slot order
pub const AXES: [&str; 3] = ["x", "y", "z"];

/// Invalid sample range
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid data range (end={end} > len={len})")]
    EndPastLen { end: i64, len: usize },

    #[error("invalid data range (beg={beg} > end={end})")]
    BegPastEnd { beg: usize, end: i64 },

    #[error("invalid data range (beg={beg} > len={len})")]
    BegPastLen { beg: usize, len: usize },
}

/// Failure of a single axis unit
#[derive(Debug, Error)]
pub enum AxisError {
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),

    #[error("could not plot spectrum: {0}")]
    Render(#[from] RenderError),

    #[error("could not save report: {0}")]
    Persist(#[from] PersistError),
}

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not infer data slice range: {0}")]
    Range(#[from] RangeError),

    #[error(transparent)]
    Spectrum(#[from] SpectrumError),

    #[error("recording has no acceleration channel")]
    NoChannels,

    #[error("recording has no elapsed-time axis")]
    NoElapsedAxis,

    #[error("could not process axis {axis}: {source}")]
    Axis { axis: String, source: AxisError },

    #[error("axis task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Validates a `[beg, end)` sample range against a series of length `len`.
///
/// `end == -1` stands for `len`.
pub fn clean(len: usize, beg: usize, end: i64) -> Result<(usize, usize), RangeError> {
    let end = if end == -1 { len as i64 } else { end };
    let (l, b, e) = (len as i128, beg as i128, end as i128);
    if e > l {
        return Err(RangeError::EndPastLen { end, len });
    }
    if b > e {
        return Err(RangeError::BegPastEnd { beg, end });
    }
    if b > l {
        return Err(RangeError::BegPastLen { beg, len });
    }
    Ok((beg, end as usize))
}

/// x-axis used for sectioned logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XAxis {
    /// Sample index `0..n`
    #[default]
    Index,
    /// Milliseconds since the recording start
    Elapsed,
}

/// Processing parameters of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessParams {
    pub chunk_size: usize,
    /// First sample (inclusive)
    pub beg: usize,
    /// Last sample (exclusive), `-1` for the end of the series
    pub end: i64,
    pub x_axis: XAxis,
}

impl ProcessParams {
    /// Whole series with the index axis
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            beg: 0,
            end: -1,
            x_axis: XAxis::Index,
        }
    }
}

/// Where the results of a request go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTarget {
    /// Directory receiving the artifacts
    pub dir: PathBuf,
    /// Original file name, used in plot titles
    pub file_name: String,
    /// Stem of the artifact file names
    pub base: String,
}

impl JobTarget {
    /// Target whose artifacts are named after `file_name`
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            dir: dir.into(),
            base: base_name(&file_name),
            file_name,
        }
    }
}

/// Result of one processed axis
#[derive(Debug, Clone)]
pub struct AxisOutcome {
    /// `""` for a generic series, `x`/`y`/`z` for a sectioned log
    pub label: String,
    /// Rendered plot
    pub image: Vec<u8>,
    pub artifacts: Artifacts,
    /// Rows of the coefficient grid
    pub chunks: usize,
}

struct AxisUnit {
    slot: usize,
    label: &'static str,
    ys: Vec<f64>,
}

/// Runs the decomposition of every channel of a recording concurrently
#[derive(Clone)]
pub struct Dispatcher {
    renderer: Arc<dyn PlotRenderer>,
    sink: Arc<dyn ResultSink>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(PngRenderer::default()), Arc::new(DirectorySink))
    }
}

impl Dispatcher {
    pub fn new(renderer: Arc<dyn PlotRenderer>, sink: Arc<dyn ResultSink>) -> Self {
        Self { renderer, sink }
    }

    /// Processes `recording` into `target`.
    ///
    /// Outcomes are ordered by axis (x, y, z) whatever the completion order.
    pub async fn run(
        &self,
        recording: &Recording,
        target: &JobTarget,
        params: &ProcessParams,
    ) -> Result<Vec<AxisOutcome>, DispatchError> {
        if params.chunk_size == 0 {
            return Err(SpectrumError::ZeroChunkSize.into());
        }

        let (xs, freq, channels) = match recording {
            Recording::Series(series) => (series.xs.clone(), None, vec![("", Some(&series.ys[..]))]),
            Recording::Sectioned(file) => {
                let xs = match params.x_axis {
                    XAxis::Index => file.index_axis(),
                    XAxis::Elapsed => file.elapsed_axis().ok_or(DispatchError::NoElapsedAxis)?,
                };
                let channels = vec![
                    (AXES[0], file.acc_x()),
                    (AXES[1], file.acc_y()),
                    (AXES[2], file.acc_z()),
                ];
                (xs, file.sampling_frequency(), channels)
            }
        };

        let (beg, end) = clean(xs.len(), params.beg, params.end)?;
        let xs: Arc<[f64]> = Arc::from(&xs[beg..end]);

        let slots = channels.len();
        let units: Vec<AxisUnit> = channels
            .into_iter()
            .enumerate()
            .filter_map(|(slot, (label, data))| {
                data.map(|ys| AxisUnit {
                    slot,
                    label,
                    ys: ys[beg..end].to_vec(),
                })
            })
            .collect();
        if units.is_empty() {
            return Err(DispatchError::NoChannels);
        }

        let target = Arc::new(target.clone());
        let mut set = JoinSet::new();
        for unit in units {
            let renderer = Arc::clone(&self.renderer);
            let sink = Arc::clone(&self.sink);
            let xs = Arc::clone(&xs);
            let target = Arc::clone(&target);
            let chunk_size = params.chunk_size;
            set.spawn_blocking(move || {
                let outcome = process_axis(
                    renderer.as_ref(),
                    sink.as_ref(),
                    &target,
                    unit.label,
                    chunk_size,
                    &xs,
                    &unit.ys,
                    freq,
                );
                (unit.slot, unit.label, outcome)
            });
        }

        let mut results: Vec<Option<AxisOutcome>> = (0..slots).map(|_| None).collect();
        let mut first_err = None;
        while let Some(joined) = set.join_next().await {
            let err = match joined {
                Ok((slot, _, Ok(outcome))) => {
                    results[slot] = Some(outcome);
                    continue;
                }
                Ok((_, label, Err(source))) => {
                    warn!(axis = label, error = %source, "axis processing failed");
                    DispatchError::Axis {
                        axis: label.to_string(),
                        source,
                    }
                }
                Err(join) => {
                    warn!(error = %join, "axis task did not complete");
                    DispatchError::Join(join)
                }
            };
            if first_err.is_none() {
                first_err = Some(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(results.into_iter().flatten().collect()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn process_axis(
    renderer: &dyn PlotRenderer,
    sink: &dyn ResultSink,
    target: &JobTarget,
    label: &str,
    chunk_size: usize,
    xs: &[f64],
    ys: &[f64],
    freq: Option<f64>,
) -> Result<AxisOutcome, AxisError> {
    let name = if label.is_empty() {
        target.file_name.clone()
    } else {
        format!("{} [axis={}]", target.file_name, label)
    };
    info!("processing {:?}...", name);

    let spectrum = chunked_fft(&name, chunk_size, xs, ys, freq)?;
    let image = renderer.render(&spectrum)?;
    let artifacts = sink.persist(&target.dir, &target.base, label, &spectrum, &image)?;

    info!("processing {:?}... [done]", name);
    Ok(AxisOutcome {
        label: label.to_string(),
        image,
        artifacts,
        chunks: spectrum.coeffs.len(),
    })
}
