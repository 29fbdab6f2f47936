//! Result persistence
//!
//! For every processed axis a job directory receives:
//! - `<base>[-<axis>].png`: the rendered plot
//! - `<base>[-<axis>].processed.chunksz-<c>.tsv`: one tab-separated row of
//!   magnitudes per chunk (`NaN` for padding)

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::spectrum::Spectrum;

/// Extension of coefficient tables
pub const TABLE_EXTENSION: &str = "tsv";

/// Marker between the base name and the chunk size in table file names
pub const TABLE_MARKER: &str = ".processed.";

/// Persistence errors
#[derive(Debug, Error)]
pub enum PersistError {
    /// The job directory is gone (job removed or identity swept)
    #[error("output directory {path} does not exist")]
    MissingDir { path: PathBuf },

    #[error("could not save plot {path}: {source}")]
    Image {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write output data file {path}: {source}")]
    Table { path: PathBuf, source: csv::Error },
}

/// Files written for one axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub image: PathBuf,
    pub table: PathBuf,
}

/// Receives the results of one processed axis
pub trait ResultSink: Send + Sync {
    fn persist(
        &self,
        dir: &Path,
        base: &str,
        axis: &str,
        spectrum: &Spectrum,
        image: &[u8],
    ) -> Result<Artifacts, PersistError>;
}

/// Writes images and coefficient tables into an existing job directory
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectorySink;

/// File stem for an axis: `<base>` or `<base>-<axis>`
pub fn axis_stem(base: &str, axis: &str) -> String {
    if axis.is_empty() {
        base.to_string()
    } else {
        format!("{}-{}", base, axis)
    }
}

/// Table file name for an axis
pub fn table_name(base: &str, axis: &str, chunk_size: usize) -> String {
    format!(
        "{}{}chunksz-{}.{}",
        axis_stem(base, axis),
        TABLE_MARKER,
        chunk_size,
        TABLE_EXTENSION
    )
}

/// Uploaded file name without the browser `C:\fakepath\` prefix and
/// directory components
pub fn upload_name(file_name: &str) -> &str {
    let name = file_name
        .strip_prefix(r"C:\fakepath\")
        .unwrap_or(file_name);
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Base name of an uploaded file: see [`upload_name`], extension dropped.
pub fn base_name(file_name: &str) -> String {
    let name = upload_name(file_name);
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    };
    if stem.is_empty() || stem == "." || stem == ".." {
        "upload".to_string()
    } else {
        stem.to_string()
    }
}

impl ResultSink for DirectorySink {
    fn persist(
        &self,
        dir: &Path,
        base: &str,
        axis: &str,
        spectrum: &Spectrum,
        image: &[u8],
    ) -> Result<Artifacts, PersistError> {
        // Job directories are owned by the session store, never created here.
        if !dir.is_dir() {
            warn!(path = %dir.display(), "output directory vanished, dropping results");
            return Err(PersistError::MissingDir {
                path: dir.to_path_buf(),
            });
        }

        let image_path = dir.join(format!("{}.png", axis_stem(base, axis)));
        fs::write(&image_path, image).map_err(|source| {
            warn!(path = %image_path.display(), error = %source, "could not save plot file");
            PersistError::Image {
                path: image_path.clone(),
                source,
            }
        })?;

        let table_path = dir.join(table_name(base, axis, spectrum.chunk_size));
        write_table(&table_path, &spectrum.coeffs).map_err(|source| {
            warn!(path = %table_path.display(), error = %source, "could not write output data file");
            PersistError::Table {
                path: table_path.clone(),
                source,
            }
        })?;

        debug!(image = %image_path.display(), table = %table_path.display(), "results saved");
        Ok(Artifacts {
            image: image_path,
            table: table_path,
        })
    }
}

fn write_table(path: &Path, rows: &[Vec<f64>]) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)?;
    for row in rows {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}
