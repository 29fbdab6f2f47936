//! fouracc - chunked FFT analysis of one acceleration file
//!
//! **Usage:**
//! ```bash
//! fouracc [--chunks N] [--out-dir DIR] [--index-axis] FILE
//! ```
//!
//! Writes `out.png` (generic series) or `out-x.png`, `out-y.png`, `out-z.png`
//! (sectioned logs) together with the coefficient table of each axis.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use fouracc_common::dispatch::{Dispatcher, JobTarget, ProcessParams, XAxis};
use fouracc_common::recording::Recording;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stem of the files written by the command
const OUTPUT_BASE: &str = "out";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "fouracc")]
#[command(about = "Runs a FFT analysis on an MSR acceleration file")]
#[command(version)]
struct Args {
    /// Chunk size of the Fourier processing
    #[arg(long, default_value_t = 256)]
    chunks: usize,

    /// Directory receiving the plots and tables
    #[arg(long, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Plot sectioned logs against the sample index instead of elapsed time
    #[arg(long)]
    index_axis: bool,

    /// Recording to analyse
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

impl Args {
    fn params(&self) -> ProcessParams {
        ProcessParams {
            x_axis: if self.index_axis { XAxis::Index } else { XAxis::Elapsed },
            ..ProcessParams::new(self.chunks)
        }
    }

    fn target(&self) -> JobTarget {
        let mut target = JobTarget::new(self.out_dir.clone(), display_name(&self.file));
        target.base = OUTPUT_BASE.to_string();
        target
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    info!("chunk size: {}", args.chunks);
    info!("file:       {}", args.file.display());

    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("could not read {}", args.file.display()))?;
    let recording = Recording::from_bytes(&data).context("could not load input file")?;
    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("could not create output directory {}", args.out_dir.display()))?;
    info!("data: {}", recording.len());

    let outcomes = Dispatcher::default()
        .run(&recording, &args.target(), &args.params())
        .await
        .context("could not process data")?;

    for outcome in &outcomes {
        info!(
            "{}: {} chunks -> {}, {}",
            if outcome.label.is_empty() { "data" } else { &outcome.label },
            outcome.chunks,
            outcome.artifacts.image.display(),
            outcome.artifacts.table.display()
        );
    }
    Ok(())
}
