//! Common error types for FourAcc

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::load::LoadError;
use crate::msr::ParseError;
use crate::persist::PersistError;
use crate::plot::RenderError;
use crate::session::SessionError;
use crate::spectrum::SpectrumError;

/// Common result type for FourAcc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type shared by the server and the command line front end
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sectioned sensor-log could not be parsed
    #[error("could not parse MSR file: {0}")]
    Parse(#[from] ParseError),

    /// Generic series could not be loaded
    #[error("could not load input file: {0}")]
    Load(#[from] LoadError),

    /// Degenerate decomposition input
    #[error("could not compute spectrum: {0}")]
    Spectrum(#[from] SpectrumError),

    /// Per-axis processing failed
    #[error("could not process recording: {0}")]
    Dispatch(#[from] DispatchError),

    /// Session or job lookup failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Results could not be written
    #[error("could not persist results: {0}")]
    Persist(#[from] PersistError),

    /// Plot could not be rendered
    #[error("could not plot spectrum: {0}")]
    Render(#[from] RenderError),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
