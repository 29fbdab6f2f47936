//! # FourAcc Common Library
//!
//! Shared core of the FourAcc services: windowed frequency analysis of
//! acceleration recordings.
//!
//! - [`msr`] parses MSR sectioned sensor logs, [`load`] plain series
//! - [`spectrum`] computes the chunked magnitude spectrum of one channel
//! - [`dispatch`] processes every channel of a recording concurrently
//! - [`session`] keeps per-client jobs and their result directories
//! - [`plot`] and [`persist`] render and store the results

pub mod config;
pub mod dispatch;
pub mod error;
pub mod load;
pub mod msr;
pub mod persist;
pub mod plot;
pub mod recording;
pub mod session;
pub mod spectrum;

pub use error::{Error, Result};
