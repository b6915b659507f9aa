//! Distribution summaries over per-target distance samples.
//!
//! Either an empirical CDF or a fitted Gamma distribution, sampled at the
//! integer distances between the smallest and largest observation.

mod freq;
mod gamma;
mod special;

use thiserror::Error;

pub use freq::*;
pub use gamma::*;
pub use special::*;

/// Statistical errors.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("invalid data set: {0}")]
    InvalidDataSet(String),
    #[error("unexpected statistical failure: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, StatsError>;
