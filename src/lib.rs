//! Cleaning and accumulation of automated snow depth observations.
//!
//! Raw snow depth sensors get stuck, jump and drift. [`SnowFilter::filter_outliers`] removes
//! readings that look like sensor artifacts, using one of the presets [`TOTAL_DEPTH_CONFIG`] or
//! [`ACCUMULATION_24H_CONFIG`]. The cleaned depth series can then be summed into new snow with
//! [`accumulate_snow_depth`].

use thiserror::Error;

mod accumulation;
pub use accumulation::{
    accumulate_precipitation, accumulate_snow_depth, PrecipitationAccumulation,
    PrecipitationReading, SnowAccumulation,
};

mod cache;
pub use cache::DEFAULT_CACHE_CAPACITY;

pub mod checks;

mod config;
pub use config::{FilterConfig, ACCUMULATION_24H_CONFIG, CM_PER_INCH, TOTAL_DEPTH_CONFIG};

mod filter;
pub use filter::{clean_series, Outcome, SnowFilter, Stage, Status};

mod util;
pub use util::{DataPoint, Flag, RawValue, Timestamp};

/// Error type for snowclean
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// An argument has an invalid value
    #[error("argument {0} does not have a valid value: {1}")]
    InvalidArg(String, String),
    /// A timestamp could not be parsed
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(String),
}
