/// Checks that operate on single timeseries.
pub mod series;
