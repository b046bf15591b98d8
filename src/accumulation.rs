//! Running totals derived from cleaned series

use crate::util::{normalize, DataPoint, RawValue, Timestamp};
use serde::{Deserialize, Serialize};

/// One step of [`accumulate_snow_depth`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowAccumulation {
    /// Time of the depth reading
    pub timestamp: Timestamp,
    /// Snow depth at this step, `None` if missing or not a number
    pub depth: Option<f64>,
    /// Increase in depth since the previous valid depth, never negative
    pub new_snow: f64,
    /// Sum of `new_snow` up to and including this step
    pub snow_total: f64,
}

/// A precipitation reading as delivered upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationReading {
    /// Time of the reading
    pub timestamp: Timestamp,
    /// Precipitation as received, possibly text or missing
    pub value: RawValue,
}

/// One step of [`accumulate_precipitation`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationAccumulation {
    /// Time of the reading
    pub timestamp: Timestamp,
    /// Precipitation in this step, `None` if it was missing or not a number
    pub value: Option<f64>,
    /// Sum of precipitation up to and including this step
    pub running_total: f64,
}

/// Turn a chronological depth series into new snow per step and a running total.
///
/// New snow is the increase in depth since the previous reading, with decreases (melt,
/// settling) counted as zero, so the total only ever grows. The first reading has no predecessor
/// and contributes zero. A missing depth contributes zero and does not move the baseline, so the
/// next valid reading is compared against the last valid one.
///
/// No cleaning is done here, feed it the output of [`crate::SnowFilter::filter_outliers`].
/// Callers wanting "new snow in the last 24 hours" read `snow_total` of the last element.
pub fn accumulate_snow_depth(points: &[DataPoint]) -> Vec<SnowAccumulation> {
    let mut snow_total = 0.;
    let mut previous: Option<f64> = None;

    points
        .iter()
        .map(|point| {
            let depth = normalize(point.value);

            let new_snow = match (previous, depth) {
                (Some(previous), Some(depth)) => (depth - previous).max(0.),
                _ => 0.,
            };
            if depth.is_some() {
                previous = depth;
            }
            snow_total += new_snow;

            SnowAccumulation {
                timestamp: point.timestamp,
                depth,
                new_snow,
                snow_total,
            }
        })
        .collect()
}

/// Sum precipitation over a series, keeping the running total at each step.
///
/// Values that are missing or don't parse as a number count as zero.
pub fn accumulate_precipitation(
    points: &[PrecipitationReading],
) -> Vec<PrecipitationAccumulation> {
    let mut running_total = 0.;

    points
        .iter()
        .map(|point| {
            let value = point.value.to_value();
            running_total += value.unwrap_or(0.);

            PrecipitationAccumulation {
                timestamp: point.timestamp,
                value,
                running_total,
            }
        })
        .collect()
}
