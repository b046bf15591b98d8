use crate::Error;
use serde::{Deserialize, Serialize};

/// Centimetres per inch, used to convert the rate limits for metric series
pub const CM_PER_INCH: f64 = 2.54;

/// Thresholds and behaviour for cleaning one kind of snow series.
///
/// Rate limits and `threshold_inches` are expressed in inches; use [`FilterConfig::scaled`] to
/// get a working copy for series reported in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Display threshold for callers. Not used by the cleaning checks themselves.
    pub threshold_inches: f64,
    /// Largest plausible increase per hour between two valid readings
    pub max_positive_change_per_hour: f64,
    /// Largest plausible decrease per hour between two valid readings
    pub max_negative_change_per_hour: f64,
    /// Number of neighbouring readings the IQR check looks at, centred on the reading being
    /// checked
    pub window_size: usize,
    /// Multiplier of the IQR added above Q3 to get the upper fence
    pub upper_iqr_multiplier: f64,
    /// Multiplier of the IQR subtracted below Q1 to get the lower fence
    pub lower_iqr_multiplier: f64,
    /// Whether readings repeating any other reading in the series are removed
    pub apply_identical_check: bool,
}

/// Preset for total snow depth.
///
/// A snow pack grows slowly outside of storms but can shrink quickly through melt, settling and
/// wind scour. A depth sensor reporting the exact same value more than once is assumed to be
/// stuck.
pub const TOTAL_DEPTH_CONFIG: FilterConfig = FilterConfig {
    threshold_inches: 1.0,
    max_positive_change_per_hour: 4.0,
    max_negative_change_per_hour: 10.0,
    window_size: 24,
    upper_iqr_multiplier: 1.0,
    lower_iqr_multiplier: 2.0,
    apply_identical_check: true,
};

/// Preset for 24 hour new snow accumulation.
///
/// Accumulation repeats naturally and drops back sharply when the 24 hour window rolls past a
/// storm, so repeats are kept and decreases are tolerated far more than for total depth.
pub const ACCUMULATION_24H_CONFIG: FilterConfig = FilterConfig {
    threshold_inches: 1.0,
    max_positive_change_per_hour: 4.0,
    max_negative_change_per_hour: 30.0,
    window_size: 24,
    upper_iqr_multiplier: 2.0,
    lower_iqr_multiplier: 1.0,
    apply_identical_check: false,
};

impl FilterConfig {
    /// Copy of this config with rate limits and threshold converted from inches to centimetres
    pub fn to_metric(&self) -> Self {
        Self {
            threshold_inches: self.threshold_inches * CM_PER_INCH,
            max_positive_change_per_hour: self.max_positive_change_per_hour * CM_PER_INCH,
            max_negative_change_per_hour: self.max_negative_change_per_hour * CM_PER_INCH,
            ..*self
        }
    }

    /// The config to clean with, given the units of the series
    pub fn scaled(&self, is_metric: bool) -> Self {
        if is_metric {
            self.to_metric()
        } else {
            *self
        }
    }

    /// Check the config is usable.
    ///
    /// ## Errors
    ///
    /// - `window_size` is 0
    /// - a rate limit or IQR multiplier is negative or not finite
    pub fn validate(&self) -> Result<(), Error> {
        if self.window_size == 0 {
            return Err(Error::InvalidArg(
                "window_size".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            (
                "max_positive_change_per_hour",
                self.max_positive_change_per_hour,
            ),
            (
                "max_negative_change_per_hour",
                self.max_negative_change_per_hour,
            ),
            ("upper_iqr_multiplier", self.upper_iqr_multiplier),
            ("lower_iqr_multiplier", self.lower_iqr_multiplier),
        ] {
            if !value.is_finite() || value < 0. {
                return Err(Error::InvalidArg(
                    name.to_string(),
                    format!("must be a finite, non-negative number, got {value}"),
                ));
            }
        }

        Ok(())
    }
}
