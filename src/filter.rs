//! The full cleaning pipeline, with memoization

use crate::{
    cache::{FifoCache, IqrKey, PipelineKey, DEFAULT_CACHE_CAPACITY},
    checks::series::{identical_value_check, iqr_check, rate_of_change_check},
    config::FilterConfig,
    util::{apply_flags, normalize, DataPoint, Timestamp},
    Error, Flag,
};
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// The pipeline stage that removed a value
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Stage {
    /// [`identical_value_check`]
    IdenticalValue,
    /// [`iqr_check`]
    Iqr,
    /// [`rate_of_change_check`]
    RateOfChange,
}

/// What happened to one reading in the pipeline
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The value made it through every stage
    Kept,
    /// The value was missing (or not a number) to begin with
    Missing,
    /// The value was removed by a stage
    Rejected(Stage),
}

/// Per reading result of [`SnowFilter::explain`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Time of the reading
    pub timestamp: Timestamp,
    /// The value before cleaning, `None` if missing or not a number
    pub value: Option<f64>,
    /// Whether the reading was kept, and if not why
    pub status: Status,
}

/// Cleans snow series, remembering results so repeated requests for the same series are cheap.
///
/// Holds two caches: one for the IQR stage alone and one for the whole pipeline. Both are behind
/// a mutex, so a `SnowFilter` can be shared between threads. The caches never change results, and
/// can be cleared at any time with [`SnowFilter::clear_caches`].
#[derive(Debug)]
pub struct SnowFilter {
    pipeline_cache: Mutex<FifoCache<PipelineKey, Vec<Option<f64>>>>,
    iqr_cache: Mutex<FifoCache<IqrKey, Vec<Option<f64>>>>,
}

impl Default for SnowFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SnowFilter {
    /// Create a filter holding up to [`DEFAULT_CACHE_CAPACITY`] results in each cache
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a filter whose caches each hold up to `capacity` results. Once full, the oldest
    /// result is dropped to make room. A capacity of 0 turns off caching altogether.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pipeline_cache: Mutex::new(FifoCache::new("pipeline", Some(capacity))),
            iqr_cache: Mutex::new(FifoCache::new("iqr", Some(capacity))),
        }
    }

    /// Remove sensor artifacts from a snow series.
    ///
    /// Points are sorted by timestamp (stable, so ties keep their order), then run through
    /// - [`identical_value_check`], if `config.apply_identical_check` is set
    /// - [`iqr_check`]
    /// - [`rate_of_change_check`]
    ///
    /// in that order, each stage seeing the values left by the one before. Any value failing a
    /// stage is set to `None`. The result has one point per input point, in chronological order,
    /// with timestamps and series ids unchanged. Values are only ever removed, never added or
    /// altered, and NaN or infinite values are treated as missing.
    ///
    /// If `is_metric` is set, the series is taken to be in centimetres and the rate limits in
    /// `config` are converted from inches before use.
    ///
    /// ## Errors
    ///
    /// - `config` is invalid, see [`FilterConfig::validate`]
    pub fn filter_outliers(
        &self,
        points: &[DataPoint],
        config: &FilterConfig,
        is_metric: bool,
    ) -> Result<Vec<DataPoint>, Error> {
        config.validate()?;

        let sorted = sort_points(points);
        let (timestamps, values) = split_points(&sorted);

        let key = PipelineKey::new(&timestamps, &values, config, is_metric);
        let mut cache = lock(&self.pipeline_cache);

        let cleaned = match cache.get(&key) {
            Some(cleaned) => cleaned,
            None => {
                let cleaned = run_pipeline(
                    &timestamps,
                    &values,
                    &config.scaled(is_metric),
                    |t, v, c| self.cached_iqr(t, v, c),
                )?;
                cache.insert(key, cleaned.clone());
                cleaned
            }
        };

        Ok(with_values(sorted, cleaned))
    }

    /// Run only the IQR stage over a series, without identical value suppression or rate
    /// limiting.
    ///
    /// ## Errors
    ///
    /// - `config` is invalid, see [`FilterConfig::validate`]
    pub fn filter_iqr(
        &self,
        points: &[DataPoint],
        config: &FilterConfig,
    ) -> Result<Vec<DataPoint>, Error> {
        config.validate()?;

        let sorted = sort_points(points);
        let (timestamps, values) = split_points(&sorted);
        let cleaned = self.cached_iqr(&timestamps, &values, config)?;

        Ok(with_values(sorted, cleaned))
    }

    /// Report, for each point of a series, whether [`SnowFilter::filter_outliers`] keeps it and
    /// if not, which stage removes it.
    ///
    /// Results are in chronological order, like [`SnowFilter::filter_outliers`]. This always
    /// recomputes, the caches are neither read nor written.
    ///
    /// ## Errors
    ///
    /// - `config` is invalid, see [`FilterConfig::validate`]
    pub fn explain(
        &self,
        points: &[DataPoint],
        config: &FilterConfig,
        is_metric: bool,
    ) -> Result<Vec<Outcome>, Error> {
        config.validate()?;
        let config = config.scaled(is_metric);

        let sorted = sort_points(points);
        let (_, values) = split_points(&sorted);

        let identical_flags = if config.apply_identical_check {
            identical_value_check(&values)
        } else {
            values
                .iter()
                .map(|v| if v.is_some() { Flag::Pass } else { Flag::DataMissing })
                .collect()
        };
        let after_identical = apply_flags(&values, &identical_flags);

        let iqr_flags = iqr_check(
            &after_identical,
            config.window_size,
            config.upper_iqr_multiplier,
            config.lower_iqr_multiplier,
        )?;
        let after_iqr = apply_flags(&after_identical, &iqr_flags);

        let rate_flags = rate_of_change_check(
            &after_iqr,
            config.max_positive_change_per_hour,
            config.max_negative_change_per_hour,
        );

        Ok(sorted
            .iter()
            .enumerate()
            .map(|(i, point)| {
                let status = if values[i].is_none() {
                    Status::Missing
                } else if !identical_flags[i].is_pass() {
                    Status::Rejected(Stage::IdenticalValue)
                } else if !iqr_flags[i].is_pass() {
                    Status::Rejected(Stage::Iqr)
                } else if !rate_flags[i].is_pass() {
                    Status::Rejected(Stage::RateOfChange)
                } else {
                    Status::Kept
                };

                Outcome {
                    timestamp: point.timestamp,
                    value: values[i],
                    status,
                }
            })
            .collect())
    }

    /// Drop everything held in both caches
    pub fn clear_caches(&self) {
        lock(&self.pipeline_cache).clear();
        lock(&self.iqr_cache).clear();
    }

    /// Number of entries in the pipeline and IQR caches, in that order
    pub fn cache_len(&self) -> (usize, usize) {
        (
            lock(&self.pipeline_cache).len(),
            lock(&self.iqr_cache).len(),
        )
    }

    fn cached_iqr(
        &self,
        timestamps: &[Timestamp],
        values: &[Option<f64>],
        config: &FilterConfig,
    ) -> Result<Vec<Option<f64>>, Error> {
        let key = IqrKey::new(timestamps, values, config);
        let mut cache = lock(&self.iqr_cache);

        if let Some(cleaned) = cache.get(&key) {
            return Ok(cleaned);
        }

        let cleaned = iqr_stage(values, config)?;
        cache.insert(key, cleaned.clone());
        Ok(cleaned)
    }
}

/// Run the cleaning pipeline without any caching.
///
/// Gives the same result as [`SnowFilter::filter_outliers`].
///
/// ## Errors
///
/// - `config` is invalid, see [`FilterConfig::validate`]
pub fn clean_series(
    points: &[DataPoint],
    config: &FilterConfig,
    is_metric: bool,
) -> Result<Vec<DataPoint>, Error> {
    config.validate()?;

    let sorted = sort_points(points);
    let (timestamps, values) = split_points(&sorted);
    let cleaned = run_pipeline(&timestamps, &values, &config.scaled(is_metric), |_, v, c| {
        iqr_stage(v, c)
    })?;

    Ok(with_values(sorted, cleaned))
}

/// Lock a cache, carrying on with the contents if another thread panicked while holding it.
///
/// The caches only ever hold complete results, so a poisoned lock can't expose a partial one.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("recovering poisoned cache lock");
        poisoned.into_inner()
    })
}

fn sort_points(points: &[DataPoint]) -> Vec<DataPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|point| point.timestamp);
    sorted
}

fn split_points(points: &[DataPoint]) -> (Vec<Timestamp>, Vec<Option<f64>>) {
    points
        .iter()
        .map(|point| (point.timestamp, normalize(point.value)))
        .unzip()
}

fn with_values(mut points: Vec<DataPoint>, values: Vec<Option<f64>>) -> Vec<DataPoint> {
    for (point, value) in points.iter_mut().zip(values) {
        point.value = value;
    }
    points
}

fn count_removed(before: &[Option<f64>], after: &[Option<f64>]) -> usize {
    before
        .iter()
        .zip(after)
        .filter(|(b, a)| b.is_some() && a.is_none())
        .count()
}

fn identical_stage(values: &[Option<f64>], config: &FilterConfig) -> Vec<Option<f64>> {
    if !config.apply_identical_check {
        return values.to_vec();
    }
    apply_flags(values, &identical_value_check(values))
}

fn iqr_stage(values: &[Option<f64>], config: &FilterConfig) -> Result<Vec<Option<f64>>, Error> {
    let flags = iqr_check(
        values,
        config.window_size,
        config.upper_iqr_multiplier,
        config.lower_iqr_multiplier,
    )?;
    Ok(apply_flags(values, &flags))
}

fn rate_stage(values: &[Option<f64>], config: &FilterConfig) -> Vec<Option<f64>> {
    let flags = rate_of_change_check(
        values,
        config.max_positive_change_per_hour,
        config.max_negative_change_per_hour,
    );
    apply_flags(values, &flags)
}

/// `config` must already be scaled for the series' units
fn run_pipeline<F>(
    timestamps: &[Timestamp],
    values: &[Option<f64>],
    config: &FilterConfig,
    iqr: F,
) -> Result<Vec<Option<f64>>, Error>
where
    F: FnOnce(&[Timestamp], &[Option<f64>], &FilterConfig) -> Result<Vec<Option<f64>>, Error>,
{
    let after_identical = identical_stage(values, config);
    let after_iqr = iqr(timestamps, &after_identical, config)?;
    let after_rate = rate_stage(&after_iqr, config);

    trace!(
        "removed {} identical, {} iqr, {} rate of change out of {} points",
        count_removed(values, &after_identical),
        count_removed(&after_identical, &after_iqr),
        count_removed(&after_iqr, &after_rate),
        values.len()
    );

    Ok(after_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ACCUMULATION_24H_CONFIG, TOTAL_DEPTH_CONFIG};

    fn series(values: &[Option<f64>]) -> Vec<DataPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| DataPoint::new(Timestamp::from_hours(i as i64), *value, "alta"))
            .collect()
    }

    fn values(points: &[DataPoint]) -> Vec<Option<f64>> {
        points.iter().map(|p| p.value).collect()
    }

    #[test]
    fn test_filter_outliers_total_depth() {
        let filter = SnowFilter::new();
        let result = filter
            .filter_outliers(
                &series(&[Some(10.), Some(10.), Some(15.), Some(25.), Some(5.)]),
                &TOTAL_DEPTH_CONFIG,
                false,
            )
            .unwrap();

        assert_eq!(values(&result), vec![None, None, Some(15.), None, None]);
    }

    #[test]
    fn test_filter_outliers_accumulation() {
        let filter = SnowFilter::new();
        let result = filter
            .filter_outliers(
                &series(&[Some(10.), Some(10.), Some(15.), Some(25.), Some(5.)]),
                &ACCUMULATION_24H_CONFIG,
                false,
            )
            .unwrap();

        // the repeated 10s are fine for accumulation, but the jumps are still too fast
        assert_eq!(
            values(&result),
            vec![Some(10.), Some(10.), None, None, Some(5.)]
        );
    }

    #[test]
    fn test_filter_outliers_sorts() {
        let filter = SnowFilter::new();
        let mut points = series(&[Some(20.), Some(21.), Some(22.)]);
        points.reverse();

        let result = filter
            .filter_outliers(&points, &TOTAL_DEPTH_CONFIG, false)
            .unwrap();

        assert_eq!(
            result.iter().map(|p| p.timestamp).collect::<Vec<_>>(),
            (0..3).map(Timestamp::from_hours).collect::<Vec<_>>()
        );
        assert_eq!(values(&result), vec![Some(20.), Some(21.), Some(22.)]);
    }

    #[test]
    fn test_filter_outliers_invalid_config() {
        let filter = SnowFilter::new();
        let config = FilterConfig {
            window_size: 0,
            ..TOTAL_DEPTH_CONFIG
        };

        assert!(matches!(
            filter.filter_outliers(&series(&[Some(1.)]), &config, false),
            Err(Error::InvalidArg(_, _))
        ));
        assert!(clean_series(&series(&[Some(1.)]), &config, false).is_err());
        assert!(filter.filter_iqr(&series(&[Some(1.)]), &config).is_err());
        assert_eq!(filter.cache_len(), (0, 0));
    }

    #[test]
    fn test_filter_outliers_degenerate() {
        let filter = SnowFilter::new();

        assert!(filter
            .filter_outliers(&[], &TOTAL_DEPTH_CONFIG, false)
            .unwrap()
            .is_empty());
        assert_eq!(
            values(
                &filter
                    .filter_outliers(&series(&[Some(12.)]), &TOTAL_DEPTH_CONFIG, false)
                    .unwrap()
            ),
            vec![Some(12.)]
        );
        assert_eq!(
            values(
                &filter
                    .filter_outliers(
                        &series(&[None, Some(f64::NAN), None]),
                        &ACCUMULATION_24H_CONFIG,
                        false
                    )
                    .unwrap()
            ),
            vec![None, None, None]
        );
    }

    #[test]
    fn test_caching() {
        let filter = SnowFilter::new();
        let points = series(&[Some(10.), Some(10.), Some(15.), Some(25.), Some(5.)]);

        let cold = filter
            .filter_outliers(&points, &TOTAL_DEPTH_CONFIG, false)
            .unwrap();
        assert_eq!(filter.cache_len(), (1, 1));

        let warm = filter
            .filter_outliers(&points, &TOTAL_DEPTH_CONFIG, false)
            .unwrap();
        assert_eq!(cold, warm);
        assert_eq!(filter.cache_len(), (1, 1));

        // same data under the other preset is a different entry in both caches
        filter
            .filter_outliers(&points, &ACCUMULATION_24H_CONFIG, false)
            .unwrap();
        assert_eq!(filter.cache_len(), (2, 2));

        filter.clear_caches();
        assert_eq!(filter.cache_len(), (0, 0));
        assert_eq!(
            filter
                .filter_outliers(&points, &TOTAL_DEPTH_CONFIG, false)
                .unwrap(),
            cold
        );
    }

    #[test]
    fn test_caching_series_id() {
        // cached results only hold values, so the series id always comes from the caller
        let filter = SnowFilter::new();
        let points = series(&[Some(1.), Some(2.)]);
        let other: Vec<DataPoint> = points
            .iter()
            .map(|p| DataPoint::new(p.timestamp, p.value, "brighton"))
            .collect();

        filter
            .filter_outliers(&points, &ACCUMULATION_24H_CONFIG, false)
            .unwrap();
        let result = filter
            .filter_outliers(&other, &ACCUMULATION_24H_CONFIG, false)
            .unwrap();

        assert!(result.iter().all(|p| p.series_id == "brighton"));
        assert_eq!(filter.cache_len().0, 1);
    }

    #[test]
    fn test_caching_capacity() {
        let filter = SnowFilter::with_capacity(2);
        for i in 0..5 {
            filter
                .filter_outliers(
                    &series(&[Some(i as f64), Some(i as f64 + 1.)]),
                    &ACCUMULATION_24H_CONFIG,
                    false,
                )
                .unwrap();
        }
        assert_eq!(filter.cache_len(), (2, 2));

        let uncached = SnowFilter::with_capacity(0);
        for i in 0..50 {
            uncached
                .filter_outliers(&series(&[Some(i as f64)]), &ACCUMULATION_24H_CONFIG, false)
                .unwrap();
            uncached
                .filter_iqr(&series(&[Some(i as f64)]), &ACCUMULATION_24H_CONFIG)
                .unwrap();
        }
        assert_eq!(uncached.cache_len(), (0, 0));
    }

    #[test]
    fn test_filter_iqr() {
        let filter = SnowFilter::new();
        let result = filter
            .filter_iqr(
                &series(&[Some(30.), Some(10.), Some(11.), Some(12.), Some(13.)]),
                &TOTAL_DEPTH_CONFIG,
            )
            .unwrap();

        assert_eq!(
            values(&result),
            vec![None, Some(10.), Some(11.), Some(12.), Some(13.)]
        );
        assert_eq!(filter.cache_len(), (0, 1));
    }

    #[test]
    fn test_explain() {
        let filter = SnowFilter::new();
        let outcomes = filter
            .explain(
                &series(&[Some(10.), Some(10.), Some(15.), Some(25.), Some(5.), None]),
                &TOTAL_DEPTH_CONFIG,
                false,
            )
            .unwrap();

        assert_eq!(
            outcomes.iter().map(|o| o.status).collect::<Vec<_>>(),
            vec![
                Status::Rejected(Stage::IdenticalValue),
                Status::Rejected(Stage::IdenticalValue),
                Status::Kept,
                Status::Rejected(Stage::RateOfChange),
                Status::Rejected(Stage::RateOfChange),
                Status::Missing,
            ]
        );
        assert_eq!(outcomes[3].value, Some(25.));
        assert_eq!(filter.cache_len(), (0, 0));
    }

    #[test]
    fn test_explain_iqr() {
        let filter = SnowFilter::new();
        let outcomes = filter
            .explain(
                &series(&[Some(30.), Some(10.), Some(11.), Some(12.), Some(13.)]),
                &ACCUMULATION_24H_CONFIG,
                false,
            )
            .unwrap();

        assert_eq!(outcomes[0].status, Status::Rejected(Stage::Iqr));
        assert!(outcomes[1..].iter().all(|o| o.status == Status::Kept));
    }

    #[test]
    fn test_clean_series_matches_cached() {
        let filter = SnowFilter::new();
        let points = series(&[
            Some(40.),
            Some(41.),
            None,
            Some(43.),
            Some(80.),
            Some(44.),
            Some(44.5),
            Some(20.),
        ]);

        for config in [TOTAL_DEPTH_CONFIG, ACCUMULATION_24H_CONFIG] {
            for is_metric in [false, true] {
                assert_eq!(
                    clean_series(&points, &config, is_metric).unwrap(),
                    filter.filter_outliers(&points, &config, is_metric).unwrap()
                );
            }
        }
    }
}
