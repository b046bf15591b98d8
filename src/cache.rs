//! Memoization of cleaning results

use crate::{config::FilterConfig, util::Timestamp};
use log::debug;
use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    sync::Arc,
};

/// Default maximum number of entries in the whole-pipeline cache
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// The `(timestamp, value)` pairs of a series, with values stored as their bit patterns so
/// equality is exact and hashable
type SeriesKey = Vec<(Timestamp, Option<u64>)>;

fn series_key(timestamps: &[Timestamp], values: &[Option<f64>]) -> SeriesKey {
    timestamps
        .iter()
        .zip(values)
        .map(|(timestamp, value)| (*timestamp, value.map(f64::to_bits)))
        .collect()
}

/// Key for the IQR stage: the series plus every config field the stage reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IqrKey {
    series: SeriesKey,
    window_size: usize,
    upper_iqr_multiplier: u64,
    lower_iqr_multiplier: u64,
}

impl IqrKey {
    pub(crate) fn new(
        timestamps: &[Timestamp],
        values: &[Option<f64>],
        config: &FilterConfig,
    ) -> Self {
        Self {
            series: series_key(timestamps, values),
            window_size: config.window_size,
            upper_iqr_multiplier: config.upper_iqr_multiplier.to_bits(),
            lower_iqr_multiplier: config.lower_iqr_multiplier.to_bits(),
        }
    }
}

/// Key for the whole pipeline: the series plus every config field that changes the output
///
/// `threshold_inches` is left out, since no check reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    series: SeriesKey,
    window_size: usize,
    upper_iqr_multiplier: u64,
    lower_iqr_multiplier: u64,
    max_positive_change_per_hour: u64,
    max_negative_change_per_hour: u64,
    apply_identical_check: bool,
    is_metric: bool,
}

impl PipelineKey {
    /// `config` is the preset as passed by the caller, before metric scaling
    pub(crate) fn new(
        timestamps: &[Timestamp],
        values: &[Option<f64>],
        config: &FilterConfig,
        is_metric: bool,
    ) -> Self {
        Self {
            series: series_key(timestamps, values),
            window_size: config.window_size,
            upper_iqr_multiplier: config.upper_iqr_multiplier.to_bits(),
            lower_iqr_multiplier: config.lower_iqr_multiplier.to_bits(),
            max_positive_change_per_hour: config.max_positive_change_per_hour.to_bits(),
            max_negative_change_per_hour: config.max_negative_change_per_hour.to_bits(),
            apply_identical_check: config.apply_identical_check,
            is_metric,
        }
    }
}

/// Map that forgets its oldest-inserted entry once full.
///
/// Lookups do not refresh an entry's age, so this is first-in-first-out rather than LRU.
#[derive(Debug)]
pub(crate) struct FifoCache<K, V> {
    name: &'static str,
    entries: HashMap<Arc<K>, V>,
    order: VecDeque<Arc<K>>,
    /// `None` for no limit
    capacity: Option<usize>,
}

impl<K: Eq + Hash, V: Clone> FifoCache<K, V> {
    pub(crate) fn new(name: &'static str, capacity: Option<usize>) -> Self {
        Self {
            name,
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key).cloned();
        debug!(
            "{} cache {}",
            self.name,
            if hit.is_some() { "hit" } else { "miss" }
        );
        hit
    }

    pub(crate) fn insert(&mut self, key: K, value: V) {
        if self.capacity == Some(0) {
            return;
        }

        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = value;
            return;
        }

        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                        debug!("{} cache full, evicted oldest entry", self.name);
                    }
                    None => break,
                }
            }
        }

        let key = Arc::new(key);
        self.order.push_back(Arc::clone(&key));
        self.entries.insert(key, value);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        debug!("{} cache cleared", self.name);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
