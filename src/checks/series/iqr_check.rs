use crate::{util, Error, Flag};

/// First and third quartile of an ascending-sorted, non-empty slice.
///
/// Quartiles are taken at the literal indices `floor(len * 0.25)` and `floor(len * 0.75)`, with no
/// interpolation between neighbouring elements.
///
/// Returns `None` if `sorted` is empty.
pub fn quartiles(sorted: &[f64]) -> Option<(f64, f64)> {
    if sorted.is_empty() {
        return None;
    }
    let len = sorted.len() as f64;

    let q1 = sorted[(len * 0.25).floor() as usize];
    let q3 = sorted[(len * 0.75).floor() as usize];

    Some((q1, q3))
}

/// Timeseries check that compares each observation against the interquartile range of the
/// observations around it.
///
/// For the observation at index `i`, the window is the indices `i - window_size / 2` to
/// `i + window_size / 2` inclusive, cut off at the ends of the series. Missing values in the
/// window are ignored. From the remaining values the fences are computed as
/// `Q1 - lower_multiplier * IQR` and `Q3 + upper_multiplier * IQR`.
///
/// Each observation is flagged as follows
/// - If the value is missing: DataMissing.
/// - If the value is outside either fence: Fail.
/// - Else: Pass
///
/// An observation with no valid neighbours always passes, since its own value makes up the whole
/// window.
///
/// ## Errors
///
/// - `window_size` is 0
pub fn iqr_check(
    data: &[Option<f64>],
    window_size: usize,
    upper_multiplier: f64,
    lower_multiplier: f64,
) -> Result<Vec<Flag>, Error> {
    if window_size == 0 {
        return Err(Error::InvalidArg(
            "window_size".to_string(),
            "must be greater than 0".to_string(),
        ));
    }

    let half_kernel = window_size / 2;
    let n = data.len();
    let mut window: Vec<f64> = Vec::with_capacity(window_size + 1);

    Ok((0..n)
        .map(|i| {
            let value = match data[i] {
                Some(value) if util::is_valid(value) => value,
                _ => return Flag::DataMissing,
            };

            let start = i.saturating_sub(half_kernel);
            let end = n.min(i + half_kernel + 1);

            window.clear();
            window.extend(
                data[start..end]
                    .iter()
                    .flatten()
                    .copied()
                    .filter(|v| util::is_valid(*v)),
            );
            window.sort_by(|a, b| a.total_cmp(b));

            let (q1, q3) = match quartiles(&window) {
                Some(q) => q,
                // can't happen while the value itself is in the window, but an empty window
                // means there's nothing to keep
                None => return Flag::DataMissing,
            };
            let iqr = q3 - q1;

            if value < q1 - lower_multiplier * iqr || value > q3 + upper_multiplier * iqr {
                Flag::Fail
            } else {
                Flag::Pass
            }
        })
        .collect())
}
