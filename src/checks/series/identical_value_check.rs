use crate::{util, Flag};

/// Timeseries check that flags readings repeating any other reading in the series.
///
/// Every present value is compared against every other present value in `data`, not just its
/// neighbours, so a sensor stuck on one reading for the whole series is removed entirely. Values
/// must match exactly to count as identical.
///
/// Each observation is flagged as follows
/// - If the value is missing, NaN or infinite: DataMissing.
/// - If any other observation has the exact same value: Fail.
/// - Else: Pass
pub fn identical_value_check(data: &[Option<f64>]) -> Vec<Flag> {
    let valid = |datum: &Option<f64>| datum.filter(|v| util::is_valid(*v));

    data.iter()
        .enumerate()
        .map(|(i, datum)| match valid(datum) {
            None => Flag::DataMissing,
            Some(value) => {
                let repeated = data
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != i && valid(other) == Some(value));

                if repeated {
                    Flag::Fail
                } else {
                    Flag::Pass
                }
            }
        })
        .collect()
}
