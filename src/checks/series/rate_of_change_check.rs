use crate::{util, Flag};

/// Timeseries check that compares each observation against the closest earlier valid
/// observation, allowing a fixed amount of change per hour in each direction.
///
/// Observations are assumed to be hourly, so the number of hours between two observations is
/// taken to be the difference in their indices. Observation `i` with closest earlier valid
/// observation `j` is flagged as follows
/// - If the value is missing: DataMissing.
/// - If the value rose by more than `max_positive * (i - j)`: Fail.
/// - If the value fell by more than `max_negative * (i - j)`: Fail.
/// - If there is no earlier valid observation: Pass.
/// - Else: Pass
///
/// The first observation has nothing before it, so it is instead compared against the closest
/// later valid observation `j`, and fails if the absolute difference is greater than
/// `max_positive * j`. Only the positive limit is used here, in both directions.
///
/// Comparisons are always made against the input values, so an observation that fails does not
/// shift the baseline for the ones after it.
pub fn rate_of_change_check(
    data: &[Option<f64>],
    max_positive: f64,
    max_negative: f64,
) -> Vec<Flag> {
    let valid = |datum: &Option<f64>| datum.filter(|v| util::is_valid(*v));

    let mut flags = Vec::with_capacity(data.len());
    let mut last_valid: Option<(usize, f64)> = None;

    for (i, datum) in data.iter().enumerate() {
        let value = match valid(datum) {
            Some(value) => value,
            None => {
                flags.push(Flag::DataMissing);
                continue;
            }
        };

        let flag = if i == 0 {
            let next = data
                .iter()
                .enumerate()
                .skip(1)
                .find_map(|(j, other)| valid(other).map(|v| (j, v)));

            match next {
                Some((j, next_value)) if (value - next_value).abs() > max_positive * j as f64 => {
                    Flag::Fail
                }
                _ => Flag::Pass,
            }
        } else {
            match last_valid {
                Some((j, previous)) => {
                    let hours = (i - j) as f64;
                    let change = value - previous;

                    if change > max_positive * hours || change < -max_negative * hours {
                        Flag::Fail
                    } else {
                        Flag::Pass
                    }
                }
                None => Flag::Pass,
            }
        };

        flags.push(flag);
        last_valid = Some((i, value));
    }

    flags
}
