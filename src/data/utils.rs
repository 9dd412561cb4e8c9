//! Small helpers shared by the spatial registries.

use std::fmt::{Debug, Display};

use crate::errors::DataError;

/// Pick the resolution to load from `valid`.
///
/// `None` asks for the highest resolution, which is the smallest voxel size.
/// Otherwise the largest valid value not above `resolution` wins, falling back
/// to the smallest valid value when every option is coarser than requested.
/// Returns `None` only when `valid` is empty.
pub fn closest_resolution(resolution: Option<f64>, valid: &[f64]) -> Option<f64> {
    let min = valid.iter().copied().reduce(f64::min)?;
    let Some(requested) = resolution else {
        return Some(min);
    };
    let best = valid
        .iter()
        .copied()
        .filter(|v| *v <= requested)
        .reduce(f64::max);
    Some(best.unwrap_or(min))
}

/// Fail with the "needs to be one of" message unless `value` is in `valid`.
pub fn check_param<T>(name: &str, value: &T, valid: &[T]) -> Result<(), DataError>
where
    T: PartialEq + Debug + Display,
{
    if valid.contains(value) {
        Ok(())
    } else {
        Err(DataError::invalid_parameter(name, value, valid))
    }
}

/// Render a resolution the way file names carry it (`2`, `1.5`).
pub fn format_resolution(resolution: f64) -> String {
    if resolution.fract() == 0.0 {
        format!("{}", resolution as i64)
    } else {
        format!("{resolution}")
    }
}

/// Split one line of a tab- or whitespace-separated text file.
pub(crate) fn split_fields(line: &str) -> Vec<&str> {
    if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_closest_resolution_literal_cases() {
        let valid = [1.0, 2.0, 3.0];
        assert_eq!(closest_resolution(Some(2.1), &valid), Some(2.0));
        assert_eq!(closest_resolution(Some(4.0), &valid), Some(3.0));
        assert_eq!(closest_resolution(None, &valid), Some(1.0));
    }

    #[test]
    fn test_closest_resolution_falls_back_to_finest() {
        assert_eq!(closest_resolution(Some(0.5), &[1.0, 2.0]), Some(1.0));
        assert_eq!(closest_resolution(Some(1.5), &[3.0, 1.5]), Some(1.5));
        assert_eq!(closest_resolution(Some(1.0), &[]), None);
    }

    #[test]
    fn test_check_param_message() {
        let err = check_param("yeo_networks", &9, &[7, 17]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The parameter `yeo_networks` (9) needs to be one of the following: [7, 17]"
        );
        assert!(check_param("yeo_networks", &7, &[7, 17]).is_ok());
    }

    #[test]
    fn test_format_resolution() {
        assert_eq!(format_resolution(2.0), "2");
        assert_eq!(format_resolution(1.5), "1.5");
    }

    proptest! {
        #[test]
        fn prop_result_is_a_valid_resolution(
            requested in proptest::option::of(0.1f64..10.0),
            valid in proptest::collection::vec(0.1f64..10.0, 1..8),
        ) {
            let picked = closest_resolution(requested, &valid).unwrap();
            prop_assert!(valid.contains(&picked));
        }

        #[test]
        fn prop_never_coarser_than_requested_when_possible(
            requested in 0.1f64..10.0,
            valid in proptest::collection::vec(0.1f64..10.0, 1..8),
        ) {
            let picked = closest_resolution(Some(requested), &valid).unwrap();
            if valid.iter().any(|v| *v <= requested) {
                prop_assert!(picked <= requested);
                prop_assert!(valid.iter().all(|v| *v > requested || *v <= picked));
            } else {
                let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
                prop_assert_eq!(picked, min);
            }
        }
    }
}
