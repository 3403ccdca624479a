use std::time::Duration;

pub fn to_millis(duration: Duration) -> u64 {
    (duration.as_secs() * 1_000) + (duration.subsec_nanos() / 1_000_000) as u64
}

/// Rounds half away from zero to the given number of decimals, as used in reports.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Arithmetic mean, zero for an empty sample.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {

    use std::time::Duration;
    use crate::utils;

    #[test]
    fn millis() {
        assert_eq!(utils::to_millis(Duration::new(2, 5_000_000)), 2_005);
    }

    #[test]
    fn rounding() {
        assert_eq!(utils::round_to(0.123456, 5), 0.12346);
        assert_eq!(utils::round_to(66.666666, 2), 66.67);
        assert_eq!(utils::round_to(3.0, 2), 3.0);
    }

    #[test]
    fn mean_of_empty_sample_is_zero() {
        assert_eq!(utils::mean(&[]), 0.0);
        assert_eq!(utils::mean(&[1.0, 2.0, 3.0]), 2.0);
    }
}
