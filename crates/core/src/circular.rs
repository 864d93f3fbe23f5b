//! Circular minutes-of-day arithmetic
//!
//! Sleep schedules straddle midnight, so times of day are compared on a
//! 1440-minute circle: 23:50 and 00:10 are 20 minutes apart and their median
//! is 00:00, not 12:00.

use chrono::Timelike;

/// Minutes in one day; the modulus of the circle.
pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Minutes after local midnight for a timezone-aware timestamp.
pub fn minutes_of_day<Tz: chrono::TimeZone>(dt: &chrono::DateTime<Tz>) -> f64 {
    f64::from(dt.hour() * 60 + dt.minute()) + f64::from(dt.second()) / 60.0
}

/// Shortest distance between two points on the minutes-of-day circle.
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(MINUTES_PER_DAY).abs();
    d.min(MINUTES_PER_DAY - d)
}

/// Median of circular minutes-of-day values.
///
/// Rotates the samples so their circular mean sits at midday, takes the
/// ordinary median there, and rotates back. Robust for the clustered
/// distributions sleep times form; degenerate inputs (points spread evenly
/// around the circle) fall back to the rotation of angle zero.
pub fn circular_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let tau = std::f64::consts::TAU;
    let (sin_sum, cos_sum) = values.iter().fold((0.0_f64, 0.0_f64), |(s, c), v| {
        let angle = v / MINUTES_PER_DAY * tau;
        (s + angle.sin(), c + angle.cos())
    });
    let mean_minutes = (sin_sum.atan2(cos_sum) / tau * MINUTES_PER_DAY).rem_euclid(MINUTES_PER_DAY);

    let shift = MINUTES_PER_DAY / 2.0 - mean_minutes;
    let mut rotated: Vec<f64> =
        values.iter().map(|v| (v + shift).rem_euclid(MINUTES_PER_DAY)).collect();
    rotated.sort_by(f64::total_cmp);

    let med = linear_median(&rotated)?;
    Some((med - shift).rem_euclid(MINUTES_PER_DAY))
}

/// Ordinary median of a sorted slice.
fn linear_median(sorted: &[f64]) -> Option<f64> {
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(sorted[n / 2]),
        n => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Median of non-circular values (durations).
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    linear_median(&sorted)
}

/// Interquartile range of non-circular values, with linear interpolation
/// between ranks.
pub fn interquartile_range(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(percentile(&sorted, 0.75) - percentile(&sorted, 0.25))
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_across_midnight() {
        // 23:50 vs 00:10 is 20 minutes, not 1420
        assert!((circular_distance(1430.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((circular_distance(10.0, 1430.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_linear_case() {
        assert!((circular_distance(180.0, 1430.0) - 190.0).abs() < 1e-9);
        assert!((circular_distance(600.0, 630.0) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_circular_median_straddles_midnight() {
        // 23:50 and 00:10 -> 00:00
        let med = circular_median(&[1430.0, 10.0]).unwrap();
        assert!(circular_distance(med, 0.0) < 0.01, "median was {med}");
    }

    #[test]
    fn test_circular_median_clustered_evening() {
        let med = circular_median(&[1380.0, 1395.0, 1410.0]).unwrap();
        assert!((med - 1395.0).abs() < 0.01);
    }

    #[test]
    fn test_circular_median_empty() {
        assert!(circular_median(&[]).is_none());
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_iqr_regular_history_is_zero() {
        let durations = vec![480.0; 14];
        assert_eq!(interquartile_range(&durations), Some(0.0));
    }

    #[test]
    fn test_iqr_interpolates() {
        let values = vec![100.0, 200.0, 300.0, 400.0];
        // q1 = 175, q3 = 325
        assert!((interquartile_range(&values).unwrap() - 150.0).abs() < 1e-9);
    }
}
