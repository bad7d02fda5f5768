//! General time utility functions

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Number of microseconds in a second
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Convert a duration into a number of seconds.
///
/// Nanosecond precision is used where the duration fits into an `i64` of nanoseconds (about 292
/// years), beyond that microsecond precision is used. Returns `None` only if the duration cannot be
/// represented in microseconds either.
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    if let Some(ns) = duration.num_nanoseconds() {
        Some(ns as f64 / NANOS_PER_SECOND as f64)
    }
    else {
        duration.num_microseconds()
            .map(|us| us as f64 / MICROS_PER_SECOND as f64)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_duration_to_seconds() {
        assert_eq!(duration_to_seconds(Duration::milliseconds(1500)), Some(1.5));
        assert_eq!(duration_to_seconds(Duration::milliseconds(-50)), Some(-0.05));
        assert_eq!(duration_to_seconds(Duration::zero()), Some(0.0));

        // Too long for nanoseconds, falls back on microseconds
        let long = Duration::days(365 * 1000);
        assert_eq!(
            duration_to_seconds(long),
            Some(365.0 * 1000.0 * 86_400.0)
        );
    }
}
