//! Exponential reconnect backoff.
use std::time::Duration;

/// Computes the next backoff delay given the previous one (`None` if this
/// is the first disconnect since a successful connection).
///
/// `next = round(current * 1.5)`, clamped to `max` unless `max` is `None`
/// (infinite).
pub fn next_backoff(current: Option<Duration>, initial: Duration, max: Option<Duration>) -> Duration {
    let next = match current {
        None => initial,
        Some(current) => {
            let exact_millis = current.as_millis() as f64 * 1.5;
            Duration::from_millis(exact_millis.round_ties_even() as u64)
        }
    };
    match max {
        Some(max) if next > max => max,
        _ => next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_documented_sequence() {
        let initial = Duration::from_millis(100);
        let max = Some(Duration::from_millis(1000));

        let mut delay = next_backoff(None, initial, max);
        let expected_ms = [100, 150, 225, 338, 507, 760];
        for &want in &expected_ms {
            assert_eq!(delay.as_millis() as u64, want);
            delay = next_backoff(Some(delay), initial, max);
        }
        // 760 * 1.5 = 1140, clamped to 1000.
        assert_eq!(delay.as_millis() as u64, 1000);
        // Stays clamped thereafter.
        let delay = next_backoff(Some(delay), initial, max);
        assert_eq!(delay.as_millis() as u64, 1000);
    }

    #[test]
    fn uses_initial_after_a_successful_connection_reset_it() {
        assert_eq!(
            next_backoff(None, Duration::from_millis(250), None),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn infinite_max_never_clamps() {
        let delay = next_backoff(Some(Duration::from_secs(3600)), Duration::from_millis(100), None);
        assert_eq!(delay, Duration::from_secs(5400));
    }
}
