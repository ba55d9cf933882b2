use std::time::Duration;
use std::time::Instant;

/// Converts a deadline into a poll timeout in whole milliseconds.
///
/// Rounds up so the poll never wakes before the deadline, and saturates at
/// `i32::MAX` for deadlines far in the future. A deadline that has already
/// passed yields zero.
#[inline]
pub(crate) fn millis_until(deadline: Instant) -> i32 {
  let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
    return 0;
  };

  ceil_millis(remaining)
}

#[inline]
fn ceil_millis(duration: Duration) -> i32 {
  let nanos: u128 = duration.as_nanos();
  let millis: u128 = nanos.div_ceil(1_000_000);

  millis.min(i32::MAX as u128) as i32
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_past_deadline_is_zero() {
    assert_eq!(millis_until(Instant::now() - Duration::from_secs(1)), 0);
  }

  #[test]
  fn test_rounds_up() {
    assert_eq!(ceil_millis(Duration::from_micros(1)), 1);
    assert_eq!(ceil_millis(Duration::from_millis(50)), 50);
    assert_eq!(ceil_millis(Duration::from_micros(50_500)), 51);
  }

  #[test]
  fn test_saturates() {
    assert_eq!(ceil_millis(Duration::from_secs(u64::MAX)), i32::MAX);
  }
}
