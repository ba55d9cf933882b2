use std::io;

/// Retries an interruptible syscall until it completes or fails for real.
///
/// Every blocking syscall in the backend goes through this wrapper so that
/// transient `EINTR` interruptions are invisible to callers.
#[inline]
pub(crate) fn ignore_eintr<T, F>(mut call: F) -> io::Result<T>
where
  F: FnMut() -> io::Result<T>,
{
  loop {
    match call() {
      Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
      result => return result,
    }
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retries_interrupted() {
    let mut left: usize = 3;

    let result: io::Result<usize> = ignore_eintr(|| {
      if left > 0 {
        left -= 1;
        Err(io::Error::from(io::ErrorKind::Interrupted))
      } else {
        Ok(42)
      }
    });

    assert_eq!(result.unwrap(), 42);
    assert_eq!(left, 0);
  }

  #[test]
  fn test_passes_real_errors() {
    let result: io::Result<()> = ignore_eintr(|| Err(io::Error::from(io::ErrorKind::NotFound)));

    assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
  }
}
