//! Internal error handling macros.

/// Displays a system error message and aborts the program.
///
/// Use this for unrecoverable errors that indicate the event core cannot
/// function at all - failing to create the OS wait primitive, for example.
/// The program prints a diagnostic message and immediately aborts without
/// unwinding.
///
/// # Examples
///
/// ```ignore
/// if fd < 0 {
///   fatal!("unable to create an epoll instance");
/// }
/// ```
macro_rules! fatal {
  ($error:expr) => {{
    ::std::eprintln!(
      "{}:{}: a core invariant has been broken: {}",
      ::std::file!(),
      ::std::line!(),
      $error,
    );

    ::std::process::abort();
  }};
}

pub(crate) use fatal;
