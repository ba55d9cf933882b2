use std::sync::Arc;

use crate::app::Runtime;
use crate::core::PollRecord;

/// The single-threaded driver of one event core.
///
/// One thread calls [`exec`] and becomes the delivery thread: every
/// registered callback and every signal subscription runs there, one at a
/// time. Other threads interact with the core only through the runtime
/// (registering watches, emitting signals, requesting termination), all of
/// which funnel through the dispatch queue.
///
/// [`exec`]: Self::exec
pub struct Application {
  runtime: Arc<Runtime>,
}

impl Application {
  pub fn new(runtime: Arc<Runtime>) -> Self {
    Self { runtime }
  }

  /// The runtime this application drives.
  #[inline]
  pub fn runtime(&self) -> &Arc<Runtime> {
    &self.runtime
  }

  /// Runs the poll/dispatch/drain cycle until a quit request commits, then
  /// returns its code.
  ///
  /// Each iteration waits in the backend (bounded by pending timers and
  /// deferred work), fires due timers, converts ready entities into
  /// deferred invocations, and drains the queue to empty. The quit flag is
  /// re-checked between invocations, so termination happens at a callback
  /// boundary and never mid-callback.
  pub fn exec(&self) -> i32 {
    let runtime: &Runtime = &self.runtime;
    let mut records: Vec<PollRecord> = Vec::new();

    tracing::debug!("application loop running");

    loop {
      if let Some(code) = runtime.queue().quit_code() {
        tracing::debug!(code, "application loop terminated");
        return code;
      }

      let timeout: i32 = runtime.timeout_hint();

      runtime.backend().poll(timeout, &mut records);
      runtime.timers().fire_due(runtime);
      runtime.dispatch_records(&mut records);

      while runtime.queue().drain_one(runtime) {
        if runtime.queue().quit_code().is_some() {
          break;
        }
      }
    }
  }
}
