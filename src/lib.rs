//! Veille - a reactive event-loop core for long-running POSIX services.
//!
//! The crate couples three pieces:
//!
//! - an OS-event **backend** multiplexing descriptor readiness, filesystem
//!   path events, and process lifecycle events through one wait primitive;
//! - a **dispatch fabric** of deferred invocations and typed signals with
//!   lifetime-safe delivery;
//! - an **application loop** driving both from a single thread.
//!
//! ```no_run
//! use std::time::Duration;
//! use veille::app::Application;
//! use veille::app::Runtime;
//! use veille::app::TimerEvent;
//!
//! let runtime = Runtime::new();
//! let timer = TimerEvent::new(&runtime);
//!
//! timer.expired().connect_fn(|runtime, ()| {
//!   println!("tick");
//!   runtime.quit(0);
//! });
//!
//! timer.start(&runtime, Duration::from_millis(50), false);
//!
//! let code = Application::new(runtime).exec();
//! assert_eq!(code, veille::consts::E_CODE_SUCCESS);
//! ```

mod backend;
mod core;
mod fabric;
mod utils;

pub mod app;
pub mod consts;

pub mod error {
  //! Registration errors.

  pub use crate::core::FlagGroupError;
}

pub mod types {
  //! Core types of the event loop and its watch registrations.

  pub use crate::core::EventFlags;
  pub use crate::core::ObjectId;
  pub use crate::core::PollKey;
  pub use crate::core::PollRecord;
  pub use crate::core::ProcessEvent;
  pub use crate::core::WatchDescriptor;

  pub use crate::fabric::Anchor;
  pub use crate::fabric::Signal;

  pub use crate::app::TimerId;
}
