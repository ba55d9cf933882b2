//! The application layer: the runtime value holding all core state, the
//! loop driver, and timer objects.

mod application;
mod runtime;
mod timer;

pub use self::application::Application;
pub use self::runtime::Runtime;
pub use self::runtime::RuntimeConfig;
pub use self::timer::TimerEvent;
pub use self::timer::TimerId;
