//! Dialog timers
//!
//! [`DialogTimer`] orders armed dialogs by deadline; the driver task polls
//! it and runs the manager's periodic housekeeping.

pub mod driver;
pub mod wheel;

pub use driver::{spawn_timer_driver, TimerDriverHandle};
pub use wheel::DialogTimer;
