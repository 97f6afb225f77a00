/*!
 * Readiness File Descriptors
 * Kernel counter objects whose poll state is programmatically controllable
 */

mod counter;

pub(crate) use counter::MAX_COUNTER_VALUE;
pub use counter::{CounterFd, CounterMode, OnExec};
