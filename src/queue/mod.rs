/*!
 * Pollable Queue
 * Bounded FIFO with watermark events observable through readiness fds
 */

mod queue;
mod types;

pub use queue::{Queue, QueueObserverGuard};
pub use types::QueueEvent;
