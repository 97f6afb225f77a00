/*!
 * pollsync
 * Pollable synchronization primitives for Linux-like environments
 *
 * Synchronization objects whose state changes are observable through
 * kernel readiness file descriptors:
 * - Counting semaphore (readable while the count is positive)
 * - Read/write toggle (explicit control over poll readability/writability)
 * - Condition variable with per-observer notification fds
 * - Bounded FIFO queue with watermark events
 * - epoll facade for waiting on any mix of the above and ordinary fds
 *
 * A single thread can wait for queue activity, socket traffic and timers
 * with one `epoll_wait` call by registering the descriptors these
 * primitives expose.
 */

pub mod core;
pub mod epoll;
pub mod fd;
pub mod queue;
pub mod sync;

pub use crate::core::errors::{SyncError, SyncResult};
pub use epoll::{EpollSet, EventSet, ReadyEvent, Repeat, Trigger};
pub use fd::{CounterFd, CounterMode, OnExec};
pub use queue::{Queue, QueueEvent, QueueObserverGuard};
pub use sync::{Condition, ObserverGuard, ReadWriteToggle, Semaphore, ToggleState};
