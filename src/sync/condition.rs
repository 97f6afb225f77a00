/*!
 * Pollable Condition Variable
 * Classical waits plus multi-observer notification through readiness fds
 */

use super::guard::ObserverGuard;
use super::semaphore::Semaphore;
use crate::core::errors::{SyncError, SyncResult};
use ahash::RandomState;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

struct ConditionInner {
    /// Armed waiter and observer handles, in arrival order. Notification
    /// pops from the back; no fairness is promised.
    queue: VecDeque<Arc<Semaphore>>,
    /// Live observers, keyed by the fd handed out by `observe`
    observers: HashMap<RawFd, Arc<Semaphore>, RandomState>,
}

/// A condition variable whose notifications can be observed with epoll.
///
/// Beyond the classical [`wait`](Condition::wait) /
/// [`notify_one`](Condition::notify_one) /
/// [`notify_all`](Condition::notify_all) interface, observers can call
/// [`observe`](Condition::observe) to obtain a descriptor that becomes
/// readable when the condition is signaled. The contract:
///
/// - The fd stays readable from notification until the observer calls
///   [`ack`](Condition::ack); no further notifications arrive on that fd
///   in between.
/// - `ack` on an unsignaled fd blocks until the next notification.
/// - [`stop_observing`](Condition::stop_observing) returns the fd to the
///   condition variable, which may close or reuse it. Observers must not
///   touch the fd afterwards.
/// - Observers never read, write or close the fd themselves; the only
///   permitted operations are polling it, `ack` and `stop_observing`.
///
/// Each waiter and observer is backed by its own [`Semaphore`]; signaling
/// writes to that semaphore's fd and acknowledgement drains it.
pub struct Condition {
    inner: Mutex<ConditionInner>,
}

impl Condition {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ConditionInner {
                queue: VecDeque::new(),
                observers: HashMap::with_hasher(RandomState::new()),
            }),
        }
    }

    /// Enqueue a fresh waiter handle. Runs under the internal lock so a
    /// notification arriving immediately afterwards cannot be missed.
    fn enqueue_waiter(&self) -> SyncResult<Arc<Semaphore>> {
        let waiter = Arc::new(Semaphore::new()?);
        self.inner.lock().queue.push_back(Arc::clone(&waiter));
        Ok(waiter)
    }

    /// Block until notified.
    ///
    /// The caller holds the mutex guarding the condition's shared state;
    /// it is released while the thread is suspended and reacquired before
    /// returning. The waiter is enqueued before the guard is released, so
    /// a notification issued under the same mutex cannot slip by.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) -> SyncResult<()> {
        let waiter = self.enqueue_waiter()?;
        MutexGuard::unlocked(guard, || waiter.down())
    }

    /// Bounded [`wait`](Condition::wait). Returns false iff the timeout
    /// elapsed before a notification arrived.
    pub fn wait_timeout<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        timeout: Option<Duration>,
    ) -> SyncResult<bool> {
        let waiter = self.enqueue_waiter()?;
        MutexGuard::unlocked(guard, || waiter.down_timeout(timeout))
    }

    /// Create an observer and return its notification descriptor.
    ///
    /// The fd is initially not readable. It becomes readable on the next
    /// notification and stays so until acked.
    pub fn observe(&self) -> SyncResult<RawFd> {
        let observer = Arc::new(Semaphore::new()?);
        let fd = observer.fd();
        let mut inner = self.inner.lock();
        inner.queue.push_back(Arc::clone(&observer));
        inner.observers.insert(fd, observer);
        Ok(fd)
    }

    /// Scoped observation: [`observe`](Condition::observe) now,
    /// [`stop_observing`](Condition::stop_observing) when the guard drops
    pub fn observer(&self) -> SyncResult<ObserverGuard<'_>> {
        ObserverGuard::new(self)
    }

    /// Consume the notification pending on `fd` and re-arm the observer.
    ///
    /// Blocks until a notification arrives if the fd is not currently
    /// signaled. Fails with [`SyncError::NoSuchItem`] for fds this
    /// condition variable did not hand out.
    pub fn ack(&self, fd: RawFd) -> SyncResult<()> {
        let observer = self.lookup(fd)?;
        observer.down()?;
        self.inner.lock().queue.push_back(observer);
        Ok(())
    }

    /// Return an observer's fd to the condition variable. The fd must not
    /// be used afterwards. Fails with [`SyncError::NoSuchItem`] for
    /// unknown fds.
    pub fn stop_observing(&self, fd: RawFd) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        match inner.observers.remove(&fd) {
            Some(_) => Ok(()),
            None => Err(no_such_observer(fd)),
        }
    }

    /// Signal one armed waiter or observer, if any. Which one is
    /// unspecified.
    pub fn notify_one(&self) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.queue.pop_back() {
            handle.up()?;
        }
        Ok(())
    }

    /// Signal every armed waiter and observer
    pub fn notify_all(&self) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        while let Some(handle) = inner.queue.pop_back() {
            handle.up()?;
        }
        Ok(())
    }

    fn lookup(&self, fd: RawFd) -> SyncResult<Arc<Semaphore>> {
        self.inner
            .lock()
            .observers
            .get(&fd)
            .cloned()
            .ok_or_else(|| no_such_observer(fd))
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

fn no_such_observer(fd: RawFd) -> SyncError {
    SyncError::NoSuchItem(format!(
        "fd {} was not obtained from this condition variable",
        fd
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_unknown_fd_fails() {
        let cv = Condition::new();
        let err = cv.ack(12345).unwrap_err();
        assert!(matches!(err, SyncError::NoSuchItem(_)));
    }

    #[test]
    fn test_stop_observing_unknown_fd_fails() {
        let cv = Condition::new();
        let err = cv.stop_observing(12345).unwrap_err();
        assert!(matches!(err, SyncError::NoSuchItem(_)));
    }

    #[test]
    fn test_stop_observing_is_single_use() {
        let cv = Condition::new();
        let fd = cv.observe().unwrap();
        cv.stop_observing(fd).unwrap();
        assert!(cv.stop_observing(fd).is_err());
    }

    #[test]
    fn test_wait_timeout_expires_without_notification() {
        let cv = Condition::new();
        let state = Mutex::new(());
        let mut guard = state.lock();
        let notified = cv
            .wait_timeout(&mut guard, Some(Duration::from_millis(50)))
            .unwrap();
        assert!(!notified);
    }
}
