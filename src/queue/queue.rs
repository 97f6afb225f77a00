/*!
 * Queue
 * Bounded FIFO guarded by one mutex, with six event conditions and a
 * state toggle summarizing readability and writability
 */

use super::types::QueueEvent;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::time::Deadline;
use crate::sync::{Condition, ReadWriteToggle, ToggleState};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::time::Duration;

struct QueueInner<T> {
    items: VecDeque<T>,
    low_water_mark: usize,
    high_water_mark: usize,
    /// Hysteresis latch: set when a high-water event fires, cleared when a
    /// low-water event fires. While set, further high-water crossings stay
    /// silent, and vice versa.
    high_water_crossed: bool,
    /// Summarizes the queue for pollers: readable while items are present,
    /// writable while capacity remains
    state: ReadWriteToggle,
}

fn toggle_state_for(size: usize, max_size: usize) -> ToggleState {
    if size == 0 {
        ToggleState::WriteOnly
    } else if size >= max_size {
        ToggleState::ReadOnly
    } else {
        ToggleState::ReadWrite
    }
}

/// A bounded FIFO whose state transitions are observable through
/// readiness file descriptors.
///
/// Producers block in [`put`](Queue::put) while the queue is full and
/// consumers block in [`get`](Queue::get) while it is empty. Every
/// mutation fires notifications for the [`QueueEvent`]s it triggers, so a
/// thread can wait classically through [`wait`](Queue::wait) or register
/// an observation fd from [`observe`](Queue::observe) in an epoll set
/// next to unrelated descriptors.
///
/// Watermark events are hysteretic: after a high-water event, no further
/// one fires until the size has fallen back to the low water mark, and
/// symmetrically for low-water events.
pub struct Queue<T> {
    max_size: usize,
    inner: Mutex<QueueInner<T>>,
    empty_cv: Condition,
    not_empty_cv: Condition,
    full_cv: Condition,
    not_full_cv: Condition,
    low_water_cv: Condition,
    high_water_cv: Condition,
}

impl<T> Queue<T> {
    /// Capacity of an unbounded queue
    pub const MAX_QUEUE_SIZE: usize = usize::MAX;

    /// Create a queue with no practical size limit
    pub fn unbounded() -> SyncResult<Self> {
        Self::bounded(Self::MAX_QUEUE_SIZE)
    }

    /// Create a queue holding at most `max_size` items, with both
    /// watermarks at the maximum (watermark events never fire)
    pub fn bounded(max_size: usize) -> SyncResult<Self> {
        Self::with_watermarks(max_size, max_size, max_size)
    }

    /// Create a bounded queue with watermarks.
    ///
    /// Fails with [`SyncError::IllegalValue`] unless
    /// `low_water_mark <= high_water_mark <= max_size`.
    pub fn with_watermarks(
        max_size: usize,
        low_water_mark: usize,
        high_water_mark: usize,
    ) -> SyncResult<Self> {
        if high_water_mark > max_size {
            return Err(SyncError::IllegalValue(
                "high water mark above max queue size".into(),
            ));
        }
        if low_water_mark > high_water_mark {
            return Err(SyncError::IllegalValue(
                "low water mark above high water mark".into(),
            ));
        }

        let mut state = ReadWriteToggle::new()?;
        state.set_state(ToggleState::WriteOnly)?;

        Ok(Self {
            max_size,
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                low_water_mark,
                high_water_mark,
                high_water_crossed: false,
                state,
            }),
            empty_cv: Condition::new(),
            not_empty_cv: Condition::new(),
            full_cv: Condition::new(),
            not_full_cv: Condition::new(),
            low_water_cv: Condition::new(),
            high_water_cv: Condition::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn low_water_mark(&self) -> usize {
        self.inner.lock().low_water_mark
    }

    pub fn high_water_mark(&self) -> usize {
        self.inner.lock().high_water_mark
    }

    pub fn above_high_water_mark(&self) -> bool {
        let inner = self.inner.lock();
        inner.items.len() > inner.high_water_mark
    }

    pub fn at_or_below_low_water_mark(&self) -> bool {
        let inner = self.inner.lock();
        inner.items.len() <= inner.low_water_mark
    }

    /// Move the low water mark. Never fires watermark events
    /// retroactively and never touches the hysteresis latch.
    pub fn set_low_water_mark(&self, value: usize) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        if value > inner.high_water_mark {
            return Err(SyncError::IllegalValue(
                "low water mark above high water mark".into(),
            ));
        }
        inner.low_water_mark = value;
        Ok(())
    }

    /// Move the high water mark. Same non-retroactive rules as
    /// [`set_low_water_mark`](Queue::set_low_water_mark).
    pub fn set_high_water_mark(&self, value: usize) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        if value > self.max_size {
            return Err(SyncError::IllegalValue(
                "high water mark above max queue size".into(),
            ));
        }
        if value < inner.low_water_mark {
            return Err(SyncError::IllegalValue(
                "high water mark below low water mark".into(),
            ));
        }
        inner.high_water_mark = value;
        Ok(())
    }

    /// Pop the front item, blocking while the queue is empty
    pub fn get(&self) -> SyncResult<T> {
        let mut guard = self.inner.lock();
        loop {
            if let Some(item) = guard.items.pop_front() {
                let new_size = guard.items.len();
                self.issue_notifications(&mut *guard, new_size + 1, new_size)?;
                return Ok(item);
            }
            self.not_empty_cv.wait(&mut guard)?;
        }
    }

    /// Bounded [`get`](Queue::get). `None` blocks indefinitely; a zero
    /// duration polls once. Returns `None` when the queue stayed empty
    /// for the whole timeout.
    pub fn try_get(&self, timeout: Option<Duration>) -> SyncResult<Option<T>> {
        if timeout.is_none() {
            return self.get().map(Some);
        }

        let deadline = Deadline::after(timeout);
        let mut guard = self.inner.lock();
        Self::wait_for_invariant(&self.not_empty_cv, &mut guard, deadline, |q| {
            !q.items.is_empty()
        })?;

        match guard.items.pop_front() {
            Some(item) => {
                let new_size = guard.items.len();
                self.issue_notifications(&mut *guard, new_size + 1, new_size)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Atomically drain the queue, firing notifications as if the size
    /// dropped from its old value to zero
    pub fn get_all(&self) -> SyncResult<VecDeque<T>> {
        let mut guard = self.inner.lock();
        let drained = std::mem::take(&mut guard.items);
        self.issue_notifications(&mut *guard, drained.len(), 0)?;
        Ok(drained)
    }

    /// Append an item, blocking while the queue is full
    pub fn put(&self, item: T) -> SyncResult<()> {
        // A `None` timeout never expires, so the item is always accepted
        self.try_put(item, None).map(|_| ())
    }

    /// Bounded [`put`](Queue::put). Returns the rejected item when the
    /// queue stayed full for the whole timeout, `None` once appended.
    pub fn try_put(&self, item: T, timeout: Option<Duration>) -> SyncResult<Option<T>> {
        let max_size = self.max_size;
        let deadline = Deadline::after(timeout);
        let mut guard = self.inner.lock();
        Self::wait_for_invariant(&self.not_full_cv, &mut guard, deadline, |q| {
            q.items.len() < max_size
        })?;

        if guard.items.len() >= max_size {
            return Ok(Some(item));
        }
        guard.items.push_back(item);
        let new_size = guard.items.len();
        self.issue_notifications(&mut *guard, new_size - 1, new_size)?;
        Ok(None)
    }

    /// Drop every queued item, firing notifications as if the size
    /// dropped to zero
    pub fn clear(&self) -> SyncResult<()> {
        let mut guard = self.inner.lock();
        let old_size = guard.items.len();
        guard.items.clear();
        log::debug!("queue cleared, dropped {} items", old_size);
        self.issue_notifications(&mut *guard, old_size, 0)
    }

    /// Classical wait for a queue event. Returns true iff the event's
    /// invariant held within the timeout.
    ///
    /// Watermark waits run in two stages (latch, then crossing); both
    /// stages draw on the same timeout budget.
    pub fn wait(&self, event: QueueEvent, timeout: Option<Duration>) -> SyncResult<bool> {
        let max_size = self.max_size;
        let deadline = Deadline::after(timeout);
        let mut guard = self.inner.lock();
        match event {
            QueueEvent::Empty => {
                Self::wait_for_invariant(&self.empty_cv, &mut guard, deadline, |q| {
                    q.items.is_empty()
                })
            }
            QueueEvent::NotEmpty => {
                Self::wait_for_invariant(&self.not_empty_cv, &mut guard, deadline, |q| {
                    !q.items.is_empty()
                })
            }
            QueueEvent::Full => {
                Self::wait_for_invariant(&self.full_cv, &mut guard, deadline, |q| {
                    q.items.len() >= max_size
                })
            }
            QueueEvent::NotFull => {
                Self::wait_for_invariant(&self.not_full_cv, &mut guard, deadline, |q| {
                    q.items.len() < max_size
                })
            }
            QueueEvent::HighWaterMark => {
                // The latch clears on low-water notifications, so stage
                // one listens there
                if !Self::wait_for_invariant(&self.low_water_cv, &mut guard, deadline, |q| {
                    !q.high_water_crossed
                })? {
                    return Ok(false);
                }
                Self::wait_for_invariant(&self.high_water_cv, &mut guard, deadline, |q| {
                    q.items.len() > q.high_water_mark
                })
            }
            QueueEvent::LowWaterMark => {
                if !Self::wait_for_invariant(&self.high_water_cv, &mut guard, deadline, |q| {
                    q.high_water_crossed
                })? {
                    return Ok(false);
                }
                Self::wait_for_invariant(&self.low_water_cv, &mut guard, deadline, |q| {
                    q.items.len() <= q.low_water_mark
                })
            }
        }
    }

    /// Obtain an observation fd for `event`. See [`Condition::observe`]
    /// for the observer contract.
    pub fn observe(&self, event: QueueEvent) -> SyncResult<RawFd> {
        self.cv_for(event).observe()
    }

    /// Acknowledge a notification on an fd obtained from
    /// [`observe`](Queue::observe) for the same event
    pub fn ack(&self, fd: RawFd, event: QueueEvent) -> SyncResult<()> {
        self.cv_for(event).ack(fd)
    }

    /// Return an observation fd for `event`
    pub fn stop_observing(&self, fd: RawFd, event: QueueEvent) -> SyncResult<()> {
        self.cv_for(event).stop_observing(fd)
    }

    /// Scoped observation of `event`
    pub fn observer(&self, event: QueueEvent) -> SyncResult<QueueObserverGuard<'_, T>> {
        QueueObserverGuard::new(self, event)
    }

    /// The queue-state descriptor: readable while items are present,
    /// writable while capacity remains. Poll only.
    pub fn queue_state_fd(&self) -> RawFd {
        self.inner.lock().state.fd()
    }

    /// Transfer the queue's contents into a freshly constructed queue.
    ///
    /// The destination inherits the items, both watermarks and the
    /// hysteresis latch, with its state toggle set to match the
    /// transferred size. `self` is left as a fresh queue: empty, latch
    /// clear, toggle at write-only. No notifications fire on either side.
    /// Exclusive access through `&mut self` rules out armed waiters on
    /// the source.
    pub fn take(&mut self) -> SyncResult<Queue<T>> {
        let inner = self.inner.get_mut();
        let items = std::mem::take(&mut inner.items);
        let crossed = inner.high_water_crossed;
        let (low, high) = (inner.low_water_mark, inner.high_water_mark);
        inner.high_water_crossed = false;
        inner.state.set_state(ToggleState::WriteOnly)?;

        let dest = Queue::with_watermarks(self.max_size, low, high)?;
        {
            let mut dest_inner = dest.inner.lock();
            dest_inner.high_water_crossed = crossed;
            dest_inner
                .state
                .set_state(toggle_state_for(items.len(), self.max_size))?;
            dest_inner.items = items;
        }
        Ok(dest)
    }

    /// Loop until `invariant` holds or the deadline expires, waiting on
    /// `cv` in between. Re-checks after every wakeup (spurious wakeups
    /// and stolen invariants both force another round). Returns the final
    /// truth value of the invariant.
    fn wait_for_invariant(
        cv: &Condition,
        guard: &mut MutexGuard<'_, QueueInner<T>>,
        deadline: Deadline,
        invariant: impl Fn(&QueueInner<T>) -> bool,
    ) -> SyncResult<bool> {
        while !invariant(&**guard) && !deadline.expired() {
            cv.wait_timeout(guard, deadline.remaining())?;
        }
        Ok(invariant(&**guard))
    }

    fn cv_for(&self, event: QueueEvent) -> &Condition {
        match event {
            QueueEvent::Empty => &self.empty_cv,
            QueueEvent::NotEmpty => &self.not_empty_cv,
            QueueEvent::Full => &self.full_cv,
            QueueEvent::NotFull => &self.not_full_cv,
            QueueEvent::HighWaterMark => &self.high_water_cv,
            QueueEvent::LowWaterMark => &self.low_water_cv,
        }
    }

    /// Fire the notifications implied by a size change from `old_size` to
    /// `new_size` and re-encode the state toggle. Runs under the queue
    /// mutex.
    fn issue_notifications(
        &self,
        inner: &mut QueueInner<T>,
        old_size: usize,
        new_size: usize,
    ) -> SyncResult<()> {
        if old_size == 0 && new_size > 0 {
            self.not_empty_cv.notify_all()?;
        }
        if old_size > 0 && new_size == 0 {
            self.empty_cv.notify_all()?;
        }
        if old_size >= self.max_size && new_size < self.max_size {
            self.not_full_cv.notify_all()?;
        }
        if old_size < self.max_size && new_size >= self.max_size {
            self.full_cv.notify_all()?;
        }
        if old_size <= inner.high_water_mark
            && new_size > inner.high_water_mark
            && !inner.high_water_crossed
        {
            self.high_water_cv.notify_all()?;
            inner.high_water_crossed = true;
        }
        if old_size > inner.low_water_mark
            && new_size <= inner.low_water_mark
            && inner.high_water_crossed
        {
            self.low_water_cv.notify_all()?;
            inner.high_water_crossed = false;
        }
        inner.state.set_state(toggle_state_for(new_size, self.max_size))
    }
}

/// Scoped observation of one [`QueueEvent`].
///
/// Calls [`Queue::observe`] on construction and
/// [`Queue::stop_observing`] when dropped. Move-only; supports explicit
/// early release through [`stop`](QueueObserverGuard::stop).
pub struct QueueObserverGuard<'a, T> {
    queue: &'a Queue<T>,
    event: QueueEvent,
    fd: RawFd,
    active: bool,
}

impl<'a, T> QueueObserverGuard<'a, T> {
    fn new(queue: &'a Queue<T>, event: QueueEvent) -> SyncResult<Self> {
        let fd = queue.observe(event)?;
        Ok(Self {
            queue,
            event,
            fd,
            active: true,
        })
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// The notification fd acquired by this guard. Meaningless once the
    /// guard has been stopped.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn event(&self) -> QueueEvent {
        self.event
    }

    /// Acknowledge a notification on the guarded fd
    pub fn ack(&self) -> SyncResult<()> {
        self.queue.ack(self.fd, self.event)
    }

    /// Stop observing early. A no-op on an already stopped guard.
    pub fn stop(&mut self) -> SyncResult<()> {
        if self.active {
            self.active = false;
            self.queue.stop_observing(self.fd, self.event)?;
            self.fd = -1;
        }
        Ok(())
    }
}

impl<T> Drop for QueueObserverGuard<'_, T> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.stop() {
                log::error!(
                    "queue observer guard drop failed for fd {} ({:?}): {}",
                    self.fd,
                    self.event,
                    e
                );
            }
        }
    }
}
