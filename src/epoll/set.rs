/*!
 * Epoll Set
 * Registration table and wait loop over a kernel readiness set
 */

use super::types::{from_epoll_flags, to_epoll_flags, EventSet, ReadyEvent, Repeat, Trigger};
use crate::core::errors::{SyncError, SyncResult};
use crate::fd::OnExec;
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollTimeout};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

/// epoll only accepts an i32 millisecond timeout; anything longer is
/// clamped rather than rejected
const MAX_WAIT: Duration = Duration::from_millis(i32::MAX as u64);

fn create_epoll(on_exec: OnExec) -> SyncResult<Epoll> {
    let flags = match on_exec {
        OnExec::Close => EpollCreateFlags::EPOLL_CLOEXEC,
        OnExec::Keep => EpollCreateFlags::empty(),
    };
    Epoll::new(flags).map_err(|e| SyncError::system("failed to create epoll set", e))
}

fn kernel_timeout(timeout: Option<Duration>) -> EpollTimeout {
    match timeout {
        None => EpollTimeout::NONE,
        // The clamp keeps the conversion infallible
        Some(t) => EpollTimeout::try_from(t.min(MAX_WAIT)).unwrap_or(EpollTimeout::NONE),
    }
}

/// A set of watched file descriptors backed by a kernel epoll instance.
///
/// Registrations carry an [`EventSet`] bitmask plus [`Trigger`] and
/// [`Repeat`] modes. [`wait`](EpollSet::wait) collects the triggered
/// registrations into an event list retrievable through
/// [`events`](EpollSet::events) until the next wait.
///
/// The set does not take ownership of registered descriptors; callers
/// must keep them open for as long as they stay registered.
#[derive(Debug)]
pub struct EpollSet {
    on_exec: OnExec,
    epoll: Epoll,
    num_targets: u32,
    events: Vec<ReadyEvent>,
}

impl EpollSet {
    /// Create an empty set with close-on-exec enabled
    pub fn new() -> SyncResult<Self> {
        Self::with_on_exec(OnExec::Close)
    }

    pub fn with_on_exec(on_exec: OnExec) -> SyncResult<Self> {
        Ok(Self {
            on_exec,
            epoll: create_epoll(on_exec)?,
            num_targets: 0,
            events: Vec::new(),
        })
    }

    /// Create a set watching a single descriptor, level-triggered and
    /// repeating. This is the common shape for bounded waits on one fd.
    pub fn for_target(fd: RawFd, events: EventSet) -> SyncResult<Self> {
        let mut set = Self::new()?;
        set.add(fd, events, Trigger::Level, Repeat::Repeating)?;
        Ok(set)
    }

    /// The epoll descriptor itself
    pub fn fd(&self) -> RawFd {
        self.epoll.0.as_raw_fd()
    }

    /// Number of currently registered descriptors
    pub fn num_targets(&self) -> u32 {
        self.num_targets
    }

    /// Events produced by the most recent successful [`wait`](EpollSet::wait)
    pub fn events(&self) -> &[ReadyEvent] {
        &self.events
    }

    /// Register `fd` for the given events. Registering a descriptor twice
    /// fails with [`SyncError::ItemExists`].
    pub fn add(
        &mut self,
        fd: RawFd,
        events: EventSet,
        trigger: Trigger,
        repeat: Repeat,
    ) -> SyncResult<()> {
        let event = EpollEvent::new(to_epoll_flags(events, trigger, repeat), fd as u64);
        // Safety: the caller keeps the fd open while it is registered
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        match self.epoll.add(borrowed, event) {
            Ok(()) => {
                self.num_targets += 1;
                Ok(())
            }
            Err(Errno::EEXIST) => Err(SyncError::ItemExists(format!(
                "fd {} is already registered with this epoll set",
                fd
            ))),
            Err(e) => Err(SyncError::system("cannot add fd to epoll set", e)),
        }
    }

    /// Replace the registration for `fd`. Fails with
    /// [`SyncError::NoSuchItem`] if the descriptor is not registered.
    pub fn modify(
        &mut self,
        fd: RawFd,
        events: EventSet,
        trigger: Trigger,
        repeat: Repeat,
    ) -> SyncResult<()> {
        let mut event = EpollEvent::new(to_epoll_flags(events, trigger, repeat), fd as u64);
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        match self.epoll.modify(borrowed, &mut event) {
            Ok(()) => Ok(()),
            Err(Errno::ENOENT) => Err(SyncError::NoSuchItem(format!(
                "fd {} is not registered with this epoll set",
                fd
            ))),
            Err(e) => Err(SyncError::system("could not modify fd in epoll set", e)),
        }
    }

    /// Drop the registration for `fd`. Fails with
    /// [`SyncError::NoSuchItem`] if the descriptor is not registered; the
    /// registration count is left untouched in that case.
    pub fn remove(&mut self, fd: RawFd) -> SyncResult<()> {
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        match self.epoll.delete(borrowed) {
            Ok(()) => {
                self.num_targets -= 1;
                Ok(())
            }
            Err(Errno::ENOENT) => Err(SyncError::NoSuchItem(format!(
                "fd {} is not registered with this epoll set",
                fd
            ))),
            Err(e) => Err(SyncError::system("could not remove fd from epoll set", e)),
        }
    }

    /// Drop every registration by discarding and recreating the kernel set
    pub fn clear(&mut self) -> SyncResult<()> {
        self.epoll = create_epoll(self.on_exec)?;
        self.num_targets = 0;
        self.events.clear();
        Ok(())
    }

    /// Block until at least one registration triggers or the timeout
    /// elapses. `None` blocks indefinitely, a zero duration polls once.
    ///
    /// `max_events == 0` sizes the result buffer to the registration
    /// count. Interrupted waits are retried with the original timeout.
    /// Returns true iff at least one event was produced; the events stay
    /// accessible through [`events`](EpollSet::events).
    pub fn wait(&mut self, timeout: Option<Duration>, max_events: usize) -> SyncResult<bool> {
        let capacity = if max_events > 0 {
            max_events
        } else {
            (self.num_targets as usize).max(1)
        };
        let mut buf = vec![EpollEvent::empty(); capacity];
        let timeout = kernel_timeout(timeout);

        let produced = loop {
            match self.epoll.wait(&mut buf, timeout) {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(SyncError::system("error waiting on epoll set", e)),
            }
        };

        self.events.clear();
        for event in &buf[..produced] {
            self.events.push(ReadyEvent::new(
                event.data() as RawFd,
                from_epoll_flags(event.events()),
            ));
        }
        Ok(produced > 0)
    }

    /// Block indefinitely, then hand the produced events to `on_ready`
    pub fn when_ready<R>(&mut self, on_ready: impl FnOnce(&[ReadyEvent]) -> R) -> SyncResult<R> {
        self.wait(None, 0)?;
        Ok(on_ready(&self.events))
    }

    /// Bounded variant of [`when_ready`](EpollSet::when_ready):
    /// dispatches to `on_timeout` when the wait produced nothing
    pub fn when_ready_or<R>(
        &mut self,
        timeout: Option<Duration>,
        on_ready: impl FnOnce(&[ReadyEvent]) -> R,
        on_timeout: impl FnOnce() -> R,
    ) -> SyncResult<R> {
        if self.wait(timeout, 0)? {
            Ok(on_ready(&self.events))
        } else {
            Ok(on_timeout())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::{CounterFd, CounterMode};

    fn counter() -> CounterFd {
        CounterFd::new(0, CounterMode::Semaphore, OnExec::Close).unwrap()
    }

    #[test]
    fn test_add_duplicate_fails() {
        let mut set = EpollSet::new().unwrap();
        assert!(set.fd() >= 0);
        assert_eq!(set.num_targets(), 0);

        let fd1 = counter();
        set.add(
            fd1.raw_fd(),
            EventSet::READ | EventSet::READ_HANGUP,
            Trigger::Edge,
            Repeat::Repeating,
        )
        .unwrap();
        assert_eq!(set.num_targets(), 1);

        let fd2 = counter();
        set.add(
            fd2.raw_fd(),
            EventSet::WRITE | EventSet::PRIORITY | EventSet::ERROR,
            Trigger::Level,
            Repeat::OneShot,
        )
        .unwrap();
        assert_eq!(set.num_targets(), 2);

        let err = set
            .add(fd1.raw_fd(), EventSet::WRITE, Trigger::Level, Repeat::Repeating)
            .unwrap_err();
        assert!(matches!(err, SyncError::ItemExists(_)));
        assert_eq!(set.num_targets(), 2);
    }

    #[test]
    fn test_modify_unknown_fd_fails() {
        let mut set = EpollSet::new().unwrap();
        let registered = counter();
        set.add(
            registered.raw_fd(),
            EventSet::READ,
            Trigger::Edge,
            Repeat::Repeating,
        )
        .unwrap();

        set.modify(
            registered.raw_fd(),
            EventSet::READ | EventSet::WRITE,
            Trigger::Level,
            Repeat::OneShot,
        )
        .unwrap();
        assert_eq!(set.num_targets(), 1);

        let stranger = counter();
        let err = set
            .modify(stranger.raw_fd(), EventSet::WRITE, Trigger::Level, Repeat::Repeating)
            .unwrap_err();
        assert!(matches!(err, SyncError::NoSuchItem(_)));
    }

    #[test]
    fn test_remove_unknown_fd_fails() {
        let mut set = EpollSet::new().unwrap();
        let fd1 = counter();
        let fd2 = counter();
        set.add(fd1.raw_fd(), EventSet::READ, Trigger::Level, Repeat::Repeating)
            .unwrap();
        set.add(fd2.raw_fd(), EventSet::READ, Trigger::Level, Repeat::Repeating)
            .unwrap();

        set.remove(fd1.raw_fd()).unwrap();
        assert_eq!(set.num_targets(), 1);
        set.remove(fd2.raw_fd()).unwrap();
        assert_eq!(set.num_targets(), 0);

        let err = set.remove(fd1.raw_fd()).unwrap_err();
        assert!(matches!(err, SyncError::NoSuchItem(_)));
        assert_eq!(set.num_targets(), 0);
    }

    #[test]
    fn test_clear_resets_registrations() {
        let mut set = EpollSet::new().unwrap();
        let fd1 = counter();
        set.add(fd1.raw_fd(), EventSet::READ, Trigger::Level, Repeat::Repeating)
            .unwrap();
        assert_eq!(set.num_targets(), 1);

        set.clear().unwrap();
        assert_eq!(set.num_targets(), 0);

        // The same fd can be registered again after a clear
        set.add(fd1.raw_fd(), EventSet::READ, Trigger::Level, Repeat::Repeating)
            .unwrap();
        assert_eq!(set.num_targets(), 1);
    }

    #[test]
    fn test_poll_reports_readable_counter() {
        let fd = counter();
        let mut set = EpollSet::for_target(fd.raw_fd(), EventSet::READ).unwrap();

        // Nothing written yet: a zero-timeout wait produces no events
        assert!(!set.wait(Some(Duration::ZERO), 0).unwrap());
        assert!(set.events().is_empty());

        fd.write(1).unwrap();
        assert!(set.wait(Some(Duration::ZERO), 0).unwrap());
        assert_eq!(set.events().len(), 1);
        assert_eq!(set.events()[0].fd(), fd.raw_fd());
        assert_eq!(set.events()[0].events(), EventSet::READ);
    }

    #[test]
    fn test_edge_triggered_one_shot_goes_inert() {
        let fd = counter();
        let mut set = EpollSet::new().unwrap();
        set.add(fd.raw_fd(), EventSet::READ, Trigger::Edge, Repeat::OneShot)
            .unwrap();

        fd.write(1).unwrap();
        assert!(set.wait(Some(Duration::from_millis(100)), 0).unwrap());
        assert_eq!(set.events()[0].events(), EventSet::READ);

        // One-shot: the registration is inert until re-armed, even though
        // the counter is still readable
        assert!(!set.wait(Some(Duration::from_millis(50)), 0).unwrap());

        set.modify(fd.raw_fd(), EventSet::READ, Trigger::Edge, Repeat::OneShot)
            .unwrap();
        assert!(set.wait(Some(Duration::from_millis(100)), 0).unwrap());
    }
}
