/*!
 * Pollable Semaphore
 * Counting semaphore whose count is observable through its file descriptor
 */

use crate::core::errors::SyncResult;
use crate::epoll::{EpollSet, EventSet};
use crate::fd::{CounterFd, CounterMode, OnExec};
use std::os::fd::RawFd;
use std::time::Duration;

/// A counting semaphore backed by a semaphore-mode [`CounterFd`].
///
/// The descriptor returned by [`fd`](Semaphore::fd) is readable while the
/// count is positive and writable while it is below
/// [`MAX_COUNT`](Semaphore::MAX_COUNT), so the semaphore can sit in an
/// epoll set next to sockets and timers. External holders of the fd must
/// only poll it; reading or writing it directly corrupts the count.
#[derive(Debug)]
pub struct Semaphore {
    fd: CounterFd,
}

impl Semaphore {
    /// Largest count the semaphore can reach; `up` past this point blocks
    pub const MAX_COUNT: u64 = crate::fd::MAX_COUNTER_VALUE;

    /// Create a semaphore with a count of zero
    pub fn new() -> SyncResult<Self> {
        Self::with_initial(0)
    }

    pub fn with_initial(initial: u64) -> SyncResult<Self> {
        Self::with_on_exec(initial, OnExec::Close)
    }

    pub fn with_on_exec(initial: u64, on_exec: OnExec) -> SyncResult<Self> {
        Ok(Self {
            fd: CounterFd::new(initial, CounterMode::Semaphore, on_exec)?,
        })
    }

    /// The pollable descriptor. Callers may only register it for polling.
    pub fn fd(&self) -> RawFd {
        self.fd.raw_fd()
    }

    /// Increment the count by one, blocking while the semaphore is
    /// saturated
    pub fn up(&self) -> SyncResult<()> {
        self.add(1)
    }

    /// Increment the count by `v`, blocking until the whole amount fits
    pub fn add(&self, v: u64) -> SyncResult<()> {
        loop {
            if self.fd.try_write(v)? {
                return Ok(());
            }
        }
    }

    /// Bounded [`add`](Semaphore::add): waits for the writable dimension
    /// up to `timeout` (`None` blocks indefinitely). Returns true iff the
    /// increment was performed.
    pub fn add_timeout(&self, v: u64, timeout: Option<Duration>) -> SyncResult<bool> {
        match timeout {
            None => {
                self.add(v)?;
                Ok(true)
            }
            Some(t) => {
                let mut poll_set = EpollSet::for_target(self.fd.raw_fd(), EventSet::WRITE)?;
                if poll_set.wait(Some(t), 0)? {
                    self.fd.write(v)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Decrement the count by one, blocking while it is zero
    pub fn down(&self) -> SyncResult<()> {
        loop {
            if self.fd.try_read()?.is_some() {
                return Ok(());
            }
        }
    }

    /// Bounded [`down`](Semaphore::down): waits for the readable dimension
    /// up to `timeout`. Returns true iff the decrement was performed.
    pub fn down_timeout(&self, timeout: Option<Duration>) -> SyncResult<bool> {
        match timeout {
            None => {
                self.down()?;
                Ok(true)
            }
            Some(t) => {
                let mut poll_set = EpollSet::for_target(self.fd.raw_fd(), EventSet::READ)?;
                if poll_set.wait(Some(t), 0)? {
                    self.fd.read()?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}
