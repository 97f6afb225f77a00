/*!
 * Counter Fd
 * eventfd wrapper with explicit blocking and would-block semantics
 */

use crate::core::errors::{SyncError, SyncResult};
use nix::errno::Errno;
use nix::sys::eventfd::{EfdFlags, EventFd};
use nix::unistd;
use serde::{Deserialize, Serialize};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

/// Largest value the kernel counter can hold
pub(crate) const MAX_COUNTER_VALUE: u64 = u64::MAX - 1;

/// Whether a descriptor survives a process-replace operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnExec {
    /// Descriptor is inherited across exec
    Keep,
    /// Descriptor is closed on exec (default)
    Close,
}

/// How a read drains the kernel counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterMode {
    /// Each read decrements the counter by one
    Semaphore,
    /// Each read returns the counter and resets it to zero
    ResetOnRead,
}

/// A kernel counter exposed as a pollable file descriptor.
///
/// The descriptor is readable while the counter is positive and writable
/// while the counter is below `u64::MAX - 1`. The counter is
/// adjusted only through [`read`](CounterFd::read) and
/// [`write`](CounterFd::write); external holders of the raw fd may only
/// poll it.
///
/// The descriptor stays in blocking mode: `read` on a zero counter and
/// `write` past the maximum suspend in the kernel. The `try_` variants
/// report would-block as a distinguished non-error so callers can probe
/// without committing to a wait.
#[derive(Debug)]
pub struct CounterFd {
    fd: EventFd,
}

impl CounterFd {
    /// Create a counter with the given initial value.
    ///
    /// Initial values above `u32::MAX` are applied with a follow-up write,
    /// since the kernel only accepts a 32-bit initial count at creation.
    pub fn new(initial: u64, mode: CounterMode, on_exec: OnExec) -> SyncResult<Self> {
        let mut flags = EfdFlags::empty();
        if mode == CounterMode::Semaphore {
            flags |= EfdFlags::EFD_SEMAPHORE;
        }
        if on_exec == OnExec::Close {
            flags |= EfdFlags::EFD_CLOEXEC;
        }

        let fd = EventFd::from_value_and_flags(0, flags)
            .map_err(|e| SyncError::system("failed to create event fd", e))?;
        let counter = Self { fd };
        if initial > 0 {
            counter.write(initial)?;
        }
        Ok(counter)
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_fd().as_raw_fd()
    }

    /// Blocking read. Returns the drained value (1 in semaphore mode, the
    /// whole counter in reset-on-read mode). Retries on EINTR.
    pub fn read(&self) -> SyncResult<u64> {
        loop {
            match self.try_read()? {
                Some(value) => return Ok(value),
                None => continue,
            }
        }
    }

    /// Blocking write of `v` onto the counter. Retries on EINTR.
    pub fn write(&self, v: u64) -> SyncResult<()> {
        loop {
            if self.try_write(v)? {
                return Ok(());
            }
        }
    }

    /// Read probe: `None` when the counter is empty and the descriptor is
    /// non-blocking, or when the read was interrupted before completing.
    pub fn try_read(&self) -> SyncResult<Option<u64>> {
        let mut buf = [0u8; 8];
        match unistd::read(self.fd.as_raw_fd(), &mut buf) {
            Ok(8) => Ok(Some(u64::from_ne_bytes(buf))),
            Ok(n) => Err(SyncError::system(
                format!("short read of {} bytes from event fd", n),
                Errno::EIO,
            )),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(None),
            Err(e) => Err(SyncError::system("read from event fd failed", e)),
        }
    }

    /// Write probe: `false` when the write would overflow the counter and
    /// the descriptor is non-blocking, or when interrupted.
    pub fn try_write(&self, v: u64) -> SyncResult<bool> {
        let buf = v.to_ne_bytes();
        match unistd::write(self.fd.as_fd(), &buf) {
            Ok(8) => Ok(true),
            Ok(n) => Err(SyncError::system(
                format!("short write of {} bytes to event fd", n),
                Errno::EIO,
            )),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(SyncError::system("write to event fd failed", e)),
        }
    }
}

impl AsFd for CounterFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
