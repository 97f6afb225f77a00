/*!
 * Observer Guard
 * RAII handle that returns its observation fd on every exit path
 */

use super::condition::Condition;
use crate::core::errors::SyncResult;
use std::os::fd::RawFd;

/// Scoped observation of a [`Condition`].
///
/// Calls [`Condition::observe`] on construction and
/// [`Condition::stop_observing`] when dropped, so the observation fd is
/// returned on success, early return and unwind alike. Move-only; the fd
/// can also be released early with [`stop`](ObserverGuard::stop).
pub struct ObserverGuard<'a> {
    condition: &'a Condition,
    fd: RawFd,
    active: bool,
}

impl<'a> ObserverGuard<'a> {
    pub(crate) fn new(condition: &'a Condition) -> SyncResult<Self> {
        let fd = condition.observe()?;
        Ok(Self {
            condition,
            fd,
            active: true,
        })
    }

    /// True while the guard still observes its condition
    pub fn active(&self) -> bool {
        self.active
    }

    /// The notification fd acquired by this guard. Meaningless once the
    /// guard has been stopped.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Acknowledge a notification on the guarded fd.
    /// See [`Condition::ack`].
    pub fn ack(&self) -> SyncResult<()> {
        self.condition.ack(self.fd)
    }

    /// Stop observing early. A no-op on an already stopped guard.
    pub fn stop(&mut self) -> SyncResult<()> {
        if self.active {
            self.active = false;
            self.condition.stop_observing(self.fd)?;
            self.fd = -1;
        }
        Ok(())
    }
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.stop() {
                log::error!("observer guard drop failed for fd {}: {}", self.fd, e);
            }
        }
    }
}
