/*!
 * Read/Write Toggle
 * Explicit control over whether a descriptor polls readable, writable or both
 */

use crate::core::errors::SyncResult;
use crate::fd::{CounterFd, CounterMode, OnExec, MAX_COUNTER_VALUE};
use serde::{Deserialize, Serialize};
use std::os::fd::RawFd;

/// Logical poll state of a [`ReadWriteToggle`]'s descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToggleState {
    /// Descriptor polls readable only
    ReadOnly,
    /// Descriptor polls writable only
    WriteOnly,
    /// Descriptor polls readable and writable
    ReadWrite,
}

/// Counter values that realize each logical state. A full counter blocks
/// writers (read-only), an empty one blocks readers (write-only), and one
/// unit leaves both dimensions open.
const fn state_value(state: ToggleState) -> u64 {
    match state {
        ToggleState::ReadOnly => MAX_COUNTER_VALUE,
        ToggleState::WriteOnly => 0,
        ToggleState::ReadWrite => 1,
    }
}

/// A descriptor whose readability and writability are set explicitly.
///
/// One thread signals another waiting in epoll by switching the toggle
/// between [`ToggleState::ReadOnly`], [`ToggleState::WriteOnly`] and
/// [`ToggleState::ReadWrite`]. The intended application is pollable
/// containers: readable while items are available, writable while space
/// remains. Observers may only poll the descriptor; reading or writing it
/// breaks the state encoding.
///
/// Limitations of the counter encoding: the descriptor can never be
/// neither readable nor writable, and transitions that pass through the
/// read-to-zero reset (ReadOnly or WriteOnly into ReadWrite) can produce
/// a spurious edge-trigger event on the readable dimension even though no
/// logical readability change took place.
#[derive(Debug)]
pub struct ReadWriteToggle {
    fd: CounterFd,
    state: ToggleState,
}

impl ReadWriteToggle {
    /// Create a toggle in the [`ToggleState::ReadWrite`] state
    pub fn new() -> SyncResult<Self> {
        Self::with_on_exec(OnExec::Close)
    }

    pub fn with_on_exec(on_exec: OnExec) -> SyncResult<Self> {
        Ok(Self {
            fd: CounterFd::new(
                state_value(ToggleState::ReadWrite),
                CounterMode::ResetOnRead,
                on_exec,
            )?,
            state: ToggleState::ReadWrite,
        })
    }

    /// The pollable descriptor. Callers may only register it for polling.
    pub fn fd(&self) -> RawFd {
        self.fd.raw_fd()
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    /// Move the descriptor to `new_state`. A no-op when the state does not
    /// change. Callers serialize transitions through `&mut self`.
    pub fn set_state(&mut self, new_state: ToggleState) -> SyncResult<()> {
        if new_state != self.state {
            self.change_state(new_state)?;
        }
        Ok(())
    }

    fn change_state(&mut self, new_state: ToggleState) -> SyncResult<()> {
        let old_value = state_value(self.state);
        let new_value = state_value(new_state);
        if new_value > old_value {
            self.fd.write(new_value - old_value)?;
        } else if new_value < old_value {
            // Reset to zero, then rebuild the target value
            self.fd.read()?;
            if new_value > 0 {
                self.fd.write(new_value)?;
            }
        }
        self.state = new_state;
        Ok(())
    }
}
