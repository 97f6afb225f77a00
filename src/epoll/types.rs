/*!
 * Multiplexor Types
 * Abstract readiness events and their kernel flag translation
 */

use nix::sys::epoll::EpollFlags;
use serde::{Deserialize, Serialize};
use std::os::fd::RawFd;

bitflags::bitflags! {
    /// Readiness conditions a registration can watch or report
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventSet: u32 {
        const READ = 0x01;
        const WRITE = 0x02;
        const READ_HANGUP = 0x04;
        const HANGUP = 0x08;
        const PRIORITY = 0x10;
        const ERROR = 0x20;
    }
}

/// Level-triggered registrations report readiness continuously; edge
/// triggered ones only on transitions into readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    Level,
    Edge,
}

/// Whether a registration stays armed after delivering an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Repeat {
    Repeating,
    OneShot,
}

/// One triggered registration, as reported by [`EpollSet::wait`]
///
/// [`EpollSet::wait`]: crate::epoll::EpollSet::wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    fd: RawFd,
    events: EventSet,
}

impl ReadyEvent {
    pub(crate) fn new(fd: RawFd, events: EventSet) -> Self {
        Self { fd, events }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn events(&self) -> EventSet {
        self.events
    }
}

const FLAG_MAP: [(EpollFlags, EventSet); 6] = [
    (EpollFlags::EPOLLIN, EventSet::READ),
    (EpollFlags::EPOLLOUT, EventSet::WRITE),
    (EpollFlags::EPOLLRDHUP, EventSet::READ_HANGUP),
    (EpollFlags::EPOLLHUP, EventSet::HANGUP),
    (EpollFlags::EPOLLPRI, EventSet::PRIORITY),
    (EpollFlags::EPOLLERR, EventSet::ERROR),
];

pub(crate) fn to_epoll_flags(events: EventSet, trigger: Trigger, repeat: Repeat) -> EpollFlags {
    let mut flags = EpollFlags::empty();
    for (kernel, event) in FLAG_MAP {
        if events.contains(event) {
            flags |= kernel;
        }
    }
    if trigger == Trigger::Edge {
        flags |= EpollFlags::EPOLLET;
    }
    if repeat == Repeat::OneShot {
        flags |= EpollFlags::EPOLLONESHOT;
    }
    flags
}

pub(crate) fn from_epoll_flags(flags: EpollFlags) -> EventSet {
    let mut events = EventSet::empty();
    for (kernel, event) in FLAG_MAP {
        if flags.contains(kernel) {
            events |= event;
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_translation_round_trip() {
        let events = EventSet::READ | EventSet::PRIORITY | EventSet::ERROR;
        let flags = to_epoll_flags(events, Trigger::Level, Repeat::Repeating);
        assert_eq!(from_epoll_flags(flags), events);
    }

    #[test]
    fn test_trigger_and_repeat_flags() {
        let flags = to_epoll_flags(EventSet::WRITE, Trigger::Edge, Repeat::OneShot);
        assert!(flags.contains(EpollFlags::EPOLLET));
        assert!(flags.contains(EpollFlags::EPOLLONESHOT));
        assert!(flags.contains(EpollFlags::EPOLLOUT));
        assert!(!flags.contains(EpollFlags::EPOLLIN));
    }

    #[test]
    fn test_kernel_only_flags_are_dropped() {
        // EPOLLET is a registration flag, not a reportable condition
        let events = from_epoll_flags(EpollFlags::EPOLLIN | EpollFlags::EPOLLET);
        assert_eq!(events, EventSet::READ);
    }
}
