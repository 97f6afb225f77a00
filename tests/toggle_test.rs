/*!
 * Read/Write Toggle Integration Tests
 * Verifies the poll state matches the logical state across transitions
 */

use pollsync::{EpollSet, EventSet, ReadWriteToggle, ToggleState};
use std::time::Duration;

fn events_for(state: ToggleState) -> EventSet {
    match state {
        ToggleState::ReadOnly => EventSet::READ,
        ToggleState::WriteOnly => EventSet::WRITE,
        ToggleState::ReadWrite => EventSet::READ | EventSet::WRITE,
    }
}

/// Poll the toggle's fd and check that exactly the readiness encoded by
/// `expected` is reported
fn assert_poll_state(toggle: &ReadWriteToggle, expected: ToggleState) {
    assert_eq!(toggle.state(), expected);

    let mut set = EpollSet::for_target(toggle.fd(), EventSet::READ | EventSet::WRITE).unwrap();
    assert!(set.wait(Some(Duration::ZERO), 0).unwrap());
    assert_eq!(set.events().len(), 1);
    assert_eq!(set.events()[0].fd(), toggle.fd());
    assert_eq!(set.events()[0].events(), events_for(expected));
}

fn verify_transition(from: ToggleState, to: ToggleState) {
    let mut toggle = ReadWriteToggle::new().unwrap();
    toggle.set_state(from).unwrap();
    assert_poll_state(&toggle, from);
    toggle.set_state(to).unwrap();
    assert_poll_state(&toggle, to);
}

#[test]
fn test_create_starts_read_write() {
    let toggle = ReadWriteToggle::new().unwrap();
    assert!(toggle.fd() >= 0);
    assert_poll_state(&toggle, ToggleState::ReadWrite);
}

#[test]
fn test_read_only_to_read_write() {
    verify_transition(ToggleState::ReadOnly, ToggleState::ReadWrite);
}

#[test]
fn test_read_only_to_write_only() {
    verify_transition(ToggleState::ReadOnly, ToggleState::WriteOnly);
}

#[test]
fn test_read_write_to_read_only() {
    verify_transition(ToggleState::ReadWrite, ToggleState::ReadOnly);
}

#[test]
fn test_read_write_to_write_only() {
    verify_transition(ToggleState::ReadWrite, ToggleState::WriteOnly);
}

#[test]
fn test_write_only_to_read_only() {
    verify_transition(ToggleState::WriteOnly, ToggleState::ReadOnly);
}

#[test]
fn test_write_only_to_read_write() {
    verify_transition(ToggleState::WriteOnly, ToggleState::ReadWrite);
}
