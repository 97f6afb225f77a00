/*!
 * Deadline Tracking
 * Shared timeout budget for multi-stage waits
 */

use std::time::{Duration, Instant};

/// A wait budget derived from an optional timeout.
///
/// `None` means "no deadline" (block indefinitely); `Some(t)` converts to
/// an absolute instant so that successive sub-waits share a single budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Time left in the budget. `None` means unbounded; a zero duration
    /// means the budget is spent.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_deadline_never_expires() {
        let deadline = Deadline::after(None);
        assert_eq!(deadline.remaining(), None);
        assert!(!deadline.expired());
    }

    #[test]
    fn test_zero_timeout_is_spent_immediately() {
        let deadline = Deadline::after(Some(Duration::ZERO));
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_remaining_shrinks() {
        let deadline = Deadline::after(Some(Duration::from_millis(200)));
        let first = deadline.remaining().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let second = deadline.remaining().unwrap();
        assert!(second < first);
    }
}
