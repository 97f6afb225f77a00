/*!
 * Queue Types
 * Events a queue waiter or observer can subscribe to
 */

use serde::{Deserialize, Serialize};

/// State transitions of a [`Queue`] that can be waited for or observed
///
/// [`Queue`]: crate::queue::Queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEvent {
    /// Queue went from not empty to empty
    Empty,
    /// Queue went from empty to not empty
    NotEmpty,
    /// Queue went from not full to full
    Full,
    /// Queue went from full to not full
    NotFull,
    /// Queue size went from at or below the high water mark to above it,
    /// with the hysteresis latch clear
    HighWaterMark,
    /// Queue size went from above the low water mark to at or below it,
    /// with the hysteresis latch set
    LowWaterMark,
}
