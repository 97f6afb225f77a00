/*!
 * Pollable Synchronization Primitives
 * Semaphore, read/write toggle and condition variable with fd observation
 */

mod condition;
mod guard;
mod semaphore;
mod toggle;

pub use condition::Condition;
pub use guard::ObserverGuard;
pub use semaphore::Semaphore;
pub use toggle::{ReadWriteToggle, ToggleState};
