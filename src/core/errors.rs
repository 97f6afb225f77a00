/*!
 * Error Types
 * Centralized error handling with thiserror and serde support
 */

use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for all primitive operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Unified error type for the pollable primitives
///
/// Errors carry a short description of the failing operation; system
/// errors additionally carry the raw errno for diagnostics.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SyncError {
    #[error("Illegal value: {0}")]
    IllegalValue(String),

    #[error("No such item: {0}")]
    NoSuchItem(String),

    #[error("Item exists: {0}")]
    ItemExists(String),

    #[error("System error: {context}: {errno}")]
    System { context: String, errno: i32 },
}

impl SyncError {
    /// Wrap an OS-level failure, keeping the errno
    pub fn system(context: impl Into<String>, errno: Errno) -> Self {
        SyncError::System {
            context: context.into(),
            errno: errno as i32,
        }
    }

    /// The errno of a system error, if this is one
    pub fn errno(&self) -> Option<Errno> {
        match self {
            SyncError::System { errno, .. } => Some(Errno::from_raw(*errno)),
            _ => None,
        }
    }
}
