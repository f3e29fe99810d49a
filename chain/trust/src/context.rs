//! Block-scoped execution context

use serde::{Deserialize, Serialize};

/// Logical clock supplied by the host for one block.
///
/// The module never reads wall-clock time; every deadline is compared
/// against `time` (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: u64,
    pub time: i64,
}

impl BlockContext {
    pub fn new(height: u64, time: i64) -> Self {
        Self { height, time }
    }

    /// Context `secs` later, one block higher.
    pub fn advance(&self, secs: i64) -> Self {
        Self {
            height: self.height + 1,
            time: self.time + secs,
        }
    }
}
