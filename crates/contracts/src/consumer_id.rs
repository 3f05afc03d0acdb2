//! ConsumerId - process-unique subscriber identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONSUMER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one consumer attached (or attachable) to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Allocate a fresh id, never reused within the process.
    pub fn next() -> Self {
        Self(NEXT_CONSUMER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConsumerId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}
