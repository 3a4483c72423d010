//! The change flag shared between the detector and the dispatch loop.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A set/test-and-clear flag. Clones share the same flag; separately
/// constructed signals never do.
#[derive(Debug, Clone, Default)]
pub struct ChangeSignal {
    flag: Arc<AtomicBool>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clears the flag and reports whether it was set.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}
