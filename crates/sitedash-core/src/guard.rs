use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide single-flight token for build and ingestion jobs.
///
/// Capacity is one: `try_acquire` either hands out the only permit or
/// returns `None`. Callers never wait. Clones share the same token.
#[derive(Debug, Clone, Default)]
pub struct BuildGuard {
    running: Arc<AtomicBool>,
}

/// Proof that the holder owns the guard. Dropping it releases the guard,
/// including during a panic unwind.
#[derive(Debug)]
pub struct BuildPermit {
    running: Arc<AtomicBool>,
}

impl BuildGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<BuildPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BuildPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for BuildPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
