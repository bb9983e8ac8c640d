use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide "a dispense is in progress" gate.
///
/// Acquisition hands out a [`DispenseGuard`]; dropping the guard releases
/// the lock, so every exit path out of order processing (success, item
/// failure, panic unwinding) frees it.
#[derive(Debug, Clone, Default)]
pub struct DispensingLock {
    held: Arc<AtomicBool>,
}

impl DispensingLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another order already holds the lock.
    pub fn try_acquire(&self) -> Option<DispenseGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DispenseGuard {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct DispenseGuard {
    held: Arc<AtomicBool>,
}

impl Drop for DispenseGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
