use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::Pe;

/// A one-shot completion signal from an interrupt context to the polling
/// context.
///
/// Every write is followed by a cache clean, and every read is preceded by a
/// cache invalidate, so the flag works even if the observers don't share a
/// coherent view of the memory.
pub struct CompletionFlag {
    done: AtomicBool,
}

impl CompletionFlag {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    fn addr(&self) -> usize {
        &self.done as *const AtomicBool as usize
    }

    /// Mark the flag as "not done". Must not be called while the writer could
    /// be running.
    pub fn reset<P: Pe + ?Sized>(&self, pe: &P) {
        self.done.store(false, Ordering::Release);
        pe.data_cache_clean_invalidate(self.addr());
    }

    /// Mark the flag as "done" and make the write visible.
    pub fn publish<P: Pe + ?Sized>(&self, pe: &P) {
        self.done.store(true, Ordering::Release);
        pe.data_cache_clean_invalidate(self.addr());
    }

    /// Read the flag, discarding any stale cached copy first.
    pub fn observe<P: Pe + ?Sized>(&self, pe: &P) -> bool {
        pe.data_cache_invalidate(self.addr());
        self.done.load(Ordering::Acquire)
    }
}

impl Default for CompletionFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// [`spin_until`] ran out of its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinTimeout;

/// Busy-wait until `cond` returns `true`, evaluating it at most `budget + 1`
/// times.
///
/// Returns the budget left when `cond` became `true`.
pub fn spin_until(budget: u64, mut cond: impl FnMut() -> bool) -> Result<u64, SpinTimeout> {
    let mut remaining = budget;
    loop {
        if cond() {
            return Ok(remaining);
        }
        if remaining == 0 {
            return Err(SpinTimeout);
        }
        remaining -= 1;
        core::hint::spin_loop();
    }
}
