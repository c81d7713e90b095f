//! Test outcomes
use core::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

/// The result of a test run, published once per run.
///
/// Variants are ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TestOutcome {
    Pass = 0,
    /// An assertion did not hold or an operation failed unexpectedly.
    Fail = 1,
    /// The test could not determine the real outcome because the system under
    /// test was left in an ambiguous state.
    Error = 2,
}

impl TestOutcome {
    /// Return the more severe of `self` and `other`.
    #[inline]
    pub fn worse(self, other: Self) -> Self {
        self.max(other)
    }

    #[inline]
    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }

    fn from_u8(x: u8) -> Self {
        match x {
            0 => Self::Pass,
            1 => Self::Fail,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        })
    }
}

/// An outcome cell written from both the test sequence and the event handler.
///
/// An outcome, once recorded, can only get worse.
pub struct OutcomeCell {
    value: AtomicU8,
}

impl OutcomeCell {
    pub const fn new() -> Self {
        Self {
            value: AtomicU8::new(TestOutcome::Pass as u8),
        }
    }

    pub fn reset(&self) {
        self.value.store(TestOutcome::Pass as u8, Ordering::Release);
    }

    pub fn get(&self) -> TestOutcome {
        TestOutcome::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Record `outcome` unless a worse one is already recorded.
    pub fn record(&self, outcome: TestOutcome) {
        // Note: Some targets don't support CAS atomics. The two writers never
        // run concurrently (the handler preempts the test sequence and runs to
        // completion), so a load-store pair is sufficient.
        let current = self.get();
        self.value
            .store(current.worse(outcome) as u8, Ordering::Release);
    }

    #[inline]
    pub fn fail(&self) {
        self.record(TestOutcome::Fail);
    }
}

impl Default for OutcomeCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OutcomeCell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("OutcomeCell").field(&self.get()).finish()
    }
}
