//! The interfaces a port provides to the test cases.
//!
//! These mirror the services of a platform abstraction layer: the SDEI
//! dispatcher reached through SMC calls, the generic watchdogs described by
//! the firmware tables, the interrupt controller, the memory map, and the PE
//! the test runs on.
use crate::{
    outcome::TestOutcome,
    sdei::{
        EnableEventError, EventHandler, EventNum, EventStatus, EventStatusError, IntId,
        InterruptBindError, InterruptReleaseError, RegisterEventError, Routing,
        UnregisterEventError, Unregistration,
    },
};

/// A physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

/// A virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(pub usize);

/// The SDEI dispatcher's event management and query calls.
pub trait Sdei {
    /// `SDEI_EVENT_STATUS`
    fn event_status(&self, event: EventNum) -> Result<EventStatus, EventStatusError>;

    /// `SDEI_INTERRUPT_BIND`. Returns the number of the newly created event.
    fn interrupt_bind(&self, int_id: IntId) -> Result<EventNum, InterruptBindError>;

    /// `SDEI_EVENT_REGISTER`
    ///
    /// # Safety
    ///
    /// `handler.entry` may be called with `handler.arg` from an interrupt
    /// context at any point until the registration is dropped by a successful
    /// unregistration and any running handler has completed. The caller must
    /// keep whatever `handler.arg` refers to valid for that long.
    unsafe fn event_register(
        &self,
        event: EventNum,
        handler: EventHandler,
        routing: Routing,
    ) -> Result<(), RegisterEventError>;

    /// `SDEI_EVENT_ENABLE`
    fn event_enable(&self, event: EventNum) -> Result<(), EnableEventError>;

    /// `SDEI_EVENT_UNREGISTER`
    fn event_unregister(&self, event: EventNum) -> Result<Unregistration, UnregisterEventError>;

    /// `SDEI_INTERRUPT_RELEASE`
    fn interrupt_release(&self, event: EventNum) -> Result<(), InterruptReleaseError>;
}

/// A generic watchdog as described by the platform's firmware tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogInfo {
    /// The physical base address of the watchdog control frame.
    pub ctrl_base: PhysAddr,
    /// The interrupt raised by the watchdog's WS0 signal.
    pub gsiv: IntId,
    /// The watchdog is only accessible from the secure world.
    pub is_secure: bool,
}

pub trait Watchdog {
    /// The number of watchdogs on the platform.
    fn watchdog_count(&self) -> usize;

    /// Get the description of the watchdog at `index`. Returns `None` if
    /// `index` is out of range.
    fn watchdog_info(&self, index: usize) -> Option<WatchdogInfo>;

    /// Program the watchdog so that WS0 is asserted after `ticks` ticks.
    /// `ticks == 0` disarms the watchdog.
    fn set_ws0(&self, ctrl_base: VirtAddr, index: usize, ticks: u64);
}

/// The interrupt ID is not valid for the interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadInterruptError;

pub trait Gic {
    fn disable_interrupt(&self, int_id: IntId) -> Result<(), BadInterruptError>;
}

/// The physical address could not be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapError;

pub trait Memory {
    /// Map a device frame and return its virtual address.
    fn pa_to_va(&self, pa: PhysAddr) -> Result<VirtAddr, MapError>;

    /// Unmap a frame mapped by [`Self::pa_to_va`].
    fn va_free(&self, va: VirtAddr);
}

/// The processing element the test runs on.
pub trait Pe {
    fn pe_index(&self) -> usize;

    /// Clean and invalidate the data cache line containing `addr`, making
    /// a preceding write visible to other observers.
    fn data_cache_clean_invalidate(&self, addr: usize);

    /// Invalidate the data cache line containing `addr`, so that a following
    /// read observes writes by other observers.
    fn data_cache_invalidate(&self, addr: usize);
}

/// The reporting side of the test harness.
pub trait Report {
    fn set_test_status(&self, pe_index: usize, outcome: TestOutcome);
}

/// Everything a test case needs from the platform.
pub trait Platform: Sdei + Watchdog + Gic + Memory + Pe + Report + Sync + 'static {}
impl<T: Sdei + Watchdog + Gic + Memory + Pe + Report + Sync + 'static> Platform for T {}

/// Enumerate the non-secure watchdogs, starting from the last index.
pub fn non_secure_watchdogs<W: Watchdog + ?Sized>(
    watchdog: &W,
) -> impl Iterator<Item = (usize, WatchdogInfo)> + '_ {
    (0..watchdog.watchdog_count())
        .rev()
        .filter_map(move |index| {
            let info = watchdog.watchdog_info(index)?;
            if info.is_secure {
                log::trace!("skipping secure watchdog {index}");
                None
            } else {
                Some((index, info))
            }
        })
}
