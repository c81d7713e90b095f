//! Simulation environment for running the SDEI test suite on a hosted
//! environment.
//!
//! [`SimPlatform`] implements every trait in [`sdei_test_suite::platform`]:
//!
//!  - An SDEI dispatcher with a bound-interrupt event table. Unregistering a
//!    running event returns `Pending`, and the unregistration takes effect
//!    when the handler returns (the simulated `SDEI_EVENT_COMPLETE`).
//!  - Generic watchdogs driven by a timer thread. The same thread acts as the
//!    interrupt context: when a watchdog's WS0 signal fires, it delivers the
//!    bound event by calling the registered entry point.
//!  - A GIC, a memory map and a single PE.
//!
//! Every call is recorded with the context it was made from, so tests can
//! inspect the exact sequence of operations. [`Faults`] turn the simulated
//! platform into a misbehaving one to exercise error paths.
#![deny(unsafe_op_in_unsafe_fn)]
use sdei_test_suite::{
    outcome::TestOutcome,
    platform::{
        BadInterruptError, Gic, MapError, Memory, Pe, PhysAddr, Report, Sdei, VirtAddr, Watchdog,
        WatchdogInfo,
    },
    sdei::{
        EnableEventError, EventHandler, EventNum, EventStatus, EventStatusError, IntId,
        InterruptBindError, InterruptReleaseError, RegisterEventError, ResultCode, Routing,
        UnregisterEventError, Unregistration,
    },
};
use spin::Mutex as SpinMutex;
use std::{
    cell::Cell,
    sync::{atomic, mpsc, Arc},
    thread::JoinHandle,
    time::{Duration, Instant},
};

mod dispatcher;
mod timer;

pub use dispatcher::{FIRST_BOUND_EVENT_NUM, PE_AFFINITY};

/// The offset added to a physical address by [`Memory::pa_to_va`].
pub const VA_OFFSET: usize = 0x4000_0000;

/// The first interrupt ID that can't be disabled (special INTIDs).
pub const SPECIAL_INTID_START: IntId = 1020;

bitflags::bitflags! {
    /// Deviations from a conforming platform.
    #[derive(Default)]
    pub struct Faults: u32 {
        /// `disable_interrupt` fails.
        const GIC_DISABLE_FAILS = 1 << 0;
        /// `pa_to_va` fails.
        const MAP_FAILS = 1 << 1;
        /// `SDEI_INTERRUPT_BIND` fails with `OutOfResource`.
        const BIND_FAILS = 1 << 2;
        /// `SDEI_EVENT_STATUS` always reports `REGISTERED`.
        const REPORTS_REGISTERED_EARLY = 1 << 3;
        /// `SDEI_EVENT_REGISTER` fails with `Denied`.
        const REGISTER_FAILS = 1 << 4;
        /// `SDEI_EVENT_ENABLE` fails with `Denied`.
        const ENABLE_FAILS = 1 << 5;
        /// `SDEI_EVENT_ENABLE` succeeds without enabling the event.
        const ENABLE_IGNORED = 1 << 6;
        /// The watchdogs never fire.
        const TIMER_DEAD = 1 << 7;
        /// `SDEI_EVENT_STATUS` never reports `RUNNING`.
        const HIDES_RUNNING = 1 << 8;
        /// Unregistering a running event completes immediately.
        const UNREGISTER_IMMEDIATE = 1 << 9;
        /// A pending unregistration leaves the event registered on completion.
        const STUCK_REGISTERED = 1 << 10;
        /// Completing an event has no effect, so it keeps running.
        const COMPLETE_IGNORED = 1 << 11;
        /// `SDEI_EVENT_UNREGISTER` fails with `Denied`.
        const UNREGISTER_FAILS = 1 << 12;
        /// `SDEI_INTERRUPT_RELEASE` fails with `Denied`.
        const RELEASE_FAILS = 1 << 13;
        /// `SDEI_EVENT_STATUS` fails with `NotSupported`.
        const STATUS_FAILS = 1 << 14;
        /// `SDEI_EVENT_STATUS` always reports `ENABLED`.
        const REPORTS_ENABLED_EARLY = 1 << 15;
        /// `SDEI_EVENT_STATUS` keeps reporting `REGISTERED` while an
        /// unregistration is pending.
        const PENDING_REPORTS_REGISTERED = 1 << 16;
        /// `SDEI_EVENT_UNREGISTER` fails with `Denied` while the event is
        /// running.
        const DENIES_RUNNING_UNREGISTER = 1 << 17;
    }
}

/// A simulated generic watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogDesc {
    pub ctrl_base: PhysAddr,
    pub gsiv: IntId,
    pub is_secure: bool,
}

impl WatchdogDesc {
    /// A non-secure watchdog with a frame and an interrupt derived from
    /// `index`.
    pub const fn non_secure(index: usize) -> Self {
        Self {
            ctrl_base: PhysAddr(0x2a44_0000 + 0x1_0000 * index as u64),
            gsiv: 93 + index as IntId,
            is_secure: false,
        }
    }

    pub const fn secure(index: usize) -> Self {
        Self {
            is_secure: true,
            ..Self::non_secure(index)
        }
    }
}

/// Parameters of a [`SimPlatform`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub watchdogs: Vec<WatchdogDesc>,
    /// The duration of one watchdog tick.
    pub tick: Duration,
    pub pe_index: usize,
    pub faults: Faults,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            watchdogs: vec![WatchdogDesc::non_secure(0)],
            tick: Duration::from_micros(100),
            pe_index: 0,
            faults: Faults::empty(),
        }
    }
}

impl SimConfig {
    pub fn with_watchdogs(self, watchdogs: impl IntoIterator<Item = WatchdogDesc>) -> Self {
        Self {
            watchdogs: watchdogs.into_iter().collect(),
            ..self
        }
    }

    pub fn with_tick(self, tick: Duration) -> Self {
        Self { tick, ..self }
    }

    pub fn with_pe_index(self, pe_index: usize) -> Self {
        Self { pe_index, ..self }
    }

    pub fn with_faults(self, faults: Faults) -> Self {
        Self { faults, ..self }
    }
}

/// The execution context a call was made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Task,
    Interrupt,
}

/// An operation performed on the simulated platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    EventStatus(EventNum),
    InterruptBind(IntId),
    EventRegister(EventNum),
    EventEnable(EventNum),
    EventUnregister(EventNum),
    InterruptRelease(EventNum),
    /// The dispatcher started delivering the event.
    Deliver(EventNum),
    /// The dispatcher completed the event.
    Complete(EventNum),
    DisableInterrupt(IntId),
    SetWs0 { index: usize, ticks: u64 },
    PaToVa(PhysAddr),
    VaFree(VirtAddr),
    SetTestStatus { pe_index: usize, outcome: TestOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub context: Context,
    pub op: Op,
}

/// The role of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadRole {
    /// Any thread not created by this crate. Treated as the task context.
    Unmanaged,
    /// The backing thread for the interrupt context.
    Interrupt,
}

thread_local! {
    static THREAD_ROLE: Cell<ThreadRole> = Cell::new(ThreadRole::Unmanaged);
}

fn current_context() -> Context {
    THREAD_ROLE.with(|role| match role.get() {
        ThreadRole::Unmanaged => Context::Task,
        ThreadRole::Interrupt => Context::Interrupt,
    })
}

/// The part of the simulation shared with the timer thread.
struct Inner {
    watchdogs: Vec<WatchdogDesc>,
    faults: Faults,
    dispatcher: SpinMutex<dispatcher::Dispatcher>,
    calls: SpinMutex<Vec<Call>>,
    mappings: SpinMutex<Vec<VirtAddr>>,
    published: SpinMutex<Vec<(usize, TestOutcome)>>,
}

impl Inner {
    fn record(&self, op: Op) {
        let context = current_context();
        log::trace!("{context:?}: {op:?}");
        self.calls.lock().push(Call { context, op });
    }

    /// Called by the timer thread when the watchdog's WS0 signal is asserted.
    fn assert_ws0(&self, index: usize) {
        let int_id = self.watchdogs[index].gsiv;
        log::debug!("watchdog {index} fired, raising interrupt {int_id}");

        let delivery = self.dispatcher.lock().begin_delivery(int_id);
        let Some((event_num, handler)) = delivery else {
            log::debug!("interrupt {int_id} is not delivered as an event");
            return;
        };
        self.record(Op::Deliver(event_num));

        // Safety: The test case guaranteed the validity of `handler` when
        //         registering it
        unsafe { (handler.entry)(handler.arg) };

        self.record(Op::Complete(event_num));
        self.dispatcher.lock().complete(event_num);
    }
}

/// A simulated platform. See the [crate-level documentation](crate).
pub struct SimPlatform {
    inner: Arc<Inner>,
    tick: Duration,
    pe_index: usize,
    timer_cmd_send: SpinMutex<Option<mpsc::Sender<timer::TimerCmd>>>,
    timer_join_handle: SpinMutex<Option<JoinHandle<()>>>,
}

impl SimPlatform {
    /// Construct a platform and start its timer thread.
    pub fn new(config: SimConfig) -> Self {
        let inner = Arc::new(Inner {
            watchdogs: config.watchdogs,
            faults: config.faults,
            dispatcher: SpinMutex::new(dispatcher::Dispatcher::new(config.faults)),
            calls: SpinMutex::new(Vec::new()),
            mappings: SpinMutex::new(Vec::new()),
            published: SpinMutex::new(Vec::new()),
        });

        let (timer_cmd_send, timer_cmd_recv) = mpsc::channel();
        let timer_join_handle = timer::spawn(Arc::clone(&inner), timer_cmd_recv);

        Self {
            inner,
            tick: config.tick,
            pe_index: config.pe_index,
            timer_cmd_send: SpinMutex::new(Some(timer_cmd_send)),
            timer_join_handle: SpinMutex::new(Some(timer_join_handle)),
        }
    }

    /// Stop the timer thread. Resumes any panic that occurred in the
    /// interrupt context.
    pub fn shutdown(&self) {
        // `timer_cmd_recv.recv` will return `Err(_)` when we drop the
        // corresponding sender
        log::trace!("stopping the timer thread");
        *self.timer_cmd_send.lock() = None;

        let join_handle = self.timer_join_handle.lock().take();
        if let Some(join_handle) = join_handle {
            if let Err(e) = join_handle.join() {
                std::panic::resume_unwind(e);
            }
            log::trace!("stopped the timer thread");
        }
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().clone()
    }

    /// All calls made so far, without the context.
    pub fn ops(&self) -> Vec<Op> {
        self.inner.calls.lock().iter().map(|c| c.op).collect()
    }

    /// The outcomes published through [`Report::set_test_status`].
    pub fn published(&self) -> Vec<(usize, TestOutcome)> {
        self.inner.published.lock().clone()
    }

    /// The mappings created by [`Memory::pa_to_va`] and not freed yet.
    pub fn live_mappings(&self) -> Vec<VirtAddr> {
        self.inner.mappings.lock().clone()
    }

    /// The events currently bound to an interrupt.
    pub fn bound_events(&self) -> Vec<EventNum> {
        self.inner.dispatcher.lock().bound_events()
    }

    /// Called at the end of every simulated SMC. Lets the interrupt
    /// context run while the task context is polling.
    fn smc_return(&self) {
        if current_context() == Context::Task {
            std::thread::yield_now();
        }
    }
}

impl Drop for SimPlatform {
    fn drop(&mut self) {
        *self.timer_cmd_send.lock() = None;
        if let Some(join_handle) = self.timer_join_handle.lock().take() {
            if join_handle.join().is_err() && !std::thread::panicking() {
                log::error!("the interrupt context panicked");
            }
        }
    }
}

impl Sdei for SimPlatform {
    fn event_status(&self, event: EventNum) -> Result<EventStatus, EventStatusError> {
        self.inner.record(Op::EventStatus(event));
        let result = self.inner.dispatcher.lock().status(event);
        self.smc_return();
        result
    }

    fn interrupt_bind(&self, int_id: IntId) -> Result<EventNum, InterruptBindError> {
        self.inner.record(Op::InterruptBind(int_id));
        let result = self.inner.dispatcher.lock().bind(int_id);
        self.smc_return();
        result
    }

    unsafe fn event_register(
        &self,
        event: EventNum,
        handler: EventHandler,
        routing: Routing,
    ) -> Result<(), RegisterEventError> {
        self.inner.record(Op::EventRegister(event));
        log::trace!("register {event} with {handler:?} ({routing:?})");
        let result = self.inner.dispatcher.lock().register(event, handler, routing);
        self.smc_return();
        result
    }

    fn event_enable(&self, event: EventNum) -> Result<(), EnableEventError> {
        self.inner.record(Op::EventEnable(event));
        let result = self.inner.dispatcher.lock().enable(event);
        self.smc_return();
        result
    }

    fn event_unregister(&self, event: EventNum) -> Result<Unregistration, UnregisterEventError> {
        self.inner.record(Op::EventUnregister(event));
        let raw = self.inner.dispatcher.lock().unregister(event);
        self.smc_return();
        match ResultCode::from_raw(raw) {
            Some(code) => Unregistration::from_result_code(code),
            None => {
                log::warn!("SDEI_EVENT_UNREGISTER returned an unknown code {raw}");
                Err(UnregisterEventError::InvalidParameters)
            }
        }
    }

    fn interrupt_release(&self, event: EventNum) -> Result<(), InterruptReleaseError> {
        self.inner.record(Op::InterruptRelease(event));
        let result = self.inner.dispatcher.lock().release(event);
        self.smc_return();
        result
    }
}

impl Watchdog for SimPlatform {
    fn watchdog_count(&self) -> usize {
        self.inner.watchdogs.len()
    }

    fn watchdog_info(&self, index: usize) -> Option<WatchdogInfo> {
        self.inner.watchdogs.get(index).map(|desc| WatchdogInfo {
            ctrl_base: desc.ctrl_base,
            gsiv: desc.gsiv,
            is_secure: desc.is_secure,
        })
    }

    fn set_ws0(&self, ctrl_base: VirtAddr, index: usize, ticks: u64) {
        self.inner.record(Op::SetWs0 { index, ticks });

        let Some(desc) = self.inner.watchdogs.get(index) else {
            log::warn!("set_ws0: no watchdog at index {index}");
            return;
        };
        let expected_base = VirtAddr(VA_OFFSET + desc.ctrl_base.0 as usize);
        if ctrl_base != expected_base || !self.inner.mappings.lock().contains(&ctrl_base) {
            log::warn!("set_ws0: {ctrl_base:?} is not the mapped frame of watchdog {index}");
            return;
        }

        let cmd = if ticks == 0 {
            timer::TimerCmd::Disarm { index }
        } else if self.inner.faults.contains(Faults::TIMER_DEAD) {
            log::debug!("watchdog {index} is dead, ignoring the timeout");
            return;
        } else {
            let delay = self.tick.saturating_mul(ticks.min(u64::from(u32::MAX)) as u32);
            timer::TimerCmd::Arm {
                index,
                at: Instant::now() + delay,
            }
        };

        if let Some(timer_cmd_send) = &*self.timer_cmd_send.lock() {
            // The receiver only goes away after `shutdown`
            let _ = timer_cmd_send.send(cmd);
        }
    }
}

impl Gic for SimPlatform {
    fn disable_interrupt(&self, int_id: IntId) -> Result<(), BadInterruptError> {
        self.inner.record(Op::DisableInterrupt(int_id));
        if int_id >= SPECIAL_INTID_START || self.inner.faults.contains(Faults::GIC_DISABLE_FAILS) {
            Err(BadInterruptError)
        } else {
            Ok(())
        }
    }
}

impl Memory for SimPlatform {
    fn pa_to_va(&self, pa: PhysAddr) -> Result<VirtAddr, MapError> {
        self.inner.record(Op::PaToVa(pa));
        if self.inner.faults.contains(Faults::MAP_FAILS) {
            return Err(MapError);
        }
        let va = VirtAddr(VA_OFFSET + pa.0 as usize);
        self.inner.mappings.lock().push(va);
        Ok(va)
    }

    fn va_free(&self, va: VirtAddr) {
        self.inner.record(Op::VaFree(va));
        let mut mappings = self.inner.mappings.lock();
        if let Some(i) = mappings.iter().position(|&x| x == va) {
            mappings.swap_remove(i);
        } else {
            log::warn!("va_free: {va:?} is not mapped");
        }
    }
}

impl Pe for SimPlatform {
    fn pe_index(&self) -> usize {
        self.pe_index
    }

    fn data_cache_clean_invalidate(&self, _addr: usize) {
        atomic::fence(atomic::Ordering::SeqCst);
    }

    fn data_cache_invalidate(&self, _addr: usize) {
        atomic::fence(atomic::Ordering::SeqCst);
        self.smc_return();
    }
}

impl Report for SimPlatform {
    fn set_test_status(&self, pe_index: usize, outcome: TestOutcome) {
        self.inner.record(Op::SetTestStatus { pe_index, outcome });
        self.inner.published.lock().push((pe_index, outcome));
    }
}

/// Install `env_logger` if no logger is installed yet.
pub fn init_logger() {
    let _ = env_logger::try_init();
}
