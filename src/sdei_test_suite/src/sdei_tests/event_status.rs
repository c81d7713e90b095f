//! Checks `SDEI_EVENT_STATUS` in every state a bound interrupt event goes
//! through:
//!
//!  1. Handler-Unregistered
//!  2. Handler-Registered
//!  3. Handler-Enabled
//!  4. Handler-Enabled & Running
//!  5. Handler-Unregister Pending
//!
//! A non-secure watchdog's WS0 interrupt is bound to a new event, and the
//! watchdog is fired once the event is enabled. States 4 and 5 can only be
//! observed while the event is being handled, so they are checked by the
//! event handler, which also unregisters the event to enter state 5.
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use super::TestMeta;
use crate::{
    outcome::{OutcomeCell, TestOutcome},
    platform::{non_secure_watchdogs, BadInterruptError, MapError, Platform, VirtAddr, WatchdogInfo},
    sdei::{Event, EventHandler, EventNum, EventStatus, Routing, Unregistration},
    utils::{spin_until, CompletionFlag},
};

pub const META: TestMeta = TestMeta {
    id: 32,
    name: "event_status",
    description: "Verify check always availability-Event Status",
};

/// The default number of polls for the watchdog interrupt to arrive.
pub const WATCHDOG_TIMEOUT: u64 = 0x10_0000;

/// The default number of polls for the event to stop running after the
/// handler has signaled completion.
pub const SETTLE_TIMEOUT: u64 = 0x10_0000;

/// Timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The watchdog's WS0 timeout in watchdog ticks.
    pub timer_expire_ticks: u64,
    /// The poll budget for the handler's completion signal.
    pub interrupt_timeout: u64,
    /// The poll budget for `RUNNING` to clear.
    pub settle_timeout: u64,
}

impl Config {
    pub const DEFAULT: Self = Self {
        timer_expire_ticks: 1,
        interrupt_timeout: WATCHDOG_TIMEOUT,
        settle_timeout: SETTLE_TIMEOUT,
    };

    pub const fn with_timer_expire_ticks(self, timer_expire_ticks: u64) -> Self {
        Self {
            timer_expire_ticks,
            ..self
        }
    }

    pub const fn with_interrupt_timeout(self, interrupt_timeout: u64) -> Self {
        Self {
            interrupt_timeout,
            ..self
        }
    }

    pub const fn with_settle_timeout(self, settle_timeout: u64) -> Self {
        Self {
            settle_timeout,
            ..self
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct EventCell {
    event_num: AtomicU32,
    is_bound_irq: AtomicBool,
}

impl EventCell {
    const fn new() -> Self {
        Self {
            event_num: AtomicU32::new(0),
            is_bound_irq: AtomicBool::new(false),
        }
    }

    fn set(&self, event: Event) {
        self.event_num.store(event.event_num, Ordering::Relaxed);
        self.is_bound_irq.store(event.is_bound_irq, Ordering::Release);
    }

    fn get(&self) -> Event {
        Event {
            is_bound_irq: self.is_bound_irq.load(Ordering::Acquire),
            event_num: self.event_num.load(Ordering::Relaxed),
        }
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }
}

/// The watchdog in use.
struct WatchdogCell {
    index: AtomicUsize,
    ctrl_base: AtomicUsize,
}

impl WatchdogCell {
    const fn new() -> Self {
        Self {
            index: AtomicUsize::new(0),
            ctrl_base: AtomicUsize::new(0),
        }
    }

    fn set(&self, index: usize, ctrl_base: VirtAddr) {
        self.index.store(index, Ordering::Relaxed);
        self.ctrl_base.store(ctrl_base.0, Ordering::Release);
    }

    fn get(&self) -> (usize, VirtAddr) {
        let ctrl_base = VirtAddr(self.ctrl_base.load(Ordering::Acquire));
        (self.index.load(Ordering::Relaxed), ctrl_base)
    }
}

/// The state shared between the test sequence and the event handler.
///
/// The sequence writes `event` and `watchdog` before arming the watchdog.
/// After that, the handler is the only writer of `handler_done`, and
/// `outcome` is written by whichever of the two is running.
struct Shared {
    event: EventCell,
    watchdog: WatchdogCell,
    handler_done: CompletionFlag,
    outcome: OutcomeCell,
}

impl Shared {
    const fn new() -> Self {
        Self {
            event: EventCell::new(),
            watchdog: WatchdogCell::new(),
            handler_done: CompletionFlag::new(),
            outcome: OutcomeCell::new(),
        }
    }
}

/// The resources held by the test sequence, in acquisition order.
///
/// [`EventStatusCheck::teardown`] releases the level recorded here and every
/// level below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Held {
    Nothing,
    /// The watchdog control frame is mapped.
    Mapping,
    /// The watchdog interrupt is bound to an event.
    Binding,
    /// A handler is registered for the event.
    Registration,
}

/// The event status test case.
///
/// The check must be `'static` because its address is handed to the SDEI
/// dispatcher as the handler argument.
pub struct EventStatusCheck<P> {
    platform: P,
    config: Config,
    shared: Shared,
}

impl<P: Platform> EventStatusCheck<P> {
    pub const fn new(platform: P, config: Config) -> Self {
        Self {
            platform,
            config,
            shared: Shared::new(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the test on the last non-secure watchdog and publish the outcome.
    pub fn run(&'static self) -> TestOutcome {
        let outcome = match non_secure_watchdogs(&self.platform).next() {
            Some((index, info)) => self.run_with(index, info),
            None => {
                log::error!("No non-secure Watchdogs reported");
                TestOutcome::Fail
            }
        };

        let pe_index = self.platform.pe_index();
        log::info!(
            "test {:03} ({}) on PE {pe_index}: {outcome}",
            META.id,
            META.name
        );
        self.platform.set_test_status(pe_index, outcome);
        outcome
    }

    /// Run the test on the watchdog at `index` without publishing the outcome.
    pub fn run_on_watchdog(&'static self, index: usize) -> TestOutcome {
        match self.platform.watchdog_info(index) {
            Some(info) if !info.is_secure => self.run_with(index, info),
            Some(_) => {
                log::error!("Watchdog {index} is secure");
                TestOutcome::Fail
            }
            None => {
                log::error!("No watchdog at index {index}");
                TestOutcome::Fail
            }
        }
    }

    fn run_with(&'static self, index: usize, info: WatchdogInfo) -> TestOutcome {
        self.shared.outcome.reset();
        self.shared.handler_done.reset(&self.platform);

        let mut held = Held::Nothing;
        let result = self.sequence(index, info, &mut held);

        // Combine with whatever the handler has found
        let outcome = result
            .err()
            .unwrap_or(TestOutcome::Pass)
            .worse(self.shared.outcome.get());

        self.teardown(held, outcome);
        outcome
    }

    /// Drive the event through its lifecycle. `held` is updated as resources
    /// are acquired and released.
    fn sequence(
        &'static self,
        index: usize,
        info: WatchdogInfo,
        held: &mut Held,
    ) -> Result<(), TestOutcome> {
        let p = &self.platform;
        let int_id = info.gsiv;
        log::debug!("WS0 interrupt id: {int_id}");

        let ctrl_base = p.pa_to_va(info.ctrl_base).map_err(|MapError| {
            log::error!("Watchdog {index} frame {:?} mapping failed", info.ctrl_base);
            TestOutcome::Fail
        })?;
        self.shared.watchdog.set(index, ctrl_base);
        *held = Held::Mapping;

        p.disable_interrupt(int_id).map_err(|BadInterruptError| {
            log::error!("Interrupt {int_id} disable failed");
            TestOutcome::Fail
        })?;

        let event_num = p.interrupt_bind(int_id).map_err(|e| {
            log::error!("SPI intr number {int_id} bind failed with err {e:?}");
            TestOutcome::Fail
        })?;
        *held = Held::Binding;
        self.shared.event.set(Event {
            event_num,
            is_bound_irq: true,
        });
        p.data_cache_clean_invalidate(self.shared.event.addr());

        // Check 1 - Handler-Unregistered State
        let status = self.query_status(event_num, "Handler-Unregistered")?;
        if status.contains(EventStatus::REGISTERED) {
            log::error!("SDEI_EVENT_STATUS register bit mismatch, found = {status:?}");
            return Err(TestOutcome::Fail);
        }

        let handler = EventHandler {
            entry: handler_trampoline::<P>,
            arg: self as *const Self as usize,
        };
        // Safety: `self` is `'static`, so it outlives the registration
        unsafe { p.event_register(event_num, handler, Routing::Any) }.map_err(|e| {
            log::error!("SDEI evt {event_num} register fail with err {e:?}");
            TestOutcome::Fail
        })?;
        *held = Held::Registration;

        // Check 2 - Handler-Registered State
        let status = self.query_status(event_num, "Handler-Registered")?;
        if !status.contains(EventStatus::REGISTERED) {
            log::error!("SDEI_EVENT_STATUS register bit mismatch, found = {status:?}");
            return Err(TestOutcome::Fail);
        }
        if status.contains(EventStatus::ENABLED) {
            log::error!("SDEI_EVENT_STATUS enable bit set before enabling, found = {status:?}");
            return Err(TestOutcome::Fail);
        }

        p.event_enable(event_num).map_err(|e| {
            log::error!("SDEI event enable failed with err {e:?}");
            TestOutcome::Fail
        })?;

        // Check 3 - Handler-Enabled State
        let status = self.query_status(event_num, "Handler-Enabled")?;
        if !status.contains(EventStatus::ENABLED) {
            log::error!("SDEI_EVENT_STATUS enable bit mismatch, found = {status:?}");
            return Err(TestOutcome::Fail);
        }

        // Generate the watchdog interrupt. Checks 4 and 5 happen in
        // `handle_event`.
        p.set_ws0(ctrl_base, index, self.config.timer_expire_ticks);

        let wait = spin_until(self.config.interrupt_timeout, || {
            self.shared.handler_done.observe(p)
        });
        if wait.is_err() {
            log::error!("Watchdog interrupt trigger failed");
            p.set_ws0(ctrl_base, index, 0);
            return Err(TestOutcome::Fail);
        }

        // The handler has requested unregistration. Wait for the dispatcher
        // to complete the event.
        let mut last_status = None;
        let mut num_query_errors = 0u64;
        let settle = spin_until(self.config.settle_timeout, || {
            match p.event_status(event_num) {
                Ok(status) => {
                    last_status = Some(status);
                    !status.contains(EventStatus::RUNNING)
                }
                Err(e) => {
                    if num_query_errors == 0 {
                        log::error!("SDEI event {event_num} status failed err {e:?}");
                    }
                    num_query_errors += 1;
                    false
                }
            }
        });
        if num_query_errors > 1 {
            log::warn!("SDEI event {event_num} status failed {num_query_errors} times");
        }

        if self.shared.outcome.get() != TestOutcome::Pass {
            // The handler has already failed the test. The final state says
            // nothing more, so only decide how far to unwind.
            if matches!(last_status, Some(status) if !status.contains(EventStatus::REGISTERED)) {
                *held = Held::Binding;
            }
            return Err(TestOutcome::Fail);
        }

        match last_status {
            None => {
                log::error!("SDEI event {event_num} status could not be determined");
                return Err(TestOutcome::Error);
            }
            Some(status) if status.contains(EventStatus::REGISTERED) => {
                log::error!(
                    "SDEI event {event_num} is still registered after the handler \
                    unregistered it, found = {status:?}"
                );
                return Err(TestOutcome::Error);
            }
            Some(status) => {
                if settle.is_err() {
                    log::warn!("SDEI event {event_num} did not stop running, found = {status:?}");
                }
            }
        }

        // The handler's unregistration has taken effect
        *held = Held::Binding;

        let release = p.interrupt_release(event_num);
        *held = Held::Mapping;
        release.map_err(|e| {
            log::error!("Event num {event_num} release failed :err {e:?}");
            TestOutcome::Fail
        })
    }

    /// Query the event status, failing the test if the query itself fails.
    fn query_status(&self, event_num: EventNum, state: &str) -> Result<EventStatus, TestOutcome> {
        self.platform.event_status(event_num).map_err(|e| {
            log::error!("{state} state check failed with err {e:?}");
            TestOutcome::Fail
        })
    }

    /// Release everything at or below `held`. Failures are only logged.
    fn teardown(&self, held: Held, outcome: TestOutcome) {
        let p = &self.platform;
        let event_num = self.shared.event.get().event_num;

        if held >= Held::Registration {
            match p.event_unregister(event_num) {
                Ok(Unregistration::Complete) => {}
                Ok(Unregistration::Pending) => {
                    log::warn!("SDEI event {event_num} unregister is pending");
                }
                Err(e) => {
                    log::error!("SDEI event {event_num} unregister failed :err {e:?}");
                }
            }
        }

        if held >= Held::Binding {
            if outcome == TestOutcome::Error {
                // The event's state is unknown
                log::warn!("Not releasing event number {event_num}");
            } else if let Err(e) = p.interrupt_release(event_num) {
                log::error!("Event number {event_num} release failed with err {e:?}");
            }
        }

        if held >= Held::Mapping {
            let (_, ctrl_base) = self.shared.watchdog.get();
            p.va_free(ctrl_base);
        }
    }

    /// The event handler body. Runs in the interrupt context.
    fn handle_event(&self) {
        let p = &self.platform;
        let (index, ctrl_base) = self.shared.watchdog.get();

        // Stop the watchdog before anything else so that it doesn't fire again
        p.set_ws0(ctrl_base, index, 0);

        p.data_cache_invalidate(self.shared.event.addr());
        let event_num = self.shared.event.get().event_num;

        // Check 4 - Handler-Enabled & Running State
        self.expect_running(event_num, "Handler-Enabled & Running");

        match p.event_unregister(event_num) {
            Ok(Unregistration::Pending) => {}
            other => {
                log::error!("Unregister-Pending check failed, found = {other:?}");
                self.shared.outcome.fail();
            }
        }

        // Check 5 - Handler-Unregister Pending State
        let status = self.expect_running(event_num, "Handler-Unregister Pending");
        if matches!(status, Some(status) if !status.is_unregister_pending()) {
            log::warn!("SDEI event {event_num} still reports REGISTERED, found = {status:?}");
        }

        // Always signal, or the test sequence would wait for the full budget
        self.shared.handler_done.publish(p);
    }

    /// Check that the event is running. Returns the status if the query
    /// succeeded.
    fn expect_running(&self, event_num: EventNum, state: &str) -> Option<EventStatus> {
        match self.platform.event_status(event_num) {
            Ok(status) if status.contains(EventStatus::RUNNING) => {
                log::debug!("{state}: {status:?}");
                Some(status)
            }
            Ok(status) => {
                log::error!("SDEI_EVENT_STATUS running bit mismatch, found value = {status:?}");
                self.shared.outcome.fail();
                Some(status)
            }
            Err(e) => {
                log::error!("{state} check failed with err {e:?}");
                self.shared.outcome.fail();
                None
            }
        }
    }
}

/// The entry point registered with the dispatcher.
///
/// # Safety
///
/// `arg` must be the address of a `'static` `EventStatusCheck<P>`.
unsafe extern "C" fn handler_trampoline<P: Platform>(arg: usize) {
    // Safety: Upheld by the caller
    let this = unsafe { &*(arg as *const EventStatusCheck<P>) };
    this.handle_event();
}
